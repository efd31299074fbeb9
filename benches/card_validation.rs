use charge_worker::models::card::{validate_card, CardType};
use charge_worker::models::charge::{ChargeRequest, RequestContext};
use charge_worker::services::ChargeProcessor;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const BODY: &str = r#"{"credit_card": {"credit_card_number": "4111 1111 1111 1111", "credit_card_expiration_year": 2030, "credit_card_expiration_month": 12}, "amount": {"units": 20, "nanos": 0, "currency_code": "USD"}}"#;

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_card");
    for number in ["4111111111111111", "5555-5555-5555-4444", "378282246310005", "12345"] {
        group.bench_function(number, |b| b.iter(|| validate_card(black_box(number))));
    }
    group.finish();
}

fn bench_parse_and_charge(c: &mut Criterion) {
    let processor = ChargeProcessor::new(vec![CardType::Visa, CardType::Mastercard]);
    let context = RequestContext::default();

    c.bench_function("parse_and_charge", |b| {
        b.iter(|| {
            let request = ChargeRequest::from_message_body(black_box(BODY)).unwrap();
            processor.charge(&request, &context).unwrap()
        })
    });
}

criterion_group!(benches, bench_validate, bench_parse_and_charge);
criterion_main!(benches);
