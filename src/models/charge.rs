use crate::error::ProcessingError;
use crate::models::card::CardType;
use crate::utils::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDetails {
    pub number: String,
    pub expiration_month: u32,
    pub expiration_year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub card: CardDetails,
    pub amount: Money,
}

// Queue message body
#[derive(Debug, Serialize, Deserialize)]
struct ChargeMessage {
    credit_card: CreditCardPayload,
    amount: Money,
}

#[derive(Debug, Serialize, Deserialize)]
struct CreditCardPayload {
    credit_card_number: String,
    credit_card_expiration_year: i32,
    credit_card_expiration_month: u32,
}

impl ChargeRequest {
    pub fn from_message_body(body: &str) -> Result<Self, ProcessingError> {
        let message: ChargeMessage = serde_json::from_str(body)?;
        let month = message.credit_card.credit_card_expiration_month;
        if !(1..=12).contains(&month) {
            return Err(ProcessingError::MalformedMessage(format!(
                "expiration month {} out of range",
                month
            )));
        }

        Ok(Self {
            card: CardDetails {
                number: message.credit_card.credit_card_number,
                expiration_month: month,
                expiration_year: message.credit_card.credit_card_expiration_year,
            },
            amount: message.amount,
        })
    }

    pub fn to_message_body(&self) -> String {
        let message = ChargeMessage {
            credit_card: CreditCardPayload {
                credit_card_number: self.card.number.clone(),
                credit_card_expiration_year: self.card.expiration_year,
                credit_card_expiration_month: self.card.expiration_month,
            },
            amount: self.amount.clone(),
        };
        serde_json::json!(message).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionOutcome {
    pub transaction_id: Uuid,
    pub card_type: CardType,
    pub last_four_digits: String,
    pub amount: Money,
    pub charged: bool,
}

/// The row handed to the transaction store. Never carries the full card number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: Uuid,
    pub card_type: CardType,
    pub last_four_digits: String,
    pub amount: Money,
    pub charged: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&TransactionOutcome> for TransactionRecord {
    fn from(outcome: &TransactionOutcome) -> Self {
        Self {
            transaction_id: outcome.transaction_id,
            card_type: outcome.card_type,
            last_four_digits: outcome.last_four_digits.clone(),
            amount: outcome.amount.clone(),
            charged: outcome.charged,
            created_at: Utc::now(),
        }
    }
}

/// Baggage propagated alongside a charge request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    baggage: HashMap<String, String>,
}

impl RequestContext {
    /// Parses a W3C baggage header value (`k1=v1,k2=v2;prop`). Malformed
    /// members are skipped.
    pub fn from_baggage(header: &str) -> Self {
        let baggage = header
            .split(',')
            .filter_map(|member| {
                let kv = member.split(';').next()?;
                let (key, value) = kv.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { baggage }
    }

    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.baggage.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.baggage.get(key).map(String::as_str)
    }

    pub fn is_synthetic(&self) -> bool {
        self.get("synthetic_request") == Some("true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "credit_card": {
            "credit_card_number": "4111111111111111",
            "credit_card_expiration_year": 2030,
            "credit_card_expiration_month": 12,
            "credit_card_cvv": 672
        },
        "amount": {"units": 20, "nanos": 0, "currency_code": "USD"}
    }"#;

    #[test]
    fn test_parse_message_body() {
        let request = ChargeRequest::from_message_body(BODY).unwrap();
        assert_eq!(request.card.number, "4111111111111111");
        assert_eq!(request.card.expiration_month, 12);
        assert_eq!(request.card.expiration_year, 2030);
        assert_eq!(request.amount, Money::new(20, 0, "USD").unwrap());
    }

    #[test]
    fn test_body_survives_reserialization() {
        let request = ChargeRequest::from_message_body(BODY).unwrap();
        let again = ChargeRequest::from_message_body(&request.to_message_body()).unwrap();
        assert_eq!(request, again);
    }

    #[test]
    fn test_malformed_bodies() {
        for body in [
            "not json",
            r#"{"amount": {"units": 1, "currency_code": "USD"}}"#,
            r#"{"credit_card": {"credit_card_number": "4111111111111111", "credit_card_expiration_year": 2030, "credit_card_expiration_month": 13}, "amount": {"units": 1, "currency_code": "USD"}}"#,
            r#"{"credit_card": {"credit_card_number": "4111111111111111", "credit_card_expiration_year": 2030, "credit_card_expiration_month": 1}, "amount": {"units": 1, "nanos": 1000000000, "currency_code": "USD"}}"#,
        ] {
            let err = ChargeRequest::from_message_body(body).unwrap_err();
            assert!(matches!(err, ProcessingError::MalformedMessage(_)), "{}", body);
        }
    }

    #[test]
    fn test_baggage_parsing() {
        let ctx = RequestContext::from_baggage("session.id=abc, synthetic_request=true;ttl=1,broken");
        assert_eq!(ctx.get("session.id"), Some("abc"));
        assert!(ctx.is_synthetic());
        assert!(!RequestContext::from_baggage("synthetic_request=false").is_synthetic());
        assert!(!RequestContext::default().is_synthetic());
    }
}
