use crate::error::ChargeError;
use crate::models::card::{last_four_digits, validate_card, CardType};
use crate::models::charge::{ChargeRequest, RequestContext, TransactionOutcome};
use chrono::{Datelike, NaiveDate, Utc};
use tracing::{debug, field, info, info_span};
use uuid::Uuid;

/// Validates card and amount and mints a transaction. Holds no per-request state.
pub struct ChargeProcessor {
    accepted_networks: Vec<CardType>,
}

impl ChargeProcessor {
    pub fn new(accepted_networks: Vec<CardType>) -> Self {
        Self { accepted_networks }
    }

    pub fn charge(
        &self,
        request: &ChargeRequest,
        context: &RequestContext,
    ) -> Result<TransactionOutcome, ChargeError> {
        self.charge_at(request, context, Utc::now().date_naive())
    }

    /// Same as [`charge`](Self::charge) with an explicit "today" for the expiry check.
    pub fn charge_at(
        &self,
        request: &ChargeRequest,
        context: &RequestContext,
        today: NaiveDate,
    ) -> Result<TransactionOutcome, ChargeError> {
        let span = info_span!(
            "charge",
            card_type = field::Empty,
            card_valid = field::Empty,
            charged = field::Empty
        );
        let _enter = span.enter();

        let card = &request.card;
        let last_four = last_four_digits(&card.number);
        let validation = validate_card(&card.number);
        span.record("card_type", validation.card_type.as_str());
        span.record("card_valid", validation.is_valid);

        if !validation.is_valid {
            debug!(last_four_digits = %last_four, "Card failed validation");
            return Err(ChargeError::InvalidCard);
        }

        if !self.accepted_networks.contains(&validation.card_type) {
            return Err(ChargeError::UnsupportedNetwork {
                card_type: validation.card_type,
            });
        }

        let current = today.year() as i64 * 12 + today.month() as i64;
        let expires = card.expiration_year as i64 * 12 + card.expiration_month as i64;
        if current > expires {
            return Err(ChargeError::CardExpired {
                last_four_digits: last_four,
                month: card.expiration_month,
                year: card.expiration_year,
            });
        }

        // synthetic traffic is tagged, never blocked
        let charged = !context.is_synthetic();
        span.record("charged", charged);

        let outcome = TransactionOutcome {
            transaction_id: Uuid::new_v4(),
            card_type: validation.card_type,
            last_four_digits: last_four,
            amount: request.amount.clone(),
            charged,
        };

        info!(
            transaction_id = %outcome.transaction_id,
            card_type = %outcome.card_type,
            last_four_digits = %outcome.last_four_digits,
            amount = %outcome.amount,
            "Transaction complete."
        );

        Ok(outcome)
    }
}
