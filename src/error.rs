use crate::models::card::CardType;
use thiserror::Error;

/// Why a charge request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChargeError {
    #[error("credit card info is invalid")]
    InvalidCard,
    #[error("cannot process {card_type} credit cards")]
    UnsupportedNetwork { card_type: CardType },
    #[error("the credit card (ending {last_four_digits}) expired on {month}/{year}")]
    CardExpired {
        last_four_digits: String,
        month: u32,
        year: i32,
    },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("queue receive failed: {0}")]
    Receive(String),
    #[error("queue delete failed: {0}")]
    Delete(String),
    #[error("queue send failed: {0}")]
    Send(String),
    #[error("receipt handle {0} is not valid for any in-flight message")]
    InvalidReceiptHandle(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transaction {0} already recorded")]
    Duplicate(uuid::Uuid),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single message; always caught at the message boundary.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error(transparent)]
    Charge(#[from] ChargeError),
    #[error("failed to persist transaction: {0}")]
    Persistence(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<serde_json::Error> for ProcessingError {
    fn from(err: serde_json::Error) -> Self {
        ProcessingError::MalformedMessage(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}
