// Money in the protobuf-style units + nanos representation.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const NANOS_PER_UNIT: i32 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMoney")]
pub struct Money {
    pub units: i64,
    pub nanos: i32,
    pub currency_code: String,
}

#[derive(Deserialize)]
struct RawMoney {
    units: i64,
    #[serde(default)]
    nanos: i32,
    currency_code: String,
}

impl TryFrom<RawMoney> for Money {
    type Error = String;

    fn try_from(raw: RawMoney) -> Result<Self, Self::Error> {
        Money::new(raw.units, raw.nanos, raw.currency_code)
    }
}

impl Money {
    pub fn new(units: i64, nanos: i32, currency_code: impl Into<String>) -> Result<Self, String> {
        let currency_code = currency_code.into();
        if !(0..NANOS_PER_UNIT).contains(&nanos) {
            return Err(format!("nanos {} out of range [0, {})", nanos, NANOS_PER_UNIT));
        }
        if currency_code.len() != 3 || !currency_code.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(format!("'{}' is not an ISO 4217 currency code", currency_code));
        }
        Ok(Self {
            units,
            nanos,
            currency_code: currency_code.to_ascii_uppercase(),
        })
    }
}

/// Decimal rendering with at least two fractional digits, e.g. `20.00`, `1.123456789`.
pub fn format_amount(units: i64, nanos: i32) -> String {
    let fraction = format!("{:09}", nanos);
    let trimmed = fraction.trim_end_matches('0');
    let fraction = if trimmed.len() < 2 {
        &fraction[..2]
    } else {
        trimmed
    };
    format!("{}.{}", units, fraction)
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_amount(self.units, self.nanos), self.currency_code)
    }
}
