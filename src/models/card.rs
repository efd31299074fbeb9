use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Unknown,
    Invalid,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Visa => "visa",
            CardType::Mastercard => "mastercard",
            CardType::Amex => "amex",
            CardType::Discover => "discover",
            CardType::Unknown => "unknown",
            CardType::Invalid => "invalid",
        }
    }

    fn accepts_length(&self, len: usize) -> bool {
        match self {
            CardType::Visa => matches!(len, 13 | 16 | 19),
            CardType::Mastercard => len == 16,
            CardType::Amex => len == 15,
            CardType::Discover => (16..=19).contains(&len),
            CardType::Unknown | CardType::Invalid => false,
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visa" => Ok(CardType::Visa),
            "mastercard" => Ok(CardType::Mastercard),
            "amex" => Ok(CardType::Amex),
            "discover" => Ok(CardType::Discover),
            other => Err(format!("unknown card network '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardValidationResult {
    pub card_type: CardType,
    pub is_valid: bool,
}

/// Strips the separators customers usually type (spaces and dashes).
/// Returns `None` if anything other than digits remains.
pub fn normalize_number(number: &str) -> Option<String> {
    let digits: String = number
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits)
}

/// Last four characters of the card number, ignoring separators.
pub fn last_four_digits(number: &str) -> String {
    let digits: Vec<char> = number
        .chars()
        .filter(|c| !matches!(c, ' ' | '-'))
        .collect();
    let start = digits.len().saturating_sub(4);
    digits[start..].iter().collect()
}

pub fn luhn_checksum_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(mut d) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

fn prefix(digits: &str, len: usize) -> Option<u32> {
    digits.get(..len).and_then(|p| p.parse().ok())
}

fn classify(digits: &str) -> CardType {
    let p2 = prefix(digits, 2);
    let p3 = prefix(digits, 3);
    let p4 = prefix(digits, 4);
    let p6 = prefix(digits, 6);

    if digits.starts_with('4') {
        CardType::Visa
    } else if matches!(p2, Some(34 | 37)) {
        CardType::Amex
    } else if matches!(p2, Some(51..=55)) || matches!(p4, Some(2221..=2720)) {
        CardType::Mastercard
    } else if p4 == Some(6011)
        || matches!(p3, Some(644..=649))
        || p2 == Some(65)
        || matches!(p6, Some(622126..=622925))
    {
        CardType::Discover
    } else {
        CardType::Unknown
    }
}

/// Classifies a card number by IIN prefix and checks length and Luhn digit.
pub fn validate_card(number: &str) -> CardValidationResult {
    let digits = match normalize_number(number) {
        Some(d) if (12..=19).contains(&d.len()) => d,
        _ => {
            return CardValidationResult {
                card_type: CardType::Invalid,
                is_valid: false,
            }
        }
    };

    let card_type = classify(&digits);
    let is_valid = card_type.accepts_length(digits.len()) && luhn_checksum_valid(&digits);

    CardValidationResult {
        card_type,
        is_valid,
    }
}
