//! Monetary amounts in minor units.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// ISO-4217 style currency code, stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl AsRef<str>) -> Result<Self, ValidationError> {
        let code = code.as_ref().trim();
        if code.is_empty() {
            return Err(ValidationError::empty_field("currency"));
        }
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("'{}' is not a three-letter code", code),
            ));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// US dollars, the fallback default currency.
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.0
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount of money in the currency's minor unit (cents, pence, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount_minor: i64, currency: Currency) -> Self {
        Self {
            amount_minor,
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    /// Subtracts `other`, flooring at zero.
    ///
    /// Returns `None` when the currencies differ.
    pub fn saturating_sub(&self, other: &Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::new(
            (self.amount_minor - other.amount_minor).max(0),
            self.currency.clone(),
        ))
    }

    /// Adds `other`; `None` when the currencies differ or the sum overflows.
    pub fn checked_add(&self, other: &Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        self.amount_minor
            .checked_add(other.amount_minor)
            .map(|sum| Money::new(sum, self.currency.clone()))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount_minor, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> Currency {
        Currency::new("usd").unwrap()
    }

    #[test]
    fn currency_is_normalized_to_upper_case() {
        assert_eq!(usd().as_str(), "USD");
    }

    #[test]
    fn currency_rejects_bad_codes() {
        assert!(Currency::new("").is_err());
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("US1").is_err());
    }

    #[test]
    fn currency_deserialization_validates() {
        assert!(serde_json::from_str::<Currency>("\"eur\"").is_ok());
        assert!(serde_json::from_str::<Currency>("\"euro\"").is_err());
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let a = Money::new(500, usd());
        let b = Money::new(800, usd());
        assert_eq!(a.saturating_sub(&b).unwrap().amount_minor, 0);
        assert_eq!(b.saturating_sub(&a).unwrap().amount_minor, 300);
    }

    #[test]
    fn arithmetic_refuses_mixed_currencies() {
        let a = Money::new(500, usd());
        let b = Money::new(500, Currency::new("EUR").unwrap());
        assert!(a.saturating_sub(&b).is_none());
        assert!(a.checked_add(&b).is_none());
    }
}
