use crate::error::CommissionError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ISO-style currency code ("USD", "VES").
///
/// Codes are normalised to upper case on construction so that comparisons
/// between configuration and ledger data never depend on spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl AsRef<str>) -> Result<Self, CommissionError> {
        let code = code.as_ref().trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CommissionError::configuration(format!(
                "Invalid currency code: '{}'",
                code
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// For literals already known to be upper-case codes.
    pub(crate) fn from_static(code: &'static str) -> Self {
        Self(code.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = CommissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CommissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// Represents a strictly positive monetary amount, such as a payment.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, CommissionError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(CommissionError::validation("Amount must be positive"))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = CommissionError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Rounds a monetary value to `scale` decimal places, half away from zero.
pub fn round_amount(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a percentage (2.8) into a fraction (0.028).
pub fn percent_to_fraction(percent: Decimal) -> Decimal {
    percent / Decimal::ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_code_normalisation() {
        let code = CurrencyCode::new(" usd ").unwrap();
        assert_eq!(code.as_str(), "USD");
        assert_eq!(code, "USD".parse().unwrap());
    }

    #[test]
    fn test_currency_code_rejects_garbage() {
        assert!(matches!(
            CurrencyCode::new(""),
            Err(CommissionError::Configuration(_))
        ));
        assert!(CurrencyCode::new("U$D").is_err());
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(CommissionError::Validation(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(CommissionError::Validation(_))
        ));
    }

    #[test]
    fn test_round_amount() {
        assert_eq!(round_amount(dec!(10.005), 2), dec!(10.01));
        assert_eq!(round_amount(dec!(28.000), 2), dec!(28.00));
        assert_eq!(percent_to_fraction(dec!(2.8)), dec!(0.028));
    }

    #[test]
    fn test_amount_deserialization_rejects_zero() {
        let parsed: Result<Amount, _> = serde_json::from_str("\"0\"");
        assert!(parsed.is_err());
        let parsed: Amount = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(parsed.value(), dec!(12.5));
    }
}
