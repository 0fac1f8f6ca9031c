use crate::domain::money::CurrencyCode;
use crate::error::{CommissionError, Result};
use std::env;

pub const DEFAULT_PRIMARY_CURRENCY: &str = "USD";
pub const DEFAULT_SECONDARY_CURRENCY: &str = "VES";
pub const DEFAULT_AMOUNT_SCALE: u32 = 2;
pub const DEFAULT_PAYMENT_DAY: u32 = 10;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionSettings {
    /// Payable currency kept as-is on payment lines.
    pub primary_currency: CurrencyCode,
    /// Payable currency that absorbs every other currency on payment lines.
    pub secondary_currency: CurrencyCode,
    /// Decimal places of computed commission amounts.
    pub amount_scale: u32,
    /// Day of month on which monthly batches are paid.
    pub payment_day: u32,
}

impl Default for CommissionSettings {
    fn default() -> Self {
        Self {
            primary_currency: CurrencyCode::from_static(DEFAULT_PRIMARY_CURRENCY),
            secondary_currency: CurrencyCode::from_static(DEFAULT_SECONDARY_CURRENCY),
            amount_scale: DEFAULT_AMOUNT_SCALE,
            payment_day: DEFAULT_PAYMENT_DAY,
        }
    }
}

impl CommissionSettings {
    /// Load settings from environment variables, after reading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            primary_currency: match lookup("COMMISSION_PRIMARY_CURRENCY") {
                Some(code) => code.parse()?,
                None => defaults.primary_currency,
            },
            secondary_currency: match lookup("COMMISSION_SECONDARY_CURRENCY") {
                Some(code) => code.parse()?,
                None => defaults.secondary_currency,
            },
            amount_scale: parse_number(&lookup, "COMMISSION_AMOUNT_SCALE", defaults.amount_scale)?,
            payment_day: parse_number(&lookup, "COMMISSION_PAYMENT_DAY", defaults.payment_day)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.primary_currency == self.secondary_currency {
            return Err(CommissionError::configuration(
                "Primary and secondary payment currencies must differ",
            ));
        }
        if self.amount_scale > 10 {
            return Err(CommissionError::configuration("Amount scale must be at most 10"));
        }
        if !(1..=31).contains(&self.payment_day) {
            return Err(CommissionError::configuration("Payment day must be between 1 and 31"));
        }
        Ok(())
    }
}

fn parse_number(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> Result<u32> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CommissionError::configuration(format!("Invalid {}: '{}'", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = CommissionSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, CommissionSettings::default());
        assert_eq!(settings.primary_currency.as_str(), "USD");
        assert_eq!(settings.secondary_currency.as_str(), "VES");
        assert_eq!(settings.payment_day, 10);
    }

    #[test]
    fn test_overrides() {
        let settings = CommissionSettings::from_lookup(lookup(&[
            ("COMMISSION_PRIMARY_CURRENCY", "eur"),
            ("COMMISSION_AMOUNT_SCALE", "4"),
            ("COMMISSION_PAYMENT_DAY", "15"),
        ]))
        .unwrap();
        assert_eq!(settings.primary_currency.as_str(), "EUR");
        assert_eq!(settings.amount_scale, 4);
        assert_eq!(settings.payment_day, 15);
    }

    #[test]
    fn test_invalid_values() {
        assert!(CommissionSettings::from_lookup(lookup(&[("COMMISSION_PAYMENT_DAY", "40")])).is_err());
        assert!(CommissionSettings::from_lookup(lookup(&[("COMMISSION_AMOUNT_SCALE", "two")])).is_err());
        assert!(
            CommissionSettings::from_lookup(lookup(&[("COMMISSION_SECONDARY_CURRENCY", "USD")]))
                .is_err()
        );
    }
}
