use super::rule::CommissionMethod;
use super::{CompanyId, RuleId, UserId};
use crate::error::CommissionError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-company commission settings of one salesperson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalespersonConfig {
    pub salesperson: UserId,
    pub company: CompanyId,
    #[serde(default = "default_active")]
    pub commission_active: bool,
    #[serde(default)]
    pub default_rule: Option<RuleId>,
    /// Replaces the matched rule's method unless it is `None`.
    #[serde(default)]
    pub override_method: CommissionMethod,
    #[serde(default)]
    pub min_commission: Option<Decimal>,
    #[serde(default)]
    pub max_commission: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_active() -> bool {
    true
}

impl SalespersonConfig {
    pub fn new(salesperson: UserId, company: CompanyId) -> Self {
        Self {
            salesperson,
            company,
            commission_active: true,
            default_rule: None,
            override_method: CommissionMethod::None,
            min_commission: None,
            max_commission: None,
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<(), CommissionError> {
        self.override_method.validate()?;
        if let (Some(min), Some(max)) = (self.min_commission, self.max_commission)
            && min > max
        {
            return Err(CommissionError::configuration(
                "Minimum commission must be less than or equal to maximum commission",
            ));
        }
        if self.min_commission.is_some_and(|m| m < Decimal::ZERO) {
            return Err(CommissionError::configuration("Minimum commission cannot be negative"));
        }
        Ok(())
    }

    /// The override to apply instead of a rule's own method, if any.
    pub fn active_override(&self) -> Option<&CommissionMethod> {
        (!self.override_method.is_none()).then_some(&self.override_method)
    }

    /// Applies the configured min/max limits to a computed amount.
    pub fn clamp(&self, amount: Decimal) -> Decimal {
        let mut clamped = amount;
        if let Some(min) = self.min_commission
            && clamped < min
        {
            clamped = min;
        }
        if let Some(max) = self.max_commission
            && clamped > max
        {
            clamped = max;
        }
        clamped
    }
}
