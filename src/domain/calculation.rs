use super::batch::BatchState;
use super::event::EventLog;
use super::money::{Amount, CurrencyCode};
use super::salesperson::SalespersonConfig;
use super::{
    BandId, BatchId, CalculationId, CompanyId, InvoiceId, PartnerId, PaymentId, RangeId, RuleId,
    UserId,
};
use crate::error::CommissionError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationState {
    Draft,
    Calculated,
    Validated,
    Approved,
    Paid,
    Cancelled,
}

impl CalculationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Calculated => "calculated",
            Self::Validated => "validated",
            Self::Approved => "approved",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Counts towards the one-calculation-per-(payment, invoice) constraint.
    pub fn is_active(&self) -> bool {
        *self != Self::Cancelled
    }

    /// Validated or later, excluding cancellations.
    pub fn is_earned(&self) -> bool {
        matches!(self, Self::Validated | Self::Approved | Self::Paid)
    }

    /// Eligible for a payment document.
    pub fn is_payable(&self) -> bool {
        matches!(self, Self::Calculated | Self::Validated | Self::Approved)
    }
}

impl fmt::Display for CalculationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to record a freshly computed commission. The repository
/// assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCalculation {
    pub company: CompanyId,
    pub payment: PaymentId,
    pub invoice: InvoiceId,
    pub salesperson: UserId,
    pub customer: PartnerId,
    pub rule: Option<RuleId>,
    pub band: Option<BandId>,
    pub range: Option<RangeId>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub payment_date: NaiveDate,
    pub payment_amount: Amount,
    pub currency: CurrencyCode,
    /// Percentage.
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub company_currency: CurrencyCode,
    /// Payment currency → company currency, valued at `payment_date`.
    pub exchange_rate: Decimal,
    pub state: CalculationState,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Guard inputs for [`Calculation::validate`], gathered by the caller.
#[derive(Debug, Clone, Copy)]
pub struct ValidationCheck<'a> {
    pub payment_reconciled: bool,
    pub batch_state: Option<BatchState>,
    pub config: Option<&'a SalespersonConfig>,
}

/// One computed commission fact for a (payment, invoice, salesperson).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    pub id: CalculationId,
    pub company: CompanyId,
    pub payment: PaymentId,
    pub invoice: InvoiceId,
    pub salesperson: UserId,
    pub customer: PartnerId,
    pub rule: Option<RuleId>,
    pub band: Option<BandId>,
    pub range: Option<RangeId>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub payment_date: NaiveDate,
    pub days_overdue: i64,
    pub payment_amount: Amount,
    pub currency: CurrencyCode,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub company_currency: CurrencyCode,
    pub exchange_rate: Decimal,
    pub state: CalculationState,
    pub batch: Option<BatchId>,
    pub notes: Option<String>,
    pub events: EventLog,
}

pub fn days_between(due_date: NaiveDate, payment_date: NaiveDate) -> i64 {
    (payment_date - due_date).num_days()
}

impl Calculation {
    pub fn create(id: CalculationId, new: NewCalculation) -> Result<Self, CommissionError> {
        if new.commission_amount < Decimal::ZERO {
            return Err(CommissionError::validation("Commission amount cannot be negative"));
        }
        if new.exchange_rate <= Decimal::ZERO {
            return Err(CommissionError::validation("Exchange rate must be positive"));
        }
        let mut events = EventLog::new();
        events.record_transition("create", "new", new.state, new.created_by, new.created_at);
        Ok(Self {
            id,
            company: new.company,
            payment: new.payment,
            invoice: new.invoice,
            salesperson: new.salesperson,
            customer: new.customer,
            rule: new.rule,
            band: new.band,
            range: new.range,
            invoice_date: new.invoice_date,
            due_date: new.due_date,
            payment_date: new.payment_date,
            days_overdue: days_between(new.due_date, new.payment_date),
            payment_amount: new.payment_amount,
            currency: new.currency,
            commission_rate: new.commission_rate,
            commission_amount: new.commission_amount,
            company_currency: new.company_currency,
            exchange_rate: new.exchange_rate,
            state: new.state,
            batch: None,
            notes: None,
            events,
        })
    }

    pub fn payment_amount_company(&self) -> Decimal {
        self.payment_amount.value() * self.exchange_rate
    }

    pub fn commission_amount_company(&self) -> Decimal {
        self.commission_amount * self.exchange_rate
    }

    fn transition(&mut self, action: &str, to: CalculationState, actor: UserId, at: DateTime<Utc>) {
        let from = self.state;
        self.state = to;
        self.events.record_transition(action, from, to, actor, at);
    }

    fn require(&self, expected: CalculationState, message: &str) -> Result<(), CommissionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CommissionError::guard(format!(
                "{} (calculation {} is {})",
                message, self.id, self.state
            )))
        }
    }

    pub fn mark_calculated(&mut self, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        self.require(CalculationState::Draft, "Only draft commissions can be marked calculated")?;
        self.transition("calculate", CalculationState::Calculated, actor, at);
        Ok(())
    }

    /// Moves `calculated → validated`, applying the salesperson's limits.
    pub fn validate(
        &mut self,
        check: ValidationCheck<'_>,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), CommissionError> {
        self.require(CalculationState::Calculated, "Only calculated commissions can be validated")?;
        if let Some(state) = check.batch_state
            && !matches!(state, BatchState::Calculated | BatchState::Reviewed)
        {
            return Err(CommissionError::guard(format!(
                "Cannot validate commission in a batch that is {} (calculation {})",
                state, self.id
            )));
        }
        if !check.payment_reconciled {
            return Err(CommissionError::guard(format!(
                "Cannot validate commission for unreconciled payment {}",
                self.payment
            )));
        }
        if let Some(config) = check.config {
            if !config.commission_active {
                return Err(CommissionError::guard(format!(
                    "Commission is not active for salesperson {}",
                    self.salesperson
                )));
            }
            let clamped = config.clamp(self.commission_amount);
            if clamped != self.commission_amount {
                self.events.record_note(
                    "clamp",
                    format!("commission {} clamped to {}", self.commission_amount, clamped),
                    actor,
                    at,
                );
                self.commission_amount = clamped;
            }
        }
        self.transition("validate", CalculationState::Validated, actor, at);
        Ok(())
    }

    pub fn approve(&mut self, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        self.require(CalculationState::Validated, "Only validated commissions can be approved")?;
        self.transition("approve", CalculationState::Approved, actor, at);
        Ok(())
    }

    /// Approval performed by payment document generation, which also accepts
    /// commissions that were never validated.
    pub(crate) fn approve_for_payment(&mut self, actor: UserId, at: DateTime<Utc>) {
        if matches!(self.state, CalculationState::Calculated | CalculationState::Validated) {
            self.transition("approve", CalculationState::Approved, actor, at);
        }
    }

    pub fn mark_paid(&mut self, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        self.require(CalculationState::Approved, "Only approved commissions can be marked as paid")?;
        self.transition("pay", CalculationState::Paid, actor, at);
        Ok(())
    }

    pub fn cancel(&mut self, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        match self.state {
            CalculationState::Paid => Err(CommissionError::guard(format!(
                "Cannot cancel paid commission {}",
                self.id
            ))),
            CalculationState::Cancelled => Err(CommissionError::guard(format!(
                "Commission {} is already cancelled",
                self.id
            ))),
            _ => {
                self.transition("cancel", CalculationState::Cancelled, actor, at);
                Ok(())
            }
        }
    }

    pub fn reset_to_draft(&mut self, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        match self.state {
            CalculationState::Paid => Err(CommissionError::guard(format!(
                "Cannot reset paid commission {} to draft",
                self.id
            ))),
            CalculationState::Cancelled => Err(CommissionError::guard(format!(
                "Cannot reset cancelled commission {} to draft",
                self.id
            ))),
            _ => {
                self.transition("reset", CalculationState::Draft, actor, at);
                Ok(())
            }
        }
    }

    pub fn assign_to_batch(&mut self, batch: BatchId, actor: UserId, at: DateTime<Utc>) {
        self.batch = Some(batch);
        self.events.record_note("assign", format!("added to batch {}", batch), actor, at);
    }

    /// Clears the batch link unconditionally; used when the batch itself resets.
    pub fn detach_from_batch(&mut self, actor: UserId, at: DateTime<Utc>) {
        if let Some(batch) = self.batch.take() {
            self.events.record_note("detach", format!("removed from batch {}", batch), actor, at);
        }
    }

    /// User-initiated removal, refused once the batch has a payment document.
    pub fn remove_from_batch(
        &mut self,
        batch_state: Option<BatchState>,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), CommissionError> {
        if let Some(state) = batch_state
            && matches!(state, BatchState::PaymentGenerated | BatchState::Paid)
        {
            return Err(CommissionError::guard(format!(
                "Cannot remove calculation {} from a batch that is {}",
                self.id, state
            )));
        }
        self.detach_from_batch(actor, at);
        Ok(())
    }

    pub fn summary(&self) -> CalculationSummary {
        CalculationSummary {
            id: self.id,
            payment: self.payment,
            invoice: self.invoice,
            salesperson: self.salesperson,
            customer: self.customer,
            payment_date: self.payment_date,
            days_overdue: self.days_overdue,
            payment_amount: self.payment_amount.value(),
            currency: self.currency.to_string(),
            commission_rate: self.commission_rate,
            commission_amount: self.commission_amount,
            commission_amount_company: self.commission_amount_company(),
            state: self.state,
            rule: self
                .rule
                .map_or_else(|| "Direct".to_string(), |id| format!("rule #{}", id)),
            band: self.band,
            range: self.range,
            batch: self.batch,
        }
    }
}

/// Flat, read-only view of a calculation for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationSummary {
    pub id: CalculationId,
    pub payment: PaymentId,
    pub invoice: InvoiceId,
    pub salesperson: UserId,
    pub customer: PartnerId,
    pub payment_date: NaiveDate,
    pub days_overdue: i64,
    pub payment_amount: Decimal,
    pub currency: String,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub commission_amount_company: Decimal,
    pub state: CalculationState,
    pub rule: String,
    pub band: Option<BandId>,
    pub range: Option<RangeId>,
    pub batch: Option<BatchId>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn new_calculation(amount: Decimal) -> NewCalculation {
        NewCalculation {
            company: 1,
            payment: 1,
            invoice: 1,
            salesperson: 7,
            customer: 50,
            rule: Some(1),
            band: None,
            range: None,
            invoice_date: "2024-01-01".parse().unwrap(),
            due_date: "2024-01-10".parse().unwrap(),
            payment_date: "2024-01-12".parse().unwrap(),
            payment_amount: dec!(1000).try_into().unwrap(),
            currency: CurrencyCode::new("USD").unwrap(),
            commission_rate: dec!(3),
            commission_amount: amount,
            company_currency: CurrencyCode::new("USD").unwrap(),
            exchange_rate: Decimal::ONE,
            state: CalculationState::Calculated,
            created_by: 1,
            created_at: Utc::now(),
        }
    }

    fn calc(amount: Decimal) -> Calculation {
        Calculation::create(1, new_calculation(amount)).unwrap()
    }

    fn check(config: Option<&SalespersonConfig>) -> ValidationCheck<'_> {
        ValidationCheck {
            payment_reconciled: true,
            batch_state: None,
            config,
        }
    }

    #[test]
    fn test_create_derives_days_overdue() {
        let c = calc(dec!(30));
        assert_eq!(c.days_overdue, 2);
        assert_eq!(c.events.len(), 1);
        assert_eq!(days_between("2024-01-10".parse().unwrap(), "2024-01-01".parse().unwrap()), -9);
    }

    #[test]
    fn test_create_rejects_negative_commission() {
        assert!(matches!(
            Calculation::create(1, new_calculation(dec!(-1))),
            Err(CommissionError::Validation(_))
        ));
    }

    #[test]
    fn test_company_amounts_use_exchange_rate() {
        let mut new = new_calculation(dec!(30));
        new.exchange_rate = dec!(36.5);
        let c = Calculation::create(1, new).unwrap();
        assert_eq!(c.commission_amount_company(), dec!(1095.0));
        assert_eq!(c.payment_amount_company(), dec!(36500.0));
    }

    #[test]
    fn test_happy_path() {
        let mut c = calc(dec!(30));
        let now = Utc::now();
        c.validate(check(None), 1, now).unwrap();
        c.approve(1, now).unwrap();
        c.mark_paid(1, now).unwrap();
        assert_eq!(c.state, CalculationState::Paid);
        assert_eq!(c.events.len(), 4);
        assert!(c.cancel(1, now).is_err());
        assert!(c.reset_to_draft(1, now).is_err());
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = SalespersonConfig::new(7, 1);
        config.min_commission = Some(dec!(10));
        config.max_commission = Some(dec!(100));

        let mut low = calc(dec!(5));
        low.validate(check(Some(&config)), 1, Utc::now()).unwrap();
        assert_eq!(low.commission_amount, dec!(10));

        let mut high = calc(dec!(150));
        high.validate(check(Some(&config)), 1, Utc::now()).unwrap();
        assert_eq!(high.commission_amount, dec!(100));
        assert!(high.events.entries().iter().any(|e| e.action == "clamp"));
    }

    #[test]
    fn test_validate_guards() {
        let now = Utc::now();
        let mut draft = calc(dec!(5));
        draft.state = CalculationState::Draft;
        assert!(matches!(draft.validate(check(None), 1, now), Err(CommissionError::Guard(_))));

        let mut unreconciled = calc(dec!(5));
        let guard = ValidationCheck { payment_reconciled: false, ..check(None) };
        assert!(unreconciled.validate(guard, 1, now).is_err());
        assert_eq!(unreconciled.state, CalculationState::Calculated);

        let mut in_paid_batch = calc(dec!(5));
        let guard = ValidationCheck { batch_state: Some(BatchState::PaymentGenerated), ..check(None) };
        assert!(in_paid_batch.validate(guard, 1, now).is_err());

        let mut inactive = calc(dec!(5));
        let mut config = SalespersonConfig::new(7, 1);
        config.commission_active = false;
        config.min_commission = Some(dec!(10));
        assert!(inactive.validate(check(Some(&config)), 1, now).is_err());
        assert_eq!(inactive.commission_amount, dec!(5));
    }

    #[test]
    fn test_cancel_is_one_way() {
        let now = Utc::now();
        let mut c = calc(dec!(5));
        c.cancel(1, now).unwrap();
        assert!(c.cancel(1, now).is_err());
        assert!(c.reset_to_draft(1, now).is_err());
        assert!(c.mark_calculated(1, now).is_err());
        assert_eq!(c.state, CalculationState::Cancelled);
    }

    #[test]
    fn test_reset_then_recalculate() {
        let now = Utc::now();
        let mut c = calc(dec!(5));
        c.validate(check(None), 1, now).unwrap();
        c.reset_to_draft(1, now).unwrap();
        c.mark_calculated(1, now).unwrap();
        assert_eq!(c.state, CalculationState::Calculated);
    }

    #[test]
    fn test_remove_from_batch_guard() {
        let now = Utc::now();
        let mut c = calc(dec!(5));
        c.assign_to_batch(9, 1, now);
        assert!(c.remove_from_batch(Some(BatchState::Paid), 1, now).is_err());
        assert_eq!(c.batch, Some(9));
        c.remove_from_batch(Some(BatchState::Reviewed), 1, now).unwrap();
        assert_eq!(c.batch, None);
    }

    #[test]
    fn test_summary_labels_direct_calculations() {
        let mut new = new_calculation(dec!(5));
        new.rule = None;
        let c = Calculation::create(3, new).unwrap();
        assert_eq!(c.summary().rule, "Direct");
        assert_eq!(calc(dec!(5)).summary().rule, "rule #1");
    }
}
