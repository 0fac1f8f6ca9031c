use super::calculation::Calculation;
use super::event::EventLog;
use super::{BatchId, CompanyId, DocumentId, UserId};
use crate::error::CommissionError;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Draft,
    Calculated,
    Reviewed,
    PaymentGenerated,
    Paid,
    Cancelled,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Calculated => "calculated",
            Self::Reviewed => "reviewed",
            Self::PaymentGenerated => "payment_generated",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub company: CompanyId,
    pub name: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

pub fn validate_window(date_from: NaiveDate, date_to: NaiveDate) -> Result<(), CommissionError> {
    if date_from > date_to {
        return Err(CommissionError::configuration(format!(
            "The start date {} must be before or equal to the end date {}",
            date_from, date_to
        )));
    }
    Ok(())
}

/// Window of the calendar month before `date`, and the payment date on
/// `payment_day` of `date`'s own month.
pub fn previous_month_window(date: NaiveDate, payment_day: u32) -> (NaiveDate, NaiveDate, NaiveDate) {
    let this_month = date.with_day(1).unwrap_or(date);
    let date_to = this_month.pred_opt().unwrap_or(this_month);
    let date_from = date_to.with_day(1).unwrap_or(date_to);
    let last_day = this_month
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .map_or(28, |d| d.day());
    let payment_date = this_month
        .with_day(payment_day.clamp(1, last_day))
        .unwrap_or(this_month);
    (date_from, date_to, payment_date)
}

/// A period-scoped grouping of calculations for review and payment.
///
/// Membership lives on the calculations (`Calculation::batch`); the batch only
/// tracks its own workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub company: CompanyId,
    pub name: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub state: BatchState,
    pub document: Option<DocumentId>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub events: EventLog,
}

impl Batch {
    pub fn create(id: BatchId, new: NewBatch) -> Result<Self, CommissionError> {
        validate_window(new.date_from, new.date_to)?;
        let mut events = EventLog::new();
        events.record_transition("create", "new", BatchState::Draft, new.created_by, new.created_at);
        Ok(Self {
            id,
            company: new.company,
            name: new.name,
            date_from: new.date_from,
            date_to: new.date_to,
            payment_date: new.payment_date,
            state: BatchState::Draft,
            document: None,
            reviewed_by: None,
            reviewed_at: None,
            notes: None,
            events,
        })
    }

    /// True if this batch takes part in the non-overlap rule and its window
    /// intersects `[date_from, date_to]`.
    pub fn overlaps(&self, date_from: NaiveDate, date_to: NaiveDate) -> bool {
        self.state != BatchState::Cancelled && self.date_from <= date_to && date_from <= self.date_to
    }

    fn transition(&mut self, action: &str, to: BatchState, actor: UserId, at: DateTime<Utc>) {
        let from = self.state;
        self.state = to;
        self.events.record_transition(action, from, to, actor, at);
    }

    pub fn ensure_state(&self, expected: BatchState, message: &str) -> Result<(), CommissionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CommissionError::guard(format!(
                "{} (batch '{}' is {})",
                message, self.name, self.state
            )))
        }
    }

    pub fn set_window(
        &mut self,
        date_from: NaiveDate,
        date_to: NaiveDate,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), CommissionError> {
        self.ensure_state(BatchState::Draft, "Only draft batches can change their period")?;
        validate_window(date_from, date_to)?;
        self.events.record_note(
            "reschedule",
            format!("period {}..{} -> {}..{}", self.date_from, self.date_to, date_from, date_to),
            actor,
            at,
        );
        self.date_from = date_from;
        self.date_to = date_to;
        Ok(())
    }

    pub fn set_payment_date(&mut self, payment_date: NaiveDate, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        if matches!(self.state, BatchState::PaymentGenerated | BatchState::Paid | BatchState::Cancelled) {
            return Err(CommissionError::guard(format!(
                "Cannot change the payment date of batch '{}' once it is {}",
                self.name, self.state
            )));
        }
        self.payment_date = Some(payment_date);
        self.events.record_note("payment_date", payment_date.to_string(), actor, at);
        Ok(())
    }

    /// `draft → calculated` once `claimed` calculations have been assigned.
    pub fn mark_calculated(&mut self, claimed: usize, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        self.ensure_state(BatchState::Draft, "Only draft batches can be calculated")?;
        if claimed == 0 {
            return Err(CommissionError::guard(format!(
                "No commission calculations found for the period {}..{}",
                self.date_from, self.date_to
            )));
        }
        self.transition("calculate", BatchState::Calculated, actor, at);
        self.events.record_note(
            "calculate",
            format!("Batch calculated with {} commission calculations", claimed),
            actor,
            at,
        );
        Ok(())
    }

    pub fn review(&mut self, calculation_count: usize, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        self.ensure_state(BatchState::Calculated, "Only calculated batches can be reviewed")?;
        if calculation_count == 0 {
            return Err(CommissionError::guard(format!(
                "Cannot review batch '{}' without calculations",
                self.name
            )));
        }
        self.reviewed_by = Some(actor);
        self.reviewed_at = Some(at);
        self.transition("review", BatchState::Reviewed, actor, at);
        Ok(())
    }

    /// Checks that a payment document may be generated; returns the payment
    /// date to value it at.
    pub fn payment_date_for_document(&self) -> Result<NaiveDate, CommissionError> {
        self.ensure_state(BatchState::Reviewed, "Only reviewed batches can generate payment documents")?;
        if self.document.is_some() {
            return Err(CommissionError::guard(format!(
                "Batch '{}' already has a payment document",
                self.name
            )));
        }
        self.payment_date.ok_or_else(|| {
            CommissionError::guard(format!(
                "Please set a payment date on batch '{}' before generating the payment document",
                self.name
            ))
        })
    }

    pub fn attach_document(&mut self, document: DocumentId, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        self.payment_date_for_document()?;
        self.document = Some(document);
        self.transition("generate_payment", BatchState::PaymentGenerated, actor, at);
        Ok(())
    }

    pub fn mark_paid(&mut self, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        self.ensure_state(
            BatchState::PaymentGenerated,
            "Only batches with payment documents can be marked as paid",
        )?;
        self.transition("pay", BatchState::Paid, actor, at);
        Ok(())
    }

    /// Back to `draft`. Returns the document that must be deleted, if any.
    pub fn reset_to_draft(&mut self, actor: UserId, at: DateTime<Utc>) -> Result<Option<DocumentId>, CommissionError> {
        if matches!(self.state, BatchState::Paid | BatchState::Cancelled) {
            return Err(CommissionError::guard(format!(
                "Cannot reset batch '{}' to draft: it is {}",
                self.name, self.state
            )));
        }
        self.reviewed_by = None;
        self.reviewed_at = None;
        self.transition("reset", BatchState::Draft, actor, at);
        Ok(self.document.take())
    }

    pub fn cancel(&mut self, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        if !matches!(self.state, BatchState::Draft | BatchState::Calculated | BatchState::Reviewed) {
            return Err(CommissionError::guard(format!(
                "Cannot cancel batch '{}' once it is {}",
                self.name, self.state
            )));
        }
        self.transition("cancel", BatchState::Cancelled, actor, at);
        Ok(())
    }
}

/// Per-currency totals of a batch's non-cancelled calculations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyBreakdown {
    pub currency: String,
    pub total_amount: Decimal,
    pub calculation_count: usize,
    pub salesperson_count: usize,
}

pub fn breakdown_by_currency(calculations: &[Calculation]) -> Vec<CurrencyBreakdown> {
    let mut grouped: BTreeMap<String, (Decimal, usize, BTreeSet<UserId>)> = BTreeMap::new();
    for calc in calculations.iter().filter(|c| c.state.is_active()) {
        let entry = grouped.entry(calc.currency.to_string()).or_default();
        entry.0 += calc.commission_amount;
        entry.1 += 1;
        entry.2.insert(calc.salesperson);
    }
    grouped
        .into_iter()
        .map(|(currency, (total_amount, calculation_count, people))| CurrencyBreakdown {
            currency,
            total_amount,
            calculation_count,
            salesperson_count: people.len(),
        })
        .collect()
}

/// Read-only rollup of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub id: BatchId,
    pub name: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub state: BatchState,
    pub calculation_count: usize,
    pub salesperson_count: usize,
    /// Primary-currency commissions plus every non-secondary currency
    /// converted into primary at each calculation's payment date.
    pub total_primary: Decimal,
    pub total_secondary: Decimal,
    pub document: Option<DocumentId>,
}
