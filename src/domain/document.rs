use super::event::EventLog;
use super::money::CurrencyCode;
use super::{BatchId, CalculationId, CompanyId, DocumentId, UserId};
use crate::error::CommissionError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Draft,
    Confirmed,
    Paid,
}

impl DocumentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Confirmed => "confirmed",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `COMM/<year>/<nnnn>`.
pub fn document_number(year: i32, sequence: u64) -> String {
    format!("COMM/{}/{:04}", year, sequence)
}

/// Payable amounts for one salesperson within a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLine {
    pub salesperson: UserId,
    pub calculations: Vec<CalculationId>,
    pub commission_count: usize,
    pub primary_original: Decimal,
    pub primary_payment: Decimal,
    pub secondary_original: Decimal,
    /// Secondary-currency commissions plus every other currency converted
    /// into the secondary currency.
    pub secondary_payment: Decimal,
    /// `primary_payment + secondary_payment` in company currency.
    pub total_payment: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub number: String,
    pub batch: BatchId,
    pub company: CompanyId,
    pub payment_date: NaiveDate,
    pub primary_currency: CurrencyCode,
    pub secondary_currency: CurrencyCode,
    pub exchange_rate: Decimal,
    pub lines: Vec<PaymentLine>,
    pub created_by: UserId,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDocument {
    pub id: DocumentId,
    pub number: String,
    pub batch: BatchId,
    pub company: CompanyId,
    pub payment_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub state: DocumentState,
    pub primary_currency: CurrencyCode,
    pub secondary_currency: CurrencyCode,
    /// Primary → secondary at `payment_date`.
    pub exchange_rate: Decimal,
    pub lines: Vec<PaymentLine>,
    pub events: EventLog,
}

impl PaymentDocument {
    pub fn create(id: DocumentId, new: NewDocument) -> Result<Self, CommissionError> {
        let salespersons: BTreeSet<UserId> = new.lines.iter().map(|l| l.salesperson).collect();
        if salespersons.len() != new.lines.len() {
            return Err(CommissionError::validation(
                "A payment document holds one line per salesperson",
            ));
        }
        let mut events = EventLog::new();
        events.record_transition("generate", "new", DocumentState::Draft, new.created_by, new.generated_at);
        Ok(Self {
            id,
            number: new.number,
            batch: new.batch,
            company: new.company,
            payment_date: new.payment_date,
            generated_at: new.generated_at,
            state: DocumentState::Draft,
            primary_currency: new.primary_currency,
            secondary_currency: new.secondary_currency,
            exchange_rate: new.exchange_rate,
            lines: new.lines,
            events,
        })
    }

    pub fn year(&self) -> i32 {
        self.payment_date.year()
    }

    fn transition(&mut self, action: &str, to: DocumentState, actor: UserId, at: DateTime<Utc>) {
        let from = self.state;
        self.state = to;
        self.events.record_transition(action, from, to, actor, at);
    }

    pub fn confirm(&mut self, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        if self.state != DocumentState::Draft {
            return Err(CommissionError::guard(format!(
                "Only draft documents can be confirmed ({} is {})",
                self.number, self.state
            )));
        }
        if self.lines.is_empty() {
            return Err(CommissionError::guard(format!(
                "Cannot confirm {} without payment lines",
                self.number
            )));
        }
        self.transition("confirm", DocumentState::Confirmed, actor, at);
        Ok(())
    }

    pub fn mark_paid(&mut self, actor: UserId, at: DateTime<Utc>) -> Result<(), CommissionError> {
        if self.state != DocumentState::Confirmed {
            return Err(CommissionError::guard(format!(
                "Only confirmed documents can be marked as paid ({} is {})",
                self.number, self.state
            )));
        }
        self.transition("pay", DocumentState::Paid, actor, at);
        Ok(())
    }

    /// Paid through its batch; skips the confirmation step.
    pub fn settle(&mut self, actor: UserId, at: DateTime<Utc>) {
        if self.state != DocumentState::Paid {
            self.transition("pay", DocumentState::Paid, actor, at);
        }
    }

    pub fn summary(&self) -> DocumentSummary {
        let sum = |f: fn(&PaymentLine) -> Decimal| self.lines.iter().map(f).sum::<Decimal>();
        DocumentSummary {
            id: self.id,
            number: self.number.clone(),
            batch: self.batch,
            payment_date: self.payment_date,
            state: self.state,
            exchange_rate: self.exchange_rate,
            line_count: self.lines.len(),
            salesperson_count: self.lines.len(),
            calculation_count: self.lines.iter().map(|l| l.commission_count).sum(),
            primary_currency: self.primary_currency.to_string(),
            secondary_currency: self.secondary_currency.to_string(),
            total_primary_original: sum(|l| l.primary_original),
            total_primary_payment: sum(|l| l.primary_payment),
            total_secondary_original: sum(|l| l.secondary_original),
            total_secondary_payment: sum(|l| l.secondary_payment),
            total_payment: sum(|l| l.total_payment),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub number: String,
    pub batch: BatchId,
    pub payment_date: NaiveDate,
    pub state: DocumentState,
    pub exchange_rate: Decimal,
    pub line_count: usize,
    pub salesperson_count: usize,
    pub calculation_count: usize,
    pub primary_currency: String,
    pub secondary_currency: String,
    pub total_primary_original: Decimal,
    pub total_primary_payment: Decimal,
    pub total_secondary_original: Decimal,
    pub total_secondary_payment: Decimal,
    pub total_payment: Decimal,
}
