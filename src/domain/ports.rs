//! Seams between the engine and everything it does not own.
//!
//! Repositories hold the engine's own records. The ledger, directory and
//! currency service belong to the host accounting system and are read-only.

use super::band::Band;
use super::batch::{Batch, NewBatch};
use super::calculation::{Calculation, CalculationState, NewCalculation};
use super::document::{NewDocument, PaymentDocument};
use super::ledger::{Company, Invoice, Payment, Salesperson};
use super::money::CurrencyCode;
use super::rule::Rule;
use super::salesperson::SalespersonConfig;
use super::{
    BandId, BatchId, CalculationId, CompanyId, DocumentId, InvoiceId, PaymentId, RuleId, UserId,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

#[async_trait]
pub trait PaymentLedger: Send + Sync {
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>>;
    /// Inbound, posted, reconciled payments of `company` not flagged to skip
    /// commission.
    async fn commissionable_payments(&self, company: CompanyId) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn salesperson(&self, id: UserId) -> Result<Option<Salesperson>>;
    async fn company(&self, id: CompanyId) -> Result<Option<Company>>;
}

#[async_trait]
pub trait CurrencyService: Send + Sync {
    /// Multiplier turning an amount in `from` into `to`, valued at `as_of`.
    async fn rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        company: CompanyId,
        as_of: NaiveDate,
    ) -> Result<Decimal>;

    async fn convert(
        &self,
        amount: Decimal,
        from: &CurrencyCode,
        to: &CurrencyCode,
        company: CompanyId,
        as_of: NaiveDate,
    ) -> Result<Decimal> {
        if from == to {
            return Ok(amount);
        }
        Ok(amount * self.rate(from, to, company, as_of).await?)
    }
}

#[async_trait]
pub trait BandRepository: Send + Sync {
    /// Fails with `Conflict` when the company already has a band with the
    /// same id or code.
    async fn insert(&self, band: Band) -> Result<()>;
    async fn update(&self, band: Band) -> Result<()>;
    async fn get(&self, id: BandId) -> Result<Option<Band>>;
    async fn list(&self, company: CompanyId) -> Result<Vec<Band>>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Fails with `Conflict` on a duplicate id or per-company code.
    async fn insert(&self, rule: Rule) -> Result<()>;
    async fn update(&self, rule: Rule) -> Result<()>;
    async fn get(&self, id: RuleId) -> Result<Option<Rule>>;
    async fn delete(&self, id: RuleId) -> Result<()>;
    /// Active rules of `company`, in no particular order.
    async fn active_for_company(&self, company: CompanyId) -> Result<Vec<Rule>>;
}

#[async_trait]
pub trait SalespersonConfigRepository: Send + Sync {
    async fn upsert(&self, config: SalespersonConfig) -> Result<()>;
    async fn get(&self, salesperson: UserId, company: CompanyId) -> Result<Option<SalespersonConfig>>;
}

#[async_trait]
pub trait CalculationRepository: Send + Sync {
    /// Assigns an id and stores the record. Fails with `Conflict` when a
    /// non-cancelled calculation already exists for the same
    /// (payment, invoice); the check and the write form one critical section.
    async fn insert(&self, new: NewCalculation) -> Result<Calculation>;
    async fn update(&self, calculation: Calculation) -> Result<()>;
    /// Writes every record or none of them.
    async fn update_many(&self, calculations: Vec<Calculation>) -> Result<()>;
    async fn get(&self, id: CalculationId) -> Result<Option<Calculation>>;
    async fn find_active_for_pair(&self, payment: PaymentId, invoice: InvoiceId) -> Result<Option<Calculation>>;
    async fn find_for_payment(&self, payment: PaymentId) -> Result<Vec<Calculation>>;
    async fn find_for_batch(&self, batch: BatchId) -> Result<Vec<Calculation>>;
    async fn find_by_state(&self, company: CompanyId, state: CalculationState) -> Result<Vec<Calculation>>;
    async fn exists_for_rule(&self, rule: RuleId) -> Result<bool>;
    /// Assigns `batch` to every non-cancelled, unbatched calculation of
    /// `company` whose payment date lies in `[date_from, date_to]`, atomically,
    /// and returns the claimed records.
    async fn claim_unbatched_in_range(
        &self,
        company: CompanyId,
        batch: BatchId,
        date_from: NaiveDate,
        date_to: NaiveDate,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Vec<Calculation>>;
    async fn list(&self, company: CompanyId) -> Result<Vec<Calculation>>;
}

#[async_trait]
pub trait BatchRepository: Send + Sync {
    /// Assigns an id and stores a draft batch. Fails with `Conflict` when a
    /// non-cancelled batch of the same company overlaps the window; the
    /// overlap check and the write form one critical section.
    async fn insert(&self, new: NewBatch) -> Result<Batch>;
    /// Changes a draft batch's window under the same overlap rule as `insert`.
    async fn update_window(
        &self,
        id: BatchId,
        date_from: NaiveDate,
        date_to: NaiveDate,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Batch>;
    async fn update(&self, batch: Batch) -> Result<()>;
    async fn get(&self, id: BatchId) -> Result<Option<Batch>>;
    async fn find_overlapping(
        &self,
        company: CompanyId,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Vec<Batch>>;
    async fn list(&self, company: CompanyId) -> Result<Vec<Batch>>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Next value of the per-company, per-year document sequence, starting at 1.
    async fn next_sequence(&self, company: CompanyId, year: i32) -> Result<u64>;
    async fn insert(&self, new: NewDocument) -> Result<PaymentDocument>;
    async fn update(&self, document: PaymentDocument) -> Result<()>;
    async fn get(&self, id: DocumentId) -> Result<Option<PaymentDocument>>;
    async fn delete(&self, id: DocumentId) -> Result<()>;
}

pub type PaymentLedgerBox = Box<dyn PaymentLedger>;
pub type DirectoryBox = Box<dyn Directory>;
pub type CurrencyServiceBox = Box<dyn CurrencyService>;
pub type BandRepositoryBox = Box<dyn BandRepository>;
pub type RuleRepositoryBox = Box<dyn RuleRepository>;
pub type SalespersonConfigRepositoryBox = Box<dyn SalespersonConfigRepository>;
pub type CalculationRepositoryBox = Box<dyn CalculationRepository>;
pub type BatchRepositoryBox = Box<dyn BatchRepository>;
pub type DocumentRepositoryBox = Box<dyn DocumentRepository>;
