//! Domain layer: commission records, their invariants and state machines.
//!
//! Nothing in here performs I/O. Persistence and external lookups are reached
//! through the traits in [`ports`], which the application layer wires up.

pub mod band;
pub mod batch;
pub mod calculation;
pub mod context;
pub mod document;
pub mod event;
pub mod ledger;
pub mod money;
pub mod ports;
pub mod rule;
pub mod salesperson;
pub mod statistics;

pub type CompanyId = u32;
pub type UserId = u32;
pub type TeamId = u32;
pub type PartnerId = u32;
pub type ProductId = u32;
pub type CategoryId = u32;
pub type PaymentTermId = u32;
pub type JournalId = u32;
pub type BandId = u32;
pub type RangeId = u32;
pub type RuleId = u32;
pub type PaymentId = u64;
pub type InvoiceId = u64;
pub type CalculationId = u64;
pub type BatchId = u64;
pub type DocumentId = u64;
