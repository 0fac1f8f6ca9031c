use crate::domain::band::Band;
use crate::domain::batch::{validate_window, Batch, NewBatch};
use crate::domain::calculation::{Calculation, CalculationState, NewCalculation};
use crate::domain::document::{NewDocument, PaymentDocument};
use crate::domain::ledger::{Company, Invoice, Payment, Salesperson};
use crate::domain::ports::{
    BandRepository, BatchRepository, CalculationRepository, Directory, DocumentRepository,
    PaymentLedger, RuleRepository, SalespersonConfigRepository,
};
use crate::domain::rule::Rule;
use crate::domain::salesperson::SalespersonConfig;
use crate::domain::{
    BandId, BatchId, CalculationId, CompanyId, DocumentId, InvoiceId, PaymentId, RuleId, UserId,
};
use crate::error::{CommissionError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Payments and invoices held in memory, standing in for the host ledger.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
    invoices: Arc<RwLock<HashMap<InvoiceId, Invoice>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_payment(&self, payment: Payment) {
        self.payments.write().await.insert(payment.id, payment);
    }

    pub async fn add_invoice(&self, invoice: Invoice) {
        self.invoices.write().await.insert(invoice.id, invoice);
    }
}

#[async_trait]
impl PaymentLedger for InMemoryLedger {
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(&id).cloned())
    }

    async fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        Ok(self.invoices.read().await.get(&id).cloned())
    }

    async fn commissionable_payments(&self, company: CompanyId) -> Result<Vec<Payment>> {
        let payments = self.payments.read().await;
        let mut found: Vec<Payment> = payments
            .values()
            .filter(|p| p.company == company && p.is_commissionable())
            .cloned()
            .collect();
        found.sort_by_key(|p| (p.date, p.id));
        Ok(found)
    }
}

/// Salespersons and companies held in memory.
#[derive(Default, Clone)]
pub struct InMemoryDirectory {
    salespersons: Arc<RwLock<HashMap<UserId, Salesperson>>>,
    companies: Arc<RwLock<HashMap<CompanyId, Company>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_salesperson(&self, salesperson: Salesperson) {
        self.salespersons.write().await.insert(salesperson.id, salesperson);
    }

    pub async fn add_company(&self, company: Company) {
        self.companies.write().await.insert(company.id, company);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn salesperson(&self, id: UserId) -> Result<Option<Salesperson>> {
        Ok(self.salespersons.read().await.get(&id).cloned())
    }

    async fn company(&self, id: CompanyId) -> Result<Option<Company>> {
        Ok(self.companies.read().await.get(&id).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryBandRepository {
    bands: Arc<RwLock<BTreeMap<BandId, Band>>>,
}

impl InMemoryBandRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BandRepository for InMemoryBandRepository {
    async fn insert(&self, band: Band) -> Result<()> {
        let mut bands = self.bands.write().await;
        if bands.contains_key(&band.id()) {
            return Err(CommissionError::conflict(format!("Band {} already exists", band.id())));
        }
        if bands
            .values()
            .any(|b| b.company() == band.company() && b.code() == band.code())
        {
            return Err(CommissionError::conflict(format!(
                "Band code '{}' must be unique per company",
                band.code()
            )));
        }
        bands.insert(band.id(), band);
        Ok(())
    }

    async fn update(&self, band: Band) -> Result<()> {
        let mut bands = self.bands.write().await;
        match bands.get_mut(&band.id()) {
            Some(slot) => {
                *slot = band;
                Ok(())
            }
            None => Err(CommissionError::not_found(format!("band {}", band.id()))),
        }
    }

    async fn get(&self, id: BandId) -> Result<Option<Band>> {
        Ok(self.bands.read().await.get(&id).cloned())
    }

    async fn list(&self, company: CompanyId) -> Result<Vec<Band>> {
        let bands = self.bands.read().await;
        Ok(bands.values().filter(|b| b.company() == company).cloned().collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryRuleRepository {
    rules: Arc<RwLock<BTreeMap<RuleId, Rule>>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn insert(&self, rule: Rule) -> Result<()> {
        let mut rules = self.rules.write().await;
        if rules.contains_key(&rule.id) {
            return Err(CommissionError::conflict(format!("Rule {} already exists", rule.id)));
        }
        if rules
            .values()
            .any(|r| r.company == rule.company && r.code == rule.code)
        {
            return Err(CommissionError::conflict(format!(
                "Rule code '{}' must be unique per company",
                rule.code
            )));
        }
        rules.insert(rule.id, rule);
        Ok(())
    }

    async fn update(&self, rule: Rule) -> Result<()> {
        let mut rules = self.rules.write().await;
        if rules
            .values()
            .any(|r| r.id != rule.id && r.company == rule.company && r.code == rule.code)
        {
            return Err(CommissionError::conflict(format!(
                "Rule code '{}' must be unique per company",
                rule.code
            )));
        }
        match rules.get_mut(&rule.id) {
            Some(slot) => {
                *slot = rule;
                Ok(())
            }
            None => Err(CommissionError::not_found(format!("rule {}", rule.id))),
        }
    }

    async fn get(&self, id: RuleId) -> Result<Option<Rule>> {
        Ok(self.rules.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: RuleId) -> Result<()> {
        self.rules
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CommissionError::not_found(format!("rule {}", id)))
    }

    async fn active_for_company(&self, company: CompanyId) -> Result<Vec<Rule>> {
        let rules = self.rules.read().await;
        Ok(rules
            .values()
            .filter(|r| r.active && r.company == company)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemorySalespersonConfigRepository {
    configs: Arc<RwLock<HashMap<(UserId, CompanyId), SalespersonConfig>>>,
}

impl InMemorySalespersonConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SalespersonConfigRepository for InMemorySalespersonConfigRepository {
    async fn upsert(&self, config: SalespersonConfig) -> Result<()> {
        let mut configs = self.configs.write().await;
        configs.insert((config.salesperson, config.company), config);
        Ok(())
    }

    async fn get(&self, salesperson: UserId, company: CompanyId) -> Result<Option<SalespersonConfig>> {
        Ok(self.configs.read().await.get(&(salesperson, company)).cloned())
    }
}

#[derive(Default)]
struct CalculationTable {
    last_id: CalculationId,
    rows: BTreeMap<CalculationId, Calculation>,
}

/// Calculations held in memory.
///
/// The uniqueness check on insert and the batch claim each run under a
/// single write lock.
#[derive(Default, Clone)]
pub struct InMemoryCalculationRepository {
    table: Arc<RwLock<CalculationTable>>,
}

impl InMemoryCalculationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalculationRepository for InMemoryCalculationRepository {
    async fn insert(&self, new: NewCalculation) -> Result<Calculation> {
        let mut table = self.table.write().await;
        if new.state.is_active()
            && table
                .rows
                .values()
                .any(|c| c.payment == new.payment && c.invoice == new.invoice && c.state.is_active())
        {
            return Err(CommissionError::conflict(format!(
                "An active commission already exists for payment {} and invoice {}",
                new.payment, new.invoice
            )));
        }
        let calculation = Calculation::create(table.last_id + 1, new)?;
        table.last_id = calculation.id;
        table.rows.insert(calculation.id, calculation.clone());
        Ok(calculation)
    }

    async fn update(&self, calculation: Calculation) -> Result<()> {
        self.update_many(vec![calculation]).await
    }

    async fn update_many(&self, calculations: Vec<Calculation>) -> Result<()> {
        let mut table = self.table.write().await;
        if let Some(missing) = calculations.iter().find(|c| !table.rows.contains_key(&c.id)) {
            return Err(CommissionError::not_found(format!("calculation {}", missing.id)));
        }
        for calculation in calculations {
            table.rows.insert(calculation.id, calculation);
        }
        Ok(())
    }

    async fn get(&self, id: CalculationId) -> Result<Option<Calculation>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn find_active_for_pair(&self, payment: PaymentId, invoice: InvoiceId) -> Result<Option<Calculation>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|c| c.payment == payment && c.invoice == invoice && c.state.is_active())
            .cloned())
    }

    async fn find_for_payment(&self, payment: PaymentId) -> Result<Vec<Calculation>> {
        let table = self.table.read().await;
        Ok(table.rows.values().filter(|c| c.payment == payment).cloned().collect())
    }

    async fn find_for_batch(&self, batch: BatchId) -> Result<Vec<Calculation>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|c| c.batch == Some(batch))
            .cloned()
            .collect())
    }

    async fn find_by_state(&self, company: CompanyId, state: CalculationState) -> Result<Vec<Calculation>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|c| c.company == company && c.state == state)
            .cloned()
            .collect())
    }

    async fn exists_for_rule(&self, rule: RuleId) -> Result<bool> {
        let table = self.table.read().await;
        Ok(table.rows.values().any(|c| c.rule == Some(rule)))
    }

    async fn claim_unbatched_in_range(
        &self,
        company: CompanyId,
        batch: BatchId,
        date_from: NaiveDate,
        date_to: NaiveDate,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Vec<Calculation>> {
        let mut table = self.table.write().await;
        let mut claimed = Vec::new();
        for calculation in table.rows.values_mut() {
            if calculation.company == company
                && calculation.batch.is_none()
                && calculation.state.is_active()
                && calculation.payment_date >= date_from
                && calculation.payment_date <= date_to
            {
                calculation.assign_to_batch(batch, actor, at);
                claimed.push(calculation.clone());
            }
        }
        Ok(claimed)
    }

    async fn list(&self, company: CompanyId) -> Result<Vec<Calculation>> {
        let table = self.table.read().await;
        Ok(table.rows.values().filter(|c| c.company == company).cloned().collect())
    }
}

#[derive(Default)]
struct BatchTable {
    last_id: BatchId,
    rows: BTreeMap<BatchId, Batch>,
}

impl BatchTable {
    fn overlapping(&self, company: CompanyId, date_from: NaiveDate, date_to: NaiveDate, except: Option<BatchId>) -> Option<&Batch> {
        self.rows
            .values()
            .find(|b| b.company == company && Some(b.id) != except && b.overlaps(date_from, date_to))
    }
}

fn overlap_conflict(existing: &Batch) -> CommissionError {
    CommissionError::conflict(format!(
        "Commission batch '{}' already covers part of this period ({} to {})",
        existing.name, existing.date_from, existing.date_to
    ))
}

/// Batches held in memory. The overlap check and the write share one lock.
#[derive(Default, Clone)]
pub struct InMemoryBatchRepository {
    table: Arc<RwLock<BatchTable>>,
}

impl InMemoryBatchRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchRepository for InMemoryBatchRepository {
    async fn insert(&self, new: NewBatch) -> Result<Batch> {
        validate_window(new.date_from, new.date_to)?;
        let mut table = self.table.write().await;
        if let Some(existing) = table.overlapping(new.company, new.date_from, new.date_to, None) {
            return Err(overlap_conflict(existing));
        }
        let batch = Batch::create(table.last_id + 1, new)?;
        table.last_id = batch.id;
        table.rows.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn update_window(
        &self,
        id: BatchId,
        date_from: NaiveDate,
        date_to: NaiveDate,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Batch> {
        let mut table = self.table.write().await;
        let mut batch = table
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| CommissionError::not_found(format!("batch {}", id)))?;
        batch.set_window(date_from, date_to, actor, at)?;
        if let Some(existing) = table.overlapping(batch.company, date_from, date_to, Some(id)) {
            return Err(overlap_conflict(existing));
        }
        table.rows.insert(id, batch.clone());
        Ok(batch)
    }

    async fn update(&self, batch: Batch) -> Result<()> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&batch.id) {
            Some(slot) => {
                *slot = batch;
                Ok(())
            }
            None => Err(CommissionError::not_found(format!("batch {}", batch.id))),
        }
    }

    async fn get(&self, id: BatchId) -> Result<Option<Batch>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn find_overlapping(&self, company: CompanyId, date_from: NaiveDate, date_to: NaiveDate) -> Result<Vec<Batch>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|b| b.company == company && b.overlaps(date_from, date_to))
            .cloned()
            .collect())
    }

    async fn list(&self, company: CompanyId) -> Result<Vec<Batch>> {
        let table = self.table.read().await;
        Ok(table.rows.values().filter(|b| b.company == company).cloned().collect())
    }
}

#[derive(Default)]
struct DocumentTable {
    last_id: DocumentId,
    sequences: HashMap<(CompanyId, i32), u64>,
    rows: BTreeMap<DocumentId, PaymentDocument>,
}

#[derive(Default, Clone)]
pub struct InMemoryDocumentRepository {
    table: Arc<RwLock<DocumentTable>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn next_sequence(&self, company: CompanyId, year: i32) -> Result<u64> {
        let mut table = self.table.write().await;
        let next = table.sequences.entry((company, year)).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    async fn insert(&self, new: NewDocument) -> Result<PaymentDocument> {
        let mut table = self.table.write().await;
        if table.rows.values().any(|d| d.batch == new.batch) {
            return Err(CommissionError::conflict(format!(
                "Batch {} already has a payment document",
                new.batch
            )));
        }
        let document = PaymentDocument::create(table.last_id + 1, new)?;
        table.last_id = document.id;
        table.rows.insert(document.id, document.clone());
        Ok(document)
    }

    async fn update(&self, document: PaymentDocument) -> Result<()> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&document.id) {
            Some(slot) => {
                *slot = document;
                Ok(())
            }
            None => Err(CommissionError::not_found(format!("payment document {}", document.id))),
        }
    }

    async fn get(&self, id: DocumentId) -> Result<Option<PaymentDocument>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn delete(&self, id: DocumentId) -> Result<()> {
        self.table
            .write()
            .await
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CommissionError::not_found(format!("payment document {}", id)))
    }
}
