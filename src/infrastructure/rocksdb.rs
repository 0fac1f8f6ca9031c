use crate::domain::band::Band;
use crate::domain::batch::{validate_window, Batch, NewBatch};
use crate::domain::calculation::{Calculation, CalculationState, NewCalculation};
use crate::domain::document::{NewDocument, PaymentDocument};
use crate::domain::ports::{
    BandRepository, BatchRepository, CalculationRepository, DocumentRepository, RuleRepository,
    SalespersonConfigRepository,
};
use crate::domain::rule::Rule;
use crate::domain::salesperson::SalespersonConfig;
use crate::domain::{
    BandId, BatchId, CalculationId, CompanyId, DocumentId, InvoiceId, PaymentId, RuleId, UserId,
};
use crate::error::{CommissionError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const CF_BANDS: &str = "bands";
pub const CF_RULES: &str = "rules";
pub const CF_CONFIGS: &str = "salesperson_configs";
pub const CF_CALCULATIONS: &str = "calculations";
pub const CF_BATCHES: &str = "batches";
pub const CF_DOCUMENTS: &str = "documents";
/// Id counters and document sequences.
pub const CF_META: &str = "meta";

const COLUMN_FAMILIES: [&str; 7] = [
    CF_BANDS,
    CF_RULES,
    CF_CONFIGS,
    CF_CALCULATIONS,
    CF_BATCHES,
    CF_DOCUMENTS,
    CF_META,
];

/// A persistent store implementation using RocksDB.
///
/// Every record type lives in its own column family as JSON. Writes that must
/// check an invariant first (uniqueness, batch overlap, claiming) are
/// serialised through one async mutex.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            CommissionError::InternalError(Box::new(std::io::Error::other(format!(
                "Column family '{}' not found",
                name
            ))))
        })
    }

    fn put<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let handle = self.cf(cf)?;
        self.db.put_cf(handle, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn load<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let handle = self.cf(cf)?;
        match self.db.get_cf(handle, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let handle = self.cf(cf)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn next_counter(&self, key: &str) -> Result<u64> {
        let next = self.load::<u64>(CF_META, key.as_bytes())?.unwrap_or(0) + 1;
        self.put(CF_META, key.as_bytes(), &next)?;
        Ok(next)
    }

    fn remove(&self, cf: &str, key: &[u8]) -> Result<()> {
        let handle = self.cf(cf)?;
        self.db.delete_cf(handle, key)?;
        Ok(())
    }
}

fn config_key(salesperson: UserId, company: CompanyId) -> [u8; 8] {
    let mut key = [0u8; 8];
    key[..4].copy_from_slice(&company.to_be_bytes());
    key[4..].copy_from_slice(&salesperson.to_be_bytes());
    key
}

#[async_trait]
impl BandRepository for RocksDBStore {
    async fn insert(&self, band: Band) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let existing: Vec<Band> = self.scan(CF_BANDS)?;
        if existing
            .iter()
            .any(|b| b.id() == band.id() || (b.company() == band.company() && b.code() == band.code()))
        {
            return Err(CommissionError::conflict(format!(
                "Band {} ('{}') already exists",
                band.id(),
                band.code()
            )));
        }
        self.put(CF_BANDS, &band.id().to_be_bytes(), &band)
    }

    async fn update(&self, band: Band) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.load::<Band>(CF_BANDS, &band.id().to_be_bytes())?.is_none() {
            return Err(CommissionError::not_found(format!("band {}", band.id())));
        }
        self.put(CF_BANDS, &band.id().to_be_bytes(), &band)
    }

    async fn get(&self, id: BandId) -> Result<Option<Band>> {
        self.load(CF_BANDS, &id.to_be_bytes())
    }

    async fn list(&self, company: CompanyId) -> Result<Vec<Band>> {
        let bands: Vec<Band> = self.scan(CF_BANDS)?;
        Ok(bands.into_iter().filter(|b| b.company() == company).collect())
    }
}

#[async_trait]
impl RuleRepository for RocksDBStore {
    async fn insert(&self, rule: Rule) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let existing: Vec<Rule> = self.scan(CF_RULES)?;
        if existing
            .iter()
            .any(|r| r.id == rule.id || (r.company == rule.company && r.code == rule.code))
        {
            return Err(CommissionError::conflict(format!(
                "Rule {} ('{}') already exists",
                rule.id, rule.code
            )));
        }
        self.put(CF_RULES, &rule.id.to_be_bytes(), &rule)
    }

    async fn update(&self, rule: Rule) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let existing: Vec<Rule> = self.scan(CF_RULES)?;
        if !existing.iter().any(|r| r.id == rule.id) {
            return Err(CommissionError::not_found(format!("rule {}", rule.id)));
        }
        if existing
            .iter()
            .any(|r| r.id != rule.id && r.company == rule.company && r.code == rule.code)
        {
            return Err(CommissionError::conflict(format!(
                "Rule code '{}' must be unique per company",
                rule.code
            )));
        }
        self.put(CF_RULES, &rule.id.to_be_bytes(), &rule)
    }

    async fn get(&self, id: RuleId) -> Result<Option<Rule>> {
        self.load(CF_RULES, &id.to_be_bytes())
    }

    async fn delete(&self, id: RuleId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.load::<Rule>(CF_RULES, &id.to_be_bytes())?.is_none() {
            return Err(CommissionError::not_found(format!("rule {}", id)));
        }
        self.remove(CF_RULES, &id.to_be_bytes())
    }

    async fn active_for_company(&self, company: CompanyId) -> Result<Vec<Rule>> {
        let rules: Vec<Rule> = self.scan(CF_RULES)?;
        Ok(rules
            .into_iter()
            .filter(|r| r.active && r.company == company)
            .collect())
    }
}

#[async_trait]
impl SalespersonConfigRepository for RocksDBStore {
    async fn upsert(&self, config: SalespersonConfig) -> Result<()> {
        self.put(CF_CONFIGS, &config_key(config.salesperson, config.company), &config)
    }

    async fn get(&self, salesperson: UserId, company: CompanyId) -> Result<Option<SalespersonConfig>> {
        self.load(CF_CONFIGS, &config_key(salesperson, company))
    }
}

impl RocksDBStore {
    fn calculations_where(&self, keep: impl Fn(&Calculation) -> bool) -> Result<Vec<Calculation>> {
        let all: Vec<Calculation> = self.scan(CF_CALCULATIONS)?;
        Ok(all.into_iter().filter(|c| keep(c)).collect())
    }

    fn write_calculations(&self, calculations: &[Calculation]) -> Result<()> {
        let handle = self.cf(CF_CALCULATIONS)?;
        let mut batch = WriteBatch::default();
        for calculation in calculations {
            batch.put_cf(handle, calculation.id.to_be_bytes(), serde_json::to_vec(calculation)?);
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl CalculationRepository for RocksDBStore {
    async fn insert(&self, new: NewCalculation) -> Result<Calculation> {
        let _guard = self.write_lock.lock().await;
        if new.state.is_active()
            && !self
                .calculations_where(|c| c.payment == new.payment && c.invoice == new.invoice && c.state.is_active())?
                .is_empty()
        {
            return Err(CommissionError::conflict(format!(
                "An active commission already exists for payment {} and invoice {}",
                new.payment, new.invoice
            )));
        }
        let calculation = Calculation::create(self.next_counter("calculation_id")?, new)?;
        self.write_calculations(std::slice::from_ref(&calculation))?;
        Ok(calculation)
    }

    async fn update(&self, calculation: Calculation) -> Result<()> {
        self.update_many(vec![calculation]).await
    }

    async fn update_many(&self, calculations: Vec<Calculation>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        for calculation in &calculations {
            if self
                .load::<Calculation>(CF_CALCULATIONS, &calculation.id.to_be_bytes())?
                .is_none()
            {
                return Err(CommissionError::not_found(format!("calculation {}", calculation.id)));
            }
        }
        self.write_calculations(&calculations)
    }

    async fn get(&self, id: CalculationId) -> Result<Option<Calculation>> {
        self.load(CF_CALCULATIONS, &id.to_be_bytes())
    }

    async fn find_active_for_pair(&self, payment: PaymentId, invoice: InvoiceId) -> Result<Option<Calculation>> {
        Ok(self
            .calculations_where(|c| c.payment == payment && c.invoice == invoice && c.state.is_active())?
            .into_iter()
            .next())
    }

    async fn find_for_payment(&self, payment: PaymentId) -> Result<Vec<Calculation>> {
        self.calculations_where(|c| c.payment == payment)
    }

    async fn find_for_batch(&self, batch: BatchId) -> Result<Vec<Calculation>> {
        self.calculations_where(|c| c.batch == Some(batch))
    }

    async fn find_by_state(&self, company: CompanyId, state: CalculationState) -> Result<Vec<Calculation>> {
        self.calculations_where(|c| c.company == company && c.state == state)
    }

    async fn exists_for_rule(&self, rule: RuleId) -> Result<bool> {
        Ok(!self.calculations_where(|c| c.rule == Some(rule))?.is_empty())
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
        let _guard = self.write_lock.lock().await;
        let mut claimed = self.calculations_where(|c| {
            c.company == company
                && c.batch.is_none()
                && c.state.is_active()
                && c.payment_date >= date_from
                && c.payment_date <= date_to
        })?;
        for calculation in &mut claimed {
            calculation.assign_to_batch(batch, actor, at);
        }
        self.write_calculations(&claimed)?;
        Ok(claimed)
    }

    async fn list(&self, company: CompanyId) -> Result<Vec<Calculation>> {
        self.calculations_where(|c| c.company == company)
    }
}

fn overlap_conflict(existing: &Batch) -> CommissionError {
    CommissionError::conflict(format!(
        "Commission batch '{}' already covers part of this period ({} to {})",
        existing.name, existing.date_from, existing.date_to
    ))
}

#[async_trait]
impl BatchRepository for RocksDBStore {
    async fn insert(&self, new: NewBatch) -> Result<Batch> {
        validate_window(new.date_from, new.date_to)?;
        let _guard = self.write_lock.lock().await;
        let batches: Vec<Batch> = self.scan(CF_BATCHES)?;
        if let Some(existing) = batches
            .iter()
            .find(|b| b.company == new.company && b.overlaps(new.date_from, new.date_to))
        {
            return Err(overlap_conflict(existing));
        }
        let batch = Batch::create(self.next_counter("batch_id")?, new)?;
        self.put(CF_BATCHES, &batch.id.to_be_bytes(), &batch)?;
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
        let _guard = self.write_lock.lock().await;
        let batches: Vec<Batch> = self.scan(CF_BATCHES)?;
        let mut batch = batches
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| CommissionError::not_found(format!("batch {}", id)))?;
        batch.set_window(date_from, date_to, actor, at)?;
        if let Some(existing) = batches
            .iter()
            .find(|b| b.id != id && b.company == batch.company && b.overlaps(date_from, date_to))
        {
            return Err(overlap_conflict(existing));
        }
        self.put(CF_BATCHES, &id.to_be_bytes(), &batch)?;
        Ok(batch)
    }

    async fn update(&self, batch: Batch) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.load::<Batch>(CF_BATCHES, &batch.id.to_be_bytes())?.is_none() {
            return Err(CommissionError::not_found(format!("batch {}", batch.id)));
        }
        self.put(CF_BATCHES, &batch.id.to_be_bytes(), &batch)
    }

    async fn get(&self, id: BatchId) -> Result<Option<Batch>> {
        self.load(CF_BATCHES, &id.to_be_bytes())
    }

    async fn find_overlapping(&self, company: CompanyId, date_from: NaiveDate, date_to: NaiveDate) -> Result<Vec<Batch>> {
        let batches: Vec<Batch> = self.scan(CF_BATCHES)?;
        Ok(batches
            .into_iter()
            .filter(|b| b.company == company && b.overlaps(date_from, date_to))
            .collect())
    }

    async fn list(&self, company: CompanyId) -> Result<Vec<Batch>> {
        let batches: Vec<Batch> = self.scan(CF_BATCHES)?;
        Ok(batches.into_iter().filter(|b| b.company == company).collect())
    }
}

#[async_trait]
impl DocumentRepository for RocksDBStore {
    async fn next_sequence(&self, company: CompanyId, year: i32) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        self.next_counter(&format!("document_sequence/{}/{}", company, year))
    }

    async fn insert(&self, new: NewDocument) -> Result<PaymentDocument> {
        let _guard = self.write_lock.lock().await;
        let documents: Vec<PaymentDocument> = self.scan(CF_DOCUMENTS)?;
        if documents.iter().any(|d| d.batch == new.batch) {
            return Err(CommissionError::conflict(format!(
                "Batch {} already has a payment document",
                new.batch
            )));
        }
        let document = PaymentDocument::create(self.next_counter("document_id")?, new)?;
        self.put(CF_DOCUMENTS, &document.id.to_be_bytes(), &document)?;
        Ok(document)
    }

    async fn update(&self, document: PaymentDocument) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self
            .load::<PaymentDocument>(CF_DOCUMENTS, &document.id.to_be_bytes())?
            .is_none()
        {
            return Err(CommissionError::not_found(format!("payment document {}", document.id)));
        }
        self.put(CF_DOCUMENTS, &document.id.to_be_bytes(), &document)
    }

    async fn get(&self, id: DocumentId) -> Result<Option<PaymentDocument>> {
        self.load(CF_DOCUMENTS, &id.to_be_bytes())
    }

    async fn delete(&self, id: DocumentId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.remove(CF_DOCUMENTS, &id.to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calculation::tests::new_calculation;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_calculations_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            let created = CalculationRepository::insert(&store, new_calculation(dec!(28))).await.unwrap();
            assert_eq!(created.id, 1);
            assert!(CalculationRepository::insert(&store, new_calculation(dec!(28))).await.is_err());
        }
        let store = RocksDBStore::open(dir.path()).unwrap();
        let loaded = CalculationRepository::get(&store, 1).await.unwrap().unwrap();
        assert_eq!(loaded.commission_amount, dec!(28));
        assert_eq!(store.next_counter("calculation_id").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_batch_overlap_rejected() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let new = |from: &str, to: &str| NewBatch {
            company: 1,
            name: "b".into(),
            date_from: from.parse().unwrap(),
            date_to: to.parse().unwrap(),
            payment_date: None,
            created_by: 1,
            created_at: Utc::now(),
        };
        BatchRepository::insert(&store, new("2024-01-01", "2024-01-31")).await.unwrap();
        let overlap = BatchRepository::insert(&store, new("2024-01-15", "2024-02-15")).await;
        assert!(matches!(overlap, Err(CommissionError::Conflict(_))));
    }
}
