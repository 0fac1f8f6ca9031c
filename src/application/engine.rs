use super::locks::KeyedLocks;
use crate::config::CommissionSettings;
use crate::domain::batch::Batch;
use crate::domain::calculation::{Calculation, CalculationState};
use crate::domain::context::OperationContext;
use crate::domain::document::PaymentDocument;
use crate::domain::ledger::{Company, Payment};
use crate::domain::ports::{
    BandRepositoryBox, BatchRepositoryBox, CalculationRepositoryBox, CurrencyServiceBox,
    DirectoryBox, DocumentRepositoryBox, PaymentLedgerBox, RuleRepositoryBox,
    SalespersonConfigRepositoryBox,
};
use crate::domain::{BatchId, CalculationId, CompanyId, DocumentId, InvoiceId, PaymentId};
use crate::error::{CommissionError, Result};
use serde::Serialize;
use tracing::{info, warn};

/// Everything the engine talks to.
pub struct EnginePorts {
    pub ledger: PaymentLedgerBox,
    pub directory: DirectoryBox,
    pub currency: CurrencyServiceBox,
    pub bands: BandRepositoryBox,
    pub rules: RuleRepositoryBox,
    pub configs: SalespersonConfigRepositoryBox,
    pub calculations: CalculationRepositoryBox,
    pub batches: BatchRepositoryBox,
    pub documents: DocumentRepositoryBox,
}

/// The main entry point of the commission engine.
///
/// `CommissionEngine` owns the ports and exposes every operation: the payment
/// trigger, the calculation lifecycle, batches and payment documents. Every
/// operation takes an [`OperationContext`] and only sees records of the
/// context's company.
pub struct CommissionEngine {
    pub(crate) settings: CommissionSettings,
    pub(crate) ports: EnginePorts,
    pub(crate) pair_locks: KeyedLocks<(PaymentId, InvoiceId)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub id: u64,
    pub error: String,
}

/// Result of a scheduler entry point. One failing item never stops the sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub changed: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl CommissionEngine {
    pub fn new(settings: CommissionSettings, ports: EnginePorts) -> Self {
        Self {
            settings,
            ports,
            pair_locks: KeyedLocks::new(),
        }
    }

    pub fn settings(&self) -> &CommissionSettings {
        &self.settings
    }

    pub fn ports(&self) -> &EnginePorts {
        &self.ports
    }

    /// Runs the trigger for every settled payment of the company that has no
    /// active calculation yet.
    pub async fn process_pending_payments(&self, ctx: &OperationContext) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for payment in self.ports.ledger.commissionable_payments(ctx.company).await? {
            let existing = match self.ports.calculations.find_for_payment(payment.id).await {
                Ok(existing) => existing,
                Err(e) => {
                    report.examined += 1;
                    warn!(payment = %payment.label(), error = %e, "could not load payment calculations");
                    report.failures.push(SweepFailure {
                        id: payment.id,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            if existing.iter().any(|c| c.state.is_active()) {
                continue;
            }
            report.examined += 1;
            match self.calculate_from_payment(ctx, payment.id).await {
                Ok(trigger) => report.changed += trigger.created().len(),
                Err(e) => {
                    warn!(payment = %payment.label(), error = %e, "commission trigger failed");
                    report.failures.push(SweepFailure {
                        id: payment.id,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            examined = report.examined,
            created = report.changed,
            failed = report.failures.len(),
            "processed pending payments"
        );
        Ok(report)
    }

    /// Validates every calculated commission of the company whose payment is
    /// reconciled.
    pub async fn auto_validate_calculated(&self, ctx: &OperationContext) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let calculated = self
            .ports
            .calculations
            .find_by_state(ctx.company, CalculationState::Calculated)
            .await?;
        for calculation in calculated {
            let reconciled = match self.ports.ledger.payment(calculation.payment).await {
                Ok(payment) => payment.is_some_and(|p| p.reconciled),
                Err(e) => {
                    report.examined += 1;
                    warn!(calculation = calculation.id, error = %e, "could not load commission payment");
                    report.failures.push(SweepFailure {
                        id: calculation.id,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            if !reconciled {
                continue;
            }
            report.examined += 1;
            match self.validate_calculation(ctx, calculation.id).await {
                Ok(_) => report.changed += 1,
                Err(e) => {
                    warn!(calculation = calculation.id, error = %e, "could not validate commission");
                    report.failures.push(SweepFailure {
                        id: calculation.id,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            examined = report.examined,
            validated = report.changed,
            failed = report.failures.len(),
            "validated calculated commissions"
        );
        Ok(report)
    }

    pub async fn calculations(&self, ctx: &OperationContext) -> Result<Vec<Calculation>> {
        self.ports.calculations.list(ctx.company).await
    }

    pub async fn batches(&self, ctx: &OperationContext) -> Result<Vec<Batch>> {
        self.ports.batches.list(ctx.company).await
    }

    pub(crate) async fn load_payment(&self, ctx: &OperationContext, id: PaymentId) -> Result<Payment> {
        self.ports
            .ledger
            .payment(id)
            .await?
            .filter(|p| p.company == ctx.company)
            .ok_or_else(|| CommissionError::not_found(format!("payment {}", id)))
    }

    pub(crate) async fn load_company(&self, id: CompanyId) -> Result<Company> {
        self.ports
            .directory
            .company(id)
            .await?
            .ok_or_else(|| CommissionError::not_found(format!("company {}", id)))
    }

    pub async fn calculation(&self, ctx: &OperationContext, id: CalculationId) -> Result<Calculation> {
        self.ports
            .calculations
            .get(id)
            .await?
            .filter(|c| c.company == ctx.company)
            .ok_or_else(|| CommissionError::not_found(format!("calculation {}", id)))
    }

    pub async fn batch(&self, ctx: &OperationContext, id: BatchId) -> Result<Batch> {
        self.ports
            .batches
            .get(id)
            .await?
            .filter(|b| b.company == ctx.company)
            .ok_or_else(|| CommissionError::not_found(format!("batch {}", id)))
    }

    pub async fn document(&self, ctx: &OperationContext, id: DocumentId) -> Result<PaymentDocument> {
        self.ports
            .documents
            .get(id)
            .await?
            .filter(|d| d.company == ctx.company)
            .ok_or_else(|| CommissionError::not_found(format!("payment document {}", id)))
    }
}
