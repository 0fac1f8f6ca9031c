use crate::application::engine::CommissionEngine;
use crate::domain::band::BandSpec;
use crate::domain::context::OperationContext;
use crate::domain::ledger::{Company, Invoice, Payment, Salesperson};
use crate::domain::rule::Rule;
use crate::domain::salesperson::SalespersonConfig;
use crate::domain::UserId;
use crate::error::{CommissionError, Result};
use crate::infrastructure::currency::{RateQuote, RateTable};
use crate::infrastructure::in_memory::{InMemoryDirectory, InMemoryLedger};
use serde::Deserialize;
use std::io::Read;
use tracing::{debug, info};

/// A JSON snapshot of host data plus commission setup, as fed to the CLI.
///
/// Host records (companies, salespersons, payments, invoices, rates) go
/// straight into the in-memory adapters. Bands, rules and salesperson
/// configurations are registered through the engine so they are validated
/// like any other write.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub companies: Vec<Company>,
    pub salespersons: Vec<Salesperson>,
    pub bands: Vec<BandSpec>,
    pub rules: Vec<Rule>,
    pub configs: Vec<SalespersonConfig>,
    pub payments: Vec<Payment>,
    pub invoices: Vec<Invoice>,
    pub rates: Vec<RateQuote>,
}

impl Scenario {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }

    pub async fn load_host_data(
        &self,
        ledger: &InMemoryLedger,
        directory: &InMemoryDirectory,
        rates: &RateTable,
    ) -> Result<()> {
        for company in &self.companies {
            directory.add_company(company.clone()).await;
        }
        for salesperson in &self.salespersons {
            directory.add_salesperson(salesperson.clone()).await;
        }
        for invoice in &self.invoices {
            ledger.add_invoice(invoice.clone()).await;
        }
        for payment in &self.payments {
            ledger.add_payment(payment.clone()).await;
        }
        for quote in &self.rates {
            rates.add_quote(quote.clone()).await?;
        }
        info!(
            payments = self.payments.len(),
            invoices = self.invoices.len(),
            rates = self.rates.len(),
            "host data loaded"
        );
        Ok(())
    }

    /// Registers bands, then rules, then salesperson configurations. Records
    /// that already exist (a persistent store reused across runs) are kept
    /// as they are.
    pub async fn register_setup(&self, engine: &CommissionEngine, user: UserId) -> Result<()> {
        for spec in &self.bands {
            let ctx = OperationContext::new(spec.company, user);
            tolerate_existing(engine.register_band(&ctx, spec.clone()).await.map(|_| ()), &spec.code)?;
        }
        for rule in &self.rules {
            let ctx = OperationContext::new(rule.company, user);
            tolerate_existing(engine.register_rule(&ctx, rule.clone()).await.map(|_| ()), &rule.code)?;
        }
        for config in &self.configs {
            let ctx = OperationContext::new(config.company, user);
            engine.save_salesperson_config(&ctx, config.clone()).await?;
        }
        Ok(())
    }
}

fn tolerate_existing(result: Result<()>, code: &str) -> Result<()> {
    match result {
        Err(CommissionError::Conflict(msg)) => {
            debug!(code, reason = %msg, "already registered");
            Ok(())
        }
        other => other,
    }
}
