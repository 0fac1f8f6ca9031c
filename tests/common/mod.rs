#![allow(dead_code)]

use chrono::NaiveDate;
use commission_band::application::engine::{CommissionEngine, EnginePorts};
use commission_band::config::CommissionSettings;
use commission_band::domain::band::{BandSpec, Range};
use commission_band::domain::context::OperationContext;
use commission_band::domain::ledger::{Company, Invoice, Payment, PaymentDirection, Salesperson};
use commission_band::domain::money::CurrencyCode;
use commission_band::domain::rule::{CommissionMethod, Rule};
use commission_band::domain::{BandId, InvoiceId, PaymentId, RuleId, UserId};
use commission_band::infrastructure::currency::{RateQuote, RateTable};
use commission_band::infrastructure::in_memory::{
    InMemoryBandRepository, InMemoryBatchRepository, InMemoryCalculationRepository,
    InMemoryDirectory, InMemoryDocumentRepository, InMemoryLedger, InMemoryRuleRepository,
    InMemorySalespersonConfigRepository,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const COMPANY: u32 = 1;
pub const ANA: UserId = 7;
pub const LUIS: UserId = 8;

/// An engine over in-memory adapters, plus handles to seed host data.
pub struct Fixture {
    pub engine: CommissionEngine,
    pub ledger: InMemoryLedger,
    pub directory: InMemoryDirectory,
    pub rates: RateTable,
    pub ctx: OperationContext,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_settings(CommissionSettings::default()).await
    }

    pub async fn with_settings(settings: CommissionSettings) -> Self {
        let ledger = InMemoryLedger::new();
        let directory = InMemoryDirectory::new();
        let rates = RateTable::new();

        directory
            .add_company(Company {
                id: COMPANY,
                name: "Acme".into(),
                currency: code("USD"),
            })
            .await;
        directory
            .add_salesperson(Salesperson {
                id: ANA,
                name: "Ana".into(),
                team: Some(2),
            })
            .await;
        directory
            .add_salesperson(Salesperson {
                id: LUIS,
                name: "Luis".into(),
                team: None,
            })
            .await;

        let engine = CommissionEngine::new(
            settings,
            EnginePorts {
                ledger: Box::new(ledger.clone()),
                directory: Box::new(directory.clone()),
                currency: Box::new(rates.clone()),
                bands: Box::new(InMemoryBandRepository::new()),
                rules: Box::new(InMemoryRuleRepository::new()),
                configs: Box::new(InMemorySalespersonConfigRepository::new()),
                calculations: Box::new(InMemoryCalculationRepository::new()),
                batches: Box::new(InMemoryBatchRepository::new()),
                documents: Box::new(InMemoryDocumentRepository::new()),
            },
        );

        Self {
            engine,
            ledger,
            directory,
            rates,
            ctx: OperationContext::new(COMPANY, 1),
        }
    }

    /// Adds an invoice for `salesperson` due on `due` and a reconciled
    /// payment settling it.
    pub async fn settle(
        &self,
        payment_id: PaymentId,
        invoice_id: InvoiceId,
        salesperson: Option<UserId>,
        due: &str,
        paid: &str,
        amount: Decimal,
        currency: &str,
    ) {
        self.ledger.add_invoice(invoice(invoice_id, salesperson, due)).await;
        self.ledger
            .add_payment(payment(payment_id, paid, amount, currency, vec![invoice_id]))
            .await;
    }

    pub async fn quote(&self, from: &str, to: &str, day: &str, rate: Decimal) {
        self.rates
            .add_quote(RateQuote {
                from: code(from),
                to: code(to),
                date: date(day),
                rate,
            })
            .await
            .unwrap();
    }

    pub async fn band_rule(&self, rule: RuleId, band: BandId) -> Rule {
        self.engine.register_band(&self.ctx, standard_band(band)).await.unwrap();
        self.engine
            .register_rule(&self.ctx, Rule::new(rule, COMPANY, format!("BAND{}", rule), CommissionMethod::Band { band }))
            .await
            .unwrap()
    }

    pub async fn percentage_rule(&self, rule: RuleId, rate: Decimal) -> Rule {
        self.engine
            .register_rule(&self.ctx, Rule::new(rule, COMPANY, format!("PCT{}", rule), CommissionMethod::Percentage { rate }))
            .await
            .unwrap()
    }
}

pub fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

pub fn code(s: &str) -> CurrencyCode {
    CurrencyCode::new(s).unwrap()
}

pub fn invoice(id: InvoiceId, salesperson: Option<UserId>, due: &str) -> Invoice {
    Invoice {
        id,
        company: COMPANY,
        name: format!("INV/{}", id),
        partner: 50,
        invoice_date: date("2024-01-01"),
        due_date: date(due),
        payment_term: None,
        salesperson,
        lines: Vec::new(),
    }
}

pub fn payment(id: PaymentId, day: &str, amount: Decimal, currency: &str, invoices: Vec<InvoiceId>) -> Payment {
    Payment {
        id,
        company: COMPANY,
        name: format!("PAY/{}", id),
        date: date(day),
        amount: amount.try_into().unwrap(),
        currency: code(currency),
        direction: PaymentDirection::Inbound,
        partner: 50,
        journal: 1,
        reconciled: true,
        posted: true,
        skip_commission: false,
        invoices,
    }
}

/// Early 3 %, up to 30 days late 2.8 %, up to 60 days late 1.5 %, later nothing.
pub fn standard_band(id: BandId) -> BandSpec {
    BandSpec {
        id,
        company: COMPANY,
        code: format!("STD{}", id),
        name: "Standard collection band".into(),
        active: true,
        currency: None,
        ranges: vec![
            Range::new(1, -999, 0, dec!(3.0)),
            Range::new(2, 1, 30, dec!(2.8)),
            Range::new(3, 31, 60, dec!(1.5)),
            Range::new(4, 61, 999, dec!(0)),
        ],
    }
}
