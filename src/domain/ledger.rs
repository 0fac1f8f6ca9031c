//! Read models of the host accounting system.
//!
//! Payments, invoices, salespersons and companies are owned elsewhere; the
//! engine only reads them through [`crate::domain::ports::PaymentLedger`] and
//! [`crate::domain::ports::Directory`].

use super::money::{Amount, CurrencyCode};
use super::{
    CategoryId, CompanyId, InvoiceId, JournalId, PartnerId, PaymentId, PaymentTermId, ProductId,
    TeamId, UserId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentDirection {
    #[default]
    Inbound,
    Outbound,
}

/// A customer payment as seen by the commission engine.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub company: CompanyId,
    #[serde(default)]
    pub name: String,
    pub date: NaiveDate,
    pub amount: Amount,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub direction: PaymentDirection,
    pub partner: PartnerId,
    pub journal: JournalId,
    /// Fully settled against its invoices.
    #[serde(default)]
    pub reconciled: bool,
    #[serde(default = "default_true")]
    pub posted: bool,
    #[serde(default)]
    pub skip_commission: bool,
    /// Invoices this payment settles.
    #[serde(default)]
    pub invoices: Vec<InvoiceId>,
}

fn default_true() -> bool {
    true
}

impl Payment {
    /// Whether the commission trigger may look at this payment at all.
    pub fn is_commissionable(&self) -> bool {
        self.direction == PaymentDirection::Inbound
            && self.posted
            && self.reconciled
            && !self.skip_commission
    }

    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("payment #{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub struct InvoiceLine {
    pub product: ProductId,
    pub category: CategoryId,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Invoice {
    pub id: InvoiceId,
    pub company: CompanyId,
    #[serde(default)]
    pub name: String,
    pub partner: PartnerId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub payment_term: Option<PaymentTermId>,
    /// Salesperson the commission is owed to.
    #[serde(default)]
    pub salesperson: Option<UserId>,
    #[serde(default)]
    pub lines: Vec<InvoiceLine>,
}

impl Invoice {
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("invoice #{}", self.id)
        } else {
            self.name.clone()
        }
    }

    pub fn products(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.lines.iter().map(|l| l.product)
    }

    pub fn categories(&self) -> impl Iterator<Item = CategoryId> + '_ {
        self.lines.iter().map(|l| l.category)
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
pub struct Salesperson {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub team: Option<TeamId>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub currency: CurrencyCode,
}
