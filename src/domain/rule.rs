use super::ledger::{Invoice, Payment, Salesperson};
use super::money::CurrencyCode;
use super::{
    BandId, CategoryId, CompanyId, JournalId, PartnerId, PaymentTermId, ProductId, RuleId, TeamId,
    UserId,
};
use crate::error::CommissionError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// How a commission is computed. Each variant carries only what it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommissionMethod {
    /// Percentage of the payment amount, e.g. `rate = 3` for 3 %.
    Percentage { rate: Decimal },
    /// Flat amount in the payment currency.
    Fixed { amount: Decimal },
    /// Rate looked up from a day band by collection delay.
    Band { band: BandId },
    #[default]
    None,
}

impl CommissionMethod {
    pub fn validate(&self) -> Result<(), CommissionError> {
        match self {
            Self::Percentage { rate } if *rate <= Decimal::ZERO => Err(
                CommissionError::configuration("A percentage commission needs a positive rate"),
            ),
            Self::Fixed { amount } if *amount <= Decimal::ZERO => Err(
                CommissionError::configuration("A fixed commission needs a positive amount"),
            ),
            _ => Ok(()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Percentage { .. } => "percentage",
            Self::Fixed { .. } => "fixed",
            Self::Band { .. } => "band",
            Self::None => "none",
        }
    }
}

/// Restriction sets of a [`Rule`]. An empty set applies to everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleScope {
    pub salespersons: BTreeSet<UserId>,
    pub teams: BTreeSet<TeamId>,
    pub customers: BTreeSet<PartnerId>,
    pub products: BTreeSet<ProductId>,
    pub categories: BTreeSet<CategoryId>,
    pub payment_terms: BTreeSet<PaymentTermId>,
    pub journals: BTreeSet<JournalId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub company: CompanyId,
    pub code: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Lower is evaluated first.
    #[serde(default = "default_ordering")]
    pub priority: i32,
    /// Tie-break within the same priority.
    #[serde(default = "default_ordering")]
    pub sequence: i32,
    pub method: CommissionMethod,
    #[serde(default)]
    pub currency: Option<CurrencyCode>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub min_amount: Option<Decimal>,
    #[serde(default)]
    pub max_amount: Option<Decimal>,
    #[serde(default)]
    pub scope: RuleScope,
}

fn default_active() -> bool {
    true
}

fn default_ordering() -> i32 {
    10
}

impl Rule {
    pub fn new(id: RuleId, company: CompanyId, code: impl Into<String>, method: CommissionMethod) -> Self {
        let code = code.into();
        Self {
            id,
            company,
            name: code.clone(),
            code,
            active: true,
            priority: default_ordering(),
            sequence: default_ordering(),
            method,
            currency: None,
            date_from: None,
            date_to: None,
            min_amount: None,
            max_amount: None,
            scope: RuleScope::default(),
        }
    }

    pub fn validate(&self) -> Result<(), CommissionError> {
        if self.code.trim().is_empty() {
            return Err(CommissionError::configuration("Rule code is required"));
        }
        self.method.validate().map_err(|e| match e {
            CommissionError::Configuration(msg) => {
                CommissionError::Configuration(format!("{} (rule '{}')", msg, self.name))
            }
            other => other,
        })?;
        if let (Some(from), Some(to)) = (self.date_from, self.date_to)
            && from > to
        {
            return Err(CommissionError::configuration(format!(
                "'Valid From' must be before or equal to 'Valid Until' (rule '{}')",
                self.name
            )));
        }
        if let (Some(min), Some(max)) = (self.min_amount, self.max_amount)
            && min > max
        {
            return Err(CommissionError::configuration(format!(
                "'Minimum Amount' must be less than or equal to 'Maximum Amount' (rule '{}')",
                self.name
            )));
        }
        Ok(())
    }

    /// Evaluation order: priority, then sequence, then id.
    pub fn evaluation_order(a: &Rule, b: &Rule) -> Ordering {
        (a.priority, a.sequence, a.id).cmp(&(b.priority, b.sequence, b.id))
    }

    /// True when every populated restriction accepts the given context.
    pub fn matches(&self, invoice: &Invoice, payment: &Payment, salesperson: &Salesperson) -> bool {
        if self.date_from.is_some_and(|from| payment.date < from)
            || self.date_to.is_some_and(|to| payment.date > to)
        {
            return false;
        }

        let amount = payment.amount.value();
        if self.min_amount.is_some_and(|min| amount < min)
            || self.max_amount.is_some_and(|max| amount > max)
        {
            return false;
        }

        let scope = &self.scope;
        if !scope.salespersons.is_empty() && !scope.salespersons.contains(&salesperson.id) {
            return false;
        }
        // A salesperson outside any team is not held to the team set.
        if salesperson.team.is_some_and(|t| !scope.teams.is_empty() && !scope.teams.contains(&t)) {
            return false;
        }
        if !scope.customers.is_empty() && !scope.customers.contains(&invoice.partner) {
            return false;
        }
        if !scope.payment_terms.is_empty()
            && !invoice.payment_term.is_some_and(|t| scope.payment_terms.contains(&t))
        {
            return false;
        }
        if !scope.journals.is_empty() && !scope.journals.contains(&payment.journal) {
            return false;
        }
        if !scope.products.is_empty() && !invoice.products().any(|p| scope.products.contains(&p)) {
            return false;
        }
        if !scope.categories.is_empty()
            && !invoice.categories().any(|c| scope.categories.contains(&c))
        {
            return false;
        }
        true
    }

    /// Weaker check used for advisory listings: only the restrictions that
    /// can be decided from the invoice alone.
    pub fn could_apply_to(&self, invoice: &Invoice, salesperson: &Salesperson) -> bool {
        let scope = &self.scope;
        (scope.customers.is_empty() || scope.customers.contains(&invoice.partner))
            && (scope.salespersons.is_empty() || scope.salespersons.contains(&salesperson.id))
            && salesperson.team.is_none_or(|t| scope.teams.is_empty() || scope.teams.contains(&t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{InvoiceLine, PaymentDirection};
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn invoice() -> Invoice {
        Invoice {
            id: 1,
            company: 1,
            name: "INV/001".into(),
            partner: 50,
            invoice_date: date("2024-01-01"),
            due_date: date("2024-01-10"),
            payment_term: Some(3),
            salesperson: Some(7),
            lines: vec![
                InvoiceLine { product: 100, category: 10 },
                InvoiceLine { product: 101, category: 11 },
            ],
        }
    }

    fn payment() -> Payment {
        Payment {
            id: 1,
            company: 1,
            name: "PAY/001".into(),
            date: date("2024-01-12"),
            amount: dec!(1000).try_into().unwrap(),
            currency: CurrencyCode::new("USD").unwrap(),
            direction: PaymentDirection::Inbound,
            partner: 50,
            journal: 2,
            reconciled: true,
            posted: true,
            skip_commission: false,
            invoices: vec![1],
        }
    }

    fn salesperson() -> Salesperson {
        Salesperson { id: 7, name: "Ana".into(), team: Some(4) }
    }

    fn rule() -> Rule {
        Rule::new(1, 1, "R1", CommissionMethod::Percentage { rate: dec!(3) })
    }

    #[test]
    fn test_empty_scope_matches_everything() {
        assert!(rule().matches(&invoice(), &payment(), &salesperson()));
    }

    #[test]
    fn test_validity_window() {
        let mut r = rule();
        r.date_from = Some(date("2024-01-13"));
        assert!(!r.matches(&invoice(), &payment(), &salesperson()));
        r.date_from = Some(date("2024-01-12"));
        r.date_to = Some(date("2024-01-12"));
        assert!(r.matches(&invoice(), &payment(), &salesperson()));
        r.date_to = Some(date("2024-01-11"));
        assert!(!r.matches(&invoice(), &payment(), &salesperson()));
    }

    #[test]
    fn test_amount_bounds() {
        let mut r = rule();
        r.min_amount = Some(dec!(1000));
        r.max_amount = Some(dec!(1000));
        assert!(r.matches(&invoice(), &payment(), &salesperson()));
        r.min_amount = Some(dec!(1000.01));
        assert!(!r.matches(&invoice(), &payment(), &salesperson()));
    }

    #[test]
    fn test_team_set_checks_members_only() {
        let mut r = rule();
        r.scope.teams.insert(4);
        assert!(r.matches(&invoice(), &payment(), &salesperson()));
        let outsider = Salesperson { team: Some(5), ..salesperson() };
        assert!(!r.matches(&invoice(), &payment(), &outsider));
        assert!(!r.could_apply_to(&invoice(), &outsider));
        let loner = Salesperson { team: None, ..salesperson() };
        assert!(r.matches(&invoice(), &payment(), &loner));
        assert!(r.could_apply_to(&invoice(), &loner));
    }

    #[test]
    fn test_scope_sets() {
        let mut r = rule();
        r.scope.customers.insert(51);
        assert!(!r.matches(&invoice(), &payment(), &salesperson()));

        let mut r = rule();
        r.scope.journals.insert(9);
        assert!(!r.matches(&invoice(), &payment(), &salesperson()));

        let mut r = rule();
        r.scope.payment_terms.insert(3);
        r.scope.salespersons.insert(7);
        assert!(r.matches(&invoice(), &payment(), &salesperson()));
    }

    #[test]
    fn test_products_and_categories_intersect_any_line() {
        let mut r = rule();
        r.scope.products.insert(101);
        assert!(r.matches(&invoice(), &payment(), &salesperson()));
        r.scope.categories.insert(99);
        assert!(!r.matches(&invoice(), &payment(), &salesperson()));
        r.scope.categories.insert(10);
        assert!(r.matches(&invoice(), &payment(), &salesperson()));
    }

    #[test]
    fn test_validate_method_values() {
        assert!(Rule::new(1, 1, "P", CommissionMethod::Percentage { rate: dec!(0) }).validate().is_err());
        assert!(Rule::new(1, 1, "F", CommissionMethod::Fixed { amount: dec!(0) }).validate().is_err());
        assert!(Rule::new(1, 1, "B", CommissionMethod::Band { band: 3 }).validate().is_ok());
        assert!(Rule::new(1, 1, "N", CommissionMethod::None).validate().is_ok());
        assert!(Rule::new(1, 1, " ", CommissionMethod::None).validate().is_err());
    }

    #[test]
    fn test_validate_inverted_ranges() {
        let mut r = rule();
        r.date_from = Some(date("2024-02-01"));
        r.date_to = Some(date("2024-01-01"));
        assert!(matches!(r.validate(), Err(CommissionError::Configuration(_))));

        let mut r = rule();
        r.min_amount = Some(dec!(10));
        r.max_amount = Some(dec!(5));
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_method_deserialization() {
        let m: CommissionMethod = serde_json::from_str(r#"{"type":"band","band":3}"#).unwrap();
        assert_eq!(m, CommissionMethod::Band { band: 3 });
        let m: CommissionMethod = serde_json::from_str(r#"{"type":"none"}"#).unwrap();
        assert!(m.is_none());
    }

    #[test]
    fn test_evaluation_order() {
        let mut a = rule();
        let mut b = rule();
        b.id = 2;
        a.sequence = 20;
        b.sequence = 5;
        assert_eq!(Rule::evaluation_order(&a, &b), Ordering::Greater);
        b.priority = 11;
        assert_eq!(Rule::evaluation_order(&a, &b), Ordering::Less);
    }
}
