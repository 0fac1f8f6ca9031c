use crate::domain::ledger::{Invoice, Payment, Salesperson};
use crate::domain::rule::Rule;
use crate::domain::salesperson::SalespersonConfig;
use crate::domain::CompanyId;

/// A company's active rules in evaluation order.
pub struct RuleMatcher<'a> {
    rules: Vec<&'a Rule>,
}

impl<'a> RuleMatcher<'a> {
    /// Keeps the active rules of `company` and sorts them by
    /// (priority, sequence, id).
    pub fn new(company: CompanyId, rules: &'a [Rule]) -> Self {
        let mut rules: Vec<&Rule> = rules
            .iter()
            .filter(|r| r.active && r.company == company)
            .collect();
        rules.sort_by(|a, b| Rule::evaluation_order(a, b));
        Self { rules }
    }

    pub fn rules(&self) -> &[&'a Rule] {
        &self.rules
    }

    /// First rule accepting the context, else the salesperson's default rule
    /// if it is active and accepts the context too.
    pub fn resolve(
        &self,
        invoice: &Invoice,
        payment: &Payment,
        salesperson: &Salesperson,
        config: Option<&SalespersonConfig>,
    ) -> Option<&'a Rule> {
        if config.is_some_and(|c| !c.commission_active) {
            return None;
        }
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.matches(invoice, payment, salesperson))
        {
            return Some(*rule);
        }
        let default_id = config.and_then(|c| c.default_rule)?;
        self.rules
            .iter()
            .find(|r| r.id == default_id)
            .filter(|r| r.matches(invoice, payment, salesperson))
            .copied()
    }

    /// Rules that could apply to `invoice` whatever payment settles it.
    pub fn potential_rules(&self, invoice: &Invoice, salesperson: &Salesperson) -> Vec<&'a Rule> {
        self.rules
            .iter()
            .filter(|r| r.could_apply_to(invoice, salesperson))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{InvoiceLine, PaymentDirection};
    use crate::domain::money::CurrencyCode;
    use crate::domain::rule::CommissionMethod;
    use rust_decimal_macros::dec;

    fn invoice() -> Invoice {
        Invoice {
            id: 1,
            company: 1,
            name: "INV/001".into(),
            partner: 50,
            invoice_date: "2024-01-01".parse().unwrap(),
            due_date: "2024-01-10".parse().unwrap(),
            payment_term: None,
            salesperson: Some(7),
            lines: vec![InvoiceLine { product: 100, category: 10 }],
        }
    }

    fn payment() -> Payment {
        Payment {
            id: 1,
            company: 1,
            name: String::new(),
            date: "2024-01-12".parse().unwrap(),
            amount: dec!(1000).try_into().unwrap(),
            currency: CurrencyCode::new("USD").unwrap(),
            direction: PaymentDirection::Inbound,
            partner: 50,
            journal: 1,
            reconciled: true,
            posted: true,
            skip_commission: false,
            invoices: vec![1],
        }
    }

    fn salesperson() -> Salesperson {
        Salesperson { id: 7, name: "Ana".into(), team: None }
    }

    fn rule(id: u32, priority: i32, sequence: i32) -> Rule {
        let mut rule = Rule::new(id, 1, format!("R{}", id), CommissionMethod::Percentage { rate: dec!(3) });
        rule.priority = priority;
        rule.sequence = sequence;
        rule
    }

    #[test]
    fn test_lower_priority_wins() {
        let rules = vec![rule(1, 20, 1), rule(2, 5, 99)];
        let matcher = RuleMatcher::new(1, &rules);
        let found = matcher.resolve(&invoice(), &payment(), &salesperson(), None).unwrap();
        assert_eq!(found.id, 2);
    }

    #[test]
    fn test_equal_priority_lower_sequence_wins() {
        let rules = vec![rule(1, 10, 20), rule(2, 10, 5), rule(3, 10, 5)];
        let matcher = RuleMatcher::new(1, &rules);
        let found = matcher.resolve(&invoice(), &payment(), &salesperson(), None).unwrap();
        assert_eq!(found.id, 2);
    }

    #[test]
    fn test_inactive_and_foreign_rules_ignored() {
        let mut inactive = rule(1, 1, 1);
        inactive.active = false;
        let mut foreign = rule(2, 1, 1);
        foreign.company = 2;
        let rules = vec![inactive, foreign, rule(3, 50, 50)];
        let matcher = RuleMatcher::new(1, &rules);
        assert_eq!(matcher.rules().len(), 1);
        let found = matcher.resolve(&invoice(), &payment(), &salesperson(), None).unwrap();
        assert_eq!(found.id, 3);
    }

    #[test]
    fn test_default_rule_resolves_when_it_matches() {
        let mut restricted = rule(1, 1, 1);
        restricted.scope.products.insert(555);
        let rules = vec![restricted, rule(5, 90, 1)];
        let matcher = RuleMatcher::new(1, &rules);
        let mut config = SalespersonConfig::new(7, 1);
        config.default_rule = Some(5);
        let found = matcher.resolve(&invoice(), &payment(), &salesperson(), Some(&config)).unwrap();
        assert_eq!(found.id, 5);
    }

    #[test]
    fn test_default_rule_must_pass_the_same_checks() {
        let mut restricted = rule(1, 1, 1);
        restricted.scope.journals.insert(9);
        let mut default = rule(2, 1, 2);
        default.scope.journals.insert(9);
        let rules = vec![restricted, default];
        let matcher = RuleMatcher::new(1, &rules);
        let mut config = SalespersonConfig::new(7, 1);
        config.default_rule = Some(2);
        assert!(matcher.resolve(&invoice(), &payment(), &salesperson(), Some(&config)).is_none());
    }

    #[test]
    fn test_inactive_default_rule_is_ignored() {
        let mut restricted = rule(1, 1, 1);
        restricted.scope.customers.insert(999);
        let mut default = rule(2, 1, 2);
        default.active = false;
        let rules = vec![restricted, default];
        let matcher = RuleMatcher::new(1, &rules);
        let mut config = SalespersonConfig::new(7, 1);
        config.default_rule = Some(2);
        assert!(matcher.resolve(&invoice(), &payment(), &salesperson(), Some(&config)).is_none());
    }

    #[test]
    fn test_disabled_config_matches_nothing() {
        let rules = vec![rule(1, 1, 1)];
        let matcher = RuleMatcher::new(1, &rules);
        let mut config = SalespersonConfig::new(7, 1);
        config.commission_active = false;
        assert!(matcher.resolve(&invoice(), &payment(), &salesperson(), Some(&config)).is_none());
    }

    #[test]
    fn test_team_restriction_skipped_without_team() {
        let mut team_rule = rule(1, 1, 1);
        team_rule.scope.teams.insert(4);
        let rules = vec![team_rule];
        let matcher = RuleMatcher::new(1, &rules);
        assert!(matcher.resolve(&invoice(), &payment(), &salesperson(), None).is_some());

        let member = Salesperson { id: 7, name: "Ana".into(), team: Some(4) };
        assert!(matcher.resolve(&invoice(), &payment(), &member, None).is_some());

        let outsider = Salesperson { id: 7, name: "Ana".into(), team: Some(5) };
        assert!(matcher.resolve(&invoice(), &payment(), &outsider, None).is_none());
    }

    #[test]
    fn test_potential_rules_ignore_payment_restrictions() {
        let mut big_only = rule(1, 1, 1);
        big_only.min_amount = Some(dec!(1_000_000));
        let mut other_customer = rule(2, 1, 2);
        other_customer.scope.customers.insert(77);
        let rules = vec![big_only, other_customer];
        let matcher = RuleMatcher::new(1, &rules);
        let potential = matcher.potential_rules(&invoice(), &salesperson());
        assert_eq!(potential.len(), 1);
        assert_eq!(potential[0].id, 1);
    }
}
