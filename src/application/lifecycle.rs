use super::engine::CommissionEngine;
use super::matcher::RuleMatcher;
use crate::domain::calculation::{Calculation, CalculationSummary, ValidationCheck};
use crate::domain::context::OperationContext;
use crate::domain::rule::Rule;
use crate::domain::CalculationId;
use crate::error::Result;
use tracing::info;

impl CommissionEngine {
    pub async fn mark_calculation_calculated(&self, ctx: &OperationContext, id: CalculationId) -> Result<Calculation> {
        let mut calculation = self.calculation(ctx, id).await?;
        calculation.mark_calculated(ctx.user, ctx.now)?;
        self.ports.calculations.update(calculation.clone()).await?;
        Ok(calculation)
    }

    /// `calculated → validated`, applying the salesperson's min/max limits.
    pub async fn validate_calculation(&self, ctx: &OperationContext, id: CalculationId) -> Result<Calculation> {
        let mut calculation = self.calculation(ctx, id).await?;
        let payment_reconciled = self
            .ports
            .ledger
            .payment(calculation.payment)
            .await?
            .is_some_and(|p| p.reconciled);
        let batch_state = match calculation.batch {
            Some(batch) => self.ports.batches.get(batch).await?.map(|b| b.state),
            None => None,
        };
        let config = self
            .ports
            .configs
            .get(calculation.salesperson, calculation.company)
            .await?;
        let check = ValidationCheck {
            payment_reconciled,
            batch_state,
            config: config.as_ref(),
        };
        calculation.validate(check, ctx.user, ctx.now)?;
        self.ports.calculations.update(calculation.clone()).await?;
        info!(calculation = id, amount = %calculation.commission_amount, "commission validated");
        Ok(calculation)
    }

    pub async fn approve_calculation(&self, ctx: &OperationContext, id: CalculationId) -> Result<Calculation> {
        let mut calculation = self.calculation(ctx, id).await?;
        calculation.approve(ctx.user, ctx.now)?;
        self.ports.calculations.update(calculation.clone()).await?;
        Ok(calculation)
    }

    pub async fn mark_calculation_paid(&self, ctx: &OperationContext, id: CalculationId) -> Result<Calculation> {
        let mut calculation = self.calculation(ctx, id).await?;
        calculation.mark_paid(ctx.user, ctx.now)?;
        self.ports.calculations.update(calculation.clone()).await?;
        Ok(calculation)
    }

    pub async fn cancel_calculation(&self, ctx: &OperationContext, id: CalculationId) -> Result<Calculation> {
        let mut calculation = self.calculation(ctx, id).await?;
        calculation.cancel(ctx.user, ctx.now)?;
        self.ports.calculations.update(calculation.clone()).await?;
        info!(calculation = id, "commission cancelled");
        Ok(calculation)
    }

    pub async fn reset_calculation(&self, ctx: &OperationContext, id: CalculationId) -> Result<Calculation> {
        let mut calculation = self.calculation(ctx, id).await?;
        calculation.reset_to_draft(ctx.user, ctx.now)?;
        self.ports.calculations.update(calculation.clone()).await?;
        Ok(calculation)
    }

    pub async fn remove_calculation_from_batch(&self, ctx: &OperationContext, id: CalculationId) -> Result<Calculation> {
        let mut calculation = self.calculation(ctx, id).await?;
        let batch_state = match calculation.batch {
            Some(batch) => self.ports.batches.get(batch).await?.map(|b| b.state),
            None => None,
        };
        calculation.remove_from_batch(batch_state, ctx.user, ctx.now)?;
        self.ports.calculations.update(calculation.clone()).await?;
        Ok(calculation)
    }

    pub async fn calculation_summary(&self, ctx: &OperationContext, id: CalculationId) -> Result<CalculationSummary> {
        Ok(self.calculation(ctx, id).await?.summary())
    }

    /// Rules that could apply to the calculation's invoice, for display next
    /// to the rule that was actually used.
    pub async fn potential_rules(&self, ctx: &OperationContext, id: CalculationId) -> Result<Vec<Rule>> {
        let calculation = self.calculation(ctx, id).await?;
        let Some(invoice) = self.ports.ledger.invoice(calculation.invoice).await? else {
            return Ok(Vec::new());
        };
        let Some(salesperson) = self.ports.directory.salesperson(calculation.salesperson).await? else {
            return Ok(Vec::new());
        };
        let rules = self.ports.rules.active_for_company(calculation.company).await?;
        let matcher = RuleMatcher::new(calculation.company, &rules);
        Ok(matcher
            .potential_rules(&invoice, &salesperson)
            .into_iter()
            .cloned()
            .collect())
    }
}
