use super::engine::CommissionEngine;
use crate::domain::calculation::Calculation;
use crate::domain::context::OperationContext;
use crate::domain::statistics::{self, PaymentCommissions, SalespersonStatistics};
use crate::domain::{PaymentId, UserId};
use crate::error::{CommissionError, Result};
use tracing::debug;

impl CommissionEngine {
    /// Counts, earned totals, delay buckets and the monthly trend of one
    /// salesperson's commissions within the context's company.
    pub async fn salesperson_statistics(
        &self,
        ctx: &OperationContext,
        salesperson: UserId,
    ) -> Result<SalespersonStatistics> {
        if self.ports.directory.salesperson(salesperson).await?.is_none() {
            return Err(CommissionError::not_found(format!("salesperson {}", salesperson)));
        }
        let own: Vec<Calculation> = self
            .ports
            .calculations
            .list(ctx.company)
            .await?
            .into_iter()
            .filter(|c| c.salesperson == salesperson)
            .collect();
        debug!(salesperson, calculations = own.len(), "computing salesperson statistics");
        Ok(statistics::salesperson_statistics(
            salesperson,
            &own,
            ctx.now.date_naive(),
            self.settings.amount_scale,
        ))
    }

    pub async fn payment_commission_total(
        &self,
        ctx: &OperationContext,
        payment_id: PaymentId,
    ) -> Result<PaymentCommissions> {
        let payment = self.load_payment(ctx, payment_id).await?;
        let calculations = self.ports.calculations.find_for_payment(payment.id).await?;
        Ok(statistics::payment_commissions(
            payment.id,
            payment.currency,
            &calculations,
            self.settings.amount_scale,
        ))
    }
}
