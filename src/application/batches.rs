use super::engine::CommissionEngine;
use crate::domain::batch::{
    breakdown_by_currency, previous_month_window, Batch, BatchState, BatchSummary, CurrencyBreakdown,
    NewBatch,
};
use crate::domain::calculation::{Calculation, CalculationState};
use crate::domain::money::round_amount;
use crate::domain::context::OperationContext;
use crate::domain::BatchId;
use crate::error::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::info;

impl CommissionEngine {
    /// Creates a draft batch; fails with `Conflict` if the window overlaps
    /// another live batch of the company.
    pub async fn create_batch(
        &self,
        ctx: &OperationContext,
        name: impl Into<String>,
        date_from: NaiveDate,
        date_to: NaiveDate,
        payment_date: Option<NaiveDate>,
    ) -> Result<Batch> {
        let batch = self
            .ports
            .batches
            .insert(NewBatch {
                company: ctx.company,
                name: name.into(),
                date_from,
                date_to,
                payment_date,
                created_by: ctx.user,
                created_at: ctx.now,
            })
            .await?;
        info!(batch = %batch.name, from = %date_from, to = %date_to, "commission batch created");
        Ok(batch)
    }

    /// Batch for the month before `date`, paid on the configured day of
    /// `date`'s month. Returns the existing batch if that window already has one.
    pub async fn create_monthly_batch(&self, ctx: &OperationContext, date: NaiveDate) -> Result<Batch> {
        let (date_from, date_to, payment_date) = previous_month_window(date, self.settings.payment_day);
        if let Some(existing) = self
            .ports
            .batches
            .find_overlapping(ctx.company, date_from, date_to)
            .await?
            .into_iter()
            .find(|b| b.date_from == date_from && b.date_to == date_to)
        {
            return Ok(existing);
        }
        let name = format!("Commissions {}", date_from.format("%B %Y"));
        self.create_batch(ctx, name, date_from, date_to, Some(payment_date)).await
    }

    pub async fn update_batch_window(
        &self,
        ctx: &OperationContext,
        id: BatchId,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Batch> {
        let batch = self.batch(ctx, id).await?;
        self.ports
            .batches
            .update_window(batch.id, date_from, date_to, ctx.user, ctx.now)
            .await
    }

    pub async fn set_batch_payment_date(
        &self,
        ctx: &OperationContext,
        id: BatchId,
        payment_date: NaiveDate,
    ) -> Result<Batch> {
        let mut batch = self.batch(ctx, id).await?;
        batch.set_payment_date(payment_date, ctx.user, ctx.now)?;
        self.ports.batches.update(batch.clone()).await?;
        Ok(batch)
    }

    /// `draft → calculated`: claims every unbatched calculation whose payment
    /// date falls in the batch window.
    pub async fn calculate_batch(&self, ctx: &OperationContext, id: BatchId) -> Result<Batch> {
        let mut batch = self.batch(ctx, id).await?;
        batch.ensure_state(BatchState::Draft, "Only draft batches can be calculated")?;
        let claimed = self
            .ports
            .calculations
            .claim_unbatched_in_range(ctx.company, batch.id, batch.date_from, batch.date_to, ctx.user, ctx.now)
            .await?;
        batch.mark_calculated(claimed.len(), ctx.user, ctx.now)?;
        self.ports.batches.update(batch.clone()).await?;
        info!(batch = %batch.name, calculations = claimed.len(), "commission batch calculated");
        Ok(batch)
    }

    pub async fn review_batch(&self, ctx: &OperationContext, id: BatchId) -> Result<Batch> {
        let mut batch = self.batch(ctx, id).await?;
        let count = self.live_calculations(batch.id).await?.len();
        batch.review(count, ctx.user, ctx.now)?;
        self.ports.batches.update(batch.clone()).await?;
        Ok(batch)
    }

    /// `payment_generated → paid`: approved calculations and the document
    /// are paid with it.
    pub async fn mark_batch_paid(&self, ctx: &OperationContext, id: BatchId) -> Result<Batch> {
        let mut batch = self.batch(ctx, id).await?;
        batch.mark_paid(ctx.user, ctx.now)?;

        let mut paid = Vec::new();
        for mut calculation in self.ports.calculations.find_for_batch(batch.id).await? {
            if calculation.state == CalculationState::Approved {
                calculation.mark_paid(ctx.user, ctx.now)?;
                paid.push(calculation);
            }
        }
        let document = match batch.document {
            Some(doc_id) => self.ports.documents.get(doc_id).await?,
            None => None,
        };

        let count = paid.len();
        self.ports.calculations.update_many(paid).await?;
        if let Some(mut document) = document {
            document.settle(ctx.user, ctx.now);
            self.ports.documents.update(document).await?;
        }
        self.ports.batches.update(batch.clone()).await?;
        info!(batch = %batch.name, calculations = count, "commission batch paid");
        Ok(batch)
    }

    /// Back to draft: detaches every calculation and deletes the document.
    pub async fn reset_batch(&self, ctx: &OperationContext, id: BatchId) -> Result<Batch> {
        let mut batch = self.batch(ctx, id).await?;
        let document = batch.reset_to_draft(ctx.user, ctx.now)?;
        self.detach_all(ctx, batch.id).await?;
        if let Some(doc_id) = document {
            self.ports.documents.delete(doc_id).await?;
        }
        self.ports.batches.update(batch.clone()).await?;
        info!(batch = %batch.name, "commission batch reset to draft");
        Ok(batch)
    }

    pub async fn cancel_batch(&self, ctx: &OperationContext, id: BatchId) -> Result<Batch> {
        let mut batch = self.batch(ctx, id).await?;
        batch.cancel(ctx.user, ctx.now)?;
        self.detach_all(ctx, batch.id).await?;
        self.ports.batches.update(batch.clone()).await?;
        info!(batch = %batch.name, "commission batch cancelled");
        Ok(batch)
    }

    async fn detach_all(&self, ctx: &OperationContext, batch: BatchId) -> Result<()> {
        let mut members = self.ports.calculations.find_for_batch(batch).await?;
        for calculation in &mut members {
            calculation.detach_from_batch(ctx.user, ctx.now);
        }
        self.ports.calculations.update_many(members).await
    }

    pub(crate) async fn live_calculations(&self, batch: BatchId) -> Result<Vec<Calculation>> {
        let members = self.ports.calculations.find_for_batch(batch).await?;
        Ok(members.into_iter().filter(|c| c.state.is_active()).collect())
    }

    /// Counts and totals of the batch's live calculations. Currencies other
    /// than the two payable ones are converted into the primary currency at
    /// each calculation's payment date.
    pub async fn batch_summary(&self, ctx: &OperationContext, id: BatchId) -> Result<BatchSummary> {
        let batch = self.batch(ctx, id).await?;
        let calculations = self.live_calculations(batch.id).await?;
        let primary = &self.settings.primary_currency;
        let secondary = &self.settings.secondary_currency;

        let mut total_primary = Decimal::ZERO;
        let mut total_secondary = Decimal::ZERO;
        for calc in &calculations {
            if &calc.currency == secondary {
                total_secondary += calc.commission_amount;
            } else {
                total_primary += self
                    .ports
                    .currency
                    .convert(calc.commission_amount, &calc.currency, primary, calc.company, calc.payment_date)
                    .await?;
            }
        }
        let salespersons: BTreeSet<_> = calculations.iter().map(|c| c.salesperson).collect();
        Ok(BatchSummary {
            id: batch.id,
            name: batch.name,
            date_from: batch.date_from,
            date_to: batch.date_to,
            payment_date: batch.payment_date,
            state: batch.state,
            calculation_count: calculations.len(),
            salesperson_count: salespersons.len(),
            total_primary: round_amount(total_primary, self.settings.amount_scale),
            total_secondary,
            document: batch.document,
        })
    }

    pub async fn batch_breakdown(&self, ctx: &OperationContext, id: BatchId) -> Result<Vec<CurrencyBreakdown>> {
        let batch = self.batch(ctx, id).await?;
        let calculations = self.ports.calculations.find_for_batch(batch.id).await?;
        Ok(breakdown_by_currency(&calculations))
    }
}
