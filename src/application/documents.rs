use super::engine::CommissionEngine;
use crate::domain::batch::BatchState;
use crate::domain::calculation::Calculation;
use crate::domain::context::OperationContext;
use crate::domain::document::{document_number, DocumentSummary, NewDocument, PaymentDocument, PaymentLine};
use crate::domain::money::{round_amount, CurrencyCode};
use crate::domain::{BatchId, CompanyId, DocumentId, UserId};
use crate::error::Result;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::info;

/// Per-salesperson sums before conversion.
#[derive(Default)]
struct LineTotals {
    calculations: Vec<u64>,
    primary: Decimal,
    secondary: Decimal,
    other: BTreeMap<CurrencyCode, Decimal>,
}

impl CommissionEngine {
    /// `reviewed → payment_generated`: builds the batch's single payment
    /// document and approves the calculations it pays.
    pub async fn generate_payment_document(&self, ctx: &OperationContext, id: BatchId) -> Result<PaymentDocument> {
        let mut batch = self.batch(ctx, id).await?;
        let payment_date = batch.payment_date_for_document()?;
        let company = self.load_company(batch.company).await?;
        let primary = &self.settings.primary_currency;
        let secondary = &self.settings.secondary_currency;

        let mut members = self.ports.calculations.find_for_batch(batch.id).await?;
        let grouped = group_by_salesperson(&members, primary, secondary);

        // Every conversion happens before the first write.
        let exchange_rate = self
            .ports
            .currency
            .rate(primary, secondary, company.id, payment_date)
            .await?;
        let mut lines = Vec::with_capacity(grouped.len());
        for (salesperson, totals) in grouped {
            lines.push(
                self.build_line(salesperson, totals, company.id, &company.currency, payment_date)
                    .await?,
            );
        }

        let sequence = self
            .ports
            .documents
            .next_sequence(company.id, payment_date.year())
            .await?;
        let document = self
            .ports
            .documents
            .insert(NewDocument {
                number: document_number(payment_date.year(), sequence),
                batch: batch.id,
                company: company.id,
                payment_date,
                primary_currency: primary.clone(),
                secondary_currency: secondary.clone(),
                exchange_rate,
                lines,
                created_by: ctx.user,
                generated_at: ctx.now,
            })
            .await?;

        for calculation in &mut members {
            calculation.approve_for_payment(ctx.user, ctx.now);
        }
        self.ports.calculations.update_many(members).await?;
        batch.attach_document(document.id, ctx.user, ctx.now)?;
        self.ports.batches.update(batch).await?;

        info!(
            document = %document.number,
            lines = document.lines.len(),
            rate = %exchange_rate,
            "payment document generated"
        );
        Ok(document)
    }

    async fn build_line(
        &self,
        salesperson: UserId,
        totals: LineTotals,
        company: CompanyId,
        company_currency: &CurrencyCode,
        payment_date: NaiveDate,
    ) -> Result<PaymentLine> {
        let primary = &self.settings.primary_currency;
        let secondary = &self.settings.secondary_currency;
        let scale = self.settings.amount_scale;
        let currency = &self.ports.currency;

        let mut converted = Decimal::ZERO;
        for (code, amount) in &totals.other {
            converted += currency.convert(*amount, code, secondary, company, payment_date).await?;
        }
        let secondary_payment = round_amount(totals.secondary + converted, scale);
        let total_payment = currency
            .convert(totals.primary, primary, company_currency, company, payment_date)
            .await?
            + currency
                .convert(secondary_payment, secondary, company_currency, company, payment_date)
                .await?;

        Ok(PaymentLine {
            salesperson,
            commission_count: totals.calculations.len(),
            calculations: totals.calculations,
            primary_original: totals.primary,
            primary_payment: totals.primary,
            secondary_original: totals.secondary,
            secondary_payment,
            total_payment: round_amount(total_payment, scale),
        })
    }

    pub async fn confirm_document(&self, ctx: &OperationContext, id: DocumentId) -> Result<PaymentDocument> {
        let mut document = self.document(ctx, id).await?;
        document.confirm(ctx.user, ctx.now)?;
        self.ports.documents.update(document.clone()).await?;
        Ok(document)
    }

    /// `confirmed → paid`; the batch follows if it is still waiting on payment.
    pub async fn mark_document_paid(&self, ctx: &OperationContext, id: DocumentId) -> Result<PaymentDocument> {
        let mut document = self.document(ctx, id).await?;
        document.mark_paid(ctx.user, ctx.now)?;
        self.ports.documents.update(document.clone()).await?;
        let batch = self.batch(ctx, document.batch).await?;
        if batch.state == BatchState::PaymentGenerated {
            self.mark_batch_paid(ctx, batch.id).await?;
        }
        info!(document = %document.number, "payment document paid");
        Ok(document)
    }

    pub async fn document_summary(&self, ctx: &OperationContext, id: DocumentId) -> Result<DocumentSummary> {
        Ok(self.document(ctx, id).await?.summary())
    }
}

/// Payable calculations grouped by salesperson, summed per currency bucket.
fn group_by_salesperson(
    calculations: &[Calculation],
    primary: &CurrencyCode,
    secondary: &CurrencyCode,
) -> BTreeMap<UserId, LineTotals> {
    let mut grouped: BTreeMap<UserId, LineTotals> = BTreeMap::new();
    for calc in calculations.iter().filter(|c| c.state.is_payable()) {
        let totals = grouped.entry(calc.salesperson).or_default();
        totals.calculations.push(calc.id);
        if &calc.currency == primary {
            totals.primary += calc.commission_amount;
        } else if &calc.currency == secondary {
            totals.secondary += calc.commission_amount;
        } else {
            *totals.other.entry(calc.currency.clone()).or_default() += calc.commission_amount;
        }
    }
    grouped
}
