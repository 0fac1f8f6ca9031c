use super::engine::CommissionEngine;
use super::matcher::RuleMatcher;
use crate::domain::band::Band;
use crate::domain::calculation::{days_between, CalculationState, NewCalculation};
use crate::domain::context::OperationContext;
use crate::domain::ledger::{Invoice, Payment};
use crate::domain::money::round_amount;
use crate::domain::rule::{CommissionMethod, Rule};
use crate::domain::{BandId, CalculationId, InvoiceId, PaymentId, RangeId};
use crate::error::{CommissionError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// Outcome of applying a commission method to one (payment, invoice).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionResult {
    /// Percentage.
    pub rate: Decimal,
    pub amount: Decimal,
    pub band: Option<BandId>,
    pub range: Option<RangeId>,
    pub days_overdue: i64,
}

/// Computes the commission owed on `payment` for `invoice`.
///
/// `band` is the band a [`CommissionMethod::Band`] refers to, if the caller
/// could load it. Returns `None` when nothing is owed.
pub fn calculate(
    method: &CommissionMethod,
    payment: &Payment,
    invoice: &Invoice,
    band: Option<&Band>,
    scale: u32,
) -> Option<CommissionResult> {
    let days_overdue = days_between(invoice.due_date, payment.date);
    let amount = payment.amount.value();
    match method {
        CommissionMethod::None => None,
        CommissionMethod::Fixed { amount: fixed } => Some(CommissionResult {
            rate: Decimal::ZERO,
            amount: round_amount(*fixed, scale),
            band: None,
            range: None,
            days_overdue,
        }),
        CommissionMethod::Percentage { rate } => Some(CommissionResult {
            rate: *rate,
            amount: round_amount(amount * *rate / Decimal::ONE_HUNDRED, scale),
            band: None,
            range: None,
            days_overdue,
        }),
        CommissionMethod::Band { band: band_id } => {
            let band = band.filter(|b| b.id() == *band_id && b.is_active())?;
            let found = band.rate_for(days_overdue, amount, &payment.currency);
            if found.is_zero() {
                return None;
            }
            Some(CommissionResult {
                rate: found.rate * Decimal::ONE_HUNDRED,
                amount: round_amount(amount * found.rate, scale),
                band: Some(band.id()),
                range: found.range_id,
                days_overdue,
            })
        }
    }
}

/// Why the trigger did not create a calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Not inbound, not posted, not reconciled, or flagged to skip.
    NotCommissionable,
    InvoiceMissing,
    NoSalesperson,
    UnknownSalesperson,
    AlreadyCalculated,
    CommissionInactive,
    NoRule,
    NothingOwed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum InvoiceOutcome {
    Created { calculation: CalculationId },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerReport {
    pub payment: PaymentId,
    /// Set when the whole payment was ignored.
    pub skipped: Option<SkipReason>,
    pub invoices: Vec<(InvoiceId, InvoiceOutcome)>,
}

impl TriggerReport {
    fn ignored(payment: PaymentId, reason: SkipReason) -> Self {
        Self {
            payment,
            skipped: Some(reason),
            invoices: Vec::new(),
        }
    }

    pub fn created(&self) -> Vec<CalculationId> {
        self.invoices
            .iter()
            .filter_map(|(_, outcome)| match outcome {
                InvoiceOutcome::Created { calculation } => Some(*calculation),
                InvoiceOutcome::Skipped { .. } => None,
            })
            .collect()
    }
}

/// What the trigger decided for one invoice, before anything is written.
enum Plan {
    Skip(SkipReason),
    Create(Box<PlannedCalculation>),
}

struct PlannedCalculation {
    new: NewCalculation,
    invoice: String,
    salesperson: String,
}

impl CommissionEngine {
    /// Creates the calculations owed on a settled payment, one per invoice.
    ///
    /// Safe to call repeatedly and concurrently for the same payment.
    pub async fn calculate_from_payment(
        &self,
        ctx: &OperationContext,
        payment_id: PaymentId,
    ) -> Result<TriggerReport> {
        let payment = self.load_payment(ctx, payment_id).await?;
        if !payment.is_commissionable() {
            debug!(payment = %payment.label(), "payment not eligible for commission");
            return Ok(TriggerReport::ignored(payment.id, SkipReason::NotCommissionable));
        }

        let rules = self.ports.rules.active_for_company(payment.company).await?;
        let mut report = TriggerReport {
            payment: payment.id,
            skipped: None,
            invoices: Vec::with_capacity(payment.invoices.len()),
        };
        let mut seen = HashSet::new();
        let invoice_ids: Vec<InvoiceId> = payment.invoices.iter().copied().filter(|id| seen.insert(*id)).collect();

        // Every pair stays locked and every lookup is done before the first
        // insert, so a failing invoice leaves nothing behind.
        let mut guards = Vec::with_capacity(invoice_ids.len());
        let mut plans = Vec::with_capacity(invoice_ids.len());
        for invoice_id in invoice_ids {
            let plan = self
                .plan_for_invoice(ctx, &payment, invoice_id, &rules, &mut guards)
                .await?;
            plans.push((invoice_id, plan));
        }
        for (invoice_id, plan) in plans {
            let outcome = match plan {
                Plan::Skip(reason) => InvoiceOutcome::Skipped { reason },
                Plan::Create(planned) => self.store_calculation(&payment, *planned).await?,
            };
            report.invoices.push((invoice_id, outcome));
        }
        Ok(report)
    }

    async fn plan_for_invoice(
        &self,
        ctx: &OperationContext,
        payment: &Payment,
        invoice_id: InvoiceId,
        rules: &[Rule],
        guards: &mut Vec<OwnedMutexGuard<()>>,
    ) -> Result<Plan> {
        let skip = |reason: SkipReason| -> Result<Plan> { Ok(Plan::Skip(reason)) };

        let Some(invoice) = self.ports.ledger.invoice(invoice_id).await? else {
            warn!(payment = %payment.label(), invoice = invoice_id, "settled invoice not found");
            return skip(SkipReason::InvoiceMissing);
        };
        let Some(salesperson_id) = invoice.salesperson else {
            info!(invoice = %invoice.label(), "invoice has no salesperson, skipping commission");
            return skip(SkipReason::NoSalesperson);
        };

        guards.push(self.pair_locks.lock((payment.id, invoice.id)).await);

        if self
            .ports
            .calculations
            .find_active_for_pair(payment.id, invoice.id)
            .await?
            .is_some()
        {
            info!(
                payment = %payment.label(),
                invoice = %invoice.label(),
                "commission already calculated"
            );
            return skip(SkipReason::AlreadyCalculated);
        }

        let config = self.ports.configs.get(salesperson_id, invoice.company).await?;
        if config.as_ref().is_some_and(|c| !c.commission_active) {
            info!(salesperson = salesperson_id, "commission not active for salesperson, skipping");
            return skip(SkipReason::CommissionInactive);
        }
        let Some(salesperson) = self.ports.directory.salesperson(salesperson_id).await? else {
            warn!(salesperson = salesperson_id, "salesperson not found in directory");
            return skip(SkipReason::UnknownSalesperson);
        };

        let matcher = RuleMatcher::new(invoice.company, rules);
        let Some(rule) = matcher.resolve(&invoice, payment, &salesperson, config.as_ref()) else {
            info!(salesperson = %salesperson.name, "no applicable commission rule");
            return skip(SkipReason::NoRule);
        };

        let method = config
            .as_ref()
            .and_then(|c| c.active_override())
            .unwrap_or(&rule.method);
        let band = match method {
            CommissionMethod::Band { band } => {
                let loaded = self.ports.bands.get(*band).await?;
                if loaded.is_none() {
                    warn!(rule = %rule.code, band = *band, "rule refers to a missing band");
                }
                loaded
            }
            _ => None,
        };
        let Some(result) = calculate(method, payment, &invoice, band.as_ref(), self.settings.amount_scale)
        else {
            info!(
                payment = %payment.label(),
                invoice = %invoice.label(),
                method = method.kind(),
                "no commission owed"
            );
            return skip(SkipReason::NothingOwed);
        };

        let company = self.load_company(invoice.company).await?;
        let exchange_rate = self
            .ports
            .currency
            .rate(&payment.currency, &company.currency, company.id, payment.date)
            .await?;

        let new = NewCalculation {
            company: invoice.company,
            payment: payment.id,
            invoice: invoice.id,
            salesperson: salesperson.id,
            customer: invoice.partner,
            rule: Some(rule.id),
            band: result.band,
            range: result.range,
            invoice_date: invoice.invoice_date,
            due_date: invoice.due_date,
            payment_date: payment.date,
            payment_amount: payment.amount,
            currency: payment.currency.clone(),
            commission_rate: result.rate,
            commission_amount: result.amount,
            company_currency: company.currency.clone(),
            exchange_rate,
            state: CalculationState::Calculated,
            created_by: ctx.user,
            created_at: ctx.now,
        };
        Ok(Plan::Create(Box::new(PlannedCalculation {
            new,
            invoice: invoice.label(),
            salesperson: salesperson.name,
        })))
    }

    async fn store_calculation(&self, payment: &Payment, planned: PlannedCalculation) -> Result<InvoiceOutcome> {
        let PlannedCalculation {
            new,
            invoice,
            salesperson,
        } = planned;
        match self.ports.calculations.insert(new).await {
            Ok(calculation) => {
                info!(
                    payment = %payment.label(),
                    invoice = %invoice,
                    salesperson = %salesperson,
                    amount = %calculation.commission_amount,
                    currency = %calculation.currency,
                    "commission calculated"
                );
                Ok(InvoiceOutcome::Created {
                    calculation: calculation.id,
                })
            }
            Err(CommissionError::Conflict(msg)) => {
                info!(payment = %payment.label(), invoice = %invoice, "{}", msg);
                Ok(InvoiceOutcome::Skipped {
                    reason: SkipReason::AlreadyCalculated,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Cancels the payment's open calculations and runs the trigger again.
    pub async fn recalculate_payment(
        &self,
        ctx: &OperationContext,
        payment_id: PaymentId,
    ) -> Result<TriggerReport> {
        let payment = self.load_payment(ctx, payment_id).await?;
        let mut cancelled = Vec::new();
        for mut calculation in self.ports.calculations.find_for_payment(payment.id).await? {
            if matches!(calculation.state, CalculationState::Paid | CalculationState::Cancelled) {
                continue;
            }
            calculation.cancel(ctx.user, ctx.now)?;
            cancelled.push(calculation);
        }
        if !cancelled.is_empty() {
            info!(payment = %payment.label(), count = cancelled.len(), "cancelled calculations for recalculation");
            self.ports.calculations.update_many(cancelled).await?;
        }
        self.calculate_from_payment(ctx, payment.id).await
    }
}
