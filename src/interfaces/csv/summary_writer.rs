use crate::domain::calculation::CalculationSummary;
use crate::domain::document::PaymentLine;
use crate::domain::UserId;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// Flat CSV view of a [`PaymentLine`] without its calculation list.
#[derive(Serialize)]
struct PaymentLineRow {
    salesperson: UserId,
    commission_count: usize,
    primary_original: Decimal,
    primary_payment: Decimal,
    secondary_original: Decimal,
    secondary_payment: Decimal,
    total_payment: Decimal,
}

impl From<&PaymentLine> for PaymentLineRow {
    fn from(line: &PaymentLine) -> Self {
        Self {
            salesperson: line.salesperson,
            commission_count: line.commission_count,
            primary_original: line.primary_original,
            primary_payment: line.primary_payment,
            secondary_original: line.secondary_original,
            secondary_payment: line.secondary_payment,
            total_payment: line.total_payment,
        }
    }
}

/// Writes commission reports as CSV to any `Write` sink (e.g. stdout).
pub struct SummaryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// One row per calculation, in the order given.
    pub fn write_calculations(&mut self, summaries: impl IntoIterator<Item = CalculationSummary>) -> Result<()> {
        for summary in summaries {
            self.writer.serialize(summary)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// One row per salesperson of a payment document.
    pub fn write_payment_lines<'a>(&mut self, lines: impl IntoIterator<Item = &'a PaymentLine>) -> Result<()> {
        for line in lines {
            self.writer.serialize(PaymentLineRow::from(line))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
