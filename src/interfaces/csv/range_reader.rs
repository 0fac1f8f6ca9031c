use crate::domain::band::{CoverageReport, Range};
use crate::error::{CommissionError, Result};
use std::io::Read;

/// Reads band ranges from a CSV source.
///
/// Expected header: `id,name,day_from,day_to,commission_rate,indicator_rate,currency,min_payment_amount`.
/// Only `id`, `day_from`, `day_to` and `commission_rate` need values; the
/// other columns may be empty or missing.
pub struct RangeReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RangeReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes and validates each row.
    pub fn ranges(self) -> impl Iterator<Item = Result<Range>> {
        self.reader.into_deserialize().map(|result| {
            let range: Range = result.map_err(CommissionError::from)?;
            range.validate()?;
            Ok(range)
        })
    }

    /// Reads every row and reports how well the ranges cover the day axis.
    pub fn coverage(self) -> Result<(Vec<Range>, CoverageReport)> {
        let ranges = self.ranges().collect::<Result<Vec<_>>>()?;
        let report = CoverageReport::of(&ranges);
        Ok((ranges, report))
    }
}
