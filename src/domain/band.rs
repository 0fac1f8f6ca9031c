use super::money::{CurrencyCode, percent_to_fraction};
use super::{BandId, CompanyId, RangeId};
use crate::error::CommissionError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Earliest day offset a band must cover (payments well before the due date).
pub const DAY_LOWER_BOUND: i64 = -999;
/// Latest day offset a band must cover (payments well after the due date).
pub const DAY_UPPER_BOUND: i64 = 999;

/// One day-interval → rate entry of a [`Band`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub id: RangeId,
    #[serde(default)]
    pub name: Option<String>,
    /// Inclusive; negative means before the due date.
    pub day_from: i64,
    /// Inclusive.
    pub day_to: i64,
    /// Percentage, e.g. `2.8` for 2.8 %.
    pub commission_rate: Decimal,
    #[serde(default)]
    pub indicator_rate: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<CurrencyCode>,
    #[serde(default)]
    pub min_payment_amount: Option<Decimal>,
}

impl Range {
    pub fn new(id: RangeId, day_from: i64, day_to: i64, commission_rate: Decimal) -> Self {
        Self {
            id,
            name: None,
            day_from,
            day_to,
            commission_rate,
            indicator_rate: None,
            currency: None,
            min_payment_amount: None,
        }
    }

    pub fn validate(&self) -> Result<(), CommissionError> {
        if self.day_from > self.day_to {
            return Err(CommissionError::configuration(format!(
                "'Days From' ({}) must be less than or equal to 'Days To' ({})",
                self.day_from, self.day_to
            )));
        }
        if self.commission_rate < Decimal::ZERO {
            return Err(CommissionError::configuration(
                "Commission rate cannot be negative",
            ));
        }
        if self.indicator_rate.is_some_and(|r| r < Decimal::ZERO) {
            return Err(CommissionError::configuration(
                "Indicator rate cannot be negative",
            ));
        }
        if self.min_payment_amount.is_some_and(|a| a < Decimal::ZERO) {
            return Err(CommissionError::configuration(
                "Minimum payment amount cannot be negative",
            ));
        }
        Ok(())
    }

    pub fn contains(&self, days_overdue: i64) -> bool {
        self.day_from <= days_overdue && days_overdue <= self.day_to
    }

    fn accepts(&self, days_overdue: i64, payment_amount: Decimal, currency: &CurrencyCode) -> bool {
        self.contains(days_overdue)
            && self.min_payment_amount.is_none_or(|min| payment_amount >= min)
            && self.currency.as_ref().is_none_or(|c| c == currency)
    }

    /// Human readable label, e.g. "16 to 30 days (2.30%)".
    pub fn display_label(&self) -> String {
        let base = match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ if self.day_from <= DAY_LOWER_BOUND => format!("Up to {} days", self.day_to),
            _ if self.day_to >= DAY_UPPER_BOUND => format!("From {} days onwards", self.day_from),
            _ => format!("{} to {} days", self.day_from, self.day_to),
        };
        format!("{} ({:.2}%)", base, self.commission_rate)
    }
}

/// Result of [`Band::rate_for`]. Rates are fractions (0.028 for 2.8 %).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandMatch {
    pub rate: Decimal,
    pub indicator_rate: Decimal,
    pub range_id: Option<RangeId>,
}

impl BandMatch {
    pub fn none() -> Self {
        Self {
            rate: Decimal::ZERO,
            indicator_rate: Decimal::ZERO,
            range_id: None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.rate.is_zero()
    }
}

/// Structural diagnostics for a candidate set of ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    /// Pairs of range ids whose intervals intersect.
    pub overlaps: Vec<(RangeId, RangeId)>,
    /// Uncovered inclusive day intervals between consecutive ranges.
    pub gaps: Vec<(i64, i64)>,
    pub covers_lower: bool,
    pub covers_upper: bool,
}

impl CoverageReport {
    pub fn of(ranges: &[Range]) -> Self {
        let mut sorted: Vec<&Range> = ranges.iter().collect();
        sorted.sort_by_key(|r| (r.day_from, r.day_to, r.id));

        let mut report = Self {
            covers_lower: sorted.first().is_some_and(|r| r.day_from <= DAY_LOWER_BOUND),
            covers_upper: sorted.iter().any(|r| r.day_to >= DAY_UPPER_BOUND),
            ..Self::default()
        };

        // Furthest right edge seen so far, and the range that owns it.
        let mut reach: Option<(i64, RangeId)> = None;
        for range in sorted {
            if let Some((edge, owner)) = reach {
                if range.day_from <= edge {
                    report.overlaps.push((owner, range.id));
                } else if range.day_from > edge + 1 {
                    report.gaps.push((edge + 1, range.day_from - 1));
                }
            }
            if reach.is_none_or(|(edge, _)| range.day_to > edge) {
                reach = Some((range.day_to, range.id));
            }
        }
        report
    }

    pub fn is_partition(&self) -> bool {
        self.overlaps.is_empty() && self.gaps.is_empty() && self.covers_lower && self.covers_upper
    }
}

/// Raw, unvalidated band data as it arrives from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    pub id: BandId,
    pub company: CompanyId,
    pub code: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub currency: Option<CurrencyCode>,
    pub ranges: Vec<Range>,
}

fn default_active() -> bool {
    true
}

/// A named set of day ranges used to price collection delay.
///
/// The ranges always partition `[DAY_LOWER_BOUND, DAY_UPPER_BOUND]`: every
/// constructor and mutator re-checks the full set and leaves the band
/// untouched when the check fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BandSpec", into = "BandSpec")]
pub struct Band {
    id: BandId,
    company: CompanyId,
    code: String,
    name: String,
    active: bool,
    currency: Option<CurrencyCode>,
    ranges: Vec<Range>,
}

impl Band {
    pub fn new(spec: BandSpec) -> Result<Self, CommissionError> {
        if spec.code.trim().is_empty() {
            return Err(CommissionError::configuration("Band code is required"));
        }
        let ranges = Self::checked_ranges(&spec.name, spec.ranges)?;
        Ok(Self {
            id: spec.id,
            company: spec.company,
            code: spec.code,
            name: spec.name,
            active: spec.active,
            currency: spec.currency,
            ranges,
        })
    }

    fn checked_ranges(name: &str, mut ranges: Vec<Range>) -> Result<Vec<Range>, CommissionError> {
        if ranges.is_empty() {
            return Err(CommissionError::configuration(format!(
                "Commission band '{}' has no day ranges",
                name
            )));
        }
        for range in &ranges {
            range.validate()?;
        }
        let mut seen = HashSet::new();
        if let Some(dup) = ranges.iter().find(|r| !seen.insert(r.id)) {
            return Err(CommissionError::configuration(format!(
                "Range id {} appears twice in band '{}'",
                dup.id, name
            )));
        }

        let report = CoverageReport::of(&ranges);
        if let Some((a, b)) = report.overlaps.first() {
            return Err(CommissionError::configuration(format!(
                "Day ranges cannot overlap in band '{}': range {} overlaps range {}",
                name, a, b
            )));
        }
        if let Some((from, to)) = report.gaps.first() {
            return Err(CommissionError::configuration(format!(
                "Commission band '{}' leaves days {} to {} uncovered",
                name, from, to
            )));
        }
        if !report.covers_lower {
            return Err(CommissionError::configuration(format!(
                "Commission band '{}' must have a range covering early payments (starting from {} days or earlier)",
                name, DAY_LOWER_BOUND
            )));
        }
        if !report.covers_upper {
            return Err(CommissionError::configuration(format!(
                "Commission band '{}' must have a range covering late payments (ending at {} days or later)",
                name, DAY_UPPER_BOUND
            )));
        }

        ranges.sort_by_key(|r| r.day_from);
        Ok(ranges)
    }

    pub fn id(&self) -> BandId {
        self.id
    }

    pub fn company(&self) -> CompanyId {
        self.company
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn currency(&self) -> Option<&CurrencyCode> {
        self.currency.as_ref()
    }

    /// Ranges ordered by `day_from`.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn range(&self, id: RangeId) -> Option<&Range> {
        self.ranges.iter().find(|r| r.id == id)
    }

    pub fn display_name(&self) -> String {
        match &self.currency {
            Some(currency) => format!("[{}] {} ({})", self.code, self.name, currency),
            None => format!("[{}] {}", self.code, self.name),
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn replace_ranges(&mut self, ranges: Vec<Range>) -> Result<(), CommissionError> {
        self.ranges = Self::checked_ranges(&self.name, ranges)?;
        Ok(())
    }

    /// Adds a range and re-checks the whole set.
    pub fn add_range(&mut self, range: Range) -> Result<(), CommissionError> {
        let mut candidate = self.ranges.clone();
        candidate.push(range);
        self.replace_ranges(candidate)
    }

    pub fn remove_range(&mut self, id: RangeId) -> Result<Range, CommissionError> {
        let position = self
            .ranges
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| CommissionError::not_found(format!("range {} in band {}", id, self.id)))?;
        let mut candidate = self.ranges.clone();
        let removed = candidate.remove(position);
        self.replace_ranges(candidate)?;
        Ok(removed)
    }

    /// Looks up the commission rate for a payment made `days_overdue` days
    /// after the due date.
    ///
    /// Never fails: a currency the band does not cover, or no applicable range,
    /// yields [`BandMatch::none`].
    pub fn rate_for(&self, days_overdue: i64, payment_amount: Decimal, currency: &CurrencyCode) -> BandMatch {
        if self.currency.as_ref().is_some_and(|c| c != currency) {
            return BandMatch::none();
        }
        self.ranges
            .iter()
            .find(|r| r.accepts(days_overdue, payment_amount, currency))
            .map(|r| BandMatch {
                rate: percent_to_fraction(r.commission_rate),
                indicator_rate: percent_to_fraction(r.indicator_rate.unwrap_or_default()),
                range_id: Some(r.id),
            })
            .unwrap_or_else(BandMatch::none)
    }
}

impl TryFrom<BandSpec> for Band {
    type Error = CommissionError;

    fn try_from(spec: BandSpec) -> Result<Self, Self::Error> {
        Self::new(spec)
    }
}

impl From<Band> for BandSpec {
    fn from(band: Band) -> Self {
        Self {
            id: band.id,
            company: band.company,
            code: band.code,
            name: band.name,
            active: band.active,
            currency: band.currency,
            ranges: band.ranges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    fn premium_spec() -> BandSpec {
        BandSpec {
            id: 1,
            company: 1,
            code: "BAND_PREMIUM".into(),
            name: "Premium".into(),
            active: true,
            currency: None,
            ranges: vec![
                Range::new(1, -999, 15, dec!(2.8)),
                Range::new(2, 16, 30, dec!(2.3)),
                Range::new(3, 31, 999, dec!(0)),
            ],
        }
    }

    #[test]
    fn test_rate_for_first_range() {
        let band = Band::new(premium_spec()).unwrap();
        let m = band.rate_for(2, dec!(1000), &usd());
        assert_eq!(m.rate, dec!(0.028));
        assert_eq!(m.range_id, Some(1));
    }

    #[test]
    fn test_rate_for_boundaries() {
        let band = Band::new(premium_spec()).unwrap();
        assert_eq!(band.rate_for(15, dec!(1), &usd()).range_id, Some(1));
        assert_eq!(band.rate_for(16, dec!(1), &usd()).range_id, Some(2));
        assert_eq!(band.rate_for(-999, dec!(1), &usd()).range_id, Some(1));
        let late = band.rate_for(999, dec!(1), &usd());
        assert_eq!(late.range_id, Some(3));
        assert!(late.is_zero());
    }

    #[test]
    fn test_rate_for_currency_mismatch() {
        let mut spec = premium_spec();
        spec.currency = Some(usd());
        let band = Band::new(spec).unwrap();
        let m = band.rate_for(2, dec!(1000), &CurrencyCode::new("EUR").unwrap());
        assert_eq!(m, BandMatch::none());
    }

    #[test]
    fn test_rate_for_respects_range_filters() {
        let mut spec = premium_spec();
        spec.ranges[0].min_payment_amount = Some(dec!(500));
        spec.ranges[1].currency = Some(usd());
        let band = Band::new(spec).unwrap();

        assert_eq!(band.rate_for(2, dec!(499.99), &usd()), BandMatch::none());
        assert_eq!(band.rate_for(2, dec!(500), &usd()).range_id, Some(1));
        let eur = CurrencyCode::new("EUR").unwrap();
        assert_eq!(band.rate_for(20, dec!(100), &eur), BandMatch::none());
    }

    #[test]
    fn test_indicator_rate_as_fraction() {
        let mut spec = premium_spec();
        spec.ranges[0].indicator_rate = Some(dec!(3.5));
        let band = Band::new(spec).unwrap();
        assert_eq!(band.rate_for(0, dec!(1), &usd()).indicator_rate, dec!(0.035));
    }

    #[test]
    fn test_overlap_rejected() {
        let mut spec = premium_spec();
        spec.ranges[1].day_from = 15;
        let err = Band::new(spec).unwrap_err();
        assert!(matches!(err, CommissionError::Configuration(ref m) if m.contains("overlap")));
    }

    #[test]
    fn test_gap_rejected() {
        let mut spec = premium_spec();
        spec.ranges[1].day_from = 18;
        let err = Band::new(spec).unwrap_err();
        assert!(matches!(err, CommissionError::Configuration(ref m) if m.contains("16 to 17")));
    }

    #[test]
    fn test_coverage_bounds_rejected() {
        let mut spec = premium_spec();
        spec.ranges[0].day_from = -10;
        assert!(Band::new(spec).is_err());

        let mut spec = premium_spec();
        spec.ranges[2].day_to = 120;
        assert!(Band::new(spec).is_err());

        let mut spec = premium_spec();
        spec.ranges.clear();
        assert!(Band::new(spec).is_err());
    }

    #[test]
    fn test_invalid_range_values_rejected() {
        let mut spec = premium_spec();
        spec.ranges[0].commission_rate = dec!(-1);
        assert!(Band::new(spec).is_err());

        let inverted = Range::new(9, 10, 5, dec!(1));
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_failed_mutation_leaves_band_unchanged() {
        let mut band = Band::new(premium_spec()).unwrap();
        let before = band.clone();

        assert!(band.add_range(Range::new(4, 10, 20, dec!(1))).is_err());
        assert!(band.remove_range(2).is_err());
        assert!(matches!(band.remove_range(42), Err(CommissionError::NotFound(_))));
        assert_eq!(band, before);
    }

    #[test]
    fn test_replace_ranges_revalidates() {
        let mut band = Band::new(premium_spec()).unwrap();
        band.replace_ranges(vec![
            Range::new(10, -1000, 0, dec!(3)),
            Range::new(11, 1, 1000, dec!(1)),
        ])
        .unwrap();
        assert_eq!(band.ranges().len(), 2);
        assert_eq!(band.rate_for(0, dec!(1), &usd()).range_id, Some(10));
    }

    #[test]
    fn test_deserialization_validates() {
        let json = r#"{"id":1,"company":1,"code":"B","name":"B","ranges":[
            {"id":1,"day_from":-999,"day_to":0,"commission_rate":"1"}]}"#;
        assert!(serde_json::from_str::<Band>(json).is_err());
    }

    #[test]
    fn test_display_labels() {
        let band = Band::new(premium_spec()).unwrap();
        assert_eq!(band.ranges()[0].display_label(), "Up to 15 days (2.80%)");
        assert_eq!(band.ranges()[1].display_label(), "16 to 30 days (2.30%)");
        assert_eq!(band.ranges()[2].display_label(), "From 31 days onwards (0.00%)");
        assert_eq!(band.display_name(), "[BAND_PREMIUM] Premium");
    }

    #[test]
    fn test_coverage_report_lists_all_problems() {
        let ranges = vec![
            Range::new(1, -999, 10, dec!(1)),
            Range::new(2, 5, 20, dec!(1)),
            Range::new(3, 25, 900, dec!(1)),
        ];
        let report = CoverageReport::of(&ranges);
        assert_eq!(report.overlaps, vec![(1, 2)]);
        assert_eq!(report.gaps, vec![(21, 24)]);
        assert!(report.covers_lower);
        assert!(!report.covers_upper);
        assert!(!report.is_partition());
    }
}
