//! Read-only rollups over calculations: per-salesperson statistics and
//! per-payment totals.
//!
//! Amounts are in company currency unless a field says otherwise. Only
//! validated, approved and paid calculations count as earned.

use super::calculation::{Calculation, CalculationState};
use super::money::{round_amount, CurrencyCode};
use super::{PaymentId, UserId};
use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

/// How late a payment arrived, relative to the invoice due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayBucket {
    Early,
    OnTime,
    Minor,
    Moderate,
    Major,
    Critical,
}

impl DelayBucket {
    pub const ALL: [DelayBucket; 6] = [
        Self::Early,
        Self::OnTime,
        Self::Minor,
        Self::Moderate,
        Self::Major,
        Self::Critical,
    ];

    pub fn of(days_overdue: i64) -> Self {
        match days_overdue {
            d if d < 0 => Self::Early,
            0..=15 => Self::OnTime,
            16..=30 => Self::Minor,
            31..=60 => Self::Moderate,
            61..=120 => Self::Major,
            _ => Self::Critical,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Early => "Early (< 0 days)",
            Self::OnTime => "On Time (0-15 days)",
            Self::Minor => "Minor Delay (16-30 days)",
            Self::Moderate => "Moderate Delay (31-60 days)",
            Self::Major => "Major Delay (61-120 days)",
            Self::Critical => "Critical Delay (> 120 days)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTotals {
    pub state: CalculationState,
    pub count: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayTotals {
    pub bucket: DelayBucket,
    pub count: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotals {
    /// First day of the month.
    pub month: NaiveDate,
    pub count: usize,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalespersonStatistics {
    pub salesperson: UserId,
    /// Every calculation, cancelled ones included.
    pub calculation_count: usize,
    /// Earned commissions.
    pub total_commission: Decimal,
    /// Mean days overdue over earned commissions, zero when there are none.
    pub average_collection_days: Decimal,
    pub by_state: Vec<StateTotals>,
    /// Earned commissions only.
    pub by_delay: Vec<DelayTotals>,
    /// Earned commissions of the twelve months ending with `today`'s month,
    /// oldest first.
    pub monthly: Vec<MonthlyTotals>,
}

const STATES: [CalculationState; 6] = [
    CalculationState::Draft,
    CalculationState::Calculated,
    CalculationState::Validated,
    CalculationState::Approved,
    CalculationState::Paid,
    CalculationState::Cancelled,
];

fn totals<'a>(calculations: impl Iterator<Item = &'a Calculation>, scale: u32) -> (usize, Decimal) {
    let (count, amount) = calculations.fold((0, Decimal::ZERO), |(n, sum), c| {
        (n + 1, sum + c.commission_amount_company())
    });
    (count, round_amount(amount, scale))
}

/// Rolls up one salesperson's calculations. `calculations` must already be
/// restricted to that salesperson and company.
pub fn salesperson_statistics(
    salesperson: UserId,
    calculations: &[Calculation],
    today: NaiveDate,
    scale: u32,
) -> SalespersonStatistics {
    let earned: Vec<&Calculation> = calculations.iter().filter(|c| c.state.is_earned()).collect();

    let (_, total_commission) = totals(earned.iter().copied(), scale);
    let average_collection_days = if earned.is_empty() {
        Decimal::ZERO
    } else {
        let days: i64 = earned.iter().map(|c| c.days_overdue).sum();
        round_amount(Decimal::from(days) / Decimal::from(earned.len()), 2)
    };

    let by_state = STATES
        .iter()
        .map(|state| {
            let (count, amount) = totals(calculations.iter().filter(|c| c.state == *state), scale);
            StateTotals {
                state: *state,
                count,
                amount,
            }
        })
        .collect();

    let by_delay = DelayBucket::ALL
        .iter()
        .map(|bucket| {
            let (count, amount) = totals(
                earned.iter().copied().filter(|c| DelayBucket::of(c.days_overdue) == *bucket),
                scale,
            );
            DelayTotals {
                bucket: *bucket,
                count,
                amount,
            }
        })
        .collect();

    let this_month = today.with_day(1).unwrap_or(today);
    let monthly = (0..12u32)
        .rev()
        .filter_map(|back| this_month.checked_sub_months(Months::new(back)))
        .map(|month| {
            let (count, amount) = totals(
                earned
                    .iter()
                    .copied()
                    .filter(|c| c.payment_date.year() == month.year() && c.payment_date.month() == month.month()),
                scale,
            );
            MonthlyTotals { month, count, amount }
        })
        .collect();

    SalespersonStatistics {
        salesperson,
        calculation_count: calculations.len(),
        total_commission,
        average_collection_days,
        by_state,
        by_delay,
        monthly,
    }
}

/// Commission owed on one payment, cancelled calculations excluded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentCommissions {
    pub payment: PaymentId,
    pub calculation_count: usize,
    /// Payment currency.
    pub currency: CurrencyCode,
    pub total: Decimal,
    pub total_company: Decimal,
}

/// Calculations always carry their payment's currency, so `total` needs no
/// conversion.
pub fn payment_commissions(
    payment: PaymentId,
    currency: CurrencyCode,
    calculations: &[Calculation],
    scale: u32,
) -> PaymentCommissions {
    let live: Vec<&Calculation> = calculations
        .iter()
        .filter(|c| c.payment == payment && c.state.is_active())
        .collect();
    let total = live.iter().map(|c| c.commission_amount).sum::<Decimal>();
    let (calculation_count, total_company) = totals(live.iter().copied(), scale);
    PaymentCommissions {
        payment,
        calculation_count,
        currency,
        total: round_amount(total, scale),
        total_company,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calculation::tests::new_calculation;
    use rust_decimal_macros::dec;

    fn calc(id: u64, amount: Decimal, paid: &str, state: CalculationState) -> Calculation {
        let mut new = new_calculation(amount);
        new.payment = id;
        new.invoice = id;
        new.payment_date = paid.parse().unwrap();
        let mut c = Calculation::create(id, new).unwrap();
        c.state = state;
        c
    }

    #[test]
    fn test_delay_buckets() {
        assert_eq!(DelayBucket::of(-1), DelayBucket::Early);
        assert_eq!(DelayBucket::of(0), DelayBucket::OnTime);
        assert_eq!(DelayBucket::of(15), DelayBucket::OnTime);
        assert_eq!(DelayBucket::of(16), DelayBucket::Minor);
        assert_eq!(DelayBucket::of(60), DelayBucket::Moderate);
        assert_eq!(DelayBucket::of(120), DelayBucket::Major);
        assert_eq!(DelayBucket::of(121), DelayBucket::Critical);
    }

    #[test]
    fn test_salesperson_statistics() {
        // Due 2024-01-10 throughout.
        let calculations = vec![
            calc(1, dec!(30), "2024-01-12", CalculationState::Paid),
            calc(2, dec!(10), "2024-02-20", CalculationState::Validated),
            calc(3, dec!(5), "2024-02-21", CalculationState::Calculated),
            calc(4, dec!(7), "2024-02-22", CalculationState::Cancelled),
        ];
        let stats = salesperson_statistics(7, &calculations, "2024-03-05".parse().unwrap(), 2);

        assert_eq!(stats.calculation_count, 4);
        assert_eq!(stats.total_commission, dec!(40.00));
        // (2 + 41) / 2
        assert_eq!(stats.average_collection_days, dec!(21.50));

        let calculated = stats.by_state.iter().find(|s| s.state == CalculationState::Calculated).unwrap();
        assert_eq!((calculated.count, calculated.amount), (1, dec!(5.00)));

        let on_time = &stats.by_delay[1];
        assert_eq!((on_time.bucket, on_time.count), (DelayBucket::OnTime, 1));
        let moderate = &stats.by_delay[3];
        assert_eq!((moderate.count, moderate.amount), (1, dec!(10.00)));

        assert_eq!(stats.monthly.len(), 12);
        assert_eq!(stats.monthly[11].month, "2024-03-01".parse::<NaiveDate>().unwrap());
        assert_eq!(stats.monthly[10].amount, dec!(10.00));
        assert_eq!(stats.monthly[9].amount, dec!(30.00));
        assert_eq!(stats.monthly[0].month, "2023-04-01".parse::<NaiveDate>().unwrap());
    }

    #[test]
    fn test_statistics_without_earned_commissions() {
        let calculations = vec![calc(1, dec!(30), "2024-01-12", CalculationState::Calculated)];
        let stats = salesperson_statistics(7, &calculations, "2024-01-31".parse().unwrap(), 2);
        assert_eq!(stats.total_commission, dec!(0));
        assert_eq!(stats.average_collection_days, Decimal::ZERO);
        assert!(stats.by_delay.iter().all(|d| d.count == 0));
    }

    #[test]
    fn test_payment_commissions_skip_cancelled() {
        let mut second = calc(1, dec!(12.5), "2024-01-12", CalculationState::Validated);
        second.id = 2;
        second.exchange_rate = dec!(2);
        let calculations = vec![
            calc(1, dec!(30), "2024-01-12", CalculationState::Calculated),
            second,
            calc(1, dec!(99), "2024-01-12", CalculationState::Cancelled),
        ];
        let totals = payment_commissions(1, CurrencyCode::new("USD").unwrap(), &calculations, 2);
        assert_eq!(totals.calculation_count, 2);
        assert_eq!(totals.total, dec!(42.50));
        assert_eq!(totals.total_company, dec!(55.00));
    }
}
