use commission_band::application::calculator::calculate;
use commission_band::domain::band::{Band, BandSpec, Range, DAY_LOWER_BOUND, DAY_UPPER_BOUND};
use commission_band::domain::ledger::{Invoice, Payment, PaymentDirection};
use commission_band::domain::money::CurrencyCode;
use commission_band::domain::rule::CommissionMethod;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// Splits the day axis at `cuts`; range `i` gets id `i + 1` and rate `i + 1` %.
fn partition(cuts: &BTreeSet<i64>) -> Vec<Range> {
    let starts: Vec<i64> = std::iter::once(DAY_LOWER_BOUND).chain(cuts.iter().copied()).collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, start)| {
            let end = starts.get(i + 1).map_or(DAY_UPPER_BOUND, |next| next - 1);
            Range::new(i as u32 + 1, *start, end, Decimal::from(i as u32 + 1))
        })
        .collect()
}

fn band(ranges: Vec<Range>) -> Result<Band, commission_band::error::CommissionError> {
    Band::new(BandSpec {
        id: 1,
        company: 1,
        code: "PROP".into(),
        name: "Generated".into(),
        active: true,
        currency: None,
        ranges,
    })
}

fn usd() -> CurrencyCode {
    CurrencyCode::new("USD").unwrap()
}

proptest! {
    #[test]
    fn test_partition_matches_exactly_one_range(
        cuts in prop::collection::btree_set(DAY_LOWER_BOUND + 1..=DAY_UPPER_BOUND, 0..6),
        day in DAY_LOWER_BOUND..=DAY_UPPER_BOUND,
    ) {
        let ranges = partition(&cuts);
        let band = band(ranges.clone()).unwrap();

        let owners: Vec<&Range> = ranges.iter().filter(|r| r.day_from <= day && day <= r.day_to).collect();
        prop_assert_eq!(owners.len(), 1);

        let found = band.rate_for(day, Decimal::ONE_HUNDRED, &usd());
        prop_assert_eq!(found.range_id, Some(owners[0].id));
        prop_assert_eq!(found.rate, owners[0].commission_rate / Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_removing_a_range_breaks_the_partition(
        cuts in prop::collection::btree_set(DAY_LOWER_BOUND + 1..=DAY_UPPER_BOUND, 1..6),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut ranges = partition(&cuts);
        ranges.remove(pick.index(ranges.len()));
        prop_assert!(band(ranges).is_err());
    }

    #[test]
    fn test_band_commission_is_rate_times_amount(
        cents in 1u64..100_000_000u64,
        days in -60i64..120,
    ) {
        let ranges = vec![
            Range::new(1, DAY_LOWER_BOUND, 0, Decimal::new(30, 1)),
            Range::new(2, 1, 30, Decimal::new(28, 1)),
            Range::new(3, 31, DAY_UPPER_BOUND, Decimal::new(15, 1)),
        ];
        let band = band(ranges).unwrap();
        let due = "2024-03-01".parse::<chrono::NaiveDate>().unwrap();
        let amount = Decimal::new(cents as i64, 2);
        let invoice = Invoice {
            id: 1,
            company: 1,
            name: String::new(),
            partner: 1,
            invoice_date: due,
            due_date: due,
            payment_term: None,
            salesperson: Some(7),
            lines: Vec::new(),
        };
        let payment = Payment {
            id: 1,
            company: 1,
            name: String::new(),
            date: due + chrono::Duration::days(days),
            amount: amount.try_into().unwrap(),
            currency: usd(),
            direction: PaymentDirection::Inbound,
            partner: 1,
            journal: 1,
            reconciled: true,
            posted: true,
            skip_commission: false,
            invoices: vec![1],
        };

        let result = calculate(&CommissionMethod::Band { band: 1 }, &payment, &invoice, Some(&band), 2).unwrap();
        let matched = band.rate_for(days, amount, &usd());
        prop_assert_eq!(result.days_overdue, days);
        prop_assert_eq!(result.range, matched.range_id);
        prop_assert!(result.amount >= Decimal::ZERO);
        prop_assert!((result.amount - amount * matched.rate).abs() <= Decimal::new(5, 3));
    }
}
