use crate::domain::money::CurrencyCode;
use crate::domain::ports::CurrencyService;
use crate::domain::CompanyId;
use crate::error::{CommissionError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One published rate: `1 from = rate to` from `date` onwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub date: NaiveDate,
    pub rate: Decimal,
}

/// Exchange rates keyed by currency pair and effective date.
///
/// A lookup uses the latest quote on or before the valuation date. When only
/// the opposite pair is quoted, its inverse is used. Rates are shared by all
/// companies.
#[derive(Default, Clone)]
pub struct RateTable {
    quotes: Arc<RwLock<HashMap<(CurrencyCode, CurrencyCode), BTreeMap<NaiveDate, Decimal>>>>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_quote(&self, quote: RateQuote) -> Result<()> {
        if quote.rate <= Decimal::ZERO {
            return Err(CommissionError::configuration(format!(
                "Exchange rate {}→{} on {} must be positive",
                quote.from, quote.to, quote.date
            )));
        }
        let mut quotes = self.quotes.write().await;
        quotes
            .entry((quote.from, quote.to))
            .or_default()
            .insert(quote.date, quote.rate);
        Ok(())
    }

    fn latest(series: Option<&BTreeMap<NaiveDate, Decimal>>, as_of: NaiveDate) -> Option<Decimal> {
        series?.range(..=as_of).next_back().map(|(_, rate)| *rate)
    }
}

#[async_trait]
impl CurrencyService for RateTable {
    async fn rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        _company: CompanyId,
        as_of: NaiveDate,
    ) -> Result<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let quotes = self.quotes.read().await;
        if let Some(rate) = Self::latest(quotes.get(&(from.clone(), to.clone())), as_of) {
            return Ok(rate);
        }
        if let Some(rate) = Self::latest(quotes.get(&(to.clone(), from.clone())), as_of) {
            return Ok(Decimal::ONE / rate);
        }
        Err(CommissionError::Currency(format!(
            "No {}→{} exchange rate on or before {}",
            from, to, as_of
        )))
    }
}
