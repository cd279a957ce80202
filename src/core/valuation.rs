//! Values holdings in their native currency and in every reporting currency.
use crate::core::currency::{CurrencyValues, FxRateSet};
use crate::core::error::{Result, TrackerError};
use crate::core::holding::{Holding, HoldingRef};
use crate::core::price::{PriceProvider, PriceQuote};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, instrument};

/// The value of a single holding under one rate set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub holding: HoldingRef,
    pub name: String,
    pub ticker: Option<String>,
    pub shares: Option<f64>,
    pub price: Option<f64>,
    pub native_value: f64,
    pub native_currency: String,
    pub values: CurrencyValues,
}

impl HoldingValuation {
    pub fn rounded(mut self) -> Self {
        self.native_value = crate::core::currency::round2(self.native_value);
        self.values = self.values.rounded();
        self
    }
}

/// Sum of native values sharing a currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyTotal {
    pub currency: String,
    pub total: f64,
    pub total_ron: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValuation {
    pub rates: FxRateSet,
    pub holdings: Vec<HoldingValuation>,
    pub totals: CurrencyValues,
    pub currency_totals: Vec<CurrencyTotal>,
}

impl PortfolioValuation {
    /// Share of the RON total held by `holding`, in percent.
    pub fn weight_of(&self, holding: &HoldingValuation) -> Option<f64> {
        if self.totals.ron > 0.0 {
            Some(holding.values.ron / self.totals.ron * 100.0)
        } else {
            None
        }
    }

    pub fn find(&self, holding: HoldingRef) -> Option<&HoldingValuation> {
        self.holdings.iter().find(|h| h.holding == holding)
    }

    pub fn rounded(self) -> Self {
        use crate::core::currency::round2;
        PortfolioValuation {
            rates: self.rates,
            holdings: self
                .holdings
                .into_iter()
                .map(HoldingValuation::rounded)
                .collect(),
            totals: self.totals.rounded(),
            currency_totals: self
                .currency_totals
                .into_iter()
                .map(|t| CurrencyTotal {
                    currency: t.currency,
                    total: round2(t.total),
                    total_ron: round2(t.total_ron),
                })
                .collect(),
        }
    }
}

/// Values one holding. Stocks need the latest quote for their ticker.
pub fn valuate_holding(
    holding: &Holding,
    quote: Option<&PriceQuote>,
    rates: &FxRateSet,
) -> Result<HoldingValuation> {
    let (name, shares, price, native_value, native_currency) = match holding {
        Holding::Stock(stock) => {
            let quote = quote.ok_or_else(|| TrackerError::PriceUnavailable {
                ticker: stock.ticker.clone(),
                reason: "no quote was fetched".to_string(),
            })?;
            let currency = stock
                .currency_override
                .clone()
                .unwrap_or_else(|| quote.currency.clone());
            // A user chosen name wins over the provider's short name.
            let name = stock
                .display_name
                .as_ref()
                .or(quote.short_name.as_ref())
                .unwrap_or(&stock.ticker)
                .clone();
            (
                name,
                Some(stock.shares),
                Some(quote.price),
                stock.shares * quote.price,
                currency,
            )
        }
        Holding::Manual(manual) => (
            manual.name.clone(),
            None,
            None,
            manual.value,
            manual.currency.clone(),
        ),
    };

    let values = CurrencyValues::from_native(native_value, &native_currency, rates)?;
    debug!("Valued {name} at {native_value} {native_currency} ({} RON)", values.ron);

    Ok(HoldingValuation {
        holding: holding.holding_ref(),
        name,
        ticker: holding.ticker().map(str::to_string),
        shares,
        price,
        native_value,
        native_currency: native_currency.to_uppercase(),
        values,
    })
}

/// Values every holding with already fetched quotes. Any failure aborts the
/// whole valuation.
pub fn valuate_holdings(
    holdings: &[Holding],
    quotes: &HashMap<String, PriceQuote>,
    rates: FxRateSet,
) -> Result<PortfolioValuation> {
    let mut valued = Vec::with_capacity(holdings.len());
    let mut by_currency: BTreeMap<String, (f64, f64)> = BTreeMap::new();

    for holding in holdings {
        let quote = holding
            .ticker()
            .and_then(|t| quotes.get(&t.to_uppercase()));
        let value = valuate_holding(holding, quote, &rates)?;
        let entry = by_currency
            .entry(value.native_currency.clone())
            .or_insert((0.0, 0.0));
        entry.0 += value.native_value;
        entry.1 += value.values.ron;
        valued.push(value);
    }

    let totals = valued.iter().map(|h| h.values).sum();
    let currency_totals = by_currency
        .into_iter()
        .map(|(currency, (total, total_ron))| CurrencyTotal {
            currency,
            total,
            total_ron,
        })
        .collect();

    Ok(PortfolioValuation {
        rates,
        holdings: valued,
        totals,
        currency_totals,
    })
}

/// Fetches quotes for every distinct ticker concurrently. The first failure or
/// timeout fails the whole batch.
#[instrument(skip(holdings, provider))]
pub async fn fetch_quotes(
    holdings: &[Holding],
    provider: &(dyn PriceProvider + Send + Sync),
    timeout: Duration,
) -> Result<HashMap<String, PriceQuote>> {
    let mut tickers: Vec<String> = holdings
        .iter()
        .filter_map(|h| h.ticker().map(str::to_uppercase))
        .collect();
    tickers.sort();
    tickers.dedup();

    let fetches = tickers.into_iter().map(|ticker| async move {
        let fetched = tokio::time::timeout(timeout, provider.fetch_price(&ticker)).await;
        match fetched {
            Ok(Ok(quote)) => Ok((ticker, quote)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TrackerError::PriceUnavailable {
                reason: format!("lookup timed out after {}s", timeout.as_secs_f64()),
                ticker,
            }),
        }
    });

    let quotes = try_join_all(fetches).await?;
    Ok(quotes.into_iter().collect())
}

/// Fetches quotes and values the portfolio under `rates`.
pub async fn valuate_portfolio(
    holdings: &[Holding],
    provider: &(dyn PriceProvider + Send + Sync),
    rates: FxRateSet,
    timeout: Duration,
) -> Result<PortfolioValuation> {
    let quotes = fetch_quotes(holdings, provider, timeout).await?;
    valuate_holdings(holdings, &quotes, rates)
}
