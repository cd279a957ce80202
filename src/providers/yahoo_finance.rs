use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::util::with_retry;
use crate::core::cache::Cache;
use crate::core::currency::{FxRateProvider, FxRateSet};
use crate::core::error::TrackerError;
use crate::core::price::{PriceProvider, PriceQuote};

const USER_AGENT: &str = "folio/1.0";
const RETRIES: usize = 2;
const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(300);

const EUR_PAIR: &str = "EURRON=X";
const USD_PAIR: &str = "USDRON=X";
const LATEST: &str = "latest";

/// Days before a requested date searched for the last close (weekends, holidays).
const HISTORY_LOOKBACK_DAYS: i64 = 7;

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    currency: Option<String>,
    #[serde(alias = "shortName")]
    short_name: Option<String>,
}

impl ChartItem {
    /// Last close at or before `cutoff`.
    fn close_on_or_before(&self, cutoff: DateTime<Utc>) -> Option<f64> {
        let timestamps = self.timestamp.as_ref()?;
        let closes = self
            .indicators
            .as_ref()
            .and_then(|inds| inds.quote.first())
            .and_then(|q| q.close.as_ref())?;

        timestamps
            .iter()
            .zip(closes)
            .filter(|(ts, _)| **ts <= cutoff.timestamp())
            .filter_map(|(_, close)| *close)
            .last()
    }
}

/// Fetches the first chart result for `symbol` from Yahoo's chart endpoint.
async fn fetch_chart(base_url: &str, symbol: &str, query: &[(&str, String)]) -> Result<ChartItem> {
    let url = format!("{base_url}/v8/finance/chart/{symbol}");
    debug!("Requesting chart data from {}", url);

    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
    let response = with_retry(
        || async { client.get(&url).query(query).send().await?.error_for_status() },
        RETRIES,
        RETRY_DELAY,
    )
    .await
    .map_err(|e| anyhow!("Request error: {} for symbol: {}", e, symbol))?;

    let data = response
        .json::<YahooChartResponse>()
        .await
        .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

    data.chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("No chart data found for symbol: {}", symbol))
}

fn positive(value: Option<f64>, what: &str) -> Result<f64> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(v) => Err(anyhow!("{what} is not a positive number: {v}")),
        None => Err(anyhow!("{what} is missing")),
    }
}

pub struct YahooFinanceProvider {
    base_url: String,
    cache: Arc<Cache<String, PriceQuote>>,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str, cache: Arc<Cache<String, PriceQuote>>) -> Self {
        YahooFinanceProvider {
            base_url: base_url.to_string(),
            cache,
        }
    }

    async fn lookup(&self, ticker: &str) -> Result<PriceQuote> {
        let item = fetch_chart(&self.base_url, ticker, &[]).await?;
        let price = positive(item.meta.regular_market_price, "market price")?;
        let currency = item
            .meta
            .currency
            .ok_or_else(|| anyhow!("no currency reported"))?;
        Ok(PriceQuote {
            price,
            currency: currency.to_uppercase(),
            short_name: item.meta.short_name,
        })
    }
}

#[async_trait]
impl PriceProvider for YahooFinanceProvider {
    #[instrument(name = "YahooPriceFetch", skip(self), fields(ticker = %ticker))]
    async fn fetch_price(&self, ticker: &str) -> crate::core::error::Result<PriceQuote> {
        let key = ticker.to_uppercase();
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let quote = self
            .lookup(&key)
            .await
            .map_err(|e| TrackerError::PriceUnavailable {
                ticker: key.clone(),
                reason: e.to_string(),
            })?;
        debug!("{key} quoted at {} {}", quote.price, quote.currency);

        self.cache.put(key, quote.clone()).await;
        Ok(quote)
    }
}

/// EUR and USD rates against RON from the `EURRON=X` and `USDRON=X` pairs.
pub struct YahooFxProvider {
    base_url: String,
    latest: Arc<Cache<String, FxRateSet>>,
    historical: Arc<Cache<NaiveDate, FxRateSet>>,
}

impl YahooFxProvider {
    /// `latest` should expire; historical rates never change and are kept.
    pub fn new(base_url: &str, latest: Arc<Cache<String, FxRateSet>>) -> Self {
        YahooFxProvider {
            base_url: base_url.to_string(),
            latest,
            historical: Arc::new(Cache::default()),
        }
    }

    async fn latest_pair(&self, pair: &str) -> Result<f64> {
        let item = fetch_chart(&self.base_url, pair, &[]).await?;
        positive(item.meta.regular_market_price, pair)
    }

    async fn pair_on(&self, pair: &str, date: NaiveDate) -> Result<f64> {
        let day_start = date.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + Duration::days(1);
        let query = [
            (
                "period1",
                (day_start - Duration::days(HISTORY_LOOKBACK_DAYS))
                    .timestamp()
                    .to_string(),
            ),
            ("period2", day_end.timestamp().to_string()),
            ("interval", "1d".to_string()),
        ];
        let item = fetch_chart(&self.base_url, pair, &query).await?;
        let close = item.close_on_or_before(day_end - Duration::seconds(1));
        positive(close, &format!("{pair} close on {date}"))
    }
}

#[async_trait]
impl FxRateProvider for YahooFxProvider {
    #[instrument(skip(self))]
    async fn latest_rates(&self) -> crate::core::error::Result<FxRateSet> {
        if let Some(cached) = self.latest.get(&LATEST.to_string()).await {
            return Ok(cached);
        }

        let (eur, usd) = tokio::try_join!(self.latest_pair(EUR_PAIR), self.latest_pair(USD_PAIR))
            .map_err(|e| TrackerError::RatesUnavailable(e.to_string()))?;
        let rates = FxRateSet::new(Utc::now(), eur, usd);
        debug!("Latest rates: EUR {eur} RON, USD {usd} RON");

        self.latest.put(LATEST.to_string(), rates.clone()).await;
        Ok(rates)
    }

    #[instrument(skip(self))]
    async fn rates_on(&self, date: NaiveDate) -> crate::core::error::Result<FxRateSet> {
        if let Some(cached) = self.historical.get(&date).await {
            return Ok(cached);
        }

        let (eur, usd) = tokio::try_join!(
            self.pair_on(EUR_PAIR, date),
            self.pair_on(USD_PAIR, date)
        )
        .map_err(|e| TrackerError::RatesUnavailable(e.to_string()))?;
        let as_of = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        let rates = FxRateSet::new(as_of, eur, usd);

        self.historical.put(date, rates.clone()).await;
        Ok(rates)
    }
}
