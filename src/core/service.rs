//! The portfolio operations exposed to front-ends.
//!
//! Every operation fetches its own rate set and rounds monetary output to two
//! decimals on the way out; stored snapshots keep full precision.

use crate::core::allocation::{self, AllocationReport};
use crate::core::currency::{CurrencyValues, FxRateProvider, FxRateSet, ReportingCurrency};
use crate::core::error::{Result, TrackerError};
use crate::core::holding::{Holding, HoldingRef, Transaction, ValueIncrement};
use crate::core::price::{PriceProvider, PriceQuote};
use crate::core::roi::{self, CashFlow, ChartPoint, RoiRange, RoiResult, ValuePoint};
use crate::core::snapshot::{BuildingSnapshot, Snapshot, SnapshotDetail, SnapshotId};
use crate::core::store::{HoldingsStore, SnapshotStore};
use crate::core::valuation::{self, PortfolioValuation};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::try_join_all;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A flow before conversion: native amount and currency.
struct RawFlow {
    holding: HoldingRef,
    at: DateTime<Utc>,
    date: NaiveDate,
    amount: f64,
    currency: String,
}

pub struct PortfolioService {
    holdings: Arc<dyn HoldingsStore>,
    snapshots: Arc<dyn SnapshotStore>,
    prices: Arc<dyn PriceProvider + Send + Sync>,
    rates: Arc<dyn FxRateProvider + Send + Sync>,
    price_timeout: Duration,
}

impl PortfolioService {
    pub fn new(
        holdings: Arc<dyn HoldingsStore>,
        snapshots: Arc<dyn SnapshotStore>,
        prices: Arc<dyn PriceProvider + Send + Sync>,
        rates: Arc<dyn FxRateProvider + Send + Sync>,
        price_timeout: Duration,
    ) -> Self {
        PortfolioService {
            holdings,
            snapshots,
            prices,
            rates,
            price_timeout,
        }
    }

    /// Current value of every holding under one freshly fetched rate set.
    #[instrument(skip(self))]
    pub async fn valuate_portfolio(&self) -> Result<PortfolioValuation> {
        let holdings = self.holdings.holdings()?;
        let valuation = self.valuate(&holdings).await?;
        Ok(valuation.rounded())
    }

    #[instrument(skip(self))]
    pub async fn create_snapshot(&self) -> Result<Snapshot> {
        let holdings = self.holdings.holdings()?;
        let labels = self.holdings.labels()?;
        let valuation = self.valuate(&holdings).await?;

        let snapshot = BuildingSnapshot::from_valuation(&valuation, &holdings, &labels, Utc::now())
            .commit(self.snapshots.as_ref())?;
        Ok(snapshot.rounded())
    }

    /// Committed snapshots, oldest first.
    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        Ok(self
            .snapshots
            .list()?
            .into_iter()
            .map(Snapshot::rounded)
            .collect())
    }

    pub fn get_snapshot(&self, id: SnapshotId) -> Result<Option<SnapshotDetail>> {
        let Some(snapshot) = self.snapshots.get(id)? else {
            return Ok(None);
        };
        let items = self.snapshots.items(id)?;
        Ok(Some(SnapshotDetail { snapshot, items }.rounded()))
    }

    /// Return over the snapshots in `range`, optionally limited to holdings
    /// carrying any of `labels`.
    #[instrument(skip(self))]
    pub async fn compute_roi(&self, range: RoiRange, labels: &[String]) -> Result<RoiResult> {
        let (points, flows) = self.history(range, labels, Utc::now()).await?;
        Ok(roi::compute_roi(range, &points, &flows).rounded())
    }

    #[instrument(skip(self))]
    pub async fn get_chart_data(
        &self,
        range: RoiRange,
        labels: &[String],
    ) -> Result<Vec<ChartPoint>> {
        let (points, flows) = self.history(range, labels, Utc::now()).await?;
        Ok(roi::chart_points(&points, &flows))
    }

    #[instrument(skip(self))]
    pub async fn analyze_allocation_group(
        &self,
        group_id: u64,
        currency: ReportingCurrency,
    ) -> Result<AllocationReport> {
        let group = self
            .holdings
            .allocation_group(group_id)?
            .ok_or(TrackerError::AllocationGroupNotFound(group_id))?;

        let members: HashSet<HoldingRef> = group.members.iter().map(|m| m.holding).collect();
        let holdings: Vec<Holding> = self
            .holdings
            .holdings()?
            .into_iter()
            .filter(|h| members.contains(&h.holding_ref()))
            .collect();
        if holdings.is_empty() {
            debug!("Allocation group {group_id} has no live members");
            return Ok(AllocationReport::empty(&group, currency));
        }

        let valuation = self.valuate(&holdings).await?;
        Ok(allocation::analyze(&group, &valuation, currency).rounded())
    }

    /// Buys (positive) or withdraws (negative) shares of a stock holding. The
    /// price is taken in the holding's known currency, looked up if needed.
    #[instrument(skip(self, notes))]
    pub async fn add_shares(
        &self,
        holding: HoldingRef,
        shares: f64,
        price_per_share: f64,
        date: NaiveDate,
        notes: Option<String>,
    ) -> Result<Transaction> {
        let stock = self
            .holdings
            .holdings()?
            .into_iter()
            .find_map(|h| match h {
                Holding::Stock(s) if HoldingRef::stock(s.id) == holding => Some(s),
                _ => None,
            })
            .ok_or(TrackerError::HoldingNotFound(holding))?;

        let currency = match stock.known_currency() {
            Some(currency) => currency.to_uppercase(),
            None => {
                let quote = self.fetch_quote(&stock.ticker).await?;
                self.holdings
                    .record_quote_currency(holding, &quote.currency)?;
                quote.currency.to_uppercase()
            }
        };

        let tx = self
            .holdings
            .add_shares(holding, shares, price_per_share, &currency, date, notes)?;
        info!(
            "Recorded {} shares of {} at {} {}",
            tx.shares, stock.ticker, tx.price_per_share, tx.currency
        );
        Ok(tx)
    }

    #[instrument(skip(self, notes))]
    pub async fn add_value(
        &self,
        holding: HoldingRef,
        amount: f64,
        date: NaiveDate,
        notes: Option<String>,
    ) -> Result<ValueIncrement> {
        let increment = self.holdings.add_value(holding, amount, date, notes)?;
        info!(
            "Recorded {} {} for {}",
            increment.amount, increment.currency, holding
        );
        Ok(increment)
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<PriceQuote> {
        match tokio::time::timeout(self.price_timeout, self.prices.fetch_price(ticker)).await {
            Ok(quote) => quote,
            Err(_) => Err(TrackerError::PriceUnavailable {
                ticker: ticker.to_string(),
                reason: format!(
                    "lookup timed out after {}s",
                    self.price_timeout.as_secs_f64()
                ),
            }),
        }
    }

    /// Fetches quotes and the rate set together, then values `holdings`.
    async fn valuate(&self, holdings: &[Holding]) -> Result<PortfolioValuation> {
        let (quotes, rates) = tokio::try_join!(
            valuation::fetch_quotes(holdings, self.prices.as_ref(), self.price_timeout),
            self.rates.latest_rates()
        )?;
        let valuation = valuation::valuate_holdings(holdings, &quotes, rates)?;

        for holding in holdings {
            let Holding::Stock(stock) = holding else {
                continue;
            };
            let Some(quote) = quotes.get(&stock.ticker.to_uppercase()) else {
                continue;
            };
            if stock.last_known_currency.as_deref() != Some(quote.currency.as_str()) {
                if let Err(e) = self
                    .holdings
                    .record_quote_currency(holding.holding_ref(), &quote.currency)
                {
                    warn!("Failed to remember currency of {}: {e}", stock.ticker);
                }
            }
        }
        Ok(valuation)
    }

    /// Snapshot totals in range and the converted cash flows between them.
    async fn history(
        &self,
        range: RoiRange,
        labels: &[String],
        now: DateTime<Utc>,
    ) -> Result<(Vec<ValuePoint>, Vec<CashFlow>)> {
        let snapshots: Vec<Snapshot> = self
            .snapshots
            .list()?
            .into_iter()
            .filter(|s| range.contains(s.taken_at, now))
            .collect();

        let mut points = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let totals = if labels.is_empty() {
                snapshot.totals
            } else {
                let items = self.snapshots.items(snapshot.id)?;
                SnapshotDetail {
                    snapshot: snapshot.clone(),
                    items,
                }
                .totals_for_labels(labels)
            };
            points.push(ValuePoint {
                taken_at: snapshot.taken_at,
                totals,
            });
        }

        let (Some(first), Some(last)) = (
            points.iter().map(|p| p.taken_at).min(),
            points.iter().map(|p| p.taken_at).max(),
        ) else {
            return Ok((points, vec![]));
        };

        let included = self.labelled_holdings(labels)?;
        let raw: Vec<RawFlow> = self
            .raw_flows()?
            .into_iter()
            .filter(|f| f.at > first && f.at < last)
            .filter(|f| included.as_ref().is_none_or(|set| set.contains(&f.holding)))
            .collect();

        let flows = self.convert_flows(raw).await?;
        Ok((points, flows))
    }

    /// Holdings currently carrying any of `labels`; `None` when unfiltered.
    fn labelled_holdings(&self, labels: &[String]) -> Result<Option<HashSet<HoldingRef>>> {
        if labels.is_empty() {
            return Ok(None);
        }
        let label_ids: HashSet<u64> = self
            .holdings
            .labels()?
            .into_iter()
            .filter(|l| labels.iter().any(|n| n.eq_ignore_ascii_case(&l.name)))
            .map(|l| l.id)
            .collect();
        Ok(Some(
            self.holdings
                .holdings()?
                .iter()
                .filter(|h| h.labels().iter().any(|id| label_ids.contains(id)))
                .map(Holding::holding_ref)
                .collect(),
        ))
    }

    fn raw_flows(&self) -> Result<Vec<RawFlow>> {
        let transactions = self.holdings.transactions()?.into_iter().map(|tx| RawFlow {
            holding: tx.holding,
            at: tx.effective_at(),
            date: tx.date,
            amount: tx.amount(),
            currency: tx.currency,
        });
        let increments = self
            .holdings
            .value_increments()?
            .into_iter()
            .map(|inc| RawFlow {
                holding: inc.holding,
                at: inc.effective_at(),
                date: inc.date,
                amount: inc.amount,
                currency: inc.currency,
            });
        Ok(transactions.chain(increments).collect())
    }

    /// Converts each flow with the rate set of its own date, fetching one set
    /// per distinct date.
    async fn convert_flows(&self, raw: Vec<RawFlow>) -> Result<Vec<CashFlow>> {
        let dates: BTreeSet<NaiveDate> = raw.iter().map(|f| f.date).collect();
        debug!("Fetching rates for {} flow dates", dates.len());

        let fetches = dates.into_iter().map(|date| async move {
            let rates = self.rates.rates_on(date).await?;
            Ok::<_, TrackerError>((date, rates))
        });
        let rates: HashMap<NaiveDate, FxRateSet> =
            try_join_all(fetches).await?.into_iter().collect();

        raw.into_iter()
            .map(|f| {
                let set = rates.get(&f.date).ok_or_else(|| {
                    TrackerError::RatesUnavailable(format!("no rates fetched for {}", f.date))
                })?;
                Ok(CashFlow {
                    at: f.at,
                    amount: CurrencyValues::from_native(f.amount, &f.currency, set)?,
                })
            })
            .collect()
    }
}
