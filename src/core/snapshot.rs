//! Immutable point-in-time copies of the portfolio.
//!
//! A snapshot is built in memory from a valuation, then committed to a
//! [`SnapshotStore`] in one step: either the header and every item become
//! visible together, or nothing does. Items carry copies of the holding and
//! label data so later edits, renames or deletions never reach history.

use crate::core::currency::{CurrencyValues, FxRateSet, round2};
use crate::core::error::Result;
use crate::core::holding::{Holding, HoldingKind, HoldingRef, Label, LabelId};
use crate::core::store::SnapshotStore;
use crate::core::valuation::PortfolioValuation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

pub type SnapshotId = u64;

/// Label as it was named and colored when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLabel {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotItem {
    /// Assigned when the snapshot is committed.
    pub snapshot_id: SnapshotId,
    pub holding_type: HoldingKind,
    pub ticker: Option<String>,
    pub name: String,
    pub labels: Vec<SnapshotLabel>,
    pub shares: Option<f64>,
    pub price: Option<f64>,
    pub native_value: f64,
    pub native_currency: String,
    pub values: CurrencyValues,
}

impl SnapshotItem {
    pub fn has_any_label(&self, names: &[String]) -> bool {
        self.labels
            .iter()
            .any(|l| names.iter().any(|n| n.eq_ignore_ascii_case(&l.name)))
    }

    pub fn rounded(mut self) -> Self {
        self.native_value = round2(self.native_value);
        self.values = self.values.rounded();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub taken_at: DateTime<Utc>,
    pub totals: CurrencyValues,
    /// The rate set every item was converted with.
    pub rates: FxRateSet,
    pub item_count: usize,
}

impl Snapshot {
    pub fn rounded(mut self) -> Self {
        self.totals = self.totals.rounded();
        self
    }
}

/// A committed snapshot together with its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDetail {
    pub snapshot: Snapshot,
    pub items: Vec<SnapshotItem>,
}

impl SnapshotDetail {
    /// Totals of the items carrying at least one of `labels`; all items when empty.
    pub fn totals_for_labels(&self, labels: &[String]) -> CurrencyValues {
        if labels.is_empty() {
            return self.snapshot.totals;
        }
        self.items
            .iter()
            .filter(|item| item.has_any_label(labels))
            .map(|item| item.values)
            .sum()
    }

    pub fn rounded(self) -> Self {
        SnapshotDetail {
            snapshot: self.snapshot.rounded(),
            items: self.items.into_iter().map(SnapshotItem::rounded).collect(),
        }
    }
}

/// A snapshot that exists only in memory.
#[derive(Debug, Clone)]
pub struct BuildingSnapshot {
    pub taken_at: DateTime<Utc>,
    pub rates: FxRateSet,
    pub totals: CurrencyValues,
    pub items: Vec<SnapshotItem>,
}

impl BuildingSnapshot {
    /// Copies every valued holding, with its current labels, into snapshot items.
    pub fn from_valuation(
        valuation: &PortfolioValuation,
        holdings: &[Holding],
        labels: &[Label],
        taken_at: DateTime<Utc>,
    ) -> Self {
        let labels_by_id: HashMap<LabelId, &Label> = labels.iter().map(|l| (l.id, l)).collect();
        let holding_labels: HashMap<HoldingRef, &[LabelId]> = holdings
            .iter()
            .map(|h| (h.holding_ref(), h.labels()))
            .collect();

        let items: Vec<SnapshotItem> = valuation
            .holdings
            .iter()
            .map(|h| {
                let labels = holding_labels
                    .get(&h.holding)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(|id| labels_by_id.get(id))
                            .map(|l| SnapshotLabel {
                                name: l.name.clone(),
                                color: l.color.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                SnapshotItem {
                    snapshot_id: 0,
                    holding_type: h.holding.kind,
                    ticker: h.ticker.clone(),
                    name: h.name.clone(),
                    labels,
                    shares: h.shares,
                    price: h.price,
                    native_value: h.native_value,
                    native_currency: h.native_currency.clone(),
                    values: h.values,
                }
            })
            .collect();

        let totals = items.iter().map(|i| i.values).sum();
        BuildingSnapshot {
            taken_at,
            rates: valuation.rates.clone(),
            totals,
            items,
        }
    }

    /// Writes the snapshot and all of its items atomically.
    pub fn commit(self, store: &dyn SnapshotStore) -> Result<Snapshot> {
        let mut txn = store.begin()?;
        let id = txn.id();
        let item_count = self.items.len();
        debug!("Staging {item_count} items for snapshot {id}");

        for mut item in self.items {
            item.snapshot_id = id;
            txn.stage(item)?;
        }

        let snapshot = txn.commit(Snapshot {
            id,
            taken_at: self.taken_at,
            totals: self.totals,
            rates: self.rates,
            item_count,
        })?;
        info!(
            "Committed snapshot {} with {} items, total {:.2} RON",
            snapshot.id, snapshot.item_count, snapshot.totals.ron
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TrackerError;
    use crate::core::holding::{ManualHolding, StockHolding};
    use crate::core::store::SnapshotTxn;
    use crate::core::valuation::HoldingValuation;
    use crate::store::memory::MemorySnapshotStore;
    use chrono::TimeZone;

    fn fixture() -> (PortfolioValuation, Vec<Holding>, Vec<Label>) {
        let rates = FxRateSet::new(Utc::now(), 5.0, 4.5);
        let holdings = vec![
            Holding::Stock(StockHolding {
                id: 1,
                ticker: "AAPL".to_string(),
                shares: 2.0,
                currency_override: None,
                display_name: Some("Apple".to_string()),
                last_known_currency: Some("USD".to_string()),
                labels: vec![1, 2],
            }),
            Holding::Manual(ManualHolding {
                id: 1,
                name: "Deposit".to_string(),
                value: 100.0,
                currency: "EUR".to_string(),
                labels: vec![2],
            }),
        ];
        let labels = vec![
            Label {
                id: 1,
                name: "tech".to_string(),
                color: Some("#ff0000".to_string()),
            },
            Label {
                id: 2,
                name: "long-term".to_string(),
                color: None,
            },
        ];
        let valuation = PortfolioValuation {
            holdings: vec![
                HoldingValuation {
                    holding: HoldingRef::stock(1),
                    name: "Apple".to_string(),
                    ticker: Some("AAPL".to_string()),
                    shares: Some(2.0),
                    price: Some(100.0),
                    native_value: 200.0,
                    native_currency: "USD".to_string(),
                    values: CurrencyValues::from_native(200.0, "USD", &rates).unwrap(),
                },
                HoldingValuation {
                    holding: HoldingRef::manual(1),
                    name: "Deposit".to_string(),
                    ticker: None,
                    shares: None,
                    price: None,
                    native_value: 100.0,
                    native_currency: "EUR".to_string(),
                    values: CurrencyValues::from_native(100.0, "EUR", &rates).unwrap(),
                },
            ],
            totals: CurrencyValues::ZERO,
            currency_totals: vec![],
            rates,
        };
        (valuation, holdings, labels)
    }

    #[test]
    fn test_build_denormalizes_labels_and_sums_totals() {
        let (valuation, holdings, labels) = fixture();
        let taken_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap();
        let building = BuildingSnapshot::from_valuation(&valuation, &holdings, &labels, taken_at);

        assert_eq!(building.items.len(), 2);
        assert_eq!(building.totals.ron, 900.0 + 500.0);
        assert_eq!(
            building.items[0].labels,
            vec![
                SnapshotLabel {
                    name: "tech".to_string(),
                    color: Some("#ff0000".to_string())
                },
                SnapshotLabel {
                    name: "long-term".to_string(),
                    color: None
                },
            ]
        );
        assert_eq!(building.items[1].holding_type, HoldingKind::Manual);
        assert_eq!(building.items[1].shares, None);
    }

    #[test]
    fn test_commit_assigns_id_to_every_item() {
        let (valuation, holdings, labels) = fixture();
        let store = MemorySnapshotStore::new();
        let snapshot = BuildingSnapshot::from_valuation(&valuation, &holdings, &labels, Utc::now())
            .commit(&store)
            .unwrap();

        assert_eq!(snapshot.item_count, 2);
        let items = store.items(snapshot.id).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.snapshot_id == snapshot.id));
        assert_eq!(store.list().unwrap(), vec![snapshot]);
    }

    #[test]
    fn test_repeated_commits_are_independent() {
        let (valuation, holdings, labels) = fixture();
        let store = MemorySnapshotStore::new();
        let building = BuildingSnapshot::from_valuation(&valuation, &holdings, &labels, Utc::now());
        let first = building.clone().commit(&store).unwrap();
        let second = building.commit(&store).unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    /// Fails while staging the n-th item.
    struct FailingStore {
        inner: MemorySnapshotStore,
        fail_at: usize,
    }

    struct FailingTxn {
        inner: Box<dyn SnapshotTxn>,
        staged: usize,
        fail_at: usize,
    }

    impl SnapshotTxn for FailingTxn {
        fn id(&self) -> SnapshotId {
            self.inner.id()
        }

        fn stage(&mut self, item: SnapshotItem) -> Result<()> {
            self.staged += 1;
            if self.staged == self.fail_at {
                return Err(TrackerError::Storage("disk full".to_string()));
            }
            self.inner.stage(item)
        }

        fn commit(self: Box<Self>, snapshot: Snapshot) -> Result<Snapshot> {
            self.inner.commit(snapshot)
        }
    }

    impl SnapshotStore for FailingStore {
        fn begin(&self) -> Result<Box<dyn SnapshotTxn>> {
            Ok(Box::new(FailingTxn {
                inner: self.inner.begin()?,
                staged: 0,
                fail_at: self.fail_at,
            }))
        }

        fn list(&self) -> Result<Vec<Snapshot>> {
            self.inner.list()
        }

        fn get(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
            self.inner.get(id)
        }

        fn items(&self, id: SnapshotId) -> Result<Vec<SnapshotItem>> {
            self.inner.items(id)
        }
    }

    #[test]
    fn test_mid_commit_failure_leaves_nothing_behind() {
        let (valuation, holdings, labels) = fixture();
        let store = FailingStore {
            inner: MemorySnapshotStore::new(),
            fail_at: 2,
        };
        let result = BuildingSnapshot::from_valuation(&valuation, &holdings, &labels, Utc::now())
            .commit(&store);

        assert_eq!(result, Err(TrackerError::Storage("disk full".to_string())));
        assert!(store.list().unwrap().is_empty());
        // The id reserved by the failed attempt has neither header nor items.
        assert!(store.get(1).unwrap().is_none());
        assert!(store.items(1).unwrap().is_empty());
    }

    #[test]
    fn test_totals_for_labels() {
        let (valuation, holdings, labels) = fixture();
        let store = MemorySnapshotStore::new();
        let snapshot = BuildingSnapshot::from_valuation(&valuation, &holdings, &labels, Utc::now())
            .commit(&store)
            .unwrap();
        let detail = SnapshotDetail {
            items: store.items(snapshot.id).unwrap(),
            snapshot,
        };

        assert_eq!(detail.totals_for_labels(&[]).ron, 1400.0);
        assert_eq!(detail.totals_for_labels(&["TECH".to_string()]).ron, 900.0);
        assert_eq!(
            detail.totals_for_labels(&["long-term".to_string()]).ron,
            1400.0
        );
        assert_eq!(
            detail.totals_for_labels(&["missing".to_string()]),
            CurrencyValues::ZERO
        );
    }
}
