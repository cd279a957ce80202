use crate::core::error::{Result, TrackerError};
use crate::core::snapshot::{Snapshot, SnapshotId, SnapshotItem};
use crate::core::store::{SnapshotStore, SnapshotTxn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

type Committed = BTreeMap<SnapshotId, (Snapshot, Vec<SnapshotItem>)>;

/// Snapshot storage that lives as long as the process.
#[derive(Default)]
pub struct MemorySnapshotStore {
    committed: Arc<RwLock<Committed>>,
    last_id: AtomicU64,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryTxn {
    id: SnapshotId,
    staged: Vec<SnapshotItem>,
    committed: Arc<RwLock<Committed>>,
}

impl SnapshotTxn for MemoryTxn {
    fn id(&self) -> SnapshotId {
        self.id
    }

    fn stage(&mut self, item: SnapshotItem) -> Result<()> {
        self.staged.push(item);
        Ok(())
    }

    fn commit(self: Box<Self>, snapshot: Snapshot) -> Result<Snapshot> {
        let mut committed = self
            .committed
            .write()
            .map_err(|e| TrackerError::storage(format!("snapshot lock poisoned: {e}")))?;
        committed.insert(self.id, (snapshot.clone(), self.staged));
        debug!("Committed snapshot {} in memory", self.id);
        Ok(snapshot)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn begin(&self) -> Result<Box<dyn SnapshotTxn>> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MemoryTxn {
            id,
            staged: Vec::new(),
            committed: Arc::clone(&self.committed),
        }))
    }

    fn list(&self) -> Result<Vec<Snapshot>> {
        let committed = self
            .committed
            .read()
            .map_err(|e| TrackerError::storage(format!("snapshot lock poisoned: {e}")))?;
        let mut snapshots: Vec<Snapshot> = committed.values().map(|(s, _)| s.clone()).collect();
        snapshots.sort_by_key(|s| (s.taken_at, s.id));
        Ok(snapshots)
    }

    fn get(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        let committed = self
            .committed
            .read()
            .map_err(|e| TrackerError::storage(format!("snapshot lock poisoned: {e}")))?;
        Ok(committed.get(&id).map(|(s, _)| s.clone()))
    }

    fn items(&self, id: SnapshotId) -> Result<Vec<SnapshotItem>> {
        let committed = self
            .committed
            .read()
            .map_err(|e| TrackerError::storage(format!("snapshot lock poisoned: {e}")))?;
        Ok(committed
            .get(&id)
            .map(|(_, items)| items.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::{CurrencyValues, FxRateSet};
    use crate::core::holding::HoldingKind;
    use chrono::{Duration, Utc};

    fn item(id: SnapshotId, name: &str) -> SnapshotItem {
        SnapshotItem {
            snapshot_id: id,
            holding_type: HoldingKind::Manual,
            ticker: None,
            name: name.to_string(),
            labels: vec![],
            shares: None,
            price: None,
            native_value: 10.0,
            native_currency: "RON".to_string(),
            values: CurrencyValues {
                ron: 10.0,
                eur: 2.0,
                usd: 2.5,
            },
        }
    }

    fn header(id: SnapshotId, taken_at: chrono::DateTime<Utc>) -> Snapshot {
        Snapshot {
            id,
            taken_at,
            totals: CurrencyValues::ZERO,
            rates: FxRateSet::new(taken_at, 5.0, 4.0),
            item_count: 1,
        }
    }

    #[test]
    fn test_staged_items_invisible_until_commit() {
        let store = MemorySnapshotStore::new();
        let mut txn = store.begin().unwrap();
        let id = txn.id();
        txn.stage(item(id, "Cash")).unwrap();

        assert!(store.get(id).unwrap().is_none());
        assert!(store.items(id).unwrap().is_empty());

        txn.commit(header(id, Utc::now())).unwrap();
        assert!(store.get(id).unwrap().is_some());
        assert_eq!(store.items(id).unwrap(), vec![item(id, "Cash")]);
    }

    #[test]
    fn test_dropped_txn_leaves_nothing() {
        let store = MemorySnapshotStore::new();
        {
            let mut txn = store.begin().unwrap();
            let id = txn.id();
            txn.stage(item(id, "Cash")).unwrap();
        }
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_is_oldest_first() {
        let store = MemorySnapshotStore::new();
        let now = Utc::now();
        let late = store.begin().unwrap();
        let early = store.begin().unwrap();
        let (late_id, early_id) = (late.id(), early.id());
        late.commit(header(late_id, now)).unwrap();
        early.commit(header(early_id, now - Duration::days(1))).unwrap();

        let ids: Vec<_> = store.list().unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![early_id, late_id]);
    }
}
