use crate::core::error::{Result, TrackerError};
use crate::core::snapshot::{Snapshot, SnapshotId, SnapshotItem};
use crate::core::store::{SnapshotStore, SnapshotTxn};
use fjall::{Batch, Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const SNAPSHOTS: &str = "snapshots";
const SNAPSHOT_ITEMS: &str = "snapshot_items";

/// Snapshot storage in a fjall keyspace.
///
/// Headers live in `snapshots` keyed by the big-endian id; items live in
/// `snapshot_items` keyed by id followed by the big-endian item position, so a
/// prefix scan returns a snapshot's items in insertion order.
pub struct DiskSnapshotStore {
    keyspace: Keyspace,
    snapshots: PartitionHandle,
    items: PartitionHandle,
    last_id: AtomicU64,
}

impl DiskSnapshotStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path).map_err(TrackerError::storage)?;
        let keyspace = Config::new(path).open().map_err(TrackerError::storage)?;
        let snapshots = keyspace
            .open_partition(SNAPSHOTS, PartitionCreateOptions::default())
            .map_err(TrackerError::storage)?;
        let items = keyspace
            .open_partition(SNAPSHOT_ITEMS, PartitionCreateOptions::default())
            .map_err(TrackerError::storage)?;

        let last_id = match snapshots.last_key_value().map_err(TrackerError::storage)? {
            Some((key, _)) => decode_id(&key)?,
            None => 0,
        };
        debug!("Opened snapshot store at {}, last id {last_id}", path.display());

        Ok(Self {
            keyspace,
            snapshots,
            items,
            last_id: AtomicU64::new(last_id),
        })
    }
}

fn decode_id(key: &[u8]) -> Result<SnapshotId> {
    let bytes: [u8; 8] = key
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| TrackerError::storage("malformed snapshot key"))?;
    Ok(SnapshotId::from_be_bytes(bytes))
}

fn item_key(id: SnapshotId, position: u32) -> Vec<u8> {
    let mut key = id.to_be_bytes().to_vec();
    key.extend_from_slice(&position.to_be_bytes());
    key
}

struct DiskTxn {
    id: SnapshotId,
    batch: Batch,
    keyspace: Keyspace,
    snapshots: PartitionHandle,
    items: PartitionHandle,
    staged: u32,
}

impl SnapshotTxn for DiskTxn {
    fn id(&self) -> SnapshotId {
        self.id
    }

    fn stage(&mut self, item: SnapshotItem) -> Result<()> {
        let value = serde_json::to_vec(&item).map_err(TrackerError::storage)?;
        self.batch
            .insert(&self.items, item_key(self.id, self.staged), value);
        self.staged += 1;
        Ok(())
    }

    fn commit(self: Box<Self>, snapshot: Snapshot) -> Result<Snapshot> {
        let DiskTxn {
            id,
            mut batch,
            keyspace,
            snapshots,
            staged,
            ..
        } = *self;

        let value = serde_json::to_vec(&snapshot).map_err(TrackerError::storage)?;
        batch.insert(&snapshots, id.to_be_bytes().to_vec(), value);
        batch.commit().map_err(TrackerError::storage)?;
        keyspace
            .persist(PersistMode::SyncAll)
            .map_err(TrackerError::storage)?;
        debug!("Committed snapshot {id} with {staged} items to disk");
        Ok(snapshot)
    }
}

impl SnapshotStore for DiskSnapshotStore {
    fn begin(&self) -> Result<Box<dyn SnapshotTxn>> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(DiskTxn {
            id,
            batch: self.keyspace.batch(),
            keyspace: self.keyspace.clone(),
            snapshots: self.snapshots.clone(),
            items: self.items.clone(),
            staged: 0,
        }))
    }

    fn list(&self) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        for entry in self.snapshots.iter() {
            let (_, value) = entry.map_err(TrackerError::storage)?;
            let snapshot: Snapshot = serde_json::from_slice(&value).map_err(TrackerError::storage)?;
            snapshots.push(snapshot);
        }
        snapshots.sort_by_key(|s| (s.taken_at, s.id));
        Ok(snapshots)
    }

    fn get(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        match self
            .snapshots
            .get(id.to_be_bytes())
            .map_err(TrackerError::storage)?
        {
            Some(value) => Ok(Some(
                serde_json::from_slice(&value).map_err(TrackerError::storage)?,
            )),
            None => Ok(None),
        }
    }

    fn items(&self, id: SnapshotId) -> Result<Vec<SnapshotItem>> {
        self.items
            .prefix(id.to_be_bytes())
            .map(|entry| {
                let (_, value) = entry.map_err(TrackerError::storage)?;
                serde_json::from_slice(&value).map_err(TrackerError::storage)
            })
            .collect()
    }
}
