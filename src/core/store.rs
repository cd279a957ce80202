//! Storage abstractions for holdings and snapshots.

use crate::core::allocation::AllocationGroup;
use crate::core::error::Result;
use crate::core::holding::{Holding, HoldingRef, Label, Transaction, ValueIncrement};
use crate::core::snapshot::{Snapshot, SnapshotId, SnapshotItem};
use chrono::NaiveDate;

/// Current holdings and their history.
pub trait HoldingsStore: Send + Sync {
    fn holdings(&self) -> Result<Vec<Holding>>;
    fn labels(&self) -> Result<Vec<Label>>;
    fn transactions(&self) -> Result<Vec<Transaction>>;
    fn value_increments(&self) -> Result<Vec<ValueIncrement>>;
    fn allocation_group(&self, id: u64) -> Result<Option<AllocationGroup>>;

    /// Remembers the currency the price provider reported for a stock.
    fn record_quote_currency(&self, holding: HoldingRef, currency: &str) -> Result<()>;

    /// Adds shares to a stock holding and records the matching transaction.
    fn add_shares(
        &self,
        holding: HoldingRef,
        shares: f64,
        price_per_share: f64,
        currency: &str,
        date: NaiveDate,
        notes: Option<String>,
    ) -> Result<Transaction>;

    /// Adds value to a manual holding and records the increment.
    fn add_value(
        &self,
        holding: HoldingRef,
        amount: f64,
        date: NaiveDate,
        notes: Option<String>,
    ) -> Result<ValueIncrement>;
}

/// Append-only snapshot storage.
pub trait SnapshotStore: Send + Sync {
    /// Opens a staging transaction with a freshly reserved snapshot id.
    fn begin(&self) -> Result<Box<dyn SnapshotTxn>>;

    /// Committed snapshots, oldest first.
    fn list(&self) -> Result<Vec<Snapshot>>;

    fn get(&self, id: SnapshotId) -> Result<Option<Snapshot>>;

    fn items(&self, id: SnapshotId) -> Result<Vec<SnapshotItem>>;
}

/// Items staged here stay invisible until `commit`; dropping the
/// transaction discards them.
pub trait SnapshotTxn: Send {
    fn id(&self) -> SnapshotId;

    fn stage(&mut self, item: SnapshotItem) -> Result<()>;

    fn commit(self: Box<Self>, snapshot: Snapshot) -> Result<Snapshot>;
}
