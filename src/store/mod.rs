//! Storage adapters: the YAML holdings book and the snapshot stores.

pub mod book;
pub mod disk;
#[cfg(test)]
pub mod memory;

pub use book::{Book, BookStore};
pub use disk::DiskSnapshotStore;
#[cfg(test)]
pub use memory::MemorySnapshotStore;

use crate::core::error::Result;
use std::path::Path;

pub const BOOK_FILE: &str = "book.yaml";
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// Opens the holdings book and snapshot database under `data_dir`.
pub fn open_data_dir(data_dir: &Path) -> Result<(BookStore, DiskSnapshotStore)> {
    let book = BookStore::open(&data_dir.join(BOOK_FILE))?;
    let snapshots = DiskSnapshotStore::open(&data_dir.join(SNAPSHOTS_DIR))?;
    Ok((book, snapshots))
}
