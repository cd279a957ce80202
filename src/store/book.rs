//! Holdings book persisted as a YAML file.

use crate::core::allocation::{AllocationGroup, AllocationMember};
use crate::core::error::{Result, TrackerError};
use crate::core::holding::{
    Holding, HoldingKind, HoldingRef, Label, LabelId, ManualHolding, StockHolding, Transaction,
    ValueIncrement,
};
use crate::core::store::HoldingsStore;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Highest id handed out per record type. Ids are never reused, so flows of a
/// deleted holding can not be attributed to a later one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssuedIds {
    #[serde(default)]
    pub stock: u64,
    #[serde(default)]
    pub manual: u64,
    #[serde(default)]
    pub label: u64,
    #[serde(default)]
    pub allocation_group: u64,
    #[serde(default)]
    pub transaction: u64,
    #[serde(default)]
    pub value_increment: u64,
}

fn next_id(issued: &mut u64, existing: impl Iterator<Item = u64>) -> u64 {
    let id = existing.fold(*issued, u64::max) + 1;
    *issued = id;
    id
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub allocation_groups: Vec<AllocationGroup>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub value_increments: Vec<ValueIncrement>,
    #[serde(default)]
    pub issued_ids: IssuedIds,
}

impl Book {
    fn stock_mut(&mut self, holding: HoldingRef) -> Result<&mut StockHolding> {
        self.holdings
            .iter_mut()
            .find_map(|h| match h {
                Holding::Stock(s) if HoldingRef::stock(s.id) == holding => Some(s),
                _ => None,
            })
            .ok_or(TrackerError::HoldingNotFound(holding))
    }

    fn manual_mut(&mut self, holding: HoldingRef) -> Result<&mut ManualHolding> {
        self.holdings
            .iter_mut()
            .find_map(|h| match h {
                Holding::Manual(m) if HoldingRef::manual(m.id) == holding => Some(m),
                _ => None,
            })
            .ok_or(TrackerError::HoldingNotFound(holding))
    }

    fn ids_of(&self, kind: HoldingKind) -> Vec<u64> {
        self.holdings
            .iter()
            .map(Holding::holding_ref)
            .filter(|r| r.kind == kind)
            .map(|r| r.id)
            .collect()
    }
}

/// Holdings store backed by `book.yaml`. Every mutation is applied to a copy,
/// written to disk, and only then made visible.
pub struct BookStore {
    path: Option<PathBuf>,
    book: Mutex<Book>,
}

impl BookStore {
    /// Loads the book at `path`, starting empty when the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let book = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                TrackerError::storage(format!("failed to read {}: {e}", path.display()))
            })?;
            serde_yaml::from_str(&content).map_err(|e| {
                TrackerError::storage(format!("failed to parse {}: {e}", path.display()))
            })?
        } else {
            debug!("No holdings book at {}, starting empty", path.display());
            Book::default()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            book: Mutex::new(book),
        })
    }

    /// A book that is never written anywhere.
    pub fn in_memory(book: Book) -> Self {
        Self {
            path: None,
            book: Mutex::new(book),
        }
    }

    pub fn book(&self) -> Result<Book> {
        self.read(|book| book.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&Book) -> T) -> Result<T> {
        let book = self
            .book
            .lock()
            .map_err(|e| TrackerError::storage(format!("book lock poisoned: {e}")))?;
        Ok(f(&book))
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Book) -> Result<T>) -> Result<T> {
        let mut book = self
            .book
            .lock()
            .map_err(|e| TrackerError::storage(format!("book lock poisoned: {e}")))?;
        let mut updated = book.clone();
        let result = f(&mut updated)?;
        self.save(&updated)?;
        *book = updated;
        Ok(result)
    }

    fn save(&self, book: &Book) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(TrackerError::storage)?;
        }
        let yaml = serde_yaml::to_string(book).map_err(TrackerError::storage)?;
        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml).map_err(|e| {
            TrackerError::storage(format!("failed to write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, path).map_err(|e| {
            TrackerError::storage(format!("failed to replace {}: {e}", path.display()))
        })?;
        debug!("Saved holdings book to {}", path.display());
        Ok(())
    }

    pub fn add_stock(
        &self,
        ticker: &str,
        shares: f64,
        currency_override: Option<String>,
        display_name: Option<String>,
    ) -> Result<HoldingRef> {
        self.mutate(|book| {
            let existing = book.ids_of(HoldingKind::Stock);
            let id = next_id(&mut book.issued_ids.stock, existing.into_iter());
            book.holdings.push(Holding::Stock(StockHolding {
                id,
                ticker: ticker.to_uppercase(),
                shares,
                currency_override: currency_override.map(|c| c.to_uppercase()),
                display_name,
                last_known_currency: None,
                labels: vec![],
            }));
            Ok(HoldingRef::stock(id))
        })
    }

    pub fn add_manual(&self, name: &str, value: f64, currency: &str) -> Result<HoldingRef> {
        self.mutate(|book| {
            let existing = book.ids_of(HoldingKind::Manual);
            let id = next_id(&mut book.issued_ids.manual, existing.into_iter());
            book.holdings.push(Holding::Manual(ManualHolding {
                id,
                name: name.to_string(),
                value,
                currency: currency.to_uppercase(),
                labels: vec![],
            }));
            Ok(HoldingRef::manual(id))
        })
    }

    /// Removes a holding and its allocation memberships. Its transactions and
    /// value increments stay, since they are part of the cash-flow history.
    pub fn delete_holding(&self, holding: HoldingRef) -> Result<()> {
        self.mutate(|book| {
            let before = book.holdings.len();
            book.holdings.retain(|h| h.holding_ref() != holding);
            if book.holdings.len() == before {
                return Err(TrackerError::HoldingNotFound(holding));
            }
            for group in &mut book.allocation_groups {
                group.members.retain(|m| m.holding != holding);
            }
            Ok(())
        })
    }

    pub fn add_label(&self, name: &str, color: Option<String>) -> Result<LabelId> {
        self.mutate(|book| {
            let existing: Vec<u64> = book.labels.iter().map(|l| l.id).collect();
            let id = next_id(&mut book.issued_ids.label, existing.into_iter());
            book.labels.push(Label {
                id,
                name: name.to_string(),
                color,
            });
            Ok(id)
        })
    }

    pub fn rename_label(&self, id: LabelId, name: &str) -> Result<()> {
        self.mutate(|book| {
            let label = book
                .labels
                .iter_mut()
                .find(|l| l.id == id)
                .ok_or_else(|| TrackerError::storage(format!("label {id} not found")))?;
            label.name = name.to_string();
            Ok(())
        })
    }

    pub fn set_labels(&self, holding: HoldingRef, labels: Vec<LabelId>) -> Result<()> {
        self.mutate(|book| {
            match holding.kind {
                HoldingKind::Stock => book.stock_mut(holding)?.labels = labels,
                HoldingKind::Manual => book.manual_mut(holding)?.labels = labels,
            }
            Ok(())
        })
    }

    pub fn create_allocation_group(&self, name: &str, color: Option<String>) -> Result<u64> {
        self.mutate(|book| {
            let existing: Vec<u64> = book.allocation_groups.iter().map(|g| g.id).collect();
            let id = next_id(&mut book.issued_ids.allocation_group, existing.into_iter());
            book.allocation_groups.push(AllocationGroup {
                id,
                name: name.to_string(),
                color,
                members: vec![],
            });
            Ok(id)
        })
    }

    /// Replaces the members of a group; targets are validated first.
    pub fn assign_allocation(&self, group_id: u64, members: Vec<AllocationMember>) -> Result<()> {
        self.mutate(|book| {
            let group = book
                .allocation_groups
                .iter_mut()
                .find(|g| g.id == group_id)
                .ok_or(TrackerError::AllocationGroupNotFound(group_id))?;
            group.assign(members)
        })
    }

    /// Applies a correction to a recorded purchase or withdrawal; the share
    /// count and holding stay as recorded.
    pub fn correct_transaction(
        &self,
        id: u64,
        date: Option<NaiveDate>,
        price_per_share: Option<f64>,
        notes: Option<String>,
    ) -> Result<Transaction> {
        self.mutate(|book| {
            let tx = book
                .transactions
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(TrackerError::TransactionNotFound(id))?;
            tx.correct(date, price_per_share, notes);
            debug!("Corrected transaction {id}: {} at {}", tx.date, tx.price_per_share);
            Ok(tx.clone())
        })
    }
}

impl HoldingsStore for BookStore {
    fn holdings(&self) -> Result<Vec<Holding>> {
        self.read(|book| book.holdings.clone())
    }

    fn labels(&self) -> Result<Vec<Label>> {
        self.read(|book| book.labels.clone())
    }

    fn transactions(&self) -> Result<Vec<Transaction>> {
        self.read(|book| book.transactions.clone())
    }

    fn value_increments(&self) -> Result<Vec<ValueIncrement>> {
        self.read(|book| book.value_increments.clone())
    }

    fn allocation_group(&self, id: u64) -> Result<Option<AllocationGroup>> {
        self.read(|book| book.allocation_groups.iter().find(|g| g.id == id).cloned())
    }

    fn record_quote_currency(&self, holding: HoldingRef, currency: &str) -> Result<()> {
        self.mutate(|book| {
            book.stock_mut(holding)?.last_known_currency = Some(currency.to_uppercase());
            Ok(())
        })
    }

    fn add_shares(
        &self,
        holding: HoldingRef,
        shares: f64,
        price_per_share: f64,
        currency: &str,
        date: NaiveDate,
        notes: Option<String>,
    ) -> Result<Transaction> {
        self.mutate(|book| {
            book.stock_mut(holding)?.shares += shares;
            let existing: Vec<u64> = book.transactions.iter().map(|t| t.id).collect();
            let tx = Transaction {
                id: next_id(&mut book.issued_ids.transaction, existing.into_iter()),
                holding,
                date,
                shares,
                price_per_share,
                currency: currency.to_uppercase(),
                notes,
                recorded_at: Utc::now(),
            };
            book.transactions.push(tx.clone());
            Ok(tx)
        })
    }

    fn add_value(
        &self,
        holding: HoldingRef,
        amount: f64,
        date: NaiveDate,
        notes: Option<String>,
    ) -> Result<ValueIncrement> {
        self.mutate(|book| {
            let manual = book.manual_mut(holding)?;
            manual.value += amount;
            let currency = manual.currency.clone();
            let existing: Vec<u64> = book.value_increments.iter().map(|v| v.id).collect();
            let increment = ValueIncrement {
                id: next_id(&mut book.issued_ids.value_increment, existing.into_iter()),
                holding,
                date,
                amount,
                currency,
                notes,
                recorded_at: Utc::now(),
            };
            book.value_increments.push(increment.clone());
            Ok(increment)
        })
    }
}
