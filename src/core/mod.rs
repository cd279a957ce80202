//! Core business logic abstractions

pub mod allocation;
pub mod cache;
pub mod config;
pub mod currency;
pub mod error;
pub mod holding;
pub mod log;
pub mod price;
pub mod roi;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod valuation;

// Re-export main types for cleaner imports
pub use currency::{CurrencyValues, FxRateProvider, FxRateSet, ReportingCurrency};
pub use error::{Result, TrackerError};
pub use holding::{Holding, HoldingKind, HoldingRef};
pub use price::{PriceProvider, PriceQuote};
pub use roi::RoiRange;
pub use service::PortfolioService;
pub use store::{HoldingsStore, SnapshotStore, SnapshotTxn};
