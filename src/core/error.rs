//! Error taxonomy for valuation, snapshot and analytics operations.

use crate::core::holding::HoldingRef;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Failures that abort an operation.
///
/// Expected "no data" outcomes (an ROI window with fewer than two snapshots, an
/// allocation group without members) are not errors; they are reported through
/// `RoiStatus` and `AllocationReport::Empty`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("Price unavailable for {ticker}: {reason}")]
    PriceUnavailable { ticker: String, reason: String },

    #[error("FX rates unavailable: {0}")]
    RatesUnavailable(String),

    #[error("Currency '{0}' is not supported")]
    UnsupportedCurrency(String),

    #[error("Holding not found: {0}")]
    HoldingNotFound(HoldingRef),

    #[error("Transaction {0} not found")]
    TransactionNotFound(u64),

    #[error("Allocation group {0} not found")]
    AllocationGroupNotFound(u64),

    #[error("Invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TrackerError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        TrackerError::Storage(err.to_string())
    }

    /// True for failures caused by missing market data, which the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackerError::PriceUnavailable { .. } | TrackerError::RatesUnavailable(_)
        )
    }
}
