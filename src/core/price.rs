//! Pricing abstractions and core types

use crate::core::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Latest quote for a ticker, in the currency the market reports it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: f64,
    pub currency: String,
    pub short_name: Option<String>,
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Fails with `TrackerError::PriceUnavailable` when no usable quote exists.
    async fn fetch_price(&self, ticker: &str) -> Result<PriceQuote>;
}
