//! Holdings, labels and the cash-flow records attached to them.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

pub type LabelId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldingKind {
    Stock,
    Manual,
}

impl Display for HoldingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldingKind::Stock => write!(f, "stock"),
            HoldingKind::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for HoldingKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stock" => Ok(HoldingKind::Stock),
            "manual" => Ok(HoldingKind::Manual),
            _ => Err(anyhow::anyhow!("Invalid holding type: {}", s)),
        }
    }
}

/// Identifies a holding; ids are unique within a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct HoldingRef {
    pub kind: HoldingKind,
    pub id: u64,
}

impl HoldingRef {
    pub fn new(kind: HoldingKind, id: u64) -> Self {
        HoldingRef { kind, id }
    }

    pub fn stock(id: u64) -> Self {
        HoldingRef::new(HoldingKind::Stock, id)
    }

    pub fn manual(id: u64) -> Self {
        HoldingRef::new(HoldingKind::Manual, id)
    }
}

impl Display for HoldingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Parses `stock#3` or `manual#1`.
impl FromStr for HoldingRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once('#').ok_or_else(|| {
            anyhow::anyhow!("Invalid holding reference: {} (expected e.g. stock#1)", s)
        })?;
        let id = id
            .trim()
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid holding id in {}: {}", s, e))?;
        Ok(HoldingRef::new(kind.trim().parse()?, id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockHolding {
    pub id: u64,
    pub ticker: String,
    pub shares: f64,
    #[serde(default)]
    pub currency_override: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Currency reported by the price provider at the last successful lookup.
    #[serde(default)]
    pub last_known_currency: Option<String>,
    #[serde(default)]
    pub labels: Vec<LabelId>,
}

impl StockHolding {
    /// The user's override, else the provider's last reported currency.
    pub fn known_currency(&self) -> Option<&str> {
        self.currency_override
            .as_deref()
            .or(self.last_known_currency.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualHolding {
    pub id: u64,
    pub name: String,
    pub value: f64,
    pub currency: String,
    #[serde(default)]
    pub labels: Vec<LabelId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Holding {
    Stock(StockHolding),
    Manual(ManualHolding),
}

impl Holding {
    pub fn holding_ref(&self) -> HoldingRef {
        match self {
            Holding::Stock(s) => HoldingRef::stock(s.id),
            Holding::Manual(m) => HoldingRef::manual(m.id),
        }
    }

    pub fn kind(&self) -> HoldingKind {
        self.holding_ref().kind
    }

    pub fn name(&self) -> &str {
        match self {
            Holding::Stock(s) => s.display_name.as_deref().unwrap_or(&s.ticker),
            Holding::Manual(m) => &m.name,
        }
    }

    pub fn ticker(&self) -> Option<&str> {
        match self {
            Holding::Stock(s) => Some(&s.ticker),
            Holding::Manual(_) => None,
        }
    }

    pub fn labels(&self) -> &[LabelId] {
        match self {
            Holding::Stock(s) => &s.labels,
            Holding::Manual(m) => &m.labels,
        }
    }
}

/// Shares bought into (positive) or withdrawn from (negative) a stock holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub holding: HoldingRef,
    pub date: NaiveDate,
    pub shares: f64,
    pub price_per_share: f64,
    /// Currency `price_per_share` is quoted in.
    pub currency: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl Transaction {
    pub fn amount(&self) -> f64 {
        self.shares * self.price_per_share
    }

    /// Date, price and notes are the only correctable fields.
    pub fn correct(
        &mut self,
        date: Option<NaiveDate>,
        price_per_share: Option<f64>,
        notes: Option<String>,
    ) {
        if let Some(date) = date {
            self.date = date;
        }
        if let Some(price) = price_per_share {
            self.price_per_share = price;
        }
        if notes.is_some() {
            self.notes = notes;
        }
    }

    pub fn effective_at(&self) -> DateTime<Utc> {
        effective_at(self.date, self.recorded_at)
    }
}

/// Value added to (positive) or taken out of (negative) a manual holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueIncrement {
    pub id: u64,
    pub holding: HoldingRef,
    pub date: NaiveDate,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ValueIncrement {
    pub fn effective_at(&self) -> DateTime<Utc> {
        effective_at(self.date, self.recorded_at)
    }
}

/// Instant a dated cash flow is placed on the timeline: the recording instant
/// when it was entered on its own date, else the start of that date (UTC).
fn effective_at(date: NaiveDate, recorded_at: DateTime<Utc>) -> DateTime<Utc> {
    if recorded_at.date_naive() == date {
        recorded_at
    } else {
        date.and_time(NaiveTime::MIN).and_utc()
    }
}
