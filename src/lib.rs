pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::allocation::AllocationMember;
use crate::core::cache::Cache;
use crate::core::config::AppConfig;
use crate::core::currency::{FxRateSet, ReportingCurrency};
use crate::core::holding::{HoldingRef, LabelId};
use crate::core::price::PriceQuote;
use crate::core::roi::RoiRange;
use crate::core::service::PortfolioService;
use crate::core::snapshot::SnapshotId;
use crate::providers::yahoo_finance::{YahooFinanceProvider, YahooFxProvider};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the binary can ask the library to do.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Value {
        currency: Option<ReportingCurrency>,
    },
    SnapshotCreate,
    SnapshotList,
    SnapshotShow(SnapshotId),
    Roi {
        range: RoiRange,
        labels: Vec<String>,
    },
    Chart {
        range: RoiRange,
        labels: Vec<String>,
    },
    Alloc {
        group_id: u64,
        currency: Option<ReportingCurrency>,
    },
    AllocCreate {
        name: String,
        color: Option<String>,
    },
    AllocAssign {
        group_id: u64,
        members: Vec<AllocationMember>,
    },
    AddShares {
        holding: HoldingRef,
        shares: f64,
        price: f64,
        date: Option<NaiveDate>,
        notes: Option<String>,
    },
    AddValue {
        holding: HoldingRef,
        amount: f64,
        date: Option<NaiveDate>,
        notes: Option<String>,
    },
    HoldingList,
    HoldingAddStock {
        ticker: String,
        shares: f64,
        currency: Option<String>,
        name: Option<String>,
    },
    HoldingAddManual {
        name: String,
        value: f64,
        currency: String,
    },
    HoldingRemove(HoldingRef),
    LabelAdd {
        name: String,
        color: Option<String>,
    },
    LabelRename {
        id: LabelId,
        name: String,
    },
    LabelSet {
        holding: HoldingRef,
        labels: Vec<String>,
    },
    TransactionList,
    TransactionCorrect {
        id: u64,
        date: Option<NaiveDate>,
        price: Option<f64>,
        notes: Option<String>,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("folio starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let data_dir = config.data_dir()?;
    let (book, snapshots) = store::open_data_dir(&data_dir)
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;
    let book = Arc::new(book);

    // Create shared caches
    let ttl = Some(config.providers.cache_ttl());
    let price_cache = Arc::new(Cache::<String, PriceQuote>::new(ttl));
    let rate_cache = Arc::new(Cache::<String, FxRateSet>::new(ttl));

    let base_url = &config.providers.yahoo.base_url;
    let service = PortfolioService::new(
        book.clone(),
        Arc::new(snapshots),
        Arc::new(YahooFinanceProvider::new(base_url, price_cache)),
        Arc::new(YahooFxProvider::new(base_url, rate_cache)),
        config.providers.timeout(),
    );

    let today = || Utc::now().date_naive();
    let display_currency = config.display_currency;

    match command {
        AppCommand::Value { currency } => {
            cli::value::run(&service, currency.unwrap_or(display_currency)).await
        }
        AppCommand::SnapshotCreate => cli::snapshot::create(&service).await,
        AppCommand::SnapshotList => cli::snapshot::list(&service),
        AppCommand::SnapshotShow(id) => cli::snapshot::show(&service, id),
        AppCommand::Roi { range, labels } => cli::roi::run(&service, range, &labels).await,
        AppCommand::Chart { range, labels } => cli::roi::chart(&service, range, &labels).await,
        AppCommand::Alloc { group_id, currency } => {
            cli::alloc::run(&service, group_id, currency.unwrap_or(display_currency)).await
        }
        AppCommand::AllocCreate { name, color } => cli::alloc::create_group(&book, &name, color),
        AppCommand::AllocAssign { group_id, members } => {
            cli::alloc::assign(&book, group_id, members)
        }
        AppCommand::AddShares {
            holding,
            shares,
            price,
            date,
            notes,
        } => {
            let date = date.unwrap_or_else(today);
            cli::holdings::add_shares(&service, holding, shares, price, date, notes).await
        }
        AppCommand::AddValue {
            holding,
            amount,
            date,
            notes,
        } => {
            let date = date.unwrap_or_else(today);
            cli::holdings::add_value(&service, holding, amount, date, notes).await
        }
        AppCommand::HoldingList => cli::holdings::list(&book),
        AppCommand::HoldingAddStock {
            ticker,
            shares,
            currency,
            name,
        } => cli::holdings::add_stock(&book, &ticker, shares, currency, name),
        AppCommand::HoldingAddManual {
            name,
            value,
            currency,
        } => cli::holdings::add_manual(&book, &name, value, &currency),
        AppCommand::HoldingRemove(holding) => cli::holdings::remove(&book, holding),
        AppCommand::LabelAdd { name, color } => cli::holdings::add_label(&book, &name, color),
        AppCommand::LabelRename { id, name } => cli::holdings::rename_label(&book, id, &name),
        AppCommand::LabelSet { holding, labels } => {
            cli::holdings::set_labels(&book, holding, &labels)
        }
        AppCommand::TransactionList => cli::holdings::list_transactions(&book),
        AppCommand::TransactionCorrect {
            id,
            date,
            price,
            notes,
        } => cli::holdings::correct_transaction(&book, id, date, price, notes),
    }
}
