use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use folio::AppCommand;
use folio::cli::alloc::parse_member;
use folio::core::allocation::AllocationMember;
use folio::core::currency::ReportingCurrency;
use folio::core::error::TrackerError;
use folio::core::holding::HoldingRef;
use folio::core::log::init_logging;
use folio::core::roi::RoiRange;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration and an empty holdings book
    Setup,
    /// Value every holding at current prices
    Value {
        /// Currency for the value column (RON, EUR or USD)
        #[arg(long)]
        currency: Option<ReportingCurrency>,
    },
    /// Take, list and inspect portfolio snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
    /// Cash-flow adjusted return between snapshots
    Roi {
        /// One of 3m, 6m, 1y or all
        #[arg(short, long, default_value = "all")]
        range: RoiRange,
        /// Only count holdings carrying one of these labels
        #[arg(short, long = "label")]
        labels: Vec<String>,
    },
    /// Portfolio value and return at every snapshot
    Chart {
        #[arg(short, long, default_value = "all")]
        range: RoiRange,
        #[arg(short, long = "label")]
        labels: Vec<String>,
    },
    /// Compare current and target allocation within a group
    Alloc {
        group_id: u64,
        #[arg(long)]
        currency: Option<ReportingCurrency>,
    },
    /// Manage allocation groups
    #[command(subcommand)]
    Group(GroupCommands),
    /// Buy (positive) or withdraw (negative) shares of a stock holding
    AddShares {
        /// Holding reference, e.g. stock#1
        holding: HoldingRef,
        #[arg(allow_negative_numbers = true)]
        shares: f64,
        /// Price per share in the holding's currency
        price: f64,
        /// Defaults to today (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Add (positive) or take out (negative) value of a manual holding
    AddValue {
        /// Holding reference, e.g. manual#1
        holding: HoldingRef,
        #[arg(allow_negative_numbers = true)]
        amount: f64,
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Manage holdings in the book
    #[command(subcommand)]
    Holding(HoldingCommands),
    /// Manage labels
    #[command(subcommand)]
    Label(LabelCommands),
    /// Inspect and correct recorded share transactions
    #[command(subcommand)]
    Transaction(TransactionCommands),
}

#[derive(Subcommand)]
enum SnapshotCommands {
    /// Value the portfolio and store the result
    Create,
    /// List stored snapshots
    List,
    /// Show one snapshot with its items
    Show { id: u64 },
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Create an empty allocation group
    Create {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// Replace the members of a group, e.g. stock#1=60 manual#2=40
    Assign {
        group_id: u64,
        #[arg(value_parser = parse_member, required = true)]
        members: Vec<AllocationMember>,
    },
}

#[derive(Subcommand)]
enum HoldingCommands {
    /// List holdings
    List,
    /// Add a stock tracked by ticker
    AddStock {
        ticker: String,
        shares: f64,
        /// Overrides the currency reported by the price provider
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Add a manually valued holding
    AddManual {
        name: String,
        value: f64,
        currency: String,
    },
    /// Remove a holding; snapshots keep their copy
    Remove { holding: HoldingRef },
}

#[derive(Subcommand)]
enum LabelCommands {
    /// Create a label
    Add {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    /// Rename a label; snapshots keep the old name
    Rename { id: u64, name: String },
    /// Replace the labels of a holding
    Set {
        holding: HoldingRef,
        labels: Vec<String>,
    },
}

#[derive(Subcommand)]
enum TransactionCommands {
    /// List recorded purchases and withdrawals
    List,
    /// Fix the date, price or notes of a transaction
    Correct {
        id: u64,
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Price per share in the transaction's currency
        #[arg(short, long)]
        price: Option<f64>,
        #[arg(short, long)]
        notes: Option<String>,
    },
}

impl From<Commands> for AppCommand {
    fn from(cmd: Commands) -> AppCommand {
        match cmd {
            Commands::Value { currency } => AppCommand::Value { currency },
            Commands::Snapshot(SnapshotCommands::Create) => AppCommand::SnapshotCreate,
            Commands::Snapshot(SnapshotCommands::List) => AppCommand::SnapshotList,
            Commands::Snapshot(SnapshotCommands::Show { id }) => AppCommand::SnapshotShow(id),
            Commands::Roi { range, labels } => AppCommand::Roi { range, labels },
            Commands::Chart { range, labels } => AppCommand::Chart { range, labels },
            Commands::Alloc { group_id, currency } => AppCommand::Alloc { group_id, currency },
            Commands::Group(GroupCommands::Create { name, color }) => {
                AppCommand::AllocCreate { name, color }
            }
            Commands::Group(GroupCommands::Assign { group_id, members }) => {
                AppCommand::AllocAssign { group_id, members }
            }
            Commands::AddShares {
                holding,
                shares,
                price,
                date,
                notes,
            } => AppCommand::AddShares {
                holding,
                shares,
                price,
                date,
                notes,
            },
            Commands::AddValue {
                holding,
                amount,
                date,
                notes,
            } => AppCommand::AddValue {
                holding,
                amount,
                date,
                notes,
            },
            Commands::Holding(HoldingCommands::List) => AppCommand::HoldingList,
            Commands::Holding(HoldingCommands::AddStock {
                ticker,
                shares,
                currency,
                name,
            }) => AppCommand::HoldingAddStock {
                ticker,
                shares,
                currency,
                name,
            },
            Commands::Holding(HoldingCommands::AddManual {
                name,
                value,
                currency,
            }) => AppCommand::HoldingAddManual {
                name,
                value,
                currency,
            },
            Commands::Holding(HoldingCommands::Remove { holding }) => {
                AppCommand::HoldingRemove(holding)
            }
            Commands::Label(LabelCommands::Add { name, color }) => {
                AppCommand::LabelAdd { name, color }
            }
            Commands::Label(LabelCommands::Rename { id, name }) => {
                AppCommand::LabelRename { id, name }
            }
            Commands::Label(LabelCommands::Set { holding, labels }) => {
                AppCommand::LabelSet { holding, labels }
            }
            Commands::Transaction(TransactionCommands::List) => AppCommand::TransactionList,
            Commands::Transaction(TransactionCommands::Correct {
                id,
                date,
                price,
                notes,
            }) => AppCommand::TransactionCorrect {
                id,
                date,
                price,
                notes,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => folio::cli::setup::setup_at_path(path),
            None => folio::cli::setup::setup(),
        },
        Some(cmd) => folio::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
        if is_retryable(e) {
            tracing::warn!("Market data was unavailable; nothing was saved, try again later");
        }
    }
    result
}

/// True when any cause in the chain is a retryable tracker failure.
fn is_retryable(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<TrackerError>())
        .any(TrackerError::is_retryable)
}
