pub mod dupes;
pub mod extract;
pub mod ingest;
pub mod init;
pub mod link;
pub mod receipts;
pub mod rules;
pub mod status;
pub mod totals;
pub mod txn;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use tillroll::db::get_connection;
use tillroll::error::{Result, TillrollError};
use tillroll::settings::{load_settings, Settings};

/// Open the configured database, refusing to create one implicitly.
pub(crate) fn open_db() -> Result<(Settings, Connection)> {
    let settings = load_settings();
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(TillrollError::Settings(format!(
            "No database found at {}\nRun `tillroll init` to set up.",
            db_path.display()
        )));
    }
    let conn = get_connection(&db_path)?;
    Ok((settings, conn))
}

pub(crate) fn parse_cli_date(raw: &str) -> Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| TillrollError::Other(format!("invalid date '{raw}' (expected YYYY-MM-DD)")))
}

#[derive(Parser)]
#[command(
    name = "tillroll",
    version,
    about = "Receipt ingestion and verification for cash-basis bookkeeping."
)]
pub struct Cli {
    /// Log debug detail to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
    /// Only log errors
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up tillroll: choose a data directory and initialize the database.
    Init {
        /// Path for tillroll data (default: ~/Documents/tillroll)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Show current database and summary statistics.
    Status,
    /// Extract receipt fields from a text file and print them.
    Extract {
        /// Path to a text file holding recognized receipt text
        file: String,
    },
    /// Segment photographs into receipts and store them.
    Ingest {
        /// Photographs to ingest. OCR output is read from <photo>.ocr.json or <photo>.txt
        #[arg(required = true)]
        photos: Vec<String>,
        /// Segmentation strategy: text, model
        #[arg(long)]
        strategy: Option<String>,
        /// Boundary mode for model segmentation: full_photo, single_receipt
        #[arg(long)]
        mode: Option<String>,
        /// Skip duplicate and supplemental-document linking
        #[arg(long = "no-link")]
        no_link: bool,
    },
    /// Inspect and link stored receipts.
    Receipts {
        #[command(subcommand)]
        command: ReceiptsCommands,
    },
    /// Manage ledger transactions.
    Txn {
        #[command(subcommand)]
        command: TxnCommands,
    },
    /// Show likely duplicates of an income transaction.
    Dupes {
        /// Transaction ID or unique prefix
        id: String,
    },
    /// Link two transactions that record the same money.
    Link {
        /// First transaction ID or prefix
        a: String,
        /// Second transaction ID or prefix
        b: String,
        /// Which of the two is the duplicate (excluded from totals)
        #[arg(long)]
        duplicate: String,
    },
    /// Break the link between two transactions.
    Unlink {
        a: String,
        b: String,
    },
    /// Income, expense and net totals.
    Totals {
        /// Year filter: YYYY
        #[arg(long)]
        year: Option<i32>,
        /// Month filter (1-12), requires --year
        #[arg(long)]
        month: Option<u32>,
        /// Start date: YYYY-MM-DD
        #[arg(long = "from")]
        from_date: Option<String>,
        /// End date: YYYY-MM-DD
        #[arg(long = "to")]
        to_date: Option<String>,
    },
    /// Manage categorization rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
}

#[derive(Subcommand)]
pub enum ReceiptsCommands {
    /// List stored receipts.
    List,
    /// Show every field of one receipt.
    Show {
        /// Receipt ID or unique prefix
        id: String,
    },
    /// Mark a receipt as checked by hand, correcting fields as needed.
    Validate {
        /// Receipt ID or unique prefix
        id: String,
        #[arg(long)]
        vendor: Option<String>,
        /// Date: YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Attach a supporting document to its primary receipt.
    Link {
        /// Supporting document (e.g. card slip) ID or prefix
        source: String,
        /// Primary (itemized) receipt ID or prefix
        primary: String,
    },
}

#[derive(Subcommand)]
pub enum TxnCommands {
    /// Record a transaction by hand.
    Add {
        amount: f64,
        /// Date: YYYY-MM-DD
        #[arg(long)]
        date: String,
        /// Transaction type: income, expense
        #[arg(long = "type", default_value = "expense")]
        txn_type: String,
        /// Income source: check, deposit, cash, transfer, card, other
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// List transactions.
    List {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
    /// Create an expense from a stored receipt.
    FromReceipt {
        /// Receipt ID or unique prefix
        id: String,
    },
    /// Correct a transaction. Category corrections teach the categorizer.
    Edit {
        /// Transaction ID or unique prefix
        id: String,
        #[arg(long)]
        amount: Option<f64>,
        /// Date: YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        vendor: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Import transactions from a CSV file.
    Import {
        /// Path to CSV file with date and amount columns
        file: String,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a categorization rule.
    Add {
        /// Pattern to match against vendor names
        pattern: String,
        /// Category name to assign
        #[arg(long)]
        category: String,
        /// Match type: contains, starts_with, regex
        #[arg(long = "match-type", default_value = "contains")]
        match_type: String,
        /// Rule priority (higher wins)
        #[arg(long, default_value = "0")]
        priority: i64,
    },
    /// List all categorization rules.
    List,
}
