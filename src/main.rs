mod cli;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ReceiptsCommands, RulesCommands, TxnCommands};

fn init_tracing(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("TILLROLL_LOG").unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow::anyhow!("{error}"))
        .context("failed to initialize tracing subscriber")
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.quiet) {
        eprintln!("Warning: {e:#}");
    }

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Status => cli::status::run(),
        Commands::Extract { file } => cli::extract::run(&file),
        Commands::Ingest {
            photos,
            strategy,
            mode,
            no_link,
        } => cli::ingest::run(&photos, strategy.as_deref(), mode.as_deref(), no_link),
        Commands::Receipts { command } => match command {
            ReceiptsCommands::List => cli::receipts::list(),
            ReceiptsCommands::Show { id } => cli::receipts::show(&id),
            ReceiptsCommands::Validate {
                id,
                vendor,
                date,
                amount,
                category,
            } => cli::receipts::validate(&id, vendor, date.as_deref(), amount, category),
            ReceiptsCommands::Link { source, primary } => cli::receipts::link(&source, &primary),
        },
        Commands::Txn { command } => match command {
            TxnCommands::Add {
                amount,
                date,
                txn_type,
                source,
                vendor,
                category,
            } => cli::txn::add(
                amount,
                &date,
                &txn_type,
                source.as_deref(),
                vendor.as_deref(),
                category.as_deref(),
            ),
            TxnCommands::List { year, month } => cli::txn::list(year, month),
            TxnCommands::FromReceipt { id } => cli::txn::from_receipt(&id),
            TxnCommands::Edit {
                id,
                amount,
                date,
                vendor,
                category,
            } => cli::txn::edit(&id, amount, date.as_deref(), vendor, category),
            TxnCommands::Import { file } => cli::txn::import(&file),
        },
        Commands::Dupes { id } => cli::dupes::run(&id),
        Commands::Link { a, b, duplicate } => cli::link::link(&a, &b, &duplicate),
        Commands::Unlink { a, b } => cli::link::unlink(&a, &b),
        Commands::Totals {
            year,
            month,
            from_date,
            to_date,
        } => cli::totals::run(year, month, from_date.as_deref(), to_date.as_deref()),
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                pattern,
                category,
                match_type,
                priority,
            } => cli::rules::add(&pattern, &category, &match_type, priority),
            RulesCommands::List => cli::rules::list(),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
