//! # idx-sync CLI
//!
//! ```bash
//! idx-sync --config ./config/idx-sync.toml sync
//! idx-sync sync -o adobe -r helix-home --filter blog/ --json
//! idx-sync sync --dry-run
//! idx-sync describe basic
//! ```
//!
//! Exit code 0 when the batch completed, even if individual writes failed
//! (they are listed in the summary). Exit code 1 when the database cannot
//! be reached or the tree scan fails or is empty.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use idx_sync::config;
use idx_sync::core::models::StorageMode;
use idx_sync::db;
use idx_sync::ingest::{self, SyncOptions};
use idx_sync::progress::ProgressMode;

/// Sync per-document index fragments into a relational store.
#[derive(Parser)]
#[command(name = "idx-sync", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply if it is missing.
    #[arg(long, global = true, default_value = "./config/idx-sync.toml")]
    config: PathBuf,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the content tree and sync every fragment.
    Sync {
        /// Repository owner.
        #[arg(short, long)]
        owner: Option<String>,

        /// Repository name.
        #[arg(short, long)]
        repo: Option<String>,

        /// Store entries in a single JSON column instead of one column each.
        #[arg(short, long)]
        json: bool,

        /// Only sync documents whose path contains this substring.
        #[arg(long)]
        filter: Option<String>,

        /// Maximum documents in flight.
        #[arg(long)]
        concurrency: Option<usize>,

        /// List candidate documents without touching the database.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr: off, human or json. Defaults to human on a TTY.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Print the columns and row count of a table.
    Describe {
        /// Table name.
        table: String,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync {
            owner,
            repo,
            json,
            filter,
            concurrency,
            dry_run,
            progress,
        } => {
            if let Some(owner) = owner {
                cfg.source.owner = owner;
            }
            if let Some(repo) = repo {
                cfg.source.repo = repo;
            }
            if json {
                cfg.sync.mode = StorageMode::Json;
            }
            if filter.is_some() {
                cfg.source.path_filter = filter;
            }
            if let Some(n) = concurrency {
                cfg.sync.concurrency = n;
            }
            cfg.validate()?;

            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let options = SyncOptions {
                dry_run,
                progress: Arc::from(mode.reporter()),
            };
            ingest::run_sync(&cfg, options).await?;
        }
        Commands::Describe { table } => {
            let store = db::connect(&cfg).await?;
            let columns = store.table_columns(&table).await?;
            if columns.is_empty() {
                println!("table {} does not exist", table);
            } else {
                let rows = store.count_rows(&table).await?;
                println!("table {} ({} rows)", table, rows);
                for column in columns {
                    println!("  {}", column);
                }
            }
            store.close().await;
        }
    }

    Ok(())
}
