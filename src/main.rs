//! # Vault Sync CLI (`vault-sync`)
//!
//! Keeps a remote Weaviate collection in step with a local Obsidian vault.
//!
//! ## Usage
//!
//! ```bash
//! vault-sync --config ./config/vault-sync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vault-sync init` | Create the remote collection if it is missing |
//! | `vault-sync sync` | Push added, edited and removed notes |
//! | `vault-sync status` | Summarize the local change-set index |
//! | `vault-sync watch` | Run `sync` on a fixed interval until interrupted |
//!
//! ## Examples
//!
//! ```bash
//! # Preview what the next run would do
//! vault-sync sync --dry-run
//!
//! # Re-upload every note regardless of fingerprints
//! vault-sync sync --full
//!
//! # Machine-readable report
//! vault-sync --json sync
//! ```
//!
//! Logs go to stderr and honor `RUST_LOG`; reports go to stdout.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use vault_sync::config::{self, Config};
use vault_sync::error::RunError;
use vault_sync::index::ChangeSetIndex;
use vault_sync::ingest;
use vault_sync::report::SyncReport;

/// Vault Sync: incremental Obsidian to vector store synchronization.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/vault-sync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "vault-sync",
    about = "Incrementally sync an Obsidian vault into a remote vector store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vault-sync.toml")]
    config: PathBuf,

    /// Print reports as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the remote collection if it does not exist.
    ///
    /// Safe to run repeatedly.
    Init,

    /// Sync the vault into the remote collection.
    ///
    /// Only notes whose content changed since the last successful sync are
    /// sent. Notes that failed are retried on the next run.
    Sync {
        /// Re-upload every note, ignoring stored fingerprints.
        #[arg(long)]
        full: bool,

        /// Show the change set without contacting the remote store or
        /// writing the index.
        #[arg(long)]
        dry_run: bool,
    },

    /// Summarize the local change-set index.
    Status,

    /// Sync repeatedly until interrupted with Ctrl-C.
    Watch {
        /// Seconds between runs.
        #[arg(long, default_value_t = 300)]
        interval: u64,
    },
}

#[derive(Serialize)]
struct IndexStatus {
    index: PathBuf,
    documents: usize,
    chunks: usize,
    last_synced: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn check_report(config: &Config, report: &SyncReport) -> Result<()> {
    if config.sync.fail_on_document_errors && !report.is_clean() {
        bail!("{} document(s) failed to sync", report.failed());
    }
    Ok(())
}

async fn cmd_init(config: &Config) -> Result<()> {
    let client = ingest::build_client(config)?;
    client.ensure_collection().await?;
    println!("Collection '{}' is ready.", config.remote.collection);
    Ok(())
}

fn cmd_status(config: &Config, json: bool) -> Result<()> {
    let index = ChangeSetIndex::load(&config.index.path);
    let status = IndexStatus {
        index: config.index.path.clone(),
        documents: index.len(),
        chunks: index.total_chunks(),
        last_synced: index.last_synced().map(|ts| ts.to_rfc3339()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("index: {}", status.index.display());
        println!("  documents: {}", status.documents);
        println!("  chunks: {}", status.chunks);
        println!(
            "  last synced: {}",
            status.last_synced.as_deref().unwrap_or("never")
        );
    }
    Ok(())
}

async fn cmd_watch(config: &Config, interval: u64, json: bool) -> Result<()> {
    let client = ingest::build_client(config)?;
    client.ensure_collection().await?;

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    tracing::info!(interval_secs = interval, "watching vault");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping watch");
                return Ok(());
            }
        }

        let mut syncer = ingest::syncer_for(config, client.clone(), false, false);
        match syncer.run().await {
            Ok(report) => print_report(&report, json)?,
            Err(RunError::Locked(path)) => {
                tracing::warn!(lock = %path.display(), "another run holds the lock, skipping");
            }
            Err(e) => tracing::error!(error = %e, "sync run aborted"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => cmd_init(&cfg).await?,
        Commands::Sync { full, dry_run } => {
            let report = ingest::run_sync(&cfg, full, dry_run).await?;
            print_report(&report, cli.json)?;
            check_report(&cfg, &report)?;
        }
        Commands::Status => cmd_status(&cfg, cli.json)?,
        Commands::Watch { interval } => cmd_watch(&cfg, interval, cli.json).await?,
    }

    Ok(())
}
