use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use tax_cli::{app, logging};
use tax_core::{InputHash, SnapshotRef, StateCode};

// ─── CLI definition ──────────────────────────────────────────────────────────

/// Federal and state income tax calculator.
///
/// Results are printed to stdout as JSON; logs go to stderr.
#[derive(Debug, Parser)]
#[command(name = "tax-calc", version)]
struct Cli {
    /// TOML application config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot store backend (`memory` or `sqlite`). Overrides the config.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Backend connection string, e.g. `snapshots.db`. Overrides the config.
    #[arg(long, global = true)]
    db: Option<String>,

    /// Tax data directory. The embedded data set is used when neither this
    /// nor the config sets one.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log filter (`info`, `debug`, `tax_core=trace`, ...).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Also append logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Calculates a return read as JSON from a file or stdin.
    Calc {
        /// Return file; `-` or nothing reads stdin.
        file: Option<PathBuf>,

        /// State to calculate. Defaults to the return's residency state.
        #[arg(long, conflicts_with = "federal_only")]
        state: Option<StateCode>,

        /// Skip state tax even when the return names a state.
        #[arg(long)]
        federal_only: bool,

        /// Records the result as a what-if scenario of this snapshot.
        #[arg(long)]
        scenario_parent: Option<i64>,
    },
    /// Prints one snapshot.
    Snapshot {
        #[arg(long, conflicts_with = "hash", required_unless_present = "hash")]
        id: Option<i64>,

        /// Input hash (64 hex digits).
        #[arg(long)]
        hash: Option<String>,
    },
    /// Lists a return's snapshots, newest first.
    List { return_id: i64 },
    /// Drops cached results and marks snapshots stale.
    Invalidate {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        return_id: Option<i64>,

        /// Flush the whole calculation cache.
        #[arg(long)]
        all: bool,
    },
}

fn load_config(cli: &Cli) -> Result<app::AppConfig> {
    let mut config = match &cli.config {
        Some(path) => app::AppConfig::load(path)?,
        None => app::AppConfig::default(),
    };
    if let Some(backend) = &cli.backend {
        config.storage.backend = backend.clone();
    }
    if let Some(db) = &cli.db {
        config.storage.connection_string = db.clone();
    }
    if let Some(dir) = &cli.data_dir {
        config.data.dir = Some(dir.clone());
    }
    if let Some(file) = &cli.log_file {
        config.logging.file = Some(file.clone());
    }
    Ok(config)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("cannot serialize output")?;
    println!("{text}");
    Ok(())
}

// ─── entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    logging::init_logging(
        cli.log_level.as_deref(),
        config.logging.level.as_deref(),
        config.logging.file.as_deref(),
    )?;
    debug!(?config, "configuration loaded");

    let pipeline = app::build_pipeline(&config).await?;

    match cli.command {
        Command::Calc {
            file,
            state,
            federal_only,
            scenario_parent,
        } => {
            let tax_return = app::read_return(file.as_deref())?;
            let state = match (federal_only, state) {
                (true, _) => None,
                (false, Some(state)) => Some(state),
                (false, None) => tax_return.taxpayer.residency.state,
            };

            let outcome = match scenario_parent {
                Some(parent) => {
                    pipeline
                        .calculate_scenario(parent, &tax_return, state)
                        .await?
                }
                None => {
                    pipeline
                        .calculate(&tax_return, tax_return.tax_year, state)
                        .await?
                }
            };
            print_json(&outcome)?;
        }
        Command::Snapshot { id, hash } => {
            let by = match (id, hash) {
                (Some(id), _) => SnapshotRef::Id(id),
                (None, Some(hash)) => SnapshotRef::Hash(InputHash::parse(&hash)?),
                (None, None) => anyhow::bail!("either --id or --hash is required"),
            };
            match pipeline.get_snapshot(&by).await? {
                Some(snapshot) => print_json(&snapshot)?,
                None => anyhow::bail!("snapshot not found"),
            }
        }
        Command::List { return_id } => {
            print_json(&pipeline.list_snapshots(return_id).await?)?;
        }
        Command::Invalidate { return_id, all } => {
            if all {
                let removed = pipeline.invalidate_all().await?;
                print_json(&json!({ "cache_entries": removed }))?;
            } else if let Some(return_id) = return_id {
                let done = pipeline.invalidate_return(return_id).await?;
                print_json(&json!({
                    "return_id": return_id,
                    "cache_entries": done.cache_entries,
                    "stale_snapshots": done.stale_snapshots,
                }))?;
            }
        }
    }

    Ok(())
}
