use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use holdings_core::{Config, Quarter};
use holdings_ingestion::EdgarClient;
use holdings_pipeline::{HoldingsStore, Pipeline, RunOptions, SqliteStore};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

mod logging;

#[derive(Parser)]
#[command(name = "holdings")]
#[command(about = "Quarterly institutional holdings ledger built from 13F filings")]
#[command(version)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch filings and process every quarter found
    Run {
        /// Only consider filings submitted on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,
        /// Reprocess quarters already stored with PASS or WARN
        #[arg(long)]
        force: bool,
        /// Restrict processing to these quarters (e.g. 2024Q3); repeatable
        #[arg(long = "quarter")]
        quarters: Vec<Quarter>,
        /// Skip writing CSV/JSON artifacts
        #[arg(long)]
        no_artifacts: bool,
    },
    /// List stored quarters and their validation status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.json_logs);

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Run {
            since,
            force,
            quarters,
            no_artifacts,
        } => {
            if no_artifacts {
                config.output.artifact_dir = None;
            }
            let mut store = SqliteStore::open(&config.output.database_path).with_context(|| {
                format!("opening database {}", config.output.database_path.display())
            })?;
            let client = EdgarClient::new(&config.edgar).context("building filing client")?;
            let pipeline = Pipeline::new(&config, client);

            let options = RunOptions {
                since,
                force,
                quarters: (!quarters.is_empty()).then(|| quarters.into_iter().collect()),
            };
            info!(cik = %config.edgar.cik, force, "Starting pipeline run");
            let summary = pipeline.run(&mut store, &options).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Status => {
            let store = SqliteStore::open(&config.output.database_path).with_context(|| {
                format!("opening database {}", config.output.database_path.display())
            })?;
            let mut rows = Vec::new();
            for quarter in store.stored_quarters()? {
                if let Some(meta) = store.load_meta(quarter)? {
                    rows.push(json!({
                        "quarter": meta.quarter,
                        "validation_status": meta.validation_status,
                        "unit_multiplier": meta.unit_multiplier,
                        "total_value_usd": meta.total_value_usd,
                        "num_holdings": meta.num_holdings,
                        "processed_at": meta.processed_at,
                    }));
                }
            }
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}
