//! `natal` — birth-registry pipeline binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the
//! pipeline store, and runs the requested stage or the whole pipeline.
//! Reporting subcommands read the serving store instead.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use natal_core::slice::{Geography, Granularity};
use natal_pipeline::{RunOptions, StageStatus, run_pipeline};
use natal_store::Store;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Birth-registry ETL pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run every pipeline stage in order.
  Run {
    /// Registry years to process (overrides the config file).
    #[arg(long)]
    years: Vec<u16>,
  },
  /// Normalize the raw table of one registry year.
  Normalize {
    #[arg(long)]
    year: u16,
  },
  /// Assemble normalized years into the deduplicated fact table.
  Assemble {
    #[arg(long)]
    years: Vec<u16>,
  },
  /// Compile derived features into the fact table.
  Features,
  /// Rebuild the catalog-sourced dimension tables.
  Dimensions,
  /// Rebuild every aggregate table from the fact table.
  Aggregate,
  /// Copy dimension and aggregate tables to the serving store.
  Promote,
  /// List the months with data in the serving store.
  Periods,
  /// Print one aggregate slice as JSON.
  Slice {
    /// region, state, municipality or establishment.
    geography:   Geography,
    /// daily, monthly or yearly.
    granularity: Granularity,
    /// Restrict to one time bucket, e.g. 2020-01.
    #[arg(long)]
    period:      Option<String>,
  },
  /// Print the national summary for one month as JSON.
  Summary { period: String },
}

// ─── Configuration ───────────────────────────────────────────────────────────

fn default_store_path() -> PathBuf {
  PathBuf::from("natal.db")
}

fn default_chunk_rows() -> i64 {
  natal_pipeline::promote::DEFAULT_CHUNK_ROWS
}

#[derive(Debug, Clone, Deserialize)]
struct Settings {
  /// SQLite file holding raw, normalized, fact and aggregate tables.
  #[serde(default = "default_store_path")]
  store_path:   PathBuf,
  /// SQLite file the serving tier reads; promotion target.
  serving_path: Option<PathBuf>,
  /// Registry years a bare `run`/`assemble` processes.
  #[serde(default)]
  years:        Vec<u16>,
  /// Promotion read-chunk size.
  #[serde(default = "default_chunk_rows")]
  chunk_rows:   i64,
}

fn load_settings(path: &PathBuf) -> anyhow::Result<Settings> {
  config::Config::builder()
    .add_source(config::File::from(path.clone()).required(false))
    .add_source(config::Environment::with_prefix("NATAL"))
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise settings")
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = load_settings(&cli.config)?;

  match cli.command {
    Command::Run { years } => {
      let store = open_store(&settings).await?;
      let serving = open_serving(&settings).await?;
      let options = RunOptions {
        years:      if years.is_empty() { settings.years.clone() } else { years },
        chunk_rows: settings.chunk_rows,
      };
      anyhow::ensure!(!options.years.is_empty(), "no years configured");

      let report = run_pipeline(&store, serving.as_ref(), &options).await;
      println!("run {}", report.run_id);
      for stage in &report.stages {
        let status = match stage.status {
          StageStatus::Succeeded => "ok",
          StageStatus::Failed => "FAILED",
          StageStatus::Skipped => "skipped",
        };
        println!(
          "  {:<10} {:<8} {:>10} rows  {}",
          stage.stage.as_str(),
          status,
          stage.rows,
          stage.detail.as_deref().unwrap_or("")
        );
      }
      anyhow::ensure!(report.succeeded(), "pipeline run failed");
    }
    Command::Normalize { year } => {
      let store = open_store(&settings).await?;
      let schema = natal_core::catalog::birth_schema()?;
      let outcome =
        natal_pipeline::normalize::normalize_year(&store, &schema, year).await?;
      println!("{}: {} rows", outcome.table, outcome.rows);
      if !outcome.passthrough.is_empty() {
        println!("passed through unconverted: {:?}", outcome.passthrough);
      }
    }
    Command::Assemble { years } => {
      let store = open_store(&settings).await?;
      let schema = natal_core::catalog::birth_schema()?;
      let years = if years.is_empty() { settings.years.clone() } else { years };
      anyhow::ensure!(!years.is_empty(), "no years configured");
      let sources: Vec<String> = years
        .iter()
        .map(|y| natal_pipeline::normalize::norm_table_name(*y))
        .collect();
      let outcome = natal_pipeline::assemble::assemble(&store, &schema, &sources).await?;
      println!(
        "fact_births: {} rows ({} inserted)",
        outcome.fact_rows, outcome.inserted
      );
    }
    Command::Features => {
      let store = open_store(&settings).await?;
      let catalog = natal_core::catalog::feature_catalog();
      let outcome = natal_pipeline::features::compile_features(&store, &catalog).await?;
      println!(
        "added {:?}, {} refreshed, {} missing sources",
        outcome.added,
        outcome.refreshed.len(),
        outcome.skipped_missing.len()
      );
    }
    Command::Dimensions => {
      let store = open_store(&settings).await?;
      let outcome = natal_pipeline::dims::build_dimensions(&store).await?;
      for (table, rows) in &outcome.tables {
        println!("{table}: {rows} rows");
      }
    }
    Command::Aggregate => {
      let store = open_store(&settings).await?;
      let catalog = natal_core::catalog::feature_catalog();
      let outcome = natal_pipeline::aggregate::build_aggregates(&store, &catalog).await?;
      for (table, rows) in &outcome.tables {
        println!("{table}: {rows} rows");
      }
    }
    Command::Promote => {
      let store = open_store(&settings).await?;
      let serving = open_serving(&settings)
        .await?
        .context("serving_path is not configured")?;
      let outcome =
        natal_pipeline::promote::promote_all(&store, &serving, settings.chunk_rows)
          .await?;
      for (table, rows) in &outcome.tables {
        println!("{table}: {rows} rows");
      }
    }
    Command::Periods => {
      let serving = open_serving(&settings)
        .await?
        .context("serving_path is not configured")?;
      for period in natal_report::available_periods(&serving).await? {
        println!("{period}");
      }
    }
    Command::Slice { geography, granularity, period } => {
      let serving = open_serving(&settings)
        .await?
        .context("serving_path is not configured")?;
      let rows = natal_report::get_aggregate(
        &serving,
        geography,
        granularity,
        period.as_deref(),
      )
      .await?;
      println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    Command::Summary { period } => {
      let serving = open_serving(&settings)
        .await?
        .context("serving_path is not configured")?;
      let summary = natal_report::get_summary(&serving, &period).await?;
      println!("{}", serde_json::to_string_pretty(&summary)?);
    }
  }

  Ok(())
}

async fn open_store(settings: &Settings) -> anyhow::Result<Store> {
  Store::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))
}

async fn open_serving(settings: &Settings) -> anyhow::Result<Option<Store>> {
  match &settings.serving_path {
    Some(path) => {
      let store = Store::open(path)
        .await
        .with_context(|| format!("failed to open serving store at {path:?}"))?;
      Ok(Some(store))
    }
    None => Ok(None),
  }
}
