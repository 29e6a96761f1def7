//! The pipeline driver.
//!
//! Runs the stages in their fixed order — Normalize → Assemble → Features →
//! Dimensions → Aggregate → Promote — and reports per-stage status and row
//! counts. A failed stage leaves every downstream stage un-run, so a
//! half-built fact table never feeds stale aggregate regeneration.

use std::future::Future;

use natal_core::{catalog, features::FeatureCatalog, schema::SchemaCatalog};
use natal_store::Store;
use uuid::Uuid;

use crate::{
  Result, aggregate, assemble, dims, features, normalize,
  promote::{self, DEFAULT_CHUNK_ROWS},
};

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Normalize,
  Assemble,
  Features,
  Dimensions,
  Aggregate,
  Promote,
}

impl Stage {
  pub fn as_str(self) -> &'static str {
    match self {
      Stage::Normalize => "normalize",
      Stage::Assemble => "assemble",
      Stage::Features => "features",
      Stage::Dimensions => "dimensions",
      Stage::Aggregate => "aggregate",
      Stage::Promote => "promote",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
  Succeeded,
  Failed,
  /// Not run: an earlier stage failed, or the stage has nothing to do
  /// (promotion without a serving store).
  Skipped,
}

#[derive(Debug)]
pub struct StageReport {
  pub stage:  Stage,
  pub status: StageStatus,
  /// Rows written (or copied) by the stage; 0 when skipped or failed.
  pub rows:   i64,
  pub detail: Option<String>,
}

#[derive(Debug)]
pub struct PipelineReport {
  pub run_id: Uuid,
  pub stages: Vec<StageReport>,
}

impl PipelineReport {
  pub fn succeeded(&self) -> bool {
    self
      .stages
      .iter()
      .all(|s| s.status != StageStatus::Failed)
  }
}

// ─── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RunOptions {
  /// Registry years to normalize and assemble.
  pub years:      Vec<u16>,
  /// Promotion read-chunk size.
  pub chunk_rows: i64,
}

impl Default for RunOptions {
  fn default() -> Self {
    Self { years: Vec::new(), chunk_rows: DEFAULT_CHUNK_ROWS }
  }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

/// Run the whole pipeline against `store`, promoting to `serving` when one
/// is configured. Never returns an error: failures land in the report.
pub async fn run_pipeline(
  store: &Store,
  serving: Option<&Store>,
  options: &RunOptions,
) -> PipelineReport {
  let run_id = Uuid::new_v4();
  tracing::info!("pipeline run {run_id} starting, years {:?}", options.years);

  let schema = match catalog::birth_schema() {
    Ok(schema) => schema,
    Err(err) => {
      // Catalog construction is static; failing here means the build is
      // misconfigured, and nothing can run.
      tracing::error!("schema catalog invalid: {err}");
      return PipelineReport {
        run_id,
        stages: vec![StageReport {
          stage:  Stage::Normalize,
          status: StageStatus::Failed,
          rows:   0,
          detail: Some(err.to_string()),
        }],
      };
    }
  };
  let feature_catalog = catalog::feature_catalog();

  let mut stages = Vec::new();
  let mut failed = false;

  run_stage(&mut stages, &mut failed, Stage::Normalize, || {
    stage_normalize(store, &schema, &options.years)
  })
  .await;
  run_stage(&mut stages, &mut failed, Stage::Assemble, || {
    stage_assemble(store, &schema, &options.years)
  })
  .await;
  run_stage(&mut stages, &mut failed, Stage::Features, || {
    stage_features(store, &feature_catalog)
  })
  .await;
  run_stage(&mut stages, &mut failed, Stage::Dimensions, || {
    stage_dimensions(store)
  })
  .await;
  run_stage(&mut stages, &mut failed, Stage::Aggregate, || {
    stage_aggregate(store, &feature_catalog)
  })
  .await;

  if failed || serving.is_none() {
    let detail = if failed {
      None
    } else {
      Some("no serving store configured".to_string())
    };
    stages.push(StageReport {
      stage: Stage::Promote,
      status: StageStatus::Skipped,
      rows: 0,
      detail,
    });
  } else if let Some(dest) = serving {
    run_stage(&mut stages, &mut failed, Stage::Promote, || {
      stage_promote(store, dest, options.chunk_rows)
    })
    .await;
  }

  let report = PipelineReport { run_id, stages };
  tracing::info!(
    "pipeline run {run_id} finished: {}",
    if report.succeeded() { "ok" } else { "failed" }
  );
  report
}

async fn run_stage<F, Fut>(
  stages: &mut Vec<StageReport>,
  failed: &mut bool,
  stage: Stage,
  body: F,
) where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<(i64, Option<String>)>>,
{
  if *failed {
    stages.push(StageReport {
      stage,
      status: StageStatus::Skipped,
      rows: 0,
      detail: None,
    });
    return;
  }

  match body().await {
    Ok((rows, detail)) => {
      stages.push(StageReport { stage, status: StageStatus::Succeeded, rows, detail });
    }
    Err(err) => {
      tracing::error!("stage {} failed: {err}", stage.as_str());
      *failed = true;
      stages.push(StageReport {
        stage,
        status: StageStatus::Failed,
        rows: 0,
        detail: Some(err.to_string()),
      });
    }
  }
}

// ─── Stage bodies ────────────────────────────────────────────────────────────

async fn stage_normalize(
  store: &Store,
  schema: &SchemaCatalog,
  years: &[u16],
) -> Result<(i64, Option<String>)> {
  let mut rows = 0;
  for year in years {
    let outcome = normalize::normalize_year(store, schema, *year).await?;
    rows += outcome.rows;
  }
  Ok((rows, Some(format!("{} year(s)", years.len()))))
}

async fn stage_assemble(
  store: &Store,
  schema: &SchemaCatalog,
  years: &[u16],
) -> Result<(i64, Option<String>)> {
  let sources: Vec<String> =
    years.iter().map(|y| normalize::norm_table_name(*y)).collect();
  let outcome = assemble::assemble(store, schema, &sources).await?;
  Ok((
    outcome.inserted,
    Some(format!("{} fact rows total", outcome.fact_rows)),
  ))
}

async fn stage_features(
  store: &Store,
  catalog: &FeatureCatalog,
) -> Result<(i64, Option<String>)> {
  let outcome = features::compile_features(store, catalog).await?;
  Ok((
    outcome.fact_rows,
    Some(format!(
      "{} added, {} refreshed, {} missing sources",
      outcome.added.len(),
      outcome.refreshed.len(),
      outcome.skipped_missing.len()
    )),
  ))
}

async fn stage_dimensions(store: &Store) -> Result<(i64, Option<String>)> {
  let outcome = dims::build_dimensions(store).await?;
  Ok((
    outcome.total_rows(),
    Some(format!("{} table(s)", outcome.tables.len())),
  ))
}

async fn stage_aggregate(
  store: &Store,
  catalog: &FeatureCatalog,
) -> Result<(i64, Option<String>)> {
  let outcome = aggregate::build_aggregates(store, catalog).await?;
  let rows = outcome.tables.iter().map(|(_, r)| r).sum();
  Ok((rows, Some(format!("{} table(s)", outcome.tables.len()))))
}

async fn stage_promote(
  store: &Store,
  dest: &Store,
  chunk_rows: i64,
) -> Result<(i64, Option<String>)> {
  let outcome = promote::promote_all(store, dest, chunk_rows).await?;
  let rows = outcome.tables.iter().map(|(_, r)| r).sum();
  Ok((rows, Some(format!("{} table(s)", outcome.tables.len()))))
}
