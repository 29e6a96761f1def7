//! Error types for `natal-pipeline`.
//!
//! The taxonomy mirrors how failures propagate: per-column coercion issues
//! are logged and swallowed inside the normalizer (they never reach this
//! enum); missing prerequisites abort a stage before any write; anything
//! failing inside a transaction rolls back to the prior table generation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] natal_core::Error),

  #[error("store error: {0}")]
  Store(#[from] natal_store::Error),

  /// A stage prerequisite is absent; nothing was written.
  #[error("required table {0} does not exist")]
  MissingTable(String),

  #[error("natural key column {column} missing from {table}")]
  MissingKeyColumn { column: String, table: String },

  /// The assembler requires identical column sets across source tables.
  #[error("source tables have mismatched columns: {left} vs {right}")]
  ColumnMismatch { left: String, right: String },

  #[error("no source tables to assemble")]
  NoSources,

  /// One or more aggregate tables failed to build. Sibling tables were
  /// still attempted; the failures are surfaced here rather than skipped.
  #[error("aggregation failed for: {}", format_failures(.0))]
  Aggregation(Vec<(String, String)>),

  #[error("table {0} is not eligible for promotion")]
  PromotionDenied(String),
}

fn format_failures(failures: &[(String, String)]) -> String {
  failures
    .iter()
    .map(|(table, reason)| format!("{table} ({reason})"))
    .collect::<Vec<_>>()
    .join(", ")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
