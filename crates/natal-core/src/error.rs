//! Error types for `natal-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A column appears more than once in a schema catalog. Every declared
  /// column must have exactly one target type and one coercion rule.
  #[error("duplicate column rule: {0}")]
  DuplicateColumnRule(String),

  /// A boolean cast expression was requested before the column's source
  /// encoding was detected.
  #[error("column {0} is boolean but its encoding has not been detected")]
  BooleanEncodingRequired(String),

  #[error("unknown granularity: {0:?} (expected daily, monthly or yearly)")]
  UnknownGranularity(String),

  #[error("unknown geography: {0:?} (expected region, state, municipality or establishment)")]
  UnknownGeography(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
