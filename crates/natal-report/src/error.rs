use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[from] natal_store::Error),
  /// The serving store has not been promoted to yet, or the requested
  /// slice was never built.
  #[error("aggregate table {0} does not exist in the serving store")]
  MissingAggregate(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
