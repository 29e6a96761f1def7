//! SQLite access layer for the natal pipeline.
//!
//! Wraps [`tokio_rusqlite`] so all database work runs on a dedicated thread
//! without blocking the async runtime. Stages receive a [`Store`] by
//! explicit injection; it is opened once at pipeline start and closed at
//! pipeline end.

mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::Store;
