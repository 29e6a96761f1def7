//! Core types for the natal birth-registry pipeline.
//!
//! This crate is deliberately free of database dependencies. It holds the
//! declarative catalogs (column-type schema, feature formulas, dimension
//! code tables), the typed SQL expression model the pipeline renders its
//! statements from, and the natural-key definition shared by deduplication
//! and the fact table's uniqueness index. All other crates depend on it.

pub mod catalog;
pub mod error;
pub mod expr;
pub mod features;
pub mod key;
pub mod schema;
pub mod slice;

pub use error::{Error, Result};
