//! The natal transformation pipeline.
//!
//! Six discrete, restartable batch stages over a shared SQLite store, run
//! strictly in sequence: type normalization, fact assembly with
//! deduplication, feature compilation, dimension building, aggregation, and
//! promotion to a serving store. There is no in-process data flow between
//! stages; each reads and writes named tables, and every table build is
//! transaction-scoped so a later stage never observes a half-written table.

pub mod aggregate;
pub mod assemble;
pub mod dims;
pub mod error;
pub mod features;
pub mod normalize;
pub mod promote;
pub mod run;

pub use error::{Error, Result};
pub use run::{PipelineReport, RunOptions, Stage, StageReport, StageStatus, run_pipeline};

#[cfg(test)]
mod tests;
