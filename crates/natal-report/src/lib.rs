//! Read-side queries over the serving store.
//!
//! Everything here reads the promoted `agg_*` and `dim_*` tables only; the
//! fact table never reaches the serving tier.

mod error;
mod report;


pub use self::{
  error::{Error, Result},
  report::{Summary, available_periods, get_aggregate, get_summary},
};
