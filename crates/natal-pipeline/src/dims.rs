//! Dimension Builder — static lookup tables.
//!
//! Small code→label and range→label tables, sourced from the versioned
//! catalogs in `natal-core` (not derived from data). Each table is fully
//! dropped and recreated; re-running always yields identical output for the
//! same catalog version. Runs independently of the fact stages.

use natal_core::{catalog, expr::quote_ident};
use natal_store::Store;

use crate::Result;

/// What one dimension build did: `(table, rows)` per table built.
#[derive(Debug)]
pub struct DimOutcome {
  pub tables: Vec<(String, i64)>,
}

impl DimOutcome {
  pub fn total_rows(&self) -> i64 {
    self.tables.iter().map(|(_, rows)| rows).sum()
  }
}

/// Drop and recreate every catalog-sourced dimension table.
///
/// `dim_municipality` and `dim_establishment` are externally loaded and not
/// touched here.
pub async fn build_dimensions(store: &Store) -> Result<DimOutcome> {
  let outcome = store
    .with_conn(|conn| {
      let tx = conn.transaction()?;
      let mut tables = Vec::new();

      for dim in catalog::categorical_dims() {
        let quoted = quote_ident(dim.table);
        tx.execute_batch(&format!(
          "DROP TABLE IF EXISTS {quoted};
           CREATE TABLE {quoted} (
             code  TEXT PRIMARY KEY,
             label TEXT NOT NULL
           );"
        ))?;
        let mut stmt = tx.prepare(&format!(
          "INSERT INTO {quoted} (code, label) VALUES (?1, ?2)"
        ))?;
        for entry in dim.entries {
          stmt.execute(rusqlite::params![entry.code, entry.label])?;
        }
        drop(stmt);
        tables.push((dim.table.to_string(), dim.entries.len() as i64));
      }

      for dim in catalog::binned_dims() {
        let quoted = quote_ident(dim.table);
        tx.execute_batch(&format!(
          "DROP TABLE IF EXISTS {quoted};
           CREATE TABLE {quoted} (
             min_value INTEGER NOT NULL,
             max_value INTEGER NOT NULL,
             label     TEXT NOT NULL
           );"
        ))?;
        let mut stmt = tx.prepare(&format!(
          "INSERT INTO {quoted} (min_value, max_value, label) VALUES (?1, ?2, ?3)"
        ))?;
        for bin in dim.bins {
          stmt.execute(rusqlite::params![bin.min, bin.max, bin.label])?;
        }
        drop(stmt);
        tables.push((dim.table.to_string(), dim.bins.len() as i64));
      }

      tx.execute_batch(
        "DROP TABLE IF EXISTS dim_region;
         CREATE TABLE dim_region (
           code  TEXT PRIMARY KEY,
           label TEXT NOT NULL
         );",
      )?;
      {
        let mut stmt =
          tx.prepare("INSERT INTO dim_region (code, label) VALUES (?1, ?2)")?;
        for region in catalog::regions() {
          stmt.execute(rusqlite::params![region.code, region.label])?;
        }
      }
      tables.push(("dim_region".to_string(), catalog::regions().len() as i64));

      tx.execute_batch(
        "DROP TABLE IF EXISTS dim_state;
         CREATE TABLE dim_state (
           code  TEXT PRIMARY KEY,
           abbr  TEXT NOT NULL,
           label TEXT NOT NULL
         );",
      )?;
      {
        let mut stmt = tx.prepare(
          "INSERT INTO dim_state (code, abbr, label) VALUES (?1, ?2, ?3)",
        )?;
        for state in catalog::states() {
          stmt.execute(rusqlite::params![state.code, state.abbr, state.label])?;
        }
      }
      tables.push(("dim_state".to_string(), catalog::states().len() as i64));

      tx.commit()?;
      Ok(DimOutcome { tables })
    })
    .await?;

  tracing::info!(
    "built {} dimension table(s), {} rows",
    outcome.tables.len(),
    outcome.total_rows()
  );
  Ok(outcome)
}
