//! Promotion Sync — stage six.
//!
//! Copies dimension and aggregate tables from the pipeline store to the
//! serving store, read-then-replace per table. The fact table is explicitly
//! denied: at tens of millions of rows it is far past what the serving tier
//! carries, and the reporting layer only reads aggregates anyway. Reads
//! stream in bounded row chunks; BLOB values (municipality geometries)
//! travel as raw bytes, so the destination encoding is bit-exact.

use natal_core::expr::quote_ident;
use natal_store::Store;
use rusqlite::types::Value;

use crate::{Error, Result, assemble::FACT_TABLE};

/// Rows per read chunk / insert block.
pub const DEFAULT_CHUNK_ROWS: i64 = 5_000;

/// Table-name prefixes eligible for promotion.
const ALLOWED_PREFIXES: [&str; 2] = ["dim_", "agg_"];

/// What one promotion run copied: `(table, rows)` per table.
#[derive(Debug)]
pub struct PromoteOutcome {
  pub tables: Vec<(String, i64)>,
}

/// Whether `name` may be promoted: allow-listed by prefix, with the fact
/// table denied outright.
pub fn promotable(name: &str) -> bool {
  name != FACT_TABLE && ALLOWED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Promote every `dim_*` and `agg_*` table from `source` to `dest`.
pub async fn promote_all(
  source: &Store,
  dest: &Store,
  chunk_rows: i64,
) -> Result<PromoteOutcome> {
  let mut names = source.tables_with_prefix("dim_").await?;
  names.extend(source.tables_with_prefix("agg_").await?);

  let mut tables = Vec::new();
  for name in names {
    let rows = promote_table(source, dest, &name, chunk_rows).await?;
    tables.push((name, rows));
  }

  tracing::info!("promoted {} table(s)", tables.len());
  Ok(PromoteOutcome { tables })
}

/// Copy one table, replacing any destination table of the same name.
pub async fn promote_table(
  source: &Store,
  dest: &Store,
  name: &str,
  chunk_rows: i64,
) -> Result<i64> {
  if !promotable(name) {
    return Err(Error::PromotionDenied(name.to_string()));
  }
  let ddl = source
    .table_ddl(name)
    .await?
    .ok_or_else(|| Error::MissingTable(name.to_string()))?;

  // Page the read in fixed-size chunks; the full table is buffered so the
  // destination replace stays one transaction. Dim and aggregate tables are
  // small — the fact table, which is not, is denied above.
  let mut rows: Vec<Vec<Value>> = Vec::new();
  let mut offset = 0;
  loop {
    let chunk = source.read_rows_chunk(name, offset, chunk_rows).await?;
    let len = chunk.len() as i64;
    rows.extend(chunk);
    if len < chunk_rows {
      break;
    }
    offset += len;
  }

  let copied = rows.len() as i64;
  let table = name.to_string();
  let quoted = quote_ident(name);
  dest
    .with_conn(move |conn| {
      let tx = conn.transaction()?;
      tx.execute_batch(&format!("DROP TABLE IF EXISTS {quoted}"))?;
      tx.execute_batch(&ddl)?;

      if let Some(first) = rows.first() {
        let placeholders: Vec<String> =
          (1..=first.len()).map(|i| format!("?{i}")).collect();
        let mut stmt = tx.prepare(&format!(
          "INSERT INTO {quoted} VALUES ({})",
          placeholders.join(", ")
        ))?;
        for row in &rows {
          stmt.execute(rusqlite::params_from_iter(row.iter()))?;
        }
        drop(stmt);
      }

      tx.commit()?;
      Ok(())
    })
    .await?;

  tracing::info!("promoted {table}: {copied} rows");
  Ok(copied)
}
