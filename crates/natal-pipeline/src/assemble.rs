//! Fact Assembler — stage two.
//!
//! Unions the normalized per-period tables, deduplicates on the natural
//! key, and creates or append-extends `fact_births`. Re-running over
//! already-ingested periods is a no-op; running over newly-arrived periods
//! is purely additive. The whole step is one transaction.

use natal_core::{
  expr::quote_ident,
  key::{NATURAL_KEY, all_key_fields_present, key_column_list},
  schema::SchemaCatalog,
};
use natal_store::Store;

use crate::{Error, Result};

/// The canonical fact table. One row per real-world birth event.
pub const FACT_TABLE: &str = "fact_births";

/// Name of the partial uniqueness index over the natural key.
pub const NATURAL_KEY_INDEX: &str = "fact_births_natural_key";

/// What one assembler run did.
#[derive(Debug)]
pub struct AssembleOutcome {
  /// True when this run created the fact table.
  pub created:   bool,
  /// Rows inserted by this run (0 on a pure re-run).
  pub inserted:  i64,
  /// Total fact rows after the run.
  pub fact_rows: i64,
}

/// Assemble the fact table from `sources` (normalized tables for distinct
/// periods, identical column sets required).
pub async fn assemble(
  store: &Store,
  schema: &SchemaCatalog,
  sources: &[String],
) -> Result<AssembleOutcome> {
  if sources.is_empty() {
    return Err(Error::NoSources);
  }

  for source in sources {
    if !store.table_exists(source).await? {
      return Err(Error::MissingTable(source.clone()));
    }
  }

  let columns = store.table_columns(&sources[0]).await?;
  for source in &sources[1..] {
    let other = store.table_columns(source).await?;
    if !same_column_set(&columns, &other) {
      return Err(Error::ColumnMismatch {
        left:  sources[0].clone(),
        right: source.clone(),
      });
    }
  }

  for key_column in NATURAL_KEY {
    if !columns.iter().any(|c| c == key_column) {
      return Err(Error::MissingKeyColumn {
        column: key_column.to_string(),
        table:  sources[0].clone(),
      });
    }
  }

  let select = dedup_select(sources, &columns);
  let column_list = quoted_list(&columns);
  let exists = store.table_exists(FACT_TABLE).await?;

  let batch = if exists {
    // Append run: only natural keys not already present survive. The
    // uniqueness index is partial (it skips rows with an unknown key
    // field), so the guard uses IS rather than = to match NULL key
    // fields too; otherwise re-runs would re-insert those rows.
    format!(
      "INSERT INTO {fact} ({column_list})
       SELECT {column_list} FROM ({select}) AS src
       WHERE NOT EXISTS (
         SELECT 1 FROM {fact} AS cur WHERE {key_match}
       );",
      fact = quote_ident(FACT_TABLE),
      key_match = key_match_predicate(),
    )
  } else {
    let decls: Vec<String> = columns
      .iter()
      .map(|c| format!("{} {}", quote_ident(c), schema.decl_type(c)))
      .collect();
    format!(
      "CREATE TABLE {fact} (
         id INTEGER PRIMARY KEY AUTOINCREMENT,
         {decls}
       );
       INSERT INTO {fact} ({column_list}) {select};
       CREATE UNIQUE INDEX {index} ON {fact} ({key}) WHERE {predicate};",
      fact = quote_ident(FACT_TABLE),
      decls = decls.join(",\n         "),
      index = quote_ident(NATURAL_KEY_INDEX),
      key = key_column_list(),
      predicate = all_key_fields_present().render(),
    )
  };

  let inserted = store
    .with_conn(move |conn| {
      let tx = conn.transaction()?;
      tx.execute_batch(&batch)?;
      let inserted: i64 =
        tx.query_row("SELECT changes()", [], |row| row.get(0))?;
      tx.commit()?;
      Ok(inserted)
    })
    .await?;

  let fact_rows = store.row_count(FACT_TABLE).await?;
  tracing::info!(
    "assembled {FACT_TABLE} from {} source(s): {inserted} inserted, {fact_rows} total",
    sources.len()
  );

  Ok(AssembleOutcome { created: !exists, inserted, fact_rows })
}

/// The deduplicated union: rank rows within each natural-key partition by
/// earliest receipt date (then source order) and keep rank 1. The ranking
/// column never reaches the fact table — it is selected away here.
fn dedup_select(sources: &[String], columns: &[String]) -> String {
  let column_list = quoted_list(columns);

  let union: Vec<String> = sources
    .iter()
    .enumerate()
    .map(|(ordinal, table)| {
      format!(
        "SELECT {column_list}, {} AS src_ord FROM {}",
        ordinal + 1,
        quote_ident(table)
      )
    })
    .collect();

  let order = if columns.iter().any(|c| c == "DTRECEBIM") {
    "\"DTRECEBIM\" ASC NULLS LAST, src_ord ASC"
  } else {
    "src_ord ASC"
  };

  format!(
    "SELECT {column_list} FROM (
       SELECT {column_list},
              ROW_NUMBER() OVER (PARTITION BY {key} ORDER BY {order}) AS dedup_rank
       FROM ({union})
     ) WHERE dedup_rank = 1",
    key = key_column_list(),
    union = union.join(" UNION ALL "),
  )
}

/// Null-aware equality over the natural key between the incoming batch
/// (`src`) and the existing fact table (`cur`).
fn key_match_predicate() -> String {
  NATURAL_KEY
    .iter()
    .map(|c| format!("cur.{col} IS src.{col}", col = quote_ident(c)))
    .collect::<Vec<_>>()
    .join(" AND ")
}

fn quoted_list(columns: &[String]) -> String {
  columns
    .iter()
    .map(|c| quote_ident(c))
    .collect::<Vec<_>>()
    .join(", ")
}

fn same_column_set(a: &[String], b: &[String]) -> bool {
  let mut a: Vec<&String> = a.iter().collect();
  let mut b: Vec<&String> = b.iter().collect();
  a.sort();
  b.sort();
  a == b
}
