//! Aggregate readers and the national summary.

use natal_core::{
  expr::{quote_ident, quote_text},
  slice::{Geography, Granularity, aggregate_table_name},
};
use natal_store::Store;
use rusqlite::types::Value;
use serde::Serialize;

use crate::{Error, Result};

/// Reference aggregate for period listing and national rollups. State ×
/// month is always buildable: its dimension ships with the catalogs, so it
/// is present whenever promotion has run at all.
const REFERENCE_AGGREGATE: &str = "agg_state_monthly";

/// The months with data, ascending, read from the reference aggregate.
pub async fn available_periods(store: &Store) -> Result<Vec<String>> {
  require_table(store, REFERENCE_AGGREGATE).await?;
  let (_, rows) = store
    .query_rows(format!(
      "SELECT DISTINCT time_bucket FROM {REFERENCE_AGGREGATE}
       ORDER BY time_bucket"
    ))
    .await?;
  Ok(
    rows
      .into_iter()
      .filter_map(|row| match row.into_iter().next() {
        Some(Value::Text(bucket)) => Some(bucket),
        _ => None,
      })
      .collect(),
  )
}

/// Rows of one aggregate table as JSON objects, optionally restricted to a
/// single time bucket.
pub async fn get_aggregate(
  store: &Store,
  geography: Geography,
  granularity: Granularity,
  period: Option<&str>,
) -> Result<Vec<serde_json::Map<String, serde_json::Value>>> {
  let table = aggregate_table_name(geography, granularity);
  require_table(store, &table).await?;

  let mut sql = format!("SELECT * FROM {}", quote_ident(&table));
  if let Some(bucket) = period {
    sql.push_str(&format!(" WHERE time_bucket = {}", quote_text(bucket)));
  }
  sql.push_str(" ORDER BY time_bucket");

  let (names, rows) = store.query_rows(sql).await?;
  tracing::debug!("read {} row(s) from {table}", rows.len());

  Ok(
    rows
      .into_iter()
      .map(|row| {
        names
          .iter()
          .cloned()
          .zip(row.into_iter().map(value_to_json))
          .collect()
      })
      .collect(),
  )
}

/// National headline numbers for one month.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Summary {
  pub period:               String,
  pub total_births:         i64,
  pub cesarean_pct:         Option<f64>,
  pub low_birth_weight_pct: Option<f64>,
  pub premature_pct:        Option<f64>,
  pub teen_mother_pct:      Option<f64>,
  pub idademae_mean:        Option<f64>,
  pub peso_mean:            Option<f64>,
  pub apgar5_mean:          Option<f64>,
}

/// Roll the per-state rows of one month up to the national level.
///
/// Percentages are recomputed from summed counts rather than averaged, so
/// populous states carry their real weight; means are weighted by each
/// state's birth count for the same reason.
pub async fn get_summary(store: &Store, period: &str) -> Result<Summary> {
  require_table(store, REFERENCE_AGGREGATE).await?;

  let (names, rows) = store
    .query_rows(format!(
      "SELECT * FROM {REFERENCE_AGGREGATE}
       WHERE time_bucket = {}",
      quote_text(period)
    ))
    .await?;
  let column = |name: &str| names.iter().position(|n| n == name);

  let total_at = column("total_births");
  let mut total_births = 0i64;
  let mut counts = [0i64; 4];
  let mut count_present = [false; 4];
  const COUNT_COLUMNS: [&str; 4] = [
    "cesarean_count",
    "low_birth_weight_count",
    "premature_count",
    "teen_mother_count",
  ];
  let mut mean_sums = [0f64; 3];
  let mut mean_weights = [0i64; 3];
  const MEAN_COLUMNS: [&str; 3] = ["idademae_mean", "peso_mean", "apgar5_mean"];

  for row in &rows {
    let row_total = total_at.map_or(0, |i| as_i64(&row[i]).unwrap_or(0));
    total_births += row_total;

    for (slot, name) in COUNT_COLUMNS.iter().enumerate() {
      if let Some(i) = column(name) {
        count_present[slot] = true;
        counts[slot] += as_i64(&row[i]).unwrap_or(0);
      }
    }
    for (slot, name) in MEAN_COLUMNS.iter().enumerate() {
      if let Some(value) = column(name).and_then(|i| as_f64(&row[i])) {
        mean_sums[slot] += value * row_total as f64;
        mean_weights[slot] += row_total;
      }
    }
  }

  let pct = |slot: usize| {
    (count_present[slot] && total_births > 0)
      .then(|| counts[slot] as f64 * 100.0 / total_births as f64)
  };
  let mean = |slot: usize| {
    (mean_weights[slot] > 0)
      .then(|| mean_sums[slot] / mean_weights[slot] as f64)
  };

  Ok(Summary {
    period: period.to_string(),
    total_births,
    cesarean_pct: pct(0),
    low_birth_weight_pct: pct(1),
    premature_pct: pct(2),
    teen_mother_pct: pct(3),
    idademae_mean: mean(0),
    peso_mean: mean(1),
    apgar5_mean: mean(2),
  })
}

async fn require_table(store: &Store, table: &str) -> Result<()> {
  if store.table_exists(table).await? {
    Ok(())
  } else {
    Err(Error::MissingAggregate(table.to_string()))
  }
}

fn as_i64(value: &Value) -> Option<i64> {
  match value {
    Value::Integer(i) => Some(*i),
    Value::Real(f) => Some(*f as i64),
    _ => None,
  }
}

fn as_f64(value: &Value) -> Option<f64> {
  match value {
    Value::Integer(i) => Some(*i as f64),
    Value::Real(f) => Some(*f),
    _ => None,
  }
}

fn value_to_json(value: Value) -> serde_json::Value {
  match value {
    Value::Null => serde_json::Value::Null,
    Value::Integer(i) => serde_json::Value::from(i),
    Value::Real(f) => {
      serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, Into::into)
    }
    Value::Text(s) => serde_json::Value::String(s),
    // Aggregate tables carry no blobs; geometry stays in the dims and is
    // not surfaced through the JSON path.
    Value::Blob(_) => serde_json::Value::Null,
  }
}
