//! Aggregation Engine — stage five.
//!
//! Materialises one aggregate table per (geography × granularity)
//! combination: counts, NULL-guarded percentages for every compiled boolean
//! feature, and means over the numeric fields. Aggregate tables are pure
//! derived views of the fact table and are fully dropped and recreated
//! every run. Each table builds independently; a failure is surfaced after
//! all siblings have been attempted, never silently skipped.

use natal_core::{
  catalog::MEAN_FIELDS,
  expr::{Agg, Expr, SelectItem, quote_ident},
  features::FeatureCatalog,
  slice::{Geography, Granularity, aggregate_table_name},
};
use natal_store::Store;

use crate::{Error, Result, assemble::FACT_TABLE};

/// What one aggregation run built: `(table, rows)` per aggregate table.
#[derive(Debug)]
pub struct AggregateOutcome {
  pub tables: Vec<(String, i64)>,
}

/// Build every aggregate table. Only features actually present as fact
/// columns are surfaced; the count/percentage pair for each follows the
/// `<feature>_count` / `<feature>_pct` contract.
pub async fn build_aggregates(
  store: &Store,
  features: &FeatureCatalog,
) -> Result<AggregateOutcome> {
  if !store.table_exists(FACT_TABLE).await? {
    return Err(Error::MissingTable(FACT_TABLE.to_string()));
  }

  let fact_columns = store.table_columns(FACT_TABLE).await?;
  let feature_names: Vec<String> = features
    .iter()
    .map(|f| f.name.clone())
    .filter(|name| fact_columns.iter().any(|c| c == name))
    .collect();
  let mean_fields: Vec<(&str, &str)> = MEAN_FIELDS
    .iter()
    .copied()
    .filter(|(col, _)| fact_columns.iter().any(|c| c == *col))
    .collect();

  let mut tables = Vec::new();
  let mut failures = Vec::new();

  for geo in Geography::ALL {
    if geo.dim_is_external() && !store.table_exists(geo.dim_table()).await? {
      // Externally-loaded dims are a hard prerequisite for their slices;
      // all three granularities fail loudly, siblings continue.
      for gran in Granularity::ALL {
        let table = aggregate_table_name(geo, gran);
        let reason =
          format!("required dimension table {} does not exist", geo.dim_table());
        tracing::error!("skipping {table}: {reason}");
        failures.push((table, reason));
      }
      continue;
    }

    for gran in Granularity::ALL {
      let table = aggregate_table_name(geo, gran);
      let batch = format!(
        "DROP TABLE IF EXISTS {quoted};
         CREATE TABLE {quoted} AS {select};",
        quoted = quote_ident(&table),
        select = aggregate_select(geo, gran, &feature_names, &mean_fields),
      );

      let result = store
        .with_conn(move |conn| {
          let tx = conn.transaction()?;
          tx.execute_batch(&batch)?;
          tx.commit()?;
          Ok(())
        })
        .await;

      match result {
        Ok(()) => {
          let rows = store.row_count(&table).await?;
          tracing::info!("built {table}: {rows} rows");
          tables.push((table, rows));
        }
        Err(err) => {
          tracing::error!("building {table} failed: {err}");
          failures.push((table, err.to_string()));
        }
      }
    }
  }

  if failures.is_empty() {
    Ok(AggregateOutcome { tables })
  } else {
    Err(Error::Aggregation(failures))
  }
}

/// The SELECT for one aggregate table. Pure; unit-tested without a store.
pub fn aggregate_select(
  geo: Geography,
  gran: Granularity,
  feature_names: &[String],
  mean_fields: &[(&str, &str)],
) -> String {
  let bucket = gran.bucket_expr("DTNASC").render();
  let key = geo.key_expr().render();

  let mut items: Vec<String> = vec![
    format!("{bucket} AS {}", quote_ident("time_bucket")),
    format!("{key} AS {}", quote_ident(&geo.code_alias())),
  ];
  if geo == Geography::State {
    items.push(format!("d.{} AS {}", quote_ident("abbr"), quote_ident("state_abbr")));
  }
  items.push(format!(
    "d.{} AS {}",
    quote_ident("label"),
    quote_ident(&geo.label_alias())
  ));
  items.push("COUNT(*) AS \"total_births\"".to_string());

  for name in feature_names {
    let matched = Expr::col(name).eq(Expr::int(1));
    items.push(
      SelectItem::from_agg(&Agg::CountWhere(matched.clone()), format!("{name}_count"))
        .render(),
    );
    items.push(
      SelectItem::from_agg(&Agg::PctWhere(matched), format!("{name}_pct")).render(),
    );
  }

  for (column, alias) in mean_fields {
    items.push(SelectItem::from_agg(&Agg::Mean((*column).to_string()), *alias).render());
  }

  format!(
    "SELECT {items}
     FROM {fact} f
     LEFT JOIN {dim} d ON d.{code} = {key}
     WHERE {date} IS NOT NULL
     GROUP BY {bucket}, {key}",
    items = items.join(",\n            "),
    fact = quote_ident(FACT_TABLE),
    dim = quote_ident(geo.dim_table()),
    code = quote_ident("code"),
    date = quote_ident("DTNASC"),
  )
}
