//! Feature Compiler — stage three.
//!
//! Rebuilds the fact table with every computable derived feature appended,
//! in one pass: a single `INSERT .. SELECT` into a sibling table, then an
//! atomic rename swap (rename old out, rename new in, drop old) inside one
//! transaction. Readers never observe a mid-rebuild table; a crash before
//! commit leaves the original untouched.

use natal_core::{
  expr::{SelectItem, quote_ident},
  features::FeatureCatalog,
  key::{all_key_fields_present, key_column_list},
};
use natal_store::Store;

use crate::{
  Error, Result,
  assemble::{FACT_TABLE, NATURAL_KEY_INDEX},
};

const REBUILD_TABLE: &str = "fact_births_rebuild";
const BACKUP_TABLE: &str = "fact_births_backup";

/// What one feature-compilation run did.
#[derive(Debug)]
pub struct FeatureOutcome {
  /// Features appended as new columns by this run.
  pub added:           Vec<String>,
  /// Features already present as columns; NULL values on them (rows
  /// appended since the last compile) are recomputed in place.
  pub refreshed:       Vec<String>,
  /// Features whose source columns are missing from the fact table.
  pub skipped_missing: Vec<String>,
  pub fact_rows:       i64,
}

/// Append all computable features from `catalog` to the fact table.
///
/// A feature is computable iff all of its source columns exist; otherwise
/// it is skipped with a warning — never null-filled. Features already
/// present keep their stored values, but NULL entries are recomputed so
/// rows assembled after an earlier compile catch up.
pub async fn compile_features(
  store: &Store,
  catalog: &FeatureCatalog,
) -> Result<FeatureOutcome> {
  if !store.table_exists(FACT_TABLE).await? {
    // Missing prerequisite: abort before any write.
    return Err(Error::MissingTable(FACT_TABLE.to_string()));
  }

  let existing = store.table_schema(FACT_TABLE).await?;
  let existing_names: Vec<&str> =
    existing.iter().map(|(name, _)| name.as_str()).collect();

  let mut added = Vec::new();
  let mut refreshed = Vec::new();
  let mut skipped_missing = Vec::new();
  let mut new_items: Vec<SelectItem> = Vec::new();
  let mut refresh_exprs: Vec<(String, String)> = Vec::new();

  for feature in catalog.iter() {
    let missing: Vec<&String> = feature
      .sources
      .iter()
      .filter(|s| !existing_names.contains(&s.as_str()))
      .collect();
    if !missing.is_empty() {
      tracing::warn!(
        "feature {} skipped: source column(s) {missing:?} not in {FACT_TABLE}",
        feature.name
      );
      skipped_missing.push(feature.name.clone());
      continue;
    }
    if existing_names.contains(&feature.name.as_str()) {
      tracing::debug!("feature {} present, refreshing NULL values", feature.name);
      refresh_exprs
        .push((feature.name.clone(), feature.select_expr().render()));
      refreshed.push(feature.name.clone());
    } else {
      new_items
        .push(SelectItem::from_expr(&feature.select_expr(), &feature.name));
      added.push(feature.name.clone());
    }
  }

  if new_items.is_empty() && refresh_exprs.is_empty() {
    let fact_rows = store.row_count(FACT_TABLE).await?;
    tracing::info!("no computable features");
    return Ok(FeatureOutcome { added, refreshed, skipped_missing, fact_rows });
  }

  let batch = rebuild_batch(&existing, &refresh_exprs, &new_items);
  store
    .with_conn(move |conn| {
      let tx = conn.transaction()?;
      tx.execute_batch(&batch)?;
      tx.commit()?;
      Ok(())
    })
    .await?;

  let fact_rows = store.row_count(FACT_TABLE).await?;
  tracing::info!(
    "compiled features into {FACT_TABLE} ({fact_rows} rows): {} added {added:?}, {} refreshed",
    added.len(),
    refreshed.len()
  );

  Ok(FeatureOutcome { added, refreshed, skipped_missing, fact_rows })
}

/// The full rebuild-and-swap statement batch, executed in one transaction.
fn rebuild_batch(
  existing: &[(String, String)],
  refresh_exprs: &[(String, String)],
  feature_items: &[SelectItem],
) -> String {
  // Column declarations carry over from the current fact table; the id
  // column keeps its generated-key role.
  let decls: Vec<String> = existing
    .iter()
    .map(|(name, decl_ty)| {
      if name == "id" {
        "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()
      } else if decl_ty.is_empty() {
        quote_ident(name)
      } else {
        format!("{} {decl_ty}", quote_ident(name))
      }
    })
    .chain(feature_items.iter().map(|item| {
      format!("{} INTEGER", quote_ident(&item.alias))
    }))
    .collect();

  // Carried columns copy through unchanged, except features being
  // refreshed: those keep stored values and fill NULLs from the formula.
  let select_list: Vec<String> = existing
    .iter()
    .map(|(name, _)| {
      match refresh_exprs.iter().find(|(feature, _)| feature == name) {
        Some((_, expr)) => {
          format!("COALESCE({col}, {expr})", col = quote_ident(name))
        },
        None => quote_ident(name),
      }
    })
    .chain(feature_items.iter().map(SelectItem::render))
    .collect();
  let insert_list: Vec<String> = existing
    .iter()
    .map(|(name, _)| quote_ident(name))
    .chain(feature_items.iter().map(|item| quote_ident(&item.alias)))
    .collect();

  format!(
    "CREATE TABLE {rebuild} (
       {decls}
     );
     INSERT INTO {rebuild} ({insert_list})
       SELECT {select_list} FROM {fact};
     ALTER TABLE {fact} RENAME TO {backup};
     ALTER TABLE {rebuild} RENAME TO {fact};
     DROP TABLE {backup};
     CREATE UNIQUE INDEX {index} ON {fact} ({key}) WHERE {predicate};",
    rebuild = quote_ident(REBUILD_TABLE),
    backup = quote_ident(BACKUP_TABLE),
    fact = quote_ident(FACT_TABLE),
    decls = decls.join(",\n       "),
    insert_list = insert_list.join(", "),
    select_list = select_list.join(", "),
    index = quote_ident(NATURAL_KEY_INDEX),
    key = key_column_list(),
    predicate = all_key_fields_present().render(),
  )
}
