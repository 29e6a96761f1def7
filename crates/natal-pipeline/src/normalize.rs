//! Type Normalizer — stage one.
//!
//! Takes one raw per-period table (all columns text, sentinel codes for
//! unknown) and produces a normalized sibling where every declared column
//! has been coerced to its target type. Undeclared columns pass through
//! unchanged. A single-column failure is logged and the column passed
//! through untyped; the stage itself still succeeds.

use natal_core::{
  expr::{SelectItem, quote_ident, quote_text},
  schema::{ColumnType, EncodingKind, FALSE_TOKENS, SchemaCatalog, TRUE_TOKENS},
};
use natal_store::Store;

use crate::{Error, Result};

/// Raw table name for a registry year.
pub fn raw_table_name(year: u16) -> String {
  format!("raw_births_{year}")
}

/// Normalized table name for a registry year.
pub fn norm_table_name(year: u16) -> String {
  format!("norm_births_{year}")
}

/// What one normalization run did.
#[derive(Debug)]
pub struct NormalizeOutcome {
  pub table:       String,
  pub rows:        i64,
  /// Columns coerced to their declared type.
  pub converted:   Vec<String>,
  /// Columns copied as-is: undeclared, or declared but failed to coerce.
  pub passthrough: Vec<String>,
}

/// Probe a column's data to decide which boolean encoding it uses.
///
/// The literal `"2"` only occurs in the 1/2/9 encoding, so its presence is
/// decisive. Otherwise text tokens are checked, and 1/0 is the fallback —
/// including for all-NULL columns, where any rule yields only NULLs.
pub async fn detect_boolean_encoding(
  store: &Store,
  table: &str,
  column: &str,
) -> Result<EncodingKind> {
  let t = quote_ident(table);
  let c = quote_ident(column);

  let has_two = store
    .query_bool(format!(
      "SELECT EXISTS(SELECT 1 FROM {t} WHERE TRIM({c}) = '2')"
    ))
    .await?;
  if has_two {
    return Ok(EncodingKind::OneTwoNine);
  }

  let tokens: Vec<String> = TRUE_TOKENS
    .iter()
    .chain(FALSE_TOKENS)
    .map(|tok| quote_text(tok))
    .collect();
  let has_tokens = store
    .query_bool(format!(
      "SELECT EXISTS(SELECT 1 FROM {t} WHERE UPPER(TRIM({c})) IN ({}))",
      tokens.join(", ")
    ))
    .await?;
  if has_tokens {
    return Ok(EncodingKind::TextTokens);
  }

  Ok(EncodingKind::OneZero)
}

/// Normalize `raw_births_<year>` into `norm_births_<year>`.
pub async fn normalize_year(
  store: &Store,
  schema: &SchemaCatalog,
  year: u16,
) -> Result<NormalizeOutcome> {
  normalize_table(store, schema, &raw_table_name(year), &norm_table_name(year)).await
}

/// Normalize one raw table into `dest`, replacing any previous `dest`.
pub async fn normalize_table(
  store: &Store,
  schema: &SchemaCatalog,
  raw: &str,
  dest: &str,
) -> Result<NormalizeOutcome> {
  if !store.table_exists(raw).await? {
    return Err(Error::MissingTable(raw.to_string()));
  }

  let columns = store.table_columns(raw).await?;
  let mut items: Vec<SelectItem> = Vec::with_capacity(columns.len());
  let mut converted = Vec::new();
  let mut passthrough = Vec::new();

  for column in &columns {
    match schema.get(column) {
      None => {
        items.push(SelectItem::new(quote_ident(column), column));
        passthrough.push(column.clone());
      }
      Some(rule) => match cast_item(store, raw, rule, column).await {
        Ok(item) => {
          items.push(item);
          converted.push(column.clone());
        }
        Err(err) => {
          // Per-column coercion failure is non-fatal: log, pass the column
          // through untyped, and keep going.
          tracing::warn!("column {column} of {raw} left unconverted: {err}");
          items.push(SelectItem::new(quote_ident(column), column));
          passthrough.push(column.clone());
        }
      },
    }
  }

  let select_list: Vec<String> = items.iter().map(SelectItem::render).collect();
  let create_sql = format!(
    "DROP TABLE IF EXISTS {dest_q};
     CREATE TABLE {dest_q} AS SELECT {list} FROM {raw_q};",
    dest_q = quote_ident(dest),
    raw_q = quote_ident(raw),
    list = select_list.join(", "),
  );

  store
    .with_conn(move |conn| {
      let tx = conn.transaction()?;
      tx.execute_batch(&create_sql)?;
      tx.commit()?;
      Ok(())
    })
    .await?;
  let rows = store.row_count(dest).await?;

  tracing::info!(
    "normalized {raw} -> {dest}: {rows} rows, {} converted, {} passthrough",
    converted.len(),
    passthrough.len()
  );

  Ok(NormalizeOutcome { table: dest.to_string(), rows, converted, passthrough })
}

async fn cast_item(
  store: &Store,
  raw: &str,
  rule: &natal_core::schema::ColumnRule,
  column: &str,
) -> Result<SelectItem> {
  let encoding = match rule.ty {
    ColumnType::Boolean => {
      Some(detect_boolean_encoding(store, raw, column).await?)
    }
    _ => None,
  };
  let expr = rule.cast_expr(encoding)?;
  Ok(SelectItem::from_expr(&expr, column))
}
