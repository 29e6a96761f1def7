//! Integration tests for the pipeline stages against in-memory stores.

use natal_core::{
  catalog::{birth_schema, feature_catalog},
  expr::{Agg, Expr},
  features::{Feature, FeatureCatalog},
  schema::{EncodingKind, SchemaCatalog},
};
use natal_store::Store;
use rusqlite::types::Value;

use crate::{
  Error, aggregate, assemble, dims, features, normalize, promote,
  run::{RunOptions, Stage, StageStatus, run_pipeline},
};

async fn store() -> Store {
  Store::open_in_memory().await.expect("in-memory store")
}

fn schema() -> SchemaCatalog {
  birth_schema().expect("static schema")
}

// Raw fixture column order.
const RAW_COLS: [&str; 13] = [
  "CODMUNNASC",
  "DTNASC",
  "HORANASC",
  "IDADEMAE",
  "PESO",
  "SEXO",
  "DTRECEBIM",
  "PARTO",
  "SEMAGESTAC",
  "CONSULTAS",
  "GRAVIDEZ",
  "APGAR5",
  "IDANOMAL",
];

async fn create_raw(store: &Store, table: &str, rows: &[[&str; 13]]) {
  let decls: Vec<String> =
    RAW_COLS.iter().map(|c| format!("\"{c}\" TEXT")).collect();
  let mut sql = format!("CREATE TABLE {table} ({});\n", decls.join(", "));
  for row in rows {
    let values: Vec<String> = row.iter().map(|v| format!("'{v}'")).collect();
    sql.push_str(&format!(
      "INSERT INTO {table} VALUES ({});\n",
      values.join(", ")
    ));
  }
  store.execute_batch(sql).await.unwrap();
}

/// A well-formed raw row; callers override the fields a test cares about.
fn base_row() -> [&'static str; 13] {
  [
    "355030",   // CODMUNNASC — São Paulo
    "15012020", // DTNASC
    "1230",     // HORANASC
    "25",       // IDADEMAE
    "3100",     // PESO
    "1",        // SEXO
    "20012020", // DTRECEBIM
    "1",        // PARTO
    "39",       // SEMAGESTAC
    "4",        // CONSULTAS
    "1",        // GRAVIDEZ
    "9",        // APGAR5
    "2",        // IDANOMAL — 1/2/9 encoding, "no"
  ]
}

async fn first_row(store: &Store, sql: &str) -> Vec<Value> {
  let (_, rows) = store.query_rows(sql).await.unwrap();
  rows.into_iter().next().expect("at least one row")
}

// ─── Type Normalizer ─────────────────────────────────────────────────────────

#[tokio::test]
async fn normalize_coerces_declared_columns() {
  let s = store().await;
  let mut bad = base_row();
  bad[1] = "31022020"; // impossible date
  bad[3] = "99"; // age sentinel
  bad[4] = "9999"; // weight sentinel
  bad[5] = ""; // sex unknown
  bad[12] = "9"; // anomaly unknown
  create_raw(&s, "raw_births_2020", &[base_row(), bad]).await;

  let outcome = normalize::normalize_year(&s, &schema(), 2020).await.unwrap();
  assert_eq!(outcome.table, "norm_births_2020");
  assert_eq!(outcome.rows, 2);
  assert!(outcome.converted.iter().any(|c| c == "DTNASC"));
  assert!(outcome.passthrough.is_empty());

  let good = first_row(
    &s,
    "SELECT DTNASC, IDADEMAE, PESO, SEXO, IDANOMAL FROM norm_births_2020
     WHERE IDADEMAE IS NOT NULL",
  )
  .await;
  assert_eq!(good[0], Value::Text("2020-01-15".into()));
  assert_eq!(good[1], Value::Integer(25));
  assert_eq!(good[2], Value::Integer(3100));
  assert_eq!(good[3], Value::Text("1".into()));
  assert_eq!(good[4], Value::Integer(0)); // "2" -> false

  let coerced = first_row(
    &s,
    "SELECT DTNASC, IDADEMAE, PESO, SEXO, IDANOMAL FROM norm_births_2020
     WHERE IDADEMAE IS NULL",
  )
  .await;
  assert_eq!(coerced[0], Value::Null); // malformed date
  assert_eq!(coerced[1], Value::Null); // sentinel 99
  assert_eq!(coerced[2], Value::Null); // sentinel 9999
  assert_eq!(coerced[3], Value::Text("9".into())); // empty -> default
  assert_eq!(coerced[4], Value::Null); // 9 -> unknown
}

#[tokio::test]
async fn normalize_strips_leading_zeros_from_categoricals() {
  let s = store().await;
  let mut row = base_row();
  row[5] = "05";
  create_raw(&s, "raw_births_2020", &[row]).await;

  normalize::normalize_year(&s, &schema(), 2020).await.unwrap();
  let got = first_row(&s, "SELECT SEXO FROM norm_births_2020").await;
  assert_eq!(got[0], Value::Text("5".into()));
}

#[tokio::test]
async fn normalize_passes_undeclared_columns_through() {
  let s = store().await;
  s.execute_batch(
    "CREATE TABLE raw_births_2020 (
       CODMUNNASC TEXT, DTNASC TEXT, HORANASC TEXT, IDADEMAE TEXT,
       PESO TEXT, SEXO TEXT, CONTADOR TEXT
     );
     INSERT INTO raw_births_2020
       VALUES ('355030', '15012020', '1230', '25', '3100', '1', '000123');",
  )
  .await
  .unwrap();

  let outcome = normalize::normalize_year(&s, &schema(), 2020).await.unwrap();
  assert_eq!(outcome.passthrough, ["CONTADOR"]);

  let got = first_row(&s, "SELECT CONTADOR FROM norm_births_2020").await;
  assert_eq!(got[0], Value::Text("000123".into())); // untouched
}

#[tokio::test]
async fn normalize_missing_raw_table_is_fatal() {
  let s = store().await;
  let err = normalize::normalize_year(&s, &schema(), 1999).await.unwrap_err();
  assert!(matches!(err, Error::MissingTable(t) if t == "raw_births_1999"));
}

#[tokio::test]
async fn normalize_replaces_previous_output() {
  let s = store().await;
  create_raw(&s, "raw_births_2020", &[base_row()]).await;
  normalize::normalize_year(&s, &schema(), 2020).await.unwrap();

  s.execute_batch("DELETE FROM raw_births_2020").await.unwrap();
  let outcome = normalize::normalize_year(&s, &schema(), 2020).await.unwrap();
  assert_eq!(outcome.rows, 0);
}

// ─── Boolean-encoding detection ──────────────────────────────────────────────

#[tokio::test]
async fn detects_one_two_nine_when_two_present() {
  let s = store().await;
  s.execute_batch(
    "CREATE TABLE t (b TEXT);
     INSERT INTO t VALUES ('1'), ('2'), ('9');",
  )
  .await
  .unwrap();
  let kind = normalize::detect_boolean_encoding(&s, "t", "b").await.unwrap();
  assert_eq!(kind, EncodingKind::OneTwoNine);
}

#[tokio::test]
async fn detects_one_zero_without_two() {
  let s = store().await;
  s.execute_batch(
    "CREATE TABLE t (b TEXT);
     INSERT INTO t VALUES ('1'), ('0'), ('1');",
  )
  .await
  .unwrap();
  let kind = normalize::detect_boolean_encoding(&s, "t", "b").await.unwrap();
  assert_eq!(kind, EncodingKind::OneZero);
}

#[tokio::test]
async fn detects_text_tokens() {
  let s = store().await;
  s.execute_batch(
    "CREATE TABLE t (b TEXT);
     INSERT INTO t VALUES ('S'), ('n'), ('');",
  )
  .await
  .unwrap();
  let kind = normalize::detect_boolean_encoding(&s, "t", "b").await.unwrap();
  assert_eq!(kind, EncodingKind::TextTokens);
}

// ─── Fact Assembler ──────────────────────────────────────────────────────────

async fn normalize_years(s: &Store, years: &[u16]) -> Vec<String> {
  let schema = schema();
  let mut sources = Vec::new();
  for year in years {
    normalize::normalize_year(s, &schema, *year).await.unwrap();
    sources.push(normalize::norm_table_name(*year));
  }
  sources
}

#[tokio::test]
async fn assemble_dedups_on_natural_key_keeping_earliest() {
  let s = store().await;

  // Same natural key in both periods, different receipt dates.
  let mut early = base_row();
  early[6] = "05022020";
  let mut late = base_row();
  late[6] = "20022020";
  // And one genuinely distinct row.
  let mut other = base_row();
  other[1] = "16012020";
  other[6] = "20022020";

  create_raw(&s, "raw_births_2019", &[early, other]).await;
  create_raw(&s, "raw_births_2020", &[late]).await;
  let sources = normalize_years(&s, &[2019, 2020]).await;

  let outcome = assemble::assemble(&s, &schema(), &sources).await.unwrap();
  assert!(outcome.created);
  // 3 input rows, one duplicate pair -> N-1.
  assert_eq!(outcome.fact_rows, 2);

  // The earliest-receipt row survived.
  let got = first_row(
    &s,
    "SELECT DTRECEBIM FROM fact_births WHERE DTNASC = '2020-01-15'",
  )
  .await;
  assert_eq!(got[0], Value::Text("2020-02-05".into()));
}

#[tokio::test]
async fn assemble_twice_is_idempotent() {
  let s = store().await;
  let mut second = base_row();
  second[1] = "16012020";
  create_raw(&s, "raw_births_2020", &[base_row(), second]).await;
  let sources = normalize_years(&s, &[2020]).await;

  let first = assemble::assemble(&s, &schema(), &sources).await.unwrap();
  assert_eq!(first.fact_rows, 2);
  assert_eq!(first.inserted, 2);

  let rerun = assemble::assemble(&s, &schema(), &sources).await.unwrap();
  assert!(!rerun.created);
  assert_eq!(rerun.inserted, 0);
  assert_eq!(rerun.fact_rows, 2);
}

#[tokio::test]
async fn assemble_appends_new_periods_only() {
  let s = store().await;
  create_raw(&s, "raw_births_2019", &[base_row()]).await;
  let sources_2019 = normalize_years(&s, &[2019]).await;
  assemble::assemble(&s, &schema(), &sources_2019).await.unwrap();

  let mut new_row = base_row();
  new_row[1] = "10052020";
  create_raw(&s, "raw_births_2020", &[base_row(), new_row]).await;
  let sources_all = normalize_years(&s, &[2019, 2020]).await;

  let outcome = assemble::assemble(&s, &schema(), &sources_all).await.unwrap();
  assert!(!outcome.created);
  assert_eq!(outcome.inserted, 1); // only the genuinely new event
  assert_eq!(outcome.fact_rows, 2);
}

#[tokio::test]
async fn assemble_rerun_keeps_null_key_rows_single() {
  let s = store().await;
  let mut unknown_weight = base_row();
  unknown_weight[4] = "9999"; // weight sentinel -> NULL key field
  create_raw(&s, "raw_births_2020", &[unknown_weight]).await;
  let sources = normalize_years(&s, &[2020]).await;

  let first = assemble::assemble(&s, &schema(), &sources).await.unwrap();
  assert_eq!(first.fact_rows, 1);

  // Rows with a NULL key field sit outside the partial uniqueness index;
  // the append guard must still recognise them on a re-run.
  let rerun = assemble::assemble(&s, &schema(), &sources).await.unwrap();
  assert_eq!(rerun.inserted, 0);
  assert_eq!(rerun.fact_rows, 1);
}

#[tokio::test]
async fn assemble_requires_identical_column_sets() {
  let s = store().await;
  create_raw(&s, "raw_births_2019", &[base_row()]).await;
  normalize_years(&s, &[2019]).await;
  s.execute_batch(
    "CREATE TABLE norm_births_2020 (CODMUNNASC TEXT, DTNASC TEXT)",
  )
  .await
  .unwrap();

  let err = assemble::assemble(
    &s,
    &schema(),
    &["norm_births_2019".into(), "norm_births_2020".into()],
  )
  .await
  .unwrap_err();
  assert!(matches!(err, Error::ColumnMismatch { .. }));
}

#[tokio::test]
async fn assemble_without_sources_errors() {
  let s = store().await;
  let err = assemble::assemble(&s, &schema(), &[]).await.unwrap_err();
  assert!(matches!(err, Error::NoSources));
}

// ─── Feature Compiler ────────────────────────────────────────────────────────

async fn assembled_store() -> Store {
  let s = store().await;
  let mut null_weight = base_row();
  null_weight[1] = "16012020";
  null_weight[4] = "9999"; // weight unknown
  let mut cesarean = base_row();
  cesarean[1] = "17012020";
  cesarean[7] = "2";
  cesarean[4] = "2200";
  create_raw(&s, "raw_births_2020", &[base_row(), null_weight, cesarean]).await;
  let sources = normalize_years(&s, &[2020]).await;
  assemble::assemble(&s, &schema(), &sources).await.unwrap();
  s
}

#[tokio::test]
async fn features_present_iff_sources_present() {
  let s = assembled_store().await;
  let catalog = feature_catalog();

  let outcome = features::compile_features(&s, &catalog).await.unwrap();
  assert_eq!(outcome.fact_rows, 3);

  // The fixture carries every source column, so the whole catalog compiles.
  assert_eq!(outcome.added.len(), feature_catalog().len());
  assert!(outcome.skipped_missing.is_empty());
  let columns = s.table_columns("fact_births").await.unwrap();
  for name in &outcome.added {
    assert!(columns.contains(name));
  }
  assert!(outcome.added.iter().any(|n| n == "low_birth_weight"));
  assert!(outcome.added.iter().any(|n| n == "cesarean"));
}

#[tokio::test]
async fn feature_values_follow_formulas_with_null_sources() {
  let s = assembled_store().await;
  features::compile_features(&s, &feature_catalog()).await.unwrap();

  let (_, rows) = s
    .query_rows(
      "SELECT PESO, low_birth_weight, cesarean FROM fact_births ORDER BY DTNASC",
    )
    .await
    .unwrap();
  assert_eq!(rows.len(), 3);
  // 3100 g: not low weight, vaginal.
  assert_eq!(rows[0][1], Value::Integer(0));
  assert_eq!(rows[0][2], Value::Integer(0));
  // Unknown weight: feature is NULL, not false.
  assert_eq!(rows[1][0], Value::Null);
  assert_eq!(rows[1][1], Value::Null);
  // 2200 g cesarean.
  assert_eq!(rows[2][1], Value::Integer(1));
  assert_eq!(rows[2][2], Value::Integer(1));
}

#[tokio::test]
async fn features_rerun_refreshes_instead_of_re_adding() {
  let s = assembled_store().await;
  let catalog = feature_catalog();

  let first = features::compile_features(&s, &catalog).await.unwrap();
  let rerun = features::compile_features(&s, &catalog).await.unwrap();

  assert!(rerun.added.is_empty());
  assert_eq!(rerun.refreshed.len(), first.added.len());
  assert_eq!(rerun.fact_rows, first.fact_rows);

  // Stored values carry through the refresh.
  let got = first_row(
    &s,
    "SELECT cesarean FROM fact_births WHERE DTNASC = '2020-01-17'",
  )
  .await;
  assert_eq!(got[0], Value::Integer(1));
}

#[tokio::test]
async fn features_backfill_rows_appended_after_compile() {
  let s = assembled_store().await;
  let catalog = feature_catalog();
  features::compile_features(&s, &catalog).await.unwrap();

  // A later period lands after the first compile; its rows join the fact
  // table with NULL in every feature column.
  let mut cesarean = base_row();
  cesarean[1] = "10052021";
  cesarean[7] = "2";
  let mut unknown_weight = base_row();
  unknown_weight[1] = "11052021";
  unknown_weight[4] = "9999";
  create_raw(&s, "raw_births_2021", &[cesarean, unknown_weight]).await;
  let sources = normalize_years(&s, &[2020, 2021]).await;
  assemble::assemble(&s, &schema(), &sources).await.unwrap();

  let outcome = features::compile_features(&s, &catalog).await.unwrap();
  assert!(outcome.added.is_empty());
  assert_eq!(outcome.refreshed.len(), feature_catalog().len());

  // The appended row's features are computed, not left NULL.
  let got = first_row(
    &s,
    "SELECT cesarean, low_birth_weight FROM fact_births
     WHERE DTNASC = '2021-05-10'",
  )
  .await;
  assert_eq!(got[0], Value::Integer(1));
  assert_eq!(got[1], Value::Integer(0));

  // Unknown sources still yield NULL, never a backfilled zero.
  let unknown = first_row(
    &s,
    "SELECT low_birth_weight FROM fact_births WHERE DTNASC = '2021-05-11'",
  )
  .await;
  assert_eq!(unknown[0], Value::Null);
}

#[tokio::test]
async fn features_on_missing_fact_table_abort_before_writes() {
  let s = store().await;
  let err = features::compile_features(&s, &feature_catalog())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::MissingTable(t) if t == "fact_births"));
}

#[tokio::test]
async fn interrupted_rebuild_leaves_fact_table_untouched() {
  let s = assembled_store().await;
  let before_columns = s.table_columns("fact_births").await.unwrap();
  let before_rows = s.row_count("fact_births").await.unwrap();

  // Occupy the sibling name so the rebuild's CREATE TABLE fails mid-swap.
  s.execute_batch("CREATE TABLE fact_births_rebuild (x INTEGER)")
    .await
    .unwrap();

  let result = features::compile_features(&s, &feature_catalog()).await;
  assert!(result.is_err());

  // The transaction rolled back: same columns, same rows, no backup left.
  assert_eq!(s.table_columns("fact_births").await.unwrap(), before_columns);
  assert_eq!(s.row_count("fact_births").await.unwrap(), before_rows);
  assert!(!s.table_exists("fact_births_backup").await.unwrap());
}

#[tokio::test]
async fn feature_with_missing_source_is_skipped_not_defaulted() {
  let s = assembled_store().await;
  let catalog = FeatureCatalog::new(vec![Feature::new(
    "from_nowhere",
    &["NO_SUCH_COLUMN"],
    Expr::col("NO_SUCH_COLUMN").eq(Expr::int(1)),
  )]);

  let outcome = features::compile_features(&s, &catalog).await.unwrap();
  assert_eq!(outcome.skipped_missing, ["from_nowhere"]);
  assert!(outcome.added.is_empty());
  let columns = s.table_columns("fact_births").await.unwrap();
  assert!(!columns.iter().any(|c| c == "from_nowhere"));
}

// ─── Dimension Builder ───────────────────────────────────────────────────────

#[tokio::test]
async fn dimensions_rebuild_deterministically() {
  let s = store().await;
  dims::build_dimensions(&s).await.unwrap();
  let (_, first) = s
    .query_rows("SELECT code, abbr, label FROM dim_state ORDER BY code")
    .await
    .unwrap();

  dims::build_dimensions(&s).await.unwrap();
  let (_, second) = s
    .query_rows("SELECT code, abbr, label FROM dim_state ORDER BY code")
    .await
    .unwrap();

  assert_eq!(first, second);
  assert_eq!(first.len(), 27);
}

#[tokio::test]
async fn binned_dimensions_carry_ranges() {
  let s = store().await;
  dims::build_dimensions(&s).await.unwrap();

  let (_, rows) = s
    .query_rows(
      "SELECT min_value, max_value, label FROM dim_weight_bracket
       ORDER BY min_value",
    )
    .await
    .unwrap();
  assert_eq!(rows[0][0], Value::Integer(0));
  assert_eq!(rows[0][1], Value::Integer(1499));
  assert_eq!(rows[0][2], Value::Text("Menos de 1500 g".into()));
}

// ─── Aggregation Engine ──────────────────────────────────────────────────────

async fn seed_fact_for_aggregation(s: &Store) {
  // 10 births in São Paulo (35) in 2020-01: 3 cesarean, 7 vaginal.
  let mut sql = String::from(
    "CREATE TABLE fact_births (
       id INTEGER PRIMARY KEY AUTOINCREMENT,
       \"CODMUNNASC\" TEXT, \"CODESTAB\" TEXT, \"DTNASC\" TEXT,
       \"IDADEMAE\" INTEGER, \"PESO\" INTEGER, \"APGAR5\" INTEGER,
       \"cesarean\" INTEGER
     );\n",
  );
  for i in 0..10 {
    let cesarean = if i < 3 { 1 } else { 0 };
    sql.push_str(&format!(
      "INSERT INTO fact_births
         (CODMUNNASC, CODESTAB, DTNASC, IDADEMAE, PESO, APGAR5, cesarean)
       VALUES ('355030', '2077485', '2020-01-{:02}', 25, 3000, 9, {cesarean});\n",
      i + 1
    ));
  }
  s.execute_batch(sql).await.unwrap();
  dims::build_dimensions(s).await.unwrap();
  s.execute_batch(
    "CREATE TABLE dim_municipality (code TEXT PRIMARY KEY, label TEXT, geometry BLOB);
     INSERT INTO dim_municipality (code, label) VALUES ('355030', 'São Paulo');
     CREATE TABLE dim_establishment (code TEXT PRIMARY KEY, label TEXT);
     INSERT INTO dim_establishment VALUES ('2077485', 'Hospital Central');",
  )
  .await
  .unwrap();
}

#[tokio::test]
async fn aggregates_emit_count_percentage_pairs() {
  let s = store().await;
  seed_fact_for_aggregation(&s).await;

  let outcome =
    aggregate::build_aggregates(&s, &feature_catalog()).await.unwrap();
  assert_eq!(outcome.tables.len(), 12); // 4 geographies x 3 granularities

  let row = first_row(
    &s,
    "SELECT time_bucket, state_code, state_abbr, total_births,
            cesarean_count, cesarean_pct, peso_mean
     FROM agg_state_monthly",
  )
  .await;
  assert_eq!(row[0], Value::Text("2020-01".into()));
  assert_eq!(row[1], Value::Text("35".into()));
  assert_eq!(row[2], Value::Text("SP".into()));
  assert_eq!(row[3], Value::Integer(10));
  assert_eq!(row[4], Value::Integer(3));
  assert_eq!(row[5], Value::Real(30.0));
  assert_eq!(row[6], Value::Real(3000.0));
}

#[tokio::test]
async fn aggregates_resolve_geography_by_prefix() {
  let s = store().await;
  seed_fact_for_aggregation(&s).await;
  aggregate::build_aggregates(&s, &feature_catalog()).await.unwrap();

  let region = first_row(
    &s,
    "SELECT region_code, region_label, total_births FROM agg_region_yearly",
  )
  .await;
  assert_eq!(region[0], Value::Text("3".into()));
  assert_eq!(region[1], Value::Text("Sudeste".into()));
  assert_eq!(region[2], Value::Integer(10));

  let muni = first_row(
    &s,
    "SELECT municipality_code, municipality_label, total_births
     FROM agg_municipality_monthly",
  )
  .await;
  assert_eq!(muni[0], Value::Text("355030".into()));
  assert_eq!(muni[1], Value::Text("São Paulo".into()));

  let estab = first_row(
    &s,
    "SELECT establishment_code, establishment_label FROM agg_establishment_daily",
  )
  .await;
  assert_eq!(estab[0], Value::Text("2077485".into()));
  assert_eq!(estab[1], Value::Text("Hospital Central".into()));
}

#[tokio::test]
async fn aggregates_are_fully_recomputed_each_run() {
  let s = store().await;
  seed_fact_for_aggregation(&s).await;
  aggregate::build_aggregates(&s, &feature_catalog()).await.unwrap();

  // Shrink the fact table; the aggregate must follow it, not accrete.
  s.execute_batch("DELETE FROM fact_births WHERE cesarean = 0")
    .await
    .unwrap();
  aggregate::build_aggregates(&s, &feature_catalog()).await.unwrap();

  let row = first_row(
    &s,
    "SELECT total_births, cesarean_pct FROM agg_state_monthly",
  )
  .await;
  assert_eq!(row[0], Value::Integer(3));
  assert_eq!(row[1], Value::Real(100.0));
}

#[tokio::test]
async fn missing_external_dims_fail_loudly_without_blocking_siblings() {
  let s = store().await;
  seed_fact_for_aggregation(&s).await;
  s.execute_batch(
    "DROP TABLE dim_municipality; DROP TABLE dim_establishment;",
  )
  .await
  .unwrap();

  let err =
    aggregate::build_aggregates(&s, &feature_catalog()).await.unwrap_err();
  match err {
    Error::Aggregation(failures) => {
      assert_eq!(failures.len(), 6); // 2 geographies x 3 granularities
      assert!(failures.iter().all(|(t, _)| {
        t.starts_with("agg_municipality_") || t.starts_with("agg_establishment_")
      }));
    }
    other => panic!("expected aggregation error, got {other}"),
  }

  // Siblings were still built.
  assert!(s.table_exists("agg_state_monthly").await.unwrap());
  assert!(s.table_exists("agg_region_daily").await.unwrap());
}

#[tokio::test]
async fn aggregate_on_missing_fact_table_is_fatal() {
  let s = store().await;
  let err =
    aggregate::build_aggregates(&s, &feature_catalog()).await.unwrap_err();
  assert!(matches!(err, Error::MissingTable(t) if t == "fact_births"));
}

#[tokio::test]
async fn percentage_is_null_over_zero_denominator() {
  let s = store().await;
  s.execute_batch("CREATE TABLE empty_bucket (flag INTEGER)")
    .await
    .unwrap();

  let pct = Agg::PctWhere(Expr::col("flag").eq(Expr::int(1))).render();
  let (_, rows) = s
    .query_rows(format!("SELECT {pct} FROM empty_bucket"))
    .await
    .unwrap();
  assert_eq!(rows[0][0], Value::Null); // never zero, never a divide error
}

// ─── Promotion Sync ──────────────────────────────────────────────────────────

#[tokio::test]
async fn promotion_copies_dims_and_aggregates_only() {
  let s = store().await;
  seed_fact_for_aggregation(&s).await;
  aggregate::build_aggregates(&s, &feature_catalog()).await.unwrap();

  let serving = store().await;
  let outcome = promote::promote_all(&s, &serving, 2).await.unwrap();
  assert!(!outcome.tables.is_empty());

  assert!(serving.table_exists("dim_state").await.unwrap());
  assert!(serving.table_exists("agg_state_monthly").await.unwrap());
  assert!(!serving.table_exists("fact_births").await.unwrap());

  // Content survives the chunked copy.
  assert_eq!(
    serving.row_count("dim_state").await.unwrap(),
    s.row_count("dim_state").await.unwrap()
  );
}

#[tokio::test]
async fn promoting_the_fact_table_is_denied() {
  let s = store().await;
  let serving = store().await;
  let err = promote::promote_table(&s, &serving, "fact_births", 100)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PromotionDenied(t) if t == "fact_births"));
}

#[tokio::test]
async fn promotion_replaces_existing_destination_table() {
  let s = store().await;
  dims::build_dimensions(&s).await.unwrap();

  let serving = store().await;
  serving
    .execute_batch(
      "CREATE TABLE dim_region (code TEXT, label TEXT);
       INSERT INTO dim_region VALUES ('x', 'stale');",
    )
    .await
    .unwrap();

  promote::promote_table(&s, &serving, "dim_region", 100).await.unwrap();
  let (_, rows) = serving
    .query_rows("SELECT code FROM dim_region ORDER BY code")
    .await
    .unwrap();
  assert_eq!(rows.len(), 5);
  assert!(!rows.iter().any(|r| r[0] == Value::Text("x".into())));
}

#[tokio::test]
async fn promotion_carries_geometry_blobs_bit_exact() {
  let s = store().await;
  let wkb: Vec<u8> = vec![0x01, 0x06, 0x00, 0x00, 0x00, 0xde, 0xad, 0xbe, 0xef];
  let payload = wkb.clone();
  s.execute_batch(
    "CREATE TABLE dim_municipality (code TEXT PRIMARY KEY, label TEXT, geometry BLOB)",
  )
  .await
  .unwrap();
  s.with_conn(move |conn| {
    conn.execute(
      "INSERT INTO dim_municipality VALUES ('355030', 'São Paulo', ?1)",
      rusqlite::params![payload],
    )?;
    Ok(())
  })
  .await
  .unwrap();

  let serving = store().await;
  promote::promote_table(&s, &serving, "dim_municipality", 100)
    .await
    .unwrap();

  let row = first_row(&serving, "SELECT geometry FROM dim_municipality").await;
  assert_eq!(row[0], Value::Blob(wkb));
}

// ─── Driver ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_pipeline_runs_end_to_end() {
  let s = store().await;
  let mut second = base_row();
  second[1] = "16012020";
  second[7] = "2";
  create_raw(&s, "raw_births_2019", &[base_row()]).await;
  create_raw(&s, "raw_births_2020", &[second]).await;
  // External dims so every aggregate can build.
  s.execute_batch(
    "CREATE TABLE dim_municipality (code TEXT PRIMARY KEY, label TEXT);
     INSERT INTO dim_municipality VALUES ('355030', 'São Paulo');
     CREATE TABLE dim_establishment (code TEXT PRIMARY KEY, label TEXT);",
  )
  .await
  .unwrap();

  let serving = store().await;
  let options = RunOptions { years: vec![2019, 2020], ..Default::default() };
  let report = run_pipeline(&s, Some(&serving), &options).await;

  assert!(report.succeeded(), "report: {report:?}");
  assert_eq!(report.stages.len(), 6);
  assert!(
    report
      .stages
      .iter()
      .all(|st| st.status == StageStatus::Succeeded)
  );

  assert_eq!(s.row_count("fact_births").await.unwrap(), 2);
  assert!(serving.table_exists("agg_state_monthly").await.unwrap());
  assert!(!serving.table_exists("fact_births").await.unwrap());
}

#[tokio::test]
async fn failed_stage_leaves_downstream_unrun() {
  let s = store().await;
  // No raw tables at all: normalize fails immediately.
  let options = RunOptions { years: vec![2020], ..Default::default() };
  let report = run_pipeline(&s, None, &options).await;

  assert!(!report.succeeded());
  assert_eq!(report.stages[0].stage, Stage::Normalize);
  assert_eq!(report.stages[0].status, StageStatus::Failed);
  for stage in &report.stages[1..] {
    assert_eq!(stage.status, StageStatus::Skipped, "{stage:?}");
  }
  assert!(!s.table_exists("fact_births").await.unwrap());
}
