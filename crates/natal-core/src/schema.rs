//! Declarative column-type schema for the Type Normalizer.
//!
//! The registry ships every column as text, with numeric sentinel codes
//! ("99", "9999", empty string) standing in for unknown values. Each
//! [`ColumnRule`] maps one source column to a target type and a coercion
//! expression; the normalizer renders those expressions into a single
//! `CREATE TABLE .. AS SELECT`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  expr::{Expr, Literal},
};

// ─── Boolean encodings ───────────────────────────────────────────────────────

/// How a boolean column is encoded in the raw data.
///
/// The registry is inconsistent: some columns use 1/0, others 1/2/9
/// (1 = yes, 2 = no, 9 = unknown), and a few use text tokens. Which
/// encoding a column uses is a property of the data, not the schema, so the
/// normalizer probes for the literal `"2"` (and for text tokens) before
/// choosing a cast rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodingKind {
  /// 1 = true, 0 = false.
  OneZero,
  /// 1 = true, 2 = false, 9 = unknown.
  OneTwoNine,
  /// "S"/"SIM" = true, "N"/"NAO"/"NÃO" = false.
  TextTokens,
}

/// True boolean tokens for [`EncodingKind::TextTokens`].
pub const TRUE_TOKENS: &[&str] = &["S", "SIM"];
/// False boolean tokens for [`EncodingKind::TextTokens`].
pub const FALSE_TOKENS: &[&str] = &["N", "NAO", "NÃO"];

// ─── Column rules ────────────────────────────────────────────────────────────

/// Width of a fixed-width signed integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntWidth {
  W8,
  W16,
  W32,
}

impl IntWidth {
  pub fn max(self) -> i64 {
    match self {
      IntWidth::W8 => i8::MAX as i64,
      IntWidth::W16 => i16::MAX as i64,
      IntWidth::W32 => i32::MAX as i64,
    }
  }
}

/// Target type and coercion rule for one source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnType {
  /// Fixed-width signed integer; listed sentinels become NULL.
  Integer {
    width:     IntWidth,
    sentinels: Vec<i64>,
  },
  /// Fixed 8-digit ddmmyyyy string parsed to an ISO date; malformed
  /// strings become NULL.
  Date,
  /// Trimmed, leading zeros stripped, empty/NULL replaced with `default`.
  Categorical { default: String },
  /// Three-valued boolean; encoding detected at run time.
  Boolean,
  /// Trimmed text, empty becomes NULL.
  Text,
}

impl ColumnType {
  /// Declared SQL type used when the fact table is created explicitly.
  pub fn decl_type(&self) -> &'static str {
    match self {
      ColumnType::Integer { .. } | ColumnType::Boolean => "INTEGER",
      ColumnType::Date | ColumnType::Categorical { .. } | ColumnType::Text => "TEXT",
    }
  }
}

/// One column's normalization rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
  pub name: String,
  pub ty:   ColumnType,
}

impl ColumnRule {
  pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
    Self { name: name.into(), ty }
  }

  /// Build the coercion expression for this column.
  ///
  /// `encoding` must be supplied for boolean columns (the normalizer probes
  /// the data first); it is ignored for every other type.
  pub fn cast_expr(&self, encoding: Option<EncodingKind>) -> Result<Expr> {
    let col = Expr::col(&self.name);
    match &self.ty {
      ColumnType::Integer { width, sentinels } => {
        Ok(integer_cast(col, *width, sentinels))
      }
      ColumnType::Date => Ok(date_cast(col)),
      ColumnType::Categorical { default } => Ok(categorical_cast(col, default)),
      ColumnType::Boolean => {
        let kind = encoding
          .ok_or_else(|| Error::BooleanEncodingRequired(self.name.clone()))?;
        Ok(boolean_cast(col, kind))
      }
      ColumnType::Text => Ok(text_cast(col)),
    }
  }
}

/// `expr` contains only digits and is non-empty.
fn all_digits(expr: Expr) -> Expr {
  Expr::All(vec![
    expr.clone().ne(Expr::text("")),
    Expr::Not(Box::new(expr.glob("*[^0-9]*"))),
  ])
}

fn integer_cast(col: Expr, width: IntWidth, sentinels: &[i64]) -> Expr {
  let trimmed = col.trim();
  let cast = trimmed.clone().cast("INTEGER");
  let mut valid = vec![
    all_digits(trimmed),
    cast.clone().le(Expr::int(width.max())),
  ];
  if !sentinels.is_empty() {
    valid.push(Expr::Not(Box::new(
      cast
        .clone()
        .is_in(sentinels.iter().map(|s| Literal::Int(*s)).collect()),
    )));
  }
  Expr::Case {
    whens: vec![(Expr::All(valid), cast)],
    other: Some(Box::new(Expr::null())),
  }
}

fn date_cast(col: Expr) -> Expr {
  let trimmed = col.trim();
  // dd mm yyyy → yyyy-mm-dd. date() silently normalises out-of-range
  // components (2020-02-31 becomes 2020-03-02), so a reassembled string
  // only counts as a real date when date() round-trips it unchanged.
  let iso = Expr::Concat(vec![
    trimmed.clone().substr(5, 4),
    Expr::text("-"),
    trimmed.clone().substr(3, 2),
    Expr::text("-"),
    trimmed.clone().substr(1, 2),
  ]);
  let valid = Expr::All(vec![
    Expr::func("LENGTH", vec![trimmed.clone()]).eq(Expr::int(8)),
    all_digits(trimmed),
    Expr::func("date", vec![iso.clone()]).eq(iso.clone()),
  ]);
  Expr::Case {
    whens: vec![(valid, iso)],
    other: Some(Box::new(Expr::null())),
  }
}

fn categorical_cast(col: Expr, default: &str) -> Expr {
  let trimmed = col.clone().trim();
  let stripped = Expr::func("LTRIM", vec![trimmed.clone(), Expr::text("0")]);
  Expr::Case {
    whens: vec![
      (
        Expr::Any(vec![
          col.is_null(),
          trimmed.eq(Expr::text("")),
        ]),
        Expr::text(default),
      ),
      // All-zero codes strip to nothing; keep a single zero.
      (stripped.clone().eq(Expr::text("")), Expr::text("0")),
    ],
    other: Some(Box::new(stripped)),
  }
}

fn boolean_cast(col: Expr, kind: EncodingKind) -> Expr {
  let trimmed = col.trim();
  let whens = match kind {
    EncodingKind::OneZero => vec![
      (trimmed.clone().eq(Expr::text("1")), Expr::int(1)),
      (trimmed.eq(Expr::text("0")), Expr::int(0)),
    ],
    EncodingKind::OneTwoNine => vec![
      (trimmed.clone().eq(Expr::text("1")), Expr::int(1)),
      (trimmed.eq(Expr::text("2")), Expr::int(0)),
    ],
    EncodingKind::TextTokens => {
      let upper = trimmed.upper();
      vec![
        (
          upper
            .clone()
            .is_in(TRUE_TOKENS.iter().map(|t| Literal::Text((*t).into())).collect()),
          Expr::int(1),
        ),
        (
          upper
            .is_in(FALSE_TOKENS.iter().map(|t| Literal::Text((*t).into())).collect()),
          Expr::int(0),
        ),
      ]
    }
  };
  Expr::Case { whens, other: Some(Box::new(Expr::null())) }
}

fn text_cast(col: Expr) -> Expr {
  Expr::func("NULLIF", vec![col.trim(), Expr::text("")])
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// The declarative column→type map, keyed by column name.
///
/// Invariant: every declared column has exactly one rule; duplicates are
/// rejected at construction.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
  rules: BTreeMap<String, ColumnRule>,
}

impl SchemaCatalog {
  pub fn new(rules: Vec<ColumnRule>) -> Result<Self> {
    let mut map = BTreeMap::new();
    for rule in rules {
      if map.insert(rule.name.clone(), rule.clone()).is_some() {
        return Err(Error::DuplicateColumnRule(rule.name));
      }
    }
    Ok(Self { rules: map })
  }

  pub fn get(&self, column: &str) -> Option<&ColumnRule> {
    self.rules.get(column)
  }

  pub fn iter(&self) -> impl Iterator<Item = &ColumnRule> {
    self.rules.values()
  }

  /// Declared SQL type for a column when the fact table DDL is generated;
  /// undeclared columns fall back to TEXT passthrough.
  pub fn decl_type(&self, column: &str) -> &'static str {
    self
      .rules
      .get(column)
      .map(|r| r.ty.decl_type())
      .unwrap_or("TEXT")
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn int_rule() -> ColumnRule {
    ColumnRule::new(
      "IDADEMAE",
      ColumnType::Integer { width: IntWidth::W8, sentinels: vec![99] },
    )
  }

  #[test]
  fn integer_cast_nulls_sentinels() {
    let sql = int_rule().cast_expr(None).unwrap().render();
    assert!(sql.contains("CAST(TRIM(\"IDADEMAE\") AS INTEGER)"));
    assert!(sql.contains("NOT (CAST(TRIM(\"IDADEMAE\") AS INTEGER) IN (99))"));
    assert!(sql.ends_with("ELSE NULL END"));
  }

  #[test]
  fn integer_cast_bounds_by_width() {
    let sql = int_rule().cast_expr(None).unwrap().render();
    assert!(sql.contains("<= 127"));
  }

  #[test]
  fn date_cast_reorders_ddmmyyyy() {
    let rule = ColumnRule::new("DTNASC", ColumnType::Date);
    let sql = rule.cast_expr(None).unwrap().render();
    assert!(sql.contains("LENGTH(TRIM(\"DTNASC\")) = 8"));
    assert!(sql.contains("SUBSTR(TRIM(\"DTNASC\"), 5, 4)"));
  }

  #[test]
  fn date_cast_requires_round_trip_through_date() {
    // date() normalises 2020-02-31 to 2020-03-02 instead of failing, so
    // the cast must compare the reassembled string against date()'s output
    // and only keep exact matches.
    let rule = ColumnRule::new("DTNASC", ColumnType::Date);
    let sql = rule.cast_expr(None).unwrap().render();
    let iso = "SUBSTR(TRIM(\"DTNASC\"), 5, 4) || '-' || \
               SUBSTR(TRIM(\"DTNASC\"), 3, 2) || '-' || \
               SUBSTR(TRIM(\"DTNASC\"), 1, 2)";
    assert!(sql.contains(&format!("date({iso}) = {iso}")), "{sql}");
    assert!(sql.ends_with("ELSE NULL END"));
  }

  #[test]
  fn categorical_cast_defaults_empty_and_strips_zeros() {
    let rule = ColumnRule::new(
      "SEXO",
      ColumnType::Categorical { default: "9".into() },
    );
    let sql = rule.cast_expr(None).unwrap().render();
    assert!(sql.contains("THEN '9'"));
    assert!(sql.contains("LTRIM(TRIM(\"SEXO\"), '0')"));
    assert!(sql.contains("THEN '0'"));
  }

  #[test]
  fn boolean_cast_requires_encoding() {
    let rule = ColumnRule::new("IDANOMAL", ColumnType::Boolean);
    let err = rule.cast_expr(None).unwrap_err();
    assert!(matches!(err, Error::BooleanEncodingRequired(c) if c == "IDANOMAL"));
  }

  #[test]
  fn boolean_one_two_nine_maps_two_to_false() {
    let rule = ColumnRule::new("IDANOMAL", ColumnType::Boolean);
    let sql = rule
      .cast_expr(Some(EncodingKind::OneTwoNine))
      .unwrap()
      .render();
    assert!(sql.contains("WHEN TRIM(\"IDANOMAL\") = '1' THEN 1"));
    assert!(sql.contains("WHEN TRIM(\"IDANOMAL\") = '2' THEN 0"));
    // 9 (and anything else) falls through to NULL.
    assert!(sql.ends_with("ELSE NULL END"));
  }

  #[test]
  fn boolean_one_zero_maps_zero_to_false() {
    let rule = ColumnRule::new("PARIDADE", ColumnType::Boolean);
    let sql = rule.cast_expr(Some(EncodingKind::OneZero)).unwrap().render();
    assert!(sql.contains("WHEN TRIM(\"PARIDADE\") = '0' THEN 0"));
  }

  #[test]
  fn boolean_text_tokens_upper_cases() {
    let rule = ColumnRule::new("ST_DNV", ColumnType::Boolean);
    let sql = rule
      .cast_expr(Some(EncodingKind::TextTokens))
      .unwrap()
      .render();
    assert!(sql.contains("UPPER(TRIM(\"ST_DNV\")) IN ('S', 'SIM')"));
    assert!(sql.contains("IN ('N', 'NAO', 'NÃO')"));
  }

  #[test]
  fn catalog_rejects_duplicate_rules() {
    let err = SchemaCatalog::new(vec![int_rule(), int_rule()]).unwrap_err();
    assert!(matches!(err, Error::DuplicateColumnRule(c) if c == "IDADEMAE"));
  }

  #[test]
  fn decl_type_falls_back_to_text() {
    let cat = SchemaCatalog::new(vec![int_rule()]).unwrap();
    assert_eq!(cat.decl_type("IDADEMAE"), "INTEGER");
    assert_eq!(cat.decl_type("UNDECLARED"), "TEXT");
  }
}
