//! The derived-feature catalog for the Feature Compiler.
//!
//! A feature is a named boolean formula over fact-table columns. The
//! compiler appends every computable feature in one rebuild pass; a feature
//! whose source columns are missing is skipped, never null-filled.

use crate::expr::Expr;

/// One derived boolean feature.
#[derive(Debug, Clone)]
pub struct Feature {
  /// Column name in the engineered fact table.
  pub name:      String,
  /// Fact-table columns the formula reads. The feature is computable iff
  /// all of these exist.
  pub sources:   Vec<String>,
  /// Condition evaluating to true for matching rows.
  pub condition: Expr,
}

impl Feature {
  pub fn new(
    name: impl Into<String>,
    sources: &[&str],
    condition: Expr,
  ) -> Self {
    Self {
      name:    name.into(),
      sources: sources.iter().map(|s| (*s).to_string()).collect(),
      condition,
    }
  }

  /// The select-list expression materialising this feature.
  ///
  /// NULL sources must yield a NULL feature. SQL three-valued logic would
  /// otherwise route an unknown comparison into the ELSE branch and record
  /// a hard `false`, so the NULL guard comes first.
  pub fn select_expr(&self) -> Expr {
    let any_source_null = Expr::Any(
      self
        .sources
        .iter()
        .map(|s| Expr::col(s).is_null())
        .collect(),
    );
    Expr::Case {
      whens: vec![
        (any_source_null, Expr::null()),
        (self.condition.clone(), Expr::int(1)),
      ],
      other: Some(Box::new(Expr::int(0))),
    }
  }
}

/// Ordered collection of features; order is the column order in the
/// engineered fact table.
#[derive(Debug, Clone)]
pub struct FeatureCatalog {
  features: Vec<Feature>,
}

impl FeatureCatalog {
  pub fn new(features: Vec<Feature>) -> Self {
    Self { features }
  }

  pub fn iter(&self) -> impl Iterator<Item = &Feature> {
    self.features.iter()
  }

  pub fn get(&self, name: &str) -> Option<&Feature> {
    self.features.iter().find(|f| f.name == name)
  }

  pub fn len(&self) -> usize {
    self.features.len()
  }

  pub fn is_empty(&self) -> bool {
    self.features.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn select_expr_guards_null_sources_first() {
    let f = Feature::new(
      "low_birth_weight",
      &["PESO"],
      Expr::col("PESO").lt(Expr::int(2500)),
    );
    let sql = f.select_expr().render();
    assert_eq!(
      sql,
      "CASE WHEN (\"PESO\" IS NULL) THEN NULL \
       WHEN \"PESO\" < 2500 THEN 1 ELSE 0 END"
    );
  }

  #[test]
  fn multi_source_feature_guards_every_source() {
    let f = Feature::new(
      "term_low_weight",
      &["PESO", "SEMAGESTAC"],
      Expr::All(vec![
        Expr::col("PESO").lt(Expr::int(2500)),
        Expr::col("SEMAGESTAC").ge(Expr::int(37)),
      ]),
    );
    let sql = f.select_expr().render();
    assert!(sql.contains("(\"PESO\" IS NULL) OR (\"SEMAGESTAC\" IS NULL)"));
  }
}
