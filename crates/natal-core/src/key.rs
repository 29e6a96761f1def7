//! The fact table's natural key.
//!
//! A fixed ordered column tuple identifying one real-world birth event:
//! municipality of occurrence, birth date, mother's age, birth weight, sex
//! and hour of birth. The Fact Assembler's dedup ranking and the partial
//! uniqueness index use this exact tuple; they must never drift apart.

use crate::expr::{Expr, quote_ident};

/// Ordered natural-key columns.
pub const NATURAL_KEY: [&str; 6] = [
  "CODMUNNASC",
  "DTNASC",
  "IDADEMAE",
  "PESO",
  "SEXO",
  "HORANASC",
];

/// Comma-joined quoted key columns, for PARTITION BY / index DDL.
pub fn key_column_list() -> String {
  NATURAL_KEY
    .iter()
    .map(|c| quote_ident(c))
    .collect::<Vec<_>>()
    .join(", ")
}

/// Predicate for the partial uniqueness index: only rows where every key
/// field is known participate in the constraint, so legitimately-unknown
/// locations are not forced into false conflicts.
pub fn all_key_fields_present() -> Expr {
  Expr::All(
    NATURAL_KEY
      .iter()
      .map(|c| Expr::Not(Box::new(Expr::col(*c).is_null())))
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_column_list_preserves_order() {
    assert_eq!(
      key_column_list(),
      "\"CODMUNNASC\", \"DTNASC\", \"IDADEMAE\", \"PESO\", \"SEXO\", \"HORANASC\""
    );
  }

  #[test]
  fn partial_index_predicate_covers_all_key_fields() {
    let sql = all_key_fields_present().render();
    for col in NATURAL_KEY {
      assert!(sql.contains(&format!("NOT (\"{col}\" IS NULL)")), "{col} missing");
    }
  }
}
