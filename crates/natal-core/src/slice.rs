//! Aggregation slices: time granularity × geography.
//!
//! Aggregate tables are named `agg_<geography>_<granularity>`; the
//! reporting layer addresses them purely by that convention.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, expr::Expr};

// ─── Granularity ─────────────────────────────────────────────────────────────

/// Time-bucket granularity of an aggregate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
  Daily,
  Monthly,
  Yearly,
}

impl Granularity {
  pub const ALL: [Granularity; 3] =
    [Granularity::Daily, Granularity::Monthly, Granularity::Yearly];

  pub fn as_str(self) -> &'static str {
    match self {
      Granularity::Daily => "daily",
      Granularity::Monthly => "monthly",
      Granularity::Yearly => "yearly",
    }
  }

  /// Bucket expression over an ISO `yyyy-mm-dd` date column.
  pub fn bucket_expr(self, date_col: &str) -> Expr {
    let col = Expr::col(date_col);
    match self {
      Granularity::Daily => col,
      Granularity::Monthly => col.substr(1, 7),
      Granularity::Yearly => col.substr(1, 4),
    }
  }
}

impl FromStr for Granularity {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Error> {
    match s {
      "daily" => Ok(Granularity::Daily),
      "monthly" => Ok(Granularity::Monthly),
      "yearly" => Ok(Granularity::Yearly),
      other => Err(Error::UnknownGranularity(other.to_string())),
    }
  }
}

// ─── Geography ───────────────────────────────────────────────────────────────

/// Geographic or facility key of an aggregate table.
///
/// The 6-digit municipality-of-occurrence code nests by prefix: first digit
/// is the region, first two digits the state. Establishments key on their
/// own 7-digit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Geography {
  Region,
  State,
  Municipality,
  Establishment,
}

impl Geography {
  pub const ALL: [Geography; 4] = [
    Geography::Region,
    Geography::State,
    Geography::Municipality,
    Geography::Establishment,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Geography::Region => "region",
      Geography::State => "state",
      Geography::Municipality => "municipality",
      Geography::Establishment => "establishment",
    }
  }

  /// Grouping-key expression over fact columns.
  pub fn key_expr(self) -> Expr {
    match self {
      Geography::Region => Expr::col("CODMUNNASC").substr(1, 1),
      Geography::State => Expr::col("CODMUNNASC").substr(1, 2),
      Geography::Municipality => Expr::col("CODMUNNASC"),
      Geography::Establishment => Expr::col("CODESTAB"),
    }
  }

  /// Dimension table holding labels for this key.
  pub fn dim_table(self) -> &'static str {
    match self {
      Geography::Region => "dim_region",
      Geography::State => "dim_state",
      Geography::Municipality => "dim_municipality",
      Geography::Establishment => "dim_establishment",
    }
  }

  /// Whether the label dimension is loaded from an external source rather
  /// than built by the Dimension Builder. Aggregates over these fail loudly
  /// when the dim is absent.
  pub fn dim_is_external(self) -> bool {
    matches!(self, Geography::Municipality | Geography::Establishment)
  }

  pub fn code_alias(self) -> String {
    format!("{}_code", self.as_str())
  }

  pub fn label_alias(self) -> String {
    format!("{}_label", self.as_str())
  }
}

impl FromStr for Geography {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Error> {
    match s {
      "region" => Ok(Geography::Region),
      "state" => Ok(Geography::State),
      "municipality" => Ok(Geography::Municipality),
      "establishment" => Ok(Geography::Establishment),
      other => Err(Error::UnknownGeography(other.to_string())),
    }
  }
}

/// Table-name convention consumed by the reporting layer.
pub fn aggregate_table_name(geo: Geography, gran: Granularity) -> String {
  format!("agg_{}_{}", geo.as_str(), gran.as_str())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bucket_exprs_slice_iso_dates() {
    assert_eq!(Granularity::Daily.bucket_expr("DTNASC").render(), "\"DTNASC\"");
    assert_eq!(
      Granularity::Monthly.bucket_expr("DTNASC").render(),
      "SUBSTR(\"DTNASC\", 1, 7)"
    );
    assert_eq!(
      Granularity::Yearly.bucket_expr("DTNASC").render(),
      "SUBSTR(\"DTNASC\", 1, 4)"
    );
  }

  #[test]
  fn geography_keys_use_code_prefixes() {
    assert_eq!(
      Geography::Region.key_expr().render(),
      "SUBSTR(\"CODMUNNASC\", 1, 1)"
    );
    assert_eq!(
      Geography::State.key_expr().render(),
      "SUBSTR(\"CODMUNNASC\", 1, 2)"
    );
    assert_eq!(Geography::Municipality.key_expr().render(), "\"CODMUNNASC\"");
    assert_eq!(Geography::Establishment.key_expr().render(), "\"CODESTAB\"");
  }

  #[test]
  fn table_names_follow_convention() {
    assert_eq!(
      aggregate_table_name(Geography::State, Granularity::Monthly),
      "agg_state_monthly"
    );
  }

  #[test]
  fn parse_round_trips() {
    for g in Granularity::ALL {
      assert_eq!(g.as_str().parse::<Granularity>().unwrap(), g);
    }
    for g in Geography::ALL {
      assert_eq!(g.as_str().parse::<Geography>().unwrap(), g);
    }
    assert!("weekly".parse::<Granularity>().is_err());
  }
}
