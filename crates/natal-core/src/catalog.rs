//! Static domain catalogs for the birth registry.
//!
//! These are versioned, human-edited artifacts: the column→type map the
//! normalizer runs from, the feature-formula catalog, and the code→label
//! tables the Dimension Builder materialises. None of this is derived from
//! data at run time.

use crate::{
  Result,
  expr::{Expr, Literal},
  features::{Feature, FeatureCatalog},
  schema::{ColumnRule, ColumnType, IntWidth, SchemaCatalog},
};

// ─── Column-type map ─────────────────────────────────────────────────────────

fn int8(name: &str, sentinels: &[i64]) -> ColumnRule {
  ColumnRule::new(
    name,
    ColumnType::Integer { width: IntWidth::W8, sentinels: sentinels.to_vec() },
  )
}

fn int16(name: &str, sentinels: &[i64]) -> ColumnRule {
  ColumnRule::new(
    name,
    ColumnType::Integer { width: IntWidth::W16, sentinels: sentinels.to_vec() },
  )
}

fn cat(name: &str) -> ColumnRule {
  ColumnRule::new(name, ColumnType::Categorical { default: "9".into() })
}

/// The column→type map for raw registry tables.
///
/// TPROBSON (Robson group) carries its own unknown default ("11", not
/// applicable); every other categorical defaults to "9" (ignorado).
pub fn birth_schema() -> Result<SchemaCatalog> {
  SchemaCatalog::new(vec![
    ColumnRule::new("DTNASC", ColumnType::Date),
    ColumnRule::new("DTRECEBIM", ColumnType::Date),
    ColumnRule::new(
      "HORANASC",
      ColumnType::Categorical { default: "9999".into() },
    ),
    int8("IDADEMAE", &[99]),
    int16("PESO", &[9999]),
    int8("SEMAGESTAC", &[99]),
    int8("APGAR1", &[99]),
    int8("APGAR5", &[99]),
    int8("QTDFILVIVO", &[99]),
    int8("QTDFILMORT", &[99]),
    cat("CONSULTAS"),
    cat("GESTACAO"),
    cat("GRAVIDEZ"),
    cat("PARTO"),
    cat("SEXO"),
    cat("RACACOR"),
    cat("ESCMAE"),
    ColumnRule::new(
      "TPROBSON",
      ColumnType::Categorical { default: "11".into() },
    ),
    cat("CODMUNNASC"),
    cat("CODESTAB"),
    ColumnRule::new("STTRABPART", ColumnType::Boolean),
    ColumnRule::new("STCESPARTO", ColumnType::Boolean),
    ColumnRule::new("IDANOMAL", ColumnType::Boolean),
    ColumnRule::new("PARIDADE", ColumnType::Boolean),
  ])
}

// ─── Feature catalog ─────────────────────────────────────────────────────────

/// Boolean feature formulas compiled into the fact table.
pub fn feature_catalog() -> FeatureCatalog {
  FeatureCatalog::new(vec![
    Feature::new(
      "low_birth_weight",
      &["PESO"],
      Expr::col("PESO").lt(Expr::int(2500)),
    ),
    Feature::new(
      "very_low_birth_weight",
      &["PESO"],
      Expr::col("PESO").lt(Expr::int(1500)),
    ),
    Feature::new(
      "premature",
      &["SEMAGESTAC"],
      Expr::col("SEMAGESTAC").lt(Expr::int(37)),
    ),
    Feature::new(
      "extremely_premature",
      &["SEMAGESTAC"],
      Expr::col("SEMAGESTAC").lt(Expr::int(28)),
    ),
    Feature::new(
      "cesarean",
      &["PARTO"],
      Expr::col("PARTO").eq(Expr::text("2")),
    ),
    Feature::new(
      "teen_mother",
      &["IDADEMAE"],
      Expr::col("IDADEMAE").lt(Expr::int(20)),
    ),
    Feature::new(
      "advanced_maternal_age",
      &["IDADEMAE"],
      Expr::col("IDADEMAE").ge(Expr::int(35)),
    ),
    Feature::new(
      "low_apgar5",
      &["APGAR5"],
      Expr::col("APGAR5").lt(Expr::int(7)),
    ),
    Feature::new(
      "adequate_prenatal",
      &["CONSULTAS"],
      Expr::col("CONSULTAS").eq(Expr::text("4")),
    ),
    Feature::new(
      "no_prenatal",
      &["CONSULTAS"],
      Expr::col("CONSULTAS").eq(Expr::text("1")),
    ),
    Feature::new(
      "multiple_pregnancy",
      &["GRAVIDEZ"],
      Expr::col("GRAVIDEZ")
        .is_in(vec![Literal::Text("2".into()), Literal::Text("3".into())]),
    ),
    Feature::new(
      "congenital_anomaly",
      &["IDANOMAL"],
      Expr::col("IDANOMAL").eq(Expr::int(1)),
    ),
  ])
}

/// Numeric fact columns surfaced as per-bucket means, with their aggregate
/// column aliases.
pub const MEAN_FIELDS: &[(&str, &str)] = &[
  ("IDADEMAE", "idademae_mean"),
  ("PESO", "peso_mean"),
  ("APGAR5", "apgar5_mean"),
];

// ─── Dimension catalogs ──────────────────────────────────────────────────────

/// One (code, label) pair of a categorical dimension.
#[derive(Debug, Clone, Copy)]
pub struct CodeLabel {
  pub code:  &'static str,
  pub label: &'static str,
}

const fn cl(code: &'static str, label: &'static str) -> CodeLabel {
  CodeLabel { code, label }
}

/// A categorical dimension table, fully rebuilt every run.
#[derive(Debug, Clone, Copy)]
pub struct CategoricalDim {
  pub table:   &'static str,
  pub entries: &'static [CodeLabel],
}

pub fn categorical_dims() -> &'static [CategoricalDim] {
  CATEGORICAL_DIMS
}

static CATEGORICAL_DIMS: &[CategoricalDim] = &[
  CategoricalDim {
    table:   "dim_sex",
    entries: &[cl("1", "Masculino"), cl("2", "Feminino"), cl("9", "Ignorado")],
  },
  CategoricalDim {
    table:   "dim_delivery_mode",
    entries: &[cl("1", "Vaginal"), cl("2", "Cesáreo"), cl("9", "Ignorado")],
  },
  CategoricalDim {
    table:   "dim_race",
    entries: &[
      cl("1", "Branca"),
      cl("2", "Preta"),
      cl("3", "Amarela"),
      cl("4", "Parda"),
      cl("5", "Indígena"),
      cl("9", "Ignorado"),
    ],
  },
  CategoricalDim {
    table:   "dim_education",
    entries: &[
      cl("1", "Nenhuma"),
      cl("2", "1 a 3 anos"),
      cl("3", "4 a 7 anos"),
      cl("4", "8 a 11 anos"),
      cl("5", "12 anos ou mais"),
      cl("9", "Ignorado"),
    ],
  },
  CategoricalDim {
    table:   "dim_prenatal_visits",
    entries: &[
      cl("1", "Nenhuma consulta"),
      cl("2", "1 a 3 consultas"),
      cl("3", "4 a 6 consultas"),
      cl("4", "7 ou mais consultas"),
      cl("9", "Ignorado"),
    ],
  },
  CategoricalDim {
    table:   "dim_gestation_band",
    entries: &[
      cl("1", "Menos de 22 semanas"),
      cl("2", "22 a 27 semanas"),
      cl("3", "28 a 31 semanas"),
      cl("4", "32 a 36 semanas"),
      cl("5", "37 a 41 semanas"),
      cl("6", "42 semanas ou mais"),
      cl("9", "Ignorado"),
    ],
  },
  CategoricalDim {
    table:   "dim_robson_group",
    entries: &[
      cl("1", "Grupo 1"),
      cl("2", "Grupo 2"),
      cl("3", "Grupo 3"),
      cl("4", "Grupo 4"),
      cl("5", "Grupo 5"),
      cl("6", "Grupo 6"),
      cl("7", "Grupo 7"),
      cl("8", "Grupo 8"),
      cl("9", "Grupo 9"),
      cl("10", "Grupo 10"),
      cl("11", "Não se aplica"),
    ],
  },
];

/// One labelled numeric range of a binned dimension; bounds are inclusive.
#[derive(Debug, Clone, Copy)]
pub struct Bin {
  pub min:   i64,
  pub max:   i64,
  pub label: &'static str,
}

const fn bin(min: i64, max: i64, label: &'static str) -> Bin {
  Bin { min, max, label }
}

/// A binned dimension table: named ranges reporting uses to group a
/// continuous measure without re-deriving boundaries at query time.
#[derive(Debug, Clone, Copy)]
pub struct BinnedDim {
  pub table: &'static str,
  pub bins:  &'static [Bin],
}

pub fn binned_dims() -> &'static [BinnedDim] {
  BINNED_DIMS
}

static BINNED_DIMS: &[BinnedDim] = &[
  BinnedDim {
    table: "dim_age_bracket",
    bins:  &[
      bin(10, 14, "10 a 14 anos"),
      bin(15, 19, "15 a 19 anos"),
      bin(20, 24, "20 a 24 anos"),
      bin(25, 29, "25 a 29 anos"),
      bin(30, 34, "30 a 34 anos"),
      bin(35, 39, "35 a 39 anos"),
      bin(40, 44, "40 a 44 anos"),
      bin(45, 55, "45 anos ou mais"),
    ],
  },
  BinnedDim {
    table: "dim_weight_bracket",
    bins:  &[
      bin(0, 1499, "Menos de 1500 g"),
      bin(1500, 2499, "1500 a 2499 g"),
      bin(2500, 2999, "2500 a 2999 g"),
      bin(3000, 3999, "3000 a 3999 g"),
      bin(4000, 8000, "4000 g ou mais"),
    ],
  },
];

/// Regions, keyed by the first digit of the municipality code.
pub fn regions() -> &'static [CodeLabel] {
  REGIONS
}

static REGIONS: &[CodeLabel] = &[
  cl("1", "Norte"),
  cl("2", "Nordeste"),
  cl("3", "Sudeste"),
  cl("4", "Sul"),
  cl("5", "Centro-Oeste"),
];

/// One state, keyed by the first two digits of the municipality code.
#[derive(Debug, Clone, Copy)]
pub struct StateCode {
  pub code:  &'static str,
  pub abbr:  &'static str,
  pub label: &'static str,
}

const fn st(code: &'static str, abbr: &'static str, label: &'static str) -> StateCode {
  StateCode { code, abbr, label }
}

pub fn states() -> &'static [StateCode] {
  STATES
}

static STATES: &[StateCode] = &[
  st("11", "RO", "Rondônia"),
  st("12", "AC", "Acre"),
  st("13", "AM", "Amazonas"),
  st("14", "RR", "Roraima"),
  st("15", "PA", "Pará"),
  st("16", "AP", "Amapá"),
  st("17", "TO", "Tocantins"),
  st("21", "MA", "Maranhão"),
  st("22", "PI", "Piauí"),
  st("23", "CE", "Ceará"),
  st("24", "RN", "Rio Grande do Norte"),
  st("25", "PB", "Paraíba"),
  st("26", "PE", "Pernambuco"),
  st("27", "AL", "Alagoas"),
  st("28", "SE", "Sergipe"),
  st("29", "BA", "Bahia"),
  st("31", "MG", "Minas Gerais"),
  st("32", "ES", "Espírito Santo"),
  st("33", "RJ", "Rio de Janeiro"),
  st("35", "SP", "São Paulo"),
  st("41", "PR", "Paraná"),
  st("42", "SC", "Santa Catarina"),
  st("43", "RS", "Rio Grande do Sul"),
  st("50", "MS", "Mato Grosso do Sul"),
  st("51", "MT", "Mato Grosso"),
  st("52", "GO", "Goiás"),
  st("53", "DF", "Distrito Federal"),
];
