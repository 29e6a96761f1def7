//! Typed SQL expression model.
//!
//! Every generated statement in the pipeline is composed from these values
//! and rendered to SQL text at the last moment. Keeping the catalog-to-clause
//! mapping as data means each rule can be unit-tested without a database.

use std::fmt::Write as _;

// ─── Literals ────────────────────────────────────────────────────────────────

/// A SQL literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
  Int(i64),
  Float(f64),
  Text(String),
  Null,
}

impl Literal {
  pub fn render(&self) -> String {
    match self {
      Literal::Int(v) => v.to_string(),
      Literal::Float(v) => {
        // Force a decimal point so SQLite keeps REAL affinity.
        if v.fract() == 0.0 {
          format!("{v:.1}")
        } else {
          v.to_string()
        }
      }
      Literal::Text(s) => quote_text(s),
      Literal::Null => "NULL".to_string(),
    }
  }
}

/// Single-quote a text literal, doubling embedded quotes.
pub fn quote_text(s: &str) -> String {
  format!("'{}'", s.replace('\'', "''"))
}

/// Double-quote an identifier (table or column name).
pub fn quote_ident(s: &str) -> String {
  format!("\"{}\"", s.replace('"', "\"\""))
}

// ─── Comparison operators ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

impl CmpOp {
  fn sql(self) -> &'static str {
    match self {
      CmpOp::Eq => "=",
      CmpOp::Ne => "<>",
      CmpOp::Lt => "<",
      CmpOp::Le => "<=",
      CmpOp::Gt => ">",
      CmpOp::Ge => ">=",
    }
  }
}

// ─── Expressions ─────────────────────────────────────────────────────────────

/// A composable scalar SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  /// Column reference, quoted on render.
  Col(String),
  Lit(Literal),
  Cmp {
    lhs: Box<Expr>,
    op:  CmpOp,
    rhs: Box<Expr>,
  },
  In {
    expr:    Box<Expr>,
    options: Vec<Literal>,
  },
  IsNull(Box<Expr>),
  Not(Box<Expr>),
  /// Conjunction; renders `1` when empty.
  All(Vec<Expr>),
  /// Disjunction; renders `0` when empty.
  Any(Vec<Expr>),
  /// `CASE WHEN .. THEN .. [WHEN ..] ELSE .. END`.
  Case {
    whens: Vec<(Expr, Expr)>,
    other: Option<Box<Expr>>,
  },
  /// Function call, e.g. `TRIM(x)` or `date(x)`.
  Func {
    name: &'static str,
    args: Vec<Expr>,
  },
  /// String concatenation with `||`.
  Concat(Vec<Expr>),
  /// `expr GLOB 'pattern'`.
  Glob {
    expr:    Box<Expr>,
    pattern: String,
  },
  /// `CAST(expr AS type)`.
  Cast {
    expr: Box<Expr>,
    ty:   &'static str,
  },
}

impl Expr {
  pub fn col(name: impl Into<String>) -> Self {
    Expr::Col(name.into())
  }

  pub fn int(v: i64) -> Self {
    Expr::Lit(Literal::Int(v))
  }

  pub fn text(v: impl Into<String>) -> Self {
    Expr::Lit(Literal::Text(v.into()))
  }

  pub fn null() -> Self {
    Expr::Lit(Literal::Null)
  }

  pub fn cmp(self, op: CmpOp, rhs: Expr) -> Self {
    Expr::Cmp { lhs: Box::new(self), op, rhs: Box::new(rhs) }
  }

  pub fn eq(self, rhs: Expr) -> Self {
    self.cmp(CmpOp::Eq, rhs)
  }

  pub fn ne(self, rhs: Expr) -> Self {
    self.cmp(CmpOp::Ne, rhs)
  }

  pub fn lt(self, rhs: Expr) -> Self {
    self.cmp(CmpOp::Lt, rhs)
  }

  pub fn le(self, rhs: Expr) -> Self {
    self.cmp(CmpOp::Le, rhs)
  }

  pub fn gt(self, rhs: Expr) -> Self {
    self.cmp(CmpOp::Gt, rhs)
  }

  pub fn ge(self, rhs: Expr) -> Self {
    self.cmp(CmpOp::Ge, rhs)
  }

  pub fn is_null(self) -> Self {
    Expr::IsNull(Box::new(self))
  }

  pub fn is_in(self, options: Vec<Literal>) -> Self {
    Expr::In { expr: Box::new(self), options }
  }

  pub fn func(name: &'static str, args: Vec<Expr>) -> Self {
    Expr::Func { name, args }
  }

  pub fn trim(self) -> Self {
    Expr::func("TRIM", vec![self])
  }

  pub fn upper(self) -> Self {
    Expr::func("UPPER", vec![self])
  }

  pub fn substr(self, start: i64, len: i64) -> Self {
    Expr::func("SUBSTR", vec![self, Expr::int(start), Expr::int(len)])
  }

  pub fn glob(self, pattern: impl Into<String>) -> Self {
    Expr::Glob { expr: Box::new(self), pattern: pattern.into() }
  }

  pub fn cast(self, ty: &'static str) -> Self {
    Expr::Cast { expr: Box::new(self), ty }
  }

  /// Render to SQL text. Sub-expressions are parenthesised conservatively;
  /// the output is fed to SQLite, not to humans.
  pub fn render(&self) -> String {
    match self {
      Expr::Col(name) => quote_ident(name),
      Expr::Lit(lit) => lit.render(),
      Expr::Cmp { lhs, op, rhs } => {
        format!("{} {} {}", lhs.render(), op.sql(), rhs.render())
      }
      Expr::In { expr, options } => {
        let opts: Vec<String> = options.iter().map(Literal::render).collect();
        format!("{} IN ({})", expr.render(), opts.join(", "))
      }
      Expr::IsNull(expr) => format!("{} IS NULL", expr.render()),
      Expr::Not(expr) => format!("NOT ({})", expr.render()),
      Expr::All(exprs) => join_logical(exprs, "AND", "1"),
      Expr::Any(exprs) => join_logical(exprs, "OR", "0"),
      Expr::Case { whens, other } => {
        let mut out = String::from("CASE");
        for (cond, value) in whens {
          write!(out, " WHEN {} THEN {}", cond.render(), value.render()).ok();
        }
        if let Some(e) = other {
          write!(out, " ELSE {}", e.render()).ok();
        }
        out.push_str(" END");
        out
      }
      Expr::Func { name, args } => {
        let rendered: Vec<String> = args.iter().map(Expr::render).collect();
        format!("{name}({})", rendered.join(", "))
      }
      Expr::Concat(parts) => {
        let rendered: Vec<String> = parts.iter().map(Expr::render).collect();
        rendered.join(" || ")
      }
      Expr::Glob { expr, pattern } => {
        format!("{} GLOB {}", expr.render(), quote_text(pattern))
      }
      Expr::Cast { expr, ty } => format!("CAST({} AS {ty})", expr.render()),
    }
  }
}

fn join_logical(exprs: &[Expr], op: &str, empty: &str) -> String {
  if exprs.is_empty() {
    return empty.to_string();
  }
  let rendered: Vec<String> = exprs.iter().map(|e| format!("({})", e.render())).collect();
  rendered.join(&format!(" {op} "))
}

// ─── Aggregations ────────────────────────────────────────────────────────────

/// An aggregate expression over a GROUP BY bucket.
#[derive(Debug, Clone)]
pub enum Agg {
  /// `COUNT(*)`.
  CountAll,
  /// `SUM(CASE WHEN cond THEN 1 ELSE 0 END)`.
  CountWhere(Expr),
  /// Percentage of the bucket matching `cond`, NULL when the bucket is
  /// empty: `SUM(CASE ..) * 100.0 / NULLIF(COUNT(*), 0)`.
  PctWhere(Expr),
  /// `AVG(col)`.
  Mean(String),
}

impl Agg {
  pub fn render(&self) -> String {
    match self {
      Agg::CountAll => "COUNT(*)".to_string(),
      Agg::CountWhere(cond) => {
        format!("SUM(CASE WHEN {} THEN 1 ELSE 0 END)", cond.render())
      }
      Agg::PctWhere(cond) => {
        format!(
          "SUM(CASE WHEN {} THEN 1 ELSE 0 END) * 100.0 / NULLIF(COUNT(*), 0)",
          cond.render()
        )
      }
      Agg::Mean(col) => format!("AVG({})", quote_ident(col)),
    }
  }
}

/// A named select-list item (`expr AS alias`).
#[derive(Debug, Clone)]
pub struct SelectItem {
  pub sql:   String,
  pub alias: String,
}

impl SelectItem {
  pub fn new(sql: impl Into<String>, alias: impl Into<String>) -> Self {
    Self { sql: sql.into(), alias: alias.into() }
  }

  pub fn from_expr(expr: &Expr, alias: impl Into<String>) -> Self {
    Self::new(expr.render(), alias)
  }

  pub fn from_agg(agg: &Agg, alias: impl Into<String>) -> Self {
    Self::new(agg.render(), alias)
  }

  pub fn render(&self) -> String {
    format!("{} AS {}", self.sql, quote_ident(&self.alias))
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn literal_text_is_quoted_and_escaped() {
    assert_eq!(Literal::Text("a'b".into()).render(), "'a''b'");
    assert_eq!(Literal::Null.render(), "NULL");
    assert_eq!(Literal::Float(30.0).render(), "30.0");
  }

  #[test]
  fn identifiers_are_double_quoted() {
    assert_eq!(quote_ident("PESO"), "\"PESO\"");
    assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
  }

  #[test]
  fn comparison_renders_infix() {
    let e = Expr::col("PESO").lt(Expr::int(2500));
    assert_eq!(e.render(), "\"PESO\" < 2500");
  }

  #[test]
  fn in_list_renders_options() {
    let e = Expr::col("GRAVIDEZ")
      .is_in(vec![Literal::Text("2".into()), Literal::Text("3".into())]);
    assert_eq!(e.render(), "\"GRAVIDEZ\" IN ('2', '3')");
  }

  #[test]
  fn conjunction_parenthesises_terms() {
    let e = Expr::All(vec![
      Expr::col("A").is_null(),
      Expr::col("B").eq(Expr::int(1)),
    ]);
    assert_eq!(e.render(), "(\"A\" IS NULL) AND (\"B\" = 1)");
  }

  #[test]
  fn empty_conjunction_and_disjunction_render_constants() {
    assert_eq!(Expr::All(vec![]).render(), "1");
    assert_eq!(Expr::Any(vec![]).render(), "0");
  }

  #[test]
  fn case_renders_whens_and_else() {
    let e = Expr::Case {
      whens: vec![(Expr::col("X").eq(Expr::int(1)), Expr::int(1))],
      other: Some(Box::new(Expr::null())),
    };
    assert_eq!(e.render(), "CASE WHEN \"X\" = 1 THEN 1 ELSE NULL END");
  }

  #[test]
  fn count_where_uses_case_sum() {
    let agg = Agg::CountWhere(Expr::col("cesarean").eq(Expr::int(1)));
    assert_eq!(
      agg.render(),
      "SUM(CASE WHEN \"cesarean\" = 1 THEN 1 ELSE 0 END)"
    );
  }

  #[test]
  fn pct_where_guards_zero_denominator() {
    let agg = Agg::PctWhere(Expr::col("premature").eq(Expr::int(1)));
    let sql = agg.render();
    assert!(sql.contains("NULLIF(COUNT(*), 0)"), "denominator must be NULLIF-guarded: {sql}");
    assert!(sql.contains("* 100.0 /"));
  }

  #[test]
  fn select_item_aliases() {
    let item = SelectItem::from_agg(&Agg::Mean("PESO".into()), "peso_mean");
    assert_eq!(item.render(), "AVG(\"PESO\") AS \"peso_mean\"");
  }
}
