//! [`Store`] — a handle to one SQLite database.

use std::path::Path;

use natal_core::expr::quote_ident;
use rusqlite::types::Value;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A pipeline store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct Store {
  conn: tokio_rusqlite::Connection,
}

impl Store {
  /// Open (or create) a store at `path`.
  pub async fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_pragmas().await?;
    tracing::debug!("opened store at {}", path.display());
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> crate::Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_pragmas().await?;
    Ok(store)
  }

  /// Close the underlying connection. The pipeline opens its stores once at
  /// start and closes them here at the end of the run.
  pub async fn close(self) -> crate::Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  async fn init_pragmas(&self) -> crate::Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(
          "PRAGMA journal_mode = WAL;
           PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` with exclusive access to the raw connection on the database
  /// thread. Stages use this for their transaction-scoped work.
  pub async fn with_conn<T, F>(&self, f: F) -> crate::Result<T>
  where
    F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<T>
      + Send
      + 'static,
    T: Send + 'static,
  {
    Ok(self.conn.call(f).await?)
  }

  // ── Statement execution ───────────────────────────────────────────────────

  pub async fn execute_batch(&self, sql: impl Into<String>) -> crate::Result<()> {
    let sql = sql.into();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn execute(&self, sql: impl Into<String>) -> crate::Result<usize> {
    let sql = sql.into();
    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, [])?))
      .await?;
    Ok(changed)
  }

  // ── Scalar queries ────────────────────────────────────────────────────────

  pub async fn query_i64(&self, sql: impl Into<String>) -> crate::Result<i64> {
    let sql = sql.into();
    let value = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
      .await?;
    Ok(value)
  }

  pub async fn query_bool(&self, sql: impl Into<String>) -> crate::Result<bool> {
    Ok(self.query_i64(sql).await? != 0)
  }

  // ── Introspection ─────────────────────────────────────────────────────────

  pub async fn table_exists(&self, name: &str) -> crate::Result<bool> {
    let name = name.to_owned();
    let exists = self
      .conn
      .call(move |conn| {
        let count: i64 = conn.query_row(
          "SELECT COUNT(*) FROM sqlite_master
           WHERE type = 'table' AND name = ?1",
          rusqlite::params![name],
          |row| row.get(0),
        )?;
        Ok(count > 0)
      })
      .await?;
    Ok(exists)
  }

  /// Column names of a table, in declaration order.
  pub async fn table_columns(&self, name: &str) -> crate::Result<Vec<String>> {
    Ok(
      self
        .table_schema(name)
        .await?
        .into_iter()
        .map(|(name, _)| name)
        .collect(),
    )
  }

  /// `(column name, declared type)` pairs, in declaration order. The
  /// declared type is empty for columns created via `CREATE TABLE .. AS`.
  pub async fn table_schema(
    &self,
    name: &str,
  ) -> crate::Result<Vec<(String, String)>> {
    let quoted = quote_ident(name);
    let pairs = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare(&format!("PRAGMA table_info({quoted})"))?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(1)?, row.get(2)?)))?
          .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(pairs)
  }

  /// The stored `CREATE TABLE` statement, if the table exists.
  pub async fn table_ddl(&self, name: &str) -> crate::Result<Option<String>> {
    let name = name.to_owned();
    let ddl = self
      .conn
      .call(move |conn| {
        use rusqlite::OptionalExtension as _;
        Ok(
          conn
            .query_row(
              "SELECT sql FROM sqlite_master
               WHERE type = 'table' AND name = ?1",
              rusqlite::params![name],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(ddl)
  }

  /// Tables whose name starts with `prefix`, sorted by name.
  pub async fn tables_with_prefix(
    &self,
    prefix: &str,
  ) -> crate::Result<Vec<String>> {
    // GLOB, not LIKE: LIKE treats the `_` in prefixes like `dim_` as a
    // single-character wildcard.
    let pattern = format!("{}*", prefix.replace(['*', '?', '['], ""));
    let names = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT name FROM sqlite_master
           WHERE type = 'table' AND name GLOB ?1
           ORDER BY name",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![pattern], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(names)
  }

  pub async fn row_count(&self, table: &str) -> crate::Result<i64> {
    self
      .query_i64(format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
      .await
  }

  // ── Generic row I/O (promotion) ───────────────────────────────────────────

  /// Read one bounded chunk of a table's rows as raw values, ordered by
  /// rowid. BLOB values pass through untouched, which keeps geometry
  /// payloads bit-exact.
  pub async fn read_rows_chunk(
    &self,
    table: &str,
    offset: i64,
    limit: i64,
  ) -> crate::Result<Vec<Vec<Value>>> {
    let sql = format!(
      "SELECT * FROM {} ORDER BY rowid LIMIT {limit} OFFSET {offset}",
      quote_ident(table)
    );
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let width = stmt.column_count();
        let rows = stmt
          .query_map([], |row| {
            (0..width).map(|i| row.get::<_, Value>(i)).collect()
          })?
          .collect::<rusqlite::Result<Vec<Vec<Value>>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  /// Run an arbitrary read query, returning column names plus raw rows.
  pub async fn query_rows(
    &self,
    sql: impl Into<String>,
  ) -> crate::Result<(Vec<String>, Vec<Vec<Value>>)> {
    let sql = sql.into();
    let result = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> =
          stmt.column_names().iter().map(|n| n.to_string()).collect();
        let width = stmt.column_count();
        let rows = stmt
          .query_map([], |row| {
            (0..width).map(|i| row.get::<_, Value>(i)).collect()
          })?
          .collect::<rusqlite::Result<Vec<Vec<Value>>>>()?;
        Ok((names, rows))
      })
      .await?;
    Ok(result)
  }
}
