//! SQLite driver for Tabula.
//!
//! [`SqliteConnection`] implements [`Connection`] over `rusqlite`. Values arrive
//! already marshaled by the SQLite dialect (dates as text, decimals as reals,
//! booleans as integers), so binding maps each native [`Value`] onto one of
//! SQLite's storage classes and reading maps it back.
//!
//! The driver offers no reader connections: a second connection would not see the
//! primary connection's uncommitted writes, and an in-memory database is private
//! to the connection that opened it. Cursors therefore run on the primary.

use std::path::Path;

use rusqlite::types::{Value as SqlValue, ValueRef};
use tabula_core::{Connection, DbTable, Error, Result, Value};

/// Milliseconds a statement waits on a locked database before failing.
const BUSY_TIMEOUT_MS: &str = "5000";

/// A SQLite database connection.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
    path: String,
}

impl SqliteConnection {
    /// Open (or create) a database file.
    #[tracing::instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_text = path.as_ref().display().to_string();
        let conn = rusqlite::Connection::open(path.as_ref())
            .map_err(|e| Error::Connection(format!("failed to open '{path_text}': {e}")))?;
        configure(&conn, true);
        tracing::info!(path = %path_text, "Opened SQLite database");
        Ok(Self {
            conn: Some(conn),
            path: path_text,
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| Error::Connection(format!("failed to open in-memory database: {e}")))?;
        configure(&conn, false);
        Ok(Self {
            conn: Some(conn),
            path: ":memory:".to_string(),
        })
    }

    /// Open from a connection string: a file path, `:memory:`, or `sqlite://<path>`.
    pub fn open_url(url: &str) -> Result<Self> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        if path.is_empty() || path == ":memory:" {
            Self::open_in_memory()
        } else {
            Self::open(path)
        }
    }

    /// The database path, or `:memory:`.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn conn(&self) -> Result<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| Error::Connection(format!("connection to '{}' is closed", self.path)))
    }
}

/// WAL journaling for files, plus a busy timeout. Failures only degrade
/// concurrency, so they are logged.
fn configure(conn: &rusqlite::Connection, file: bool) {
    if file {
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!(error = %e, "Failed to enable WAL journal mode");
        }
    }
    if let Err(e) = conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS) {
        tracing::warn!(error = %e, "Failed to set busy timeout");
    }
}

fn to_sqlite(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(v) => SqlValue::Integer(i64::from(*v)),
        Value::BigInt(v) => SqlValue::Integer(*v),
        Value::Double(v) => SqlValue::Real(*v),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Decimal(_)
        | Value::Date(_)
        | Value::Time(_)
        | Value::DateTime(_)
        | Value::Guid(_) => SqlValue::Text(value.to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::BigInt(v),
        ValueRef::Real(v) => Value::Double(v),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    }
}

impl Connection for SqliteConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<DbTable> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(|e| Error::query(sql, e))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| (*c).to_string()).collect();
        let width = columns.len();
        let mut result = DbTable::new(columns);

        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter().map(to_sqlite)))
            .map_err(|e| Error::query(sql, e))?;
        while let Some(row) = rows.next().map_err(|e| Error::query(sql, e))? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sqlite(row.get_ref(i).map_err(|e| Error::query(sql, e))?));
            }
            result.push(values);
        }
        Ok(result)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let affected = self
            .conn()?
            .execute(sql, rusqlite::params_from_iter(params.iter().map(to_sqlite)))
            .map_err(|e| Error::query(sql, e))?;
        Ok(affected as u64)
    }

    fn last_insert_id(&mut self) -> Result<i64> {
        Ok(self.conn()?.last_insert_rowid())
    }

    fn begin(&mut self) -> Result<()> {
        self.conn()?
            .execute_batch("BEGIN")
            .map_err(|e| Error::query("BEGIN", e))
    }

    fn commit(&mut self) -> Result<()> {
        self.conn()?
            .execute_batch("COMMIT")
            .map_err(|e| Error::query("COMMIT", e))
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn()?
            .execute_batch("ROLLBACK")
            .map_err(|e| Error::query("ROLLBACK", e))
    }

    fn close(&mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| {
            Error::Connection(format!("failed to close '{}': {e}", self.path))
        })?;
        tracing::debug!(path = %self.path, "Closed SQLite database");
        Ok(())
    }
}
