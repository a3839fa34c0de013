use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use finpipe_core::{ConnectionError, QueryCause, QueryError, Table, Value};
use finpipe_warehouse::{Connector, Warehouse};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};

/// Opens a SQLite database file read-only and exposes it under `schema`,
/// so `staging.fact_financial_transactions` resolves the way it would on a
/// server warehouse.
#[derive(Clone, Debug)]
pub struct SqliteConnector {
    path: PathBuf,
    schema: String,
    query_timeout: Option<Duration>,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>, schema: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            schema: schema.into(),
            query_timeout: None,
        }
    }

    /// `Duration::ZERO` disables the limit.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fail(&self, reason: impl Into<String>) -> ConnectionError {
        ConnectionError::new(self.describe(), reason)
    }
}

impl Connector for SqliteConnector {
    fn connect(&self) -> Result<Box<dyn Warehouse>, ConnectionError> {
        if !self.path.is_file() {
            return Err(self.fail("database file not found"));
        }
        if !is_identifier(&self.schema) {
            return Err(self.fail(format!("invalid schema name `{}`", self.schema)));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags).map_err(|e| self.fail(e.to_string()))?;

        if self.schema != "main" {
            let path = self.path.to_str().ok_or_else(|| self.fail("path is not valid utf-8"))?;
            conn.execute(&format!("ATTACH DATABASE ?1 AS {}", self.schema), [path])
                .map_err(|e| self.fail(format!("attach as {}: {e}", self.schema)))?;
        }
        if let Some(timeout) = self.query_timeout {
            conn.busy_timeout(timeout).map_err(|e| self.fail(e.to_string()))?;
        }
        // opening is lazy; touch the catalog so a non-database file fails here
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))
            .map_err(|e| self.fail(e.to_string()))?;

        tracing::debug!(path = %self.path.display(), schema = %self.schema, "sqlite warehouse connected");
        Ok(Box::new(SqliteWarehouse {
            conn: Some(conn),
            query_timeout: self.query_timeout,
        }))
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

pub struct SqliteWarehouse {
    conn: Option<Connection>,
    query_timeout: Option<Duration>,
}

impl Warehouse for SqliteWarehouse {
    fn execute(&mut self, sql: &str) -> Result<Table, QueryError> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| QueryError::new(sql, QueryCause::Disconnected("connection closed".into())))?;

        if let Some(limit) = self.query_timeout {
            let deadline = Instant::now() + limit;
            conn.progress_handler(1_000, Some(move || Instant::now() >= deadline));
        }
        let result = run_query(conn, sql);
        if self.query_timeout.is_some() {
            conn.progress_handler(0, None::<fn() -> bool>);
        }

        result.map_err(|e| QueryError::new(sql, classify(&e, self.query_timeout)))
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!(error = %e, "closing sqlite warehouse failed");
            }
        }
    }
}

fn run_query(conn: &Connection, sql: &str) -> rusqlite::Result<Table> {
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
            Some("validation queries must be read-only".to_string()),
        ));
    }
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut table = Table::new(columns);

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(to_value(row.get_ref(i)?));
        }
        table.push_row(values);
    }
    Ok(table)
}

fn to_value(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Text(format!("<blob {} bytes>", b.len())),
    }
}

fn classify(err: &rusqlite::Error, timeout: Option<Duration>) -> QueryCause {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::OperationInterrupted => QueryCause::Timeout {
                after_ms: timeout.map(|t| t.as_millis() as u64).unwrap_or(0),
            },
            ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::SystemIoFailure | ErrorCode::DatabaseCorrupt => {
                QueryCause::Disconnected(err.to_string())
            }
            _ => QueryCause::Database(err.to_string()),
        },
        other => QueryCause::Database(other.to_string()),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
