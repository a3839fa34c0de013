use finpipe_core::{ConnectionError, QueryError, Table};

/// One open, read-only channel to the warehouse.
pub trait Warehouse: Send {
    fn execute(&mut self, sql: &str) -> Result<Table, QueryError>;

    /// Releases the connection. Must be idempotent.
    fn close(&mut self);
}

pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Warehouse>, ConnectionError>;

    /// Human-readable target for logs (path, host/db, ...).
    fn describe(&self) -> String;
}

/// A connected warehouse that is closed when dropped, so release happens on
/// every exit path of a run.
pub struct Session {
    inner: Box<dyn Warehouse>,
    target: String,
}

impl Session {
    pub fn open(connector: &dyn Connector) -> Result<Self, ConnectionError> {
        let target = connector.describe();
        tracing::debug!(warehouse = %target, "opening warehouse session");
        let inner = connector.connect()?;
        Ok(Self { inner, target })
    }

    pub fn execute(&mut self, sql: &str) -> Result<Table, QueryError> {
        self.inner.execute(sql)
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::debug!(warehouse = %self.target, "closing warehouse session");
        self.inner.close();
    }
}
