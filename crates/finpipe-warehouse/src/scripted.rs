use std::sync::{Arc, Mutex};

use finpipe_core::{ConnectionError, QueryCause, QueryError, Table};

use crate::traits::{Connector, Warehouse};

/// Canned-response warehouse for tests and dry runs. Not a SQL engine:
/// a statement gets the response of the first rule whose pattern it contains
/// (whitespace-insensitive).
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    rules: Vec<(String, Response)>,
    connect_error: Option<String>,
    disconnect_after: Option<usize>,
    executed: Vec<String>,
    connects: usize,
    closes: usize,
}

#[derive(Clone)]
enum Response {
    Rows(Table),
    Fail(QueryCause),
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: &str, table: Table) -> Self {
        self.push(pattern, Response::Rows(table))
    }

    pub fn fail_on(self, pattern: &str, cause: QueryCause) -> Self {
        self.push(pattern, Response::Fail(cause))
    }

    /// Every `connect` fails with `reason`.
    pub fn refuse_connections(self, reason: &str) -> Self {
        self.lock().connect_error = Some(reason.to_string());
        self
    }

    /// Statements after the first `n` (across all sessions) fail as disconnected.
    pub fn disconnect_after(self, n: usize) -> Self {
        self.lock().disconnect_after = Some(n);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    fn push(self, pattern: &str, response: Response) -> Self {
        self.lock().rules.push((normalize(pattern), response));
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a poisoned script only means another test thread panicked mid-assert
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self) -> Result<Box<dyn Warehouse>, ConnectionError> {
        let mut inner = self.lock();
        if let Some(reason) = &inner.connect_error {
            return Err(ConnectionError::new(self.describe(), reason.clone()));
        }
        inner.connects += 1;
        Ok(Box::new(ScriptedWarehouse {
            script: self.clone(),
            closed: false,
        }))
    }

    fn describe(&self) -> String {
        "scripted warehouse".to_string()
    }
}

pub struct ScriptedWarehouse {
    script: ScriptedConnector,
    closed: bool,
}

impl Warehouse for ScriptedWarehouse {
    fn execute(&mut self, sql: &str) -> Result<Table, QueryError> {
        if self.closed {
            return Err(QueryError::new(sql, QueryCause::Disconnected("session closed".into())));
        }
        let mut inner = self.script.lock();
        inner.executed.push(sql.to_string());
        if inner.disconnect_after.is_some_and(|n| inner.executed.len() > n) {
            return Err(QueryError::new(sql, QueryCause::Disconnected("server closed the connection".into())));
        }
        let normalized = normalize(sql);
        let response = inner
            .rules
            .iter()
            .find(|(pattern, _)| normalized.contains(pattern.as_str()))
            .map(|(_, r)| r.clone());
        match response {
            Some(Response::Rows(table)) => Ok(table),
            Some(Response::Fail(cause)) => Err(QueryError::new(sql, cause)),
            None => Err(QueryError::new(sql, QueryCause::Database("no scripted response".into()))),
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.script.lock().closes += 1;
        }
    }
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
