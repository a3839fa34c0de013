use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal: the warehouse could not be reached at all. Aborts a validation run.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("connection to {target} failed: {reason}")]
pub struct ConnectionError {
    pub target: String,
    pub reason: String,
}

impl ConnectionError {
    pub fn new(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCause {
    Database(String),
    Timeout { after_ms: u64 },
    /// The underlying connection is gone; further queries cannot succeed.
    Disconnected(String),
}

impl fmt::Display for QueryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryCause::Database(msg) => write!(f, "{msg}"),
            QueryCause::Timeout { after_ms } => write!(f, "timed out after {after_ms}ms"),
            QueryCause::Disconnected(msg) => write!(f, "connection lost: {msg}"),
        }
    }
}

/// Per-statement failure. Carries the failing statement for triage.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("query failed: {cause}")]
pub struct QueryError {
    pub statement: String,
    pub cause: QueryCause,
}

impl QueryError {
    pub fn new(statement: impl Into<String>, cause: QueryCause) -> Self {
        Self {
            statement: statement.into(),
            cause,
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self.cause, QueryCause::Disconnected(_))
    }
}

/// The query ran but its single-row result cannot be evaluated.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("query returned no rows")]
    NoRows,
    #[error("column `{0}` missing from result")]
    MissingField(String),
    #[error("column `{0}` is NULL")]
    NullField(String),
    #[error("column `{field}` is not numeric: {value}")]
    NotNumeric { field: String, value: String },
}

#[derive(Debug, Error)]
pub enum TransformationError {
    #[error("failed to launch `{program}`: {reason}")]
    Launch { program: String, reason: String },
    #[error("`{command}` exited with code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_displays_cause() {
        let err = QueryError::new("SELECT 1", QueryCause::Timeout { after_ms: 250 });
        assert_eq!(err.to_string(), "query failed: timed out after 250ms");
        assert!(!err.is_disconnect());
        let lost = QueryError::new("SELECT 1", QueryCause::Disconnected("socket closed".into()));
        assert!(lost.is_disconnect());
    }

    #[test]
    fn connection_error_names_target() {
        let err = ConnectionError::new("warehouse.db", "no such file");
        assert_eq!(err.to_string(), "connection to warehouse.db failed: no such file");
    }
}
