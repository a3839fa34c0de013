//! Executes the checks of one category over an open session.
//!
//! Query and evaluation failures are recorded as failing results so a category
//! always produces a complete report. Only connection loss escapes, so the
//! orchestrator can stop issuing statements.

use finpipe_checks::{evaluate, query_failed, unevaluated, CheckDefinition, QueryParams, Registry};
use finpipe_core::{Category, CategoryReport, CheckResult, CheckStatus, ConnectionError};
use finpipe_warehouse::Session;

pub struct CheckRunner<'a> {
    session: &'a mut Session,
    registry: &'a Registry,
    params: &'a QueryParams,
}

impl<'a> CheckRunner<'a> {
    pub fn new(session: &'a mut Session, registry: &'a Registry, params: &'a QueryParams) -> Self {
        Self {
            session,
            registry,
            params,
        }
    }

    /// Runs every check of `category` in registration order.
    pub fn run_category(&mut self, category: Category) -> Result<CategoryReport, ConnectionError> {
        let defs = self.registry.checks_for(category);
        tracing::info!(%category, checks = defs.len(), "running category");

        let mut results = Vec::with_capacity(defs.len());
        for def in defs {
            let result = self.run_check(def)?;
            log_result(&result);
            results.push(result);
        }

        let report = CategoryReport::from_results(category, results);
        tracing::info!(
            %category,
            passed = report.all_passed,
            failures = report.failures().count(),
            "category finished"
        );
        Ok(report)
    }

    fn run_check(&mut self, def: &CheckDefinition) -> Result<CheckResult, ConnectionError> {
        let sql = self.registry.render(def, self.params);
        tracing::debug!(check = %def.name, %sql, "executing check");
        match self.session.execute(&sql) {
            Ok(table) => Ok(evaluate(def, &table).unwrap_or_else(|e| unevaluated(def, &e.to_string()))),
            Err(err) if err.is_disconnect() => {
                tracing::error!(check = %def.name, error = %err, "warehouse connection lost");
                Err(ConnectionError::new(self.session.target(), err.cause.to_string()))
            }
            Err(err) => Ok(query_failed(def, &err)),
        }
    }
}

fn log_result(result: &CheckResult) {
    let check = result.check_name.as_str();
    let category = result.category;
    match result.status() {
        CheckStatus::Pass => {
            tracing::info!(check, %category, observed = %result.observed, "PASS: {}", result.message)
        }
        CheckStatus::Warn => {
            tracing::warn!(check, %category, observed = %result.observed, "WARN: {}", result.message)
        }
        CheckStatus::Fail => {
            tracing::error!(check, %category, observed = %result.observed, "FAIL: {}", result.message)
        }
    }
}
