//! Validation orchestrator: one session, categories in fixed order.

use chrono::Utc;
use finpipe_checks::{QueryParams, Registry};
use finpipe_core::{Category, RunId, ValidationReport};
use finpipe_warehouse::{Connector, Session};

use crate::check_runner::CheckRunner;

pub struct Validator {
    connector: Box<dyn Connector>,
    registry: Registry,
    params: QueryParams,
}

impl Validator {
    pub fn new(connector: Box<dyn Connector>, registry: Registry, params: QueryParams) -> Self {
        Self {
            connector,
            registry,
            params,
        }
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Runs existence, integrity, quality and reconciliation in that order.
    ///
    /// A failing category never stops later ones. Losing the connection does:
    /// finished categories keep their reports, the rest are unattempted and the
    /// report is marked aborted. The session is released on every path.
    pub fn run_all(&self) -> ValidationReport {
        let run_id = RunId::new();
        let started_at = Utc::now();
        tracing::info!(run_id = %run_id, warehouse = %self.connector.describe(), checks = self.registry.len(), "validation started");

        let mut session = match Session::open(self.connector.as_ref()) {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(run_id = %run_id, error = %err, "could not connect to warehouse");
                return ValidationReport::assemble(run_id, started_at, Utc::now(), vec![], Some(err.to_string()));
            }
        };

        let mut reports = Vec::with_capacity(Category::ALL.len());
        let mut aborted = None;
        let mut runner = CheckRunner::new(&mut session, &self.registry, &self.params);
        for category in Category::ALL {
            match runner.run_category(category) {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::error!(run_id = %run_id, %category, error = %err, "validation aborted");
                    aborted = Some(err.to_string());
                    break;
                }
            }
        }
        drop(session);

        let report = ValidationReport::assemble(run_id, started_at, Utc::now(), reports, aborted);
        let summary = report.summary();
        tracing::info!(
            run_id = %report.run_id,
            passed = report.overall_passed,
            checks_passed = summary.passed,
            warnings = summary.warned,
            failures = summary.failed,
            duration_ms = report.duration_ms,
            "validation finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finpipe_checks::{RegistryOptions, WarehouseSchema};
    use finpipe_core::{QueryCause, Table, Value};
    use finpipe_warehouse::ScriptedConnector;

    fn count(column: &str, n: i64) -> Table {
        Table::single_row(&[column], vec![Value::Integer(n)])
    }

    fn totals(fact: f64, mart: f64) -> Table {
        Table::single_row(
            &["fact_total", "mart_total", "difference"],
            vec![Value::Real(fact), Value::Real(mart), Value::Real((fact - mart).abs())],
        )
    }

    /// A warehouse where every financial check passes.
    fn healthy() -> ScriptedConnector {
        ScriptedConnector::new()
            .on("AS row_count", count("row_count", 100))
            .on("AS orphaned_records", count("orphaned_records", 0))
            .on("AS violation_count", count("violation_count", 0))
            .on("fact_totals", totals(10_000.0, 10_000.0))
    }

    fn validator(script: &ScriptedConnector, options: &RegistryOptions) -> Validator {
        let registry = Registry::from_schema(&WarehouseSchema::financial(), options).unwrap();
        Validator::new(Box::new(script.clone()), registry, QueryParams::for_schema("staging"))
    }

    #[test]
    fn healthy_warehouse_passes() {
        let script = healthy();
        let report = validator(&script, &RegistryOptions::default()).run_all();
        assert!(report.overall_passed);
        assert_eq!(report.attempted_categories(), 4);
        assert_eq!(report.summary().total, 29);
        assert_eq!(script.connects(), 1);
        assert_eq!(script.closes(), 1);
    }

    #[test]
    fn connection_failure_attempts_nothing() {
        let script = ScriptedConnector::new().refuse_connections("connection refused");
        let report = validator(&script, &RegistryOptions::default()).run_all();
        assert!(!report.overall_passed);
        assert_eq!(report.attempted_categories(), 0);
        assert_eq!(report.category_reports.len(), 4);
        assert!(report.aborted.as_deref().unwrap().contains("connection refused"));
        assert!(script.executed().is_empty());
    }

    #[test]
    fn quality_failures_do_not_flip_the_verdict() {
        let script = ScriptedConnector::new()
            .on("net_sales < 0", count("violation_count", 7))
            .on("AS row_count", count("row_count", 100))
            .on("AS orphaned_records", count("orphaned_records", 0))
            .on("AS violation_count", count("violation_count", 0))
            .on("fact_totals", totals(10_000.0, 10_000.0));
        let report = validator(&script, &RegistryOptions::default()).run_all();
        assert!(report.overall_passed);
        let quality = report.category(Category::Quality).unwrap();
        assert!(!quality.all_passed);
        assert!(report.result(Category::Quality, "negative_sales").unwrap().is_warning());
        assert_eq!(report.summary().warned, 1);
    }

    #[test]
    fn failing_category_does_not_stop_later_ones() {
        let script = ScriptedConnector::new()
            .on("FROM staging.dim_date", count("row_count", 0))
            .on("AS row_count", count("row_count", 100))
            .on("AS orphaned_records", count("orphaned_records", 0))
            .on("AS violation_count", count("violation_count", 0))
            .on("fact_totals", totals(10_000.0, 10_000.0));
        let report = validator(&script, &RegistryOptions::default()).run_all();
        assert!(!report.overall_passed);
        assert!(report.aborted.is_none());
        assert_eq!(report.attempted_categories(), 4);
        assert!(!report.result(Category::Existence, "dim_date").unwrap().passed);
        assert!(report.category(Category::Reconciliation).unwrap().all_passed);
    }

    #[test]
    fn connection_lost_mid_run_keeps_finished_categories() {
        // 12 existence statements succeed, the first integrity statement fails
        let script = healthy().disconnect_after(12);
        let report = validator(&script, &RegistryOptions::default()).run_all();
        assert!(!report.overall_passed);
        assert!(report.aborted.is_some());
        let existence = report.category(Category::Existence).unwrap();
        assert!(existence.attempted && existence.all_passed);
        for category in [Category::Integrity, Category::Quality, Category::Reconciliation] {
            let r = report.category(category).unwrap();
            assert!(!r.attempted && r.results.is_empty(), "{category}");
        }
        assert_eq!(script.executed().len(), 13);
        assert_eq!(script.closes(), 1);
    }

    #[test]
    fn tolerance_boundary_is_inclusive() {
        let at = ScriptedConnector::new()
            .on("AS row_count", count("row_count", 100))
            .on("AS orphaned_records", count("orphaned_records", 0))
            .on("AS violation_count", count("violation_count", 0))
            .on("fact_totals", totals(10_001.0, 10_000.0));
        let report = validator(&at, &RegistryOptions::default()).run_all();
        assert!(report.overall_passed);

        let over = ScriptedConnector::new()
            .on("AS row_count", count("row_count", 100))
            .on("AS orphaned_records", count("orphaned_records", 0))
            .on("AS violation_count", count("violation_count", 0))
            .on("fact_totals", totals(10_001.0001, 10_000.0));
        let report = validator(&over, &RegistryOptions::default()).run_all();
        assert!(!report.overall_passed);
        let r = report
            .result(Category::Reconciliation, "monthly_sales_totals_match_fact")
            .unwrap();
        assert!(!r.passed);
        assert!(r.message.starts_with("difference = "), "{}", r.message);
    }

    #[test]
    fn run_all_is_idempotent() {
        let script = healthy();
        let v = validator(&script, &RegistryOptions::default());
        let first = v.run_all();
        let second = v.run_all();
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.overall_passed, second.overall_passed);
        let observed = |r: &ValidationReport| r.results().map(|c| c.observed.clone()).collect::<Vec<_>>();
        assert_eq!(observed(&first), observed(&second));
    }

    #[test]
    fn query_errors_fail_closed() {
        let script = ScriptedConnector::new()
            .fail_on("SUM(total_profit)", QueryCause::Timeout { after_ms: 30_000 })
            .on("AS row_count", count("row_count", 100))
            .on("AS orphaned_records", count("orphaned_records", 0))
            .on("AS violation_count", count("violation_count", 0))
            .on("fact_totals", totals(10_000.0, 10_000.0));
        let report = validator(&script, &RegistryOptions::default()).run_all();
        assert!(!report.overall_passed);
        assert!(report.aborted.is_none());
        let r = report
            .result(Category::Reconciliation, "product_profit_totals_match_fact")
            .unwrap();
        assert!(!r.passed);
        assert!(r.message.contains("timed out"), "{}", r.message);
        assert!(report.result(Category::Existence, "product_profitability").unwrap().passed);
    }
}
