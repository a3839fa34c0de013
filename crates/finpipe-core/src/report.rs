use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Category, CheckStatus, RunId, Value};

/// Outcome of one check execution. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_name: String,
    pub category: Category,
    pub passed: bool,
    /// Value of the rule's field (NULL when the check could not be evaluated).
    pub observed: Value,
    /// Every column of the result row, in query order.
    #[serde(default)]
    pub details: Vec<(String, Value)>,
    pub message: String,
}

impl CheckResult {
    pub fn status(&self) -> CheckStatus {
        if self.passed {
            CheckStatus::Pass
        } else if self.category.is_critical() {
            CheckStatus::Fail
        } else {
            CheckStatus::Warn
        }
    }

    pub fn is_warning(&self) -> bool {
        self.status() == CheckStatus::Warn
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub category: Category,
    pub attempted: bool,
    pub all_passed: bool,
    pub results: Vec<CheckResult>,
}

impl CategoryReport {
    /// An attempted category; vacuously passed when `results` is empty.
    pub fn from_results(category: Category, results: Vec<CheckResult>) -> Self {
        let all_passed = results.iter().all(|r| r.passed);
        Self {
            category,
            attempted: true,
            all_passed,
            results,
        }
    }

    pub fn unattempted(category: Category) -> Self {
        Self {
            category,
            attempted: false,
            all_passed: false,
            results: vec![],
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn result(&self, check_name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.check_name == check_name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub passed: u32,
    pub warned: u32,
    pub failed: u32,
    pub total: u32,
}

/// Terminal artifact of a validation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub category_reports: BTreeMap<Category, CategoryReport>,
    pub overall_passed: bool,
    /// Set when the run stopped on a connection failure.
    pub aborted: Option<String>,
}

impl ValidationReport {
    /// Folds category reports into a report. Categories that are missing are
    /// recorded as unattempted; the verdict follows [`overall_verdict`].
    pub fn assemble(
        run_id: RunId,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        reports: Vec<CategoryReport>,
        aborted: Option<String>,
    ) -> Self {
        let mut category_reports: BTreeMap<Category, CategoryReport> =
            reports.into_iter().map(|r| (r.category, r)).collect();
        for category in Category::ALL {
            category_reports
                .entry(category)
                .or_insert_with(|| CategoryReport::unattempted(category));
        }
        let overall_passed = aborted.is_none() && overall_verdict(&category_reports);
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            run_id,
            started_at,
            finished_at,
            duration_ms,
            category_reports,
            overall_passed,
            aborted,
        }
    }

    pub fn category(&self, category: Category) -> Option<&CategoryReport> {
        self.category_reports.get(&category)
    }

    pub fn result(&self, category: Category, check_name: &str) -> Option<&CheckResult> {
        self.category(category)?.result(check_name)
    }

    pub fn attempted_categories(&self) -> usize {
        self.category_reports.values().filter(|r| r.attempted).count()
    }

    pub fn results(&self) -> impl Iterator<Item = &CheckResult> {
        self.category_reports.values().flat_map(|r| r.results.iter())
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for result in self.results() {
            summary.total += 1;
            match result.status() {
                CheckStatus::Pass => summary.passed += 1,
                CheckStatus::Warn => summary.warned += 1,
                CheckStatus::Fail => summary.failed += 1,
            }
        }
        summary
    }

    pub fn exit_code(&self) -> i32 {
        if self.overall_passed {
            0
        } else {
            1
        }
    }
}

/// True iff every critical category was attempted and passed.
/// Quality is advisory and never affects the verdict.
pub fn overall_verdict(reports: &BTreeMap<Category, CategoryReport>) -> bool {
    Category::ALL
        .iter()
        .filter(|c| c.is_critical())
        .all(|c| reports.get(c).is_some_and(|r| r.attempted && r.all_passed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(category: Category, name: &str, passed: bool) -> CheckResult {
        CheckResult {
            check_name: name.to_string(),
            category,
            passed,
            observed: Value::Integer(if passed { 0 } else { 3 }),
            details: vec![],
            message: String::new(),
        }
    }

    fn passing(category: Category) -> CategoryReport {
        CategoryReport::from_results(category, vec![result(category, "c", true)])
    }

    fn report(reports: Vec<CategoryReport>, aborted: Option<String>) -> ValidationReport {
        let now = Utc::now();
        ValidationReport::assemble(RunId::new(), now, now, reports, aborted)
    }

    #[test]
    fn quality_failures_only_warn() {
        let quality = CategoryReport::from_results(
            Category::Quality,
            vec![result(Category::Quality, "negative_sales", false)],
        );
        let r = report(
            vec![
                passing(Category::Existence),
                passing(Category::Integrity),
                quality,
                passing(Category::Reconciliation),
            ],
            None,
        );
        assert!(r.overall_passed);
        assert_eq!(r.exit_code(), 0);
        let s = r.summary();
        assert_eq!((s.passed, s.warned, s.failed, s.total), (3, 1, 0, 4));
        assert!(r.result(Category::Quality, "negative_sales").unwrap().is_warning());
    }

    #[test]
    fn critical_failure_flips_verdict() {
        let integrity = CategoryReport::from_results(
            Category::Integrity,
            vec![result(Category::Integrity, "fact_to_dim_date", false)],
        );
        let r = report(
            vec![
                passing(Category::Existence),
                integrity,
                passing(Category::Quality),
                passing(Category::Reconciliation),
            ],
            None,
        );
        assert!(!r.overall_passed);
        assert_eq!(r.exit_code(), 1);
        assert_eq!(
            r.result(Category::Integrity, "fact_to_dim_date").unwrap().status(),
            CheckStatus::Fail
        );
    }

    #[test]
    fn empty_category_is_vacuously_passed() {
        let r = report(
            vec![
                CategoryReport::from_results(Category::Existence, vec![]),
                passing(Category::Integrity),
                passing(Category::Reconciliation),
            ],
            None,
        );
        // quality was never attempted, which does not matter for the verdict
        assert!(r.overall_passed);
        assert_eq!(r.attempted_categories(), 3);
    }

    #[test]
    fn aborted_report_has_nothing_attempted() {
        let r = report(vec![], Some("connection refused".into()));
        assert_eq!(r.attempted_categories(), 0);
        assert_eq!(r.category_reports.len(), 4);
        assert!(!r.overall_passed);
    }

    #[test]
    fn report_round_trips_through_json() {
        let r = report(vec![passing(Category::Existence)], None);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"existence\""));
        let back: ValidationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.overall_passed, r.overall_passed);
        assert_eq!(back.category_reports.len(), 4);
    }
}
