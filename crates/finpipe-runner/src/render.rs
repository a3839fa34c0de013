use anyhow::{Context, Result};
use finpipe_core::{CheckResult, ValidationReport};

pub trait ReportFormatter {
    fn format(&self, report: &ValidationReport) -> Result<String>;
}

/// One line per check, then one line per unattempted category and a summary.
pub struct TextFormatter;

/// The serde representation of the report.
pub struct JsonFormatter {
    pub pretty: bool,
}

pub fn check_line(result: &CheckResult) -> String {
    format!(
        "[{}] {}: {} observed={} - {}",
        result.category,
        result.check_name,
        result.status(),
        result.observed,
        result.message
    )
}

impl ReportFormatter for TextFormatter {
    fn format(&self, report: &ValidationReport) -> Result<String> {
        let mut out = String::new();
        for category_report in report.category_reports.values() {
            if !category_report.attempted {
                out.push_str(&format!("[{}] not attempted\n", category_report.category));
                continue;
            }
            for result in &category_report.results {
                out.push_str(&check_line(result));
                out.push('\n');
            }
        }

        let s = report.summary();
        out.push_str(&format!(
            "\n{} checks: {} passed, {} warnings, {} failed ({}ms)\n",
            s.total, s.passed, s.warned, s.failed, report.duration_ms
        ));
        if let Some(reason) = &report.aborted {
            out.push_str(&format!("Aborted: {reason}\n"));
        }
        let verdict = if report.overall_passed { "PASSED" } else { "FAILED" };
        out.push_str(&format!("Validation {verdict} (run {})\n", report.run_id));
        Ok(out)
    }
}

impl ReportFormatter for JsonFormatter {
    fn format(&self, report: &ValidationReport) -> Result<String> {
        let s = if self.pretty {
            serde_json::to_string_pretty(report)
        } else {
            serde_json::to_string(report)
        };
        s.with_context(|| "serialize validation report")
    }
}
