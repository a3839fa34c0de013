use std::path::PathBuf;

use chrono::NaiveDate;
use finpipe_core::TransformationError;

use crate::util::{capture, display_command};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformRequest {
    pub selector: String,
    pub full_refresh: bool,
    pub incremental_start_date: Option<NaiveDate>,
}

/// The SQL transformation engine that builds dimensions, facts and marts.
pub trait TransformationRunner {
    /// Parses the project without touching the warehouse.
    fn compile(&self) -> Result<(), TransformationError>;
    fn run(&self, request: &TransformRequest) -> Result<(), TransformationError>;
    /// `None` tests every model.
    fn test(&self, selector: Option<&str>) -> Result<(), TransformationError>;
    fn generate_docs(&self) -> Result<(), TransformationError>;
}

/// Drives the `dbt` command line inside a project directory.
#[derive(Clone, Debug)]
pub struct DbtRunner {
    pub program: String,
    pub project_dir: PathBuf,
}

impl DbtRunner {
    pub fn new(program: impl Into<String>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            project_dir: project_dir.into(),
        }
    }

    pub fn run_args(request: &TransformRequest) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--select".to_string(), request.selector.clone()];
        if request.full_refresh {
            args.push("--full-refresh".to_string());
        }
        if let Some(date) = request.incremental_start_date {
            args.push("--vars".to_string());
            args.push(format!("{{incremental_start_date: '{}'}}", date.format("%Y-%m-%d")));
        }
        args
    }

    pub fn test_args(selector: Option<&str>) -> Vec<String> {
        let mut args = vec!["test".to_string()];
        if let Some(selector) = selector {
            args.push("--select".to_string());
            args.push(selector.to_string());
        }
        args
    }

    fn invoke(&self, args: Vec<String>) -> Result<(), TransformationError> {
        let command = display_command(&self.program, &args);
        let out = capture(&self.project_dir, &self.program, &args).map_err(|e| TransformationError::Launch {
            program: self.program.clone(),
            reason: e.to_string(),
        })?;
        if !out.success() {
            tracing::error!(%command, code = ?out.code, "transformation command failed");
            return Err(TransformationError::Failed {
                command,
                code: out.code,
                stderr: if out.stderr.is_empty() { out.stdout } else { out.stderr },
            });
        }
        tracing::info!(%command, "transformation command completed");
        Ok(())
    }
}

impl TransformationRunner for DbtRunner {
    fn compile(&self) -> Result<(), TransformationError> {
        self.invoke(vec!["compile".to_string()])
    }

    fn run(&self, request: &TransformRequest) -> Result<(), TransformationError> {
        self.invoke(Self::run_args(request))
    }

    fn test(&self, selector: Option<&str>) -> Result<(), TransformationError> {
        self.invoke(Self::test_args(selector))
    }

    fn generate_docs(&self) -> Result<(), TransformationError> {
        self.invoke(vec!["docs".to_string(), "generate".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_run_passes_start_date_as_var() {
        let request = TransformRequest {
            selector: "fact_*".into(),
            full_refresh: false,
            incremental_start_date: NaiveDate::from_ymd_opt(2024, 3, 31),
        };
        assert_eq!(
            DbtRunner::run_args(&request),
            vec!["run", "--select", "fact_*", "--vars", "{incremental_start_date: '2024-03-31'}"]
        );
    }

    #[test]
    fn full_refresh_run() {
        let request = TransformRequest {
            selector: "dim_*".into(),
            full_refresh: true,
            incremental_start_date: None,
        };
        assert_eq!(DbtRunner::run_args(&request), vec!["run", "--select", "dim_*", "--full-refresh"]);
    }

    #[test]
    fn test_args_without_selector_test_everything() {
        assert_eq!(DbtRunner::test_args(None), vec!["test"]);
        assert_eq!(DbtRunner::test_args(Some("staging")), vec!["test", "--select", "staging"]);
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = DbtRunner::new("finpipe-no-such-dbt-binary", dir.path());
        assert!(matches!(runner.compile(), Err(TransformationError::Launch { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = DbtRunner::new("false", dir.path());
        match runner.generate_docs() {
            Err(TransformationError::Failed { command, code, .. }) => {
                assert_eq!(command, "false docs generate");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
