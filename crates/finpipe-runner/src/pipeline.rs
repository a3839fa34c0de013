//! End-to-end batch run: extract/load, transform, test, validate, notify.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use finpipe_core::{PipelineRunId, Value, ValidationReport};
use finpipe_warehouse::{Connector, Session};
use serde::{Deserialize, Serialize};

use crate::collaborators::{CommandLoader, FsObjectStore, LogNotifier, Notifier, ObjectStore, RawLoader};
use crate::config::Config;
use crate::transform::{DbtRunner, TransformRequest, TransformationRunner};
use crate::validator::Validator;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub full_refresh: bool,
    pub skip_extract_load: bool,
    pub skip_tests: bool,
    pub generate_docs: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub run_id: PipelineRunId,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Present once the validation step ran.
    pub validation: Option<ValidationReport>,
    pub error: Option<String>,
    pub succeeded: bool,
}

impl PipelineOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.succeeded {
            0
        } else {
            1
        }
    }
}

/// Everything the pipeline needs besides its collaborators.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub name: String,
    pub raw_file: PathBuf,
    pub object_prefix: String,
    /// Transformation selectors, run in order.
    pub selectors: Vec<String>,
    pub test_selector: Option<String>,
    pub schema: String,
    pub fact_table: String,
    pub success_recipients: Vec<String>,
    pub failure_recipients: Vec<String>,
}

impl PipelineSettings {
    pub fn from_config(cfg: &Config, root: &Path) -> Self {
        Self {
            name: cfg.project.name.clone(),
            raw_file: cfg.raw_file_path(root),
            object_prefix: cfg.pipeline.object_prefix.clone(),
            selectors: cfg.transform.selectors.clone(),
            test_selector: cfg.transform.test_selector.clone(),
            schema: cfg.warehouse.schema.clone(),
            fact_table: cfg.warehouse_schema().fact.table,
            success_recipients: cfg.notify.success_recipients.clone(),
            failure_recipients: cfg.notify.failure_recipients.clone(),
        }
    }
}

pub struct Pipeline {
    settings: PipelineSettings,
    validator: Validator,
    transformer: Box<dyn TransformationRunner>,
    store: Box<dyn ObjectStore>,
    loader: Box<dyn RawLoader>,
    notifier: Box<dyn Notifier>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        validator: Validator,
        transformer: Box<dyn TransformationRunner>,
        store: Box<dyn ObjectStore>,
        loader: Box<dyn RawLoader>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            validator,
            transformer,
            store,
            loader,
            notifier,
        }
    }

    /// dbt, a local object store, the configured load command and log notifications.
    pub fn from_config(cfg: &Config, root: &Path) -> Result<Self> {
        Ok(Self::new(
            PipelineSettings::from_config(cfg, root),
            cfg.validator(root)?,
            Box::new(DbtRunner::new(cfg.transform.program.clone(), cfg.transform_dir(root))),
            Box::new(FsObjectStore::new(cfg.object_store_root(root))),
            Box::new(CommandLoader::new(cfg.pipeline.load_command.clone(), root.to_path_buf())),
            Box::new(LogNotifier),
        ))
    }

    pub fn run(&self, options: &PipelineOptions) -> PipelineOutcome {
        self.run_on(options, Local::now().date_naive())
    }

    /// Runs with `today` as the reference date for the incremental window.
    pub fn run_on(&self, options: &PipelineOptions, today: NaiveDate) -> PipelineOutcome {
        let run_id = PipelineRunId::new();
        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(run_id = %run_id, pipeline = %self.settings.name, ?options, "pipeline started");

        let mut validation = None;
        let result = self.execute(options, today, &mut validation);
        let duration_ms = clock.elapsed().as_millis() as u64;

        let outcome = PipelineOutcome {
            run_id,
            started_at,
            duration_ms,
            validation,
            succeeded: result.is_ok(),
            error: result.err().map(|e| format!("{e:#}")),
        };
        match &outcome.error {
            None => tracing::info!(run_id = %outcome.run_id, duration_ms, "pipeline completed successfully"),
            Some(error) => tracing::error!(run_id = %outcome.run_id, duration_ms, %error, "pipeline failed"),
        }
        self.send_notification(&outcome);
        outcome
    }

    fn execute(
        &self,
        options: &PipelineOptions,
        today: NaiveDate,
        validation: &mut Option<ValidationReport>,
    ) -> Result<()> {
        if options.skip_extract_load {
            tracing::info!("skipping extract and load");
        } else {
            self.extract_load().context("data extraction and loading failed")?;
        }

        let incremental_start_date = if options.full_refresh {
            None
        } else {
            Some(determine_incremental_date(
                self.validator.connector(),
                &self.settings.schema,
                &self.settings.fact_table,
                today,
            ))
        };

        self.transformer
            .compile()
            .context("transformation project failed to compile")?;
        for selector in &self.settings.selectors {
            let request = TransformRequest {
                selector: selector.clone(),
                full_refresh: options.full_refresh,
                incremental_start_date,
            };
            self.transformer
                .run(&request)
                .with_context(|| format!("transformation `{selector}` failed"))?;
        }

        if options.skip_tests {
            tracing::info!("skipping transformation tests");
        } else if let Err(err) = self.transformer.test(self.settings.test_selector.as_deref()) {
            tracing::warn!(error = %err, "transformation tests failed, continuing");
        }

        let report = self.validator.run_all();
        let verdict = match (&report.aborted, report.overall_passed) {
            (Some(reason), _) => Err(anyhow!("validation aborted: {reason}")),
            (None, false) => Err(anyhow!(
                "validation failed: {} critical check(s) failed",
                report.summary().failed
            )),
            (None, true) => Ok(()),
        };
        *validation = Some(report);
        verdict?;

        if options.generate_docs {
            if let Err(err) = self.transformer.generate_docs() {
                tracing::warn!(error = %err, "documentation generation failed, continuing");
            }
        }
        Ok(())
    }

    fn extract_load(&self) -> Result<()> {
        let raw = &self.settings.raw_file;
        if !raw.is_file() {
            return Err(anyhow!("raw data file not found: {}", raw.display()));
        }
        let key = FsObjectStore::key_for(&self.settings.object_prefix, raw)?;
        let location = self.store.upload(raw, &key).context("upload raw file")?;
        tracing::info!(%location, "raw file staged");
        self.loader.load(raw)
    }

    fn send_notification(&self, outcome: &PipelineOutcome) {
        let when = outcome.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
        let seconds = outcome.duration_ms as f64 / 1000.0;
        let (subject, body, recipients) = match &outcome.error {
            None => (
                format!("{} pipeline completed successfully", self.settings.name),
                format!("The {} pipeline ran successfully at {when}.\nDuration: {seconds:.2} seconds.", self.settings.name),
                &self.settings.success_recipients,
            ),
            Some(error) => (
                format!("{} pipeline failed", self.settings.name),
                format!(
                    "The {} pipeline failed at {when}.\nDuration: {seconds:.2} seconds.\nError: {error}",
                    self.settings.name
                ),
                &self.settings.failure_recipients,
            ),
        };
        if let Err(err) = self.notifier.notify(&subject, &body, recipients) {
            tracing::warn!(error = %err, "failed to send notification");
        }
    }
}

/// Start of the incremental window: the latest `load_date` in the fact table,
/// or yesterday when there is none or it cannot be read.
pub fn determine_incremental_date(connector: &dyn Connector, schema: &str, fact_table: &str, today: NaiveDate) -> NaiveDate {
    let yesterday = today.pred_opt().unwrap_or(today);
    match last_load_date(connector, schema, fact_table) {
        Ok(Some(date)) => {
            tracing::info!(%date, "using incremental start date");
            date
        }
        Ok(None) => {
            tracing::info!(date = %yesterday, "no previous load date found, defaulting to yesterday");
            yesterday
        }
        Err(err) => {
            tracing::warn!(error = %err, date = %yesterday, "could not determine incremental date, defaulting to yesterday");
            yesterday
        }
    }
}

fn last_load_date(connector: &dyn Connector, schema: &str, fact_table: &str) -> Result<Option<NaiveDate>> {
    let mut session = Session::open(connector)?;
    let table = session.execute(&format!(
        "SELECT MAX(load_date) AS last_load_date FROM {schema}.{fact_table}"
    ))?;
    match table.value(0, "last_load_date") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(s)) => {
            let day = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map(Some)
                .with_context(|| format!("parse load date `{s}`"))
        }
        Some(other) => Err(anyhow!("unexpected load date value `{other}`")),
    }
}
