use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use finpipe_checks::{QueryParams, Registry, RegistryOptions, WarehouseSchema, DEFAULT_TOLERANCE};
use finpipe_warehouse_sqlite::SqliteConnector;

use crate::util::expand_path;
use crate::validator::Validator;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    pub transform: TransformConfig,
    pub pipeline: PipelineConfig,
    pub notify: NotifyConfig,
    /// Replaces the built-in financial schema when present.
    #[serde(default)]
    pub schema: Option<WarehouseSchema>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub path: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    /// 0 disables the limit.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default)]
    pub tolerances: BTreeMap<String, f64>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            tolerances: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformConfig {
    pub program: String,
    pub project_dir: String,
    /// Run in order; the first failing selector stops the pipeline.
    pub selectors: Vec<String>,
    #[serde(default)]
    pub test_selector: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data_dir: String,
    pub raw_file: String,
    pub object_store_root: String,
    pub object_prefix: String,
    /// argv; `{file}` is replaced with the raw file path.
    pub load_command: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub success_recipients: Vec<String>,
    pub failure_recipients: Vec<String>,
}

fn default_schema() -> String {
    "staging".to_string()
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl Config {
    pub fn default_for_project(name: &str) -> Self {
        Self {
            project: ProjectConfig { name: name.to_string() },
            warehouse: WarehouseConfig {
                path: "data/financial_dw.db".to_string(),
                schema: default_schema(),
                query_timeout_ms: default_query_timeout_ms(),
            },
            validation: ValidationConfig::default(),
            transform: TransformConfig {
                program: "dbt".to_string(),
                project_dir: "financial_dbt".to_string(),
                selectors: vec!["dim_*".to_string(), "fact_*".to_string(), "marts".to_string()],
                test_selector: None,
            },
            pipeline: PipelineConfig {
                data_dir: "data".to_string(),
                raw_file: "raw_financials.csv".to_string(),
                object_store_root: "~/.finpipe/object-store".to_string(),
                object_prefix: "raw/financials".to_string(),
                load_command: [
                    "psql",
                    "-h",
                    "localhost",
                    "-U",
                    "postgres",
                    "-d",
                    "financial_dw",
                    "-c",
                    "\\COPY raw.raw_financials FROM '{file}' CSV HEADER",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            notify: NotifyConfig {
                success_recipients: vec!["data-alerts@example.com".to_string()],
                failure_recipients: vec!["data-alerts@example.com".to_string(), "data-team@example.com".to_string()],
            },
            schema: None,
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(".finpipe").join("finpipe.toml")
    }

    /// Loads the config at `root`, falling back to defaults named after the directory.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let path = Self::config_path(root);
        if path.exists() {
            return Self::load_from(&path);
        }
        let name = root.file_name().and_then(|s| s.to_str()).unwrap_or("finpipe");
        tracing::info!(path = %path.display(), "no config found, using defaults");
        Ok(Self::default_for_project(name))
    }

    pub fn warehouse_schema(&self) -> WarehouseSchema {
        self.schema.clone().unwrap_or_default()
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            default_tolerance: self.validation.tolerance,
            tolerances: self.validation.tolerances.clone(),
        }
    }

    pub fn registry(&self) -> Result<Registry> {
        Registry::from_schema(&self.warehouse_schema(), &self.registry_options()).with_context(|| "build check registry")
    }

    pub fn validator(&self, root: &Path) -> Result<Validator> {
        Ok(Validator::new(
            Box::new(self.connector(root)),
            self.registry()?,
            QueryParams::for_schema(self.warehouse.schema.clone()),
        ))
    }

    pub fn connector(&self, root: &Path) -> SqliteConnector {
        SqliteConnector::new(resolve(root, &self.warehouse.path), self.warehouse.schema.clone())
            .with_query_timeout(Duration::from_millis(self.warehouse.query_timeout_ms))
    }

    pub fn raw_file_path(&self, root: &Path) -> PathBuf {
        resolve(root, &self.pipeline.data_dir).join(&self.pipeline.raw_file)
    }

    pub fn transform_dir(&self, root: &Path) -> PathBuf {
        resolve(root, &self.transform.project_dir)
    }

    pub fn object_store_root(&self, root: &Path) -> PathBuf {
        resolve(root, &self.pipeline.object_store_root)
    }
}

/// Expands `~`, then anchors relative paths at the project root.
pub fn resolve(root: &Path, raw: &str) -> PathBuf {
    let p = expand_path(raw);
    if p.is_absolute() {
        p
    } else {
        root.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::config_path(dir.path());
        let cfg = Config::default_for_project("fin");
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.project.name, "fin");
        assert_eq!(loaded.warehouse.schema, "staging");
        assert_eq!(loaded.warehouse.query_timeout_ms, 30_000);
        assert_eq!(loaded.transform.selectors, vec!["dim_*", "fact_*", "marts"]);
        assert!(loaded.schema.is_none());
    }

    #[test]
    fn minimal_file_fills_defaults() {
        let src = r#"
            [project]
            name = "fin"

            [warehouse]
            path = "wh.db"

            [transform]
            program = "dbt"
            project_dir = "financial_dbt"
            selectors = ["dim_*"]

            [pipeline]
            data_dir = "data"
            raw_file = "raw.csv"
            object_store_root = "store"
            object_prefix = "raw/financials"
            load_command = ["true"]

            [notify]
            success_recipients = []
            failure_recipients = ["oncall@example.com"]
        "#;
        let cfg: Config = toml::from_str(src).unwrap();
        assert_eq!(cfg.warehouse.schema, "staging");
        assert_eq!(cfg.validation.tolerance, DEFAULT_TOLERANCE);
        assert!(cfg.transform.test_selector.is_none());
    }

    #[test]
    fn tolerance_overrides_reach_registry_options() {
        let mut cfg = Config::default_for_project("fin");
        cfg.validation.tolerance = 0.5;
        cfg.validation.tolerances.insert("segment_totals_match_fact".into(), 2.0);
        let opts = cfg.registry_options();
        assert_eq!(opts.tolerance_for("segment_totals_match_fact"), 2.0);
        assert_eq!(opts.tolerance_for("monthly_sales_totals_match_fact"), 0.5);
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let cfg = Config::default_for_project("fin");
        let root = Path::new("/srv/fin");
        assert_eq!(cfg.raw_file_path(root), PathBuf::from("/srv/fin/data/raw_financials.csv"));
        assert_eq!(cfg.connector(root).path(), Path::new("/srv/fin/data/financial_dw.db"));
        assert_eq!(resolve(root, "/abs/wh.db"), PathBuf::from("/abs/wh.db"));
    }
}
