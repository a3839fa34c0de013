//! Side-effecting pipeline steps behind traits: object storage, raw loading
//! and notification delivery.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::util::run_cmd;

pub trait ObjectStore {
    /// Stores `local` under `key` and returns where it landed.
    fn upload(&self, local: &Path, key: &str) -> Result<String>;
}

pub trait RawLoader {
    /// Loads a raw extract into the warehouse's raw area.
    fn load(&self, file: &Path) -> Result<()>;
}

pub trait Notifier {
    fn notify(&self, subject: &str, body: &str, recipients: &[String]) -> Result<()>;
}

/// Local directory standing in for a bucket.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    pub root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// `<prefix>/<file name>`, the layout raw extracts are stored under.
    pub fn key_for(prefix: &str, file: &Path) -> Result<String> {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("no file name in {}", file.display()))?;
        let prefix = prefix.trim_matches('/');
        Ok(if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        })
    }
}

impl ObjectStore for FsObjectStore {
    fn upload(&self, local: &Path, key: &str) -> Result<String> {
        if key.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(anyhow!("invalid object key `{key}`"));
        }
        let dest = self.root.join(key);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let bytes = std::fs::copy(local, &dest)
            .with_context(|| format!("copy {} to {}", local.display(), dest.display()))?;
        tracing::info!(key, bytes, dest = %dest.display(), "uploaded raw file");
        Ok(dest.display().to_string())
    }
}

/// Runs a configured command with `{file}` replaced by the raw file path.
#[derive(Clone, Debug)]
pub struct CommandLoader {
    pub argv: Vec<String>,
    pub workdir: PathBuf,
}

impl CommandLoader {
    pub fn new(argv: Vec<String>, workdir: PathBuf) -> Self {
        Self { argv, workdir }
    }
}

impl RawLoader for CommandLoader {
    fn load(&self, file: &Path) -> Result<()> {
        if !file.is_file() {
            return Err(anyhow!("raw data file not found: {}", file.display()));
        }
        let (program, args) = self.argv.split_first().ok_or_else(|| anyhow!("load command is empty"))?;
        let path = file.display().to_string();
        let args: Vec<String> = args.iter().map(|a| a.replace("{file}", &path)).collect();
        run_cmd(&self.workdir, program, &args).with_context(|| format!("load {}", file.display()))?;
        tracing::info!(file = %path, "raw data loaded");
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str, recipients: &[String]) -> Result<()> {
        tracing::info!(subject, recipients = %recipients.join(", "), "would send notification");
        for line in body.lines() {
            tracing::info!("  {line}");
        }
        Ok(())
    }
}
