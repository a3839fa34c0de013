use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;

/// Captured result of a finished child process.
#[derive(Clone, Debug)]
pub struct CmdOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs `program` with `args` in `dir` and captures its output. Only a
/// failure to spawn is an error; a non-zero exit is reported in the output.
pub fn capture(dir: &Path, program: &str, args: &[String]) -> std::io::Result<CmdOutput> {
    tracing::info!(program, ?args, dir = %dir.display(), "running command");
    let out = Command::new(program).args(args).current_dir(dir).output()?;
    let output = CmdOutput {
        code: out.status.code(),
        stdout: String::from_utf8_lossy(&out.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
    };
    for line in output.stdout.lines() {
        tracing::debug!(program, "{line}");
    }
    for line in output.stderr.lines() {
        tracing::debug!(program, stream = "stderr", "{line}");
    }
    Ok(output)
}

pub fn run_cmd(dir: &Path, program: &str, args: &[String]) -> Result<String> {
    let out = capture(dir, program, args).with_context(|| format!("run {} {:?}", program, args))?;
    if !out.success() {
        return Err(anyhow!(
            "command failed: {} {:?} (code {:?})\nstdout:{}\nstderr:{}",
            program,
            args,
            out.code,
            out.stdout,
            out.stderr
        ));
    }
    Ok(out.stdout)
}

/// Expands `~` and environment references in a configured path.
pub fn expand_path(raw: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(shellexpand::tilde(raw).to_string())
}

pub fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}
