//! Type-safe external tool execution
//!
//! All `btrfs` and `rsync` invocations go through this module so that every
//! child is spawned in its own process group and is tracked by the
//! [`ChildRegistry`](crate::process_guard::ChildRegistry) while it runs.

use crate::process_guard::{CommandProcessGroup, RegisteredChild};
use crate::tool_args::ToolArgs;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Output from a captured tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl ToolOutput {
    /// Return an error carrying stderr if the tool did not exit cleanly.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            anyhow::bail!(
                "{} failed (exit code {}): {}",
                context,
                self.exit_code.unwrap_or(-1),
                self.stderr.trim()
            )
        }
    }
}

fn build_command<T: ToolArgs>(args: &T) -> Command {
    let mut cmd = Command::new(args.program());
    cmd.args(args.to_cli_args())
        .stdin(Stdio::null())
        .in_new_process_group();
    cmd
}

/// Run a tool and capture its stdout and stderr.
///
/// A non-zero exit is reported through [`ToolOutput::success`], not as an
/// error; `Err` means the tool could not be started or waited for.
pub fn run_tool<T: ToolArgs>(args: &T) -> Result<ToolOutput> {
    debug!("run_tool: {}", args.display_command());

    let child = build_command(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn {}", args.program()))?;
    let _registered = RegisteredChild::new(child.id());

    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed waiting for {}", args.program()))?;

    Ok(ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
        success: output.status.success(),
    })
}

/// Run a tool with stdout and stderr appended to `log_file`.
///
/// Returns the raw exit code; a signal-terminated child yields `None`.
pub fn run_tool_logged<T: ToolArgs>(args: &T, log_file: &Path) -> Result<Option<i32>> {
    info!("Running: {}", args.display_command());

    let log = open_append(log_file)?;
    let log_err = log
        .try_clone()
        .with_context(|| format!("Failed to duplicate handle for {}", log_file.display()))?;

    let mut child = build_command(args)
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .spawn()
        .with_context(|| format!("Failed to spawn {}", args.program()))?;
    let _registered = RegisteredChild::new(child.id());

    let status = child
        .wait()
        .with_context(|| format!("Failed waiting for {}", args.program()))?;

    Ok(status.code())
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}
