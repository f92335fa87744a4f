//! Source-to-staging transfers.
//!
//! Each configured source is pulled into the staging area in order. Every
//! attempt is classified by exit code; a failed source is recorded and the
//! batch continues. The run only fails when no source transferred at all.

use std::path::{Path, PathBuf};

use anyhow::Result as AnyResult;
use tracing::{error, info, warn};

use crate::error::{BackupError, Result};
use crate::run::RunContext;
use crate::tool_runner::run_tool_logged;
use crate::tools::rsync::RsyncArgs;
use crate::types::TransferOutcome;

/// Clean exit of the transfer tool
pub const SUCCESS_EXIT_CODE: i32 = 0;

/// Exit codes that leave a usable, if incomplete, staging area:
/// 24 vanished source files, 25 max-delete limit, 30 timeout after progress
pub const ACCEPTED_PARTIAL_EXIT_CODES: &[i32] = &[24, 25, 30];

/// Map a raw exit code to an outcome. `None` (signal or spawn failure) is Failed.
pub fn classify_exit(code: Option<i32>) -> TransferOutcome {
    match code {
        Some(SUCCESS_EXIT_CODE) => TransferOutcome::Success,
        Some(code) if ACCEPTED_PARTIAL_EXIT_CODES.contains(&code) => {
            TransferOutcome::PartialAcceptable
        }
        _ => TransferOutcome::Failed,
    }
}

/// One pull of one remote path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Remote operand, `user@server:path`
    pub remote: String,
    pub destination: PathBuf,
    pub options: Vec<String>,
    pub excludes: Vec<String>,
    pub credential: PathBuf,
    pub log_file: PathBuf,
}

/// Delta transfer tool
pub trait TransferTool {
    /// Run one transfer and return its exit code (`None` if killed by a signal).
    fn transfer(&self, request: &TransferRequest) -> AnyResult<Option<i32>>;
}

/// [`TransferTool`] that runs `rsync` over ssh
#[derive(Debug, Clone, Copy, Default)]
pub struct RsyncTransfer;

impl TransferTool for RsyncTransfer {
    fn transfer(&self, request: &TransferRequest) -> AnyResult<Option<i32>> {
        let args = RsyncArgs {
            options: request.options.clone(),
            excludes: request.excludes.clone(),
            credential: request.credential.clone(),
            remote: request.remote.clone(),
            destination: request.destination.clone(),
        };
        run_tool_logged(&args, &request.log_file)
    }
}

/// Typed result of one source transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub source: String,
    pub outcome: TransferOutcome,
    pub raw_code: Option<i32>,
}

/// Normalise trailing separators.
///
/// A single source transfers its contents (`/data/` syncs into `current/`);
/// several sources each become a named entry (`/data` syncs to `current/data`).
pub fn normalize_sources(sources: &[String]) -> Vec<String> {
    if let [only] = sources {
        let mut source = only.clone();
        if !source.ends_with('/') {
            source.push('/');
        }
        return vec![source];
    }

    sources
        .iter()
        .map(|source| {
            let trimmed = source.trim_end_matches('/');
            if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() }
        })
        .collect()
}

/// Runs every source transfer for a run
pub struct TransferOrchestrator<'a> {
    tool: &'a dyn TransferTool,
}

impl<'a> TransferOrchestrator<'a> {
    pub fn new(tool: &'a dyn TransferTool) -> Self {
        Self { tool }
    }

    fn request(&self, ctx: &RunContext, source: &str) -> TransferRequest {
        let profile = &ctx.profile;
        TransferRequest {
            remote: format!("{}@{}:{}", profile.user, profile.server, source),
            destination: ctx.sync_to_current.clone(),
            options: profile.transfer_options.clone(),
            excludes: profile.exclude_patterns.clone(),
            credential: profile.credential_path.clone(),
            log_file: ctx.transfer_log.clone(),
        }
    }

    /// Transfer every source in order.
    ///
    /// # Errors
    ///
    /// `TransferFailed` if no source ended as Success or PartialAcceptable.
    pub fn run(&self, ctx: &RunContext) -> Result<Vec<TransferRecord>> {
        let sources = normalize_sources(&ctx.profile.sources);
        let mut records = Vec::with_capacity(sources.len());

        for source in sources {
            let request = self.request(ctx, &source);
            info!("Transferring {}", request.remote);

            let raw_code = match self.tool.transfer(&request) {
                Ok(code) => code,
                Err(e) => {
                    error!("Transfer of {} could not run: {:#}", source, e);
                    None
                }
            };
            let outcome = classify_exit(raw_code);
            match outcome {
                TransferOutcome::Success => info!("Transferred {}", source),
                TransferOutcome::PartialAcceptable => {
                    warn!("Partial transfer of {} (exit code {:?}), continuing", source, raw_code)
                }
                TransferOutcome::Failed => {
                    error!("Transfer of {} failed (exit code {:?})", source, raw_code)
                }
            }
            records.push(TransferRecord { source, outcome, raw_code });
        }

        if !records.iter().any(|r| r.outcome.counts_as_success()) {
            return Err(BackupError::TransferFailed { attempted: records.len() });
        }
        Ok(records)
    }
}

/// `{log_dir}/transfer.log.{epoch}`
pub fn transfer_log_path(log_dir: &Path, epoch: i64) -> PathBuf {
    log_dir.join(format!("transfer.log.{}", epoch))
}
