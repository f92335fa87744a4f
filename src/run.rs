//! Run controller
//!
//! One invocation is one pass through the pipeline:
//! resolve → validate → attach run log → transfer → snapshot → prune.
//! Any error up to and including snapshot creation ends the run; pruning
//! problems are reported in the summary only.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::engine::SnapshotEngine;
use crate::error::Result;
use crate::logging::{run_log_path, RunLog};
use crate::profile::{Profile, ProfileResolver};
use crate::retention::{PruneReport, RetentionPruner};
use crate::sanity::{PreconditionValidator, SystemProbe};
use crate::snapshot::{SnapshotEntry, SnapshotManager};
use crate::transfer::{transfer_log_path, TransferOrchestrator, TransferRecord, TransferTool};

/// Wall-clock seconds since the Unix epoch
pub fn current_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Process exit status for a finished run: 0 once the snapshot exists,
/// even if some sources failed or pruning left warnings.
pub fn exit_status(outcome: &Result<RunSummary>) -> u8 {
    match outcome {
        Ok(_) => 0,
        Err(e) => u8::try_from(e.exit_code()).unwrap_or(1),
    }
}

/// Per-invocation state, fixed at run start and never persisted
#[derive(Debug, Clone)]
pub struct RunContext {
    pub profile: Profile,
    /// Run start; names the snapshot and both log files
    pub epoch: i64,
    pub keep_seconds: i64,
    /// `{storage_root}/{profile}`
    pub sync_to: PathBuf,
    /// `{storage_root}/{profile}/current`
    pub sync_to_current: PathBuf,
    pub run_log: PathBuf,
    pub transfer_log: PathBuf,
}

impl RunContext {
    pub fn new(profile: Profile, epoch: i64) -> Self {
        Self {
            keep_seconds: profile.keep_seconds(),
            sync_to: profile.container_path(),
            sync_to_current: profile.staging_path(),
            run_log: run_log_path(&profile.log_dir, epoch),
            transfer_log: transfer_log_path(&profile.log_dir, epoch),
            profile,
            epoch,
        }
    }
}

/// The external systems a run talks to
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub engine: &'a dyn SnapshotEngine,
    pub transfer: &'a dyn TransferTool,
    pub probe: &'a dyn SystemProbe,
}

/// What a completed run did
#[derive(Debug)]
pub struct RunSummary {
    pub snapshot: SnapshotEntry,
    pub transfers: Vec<TransferRecord>,
    pub prune: PruneReport,
}

impl RunSummary {
    pub fn sources_ok(&self) -> usize {
        self.transfers
            .iter()
            .filter(|r| r.outcome.counts_as_success())
            .count()
    }

    pub fn sources_failed(&self) -> usize {
        self.transfers.len() - self.sources_ok()
    }
}

pub struct RunController<'a> {
    resolver: ProfileResolver,
    backends: Collaborators<'a>,
    run_log: Option<RunLog>,
}

impl<'a> RunController<'a> {
    pub fn new(resolver: ProfileResolver, backends: Collaborators<'a>) -> Self {
        Self { resolver, backends, run_log: None }
    }

    /// Attach `run_log` to `{log_dir}/run.log.{epoch}` once validation passes.
    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = Some(run_log);
        self
    }

    /// Run one backup of `profile_name` stamped with `epoch`.
    pub fn run(&self, profile_name: &str, epoch: i64) -> Result<RunSummary> {
        let Collaborators { engine, transfer, probe } = self.backends;

        let profile = self.resolver.resolve(profile_name)?;
        PreconditionValidator::new(probe, engine).validate(&profile)?;

        let ctx = RunContext::new(profile, epoch);
        if let Some(run_log) = &self.run_log {
            run_log.attach(&ctx.run_log)?;
        }
        info!(
            "Starting backup of profile '{}' at epoch {} ({} source(s))",
            ctx.profile.name,
            ctx.epoch,
            ctx.profile.sources.len()
        );

        let transfers = TransferOrchestrator::new(transfer).run(&ctx)?;
        let snapshot = SnapshotManager::new(engine).create(&ctx)?;
        let prune = RetentionPruner::new(engine).prune(&ctx, Some(&snapshot.name));

        let summary = RunSummary { snapshot, transfers, prune };
        info!(
            "Backup of '{}' complete: {}, sources {} ok / {} failed, pruned {}, {} warning(s)",
            ctx.profile.name,
            summary.snapshot.name,
            summary.sources_ok(),
            summary.sources_failed(),
            summary.prune.deleted(),
            summary.prune.warnings.len()
        );
        Ok(summary)
    }
}
