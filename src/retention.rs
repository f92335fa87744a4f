//! Two-tier retention.
//!
//! - Long snapshots: keep the newest `keep_long_count`, delete the rest.
//! - Short snapshots: delete those whose epoch is before `now - keep_seconds`.
//!
//! Planning is pure ([`plan_prune`]); execution ([`RetentionPruner`]) is
//! best-effort: a candidate that cannot be deleted is recorded and the loop
//! moves on. Pruning never escalates to a fatal error.

use tracing::{info, warn};

use crate::engine::SnapshotEngine;
use crate::error::BackupError;
use crate::run::RunContext;
use crate::snapshot::{list_snapshots, SnapshotEntry, SnapshotName};
use crate::types::SnapshotClass;

/// Retention parameters evaluated at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub now: i64,
    pub keep_seconds: i64,
    pub keep_long_count: u32,
}

impl RetentionPolicy {
    /// Short snapshots with an epoch strictly below this are expired
    pub fn short_cutoff(&self) -> i64 {
        self.now.saturating_sub(self.keep_seconds)
    }
}

/// Select the snapshots to delete.
///
/// `longs` and `shorts` must each be sorted oldest first. `protected` (the
/// snapshot created by this run) is never selected.
pub fn plan_prune(
    longs: &[SnapshotEntry],
    shorts: &[SnapshotEntry],
    policy: &RetentionPolicy,
    protected: Option<&SnapshotName>,
) -> Vec<SnapshotEntry> {
    let excess = longs.len().saturating_sub(policy.keep_long_count as usize);
    let cutoff = policy.short_cutoff();

    longs[..excess]
        .iter()
        .chain(shorts.iter().filter(|entry| entry.name.epoch < cutoff))
        .filter(|entry| Some(&entry.name) != protected)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    Deleted,
    /// The read-only flag could not be cleared; deletion was not attempted
    ClearReadOnlyFailed(String),
    DeleteFailed(String),
}

/// `(target, outcome)` pair for one deletion candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneRecord {
    pub target: SnapshotEntry,
    pub outcome: PruneOutcome,
}

#[derive(Debug, Default)]
pub struct PruneReport {
    pub records: Vec<PruneRecord>,
    /// Every non-fatal problem met while pruning, already logged
    pub warnings: Vec<BackupError>,
}

impl PruneReport {
    pub fn deleted(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == PruneOutcome::Deleted)
            .count()
    }

    fn warn(&mut self, warning: BackupError) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// Deletes snapshots outside the retention policy
pub struct RetentionPruner<'a> {
    engine: &'a dyn SnapshotEngine,
}

impl<'a> RetentionPruner<'a> {
    pub fn new(engine: &'a dyn SnapshotEngine) -> Self {
        Self { engine }
    }

    /// Enumerate, plan and delete. `created` is the snapshot of this run.
    pub fn prune(&self, ctx: &RunContext, created: Option<&SnapshotName>) -> PruneReport {
        let policy = RetentionPolicy {
            now: ctx.epoch,
            keep_seconds: ctx.keep_seconds,
            keep_long_count: ctx.profile.keep_long_count,
        };
        let mut report = PruneReport::default();

        let listing = |class: SnapshotClass, report: &mut PruneReport| {
            list_snapshots(self.engine, &ctx.sync_to, class).unwrap_or_else(|e| {
                report.warn(BackupError::prune(format!(
                    "cannot enumerate {} snapshots: {:#}",
                    class, e
                )));
                Vec::new()
            })
        };
        let longs = listing(SnapshotClass::Long, &mut report);
        let shorts = listing(SnapshotClass::Short, &mut report);

        for target in plan_prune(&longs, &shorts, &policy, created) {
            let outcome = self.delete_one(&target);
            match &outcome {
                PruneOutcome::Deleted => info!("Pruned snapshot {}", target.name),
                PruneOutcome::ClearReadOnlyFailed(reason) => report.warn(BackupError::prune(
                    format!("cannot clear read-only flag on {}: {}", target.name, reason),
                )),
                PruneOutcome::DeleteFailed(reason) => report.warn(BackupError::prune(format!(
                    "cannot delete {}: {}",
                    target.name, reason
                ))),
            }
            report.records.push(PruneRecord { target, outcome });
        }

        report
    }

    fn delete_one(&self, target: &SnapshotEntry) -> PruneOutcome {
        if let Err(e) = self.engine.clear_readonly(&target.path) {
            return PruneOutcome::ClearReadOnlyFailed(format!("{:#}", e));
        }
        match self.engine.delete(&target.path) {
            Ok(()) => PruneOutcome::Deleted,
            Err(e) => PruneOutcome::DeleteFailed(format!("{:#}", e)),
        }
    }
}
