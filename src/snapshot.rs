//! Snapshot naming, enumeration and creation.
//!
//! Snapshots live next to the staging area as `Long_<epoch>` and
//! `Short_<epoch>`. The epoch is the run's start time, so names sort by
//! creation time within a class. Anything in the container whose name does
//! not parse (including `current`) is not a snapshot and is left alone.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::info;

use crate::engine::SnapshotEngine;
use crate::error::{BackupError, Result};
use crate::run::RunContext;
use crate::types::SnapshotClass;

/// `{class}_{epoch}` snapshot name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotName {
    pub class: SnapshotClass,
    pub epoch: i64,
}

impl SnapshotName {
    pub fn new(class: SnapshotClass, epoch: i64) -> Self {
        Self { class, epoch }
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.class, self.epoch)
    }
}

impl FromStr for SnapshotName {
    type Err = ();

    /// Accepts only `Long_<digits>` / `Short_<digits>`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (prefix, digits) = s.split_once('_').ok_or(())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(());
        }
        let class = prefix.parse::<SnapshotClass>().map_err(|_| ())?;
        let epoch = digits.parse::<i64>().map_err(|_| ())?;
        Ok(Self { class, epoch })
    }
}

/// A snapshot found in a profile container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub name: SnapshotName,
    pub path: PathBuf,
}

/// List the snapshots of one class in `container`, oldest first.
///
/// Always asks the engine; callers must not hold on to the result across
/// storage mutations.
pub fn list_snapshots(
    engine: &dyn SnapshotEngine,
    container: &Path,
    class: SnapshotClass,
) -> anyhow::Result<Vec<SnapshotEntry>> {
    let mut entries: Vec<SnapshotEntry> = engine
        .list_entries(container)?
        .iter()
        .filter_map(|raw| raw.parse::<SnapshotName>().ok())
        .filter(|name| name.class == class)
        .map(|name| SnapshotEntry { name, path: container.join(name.to_string()) })
        .collect();
    entries.sort_by_key(|entry| entry.name.epoch);
    Ok(entries)
}

/// Decide the class of the snapshot taken at `now`.
///
/// Long iff the newest Long snapshot (`last_long`, 0 when there is none) is
/// strictly older than the retention window and Long snapshots are kept at
/// all.
pub fn classify(
    last_long: i64,
    keep_seconds: i64,
    now: i64,
    keep_long_count: u32,
) -> SnapshotClass {
    if keep_long_count > 0 && last_long.saturating_add(keep_seconds) < now {
        SnapshotClass::Long
    } else {
        SnapshotClass::Short
    }
}

/// Creates the one snapshot of a run
pub struct SnapshotManager<'a> {
    engine: &'a dyn SnapshotEngine,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(engine: &'a dyn SnapshotEngine) -> Self {
        Self { engine }
    }

    /// Snapshot `current` read-only into the container.
    ///
    /// # Errors
    ///
    /// `SnapshotCreateFailed` if the Long listing or the snapshot itself fails.
    pub fn create(&self, ctx: &RunContext) -> Result<SnapshotEntry> {
        let longs = list_snapshots(self.engine, &ctx.sync_to, SnapshotClass::Long).map_err(|e| {
            BackupError::snapshot(format!("cannot enumerate Long snapshots: {:#}", e))
        })?;
        let last_long = longs.last().map(|entry| entry.name.epoch).unwrap_or(0);

        let class = classify(
            last_long,
            ctx.keep_seconds,
            ctx.epoch,
            ctx.profile.keep_long_count,
        );
        let name = SnapshotName::new(class, ctx.epoch);
        let path = ctx.sync_to.join(name.to_string());

        self.engine
            .create_readonly_snapshot(&ctx.sync_to_current, &path)
            .map_err(|e| BackupError::snapshot(format!("{}: {:#}", path.display(), e)))?;

        info!("Created snapshot {} (last Long at {})", name, last_long);
        Ok(SnapshotEntry { name, path })
    }
}
