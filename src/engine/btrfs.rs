//! `btrfs`-backed [`SnapshotEngine`].

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::{ContainerState, SnapshotEngine};
use crate::tool_runner::run_tool;
use crate::tools::btrfs::BtrfsArgs;

#[derive(Debug, Clone, Copy, Default)]
pub struct BtrfsEngine;

impl BtrfsEngine {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, args: BtrfsArgs, context: &str) -> Result<()> {
        run_tool(&args)?.ensure_success(context)
    }
}

impl SnapshotEngine for BtrfsEngine {
    fn create_container(&self, path: &Path) -> Result<()> {
        self.run(
            BtrfsArgs::CreateSubvolume { path: path.to_path_buf() },
            "btrfs subvolume create",
        )
    }

    fn inspect(&self, path: &Path) -> Result<ContainerState> {
        if fs::symlink_metadata(path).is_err() {
            return Ok(ContainerState::Missing);
        }
        let output = run_tool(&BtrfsArgs::ShowSubvolume { path: path.to_path_buf() })?;
        if output.success {
            Ok(ContainerState::Valid)
        } else {
            debug!("{} is not a subvolume: {}", path.display(), output.stderr.trim());
            Ok(ContainerState::Invalid)
        }
    }

    fn create_readonly_snapshot(&self, source: &Path, dest: &Path) -> Result<()> {
        self.run(
            BtrfsArgs::Snapshot {
                source: source.to_path_buf(),
                dest: dest.to_path_buf(),
                readonly: true,
            },
            "btrfs subvolume snapshot",
        )
    }

    fn clear_readonly(&self, path: &Path) -> Result<()> {
        self.run(
            BtrfsArgs::SetReadOnly { path: path.to_path_buf(), readonly: false },
            "btrfs property set",
        )
    }

    fn delete(&self, path: &Path) -> Result<()> {
        self.run(
            BtrfsArgs::DeleteSubvolume { path: path.to_path_buf() },
            "btrfs subvolume delete",
        )
    }

    fn list_entries(&self, container: &Path) -> Result<Vec<String>> {
        let entries = fs::read_dir(container)
            .with_context(|| format!("Failed to list {}", container.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to list {}", container.display()))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}
