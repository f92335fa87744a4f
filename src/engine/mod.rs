//! Storage engine interface.
//!
//! The copy-on-write filesystem is an external collaborator. Everything the
//! backup pipeline needs from it is expressed by [`SnapshotEngine`]; the
//! production implementation drives the `btrfs` tool.

pub mod btrfs;

use anyhow::Result;
use std::path::Path;

pub use btrfs::BtrfsEngine;

/// What lives at a path that should hold a subvolume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Nothing exists at the path
    Missing,
    /// A subvolume exists at the path
    Valid,
    /// Something exists at the path but it is not a subvolume
    Invalid,
}

/// Snapshot-capable storage operations.
///
/// Implementations hold no state about snapshots; every call observes the
/// filesystem as it is now.
pub trait SnapshotEngine {
    /// Create an empty writable subvolume at `path`.
    fn create_container(&self, path: &Path) -> Result<()>;

    /// Report whether `path` is missing, a subvolume, or something else.
    fn inspect(&self, path: &Path) -> Result<ContainerState>;

    /// Create a read-only snapshot of `source` at `dest`.
    fn create_readonly_snapshot(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Clear the read-only property so the snapshot can be deleted.
    fn clear_readonly(&self, path: &Path) -> Result<()>;

    /// Delete the subvolume at `path`.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Names of the entries directly inside `container`.
    fn list_entries(&self, container: &Path) -> Result<Vec<String>>;
}
