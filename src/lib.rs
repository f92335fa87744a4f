//! snapback
//!
//! Periodic, incremental remote-to-local backups: rsync pulls each source
//! into a btrfs staging subvolume, a read-only snapshot is taken, and a
//! two-tier (Long / Short) retention policy prunes old snapshots.

pub mod cli;
pub mod engine;
pub mod error;
pub mod logging;
pub mod process_guard;
pub mod profile;
pub mod retention;
pub mod run;
pub mod sanity;
pub mod snapshot;
pub mod tool_args;
pub mod tool_runner;
pub mod tools;
pub mod transfer;
pub mod types;

pub use engine::{BtrfsEngine, ContainerState, SnapshotEngine};
pub use error::{BackupError, Result};
pub use profile::{Profile, ProfileResolver};
pub use retention::{
    plan_prune, PruneOutcome, PruneRecord, PruneReport, RetentionPolicy, RetentionPruner,
};
pub use run::{Collaborators, RunContext, RunController, RunSummary};
pub use sanity::{HostProbe, PreconditionValidator, SystemProbe};
pub use snapshot::{classify, SnapshotEntry, SnapshotManager, SnapshotName};
pub use transfer::{
    RsyncTransfer, TransferOrchestrator, TransferRecord, TransferRequest, TransferTool,
};
pub use types::{SnapshotClass, TransferOutcome};
