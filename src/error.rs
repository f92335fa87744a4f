//! Error handling module for snapback
//!
//! Every failure a backup run can hit is one variant of [`BackupError`].
//! All variants except [`BackupError::PruneWarning`] are fatal: the run stops
//! at the point of detection and the process exits non-zero.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for a backup run
#[derive(Error, Debug)]
pub enum BackupError {
    /// The profile-specific configuration file does not exist
    #[error("profile configuration not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// A configuration value is missing or malformed
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The process is running with superuser identity
    #[error("refusing to run as root; run as the owner of the storage root")]
    PrivilegeError,

    /// The transfer credential file does not exist
    #[error("credential file not found: {}", .0.display())]
    CredentialMissing(PathBuf),

    /// The storage root is not on a snapshot-capable filesystem
    #[error("unsupported storage: {0}")]
    UnsupportedStorage(String),

    /// The storage root is not owned by the invoking user
    #[error("permission error: {0}")]
    PermissionError(String),

    /// A container, staging subvolume or log directory could not be created
    #[error("storage initialization failed: {0}")]
    StorageInitError(String),

    /// A path exists but is not a valid subvolume; never repaired automatically
    #[error("corrupt storage: {} exists but is not a subvolume", .0.display())]
    CorruptStorage(PathBuf),

    /// Every configured source failed to transfer
    #[error("transfer failed: none of {attempted} source(s) transferred successfully")]
    TransferFailed { attempted: usize },

    /// The read-only snapshot of the staging area could not be created
    #[error("snapshot creation failed: {0}")]
    SnapshotCreateFailed(String),

    /// A single retention deletion failed; logged, never escalated
    #[error("prune warning: {0}")]
    PruneWarning(String),

    /// IO errors while setting up run logs
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for snapback operations
pub type Result<T> = std::result::Result<T, BackupError>;

impl BackupError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    /// Create a storage initialization error
    pub fn storage_init(msg: impl Into<String>) -> Self {
        Self::StorageInitError(msg.into())
    }

    /// Create a snapshot creation error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::SnapshotCreateFailed(msg.into())
    }

    /// Create a prune warning
    pub fn prune(msg: impl Into<String>) -> Self {
        Self::PruneWarning(msg.into())
    }

    /// Whether this error aborts the run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::PruneWarning(_))
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() { 1 } else { 0 }
    }
}
