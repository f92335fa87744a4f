//! Pre-flight checks for a backup run
//!
//! Verifies, in order and fail-fast, that:
//! - the process is not running as root
//! - the profile names at least one source, a server, a user and a storage root
//! - the transfer credential exists
//! - the storage root is on btrfs and owned by the invoking user
//! - the profile container and its `current` staging subvolume exist,
//!   creating them when absent
//!
//! Nothing here creates snapshots. The only side effects are the log
//! directory and the two subvolumes above.

use std::env;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use anyhow::Result as AnyResult;
use tracing::{debug, info, warn};

use crate::engine::{ContainerState, SnapshotEngine};
use crate::error::{BackupError, Result};
use crate::profile::Profile;

/// Filesystem type the storage root must live on
pub const REQUIRED_FILESYSTEM: &str = "btrfs";

/// Binaries the run shells out to; absence is reported, not fatal here
const RUNTIME_BINARIES: &[&str] = &["btrfs", "rsync", "ssh"];

/// Identity and filesystem queries about the host
pub trait SystemProbe {
    /// Effective user id of this process
    fn current_uid(&self) -> u32;

    /// Owner uid of `path`
    fn owner_uid(&self, path: &Path) -> AnyResult<u32>;

    /// Filesystem type name of the mount holding `path` (e.g. `"btrfs"`)
    fn filesystem_type(&self, path: &Path) -> AnyResult<String>;

    /// Whether `path` exists
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// [`SystemProbe`] backed by the running host
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl SystemProbe for HostProbe {
    fn current_uid(&self) -> u32 {
        nix::unistd::geteuid().as_raw()
    }

    fn owner_uid(&self, path: &Path) -> AnyResult<u32> {
        Ok(fs::metadata(path)?.uid())
    }

    fn filesystem_type(&self, path: &Path) -> AnyResult<String> {
        use nix::sys::statfs::{statfs, BTRFS_SUPER_MAGIC};

        let fs_type = statfs(path)?.filesystem_type();
        if fs_type == BTRFS_SUPER_MAGIC {
            Ok(REQUIRED_FILESYSTEM.to_string())
        } else {
            Ok(format!("{:?}", fs_type))
        }
    }
}

/// Runs the ordered checks for one profile
pub struct PreconditionValidator<'a> {
    probe: &'a dyn SystemProbe,
    engine: &'a dyn SnapshotEngine,
}

impl<'a> PreconditionValidator<'a> {
    pub fn new(probe: &'a dyn SystemProbe, engine: &'a dyn SnapshotEngine) -> Self {
        Self { probe, engine }
    }

    /// Run every check in order, stopping at the first violation.
    pub fn validate(&self, profile: &Profile) -> Result<()> {
        debug!("Running pre-flight checks for profile '{}'", profile.name);

        self.check_identity()?;
        check_required_settings(profile)?;
        self.check_credential(profile)?;
        self.check_storage_root(profile)?;

        for binary in missing_binaries() {
            warn!("Required binary not found in PATH: {}", binary);
        }

        fs::create_dir_all(&profile.log_dir).map_err(|e| {
            BackupError::storage_init(format!(
                "cannot create log directory {}: {}",
                profile.log_dir.display(),
                e
            ))
        })?;

        self.ensure_container(&profile.container_path())?;
        self.ensure_container(&profile.staging_path())?;

        info!("Pre-flight checks passed for profile '{}'", profile.name);
        Ok(())
    }

    fn check_identity(&self) -> Result<()> {
        if self.probe.current_uid() == 0 {
            return Err(BackupError::PrivilegeError);
        }
        Ok(())
    }

    fn check_credential(&self, profile: &Profile) -> Result<()> {
        if !self.probe.exists(&profile.credential_path) {
            return Err(BackupError::CredentialMissing(profile.credential_path.clone()));
        }
        Ok(())
    }

    fn check_storage_root(&self, profile: &Profile) -> Result<()> {
        let root = &profile.storage_root;

        let fs_type = self.probe.filesystem_type(root).map_err(|e| {
            BackupError::UnsupportedStorage(format!("cannot stat {}: {}", root.display(), e))
        })?;
        if fs_type != REQUIRED_FILESYSTEM {
            return Err(BackupError::UnsupportedStorage(format!(
                "{} is on {}, not {}",
                root.display(),
                fs_type,
                REQUIRED_FILESYSTEM
            )));
        }

        let uid = self.probe.current_uid();
        let owner = self.probe.owner_uid(root).map_err(|e| {
            BackupError::PermissionError(format!("cannot read owner of {}: {}", root.display(), e))
        })?;
        if owner != uid {
            return Err(BackupError::PermissionError(format!(
                "{} is owned by uid {}, not by uid {}",
                root.display(),
                owner,
                uid
            )));
        }
        Ok(())
    }

    /// Create the subvolume at `path` if absent; never repair a bad one.
    fn ensure_container(&self, path: &Path) -> Result<()> {
        let state = self.engine.inspect(path).map_err(|e| {
            BackupError::storage_init(format!("cannot inspect {}: {:#}", path.display(), e))
        })?;

        match state {
            ContainerState::Valid => Ok(()),
            ContainerState::Invalid => Err(BackupError::CorruptStorage(path.to_path_buf())),
            ContainerState::Missing => {
                info!("Creating subvolume {}", path.display());
                self.engine.create_container(path).map_err(|e| {
                    BackupError::storage_init(format!("cannot create {}: {:#}", path.display(), e))
                })
            }
        }
    }
}

/// Checks (b) and (c): at least one source, non-empty server, user and storage
pub fn check_required_settings(profile: &Profile) -> Result<()> {
    if profile.sources.is_empty() {
        return Err(BackupError::config(format!(
            "profile '{}' has no SRC entries",
            profile.name
        )));
    }

    let required = [
        ("SERVER", profile.server.trim().is_empty()),
        ("USER", profile.user.trim().is_empty()),
        ("STORAGE", profile.storage_root.as_os_str().is_empty()),
    ];
    for (key, missing) in required {
        if missing {
            return Err(BackupError::config(format!(
                "profile '{}' does not set {}",
                profile.name, key
            )));
        }
    }
    Ok(())
}

fn binary_exists(name: &str) -> bool {
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir: PathBuf| dir.join(name).is_file()))
        .unwrap_or(false)
}

/// Runtime binaries not found in `PATH`
pub fn missing_binaries() -> Vec<&'static str> {
    RUNTIME_BINARIES
        .iter()
        .copied()
        .filter(|b| !binary_exists(b))
        .collect()
}
