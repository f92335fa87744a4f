//! Profile resolution
//!
//! A profile is assembled from two layered `KEY=VALUE` files: the shared
//! `default.conf` (optional, read first) and `profiles/<name>.conf`
//! (required, read second). Later assignments win, except `SRC`, which
//! accumulates across both layers in read order. Defaults fill in keys that
//! neither layer assigns.
//!
//! Resolution is pure: it reads the two files and nothing else.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{BackupError, Result};

/// Shared defaults file, relative to the base directory
pub const DEFAULTS_FILE: &str = "default.conf";

/// Directory holding one `<name>.conf` per profile
pub const PROFILES_DIR: &str = "profiles";

/// Name of the staging subvolume inside a profile container
pub const STAGING_NAME: &str = "current";

/// Default values applied when a key is absent from both layers
pub mod defaults {
    /// Recursive, preserve everything, delete extraneous, one hour I/O timeout
    pub const TRANSFER_OPTIONS: &[&str] = &["-aHAX", "--numeric-ids", "--delete", "--timeout=3600"];
    /// The filesystem's recovery directory is never worth transferring
    pub const EXCLUDE_PATTERNS: &[&str] = &["lost+found"];
    pub const KEEP_DAYS: f64 = 30.0;
    pub const KEEP_LONG_COUNT: u32 = 4;
}

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Fully resolved backup profile
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    /// Remote paths in transfer order; duplicates are kept
    pub sources: Vec<String>,
    pub server: String,
    pub user: String,
    pub credential_path: PathBuf,
    pub storage_root: PathBuf,
    pub log_dir: PathBuf,
    pub transfer_options: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub keep_days: f64,
    pub keep_long_count: u32,
}

impl Profile {
    /// Retention window truncated to whole seconds.
    ///
    /// Epochs are integers, so `L + floor(K) < N` holds exactly when
    /// `L + K < N` does, and likewise for the Short cutoff.
    pub fn keep_seconds(&self) -> i64 {
        (self.keep_days * SECONDS_PER_DAY).floor() as i64
    }

    /// `{storage_root}/{name}`: holds the staging area and all snapshots
    pub fn container_path(&self) -> PathBuf {
        self.storage_root.join(&self.name)
    }

    /// `{storage_root}/{name}/current`
    pub fn staging_path(&self) -> PathBuf {
        self.container_path().join(STAGING_NAME)
    }
}

/// Parse `KEY=VALUE` lines.
///
/// Comments, blank lines and lines without a well-formed key are skipped.
/// One pair of matching surrounding quotes is stripped from the value.
pub fn parse_config_lines(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            let well_formed = !key.is_empty()
                && key.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
            if !well_formed {
                debug!("Ignoring malformed config line: {}", line);
                return None;
            }
            Some((key.to_string(), strip_quotes(value.trim()).to_string()))
        })
        .collect()
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Accumulated assignments from all layers read so far
#[derive(Debug, Default)]
struct Layers {
    sources: Vec<String>,
    values: BTreeMap<String, String>,
}

impl Layers {
    fn apply(&mut self, pairs: Vec<(String, String)>) {
        for (key, value) in pairs {
            if key == "SRC" {
                if !value.is_empty() {
                    self.sources.push(value);
                }
            } else {
                self.values.insert(key, value);
            }
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn text(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    fn list_or(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.get(key) {
            Some(value) => value.split_whitespace().map(str::to_string).collect(),
            None => default.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Resolves profile names against a base directory
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    base_dir: PathBuf,
}

impl ProfileResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn defaults_path(&self) -> PathBuf {
        self.base_dir.join(DEFAULTS_FILE)
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(PROFILES_DIR).join(format!("{}.conf", name))
    }

    /// Resolve `name` into a complete [`Profile`].
    ///
    /// # Errors
    ///
    /// - `ConfigNotFound` if the profile file does not exist
    /// - `ConfigInvalid` for an unusable profile name, an unreadable file,
    ///   or a malformed `KEEP_DAYS` / `KEEP_LONG_COUNT`
    pub fn resolve(&self, name: &str) -> Result<Profile> {
        validate_profile_name(name)?;

        let mut layers = Layers::default();

        let defaults_path = self.defaults_path();
        match fs::read_to_string(&defaults_path) {
            Ok(content) => layers.apply(parse_config_lines(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No shared defaults at {}", defaults_path.display());
            }
            Err(e) => {
                return Err(BackupError::config(format!(
                    "cannot read {}: {}",
                    defaults_path.display(),
                    e
                )));
            }
        }

        let profile_path = self.profile_path(name);
        match fs::read_to_string(&profile_path) {
            Ok(content) => layers.apply(parse_config_lines(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BackupError::ConfigNotFound(profile_path));
            }
            Err(e) => {
                return Err(BackupError::config(format!(
                    "cannot read {}: {}",
                    profile_path.display(),
                    e
                )));
            }
        }

        self.build(name, layers)
    }

    fn build(&self, name: &str, layers: Layers) -> Result<Profile> {
        let server = layers.text("SERVER");
        let user = layers.text("USER");

        let credential_path = match layers.get("SSH_KEY") {
            Some(path) => PathBuf::from(path),
            None => self.base_dir.join("keys").join(format!("{}@{}", user, server)),
        };
        let log_dir = match layers.get("LOG_DIR") {
            Some(path) => PathBuf::from(path),
            None => self.base_dir.join("log").join(name),
        };

        let keep_days = match layers.get("KEEP_DAYS") {
            Some(raw) => parse_keep_days(raw)?,
            None => defaults::KEEP_DAYS,
        };
        let keep_long_count = match layers.get("KEEP_LONG_COUNT") {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                BackupError::config(format!(
                    "KEEP_LONG_COUNT must be a non-negative integer, got '{}'",
                    raw
                ))
            })?,
            None => defaults::KEEP_LONG_COUNT,
        };

        Ok(Profile {
            name: name.to_string(),
            sources: layers.sources.clone(),
            server,
            user,
            credential_path,
            storage_root: PathBuf::from(layers.text("STORAGE")),
            log_dir,
            transfer_options: layers.list_or("RSYNC_OPTS", defaults::TRANSFER_OPTIONS),
            exclude_patterns: layers.list_or("RSYNC_EXCLUDE", defaults::EXCLUDE_PATTERNS),
            keep_days,
            keep_long_count,
        })
    }
}

fn validate_profile_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(BackupError::config(format!("invalid profile name '{}'", name)));
    }
    Ok(())
}

fn parse_keep_days(raw: &str) -> Result<f64> {
    match raw.parse::<f64>() {
        Ok(days) if days.is_finite() && days >= 0.0 => Ok(days),
        _ => Err(BackupError::config(format!(
            "KEEP_DAYS must be a non-negative number, got '{}'",
            raw
        ))),
    }
}
