//! Type-safe domain enums for snapback
//!
//! Snapshot classes and transfer outcomes are closed sets, so they are
//! modelled as enums with strum-derived string conversions instead of
//! string prefixes scattered through the code.

use strum::{Display, EnumIter, EnumString};

/// Retention class of a snapshot, encoded as the name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Display, EnumString, EnumIter)]
pub enum SnapshotClass {
    /// Rate-limited to roughly one per retention window, kept by count
    #[strum(serialize = "Long")]
    Long,
    /// Taken on every other run, kept by age
    #[strum(serialize = "Short")]
    Short,
}

/// Classification of one source transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum TransferOutcome {
    /// Clean exit
    Success,
    /// Incomplete but tolerated (vanished files, max-delete, timeout with progress)
    PartialAcceptable,
    /// Any other exit status, or the tool could not be started
    Failed,
}

impl TransferOutcome {
    /// Whether this outcome counts towards the "at least one source" rule
    pub fn counts_as_success(&self) -> bool {
        matches!(self, Self::Success | Self::PartialAcceptable)
    }
}
