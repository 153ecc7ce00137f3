//! Observable sync engine state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No sync in progress, nothing blocking.
    Idle,
    /// A round trip to the remote authority is outstanding.
    Syncing,
    /// The server reported conflicts; progress is blocked until they
    /// are resolved.
    Conflict,
    /// The last round trip failed; pending changes are retained.
    Error,
    /// The engine is stopped until `start()` is called again.
    Stopped,
}

impl SyncStatus {
    /// Returns true if the status blocks further automatic syncs.
    pub fn is_blocked(&self) -> bool {
        matches!(self, SyncStatus::Conflict | SyncStatus::Stopped)
    }
}

/// Snapshot of the engine's observable state.
///
/// Delivered to subscribers immediately on subscription and on every
/// subsequent change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Current lifecycle status.
    pub status: SyncStatus,
    /// When the last clean sync completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    /// Number of changes awaiting confirmation at the last check.
    pub pending_changes: usize,
    /// Conflicts outstanding from the last round trip.
    pub conflict_count: usize,
    /// Completed sync cycles since construction.
    pub sync_count: u64,
    /// Message from the last failed round trip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
    /// Whether the engine currently believes it is online.
    pub is_online: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            last_sync: None,
            pending_changes: 0,
            conflict_count: 0,
            sync_count: 0,
            sync_error: None,
            is_online: true,
        }
    }
}

/// Result of one `sync()` invocation.
///
/// Cloneable so overlapping callers can share the outcome of a single
/// round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The server confirmed the pushed changes (possibly zero).
    Applied {
        /// Number of changes confirmed.
        changes: usize,
    },
    /// The server reported conflicts; nothing was marked applied.
    Conflicted {
        /// Number of conflicts reported.
        conflicts: usize,
    },
    /// The engine is offline; nothing was sent.
    Offline,
    /// The engine is stopped; nothing was sent.
    Stopped,
    /// The round trip failed; pending changes are retained.
    Failed {
        /// The failure message, mirrored in `SyncState::sync_error`.
        message: String,
    },
}

impl SyncOutcome {
    /// Returns true if the sync completed cleanly.
    pub fn is_applied(&self) -> bool {
        matches!(self, SyncOutcome::Applied { .. })
    }
}
