//! Versioned snapshots derived from change history.

use crate::change::Change;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resource snapshot together with the change history it derives from.
///
/// Records are derived on demand by the change tracker and can be
/// rebuilt from their own history by the validator's repair path.
///
/// Invariant: `deleted == true` implies replaying `changes` yields no
/// data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedRecord {
    /// Resource ID.
    pub id: String,
    /// Current data, absent when the resource is deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Count of known changes.
    pub version: u64,
    /// Timestamp of the newest change.
    pub last_modified: DateTime<Utc>,
    /// User behind the newest change.
    pub last_modified_by: String,
    /// Full change history, in record order.
    pub changes: Vec<Change>,
    /// True when the newest change deleted the resource.
    pub deleted: bool,
    /// True when a conflict on this record was resolved.
    pub conflict_resolved: bool,
}

impl VersionedRecord {
    /// Returns the newest change in the history, if any.
    pub fn latest_change(&self) -> Option<&Change> {
        self.changes.last()
    }
}
