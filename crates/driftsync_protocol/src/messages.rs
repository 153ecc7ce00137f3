//! Protocol messages for the sync endpoints.

use crate::change::{Change, ChangeId};
use crate::clock::VectorClock;
use crate::conflict::ResolutionChoice;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /sync/changes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushChangesRequest {
    /// Pending local changes, in record order.
    pub changes: Vec<Change>,
    /// The sender's current vector clock.
    pub vector_clock: VectorClock,
}

impl PushChangesRequest {
    /// Creates a new push request.
    pub fn new(changes: Vec<Change>, vector_clock: VectorClock) -> Self {
        Self {
            changes,
            vector_clock,
        }
    }
}

/// Response body for `POST /sync/changes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushChangesResponse {
    /// Conflicts the server detected; empty on a clean sync.
    #[serde(default)]
    pub conflicts: Vec<ConflictDescriptor>,
    /// The server's merged vector clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_clock: Option<VectorClock>,
}

impl PushChangesResponse {
    /// Creates a clean response carrying the server's clock.
    pub fn clean(vector_clock: VectorClock) -> Self {
        Self {
            conflicts: Vec::new(),
            vector_clock: Some(vector_clock),
        }
    }

    /// Creates a response reporting conflicts.
    pub fn conflicted(conflicts: Vec<ConflictDescriptor>) -> Self {
        Self {
            conflicts,
            vector_clock: None,
        }
    }

    /// Returns true if the server accepted every change.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// A conflict the server reports for one pushed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDescriptor {
    /// The pushed change that conflicted.
    pub change_id: ChangeId,
    /// The resource involved.
    pub resource_id: String,
    /// The resource's type.
    pub resource_type: String,
    /// The server's current value for the resource, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_value: Option<Value>,
    /// Optional human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Request body for `POST /sync/resolve-conflict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    /// The conflicted change.
    pub change_id: ChangeId,
    /// Which side wins.
    pub resolution: ResolutionChoice,
}

/// Response body for `POST /sync/resolve-conflict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictResponse {
    /// True once the server has recorded the resolution.
    pub acknowledged: bool,
}
