//! Causally-stamped mutation records.

use crate::clock::{DeviceId, VectorClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a recorded change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(Uuid);

impl ChangeId {
    /// Generates a fresh random change ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for ChangeId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Kind of mutation a change records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    /// A resource was created.
    Create,
    /// A resource was updated.
    Update,
    /// A resource was deleted.
    Delete,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOperation::Create => f.write_str("create"),
            ChangeOperation::Update => f.write_str("update"),
            ChangeOperation::Delete => f.write_str("delete"),
        }
    }
}

/// A single local mutation, stamped with its causal context.
///
/// Changes are created by the change tracker, live in a pending set
/// until the remote authority confirms them, and are never structurally
/// removed: a deletion is itself a change with `operation = Delete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Unique change ID.
    pub id: ChangeId,
    /// When the change was recorded.
    pub timestamp: DateTime<Utc>,
    /// Kind of mutation.
    pub operation: ChangeOperation,
    /// The resource this change affects.
    pub resource_id: String,
    /// The resource's type (collection name).
    pub resource_type: String,
    /// Value before the mutation, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<Value>,
    /// Value after the mutation (absent for deletes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    /// The user who made the mutation.
    pub user_id: String,
    /// The device that recorded the mutation.
    pub device_id: DeviceId,
    /// Device-local monotonic counter, starting at 1 with no gaps.
    pub version: u64,
    /// Snapshot of the device's vector clock at record time.
    pub vector_clock: VectorClock,
    /// Set once the remote authority has confirmed the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    /// Changes this one causally depends on.
    pub parent_change_ids: Vec<ChangeId>,
    /// Content hash for cheap tamper/duplicate detection.
    pub hash: String,
}

impl Change {
    /// Computes the deterministic content hash over the fields that
    /// identify a mutation: operation, resource ID, and both values.
    ///
    /// SHA-256 over a canonical JSON rendering, hex-encoded and
    /// truncated to 16 bytes.
    pub fn content_hash(
        operation: ChangeOperation,
        resource_id: &str,
        new_value: Option<&Value>,
        previous_value: Option<&Value>,
    ) -> String {
        // serde_json maps are ordered, so the rendering is canonical.
        let canonical = json!({
            "operation": operation,
            "resourceId": resource_id,
            "newValue": new_value,
            "previousValue": previous_value,
        });
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        digest[..16].iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Returns true if the stored hash matches the recorded values.
    pub fn verify_hash(&self) -> bool {
        self.hash
            == Self::content_hash(
                self.operation,
                &self.resource_id,
                self.new_value.as_ref(),
                self.previous_value.as_ref(),
            )
    }

    /// Returns true if the change has not yet been confirmed remotely.
    pub fn is_pending(&self) -> bool {
        self.applied_at.is_none()
    }

    /// Marks the change as confirmed by the remote authority.
    pub fn mark_applied(&mut self, when: DateTime<Utc>) {
        self.applied_at = Some(when);
    }
}
