//! Change tracking over an injectable store.

use crate::error::{CoreError, CoreResult};
use crate::store::ChangeStore;
use chrono::Utc;
use driftsync_protocol::{
    Change, ChangeId, ChangeOperation, DeviceId, VectorClock, VersionedRecord,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Records every local mutation as a causally-stamped `Change`.
///
/// The tracker owns the process vector clock exclusively: recording a
/// change increments the local device's entry and stamps the change
/// with a snapshot of the full clock. Per-device version numbers are
/// therefore strictly increasing from 1 with no gaps.
///
/// Callers serialize calls per resource; recording is synchronous and
/// ordered relative to callers.
pub struct ChangeTracker {
    store: Arc<dyn ChangeStore>,
    device_id: DeviceId,
    user_id: String,
    clock: Mutex<VectorClock>,
}

impl ChangeTracker {
    /// Creates a tracker for the given device and user over a store.
    pub fn new(store: Arc<dyn ChangeStore>, device_id: DeviceId, user_id: impl Into<String>) -> Self {
        Self {
            store,
            device_id,
            user_id: user_id.into(),
            clock: Mutex::new(VectorClock::new()),
        }
    }

    /// Records a local mutation and returns the stored change.
    pub fn record_change(
        &self,
        operation: ChangeOperation,
        resource_id: impl Into<String>,
        resource_type: impl Into<String>,
        new_value: Option<Value>,
        previous_value: Option<Value>,
        parent_change_ids: Vec<ChangeId>,
    ) -> CoreResult<Change> {
        let resource_id = resource_id.into();
        let resource_type = resource_type.into();

        // Increment and snapshot under one lock so concurrent recorders
        // cannot observe the same version.
        let (version, vector_clock) = {
            let mut clock = self.clock.lock();
            let version = clock.increment(&self.device_id);
            (version, clock.clone())
        };

        let hash = Change::content_hash(
            operation,
            &resource_id,
            new_value.as_ref(),
            previous_value.as_ref(),
        );

        let change = Change {
            id: ChangeId::generate(),
            timestamp: Utc::now(),
            operation,
            resource_id,
            resource_type,
            previous_value,
            new_value,
            user_id: self.user_id.clone(),
            device_id: self.device_id.clone(),
            version,
            vector_clock,
            applied_at: None,
            parent_change_ids,
            hash,
        };

        debug!(
            change = %change.id,
            resource = %change.resource_id,
            op = %change.operation,
            version,
            "recorded change"
        );

        self.store.insert(change.clone())?;
        Ok(change)
    }

    /// Applies a change to a current value, returning the new value.
    ///
    /// Pure: Create/Update yield the change's `new_value`, Delete
    /// yields nothing. The current value is accepted for call-site
    /// symmetry when replaying histories.
    pub fn apply_change(change: &Change, _current: Option<Value>) -> Option<Value> {
        match change.operation {
            ChangeOperation::Create | ChangeOperation::Update => change.new_value.clone(),
            ChangeOperation::Delete => None,
        }
    }

    /// Derives a versioned snapshot for a resource.
    ///
    /// The version is the count of known changes (minimum 1 so a fresh
    /// resource starts versioned).
    pub fn snapshot(
        &self,
        resource_id: &str,
        data: Option<Value>,
        resource_type: &str,
    ) -> CoreResult<VersionedRecord> {
        let changes = self.store.history(resource_id, resource_type)?;
        let version = changes.len().max(1) as u64;

        let (last_modified, last_modified_by) = match changes.last() {
            Some(latest) => (latest.timestamp, latest.user_id.clone()),
            None => (Utc::now(), self.user_id.clone()),
        };
        let deleted = matches!(
            changes.last().map(|c| c.operation),
            Some(ChangeOperation::Delete)
        );

        Ok(VersionedRecord {
            id: resource_id.to_string(),
            data,
            version,
            last_modified,
            last_modified_by,
            changes,
            deleted,
            conflict_resolved: false,
        })
    }

    /// Returns the change history for a resource, in record order.
    pub fn change_history(&self, resource_id: &str, resource_type: &str) -> CoreResult<Vec<Change>> {
        self.store.history(resource_id, resource_type)
    }

    /// Returns all changes awaiting remote confirmation.
    pub fn pending_changes(&self) -> CoreResult<Vec<Change>> {
        self.store.pending()
    }

    /// Marks a change as confirmed by the remote authority.
    pub fn mark_applied(&self, id: &ChangeId) -> CoreResult<()> {
        if self.store.mark_applied(id, Utc::now())? {
            Ok(())
        } else {
            Err(CoreError::UnknownChange { id: *id })
        }
    }

    /// Merges a remote vector clock into the local clock.
    ///
    /// Pointwise maximum: idempotent and commutative, safe to call
    /// repeatedly and in any order.
    pub fn merge_remote_clock(&self, remote: &VectorClock) {
        self.clock.lock().merge(remote);
    }

    /// Returns a snapshot of the current vector clock.
    pub fn vector_clock(&self) -> VectorClock {
        self.clock.lock().clone()
    }

    /// Returns this tracker's device ID.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }
}
