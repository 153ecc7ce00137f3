//! Change storage seam.

use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use driftsync_protocol::{Change, ChangeId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Append-only storage for recorded changes.
///
/// The tracker and engine operate against this trait so a host can
/// supply durable persistence. Changes are never removed: a deletion
/// is itself a change, and applied changes stay in history.
pub trait ChangeStore: Send + Sync {
    /// Appends a change.
    fn insert(&self, change: Change) -> CoreResult<()>;

    /// Looks up a change by ID.
    fn get(&self, id: &ChangeId) -> CoreResult<Option<Change>>;

    /// Returns the change history for a resource, in record order.
    fn history(&self, resource_id: &str, resource_type: &str) -> CoreResult<Vec<Change>>;

    /// Returns all changes not yet confirmed by the remote authority.
    fn pending(&self) -> CoreResult<Vec<Change>>;

    /// Sets `applied_at` on a change. Returns false if the ID is unknown.
    fn mark_applied(&self, id: &ChangeId, when: DateTime<Utc>) -> CoreResult<bool>;

    /// Returns the total number of stored changes.
    fn count(&self) -> CoreResult<usize>;
}

/// An in-memory change store.
///
/// Keeps changes in insertion order with an ID index. Suitable for
/// tests and hosts that persist elsewhere.
#[derive(Default)]
pub struct MemoryChangeStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    changes: Vec<Change>,
    index: HashMap<ChangeId, usize>,
}

impl MemoryChangeStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeStore for MemoryChangeStore {
    fn insert(&self, change: Change) -> CoreResult<()> {
        let mut inner = self.inner.write();
        let pos = inner.changes.len();
        inner.index.insert(change.id, pos);
        inner.changes.push(change);
        Ok(())
    }

    fn get(&self, id: &ChangeId) -> CoreResult<Option<Change>> {
        let inner = self.inner.read();
        Ok(inner
            .index
            .get(id)
            .and_then(|&pos| inner.changes.get(pos))
            .cloned())
    }

    fn history(&self, resource_id: &str, resource_type: &str) -> CoreResult<Vec<Change>> {
        let inner = self.inner.read();
        Ok(inner
            .changes
            .iter()
            .filter(|c| c.resource_id == resource_id && c.resource_type == resource_type)
            .cloned()
            .collect())
    }

    fn pending(&self) -> CoreResult<Vec<Change>> {
        let inner = self.inner.read();
        Ok(inner
            .changes
            .iter()
            .filter(|c| c.is_pending())
            .cloned()
            .collect())
    }

    fn mark_applied(&self, id: &ChangeId, when: DateTime<Utc>) -> CoreResult<bool> {
        let mut inner = self.inner.write();
        let Some(&pos) = inner.index.get(id) else {
            return Ok(false);
        };
        if let Some(change) = inner.changes.get_mut(pos) {
            change.mark_applied(when);
            return Ok(true);
        }
        Ok(false)
    }

    fn count(&self) -> CoreResult<usize> {
        Ok(self.inner.read().changes.len())
    }
}
