//! Structural and causal validation of versioned records.

use crate::tracker::ChangeTracker;
use chrono::{DateTime, Duration, Utc};
use driftsync_protocol::{ChangeId, DeviceId, VersionedRecord};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationIssue {
    /// The record has an empty ID.
    #[error("record has no id")]
    MissingId,

    /// A device's version sequence is not contiguous from 1.
    #[error("device {device} version sequence broken: expected {expected}, found {found}")]
    VersionSequence {
        /// The device whose sequence broke.
        device: DeviceId,
        /// The version expected at this point.
        expected: u64,
        /// The version actually recorded.
        found: u64,
    },

    /// The record claims a modification time in the future.
    #[error("last modified {timestamp} is in the future")]
    FutureTimestamp {
        /// The offending timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A deleted record's history still reconstructs data.
    #[error("record is marked deleted but its history reconstructs data")]
    DeletedWithData,

    /// A change's stored hash does not match its recorded values.
    #[error("content hash mismatch on change {id}")]
    HashMismatch {
        /// The tampered or corrupted change.
        id: ChangeId,
    },
}

/// Outcome of validating a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// True when no issues were found.
    pub is_valid: bool,
    /// Every issue found, in check order.
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Checks structural/causal invariants of versioned records and
/// reconstructs their data by replaying change history.
///
/// Validation is non-fatal: issues come back as a structured report
/// and [`DataValidator::repair`] is offered as a recovery path, never
/// invoked automatically.
#[derive(Debug, Clone)]
pub struct DataValidator {
    skew_tolerance: Duration,
}

impl DataValidator {
    /// Creates a validator with the default clock-skew tolerance (5s).
    pub fn new() -> Self {
        Self {
            skew_tolerance: Duration::seconds(5),
        }
    }

    /// Sets the tolerance applied to the future-timestamp check.
    pub fn with_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.skew_tolerance = tolerance;
        self
    }

    /// Validates a record, returning every issue found.
    pub fn validate(&self, record: &VersionedRecord) -> ValidationReport {
        let mut errors = Vec::new();

        if record.id.is_empty() {
            errors.push(ValidationIssue::MissingId);
        }

        if record.last_modified > Utc::now() + self.skew_tolerance {
            errors.push(ValidationIssue::FutureTimestamp {
                timestamp: record.last_modified,
            });
        }

        // Each device's versions must count 1, 2, 3, ... in record order.
        let mut expected_by_device: HashMap<&DeviceId, u64> = HashMap::new();
        for change in &record.changes {
            let expected = expected_by_device.entry(&change.device_id).or_insert(1);
            if change.version != *expected {
                errors.push(ValidationIssue::VersionSequence {
                    device: change.device_id.clone(),
                    expected: *expected,
                    found: change.version,
                });
                // Resynchronize so one gap reports once.
                *expected = change.version + 1;
            } else {
                *expected += 1;
            }
        }

        if record.deleted && replay(record).is_some() {
            errors.push(ValidationIssue::DeletedWithData);
        }

        for change in &record.changes {
            if !change.verify_hash() {
                errors.push(ValidationIssue::HashMismatch { id: change.id });
            }
        }

        ValidationReport::from_issues(errors)
    }

    /// Rebuilds a record's data from its own change history.
    ///
    /// Replays `changes` in stored order and recomputes the version as
    /// `changes.len() + 1`. Used to recover a record whose cached data
    /// has drifted from its history; hashes are never rewritten.
    pub fn repair(&self, record: &VersionedRecord) -> VersionedRecord {
        let data = replay(record);
        let deleted = data.is_none() && !record.changes.is_empty();

        let (last_modified, last_modified_by) = match record.changes.last() {
            Some(latest) => (latest.timestamp, latest.user_id.clone()),
            None => (record.last_modified, record.last_modified_by.clone()),
        };

        debug!(record = %record.id, replayed = record.changes.len(), "repaired record");

        VersionedRecord {
            id: record.id.clone(),
            data,
            version: record.changes.len() as u64 + 1,
            last_modified,
            last_modified_by,
            changes: record.changes.clone(),
            deleted,
            conflict_resolved: record.conflict_resolved,
        }
    }
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn replay(record: &VersionedRecord) -> Option<Value> {
    record
        .changes
        .iter()
        .fold(None, |current, change| {
            ChangeTracker::apply_change(change, current)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_protocol::{Change, ChangeOperation, VectorClock};
    use serde_json::json;

    fn make_change(
        device: &str,
        version: u64,
        operation: ChangeOperation,
        new_value: Option<Value>,
    ) -> Change {
        let hash = Change::content_hash(operation, "note-1", new_value.as_ref(), None);
        Change {
            id: ChangeId::generate(),
            timestamp: Utc::now(),
            operation,
            resource_id: "note-1".into(),
            resource_type: "note".into(),
            previous_value: None,
            new_value,
            user_id: "user-1".into(),
            device_id: DeviceId::from(device),
            version,
            vector_clock: VectorClock::new(),
            applied_at: None,
            parent_change_ids: Vec::new(),
            hash,
        }
    }

    fn make_record(changes: Vec<Change>, data: Option<Value>, deleted: bool) -> VersionedRecord {
        VersionedRecord {
            id: "note-1".into(),
            data,
            version: changes.len().max(1) as u64,
            last_modified: Utc::now(),
            last_modified_by: "user-1".into(),
            changes,
            deleted,
            conflict_resolved: false,
        }
    }

    #[test]
    fn valid_record_passes() {
        let changes = vec![
            make_change("a", 1, ChangeOperation::Create, Some(json!({"n": 1}))),
            make_change("a", 2, ChangeOperation::Update, Some(json!({"n": 2}))),
        ];
        let record = make_record(changes, Some(json!({"n": 2})), false);

        let report = DataValidator::new().validate(&record);
        assert!(report.is_valid, "unexpected issues: {:?}", report.errors);
    }

    #[test]
    fn version_gap_is_reported() {
        let changes = vec![
            make_change("a", 1, ChangeOperation::Create, Some(json!({}))),
            make_change("a", 3, ChangeOperation::Update, Some(json!({}))),
        ];
        let record = make_record(changes, Some(json!({})), false);

        let report = DataValidator::new().validate(&record);
        assert!(!report.is_valid);
        assert!(matches!(
            report.errors[0],
            ValidationIssue::VersionSequence {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn version_starting_above_one_is_reported() {
        let changes = vec![make_change("a", 2, ChangeOperation::Create, Some(json!({})))];
        let record = make_record(changes, Some(json!({})), false);

        let report = DataValidator::new().validate(&record);
        assert!(!report.is_valid);
        assert!(matches!(
            report.errors[0],
            ValidationIssue::VersionSequence {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn devices_are_sequenced_independently() {
        let changes = vec![
            make_change("a", 1, ChangeOperation::Create, Some(json!({}))),
            make_change("b", 1, ChangeOperation::Update, Some(json!({}))),
            make_change("a", 2, ChangeOperation::Update, Some(json!({}))),
        ];
        let record = make_record(changes, Some(json!({})), false);

        let report = DataValidator::new().validate(&record);
        assert!(report.is_valid, "unexpected issues: {:?}", report.errors);
    }

    #[test]
    fn missing_id_is_reported() {
        let mut record = make_record(Vec::new(), None, false);
        record.id = String::new();

        let report = DataValidator::new().validate(&record);
        assert!(report.errors.contains(&ValidationIssue::MissingId));
    }

    #[test]
    fn future_timestamp_is_reported() {
        let mut record = make_record(Vec::new(), None, false);
        record.last_modified = Utc::now() + Duration::hours(1);

        let report = DataValidator::new().validate(&record);
        assert!(matches!(
            report.errors[0],
            ValidationIssue::FutureTimestamp { .. }
        ));
    }

    #[test]
    fn deleted_with_reconstructable_data_is_reported() {
        let changes = vec![make_change(
            "a",
            1,
            ChangeOperation::Create,
            Some(json!({"n": 1})),
        )];
        let record = make_record(changes, None, true);

        let report = DataValidator::new().validate(&record);
        assert!(report.errors.contains(&ValidationIssue::DeletedWithData));
    }

    #[test]
    fn hash_mismatch_is_reported() {
        let mut change = make_change("a", 1, ChangeOperation::Create, Some(json!({"n": 1})));
        change.new_value = Some(json!({"n": 999}));
        let id = change.id;
        let record = make_record(vec![change], Some(json!({"n": 999})), false);

        let report = DataValidator::new().validate(&record);
        assert!(report
            .errors
            .contains(&ValidationIssue::HashMismatch { id }));
    }

    #[test]
    fn repair_rebuilds_stale_data() {
        let changes = vec![
            make_change("a", 1, ChangeOperation::Create, Some(json!({"n": 1}))),
            make_change("a", 2, ChangeOperation::Update, Some(json!({"n": 2}))),
        ];
        // Cached data drifted from history.
        let record = make_record(changes, Some(json!({"n": 999})), false);

        let repaired = DataValidator::new().repair(&record);
        assert_eq!(repaired.data, Some(json!({"n": 2})));
        assert_eq!(repaired.version, 3);
        assert!(!repaired.deleted);
        assert_eq!(repaired.changes.len(), 2);
    }

    #[test]
    fn repair_after_trailing_delete_clears_data() {
        let changes = vec![
            make_change("a", 1, ChangeOperation::Create, Some(json!({"n": 1}))),
            make_change("a", 2, ChangeOperation::Delete, None),
        ];
        let record = make_record(changes, Some(json!({"n": 1})), false);

        let repaired = DataValidator::new().repair(&record);
        assert_eq!(repaired.data, None);
        assert!(repaired.deleted);
        assert_eq!(repaired.version, 3);
    }
}
