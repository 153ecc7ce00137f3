//! Pure three-way merge.
//!
//! Given a common ancestor and two divergent states, produce a merged
//! value plus field-level conflict markers. No internal state; every
//! function here is deterministic in its inputs.

use driftsync_protocol::{Change, ChangeId, ConflictMarker, MergeStrategy};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Inputs to a three-way merge.
#[derive(Debug, Clone)]
pub struct MergeContext {
    /// The common-ancestor state.
    pub base: Option<Value>,
    /// The locally diverged state.
    pub local: Option<Value>,
    /// The remotely diverged state.
    pub remote: Option<Value>,
    /// Local changes that produced `local` from `base`.
    pub local_changes: Vec<Change>,
    /// Remote changes that produced `remote` from `base`.
    pub remote_changes: Vec<Change>,
    /// Strategy applied to genuine three-way conflicts.
    pub strategy: MergeStrategy,
}

impl MergeContext {
    /// Creates a context with no attributed changes.
    pub fn new(
        base: Option<Value>,
        local: Option<Value>,
        remote: Option<Value>,
        strategy: MergeStrategy,
    ) -> Self {
        Self {
            base,
            local,
            remote,
            local_changes: Vec::new(),
            remote_changes: Vec::new(),
            strategy,
        }
    }

    /// Attributes the local divergence to these changes.
    pub fn with_local_changes(mut self, changes: Vec<Change>) -> Self {
        self.local_changes = changes;
        self
    }

    /// Attributes the remote divergence to these changes.
    pub fn with_remote_changes(mut self, changes: Vec<Change>) -> Self {
        self.remote_changes = changes;
        self
    }
}

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The merged object.
    pub merged: Value,
    /// Genuine three-way conflicts, one marker per field.
    pub conflicts: Vec<ConflictMarker>,
    /// Changes whose contribution made it into `merged`.
    pub applied_changes: Vec<ChangeId>,
    /// Changes whose contribution was overridden.
    pub discarded_changes: Vec<ChangeId>,
}

impl MergeOutcome {
    /// Returns true if no field needed conflict resolution.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Returns true iff base, local, and remote are pairwise distinct.
///
/// Whenever any two coincide the merge resolves mechanically and no
/// conflict exists.
pub fn detect_conflict(
    base: Option<&Value>,
    local: Option<&Value>,
    remote: Option<&Value>,
) -> bool {
    base != local && local != remote && base != remote
}

/// Merges two divergent states against their common ancestor.
///
/// Field-by-field over the union of fields in base, local, and remote:
/// a field changed on one side only takes that side silently; a field
/// changed identically on both sides takes the shared value; a field
/// where all three differ becomes a `ConflictMarker` resolved by the
/// context's strategy. `Manual` still populates the merged field (with
/// the automatic merge result) so the output is always usable.
pub fn merge(ctx: &MergeContext) -> MergeOutcome {
    let base = ctx.base.as_ref();
    let local = ctx.local.as_ref();
    let remote = ctx.remote.as_ref();

    let mut fields = BTreeSet::new();
    for state in [base, local, remote].into_iter().flatten() {
        if let Some(object) = state.as_object() {
            fields.extend(object.keys().cloned());
        }
    }

    let mut merged = Map::new();
    let mut conflicts = Vec::new();
    let mut applied = BTreeSet::new();
    let mut discarded = BTreeSet::new();

    for field in &fields {
        let b = field_of(base, field);
        let l = field_of(local, field);
        let r = field_of(remote, field);

        if l == r {
            // Unchanged, or both sides made the same edit.
            if let Some(value) = l {
                merged.insert(field.clone(), value.clone());
            }
            continue;
        }

        if l == b {
            // Remote-only edit.
            if let Some(value) = r {
                merged.insert(field.clone(), value.clone());
            }
            credit(&mut applied, &ctx.remote_changes);
            continue;
        }

        if r == b {
            // Local-only edit.
            if let Some(value) = l {
                merged.insert(field.clone(), value.clone());
            }
            credit(&mut applied, &ctx.local_changes);
            continue;
        }

        // All three differ.
        conflicts.push(ConflictMarker {
            field: field.clone(),
            base: b.cloned(),
            local: l.cloned(),
            remote: r.cloned(),
            resolution: ctx.strategy,
        });

        match ctx.strategy {
            MergeStrategy::Local => {
                if let Some(value) = l {
                    merged.insert(field.clone(), value.clone());
                }
                credit(&mut applied, &ctx.local_changes);
                credit(&mut discarded, &ctx.remote_changes);
            }
            MergeStrategy::Remote => {
                if let Some(value) = r {
                    merged.insert(field.clone(), value.clone());
                }
                credit(&mut applied, &ctx.remote_changes);
                credit(&mut discarded, &ctx.local_changes);
            }
            MergeStrategy::Merge | MergeStrategy::Manual => {
                let combined = match (l, r) {
                    (Some(lv), Some(rv)) => {
                        Some(smart_merge(b.unwrap_or(&Value::Null), lv, rv))
                    }
                    (Some(lv), None) => Some(lv.clone()),
                    (None, Some(rv)) => Some(rv.clone()),
                    (None, None) => None,
                };
                if let Some(value) = combined {
                    merged.insert(field.clone(), value);
                }
                credit(&mut applied, &ctx.local_changes);
                credit(&mut applied, &ctx.remote_changes);
            }
        }
    }

    MergeOutcome {
        merged: Value::Object(merged),
        conflicts,
        applied_changes: applied.into_iter().collect(),
        discarded_changes: discarded.into_iter().collect(),
    }
}

/// Structurally combines two divergent values.
///
/// Arrays merge to a deduplicated union ordered base-first, then
/// local-only additions, then remote-only additions. Objects recurse
/// field-by-field with the same three-case comparison as [`merge`],
/// keeping local on a nested genuine conflict. Scalars keep local.
pub fn smart_merge(base: &Value, local: &Value, remote: &Value) -> Value {
    match (local, remote) {
        (Value::Array(local_items), Value::Array(remote_items)) => {
            let mut union: Vec<Value> = Vec::new();
            if let Some(base_items) = base.as_array() {
                for item in base_items {
                    if !union.contains(item) {
                        union.push(item.clone());
                    }
                }
            }
            for item in local_items.iter().chain(remote_items) {
                if !union.contains(item) {
                    union.push(item.clone());
                }
            }
            Value::Array(union)
        }
        (Value::Object(local_map), Value::Object(remote_map)) => {
            let base_map = base.as_object();

            let mut fields: BTreeSet<String> = BTreeSet::new();
            if let Some(map) = base_map {
                fields.extend(map.keys().cloned());
            }
            fields.extend(local_map.keys().cloned());
            fields.extend(remote_map.keys().cloned());

            let mut merged = Map::new();
            for field in fields {
                let b = base_map.and_then(|m| m.get(&field));
                let l = local_map.get(&field);
                let r = remote_map.get(&field);

                let value = if l == r {
                    l.cloned()
                } else if l == b {
                    r.cloned()
                } else if r == b {
                    l.cloned()
                } else {
                    // Nested genuine conflict keeps local.
                    l.cloned().or_else(|| r.cloned())
                };
                if let Some(value) = value {
                    merged.insert(field, value);
                }
            }
            Value::Object(merged)
        }
        _ => local.clone(),
    }
}

fn field_of<'a>(state: Option<&'a Value>, field: &str) -> Option<&'a Value> {
    state.and_then(|v| v.as_object()).and_then(|m| m.get(field))
}

fn credit(set: &mut BTreeSet<ChangeId>, changes: &[Change]) {
    set.extend(changes.iter().map(|c| c.id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use driftsync_protocol::{ChangeOperation, DeviceId, VectorClock};
    use proptest::prelude::*;
    use serde_json::json;

    fn make_change(resource_id: &str) -> Change {
        Change {
            id: ChangeId::generate(),
            timestamp: Utc::now(),
            operation: ChangeOperation::Update,
            resource_id: resource_id.into(),
            resource_type: "note".into(),
            previous_value: None,
            new_value: None,
            user_id: "user-1".into(),
            device_id: DeviceId::from("device-a"),
            version: 1,
            vector_clock: VectorClock::new(),
            applied_at: None,
            parent_change_ids: Vec::new(),
            hash: String::new(),
        }
    }

    #[test]
    fn non_overlapping_edits_merge_silently() {
        let ctx = MergeContext::new(
            Some(json!({"a": 1, "b": 2})),
            Some(json!({"a": 1, "b": 3})),
            Some(json!({"a": 5, "b": 2})),
            MergeStrategy::Local,
        );

        let outcome = merge(&ctx);

        assert_eq!(outcome.merged, json!({"a": 5, "b": 3}));
        assert!(outcome.is_clean());
    }

    #[test]
    fn identical_edits_keep_shared_value() {
        let ctx = MergeContext::new(
            Some(json!({"x": 1})),
            Some(json!({"x": 9})),
            Some(json!({"x": 9})),
            MergeStrategy::Local,
        );

        let outcome = merge(&ctx);
        assert_eq!(outcome.merged, json!({"x": 9}));
        assert!(outcome.is_clean());
    }

    #[test]
    fn genuine_conflict_local_strategy() {
        let ctx = MergeContext::new(
            Some(json!({"x": "A"})),
            Some(json!({"x": "B"})),
            Some(json!({"x": "C"})),
            MergeStrategy::Local,
        );

        let outcome = merge(&ctx);

        assert_eq!(outcome.merged, json!({"x": "B"}));
        assert_eq!(outcome.conflicts.len(), 1);
        let marker = &outcome.conflicts[0];
        assert_eq!(marker.field, "x");
        assert_eq!(marker.base, Some(json!("A")));
        assert_eq!(marker.local, Some(json!("B")));
        assert_eq!(marker.remote, Some(json!("C")));
        assert_eq!(marker.resolution, MergeStrategy::Local);
    }

    #[test]
    fn genuine_conflict_remote_strategy() {
        let ctx = MergeContext::new(
            Some(json!({"x": "A"})),
            Some(json!({"x": "B"})),
            Some(json!({"x": "C"})),
            MergeStrategy::Remote,
        );

        let outcome = merge(&ctx);
        assert_eq!(outcome.merged, json!({"x": "C"}));
        assert_eq!(outcome.conflicts.len(), 1);
    }

    #[test]
    fn manual_strategy_still_populates_merged() {
        let ctx = MergeContext::new(
            Some(json!({"x": "A"})),
            Some(json!({"x": "B"})),
            Some(json!({"x": "C"})),
            MergeStrategy::Manual,
        );

        let outcome = merge(&ctx);

        // The field is resolved like `merge` but flagged for external
        // resolution.
        assert_eq!(outcome.merged, json!({"x": "B"}));
        assert!(outcome.conflicts[0].needs_manual_resolution());
    }

    #[test]
    fn merge_strategy_unions_arrays() {
        let ctx = MergeContext::new(
            Some(json!({"tags": ["base"]})),
            Some(json!({"tags": ["base", "local"]})),
            Some(json!({"tags": ["base", "remote"]})),
            MergeStrategy::Merge,
        );

        let outcome = merge(&ctx);
        assert_eq!(outcome.merged, json!({"tags": ["base", "local", "remote"]}));
        assert_eq!(outcome.conflicts.len(), 1);
    }

    #[test]
    fn crediting_tracks_both_sides() {
        let local_change = make_change("note-1");
        let remote_change = make_change("note-1");

        let ctx = MergeContext::new(
            Some(json!({"a": 1, "x": "A"})),
            Some(json!({"a": 2, "x": "B"})),
            Some(json!({"a": 1, "x": "C"})),
            MergeStrategy::Local,
        )
        .with_local_changes(vec![local_change.clone()])
        .with_remote_changes(vec![remote_change.clone()]);

        let outcome = merge(&ctx);

        // `a` is a local-only edit and `x` a conflict won by local.
        assert!(outcome.applied_changes.contains(&local_change.id));
        assert!(outcome.discarded_changes.contains(&remote_change.id));
    }

    #[test]
    fn field_added_on_one_side_is_kept() {
        let ctx = MergeContext::new(
            Some(json!({"a": 1})),
            Some(json!({"a": 1})),
            Some(json!({"a": 1, "b": 2})),
            MergeStrategy::Local,
        );

        let outcome = merge(&ctx);
        assert_eq!(outcome.merged, json!({"a": 1, "b": 2}));
        assert!(outcome.is_clean());
    }

    #[test]
    fn field_removed_on_one_side_stays_removed() {
        let ctx = MergeContext::new(
            Some(json!({"a": 1, "b": 2})),
            Some(json!({"a": 1})),
            Some(json!({"a": 1, "b": 2})),
            MergeStrategy::Local,
        );

        let outcome = merge(&ctx);
        assert_eq!(outcome.merged, json!({"a": 1}));
        assert!(outcome.is_clean());
    }

    #[test]
    fn detect_conflict_truth_table() {
        let a = json!("A");
        let b = json!("B");
        let c = json!("C");

        assert!(detect_conflict(Some(&a), Some(&b), Some(&c)));
        assert!(detect_conflict(None, Some(&b), Some(&c)));

        assert!(!detect_conflict(Some(&a), Some(&a), Some(&c)));
        assert!(!detect_conflict(Some(&a), Some(&b), Some(&a)));
        assert!(!detect_conflict(Some(&a), Some(&b), Some(&b)));
        assert!(!detect_conflict(Some(&a), Some(&a), Some(&a)));
        assert!(!detect_conflict(None, None, Some(&c)));
    }

    #[test]
    fn smart_merge_nested_objects() {
        let base = json!({"meta": {"color": "red", "size": 1}});
        let local = json!({"meta": {"color": "blue", "size": 1}});
        let remote = json!({"meta": {"color": "red", "size": 2}});

        let merged = smart_merge(&base["meta"], &local["meta"], &remote["meta"]);
        assert_eq!(merged, json!({"color": "blue", "size": 2}));
    }

    #[test]
    fn smart_merge_nested_conflict_keeps_local() {
        let merged = smart_merge(
            &json!({"color": "red"}),
            &json!({"color": "blue"}),
            &json!({"color": "green"}),
        );
        assert_eq!(merged, json!({"color": "blue"}));
    }

    #[test]
    fn smart_merge_scalar_keeps_local() {
        assert_eq!(smart_merge(&json!(1), &json!(2), &json!(3)), json!(2));
    }

    proptest! {
        #[test]
        fn smart_merge_array_is_superset_union(
            base in proptest::collection::vec(0i64..8, 0..6),
            local in proptest::collection::vec(0i64..8, 0..6),
            remote in proptest::collection::vec(0i64..8, 0..6),
        ) {
            let merged = smart_merge(&json!(base), &json!(local), &json!(remote));
            let items = merged.as_array().unwrap();

            // Every input element appears at least once.
            for source in [&base, &local, &remote] {
                for item in source {
                    prop_assert!(items.contains(&json!(item)));
                }
            }

            // No duplicates.
            for (i, item) in items.iter().enumerate() {
                prop_assert!(!items[i + 1..].contains(item));
            }
        }
    }
}
