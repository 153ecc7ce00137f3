//! Vector clocks for causal ordering between devices.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier for a device participating in sync.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a new device ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-device monotonic counters used to establish causal ordering
/// between concurrently produced changes without a shared clock.
///
/// Merging two clocks takes the pointwise maximum, which makes the
/// merge commutative, associative, and idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<DeviceId, u64>,
}

impl VectorClock {
    /// Creates a new empty vector clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter for a device and returns the new value.
    ///
    /// Unknown devices start at 0, so the first increment yields 1.
    pub fn increment(&mut self, device: &DeviceId) -> u64 {
        let counter = self.entries.entry(device.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Returns the counter for a device (0 if unknown).
    pub fn get(&self, device: &DeviceId) -> u64 {
        self.entries.get(device).copied().unwrap_or(0)
    }

    /// Merges another clock into this one, taking the pointwise maximum.
    ///
    /// Safe to call repeatedly and in any order.
    pub fn merge(&mut self, other: &VectorClock) {
        for (device, &value) in &other.entries {
            let entry = self.entries.entry(device.clone()).or_insert(0);
            *entry = (*entry).max(value);
        }
    }

    /// Returns true if every entry in `other` is covered by this clock.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other
            .entries
            .iter()
            .all(|(device, &value)| self.get(device) >= value)
    }

    /// Returns true if this clock is strictly causally earlier than `other`.
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        other.dominates(self) && self != other
    }

    /// Returns true if neither clock is causally ordered before the other.
    pub fn concurrent_with(&self, other: &VectorClock) -> bool {
        !self.happened_before(other) && !other.happened_before(self) && self != other
    }

    /// Iterates over the (device, counter) entries.
    pub fn entries(&self) -> impl Iterator<Item = (&DeviceId, u64)> {
        self.entries.iter().map(|(device, &value)| (device, value))
    }

    /// Returns the number of devices known to this clock.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the clock has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        let mut clock = VectorClock::new();
        for (device, value) in entries {
            for _ in 0..*value {
                clock.increment(&DeviceId::from(*device));
            }
        }
        clock
    }

    #[test]
    fn increment_starts_at_one() {
        let mut clock = VectorClock::new();
        let device = DeviceId::from("device-a");

        assert_eq!(clock.get(&device), 0);
        assert_eq!(clock.increment(&device), 1);
        assert_eq!(clock.increment(&device), 2);
        assert_eq!(clock.get(&device), 2);
    }

    #[test]
    fn merge_takes_pointwise_maximum() {
        let mut a = clock(&[("x", 3), ("y", 1)]);
        let b = clock(&[("y", 4), ("z", 2)]);

        a.merge(&b);

        assert_eq!(a.get(&DeviceId::from("x")), 3);
        assert_eq!(a.get(&DeviceId::from("y")), 4);
        assert_eq!(a.get(&DeviceId::from("z")), 2);
    }

    #[test]
    fn causal_ordering() {
        let earlier = clock(&[("x", 1)]);
        let later = clock(&[("x", 2), ("y", 1)]);
        let sibling = clock(&[("y", 2)]);

        assert!(earlier.happened_before(&later));
        assert!(!later.happened_before(&earlier));
        assert!(later.dominates(&earlier));
        assert!(earlier.concurrent_with(&sibling));
        assert!(!earlier.concurrent_with(&earlier.clone()));
    }

    #[test]
    fn serde_roundtrip() {
        let clock = clock(&[("device-a", 2), ("device-b", 5)]);
        let json = serde_json::to_string(&clock).unwrap();
        let decoded: VectorClock = serde_json::from_str(&json).unwrap();
        assert_eq!(clock, decoded);
    }

    fn arb_clock() -> impl Strategy<Value = VectorClock> {
        proptest::collection::btree_map("[a-d]", 0u64..10, 0..4).prop_map(|map| {
            let mut clock = VectorClock::new();
            for (device, value) in map {
                let device = DeviceId::from(device);
                for _ in 0..value {
                    clock.increment(&device);
                }
            }
            clock
        })
    }

    proptest! {
        #[test]
        fn merge_is_commutative(a in arb_clock(), b in arb_clock()) {
            let mut ab = a.clone();
            ab.merge(&b);
            let mut ba = b.clone();
            ba.merge(&a);
            prop_assert_eq!(ab, ba);
        }

        #[test]
        fn merge_is_idempotent(a in arb_clock(), b in arb_clock()) {
            let mut once = a.clone();
            once.merge(&b);
            let mut twice = once.clone();
            twice.merge(&b);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn merge_dominates_both_inputs(a in arb_clock(), b in arb_clock()) {
            let mut merged = a.clone();
            merged.merge(&b);
            prop_assert!(merged.dominates(&a));
            prop_assert!(merged.dominates(&b));
        }
    }
}
