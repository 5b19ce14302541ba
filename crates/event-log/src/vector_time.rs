use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ReplicaId;

/// Causal relationship between two vector timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrdering {
    /// The left timestamp happened before the right one.
    Before,
    /// The left timestamp happened after the right one.
    After,
    /// Both timestamps are identical.
    Equal,
    /// Neither timestamp causally precedes the other.
    Concurrent,
}

/// Vector timestamp assigned by the event log to every event.
///
/// Maps replica ids to the number of events that replica has emitted and
/// that are causally visible. Missing entries count as zero; zero entries
/// are never stored so that equal clocks compare equal structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<ReplicaId, u64>", into = "BTreeMap<ReplicaId, u64>")]
pub struct VectorTime(BTreeMap<ReplicaId, u64>);

impl From<BTreeMap<ReplicaId, u64>> for VectorTime {
    fn from(entries: BTreeMap<ReplicaId, u64>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<VectorTime> for BTreeMap<ReplicaId, u64> {
    fn from(time: VectorTime) -> Self {
        time.0
    }
}

impl VectorTime {
    /// Creates an empty vector timestamp.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a vector timestamp from `(replica, counter)` pairs.
    pub fn from_entries<I, R>(entries: I) -> Self
    where
        I: IntoIterator<Item = (R, u64)>,
        R: Into<ReplicaId>,
    {
        Self(
            entries
                .into_iter()
                .filter(|(_, counter)| *counter > 0)
                .map(|(replica, counter)| (replica.into(), counter))
                .collect(),
        )
    }

    /// Returns the counter for a replica (zero if absent).
    pub fn get(&self, replica: &ReplicaId) -> u64 {
        self.0.get(replica).copied().unwrap_or(0)
    }

    /// Increments the entry of `replica` in place.
    pub fn increment(&mut self, replica: &ReplicaId) {
        *self.0.entry(replica.clone()).or_insert(0) += 1;
    }

    /// Returns the entry-wise maximum of both timestamps.
    pub fn merge(&self, other: &VectorTime) -> VectorTime {
        let mut merged = self.0.clone();
        for (replica, counter) in &other.0 {
            let entry = merged.entry(replica.clone()).or_insert(0);
            *entry = (*entry).max(*counter);
        }
        VectorTime(merged)
    }

    /// Returns true if no replica has an entry.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compares two timestamps causally.
    pub fn compare(&self, other: &VectorTime) -> CausalOrdering {
        let mut less = false;
        let mut greater = false;
        for replica in self.0.keys().chain(other.0.keys()) {
            match self.get(replica).cmp(&other.get(replica)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
            if less && greater {
                return CausalOrdering::Concurrent;
            }
        }
        match (less, greater) {
            (false, false) => CausalOrdering::Equal,
            (true, false) => CausalOrdering::Before,
            (false, true) => CausalOrdering::After,
            (true, true) => CausalOrdering::Concurrent,
        }
    }

    /// Returns true if `self` happened strictly before `other`.
    pub fn happened_before(&self, other: &VectorTime) -> bool {
        self.compare(other) == CausalOrdering::Before
    }

    /// Returns true if neither timestamp causally precedes the other.
    pub fn is_concurrent(&self, other: &VectorTime) -> bool {
        self.compare(other) == CausalOrdering::Concurrent
    }

    /// Total order used only to break ties deterministically between
    /// timestamps that are causally unrelated.
    pub fn tie_break(&self, other: &VectorTime) -> Ordering {
        let sum = |vt: &VectorTime| vt.0.values().sum::<u64>();
        sum(self).cmp(&sum(other)).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for VectorTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.compare(other) {
            CausalOrdering::Before => Some(Ordering::Less),
            CausalOrdering::After => Some(Ordering::Greater),
            CausalOrdering::Equal => Some(Ordering::Equal),
            CausalOrdering::Concurrent => None,
        }
    }
}

impl std::fmt::Display for VectorTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (replica, counter)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{replica}:{counter}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vt(entries: &[(&str, u64)]) -> VectorTime {
        VectorTime::from_entries(entries.iter().map(|(r, c)| (ReplicaId::new(*r), *c)))
    }

    #[test]
    fn compare_detects_causal_order() {
        assert_eq!(vt(&[("A", 1)]).compare(&vt(&[("A", 2)])), CausalOrdering::Before);
        assert_eq!(vt(&[("A", 2)]).compare(&vt(&[("A", 1)])), CausalOrdering::After);
        assert_eq!(
            vt(&[("A", 2), ("B", 1)]).compare(&vt(&[("A", 2), ("B", 1)])),
            CausalOrdering::Equal
        );
        assert!(vt(&[("A", 1)]).happened_before(&vt(&[("A", 1), ("B", 1)])));
    }

    #[test]
    fn compare_detects_concurrency() {
        let a = vt(&[("A", 3)]);
        let b = vt(&[("A", 2), ("B", 1)]);
        assert!(a.is_concurrent(&b));
        assert!(b.is_concurrent(&a));
        assert_eq!(a.partial_cmp(&b), None);
    }

    #[test]
    fn zero_entries_are_ignored() {
        assert_eq!(vt(&[("A", 1), ("B", 0)]), vt(&[("A", 1)]));
        assert_eq!(vt(&[("B", 0)]).get(&ReplicaId::new("B")), 0);
        assert!(VectorTime::new().happened_before(&vt(&[("A", 1)])));
    }

    #[test]
    fn increment_and_merge() {
        let a = ReplicaId::new("A");
        let mut clock = VectorTime::new();
        clock.increment(&a);
        clock.increment(&a);
        assert_eq!(clock.get(&a), 2);

        let merged = clock.merge(&vt(&[("A", 1), ("B", 4)]));
        assert_eq!(merged, vt(&[("A", 2), ("B", 4)]));
    }

    #[test]
    fn tie_break_is_total_and_antisymmetric() {
        let a = vt(&[("A", 3)]);
        let b = vt(&[("A", 2), ("B", 1)]);
        assert_eq!(a.tie_break(&b), b.tie_break(&a).reverse());
        assert_eq!(a.tie_break(&a), Ordering::Equal);
    }

    #[test]
    fn display_lists_entries() {
        assert_eq!(vt(&[("B", 1), ("A", 2)]).to_string(), "{A:2,B:1}");
        assert_eq!(VectorTime::new().to_string(), "{}");
    }

    #[test]
    fn serializes_as_map() {
        let time = vt(&[("A", 2), ("B", 1)]);
        let json = serde_json::to_string(&time).unwrap();
        assert_eq!(json, r#"{"A":2,"B":1}"#);
        let back: VectorTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, time);
    }

    #[test]
    fn deserializing_drops_zero_entries() {
        let time: VectorTime = serde_json::from_str(r#"{"A":0,"B":1}"#).unwrap();
        assert_eq!(time, vt(&[("B", 1)]));
        assert_eq!(time.partial_cmp(&vt(&[("B", 1)])), Some(Ordering::Equal));

        let empty: VectorTime = serde_json::from_str(r#"{"A":0}"#).unwrap();
        assert!(empty.is_empty());
    }
}
