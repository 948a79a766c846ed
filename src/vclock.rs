//! Vector clock (spec GLOSSARY "vclock"): the retention-accounting unit
//! for the GC coordinator.
//!
//! A component-wise-ordered vector of per-replica sequence numbers,
//! keyed by replica id so it stays sparse as the cluster grows —
//! mirrors `gc.h`'s `struct vclock` usage throughout `gc_consumer`/
//! `gc_state`, without committing to its fixed-size C array
//! representation.

use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vclock {
    components: BTreeMap<u32, u64>,
}

impl Vclock {
    pub fn new() -> Vclock {
        Vclock {
            components: BTreeMap::new(),
        }
    }

    pub fn from_pairs<I: IntoIterator<Item = (u32, u64)>>(pairs: I) -> Vclock {
        Vclock {
            components: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, replica_id: u32) -> u64 {
        self.components.get(&replica_id).copied().unwrap_or(0)
    }

    pub fn set(&mut self, replica_id: u32, lsn: u64) {
        self.components.insert(replica_id, lsn);
    }

    pub fn replica_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.components.keys().copied()
    }

    /// `a ≤ b` component-wise: every replica id present in `a` has an
    /// lsn no greater than in `b` (replicas absent from `b` count as 0).
    pub fn le(&self, other: &Vclock) -> bool {
        self.components
            .iter()
            .all(|(replica, lsn)| *lsn <= other.get(*replica))
    }

    /// Component-wise minimum, over the union of both vclocks' replica
    /// ids (spec §4.4 "retention floor for WAL").
    pub fn componentwise_min(&self, other: &Vclock) -> Vclock {
        let mut out = BTreeMap::new();
        for replica in self.components.keys().chain(other.components.keys()) {
            let a = self.get(*replica);
            let b = other.get(*replica);
            out.insert(*replica, a.min(b));
        }
        Vclock { components: out }
    }

    /// Total order used only to sort a list of checkpoint vclocks by
    /// "recency" (spec §4.4 "sorted list of existing checkpoint
    /// vclocks"): sum of components, ties broken lexicographically.
    /// Checkpoints are externally guaranteed comparable in practice
    /// since they're taken sequentially by one engine.
    pub fn recency_key(&self) -> (u64, Vec<(u32, u64)>) {
        let sum = self.components.values().sum();
        (sum, self.components.iter().map(|(k, v)| (*k, *v)).collect())
    }
}

impl PartialOrd for Vclock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        if self.le(other) {
            return Some(Ordering::Less);
        }
        if other.le(self) {
            return Some(Ordering::Greater);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn componentwise_min_takes_smaller_per_replica() {
        let a = Vclock::from_pairs([(1, 5), (2, 1)]);
        let b = Vclock::from_pairs([(1, 3), (2, 9)]);
        let min = a.componentwise_min(&b);
        assert_eq!(min.get(1), 3);
        assert_eq!(min.get(2), 1);
    }

    #[test]
    fn le_treats_missing_replicas_as_zero() {
        let a = Vclock::from_pairs([(1, 0)]);
        let b = Vclock::from_pairs([(2, 5)]);
        assert!(a.le(&b));
    }
}
