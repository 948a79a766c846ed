//! GC consumer and its registry (spec §3 C8, §4.4).
//!
//! Grounded on `struct gc_consumer` and `gc_consumer_type` in
//! `original_source/src/box/gc.h`. The source keeps consumers in an
//! intrusive rb-tree; per spec §9's design note, the only real
//! requirement is efficient membership, ordered iteration, and
//! min-lookup, so an ordered map from id to consumer is enough.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::vclock::Vclock;

pub const CONSUMER_NAME_MAX: usize = 64;

/// `gc_consumer_type` (`gc.h`): WAL=1 pins only WAL segments; SnapWal=2
/// pins both checkpoints and WAL segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerType {
    Wal = 1,
    SnapWal = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConsumerId(u64);

#[derive(Debug, Clone)]
pub struct Consumer {
    pub id: ConsumerId,
    pub name: String,
    pub vclock: Vclock,
    pub kind: ConsumerType,
}

/// Ordered set of registered consumers, keyed by registration id.
#[derive(Debug, Default)]
pub struct ConsumerRegistry {
    consumers: BTreeMap<ConsumerId, Consumer>,
    next_id: u64,
}

impl ConsumerRegistry {
    pub fn new() -> ConsumerRegistry {
        ConsumerRegistry {
            consumers: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn register(&mut self, name: String, vclock: Vclock, kind: ConsumerType) -> Result<ConsumerId> {
        if name.len() > CONSUMER_NAME_MAX {
            return Err(Error::Unsupported(format!(
                "consumer name longer than {} bytes",
                CONSUMER_NAME_MAX
            )));
        }
        let id = ConsumerId(self.next_id);
        self.next_id += 1;
        self.consumers.insert(
            id,
            Consumer {
                id,
                name,
                vclock,
                kind,
            },
        );
        Ok(id)
    }

    pub fn unregister(&mut self, id: ConsumerId) -> Result<()> {
        self.consumers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("consumer {:?}", id)))
    }

    /// `gc_consumer_advance`: precondition is that the new vclock is
    /// component-wise ≥ the consumer's current one (spec §3 Consumer
    /// invariant: monotonically non-decreasing).
    pub fn advance(&mut self, id: ConsumerId, vclock: Vclock) -> Result<()> {
        let consumer = self
            .consumers
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("consumer {:?}", id)))?;
        if !consumer.vclock.le(&vclock) {
            return Err(Error::Unsupported(
                "consumer vclock must advance monotonically".into(),
            ));
        }
        consumer.vclock = vclock;
        Ok(())
    }

    /// Iterator over consumers, valid only across non-yielding code
    /// (spec §4.4, "iterator ... valid only across non-yielding code").
    pub fn iter(&self) -> impl Iterator<Item = &Consumer> {
        self.consumers.values()
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_name_over_64_bytes() {
        let mut reg = ConsumerRegistry::new();
        let name = "x".repeat(65);
        assert!(reg.register(name, Vclock::new(), ConsumerType::Wal).is_err());
    }

    #[test]
    fn advance_rejects_non_monotonic_vclock() {
        let mut reg = ConsumerRegistry::new();
        let id = reg
            .register("replica-1".into(), Vclock::from_pairs([(1, 5)]), ConsumerType::Wal)
            .unwrap();
        let result = reg.advance(id, Vclock::from_pairs([(1, 3)]));
        assert!(result.is_err());
    }
}
