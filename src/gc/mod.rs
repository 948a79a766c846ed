//! GC coordinator (spec §3 C7, §4.4).
//!
//! Grounded on `gc_state`/`gc_run`/`gc_set_checkpoint_count`/
//! `gc_consumer_register`/`unregister`/`advance` in
//! `original_source/src/box/gc.h`. The coordinator recomputes the
//! checkpoint and WAL retention floors against the current consumer set
//! and the latest checkpoint list, invoking a cleanup callback under a
//! latch whenever either floor has advanced.

pub mod consumer;

use log::info;
use std::cell::Cell;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::vclock::Vclock;
use consumer::{Consumer, ConsumerId, ConsumerRegistry, ConsumerType};

/// Invoked with `(checkpoint_floor, wal_floor)` whenever `run()` detects
/// either floor has advanced; this is the engine's hook to actually
/// unlink old checkpoint files and WAL segments.
pub type CleanupCallback = Box<dyn FnMut(&Vclock, &Vclock)>;

/// `struct gc_state` (`gc.h`).
pub struct GcCoordinator {
    checkpoint_count: u32,
    checkpoints: Vec<Vclock>,
    consumers: ConsumerRegistry,
    last_checkpoint_floor: Vclock,
    last_wal_floor: Vclock,
    /// Serializes cleanup callback execution (spec §5 "Shared
    /// resources"). Under the single-threaded cooperative scheduler
    /// this can only ever be re-entered by a programming error (a
    /// cleanup callback calling back into `run`), so we assert rather
    /// than actually block.
    latch: Cell<bool>,
    cleanup: CleanupCallback,
}

impl GcCoordinator {
    /// `gc_init`.
    pub fn new(checkpoint_count: u32, cleanup: CleanupCallback) -> Result<GcCoordinator> {
        if checkpoint_count == 0 {
            return Err(Error::Unsupported("checkpoint_count must be >= 1".into()));
        }
        Ok(GcCoordinator {
            checkpoint_count,
            checkpoints: Vec::new(),
            consumers: ConsumerRegistry::new(),
            last_checkpoint_floor: Vclock::new(),
            last_wal_floor: Vclock::new(),
            latch: Cell::new(false),
            cleanup,
        })
    }

    /// `gc_init`, sized from a caller-supplied `EngineConfig` rather
    /// than a bare `u32` (spec §1's configuration layer is an external
    /// collaborator; this is the seam it would feed through).
    pub fn from_config(config: &EngineConfig, cleanup: CleanupCallback) -> Result<GcCoordinator> {
        GcCoordinator::new(config.checkpoint_count, cleanup)
    }

    pub fn checkpoint_floor(&self) -> &Vclock {
        &self.last_checkpoint_floor
    }

    pub fn wal_floor(&self) -> &Vclock {
        &self.last_wal_floor
    }

    /// Notification from the snapshot manager about the current set of
    /// existing checkpoints (spec §4.4 "Inputs").
    pub fn notify_checkpoints(&mut self, checkpoints: Vec<Vclock>) -> Result<()> {
        self.checkpoints = checkpoints;
        self.run()
    }

    /// `gc_set_checkpoint_count`.
    pub fn set_checkpoint_count(&mut self, n: u32) -> Result<()> {
        if n == 0 {
            return Err(Error::Unsupported("checkpoint_count must be >= 1".into()));
        }
        self.checkpoint_count = n;
        self.run()
    }

    /// `gc_consumer_register`.
    pub fn consumer_register(&mut self, name: String, vclock: Vclock, kind: ConsumerType) -> Result<ConsumerId> {
        let id = self.consumers.register(name, vclock, kind)?;
        self.run()?;
        Ok(id)
    }

    /// `gc_consumer_unregister`.
    pub fn consumer_unregister(&mut self, id: ConsumerId) -> Result<()> {
        self.consumers.unregister(id)?;
        self.run()
    }

    /// `gc_consumer_advance`.
    pub fn consumer_advance(&mut self, id: ConsumerId, vclock: Vclock) -> Result<()> {
        self.consumers.advance(id, vclock)?;
        self.run()
    }

    pub fn consumers(&self) -> impl Iterator<Item = &Consumer> {
        self.consumers.iter()
    }

    /// The K-th most recent checkpoint vclock (or the oldest, if fewer
    /// than K checkpoints exist), further lowered by any SNAP+WAL
    /// consumer still pinning an older one (spec §4.4 "Core rule").
    fn compute_checkpoint_floor(&self) -> Vclock {
        let mut sorted: Vec<&Vclock> = self.checkpoints.iter().collect();
        sorted.sort_by_key(|v| v.recency_key());
        let mut floor = match sorted.len().checked_sub(self.checkpoint_count as usize) {
            Some(idx) => sorted[idx].clone(),
            None => sorted.first().map(|v| (*v).clone()).unwrap_or_default(),
        };
        for consumer in self.consumers.iter() {
            if consumer.kind == ConsumerType::SnapWal {
                floor = floor.componentwise_min(&consumer.vclock);
            }
        }
        floor
    }

    /// Component-wise minimum of the checkpoint floor and every
    /// consumer's vclock (all consumer types pin WAL).
    fn compute_wal_floor(&self, checkpoint_floor: &Vclock) -> Vclock {
        let mut floor = checkpoint_floor.clone();
        for consumer in self.consumers.iter() {
            floor = floor.componentwise_min(&consumer.vclock);
        }
        floor
    }

    /// `gc_run`: recompute both floors; if either has advanced, invoke
    /// the cleanup callback under the latch.
    pub fn run(&mut self) -> Result<()> {
        let checkpoint_floor = self.compute_checkpoint_floor();
        let wal_floor = self.compute_wal_floor(&checkpoint_floor);

        if checkpoint_floor == self.last_checkpoint_floor && wal_floor == self.last_wal_floor {
            return Ok(());
        }

        debug_assert!(!self.latch.get(), "gc_run re-entered while cleanup is running");
        self.latch.set(true);
        (self.cleanup)(&checkpoint_floor, &wal_floor);
        self.latch.set(false);

        info!(
            "gc floors advanced: checkpoint={:?} wal={:?}",
            checkpoint_floor, wal_floor
        );
        self.last_checkpoint_floor = checkpoint_floor;
        self.last_wal_floor = wal_floor;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn checkpoint_count_two_keeps_third_most_recent() {
        let calls: Rc<RefCell<Vec<(Vclock, Vclock)>>> = Rc::new(RefCell::new(Vec::new()));
        let calls_clone = calls.clone();
        let mut gc = GcCoordinator::new(
            2,
            Box::new(move |ckpt, wal| calls_clone.borrow_mut().push((ckpt.clone(), wal.clone()))),
        )
        .unwrap();

        let v1 = Vclock::from_pairs([(1, 1)]);
        let v2 = Vclock::from_pairs([(1, 2)]);
        let v3 = Vclock::from_pairs([(1, 3)]);
        let v4 = Vclock::from_pairs([(1, 4)]);
        gc.notify_checkpoints(vec![v1.clone(), v2.clone(), v3.clone(), v4.clone()])
            .unwrap();

        let c = gc
            .consumer_register("replica-1".into(), v1.clone(), ConsumerType::Wal)
            .unwrap();

        assert_eq!(gc.checkpoint_floor(), &v3);
        assert_eq!(gc.wal_floor(), &v1);

        gc.consumer_advance(c, v3.clone()).unwrap();
        assert_eq!(gc.wal_floor(), &v3);
    }
}
