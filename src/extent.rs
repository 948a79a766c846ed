//! Extent reserve (spec §3 C3, §4.3.2 step 1, §5 "Reservation discipline").
//!
//! `original_source/src/box/memtx_space.cc` reserves allocator extents
//! before the all-indexes replace so that the compensating rollback pass
//! can never itself fail with OOM:
//!
//! ```c
//! enum {
//!     RESERVE_EXTENTS_BEFORE_DELETE = 8,
//!     RESERVE_EXTENTS_BEFORE_REPLACE = 16
//! };
//! ```
//!
//! Safe Rust has no equivalent allocator hook to pre-warm, so this module
//! models the *contract* rather than the mechanism: a logical slack
//! counter that index mutations draw from, so a reimplementation can
//! assert the spec's invariant ("rollback must never fail") rather than
//! silently relying on the global allocator. See spec §9 open questions.

pub const RESERVE_EXTENTS_BEFORE_DELETE: u32 = 8;
pub const RESERVE_EXTENTS_BEFORE_REPLACE: u32 = 16;

/// Tracks logical allocator slack reserved ahead of a multi-index
/// replace. Every index mutation that might grow a node (insert, or a
/// delete that triggers tree rebalancing) draws one unit; `all_keys`
/// rollback draws against the same reserve, so as long as the reserve
/// was sized correctly up front, rollback is infallible.
#[derive(Debug)]
pub struct ExtentReserve {
    slack: u32,
}

impl ExtentReserve {
    /// Reserve slack sized for a replace-shaped operation (new tuple
    /// present) or a delete-shaped one, using the default constants.
    pub fn before_replace(new_tuple_present: bool) -> ExtentReserve {
        let slack = if new_tuple_present {
            RESERVE_EXTENTS_BEFORE_REPLACE
        } else {
            RESERVE_EXTENTS_BEFORE_DELETE
        };
        ExtentReserve { slack }
    }

    /// Same as `before_replace`, but sized from a caller-supplied
    /// `EngineConfig` rather than the hardcoded constants (spec §1's
    /// configuration layer is an external collaborator; this is the
    /// seam it would feed through).
    pub fn from_config(config: &crate::config::EngineConfig, new_tuple_present: bool) -> ExtentReserve {
        let slack = if new_tuple_present {
            config.reserve_extents_before_replace
        } else {
            config.reserve_extents_before_delete
        };
        ExtentReserve { slack }
    }

    /// Draw one unit of slack for an index mutation. Returns `false` if
    /// the reserve is exhausted — under the spec's contract this should
    /// never happen during rollback; callers on the rollback path treat
    /// `false` as the "impossible path" from spec §9 and abort rather
    /// than leave a space half-mutated.
    pub fn draw(&mut self) -> bool {
        if self.slack == 0 {
            false
        } else {
            self.slack -= 1;
            true
        }
    }

    pub fn remaining(&self) -> u32 {
        self.slack
    }
}
