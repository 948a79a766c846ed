//! Engine configuration (spec §1 "the configuration layer" — out of
//! scope as a subsystem, but the values it would hand the space
//! executor and GC coordinator still need a concrete home).
//!
//! Grounded on the teacher crate's config-carrying pattern
//! (`rdms::Config`/`rdms::robt::Config` plain structs with a `Default`
//! impl, passed by value into the component that needs them) rather
//! than a file-backed config loader, since spec §1 treats the
//! configuration layer itself as an external collaborator.

/// Values the outer engine would normally load from its configuration
/// layer and hand down to a space and its GC coordinator: the extent
/// reservation sizes (spec §4.3.2 step 1) and the checkpoint retention
/// depth (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// `gc_state.checkpoint_count` (spec §3 "GC state").
    pub checkpoint_count: u32,
    /// `RESERVE_EXTENTS_BEFORE_REPLACE` (spec §4.3.2 step 1).
    pub reserve_extents_before_replace: u32,
    /// `RESERVE_EXTENTS_BEFORE_DELETE` (spec §4.3.2 step 1).
    pub reserve_extents_before_delete: u32,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            checkpoint_count: 2,
            reserve_extents_before_replace: crate::extent::RESERVE_EXTENTS_BEFORE_REPLACE,
            reserve_extents_before_delete: crate::extent::RESERVE_EXTENTS_BEFORE_DELETE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_source_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.reserve_extents_before_replace, 16);
        assert_eq!(cfg.reserve_extents_before_delete, 8);
        assert_eq!(cfg.checkpoint_count, 2);
    }
}
