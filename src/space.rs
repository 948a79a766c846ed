//! Space executor (spec §3 C4, §4.3): the DML engine and its DDL
//! transitions.
//!
//! Grounded throughout on `memtx_space.cc`'s `memtx_space_replace_*`
//! family (`replace_no_keys`, `replace_build_next`, `replace_primary_key`,
//! `replace_all_keys`) and `memtx_space_execute_{replace,delete,update,
//! upsert,select}`. The recovery-mode dispatch is kept as a tagged enum
//! rather than a function pointer (spec §9 design note): a systems-
//! language reimplementation should prefer a closed variant over open
//! dispatch here, and Rust's enum is exactly that.

use log::{error, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::extent::ExtentReserve;
use crate::format::Format;
use crate::index::{Index, IndexContract, IndexDef, ReplaceMode};
use crate::request::{Opcode, Request, Statement};
use crate::row::validate_row;
use crate::tuple::Tuple;
use crate::update;
use crate::validate::check_index_def;

/// Selects which write path `Space::dispatch_replace` takes (spec §4.3,
/// "Recovery-mode write paths").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    /// No primary key yet; invoking `replace` at all is a programming
    /// error.
    NoKeys,
    /// Bulk load from snapshot.
    BuildNext,
    /// WAL replay: only the primary index is driven.
    PrimaryKey,
    /// Normal operation: full multi-index fan-out.
    AllKeys,
}

/// One relational table, backed by in-memory indexes (spec §3 "Space").
pub struct Space {
    indexes: Vec<Index>,
    index_defs: Vec<IndexDef>,
    format: Format,
    bsize: usize,
    recovery_mode: RecoveryMode,
    config: EngineConfig,
    /// Fault-injection seam mirroring `ERRINJ_BUILD_SECONDARY`: when set
    /// to the id of the index currently being built, `build_secondary_key`
    /// fails with `Error::Injection` instead of actually building it.
    errinj_build_secondary: Option<u32>,
}

impl Space {
    pub fn new(format: Format) -> Space {
        Space::with_config(format, EngineConfig::default())
    }

    /// Same as `new`, but sized from a caller-supplied `EngineConfig`
    /// rather than the default extent-reservation constants.
    pub fn with_config(format: Format, config: EngineConfig) -> Space {
        Space {
            indexes: Vec::new(),
            index_defs: Vec::new(),
            format,
            bsize: 0,
            recovery_mode: RecoveryMode::NoKeys,
            config,
            errinj_build_secondary: None,
        }
    }

    /// Test/fault-injection hook: arm `build_secondary_key` to fail the
    /// next time it is asked to build the index with this id, mirroring
    /// `ERRINJ_BUILD_SECONDARY` (spec §6 `INJECTION` error code).
    pub fn set_errinj_build_secondary(&mut self, index_id: Option<u32>) {
        self.errinj_build_secondary = index_id;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// `bsize = bsize + new_len - old_len`, asserting the original
    /// engine's invariant that the accumulator never goes negative
    /// (spec §3 SPEC_FULL note on `memtx_space`'s signed-safe `bsize`).
    fn update_bsize(&mut self, old_len: usize, new_len: usize) {
        debug_assert!(
            self.bsize + new_len >= old_len,
            "bsize would go negative: bsize={} old_len={} new_len={}",
            self.bsize,
            old_len,
            new_len
        );
        self.bsize = self.bsize.saturating_add(new_len).saturating_sub(old_len);
    }

    pub fn bsize(&self) -> usize {
        self.bsize
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }

    pub fn recovery_mode(&self) -> RecoveryMode {
        self.recovery_mode
    }

    pub fn index(&self, id: u32) -> Result<&Index> {
        self.index_defs
            .iter()
            .position(|d| d.id == id)
            .map(|pos| &self.indexes[pos])
            .ok_or_else(|| Error::Unsupported(format!("no index with id {}", id)))
    }

    fn primary(&self) -> Result<&Index> {
        self.indexes
            .first()
            .ok_or_else(|| Error::Unsupported("space has no primary key".into()))
    }

    // ---------------------------------------------------------------
    // DDL (spec §4.3.4)
    // ---------------------------------------------------------------

    /// `check_index_def`: delegate to the validator (spec §3 C5).
    pub fn check_index_def(&self, def: &IndexDef, is_primary: bool) -> Result<()> {
        check_index_def(def, is_primary)
    }

    /// `add_primary_key`: install slot 0 and select the write path
    /// appropriate to the engine-wide recovery state the caller passes
    /// in (bulk load / WAL replay / live).
    pub fn add_primary_key(&mut self, def: IndexDef, mode: RecoveryMode) -> Result<()> {
        if !self.indexes.is_empty() {
            return Err(Error::ModifyIndex("primary key already exists".into()));
        }
        check_index_def(&def, true)?;
        self.indexes.push(Index::new(&def));
        self.index_defs.push(def);
        self.recovery_mode = mode;
        Ok(())
    }

    /// `drop_primary_key`: only valid when no secondaries remain (the
    /// original engine enforces this at a higher layer; we assert it
    /// here since this module owns the index vector).
    pub fn drop_primary_key(&mut self) -> Result<()> {
        if self.indexes.len() > 1 {
            return Err(Error::ModifyIndex(
                "cannot drop primary key while secondary indexes exist".into(),
            ));
        }
        self.indexes.clear();
        self.index_defs.clear();
        self.recovery_mode = RecoveryMode::NoKeys;
        Ok(())
    }

    /// `create_index`: validate then append a secondary index, empty.
    pub fn create_index(&mut self, def: IndexDef) -> Result<()> {
        if self.indexes.is_empty() {
            return Err(Error::ModifyIndex("space has no primary key yet".into()));
        }
        check_index_def(&def, false)?;
        self.indexes.push(Index::new(&def));
        self.index_defs.push(def);
        Ok(())
    }

    /// `check_format(old, new)`: scan the primary and validate every
    /// tuple against the candidate format.
    pub fn check_format(&self, new_format: &Format) -> Result<()> {
        let primary = self.primary()?;
        for tuple in primary.snapshot_iterator() {
            tuple.validate(new_format)?;
        }
        Ok(())
    }

    /// `build_secondary_key(old, new, idx)`: populate a freshly created
    /// secondary index from the current primary, validating against the
    /// (possibly new) format as it goes. Any validation failure aborts
    /// the build, leaving the index untouched from the caller's point of
    /// view (the caller should discard it on error; we don't partially
    /// publish it into `index_defs`).
    pub fn build_secondary_key(&mut self, def: IndexDef) -> Result<()> {
        check_index_def(&def, false)?;
        if self.errinj_build_secondary == Some(def.id) {
            return Err(Error::Injection("buildSecondaryKey".into()));
        }
        let mut built = Index::new(&def);
        built.begin_build();
        for tuple in self.primary()?.snapshot_iterator() {
            tuple.validate(&self.format)?;
            built.build_next(tuple)?;
        }
        built.end_build();
        self.indexes.push(built);
        self.index_defs.push(def);
        Ok(())
    }

    /// `prepare_truncate`: a fresh, empty space inheriting this one's
    /// index defs and write discipline.
    pub fn prepare_truncate(&self) -> Space {
        let mut next = Space::with_config(self.format.clone(), self.config);
        next.recovery_mode = self.recovery_mode;
        for def in &self.index_defs {
            next.indexes.push(Index::new(def));
            next.index_defs.push(def.clone());
        }
        next
    }

    /// `memtx_space_prune`: walk the primary's natural order and release
    /// every tuple it holds. Shared by `commit_truncate` and by
    /// `commit_alter`'s prune branch.
    fn prune_primary(&self) {
        if let Ok(primary) = self.primary() {
            for tuple in primary.snapshot_iterator() {
                tuple.release();
            }
        }
    }

    /// `commit_truncate`: release every tuple the old primary held.
    pub fn commit_truncate(&mut self) {
        self.prune_primary();
        self.bsize = 0;
    }

    /// `prepare_alter`: space-definition compatibility check, relaxed
    /// when the space is empty (nothing to reconcile).
    pub fn prepare_alter(&self, new_format: &Format) -> Result<()> {
        if self.primary().map(|p| p.size()).unwrap_or(0) == 0 {
            return Ok(());
        }
        self.check_format(new_format)
    }

    /// `commit_alter`: either prune (no indexes left, nothing to carry)
    /// or carry the existing indexes and `bsize` forward into the space
    /// now wearing the new format. Consumes `self` since the old space
    /// object is discarded once the new one is installed — an ALTER
    /// that only changes the format must not lose the indexes' contents.
    pub fn commit_alter(self, new_format: Format) -> Space {
        if self.indexes.is_empty() {
            return Space::with_config(new_format, self.config);
        }
        Space {
            indexes: self.indexes,
            index_defs: self.index_defs,
            format: new_format,
            bsize: self.bsize,
            recovery_mode: self.recovery_mode,
            config: self.config,
            errinj_build_secondary: self.errinj_build_secondary,
        }
    }

    /// `init_system_space`: a space pre-seeded with its system index
    /// defs (e.g. `_sequence_data`'s substituted HASH index, spec
    /// §4.3.4); callers pass the defs since system-table layout is
    /// decided above this module.
    pub fn init_system_space(format: Format, defs: Vec<IndexDef>) -> Result<Space> {
        let mut space = Space::new(format);
        for (i, def) in defs.into_iter().enumerate() {
            let is_primary = i == 0;
            check_index_def(&def, is_primary)?;
            space.indexes.push(Index::new(&def));
            space.index_defs.push(def);
        }
        space.recovery_mode = RecoveryMode::AllKeys;
        Ok(space)
    }

    /// `apply_initial_join_row`: bulk-load path used while streaming an
    /// initial join snapshot. Grounded on
    /// `memtx_space_apply_initial_join_row`: any opcode other than
    /// INSERT is rejected outright, the replica id is cleared (the row
    /// is being applied locally, not replicated in), and the row is
    /// then driven through the space's *current* write discipline via
    /// the ordinary `execute_replace` path — there is no separate
    /// write path for initial join.
    pub fn apply_initial_join_row(&mut self, req: &Request) -> Result<Statement> {
        if req.opcode != Opcode::Insert {
            return Err(Error::UnknownRequestType(req.opcode as u32));
        }
        let mut req = req.clone();
        req.replica_id = 0;
        self.execute_replace(&req)
    }

    // ---------------------------------------------------------------
    // Recovery-mode dispatch (spec §4.3, table of write paths)
    // ---------------------------------------------------------------

    fn dispatch_replace(
        &mut self,
        old: Option<Tuple>,
        new: Option<Tuple>,
        mode: ReplaceMode,
    ) -> Result<Option<Tuple>> {
        match self.recovery_mode {
            RecoveryMode::NoKeys => Err(Error::Fatal(
                "replace invoked on a space with no primary key".into(),
            )),
            RecoveryMode::BuildNext => self.replace_build_next(old, new, mode),
            RecoveryMode::PrimaryKey => self.replace_primary_key(old, new, mode),
            RecoveryMode::AllKeys => self.replace_all_keys(old, new, mode),
        }
    }

    /// `build_next`: bulk load from snapshot. No uniqueness check; just
    /// append into the primary's build buffer and track `bsize`.
    fn replace_build_next(
        &mut self,
        old: Option<Tuple>,
        new: Option<Tuple>,
        mode: ReplaceMode,
    ) -> Result<Option<Tuple>> {
        if old.is_some() || mode != ReplaceMode::DupInsert {
            return Err(Error::Fatal(
                "build_next replace requires old == null and DUP_INSERT".into(),
            ));
        }
        let new = new.ok_or_else(|| Error::Fatal("build_next replace requires a new tuple".into()))?;
        self.update_bsize(0, new.bsize());
        self.indexes[0].build_next(new)?;
        Ok(None)
    }

    /// `primary_key`: WAL replay. Drives only the primary; secondaries
    /// are rebuilt at end-of-recovery via `build_secondary_key`.
    fn replace_primary_key(
        &mut self,
        old: Option<Tuple>,
        new: Option<Tuple>,
        mode: ReplaceMode,
    ) -> Result<Option<Tuple>> {
        let new_len = new.as_ref().map(|t| t.bsize()).unwrap_or(0);
        let effective_old = self.indexes[0].replace(old.as_ref(), new.as_ref(), mode)?;
        let old_len = effective_old.as_ref().map(|t| t.bsize()).unwrap_or(0);
        self.update_bsize(old_len, new_len);
        Ok(effective_old)
    }

    /// `all_keys`: the hardest path (spec §4.3.2). Full multi-index
    /// fan-out with compensating rollback on any secondary failure.
    fn replace_all_keys(
        &mut self,
        old: Option<Tuple>,
        new: Option<Tuple>,
        mode: ReplaceMode,
    ) -> Result<Option<Tuple>> {
        let mut reserve = ExtentReserve::from_config(&self.config, new.is_some());
        if !reserve.draw() {
            return Err(Error::OutOfMemory(
                "extent reserve exhausted before primary replace".into(),
            ));
        }

        let effective_old = self.indexes[0].replace(old.as_ref(), new.as_ref(), mode)?;
        // Index 0 (primary) is always "touched" once we reach here.
        let mut touched: Vec<usize> = vec![0];

        for i in 1..self.indexes.len() {
            if !reserve.draw() {
                return Err(Error::OutOfMemory(
                    "extent reserve exhausted before secondary replace".into(),
                ));
            }
            match self.indexes[i].replace(effective_old.as_ref(), new.as_ref(), ReplaceMode::DupInsert) {
                Ok(_) => touched.push(i),
                Err(err) => {
                    // Roll back every touched index, in reverse order,
                    // by re-calling replace with old/new swapped.
                    for &j in touched.iter().rev() {
                        let rollback = self.indexes[j].replace(
                            new.as_ref(),
                            effective_old.as_ref(),
                            ReplaceMode::DupInsert,
                        );
                        if rollback.is_err() {
                            // Spec §9 open question: the reservation
                            // discipline is supposed to make this
                            // unreachable. Surface it loudly rather
                            // than silently leaving the space
                            // inconsistent.
                            error!("compensating replace failed during rollback on index {}", j);
                            return Err(Error::Fatal(
                                "rollback replace failed; extent reservation invariant violated".into(),
                            ));
                        }
                    }
                    return Err(err);
                }
            }
        }

        let old_len = effective_old.as_ref().map(|t| t.bsize()).unwrap_or(0);
        let new_len = new.as_ref().map(|t| t.bsize()).unwrap_or(0);
        self.update_bsize(old_len, new_len);
        Ok(effective_old)
    }

    // ---------------------------------------------------------------
    // The five DML operations (spec §4.3.3)
    // ---------------------------------------------------------------

    /// REPLACE / INSERT.
    pub fn execute_replace(&mut self, req: &Request) -> Result<Statement> {
        let mut stmt = Statement::new(req.opcode);
        let row = req
            .tuple
            .clone()
            .ok_or_else(|| Error::Unsupported("replace/insert requires a tuple".into()))?;
        validate_row(&row, &self.format)?;
        let tuple = Tuple::from_row(0, &row)?;
        tuple.retain();
        let mode = match req.opcode {
            Opcode::Insert => ReplaceMode::DupInsert,
            _ => ReplaceMode::DupReplaceOrInsert,
        };
        match self.dispatch_replace(None, Some(tuple.clone()), mode) {
            Ok(old) => {
                stmt.old_tuple = old;
                stmt.new_tuple = Some(tuple);
                stmt.engine_savepoint = true;
                Ok(stmt)
            }
            Err(err) => {
                tuple.release();
                Err(err)
            }
        }
    }

    /// DELETE.
    pub fn execute_delete(&mut self, req: &Request) -> Result<Statement> {
        let mut stmt = Statement::new(Opcode::Delete);
        let index = self.index(req.index_id)?;
        let key = req.key.clone().unwrap_or_default();
        index.key_def().validate_part_count(key.len())?;
        let found = index.get(&key)?;
        let found = match found {
            Some(t) => t,
            None => return Ok(stmt), // absence is not an error (spec §7)
        };
        let removed = self.dispatch_replace(Some(found), None, ReplaceMode::DupInsert)?;
        stmt.old_tuple = removed;
        stmt.engine_savepoint = true;
        Ok(stmt)
    }

    /// UPDATE.
    pub fn execute_update(&mut self, req: &Request) -> Result<Statement> {
        let mut stmt = Statement::new(Opcode::Update);
        let index = self.index(req.index_id)?;
        let key = req.key.clone().unwrap_or_default();
        index.key_def().validate_part_count(key.len())?;
        let old = match index.get(&key)? {
            Some(t) => t,
            None => return Ok(stmt),
        };
        let field_count = self.format.field_count();
        let old_row = old.row(field_count)?;
        let (new_row, _mask) = update::apply_strict(&old_row, &req.ops)?;
        validate_row(&new_row, &self.format)?;
        let new_tuple = Tuple::from_row(0, &new_row)?;
        new_tuple.retain();
        match self.dispatch_replace(Some(old), Some(new_tuple.clone()), ReplaceMode::DupReplace) {
            Ok(effective_old) => {
                stmt.old_tuple = effective_old;
                stmt.new_tuple = Some(new_tuple);
                stmt.engine_savepoint = true;
                Ok(stmt)
            }
            Err(err) => {
                new_tuple.release();
                Err(err)
            }
        }
    }

    /// UPSERT. Never returns a tuple to the caller; primary-key-altering
    /// ops are dropped with a logged warning rather than applied.
    pub fn execute_upsert(&mut self, req: &Request) -> Result<Statement> {
        let mut stmt = Statement::new(Opcode::Upsert);
        let row = req
            .tuple
            .clone()
            .ok_or_else(|| Error::Unsupported("upsert requires a tuple".into()))?;
        validate_row(&row, &self.format)?;

        let primary_def = self
            .index_defs
            .first()
            .ok_or_else(|| Error::Unsupported("space has no primary key".into()))?
            .clone();
        let pk = primary_def.key_def.extract(&row)?;

        match self.primary()?.get(&pk)? {
            None => {
                // Verify the op list is well-formed even though it will
                // not run, then insert as if this were a plain INSERT.
                update::apply_lenient(&row, &req.ops)?;
                let tuple = Tuple::from_row(0, &row)?;
                tuple.retain();
                match self.dispatch_replace(None, Some(tuple.clone()), ReplaceMode::DupInsert) {
                    Ok(old) => {
                        stmt.old_tuple = old;
                        // UPSERT never surfaces the new tuple; drop our
                        // retain on the statement's behalf now that the
                        // indexes hold their own.
                        tuple.release();
                        stmt.engine_savepoint = true;
                        Ok(stmt)
                    }
                    Err(err) => {
                        tuple.release();
                        Err(err)
                    }
                }
            }
            Some(old) => {
                let old_row = old.row(self.format.field_count())?;
                let (new_row, _mask) = update::apply_lenient(&old_row, &req.ops)?;
                let new_pk = primary_def.key_def.extract(&new_row)?;
                if new_pk != pk {
                    // Primary-key-changing upsert: logged and dropped,
                    // not an error (spec §4.3.3, §7, invariant 8).
                    warn!(
                        "upsert on space would change primary key; dropping as a no-op"
                    );
                    stmt.old_tuple = None;
                    stmt.new_tuple = None;
                    return Ok(stmt);
                }
                validate_row(&new_row, &self.format)?;
                let new_tuple = Tuple::from_row(0, &new_row)?;
                new_tuple.retain();
                match self.dispatch_replace(
                    Some(old),
                    Some(new_tuple.clone()),
                    ReplaceMode::DupReplaceOrInsert,
                ) {
                    Ok(effective_old) => {
                        stmt.old_tuple = effective_old;
                        new_tuple.release();
                        stmt.engine_savepoint = true;
                        Ok(stmt)
                    }
                    Err(err) => {
                        new_tuple.release();
                        Err(err)
                    }
                }
            }
        }
    }

    /// SELECT: initialize an iterator, skip `offset`, emit at most
    /// `limit` tuples in the index's natural order.
    pub fn execute_select(&self, req: &Request) -> Result<Vec<Tuple>> {
        let index = self.index(req.index_id)?;
        let iterator_type = req
            .iterator_type
            .ok_or_else(|| Error::Unsupported("select requires an iterator type".into()))?;
        if let Some(key) = &req.key {
            index.key_def().validate_part_count(key.len())?;
        }
        let iter = index.iterator(iterator_type, req.key.as_ref())?;
        Ok(iter.skip(req.offset).take(req.limit).collect())
    }
}
