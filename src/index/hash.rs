//! HASH index (spec §4.2): unique-only, no ordered iteration.
//!
//! Grounded on `check_index_def`'s `HASH` branch in
//! `original_source/src/box/memtx_space.cc`, which rejects non-unique
//! HASH indexes outright; we encode that as a constructor-time
//! assumption rather than a runtime check here (`validate::check_index_def`
//! is the place that rejects a non-unique HASH definition before an
//! `Index::Hash` is ever built).

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::index::{decide_insert, IndexContract, InsertDecision, IteratorType, ReplaceMode};
use crate::key::{Key, KeyDef};
use crate::tuple::Tuple;

pub struct HashIndex {
    key_def: KeyDef,
    map: HashMap<Key, Tuple>,
}

impl HashIndex {
    pub fn new(key_def: KeyDef) -> HashIndex {
        HashIndex {
            key_def,
            map: HashMap::new(),
        }
    }

    pub fn key_def(&self) -> &KeyDef {
        &self.key_def
    }

    fn row_width(&self) -> usize {
        self.key_def
            .parts
            .iter()
            .map(|p| p.field)
            .max()
            .map(|m| m + 1)
            .unwrap_or(0)
    }

    fn key_of(&self, tuple: &Tuple) -> Result<Key> {
        let row = tuple.row(self.row_width())?;
        self.key_def.extract(&row)
    }

    fn insert(&mut self, tuple: &Tuple) -> Result<()> {
        let key = self.key_of(tuple)?;
        tuple.retain();
        if let Some(prev) = self.map.insert(key, tuple.clone()) {
            prev.release();
        }
        Ok(())
    }

    fn remove_by_key(&mut self, key: &Key) -> Option<Tuple> {
        let removed = self.map.remove(key);
        if let Some(removed) = &removed {
            removed.release();
        }
        removed
    }
}

impl IndexContract for HashIndex {
    fn replace(
        &mut self,
        old: Option<&Tuple>,
        new: Option<&Tuple>,
        mode: ReplaceMode,
    ) -> Result<Option<Tuple>> {
        match (old, new) {
            (Some(old), None) => {
                let key = self.key_of(old)?;
                self.remove_by_key(&key)
                    .ok_or_else(|| Error::NotFound(format!("{:?}", old.data_range())))
                    .map(Some)
            }
            (None, Some(new)) => {
                let key = self.key_of(new)?;
                let existing = self.map.get(&key).cloned();
                match decide_insert(mode, existing)? {
                    InsertDecision::Insert => {
                        self.insert(new)?;
                        Ok(None)
                    }
                    InsertDecision::Replace(existing) => {
                        self.remove_by_key(&key);
                        self.insert(new)?;
                        Ok(Some(existing))
                    }
                }
            }
            (Some(old), Some(new)) => {
                let _ = mode; // mode only disambiguates the insert-shaped
                              // case below; here `old` is already known, so
                              // a collision at the new key is always a
                              // duplicate regardless of mode.
                let old_key = self.key_of(old)?;
                let removed = self
                    .remove_by_key(&old_key)
                    .ok_or_else(|| Error::NotFound(format!("{:?}", old.data_range())))?;
                let new_key = self.key_of(new)?;
                match self.map.get(&new_key).cloned() {
                    Some(existing) => {
                        // Some other tuple already holds the target key;
                        // restore our own state before propagating, since
                        // the caller only rolls back indexes it saw succeed.
                        self.insert(old)?;
                        Err(Error::DuplicateKey(format!("{:?}", existing.data_range())))
                    }
                    None => {
                        self.insert(new)?;
                        Ok(Some(removed))
                    }
                }
            }
            (None, None) => Ok(None),
        }
    }

    fn get(&self, key: &Key) -> Result<Option<Tuple>> {
        self.key_def.validate_part_count(key.len())?;
        Ok(self.map.get(key).cloned())
    }

    fn iterator(
        &self,
        kind: IteratorType,
        key: Option<&Key>,
    ) -> Result<Box<dyn Iterator<Item = Tuple> + '_>> {
        match kind {
            IteratorType::All => Ok(Box::new(self.map.values().cloned())),
            IteratorType::Eq => {
                let key = key.cloned().unwrap_or_default();
                Ok(Box::new(self.map.get(&key).cloned().into_iter()))
            }
            _ => Ok(Box::new(std::iter::empty())),
        }
    }

    fn size(&self) -> usize {
        self.map.len()
    }

    fn begin_build(&mut self) {}
    fn end_build(&mut self) {}

    fn build_next(&mut self, tuple: Tuple) -> Result<()> {
        let key = self.key_of(&tuple)?;
        tuple.retain();
        self.map.insert(key, tuple);
        Ok(())
    }

    fn snapshot_iterator(&self) -> Box<dyn Iterator<Item = Tuple> + '_> {
        Box::new(self.map.values().cloned())
    }
}
