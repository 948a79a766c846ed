//! TREE index (spec §4.2): ordered, may be unique or non-unique,
//! supports nullable key parts.
//!
//! Grounded on `check_index_def`'s unconstrained `TREE` branch in
//! `original_source/src/box/memtx_space.cc` (any field type between
//! `FIELD_TYPE_ANY` and `FIELD_TYPE_ARRAY` is accepted) and on the
//! teacher crate's `Llrb` ordered-map usage pattern (`rdms::index::Index`
//! dispatching to an in-memory left-leaning red-black tree). We use
//! `BTreeMap` here since the spec asks only for the ordering contract,
//! not for the teacher's specific tree structure.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::index::{decide_insert, IndexContract, InsertDecision, IteratorType, ReplaceMode};
use crate::key::{Key, KeyDef};
use crate::tuple::Tuple;

pub struct TreeIndex {
    key_def: KeyDef,
    map: BTreeMap<Key, Vec<Tuple>>,
    is_unique: bool,
}

impl TreeIndex {
    /// A `KeyDef` alone doesn't say whether the index is unique; the
    /// executor always drives non-unique TREE secondaries with
    /// `DUP_INSERT` (spec §4.2), so `new` defaults to non-unique and
    /// `new_unique` is used for a TREE primary key.
    pub fn new(key_def: KeyDef) -> TreeIndex {
        TreeIndex {
            key_def,
            map: BTreeMap::new(),
            is_unique: false,
        }
    }

    pub fn new_unique(key_def: KeyDef) -> TreeIndex {
        TreeIndex {
            key_def,
            map: BTreeMap::new(),
            is_unique: true,
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

    fn insert(&mut self, key: Key, tuple: &Tuple) {
        tuple.retain();
        self.map.entry(key).or_insert_with(Vec::new).push(tuple.clone());
    }

    /// Remove the first bucket entry that's `Rc`-identical to `tuple`.
    fn remove_one(&mut self, key: &Key, tuple: &Tuple) -> Option<Tuple> {
        let bucket = self.map.get_mut(key)?;
        let pos = bucket.iter().position(|existing| existing == tuple)?;
        let removed = bucket.remove(pos);
        removed.release();
        if bucket.is_empty() {
            self.map.remove(key);
        }
        Some(removed)
    }
}

impl IndexContract for TreeIndex {
    fn replace(
        &mut self,
        old: Option<&Tuple>,
        new: Option<&Tuple>,
        mode: ReplaceMode,
    ) -> Result<Option<Tuple>> {
        match (old, new) {
            (Some(old), None) => {
                let key = self.key_of(old)?;
                self.remove_one(&key, old)
                    .ok_or_else(|| Error::NotFound(format!("{:?}", old.data_range())))
                    .map(Some)
            }
            (None, Some(new)) => {
                let key = self.key_of(new)?;
                if !self.is_unique {
                    // Non-unique TREE: every insert just appends to the
                    // bucket; the executor never needs collision
                    // handling here since only a unique primary ever
                    // receives a non-DUP_INSERT mode (spec §4.2).
                    self.insert(key, new);
                    return Ok(None);
                }
                let existing = self.map.get(&key).and_then(|bucket| bucket.first().cloned());
                match decide_insert(mode, existing)? {
                    InsertDecision::Insert => {
                        self.insert(key, new);
                        Ok(None)
                    }
                    InsertDecision::Replace(existing) => {
                        self.remove_one(&key, &existing);
                        self.insert(key, new);
                        Ok(Some(existing))
                    }
                }
            }
            (Some(old), Some(new)) => {
                let _ = mode; // see HashIndex::replace: mode only governs
                              // the insert-shaped case below.
                let old_key = self.key_of(old)?;
                let removed = self
                    .remove_one(&old_key, old)
                    .ok_or_else(|| Error::NotFound(format!("{:?}", old.data_range())))?;
                let new_key = self.key_of(new)?;
                if !self.is_unique {
                    self.insert(new_key, new);
                    return Ok(Some(removed));
                }
                match self.map.get(&new_key).and_then(|bucket| bucket.first().cloned()) {
                    Some(existing) => {
                        self.insert(old_key, old);
                        Err(Error::DuplicateKey(format!("{:?}", existing.data_range())))
                    }
                    None => {
                        self.insert(new_key, new);
                        Ok(Some(removed))
                    }
                }
            }
            (None, None) => Ok(None),
        }
    }

    fn get(&self, key: &Key) -> Result<Option<Tuple>> {
        self.key_def.validate_part_count(key.len())?;
        Ok(self.map.get(key).and_then(|bucket| bucket.first().cloned()))
    }

    fn iterator(
        &self,
        kind: IteratorType,
        key: Option<&Key>,
    ) -> Result<Box<dyn Iterator<Item = Tuple> + '_>> {
        let all = || self.map.values().flat_map(|bucket| bucket.iter().cloned());
        match kind {
            IteratorType::All => Ok(Box::new(all().collect::<Vec<_>>().into_iter())),
            IteratorType::Req => {
                let mut items: Vec<_> = all().collect();
                items.reverse();
                Ok(Box::new(items.into_iter()))
            }
            IteratorType::Eq => {
                let key = key.cloned().unwrap_or_default();
                let items = self.map.get(&key).cloned().unwrap_or_default();
                Ok(Box::new(items.into_iter()))
            }
            IteratorType::Lt | IteratorType::Le | IteratorType::Ge | IteratorType::Gt => {
                let key = key.cloned().unwrap_or_default();
                let items: Vec<Tuple> = match kind {
                    IteratorType::Lt => self
                        .map
                        .range(..key)
                        .flat_map(|(_, b)| b.iter().cloned())
                        .collect(),
                    IteratorType::Le => self
                        .map
                        .range(..=key)
                        .flat_map(|(_, b)| b.iter().cloned())
                        .collect(),
                    IteratorType::Ge => self
                        .map
                        .range(key..)
                        .flat_map(|(_, b)| b.iter().cloned())
                        .collect(),
                    IteratorType::Gt => {
                        use std::ops::Bound;
                        self.map
                            .range((Bound::Excluded(key), Bound::Unbounded))
                            .flat_map(|(_, b)| b.iter().cloned())
                            .collect()
                    }
                    _ => unreachable!(),
                };
                Ok(Box::new(items.into_iter()))
            }
            _ => Ok(Box::new(std::iter::empty())),
        }
    }

    fn size(&self) -> usize {
        self.map.values().map(|b| b.len()).sum()
    }

    fn begin_build(&mut self) {}
    fn end_build(&mut self) {}

    fn build_next(&mut self, tuple: Tuple) -> Result<()> {
        let key = self.key_of(&tuple)?;
        tuple.retain();
        self.map.entry(key).or_insert_with(Vec::new).push(tuple);
        Ok(())
    }

    fn snapshot_iterator(&self) -> Box<dyn Iterator<Item = Tuple> + '_> {
        Box::new(self.map.values().flat_map(|bucket| bucket.iter().cloned()))
    }
}
