//! BITSET index (spec §4.2): single-part, non-unique, UNSIGNED- or
//! STRING-typed, supporting the `BitsAllSet`/`BitsAnySet`/`BitsAllNotSet`
//! iterator kinds.
//!
//! Grounded on `check_index_def`'s `BITSET` branch in
//! `original_source/src/box/memtx_space.cc` (exactly one part, non-unique,
//! UNSIGNED or STRING) and on the teacher crate's `croaring` bitmap
//! wrapper (`rdms::bitmaps::croaring::CRoaring`) for the storage crate.
//! Each key value is treated as a 64-bit mask; we keep one `Bitmap` per
//! bit position (a bit-sliced index) so `ALL_SET`/`ANY_SET`/`ALL_NOT_SET`
//! reduce to intersection/union/difference over up to 64 roaring bitmaps,
//! the standard way to answer bitmask queries with a set structure that
//! only ever stores integer ids.

use std::collections::HashMap;

use croaring::bitmap::Bitmap;

use crate::error::{Error, Result};
use crate::index::{IndexContract, IteratorType, ReplaceMode};
use crate::key::{Key, KeyDef};
use crate::row::FieldValue;
use crate::tuple::Tuple;

const BITS: usize = 64;

pub struct BitsetIndex {
    key_def: KeyDef,
    planes: Vec<Bitmap>,
    by_id: HashMap<u32, (Tuple, u64)>,
    next_id: u32,
}

impl BitsetIndex {
    pub fn new(key_def: KeyDef) -> BitsetIndex {
        BitsetIndex {
            key_def,
            planes: (0..BITS).map(|_| Bitmap::create()).collect(),
            by_id: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn key_def(&self) -> &KeyDef {
        &self.key_def
    }

    fn mask_of(value: &FieldValue) -> Result<u64> {
        match value {
            FieldValue::Unsigned(v) => Ok(*v),
            FieldValue::String(s) => {
                use std::collections::hash_map::DefaultHasher;
                use std::hash::{Hash, Hasher};
                let mut hasher = DefaultHasher::new();
                s.hash(&mut hasher);
                Ok(hasher.finish())
            }
            other => Err(Error::IndexType(format!(
                "bitset index key must be unsigned or string, found {:?}",
                other
            ))),
        }
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

    fn mask_of_tuple(&self, tuple: &Tuple) -> Result<u64> {
        let row = tuple.row(self.row_width())?;
        let key = self.key_def.extract(&row)?;
        Self::mask_of(key.first().unwrap_or(&FieldValue::Null))
    }

    fn insert_id(&mut self, id: u32, mask: u64) {
        for bit in 0..BITS {
            if mask & (1 << bit) != 0 {
                self.planes[bit].add(id);
            }
        }
    }

    fn remove_id(&mut self, id: u32, mask: u64) {
        for bit in 0..BITS {
            if mask & (1 << bit) != 0 {
                self.planes[bit].remove(id);
            }
        }
    }

    fn find_one(&self, mask: u64) -> Option<u32> {
        self.by_id
            .iter()
            .find(|(_, (_, m))| *m == mask)
            .map(|(id, _)| *id)
    }
}

impl IndexContract for BitsetIndex {
    fn replace(
        &mut self,
        old: Option<&Tuple>,
        new: Option<&Tuple>,
        mode: ReplaceMode,
    ) -> Result<Option<Tuple>> {
        match (old, new) {
            (Some(old_t), None) => {
                let mask = self.mask_of_tuple(old_t)?;
                let id = self.find_one(mask);
                match id {
                    Some(id) => {
                        self.remove_id(id, mask);
                        let (tuple, _) = self.by_id.remove(&id).unwrap();
                        tuple.release();
                        Ok(Some(tuple))
                    }
                    None => Err(Error::NotFound(format!("{:?}", old_t.data_range()))),
                }
            }
            (None, Some(new_t)) => {
                let mask = self.mask_of_tuple(new_t)?;
                // BITSET is never unique; DupInsert/DupReplace collapse to
                // plain insert the same way non-unique TREE parts do.
                let _ = mode;
                let id = self.next_id;
                self.next_id += 1;
                self.insert_id(id, mask);
                new_t.retain();
                self.by_id.insert(id, (new_t.clone(), mask));
                Ok(None)
            }
            (Some(old_t), Some(new_t)) => {
                let old_mask = self.mask_of_tuple(old_t)?;
                if let Some(id) = self.find_one(old_mask) {
                    self.remove_id(id, old_mask);
                    let (removed, _) = self.by_id.remove(&id).unwrap();
                    removed.release();
                }
                let new_mask = self.mask_of_tuple(new_t)?;
                let id = self.next_id;
                self.next_id += 1;
                self.insert_id(id, new_mask);
                new_t.retain();
                self.by_id.insert(id, (new_t.clone(), new_mask));
                Ok(Some(old_t.clone()))
            }
            (None, None) => Ok(None),
        }
    }

    fn get(&self, key: &Key) -> Result<Option<Tuple>> {
        self.key_def.validate_part_count(key.len())?;
        let mask = Self::mask_of(key.first().unwrap_or(&FieldValue::Null))?;
        Ok(self.find_one(mask).and_then(|id| self.by_id.get(&id)).map(|(t, _)| t.clone()))
    }

    fn iterator(
        &self,
        kind: IteratorType,
        key: Option<&Key>,
    ) -> Result<Box<dyn Iterator<Item = Tuple> + '_>> {
        let mask = match key {
            Some(k) => Self::mask_of(k.first().unwrap_or(&FieldValue::Null))?,
            None => 0,
        };
        // Membership tests go through `Bitmap::contains`, not bulk
        // enumeration, since that's the operation the teacher's own
        // `CRoaring` wrapper exercises directly (`bitmaps/croaring.rs`).
        let set_bits: Vec<usize> = (0..BITS).filter(|b| mask & (1 << b) != 0).collect();
        let ids: Vec<u32> = match kind {
            IteratorType::All => self.by_id.keys().cloned().collect(),
            IteratorType::BitsAnySet => self
                .by_id
                .keys()
                .filter(|id| set_bits.iter().any(|bit| self.planes[*bit].contains(**id)))
                .cloned()
                .collect(),
            IteratorType::BitsAllSet => self
                .by_id
                .keys()
                .filter(|id| set_bits.iter().all(|bit| self.planes[*bit].contains(**id)))
                .cloned()
                .collect(),
            IteratorType::BitsAllNotSet => self
                .by_id
                .keys()
                .filter(|id| set_bits.iter().all(|bit| !self.planes[*bit].contains(**id)))
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        let tuples: Vec<Tuple> = ids
            .into_iter()
            .filter_map(|id| self.by_id.get(&id).map(|(t, _)| t.clone()))
            .collect();
        Ok(Box::new(tuples.into_iter()))
    }

    fn size(&self) -> usize {
        self.by_id.len()
    }

    fn begin_build(&mut self) {}
    fn end_build(&mut self) {}

    fn build_next(&mut self, tuple: Tuple) -> Result<()> {
        let mask = self.mask_of_tuple(&tuple)?;
        let id = self.next_id;
        self.next_id += 1;
        self.insert_id(id, mask);
        tuple.retain();
        self.by_id.insert(id, (tuple, mask));
        Ok(())
    }

    fn snapshot_iterator(&self) -> Box<dyn Iterator<Item = Tuple> + '_> {
        Box::new(self.by_id.values().map(|(t, _)| t.clone()))
    }
}
