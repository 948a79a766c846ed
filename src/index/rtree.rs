//! RTREE index (spec §4.2): single-part, non-unique, ARRAY-typed bounding
//! boxes, supporting the `Overlaps` iterator kind.
//!
//! Grounded on `check_index_def`'s `RTREE` branch in
//! `original_source/src/box/memtx_space.cc` (exactly one part, non-unique,
//! ARRAY field type encoding a bounding box as a flat coordinate list).
//! No R-tree crate appears anywhere in the retrieval pack, so this is a
//! linear-scan stand-in rather than a true spatial tree: correct by the
//! index contract, but O(n) per query instead of O(log n). Flagged here
//! rather than hidden behind a misleadingly tree-shaped name.

use crate::error::{Error, Result};
use crate::index::{IndexContract, IteratorType, ReplaceMode};
use crate::key::{Key, KeyDef};
use crate::row::FieldValue;
use crate::tuple::Tuple;

pub struct RtreeIndex {
    key_def: KeyDef,
    entries: Vec<(Vec<f64>, Tuple)>,
}

impl RtreeIndex {
    pub fn new(key_def: KeyDef) -> RtreeIndex {
        RtreeIndex {
            key_def,
            entries: Vec::new(),
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

    fn bbox_of(value: &FieldValue) -> Result<Vec<f64>> {
        match value {
            FieldValue::Array(coords) => Ok(coords.clone()),
            other => Err(Error::IndexType(format!(
                "rtree index key must be an array (bounding box), found {:?}",
                other
            ))),
        }
    }

    fn bbox_of_tuple(&self, tuple: &Tuple) -> Result<Vec<f64>> {
        let row = tuple.row(self.row_width())?;
        let key = self.key_def.extract(&row)?;
        Self::bbox_of(key.first().unwrap_or(&FieldValue::Null))
    }

    fn overlaps(a: &[f64], b: &[f64]) -> bool {
        let dims = a.len().min(b.len()) / 2;
        for d in 0..dims {
            let (a_lo, a_hi) = (a[2 * d], a[2 * d + 1]);
            let (b_lo, b_hi) = (b[2 * d], b[2 * d + 1]);
            if a_hi < b_lo || b_hi < a_lo {
                return false;
            }
        }
        true
    }
}

impl IndexContract for RtreeIndex {
    fn replace(
        &mut self,
        old: Option<&Tuple>,
        new: Option<&Tuple>,
        mode: ReplaceMode,
    ) -> Result<Option<Tuple>> {
        let _ = mode; // RTREE is never unique (check_index_def rejects it).
        match (old, new) {
            (Some(old_t), None) => {
                if let Some(pos) = self.entries.iter().position(|(_, t)| t == old_t) {
                    let (_, removed) = self.entries.remove(pos);
                    removed.release();
                    Ok(Some(removed))
                } else {
                    Err(Error::NotFound(format!("{:?}", old_t.data_range())))
                }
            }
            (None, Some(new_t)) => {
                let bbox = self.bbox_of_tuple(new_t)?;
                new_t.retain();
                self.entries.push((bbox, new_t.clone()));
                Ok(None)
            }
            (Some(old_t), Some(new_t)) => {
                if let Some(pos) = self.entries.iter().position(|(_, t)| t == old_t) {
                    let (_, removed) = self.entries.remove(pos);
                    removed.release();
                }
                let bbox = self.bbox_of_tuple(new_t)?;
                new_t.retain();
                self.entries.push((bbox, new_t.clone()));
                Ok(Some(old_t.clone()))
            }
            (None, None) => Ok(None),
        }
    }

    fn get(&self, key: &Key) -> Result<Option<Tuple>> {
        self.key_def.validate_part_count(key.len())?;
        let bbox = Self::bbox_of(key.first().unwrap_or(&FieldValue::Null))?;
        Ok(self
            .entries
            .iter()
            .find(|(b, _)| b == &bbox)
            .map(|(_, t)| t.clone()))
    }

    fn iterator(
        &self,
        kind: IteratorType,
        key: Option<&Key>,
    ) -> Result<Box<dyn Iterator<Item = Tuple> + '_>> {
        match kind {
            IteratorType::All => Ok(Box::new(self.entries.iter().map(|(_, t)| t.clone()))),
            IteratorType::Overlaps => {
                let query = match key {
                    Some(k) => Self::bbox_of(k.first().unwrap_or(&FieldValue::Null))?,
                    None => return Ok(Box::new(std::iter::empty())),
                };
                let hits: Vec<Tuple> = self
                    .entries
                    .iter()
                    .filter(move |(b, _)| Self::overlaps(b, &query))
                    .map(|(_, t)| t.clone())
                    .collect();
                Ok(Box::new(hits.into_iter()))
            }
            _ => Ok(Box::new(std::iter::empty())),
        }
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn begin_build(&mut self) {}
    fn end_build(&mut self) {}

    fn build_next(&mut self, tuple: Tuple) -> Result<()> {
        let bbox = self.bbox_of_tuple(&tuple)?;
        tuple.retain();
        self.entries.push((bbox, tuple));
        Ok(())
    }

    fn snapshot_iterator(&self) -> Box<dyn Iterator<Item = Tuple> + '_> {
        Box::new(self.entries.iter().map(|(_, t)| t.clone()))
    }
}
