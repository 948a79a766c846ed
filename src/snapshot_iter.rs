//! Snapshot-iterator adapter for the sequence-data system space
//! (spec §3 C6, §4.3.4: "System table `_sequence_data` gets a hash
//! index with a substituted snapshot-iterator that walks the live
//! sequence cache rather than the hash table").
//!
//! Grounded on `sequence_data_index_new`/`sequence_data_index_create_
//! snapshot_iterator` in `original_source/src/box/memtx_space.cc`: a
//! HASH index whose checkpoint writer must see the authoritative
//! sequence counters, not whatever happens to be resident in the index
//! at snapshot time.

use crate::row::{FieldValue, Row};

/// A live sequence counter: sequence id plus its current value, the row
/// shape `_sequence_data` checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceCacheEntry {
    pub sequence_id: u64,
    pub value: i64,
}

/// Snapshot iterator that walks the live sequence cache instead of the
/// `_sequence_data` hash index's own storage, so a checkpoint always
/// reflects the authoritative counters even if the index hasn't been
/// touched since they last advanced.
pub struct SequenceSnapshotIterator<'a> {
    cache: std::slice::Iter<'a, SequenceCacheEntry>,
}

impl<'a> SequenceSnapshotIterator<'a> {
    pub fn new(cache: &'a [SequenceCacheEntry]) -> SequenceSnapshotIterator<'a> {
        SequenceSnapshotIterator { cache: cache.iter() }
    }
}

impl<'a> Iterator for SequenceSnapshotIterator<'a> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.cache.next().map(|entry| {
            vec![
                FieldValue::Unsigned(entry.sequence_id),
                FieldValue::Integer(entry.value),
            ]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_cache_not_index_storage() {
        let cache = vec![
            SequenceCacheEntry { sequence_id: 1, value: 10 },
            SequenceCacheEntry { sequence_id: 2, value: -3 },
        ];
        let rows: Vec<Row> = SequenceSnapshotIterator::new(&cache).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], FieldValue::Unsigned(1));
        assert_eq!(rows[1][1], FieldValue::Integer(-3));
    }
}
