//! Tuple handle (spec §3 C1).
//!
//! An opaque, immutable byte sequence plus a format descriptor. Tuples
//! are shared between indexes, statements and iterators; under the
//! single-threaded cooperative scheduler (spec §5) that sharing is
//! exactly `Rc` — no atomics are needed.
//!
//! The vtable-style `ref`/`unref` operations named in spec §4.1 are kept
//! as explicit methods (`Tuple::retain`/`Tuple::release`) so the index
//! fan-out code in `space` reads the way the original engine's does:
//! every successful insertion into an index is paired with a visible
//! reference-count bump.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::format::{Format, FormatId};
use crate::row::Row;

struct TupleInner {
    format: FormatId,
    bytes: Vec<u8>,
    /// Debug-only refcount mirror, checked against property 3 of spec §8
    /// (refcount = indexes + statements + iterators holding the tuple).
    refs: Cell<u32>,
}

/// A reference-counted, immutable tuple.
///
/// Cloning a `Tuple` is a cheap `Rc` clone, not the spec's `ref`
/// operation — use `retain`/`release` for that; they drive the logical
/// refcount that tests assert against. `new` allocates with a logical
/// refcount of zero, matching the spec: the caller must explicitly
/// `retain` before handing the tuple to an index.
#[derive(Clone)]
pub struct Tuple(Rc<TupleInner>);

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tuple")
            .field("format", &self.0.format)
            .field("bsize", &self.0.bytes.len())
            .field("refs", &self.0.refs.get())
            .finish()
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Tuple {}

impl Tuple {
    /// Allocate a new tuple from pre-encoded bytes.
    pub fn new(format: FormatId, bytes: Vec<u8>) -> Result<Tuple> {
        Ok(Tuple(Rc::new(TupleInner {
            format,
            bytes,
            refs: Cell::new(0),
        })))
    }

    /// Allocate a new tuple from a decoded row, encoding it first.
    pub fn from_row(format: FormatId, row: &Row) -> Result<Tuple> {
        let bytes = crate::row::encode_row(row)?;
        Tuple::new(format, bytes)
    }

    /// Increment the logical refcount. Call this once per index (or
    /// statement) that starts holding this tuple.
    pub fn retain(&self) {
        self.0.refs.set(self.0.refs.get() + 1);
    }

    /// Decrement the logical refcount. Call this once per index (or
    /// statement) that stops holding this tuple.
    pub fn release(&self) {
        let n = self.0.refs.get();
        debug_assert!(n > 0, "unref on tuple with zero refcount");
        self.0.refs.set(n.saturating_sub(1));
    }

    /// Current logical refcount, for invariant checks in tests.
    pub fn refcount(&self) -> u32 {
        self.0.refs.get()
    }

    pub fn format(&self) -> FormatId {
        self.0.format
    }

    /// `(ptr, len)` window onto the payload bytes (spec §4.1 `data_range`).
    pub fn data_range(&self) -> &[u8] {
        &self.0.bytes
    }

    /// Stored payload size (spec §4.1 `bsize`).
    pub fn bsize(&self) -> usize {
        self.0.bytes.len()
    }

    /// Decode this tuple's payload into a row of `field_count` values.
    pub fn row(&self, field_count: usize) -> Result<Row> {
        crate::row::decode_row(&self.0.bytes, field_count)
    }

    /// Structural conformance check against a format: decode the payload
    /// and check each field's type (spec §4.1 `validate`).
    pub fn validate(&self, format: &Format) -> Result<()> {
        let row = self.row(format.field_count())?;
        crate::row::validate_row(&row, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::FieldValue;

    #[test]
    fn retain_release_tracks_refcount() {
        let t = Tuple::from_row(0, &vec![FieldValue::Unsigned(1)]).unwrap();
        assert_eq!(t.refcount(), 0);
        t.retain();
        t.retain();
        assert_eq!(t.refcount(), 2);
        t.release();
        assert_eq!(t.refcount(), 1);
    }

    #[test]
    fn row_round_trips_through_bytes() {
        let row = vec![FieldValue::Unsigned(7), FieldValue::String("x".into())];
        let t = Tuple::from_row(0, &row).unwrap();
        assert_eq!(t.row(2).unwrap(), row);
    }
}
