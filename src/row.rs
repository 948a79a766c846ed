//! Concrete tuple payload representation.
//!
//! Tuple byte encoding is explicitly out of scope for the space executor
//! (spec §1): "we use them only through a small vtable". For this crate
//! to be runnable end to end we still need *some* concrete encoding, so
//! we follow the teacher crate's choice of `cbordata` (`rdms::db::value`,
//! `rdms::bitmaps::{xor8,fuse16}` all `Cborize`/`FromCbor`/`IntoCbor`
//! their on-disk shapes) and store each tuple as a CBOR-encoded `Row`.
//! The space executor and index layer never interpret these bytes
//! directly except through `extract_key`.

use cbordata::{Cbor, Cborize, FromCbor, IntoCbor};

use crate::error::{Error, Result};
use crate::format::{FieldType, Format};

pub const FIELD_VALUE_VER: u32 = 0x0001_0001;

/// One column value. `Array` backs RTREE keys (a bounding box encoded as
/// a flat list of coordinates); `Unsigned`/`String` back BITSET keys;
/// everything else backs HASH/TREE keys.
#[derive(Clone, Debug, PartialEq, Cborize)]
pub enum FieldValue {
    Null,
    Unsigned(u64),
    Integer(i64),
    Double(u64), // bit-pattern, so FieldValue can be Eq/Ord/Hash
    Boolean(bool),
    String(String),
    Array(Vec<f64>),
}

impl FieldValue {
    pub const ID: u32 = FIELD_VALUE_VER;

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Null => FieldType::Any,
            FieldValue::Unsigned(_) => FieldType::Unsigned,
            FieldValue::Integer(_) => FieldType::Integer,
            FieldValue::Double(_) => FieldType::Double,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::String(_) => FieldType::String,
            FieldValue::Array(_) => FieldType::Array,
        }
    }
}

// Implement the trait bounds LLRB/BTree-style indexes want without
// pulling in a derive: total order over the representation above, with
// Null sorting first.
impl Eq for FieldValue {}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Null, _) => std::cmp::Ordering::Less,
            (_, Null) => std::cmp::Ordering::Greater,
            (Unsigned(a), Unsigned(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Double(a), Double(b)) => a.cmp(b),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Array(a), Array(b)) => a
                .iter()
                .map(|f| f.to_bits())
                .collect::<Vec<_>>()
                .cmp(&b.iter().map(|f| f.to_bits()).collect::<Vec<_>>()),
            // Mixed-type comparison only happens under programmer error
            // (comparing values from differently-typed key parts); order
            // by discriminant so it's at least total.
            _ => discriminant_rank(self).cmp(&discriminant_rank(other)),
        }
    }
}

impl std::hash::Hash for FieldValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use FieldValue::*;
        match self {
            Null => 0u8.hash(state),
            Unsigned(v) => {
                1u8.hash(state);
                v.hash(state)
            }
            Integer(v) => {
                2u8.hash(state);
                v.hash(state)
            }
            Double(v) => {
                3u8.hash(state);
                v.hash(state)
            }
            Boolean(v) => {
                4u8.hash(state);
                v.hash(state)
            }
            String(v) => {
                5u8.hash(state);
                v.hash(state)
            }
            Array(v) => {
                6u8.hash(state);
                for f in v {
                    f.to_bits().hash(state)
                }
            }
        }
    }
}

fn discriminant_rank(v: &FieldValue) -> u8 {
    match v {
        FieldValue::Null => 0,
        FieldValue::Unsigned(_) => 1,
        FieldValue::Integer(_) => 2,
        FieldValue::Double(_) => 3,
        FieldValue::Boolean(_) => 4,
        FieldValue::String(_) => 5,
        FieldValue::Array(_) => 6,
    }
}

/// A decoded row: the field vector backing a tuple's payload.
pub type Row = Vec<FieldValue>;

pub fn encode_row(row: &Row) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for field in row {
        let cbor: Cbor = field
            .clone()
            .into_cbor()
            .map_err(|e| Error::Unsupported(format!("cannot cbor-encode field: {}", e)))?;
        cbor.encode(&mut buf)
            .map_err(|e| Error::Unsupported(format!("cannot write cbor: {}", e)))?;
    }
    Ok(buf)
}

pub fn decode_row(bytes: &[u8], field_count: usize) -> Result<Row> {
    let mut cursor = bytes;
    let mut row = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        if cursor.is_empty() {
            return Err(Error::Unsupported("row truncated".to_string()));
        }
        // `Cbor::decode` advances `cursor` past the item it just read.
        let (cbor, _n) = Cbor::decode(&mut cursor)
            .map_err(|e| Error::Unsupported(format!("bad row encoding: {}", e)))?;
        let value = FieldValue::from_cbor(cbor)
            .map_err(|e| Error::Unsupported(format!("bad field value: {}", e)))?;
        row.push(value);
    }
    Ok(row)
}

/// Validate a row against a space's format (spec §4.1 `validate`,
/// §4.3.4 `check_format`/`build_secondary_key`).
pub fn validate_row(row: &Row, format: &Format) -> Result<()> {
    if row.len() != format.field_count() {
        return Err(Error::Unsupported(format!(
            "row has {} fields, format expects {}",
            row.len(),
            format.field_count()
        )));
    }
    for (value, expect) in row.iter().zip(format.fields()) {
        if value.field_type() == FieldType::Any {
            continue; // Null is always acceptable; nullability is checked by the caller.
        }
        if value.field_type() != *expect {
            return Err(Error::Unsupported(format!(
                "field type mismatch: expected {:?}, found {:?}",
                expect,
                value.field_type()
            )));
        }
    }
    Ok(())
}
