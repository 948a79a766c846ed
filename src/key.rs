//! Key definitions and key extraction.
//!
//! Grounded on `original_source/src/box/memtx_space.cc`'s
//! `check_index_def` (field-type and part-count constraints per index
//! type) and on the `key_def`/`key_part` shapes referenced throughout
//! that file.

use crate::error::{Error, Result};
use crate::format::FieldType;
use crate::row::{FieldValue, Row};

/// One part of a composite key: which field, what type it's expected to
/// hold, and whether it may be null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPart {
    pub field: usize,
    pub field_type: FieldType,
    pub is_nullable: bool,
}

/// An ordered list of key parts, as validated by `check_index_def`.
#[derive(Debug, Clone)]
pub struct KeyDef {
    pub parts: Vec<KeyPart>,
}

impl KeyDef {
    pub fn new(parts: Vec<KeyPart>) -> KeyDef {
        KeyDef { parts }
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Extract this key definition's fields from a decoded row, in key
    /// order.
    pub fn extract(&self, row: &Row) -> Result<Key> {
        let mut key = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            let value = row.get(part.field).cloned().unwrap_or(FieldValue::Null);
            if matches!(value, FieldValue::Null) && !part.is_nullable {
                return Err(Error::Unsupported(format!(
                    "field {} is not nullable but row has no value",
                    part.field
                )));
            }
            key.push(value);
        }
        Ok(key)
    }

    /// `exact_key_validate` from `original_source`: a request key must
    /// have exactly as many parts as the index definition.
    pub fn validate_part_count(&self, supplied: usize) -> Result<()> {
        if supplied != self.parts.len() {
            return Err(Error::Unsupported(format!(
                "key has {} parts, index expects {}",
                supplied,
                self.parts.len()
            )));
        }
        Ok(())
    }
}

/// A fully-extracted key: one value per key part, in key-part order.
pub type Key = Vec<FieldValue>;
