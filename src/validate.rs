//! Index-def validator (spec §3 C5, §4.3.4 `check_index_def`).
//!
//! Grounded directly on `memtx_space_check_index_def` in
//! `original_source/src/box/memtx_space.cc`: per-type part-count,
//! uniqueness and field-type constraints, checked once at DDL time so
//! the space executor never has to re-derive them at DML time.

use crate::error::{Error, Result};
use crate::format::FieldType;
use crate::index::{IndexDef, IndexKind};

/// `check_index_def`: reject an ill-formed index definition before a
/// concrete `Index` is ever built for it.
pub fn check_index_def(def: &IndexDef, is_primary: bool) -> Result<()> {
    if is_primary && def.is_unique == false {
        return Err(Error::ModifyIndex(format!(
            "index {}: primary key must be unique",
            def.name
        )));
    }

    match def.kind {
        IndexKind::Hash => {
            if !def.is_unique {
                return Err(Error::ModifyIndex(format!(
                    "index {}: HASH index must be unique",
                    def.name
                )));
            }
            check_scalar_parts(def, /* allow_nullable = */ false)?;
        }
        IndexKind::Tree => {
            // TREE is unconstrained on uniqueness and part count; only
            // TREE may carry nullable parts, and only non-primary TREE
            // indexes at that.
            check_scalar_parts(def, /* allow_nullable = */ !is_primary)?;
        }
        IndexKind::Rtree => {
            if def.is_unique {
                return Err(Error::ModifyIndex(format!(
                    "index {}: RTREE index must not be unique",
                    def.name
                )));
            }
            if def.key_def.part_count() != 1 {
                return Err(Error::ModifyIndex(format!(
                    "index {}: RTREE index must have exactly one part",
                    def.name
                )));
            }
            let part = &def.key_def.parts[0];
            if part.field_type != FieldType::Array {
                return Err(Error::IndexType(format!(
                    "index {}: RTREE part must be ARRAY-typed",
                    def.name
                )));
            }
            if part.is_nullable {
                return Err(Error::ModifyIndex(format!(
                    "index {}: RTREE part may not be nullable",
                    def.name
                )));
            }
        }
        IndexKind::Bitset => {
            if def.is_unique {
                return Err(Error::ModifyIndex(format!(
                    "index {}: BITSET index must not be unique",
                    def.name
                )));
            }
            if def.key_def.part_count() != 1 {
                return Err(Error::ModifyIndex(format!(
                    "index {}: BITSET index must have exactly one part",
                    def.name
                )));
            }
            let part = &def.key_def.parts[0];
            if !matches!(part.field_type, FieldType::Unsigned | FieldType::String) {
                return Err(Error::IndexType(format!(
                    "index {}: BITSET part must be UNSIGNED or STRING",
                    def.name
                )));
            }
            if part.is_nullable {
                return Err(Error::ModifyIndex(format!(
                    "index {}: BITSET part may not be nullable",
                    def.name
                )));
            }
        }
    }

    if is_primary {
        for part in &def.key_def.parts {
            if part.is_nullable {
                return Err(Error::NullablePrimary(def.name.clone()));
            }
        }
    }

    Ok(())
}

/// HASH/TREE field-type bound check: every part's type must lie
/// strictly between `Any` and `Array`.
fn check_scalar_parts(def: &IndexDef, allow_nullable: bool) -> Result<()> {
    for part in &def.key_def.parts {
        if !part.field_type.is_scalar_like() {
            return Err(Error::IndexType(format!(
                "index {}: field type {} is not allowed in a HASH/TREE key part",
                def.name, part.field_type
            )));
        }
        if part.is_nullable && !allow_nullable {
            return Err(Error::ModifyIndex(format!(
                "index {}: only TREE secondary indexes may have nullable parts",
                def.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeyDef, KeyPart};

    fn part(field: usize, field_type: FieldType, is_nullable: bool) -> KeyPart {
        KeyPart {
            field,
            field_type,
            is_nullable,
        }
    }

    #[test]
    fn hash_index_must_be_unique() {
        let def = IndexDef {
            id: 1,
            name: "secondary".into(),
            kind: IndexKind::Hash,
            is_unique: false,
            key_def: KeyDef::new(vec![part(0, FieldType::Unsigned, false)]),
        };
        assert!(matches!(
            check_index_def(&def, false),
            Err(Error::ModifyIndex(_))
        ));
    }

    #[test]
    fn rtree_requires_single_array_part() {
        let def = IndexDef {
            id: 2,
            name: "geo".into(),
            kind: IndexKind::Rtree,
            is_unique: false,
            key_def: KeyDef::new(vec![part(0, FieldType::Array, false)]),
        };
        assert!(check_index_def(&def, false).is_ok());
    }

    #[test]
    fn primary_key_rejects_nullable_part() {
        let def = IndexDef {
            id: 0,
            name: "primary".into(),
            kind: IndexKind::Tree,
            is_unique: true,
            key_def: KeyDef::new(vec![part(0, FieldType::Unsigned, true)]),
        };
        assert!(matches!(
            check_index_def(&def, true),
            Err(Error::NullablePrimary(_))
        ));
    }
}
