//! Update executor (spec §4.3.3 UPDATE/UPSERT).
//!
//! The original engine applies update operations against tuple bytes
//! in region-allocated scratch space and returns a column mask of
//! touched fields. We operate on the decoded `Row` directly — the byte
//! encoding is out of scope (spec §1) — but keep the same two calling
//! conventions: `apply_strict` (UPDATE: any bad op is an error) and
//! `apply_lenient` (UPSERT: ops that don't fit the existing row are
//! silently skipped, but a structurally malformed op is still fatal).

use crate::error::{Error, Result};
use crate::row::{FieldValue, Row};

/// One update operation. `Set` mirrors the `=` opcode; `Delta` mirrors
/// `+`/`-` collapsed into a signed increment, since the byte-level
/// opcode encoding itself is out of scope.
#[derive(Debug, Clone)]
pub enum UpdateOp {
    Set(usize, FieldValue),
    Delta(usize, i64),
}

/// Bitmask of row fields touched by an update, one bit per field index
/// (field counts stay well under 64 for this engine's purposes).
pub type ColumnMask = u64;

fn field_bit(field: usize) -> ColumnMask {
    1u64.checked_shl(field as u32).unwrap_or(0)
}

/// UPDATE: every operation must apply or the whole update is rejected.
pub fn apply_strict(row: &Row, ops: &[UpdateOp]) -> Result<(Row, ColumnMask)> {
    apply(row, ops, false)
}

/// UPSERT: operations that don't fit the existing row (wrong field
/// type for a delta, e.g.) are dropped; an out-of-range field index is
/// still a hard error, since that is a malformed operation rather than
/// one that merely doesn't apply.
pub fn apply_lenient(row: &Row, ops: &[UpdateOp]) -> Result<(Row, ColumnMask)> {
    apply(row, ops, true)
}

fn apply(row: &Row, ops: &[UpdateOp], lenient: bool) -> Result<(Row, ColumnMask)> {
    let mut out = row.clone();
    let mut mask: ColumnMask = 0;
    for op in ops {
        match op {
            UpdateOp::Set(field, value) => {
                let field = *field;
                if field >= out.len() {
                    return Err(Error::Unsupported(format!(
                        "update op references field {} past end of row",
                        field
                    )));
                }
                out[field] = value.clone();
                mask |= field_bit(field);
            }
            UpdateOp::Delta(field, delta) => {
                let field = *field;
                if field >= out.len() {
                    return Err(Error::Unsupported(format!(
                        "update op references field {} past end of row",
                        field
                    )));
                }
                match out[field] {
                    FieldValue::Unsigned(v) => {
                        let next = (v as i64).saturating_add(*delta);
                        if next < 0 {
                            if lenient {
                                continue;
                            }
                            return Err(Error::Unsupported(
                                "delta would make unsigned field negative".into(),
                            ));
                        }
                        out[field] = FieldValue::Unsigned(next as u64);
                        mask |= field_bit(field);
                    }
                    FieldValue::Integer(v) => {
                        out[field] = FieldValue::Integer(v.saturating_add(*delta));
                        mask |= field_bit(field);
                    }
                    _ => {
                        if lenient {
                            continue;
                        }
                        return Err(Error::Unsupported(format!(
                            "delta op does not fit field {} type",
                            field
                        )));
                    }
                }
            }
        }
    }
    Ok((out, mask))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_update_sets_field() {
        let row = vec![FieldValue::Unsigned(1), FieldValue::Unsigned(2)];
        let (out, mask) = apply_strict(&row, &[UpdateOp::Set(1, FieldValue::Unsigned(9))]).unwrap();
        assert_eq!(out[1], FieldValue::Unsigned(9));
        assert_eq!(mask, 0b10);
    }

    #[test]
    fn lenient_update_skips_mistyped_delta() {
        let row = vec![FieldValue::String("x".into())];
        let (out, mask) = apply_lenient(&row, &[UpdateOp::Delta(0, 1)]).unwrap();
        assert_eq!(out, row);
        assert_eq!(mask, 0);
    }

    #[test]
    fn strict_update_rejects_mistyped_delta() {
        let row = vec![FieldValue::String("x".into())];
        assert!(apply_strict(&row, &[UpdateOp::Delta(0, 1)]).is_err());
    }

    #[test]
    fn out_of_range_field_is_always_fatal() {
        let row = vec![FieldValue::Unsigned(1)];
        assert!(apply_lenient(&row, &[UpdateOp::Set(5, FieldValue::Unsigned(1))]).is_err());
    }
}
