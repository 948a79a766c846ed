// End-to-end scenarios and the quantified invariants (spec §8), exercised
// against `Space` directly the way `llrb_test.rs` exercises `Llrb` against
// its public `Index`/`Reader`/`Writer` surface rather than its internals.

use crate::format::{FieldType, Format};
use crate::index::{IndexContract, IndexDef, IndexKind, IteratorType};
use crate::key::{KeyDef, KeyPart};
use crate::request::{Opcode, Request};
use crate::row::FieldValue as FV;
use crate::space::{RecoveryMode, Space};
use crate::update::UpdateOp;

fn unsigned_part(field: usize) -> KeyPart {
    KeyPart {
        field,
        field_type: FieldType::Unsigned,
        is_nullable: false,
    }
}

fn pk_def() -> IndexDef {
    IndexDef {
        id: 0,
        name: "primary".into(),
        kind: IndexKind::Tree,
        is_unique: true,
        key_def: KeyDef::new(vec![unsigned_part(0)]),
    }
}

fn secondary_unique_def() -> IndexDef {
    IndexDef {
        id: 1,
        name: "secondary".into(),
        kind: IndexKind::Tree,
        is_unique: true,
        key_def: KeyDef::new(vec![unsigned_part(1)]),
    }
}

/// Three-field space: PK on field 0, unique secondary TREE on field 1.
fn space_with_unique_secondary() -> Space {
    let format = Format::new(vec![FieldType::Unsigned, FieldType::Unsigned, FieldType::Unsigned]);
    let mut space = Space::new(format);
    space.add_primary_key(pk_def(), RecoveryMode::AllKeys).unwrap();
    space.create_index(secondary_unique_def()).unwrap();
    space
}

fn row(a: u64, b: u64, c: u64) -> Vec<FV> {
    vec![FV::Unsigned(a), FV::Unsigned(b), FV::Unsigned(c)]
}

fn replace_request(opcode: Opcode, tuple: Vec<FV>) -> Request {
    Request {
        opcode,
        index_id: 0,
        iterator_type: None,
        offset: 0,
        limit: usize::MAX,
        key: None,
        tuple: Some(tuple),
        ops: Vec::new(),
        index_base: 0,
        replica_id: 0,
    }
}

fn select_all(space: &Space) -> Vec<Vec<FV>> {
    let req = Request::select(0, IteratorType::All, None);
    space
        .execute_select(&req)
        .unwrap()
        .into_iter()
        .map(|t| t.row(3).unwrap())
        .collect()
}

#[test]
fn s1_secondary_unique_collision_rolls_back_primary() {
    let mut space = space_with_unique_secondary();
    space
        .execute_replace(&replace_request(Opcode::Insert, row(1, 2, 3)))
        .unwrap();
    let bsize_before = space.bsize();

    let err = space
        .execute_replace(&replace_request(Opcode::Insert, row(2, 2, 9)))
        .unwrap_err();
    assert!(matches!(err, crate::error::Error::DuplicateKey(_)));

    assert_eq!(select_all(&space), vec![row(1, 2, 3)]);
    assert_eq!(space.bsize(), bsize_before);
    assert_eq!(space.index(0).unwrap().size(), 1);
    assert_eq!(space.index(1).unwrap().size(), 1);
}

#[test]
fn s2_dup_replace_with_secondary_displacement() {
    let mut space = space_with_unique_secondary();
    space
        .execute_replace(&replace_request(Opcode::Insert, row(1, 2, 3)))
        .unwrap();
    space
        .execute_replace(&replace_request(Opcode::Insert, row(3, 1, 2)))
        .unwrap();

    let stmt = space
        .execute_replace(&replace_request(Opcode::Replace, row(1, 5, 5)))
        .unwrap();
    let old = stmt.old_tuple.unwrap().row(3).unwrap();
    assert_eq!(old, row(1, 2, 3));

    let mut rows = select_all(&space);
    rows.sort();
    let mut expect = vec![row(1, 5, 5), row(3, 1, 2)];
    expect.sort();
    assert_eq!(rows, expect);
}

#[test]
fn s3_dup_replace_with_no_primary_match() {
    // S3 is phrased as a DML-level scenario but DUP_REPLACE with an
    // unknown `old` is purely an index contract (C2): no index in this
    // crate's DML surface issues a bare DUP_REPLACE without already
    // knowing the colliding tuple (only UPDATE does, and it always
    // supplies `old`), so this exercises `TreeIndex::replace` directly,
    // the same contract `execute_replace`'s REPLACE/UPSERT paths rely on.
    use crate::index::{IndexContract, ReplaceMode, TreeIndex};

    let mut index = TreeIndex::new_unique(KeyDef::new(vec![unsigned_part(0)]));
    let existing = crate::tuple::Tuple::from_row(0, &row(1, 2, 3)).unwrap();
    existing.retain();
    index.replace(None, Some(&existing), ReplaceMode::DupInsert).unwrap();

    let candidate = crate::tuple::Tuple::from_row(0, &row(2, 2, 2)).unwrap();
    candidate.retain();
    let err = index
        .replace(None, Some(&candidate), ReplaceMode::DupReplace)
        .unwrap_err();
    assert!(matches!(err, crate::error::Error::NotFound(_)));
    candidate.release();

    assert_eq!(index.snapshot_iterator().collect::<Vec<_>>(), vec![existing]);
}

#[test]
fn s4_upsert_pk_change_rejected_as_no_op() {
    let mut space = space_with_unique_secondary();
    space
        .execute_replace(&replace_request(Opcode::Insert, row(1, 2, 3)))
        .unwrap();
    let bsize_before = space.bsize();

    let mut req = replace_request(Opcode::Upsert, row(1, 2, 3));
    req.ops = vec![UpdateOp::Set(0, FV::Unsigned(9))];
    let stmt = space.execute_upsert(&req).unwrap();

    assert!(stmt.old_tuple.is_none());
    assert!(stmt.new_tuple.is_none());
    assert_eq!(select_all(&space), vec![row(1, 2, 3)]);
    assert_eq!(space.bsize(), bsize_before);
}

#[test]
fn s5_update_and_delete_on_missing_row_are_no_ops() {
    let mut space = space_with_unique_secondary();
    space
        .execute_replace(&replace_request(Opcode::Insert, row(1, 2, 3)))
        .unwrap();

    let mut delete_req = replace_request(Opcode::Delete, Vec::new());
    delete_req.key = Some(vec![FV::Unsigned(99)]);
    let stmt = space.execute_delete(&delete_req).unwrap();
    assert!(stmt.old_tuple.is_none());

    let mut update_req = replace_request(Opcode::Update, Vec::new());
    update_req.key = Some(vec![FV::Unsigned(99)]);
    update_req.ops = vec![UpdateOp::Set(2, FV::Unsigned(7))];
    let stmt = space.execute_update(&update_req).unwrap();
    assert!(stmt.old_tuple.is_none());
    assert!(stmt.new_tuple.is_none());

    assert_eq!(select_all(&space), vec![row(1, 2, 3)]);
}

#[test]
fn commit_alter_carries_indexes_and_bsize_forward() {
    let mut space = space_with_unique_secondary();
    space
        .execute_replace(&replace_request(Opcode::Insert, row(1, 2, 3)))
        .unwrap();
    space
        .execute_replace(&replace_request(Opcode::Insert, row(4, 5, 6)))
        .unwrap();
    let bsize_before = space.bsize();

    let new_format = Format::new(vec![FieldType::Unsigned, FieldType::Unsigned, FieldType::Unsigned]);
    space.prepare_alter(&new_format).unwrap();
    let altered = space.commit_alter(new_format);

    assert_eq!(altered.bsize(), bsize_before);
    assert_eq!(altered.index_count(), 2);
    let mut rows = select_all(&altered);
    rows.sort();
    let mut expect = vec![row(1, 2, 3), row(4, 5, 6)];
    expect.sort();
    assert_eq!(rows, expect);
}

#[test]
fn commit_alter_prunes_when_no_indexes_remain() {
    let format = Format::new(vec![FieldType::Unsigned]);
    let space = Space::new(format.clone());
    let altered = space.commit_alter(format);
    assert_eq!(altered.index_count(), 0);
    assert_eq!(altered.bsize(), 0);
}

#[test]
fn invariant_6_insert_then_delete_is_a_round_trip() {
    let mut space = space_with_unique_secondary();
    let bsize_before = space.bsize();
    space
        .execute_replace(&replace_request(Opcode::Insert, row(1, 2, 3)))
        .unwrap();

    let mut delete_req = replace_request(Opcode::Delete, Vec::new());
    delete_req.key = Some(vec![FV::Unsigned(1)]);
    space.execute_delete(&delete_req).unwrap();

    assert_eq!(space.bsize(), bsize_before);
    assert_eq!(space.index(0).unwrap().size(), 0);
    assert_eq!(space.index(1).unwrap().size(), 0);
}

#[test]
fn invariant_7_upsert_on_empty_space_equals_insert() {
    let mut space = space_with_unique_secondary();
    let stmt = space
        .execute_upsert(&replace_request(Opcode::Upsert, row(1, 2, 3)))
        .unwrap();
    assert!(stmt.new_tuple.is_none()); // UPSERT never surfaces a tuple.
    assert_eq!(select_all(&space), vec![row(1, 2, 3)]);
}

#[test]
fn invariant_1_random_inserts_keep_secondary_in_sync_with_primary() {
    use rand::prelude::random;
    use rand::seq::SliceRandom;

    // Field 1 is a unique secondary, so each of the 50 rows needs a
    // distinct value there; shuffle a dense range rather than rejection-
    // sample so collisions are structurally impossible.
    let mut field1_values: Vec<u64> = (0..50u64).collect();
    field1_values.shuffle(&mut rand::thread_rng());

    let mut space = space_with_unique_secondary();
    for (i, field1) in field1_values.into_iter().enumerate() {
        space
            .execute_replace(&replace_request(Opcode::Insert, row(i as u64, field1, random())))
            .unwrap();
    }

    let mut from_primary: Vec<u64> = select_all(&space)
        .into_iter()
        .map(|r| match r[0] {
            FV::Unsigned(v) => v,
            _ => unreachable!(),
        })
        .collect();
    let mut from_secondary: Vec<u64> = space
        .index(1)
        .unwrap()
        .snapshot_iterator()
        .map(|t| match t.row(3).unwrap()[0] {
            FV::Unsigned(v) => v,
            _ => unreachable!(),
        })
        .collect();
    from_primary.sort();
    from_secondary.sort();
    assert_eq!(from_primary, from_secondary);
    assert_eq!(from_primary.len(), 50);
}

#[test]
fn replace_fails_fast_when_config_reserve_is_exhausted() {
    use crate::config::EngineConfig;

    let format = Format::new(vec![FieldType::Unsigned, FieldType::Unsigned, FieldType::Unsigned]);
    let config = EngineConfig {
        checkpoint_count: 1,
        reserve_extents_before_replace: 0,
        reserve_extents_before_delete: 0,
    };
    let mut space = Space::with_config(format, config);
    space.add_primary_key(pk_def(), RecoveryMode::AllKeys).unwrap();

    let err = space
        .execute_replace(&replace_request(Opcode::Insert, row(1, 2, 3)))
        .unwrap_err();
    assert!(matches!(err, crate::error::Error::OutOfMemory(_)));
    assert_eq!(space.index(0).unwrap().size(), 0);
}

#[test]
fn apply_initial_join_row_rejects_non_insert_opcode() {
    let mut space = space_with_unique_secondary();
    let err = space
        .apply_initial_join_row(&replace_request(Opcode::Replace, row(1, 2, 3)))
        .unwrap_err();
    assert!(matches!(err, crate::error::Error::UnknownRequestType(_)));
    assert_eq!(select_all(&space), Vec::<Vec<FV>>::new());
}

#[test]
fn apply_initial_join_row_clears_replica_id_and_inserts() {
    let mut space = space_with_unique_secondary();
    let mut req = replace_request(Opcode::Insert, row(1, 2, 3));
    req.replica_id = 7;
    let stmt = space.apply_initial_join_row(&req).unwrap();
    assert!(stmt.new_tuple.is_some());
    assert_eq!(select_all(&space), vec![row(1, 2, 3)]);
}

#[test]
fn build_secondary_key_honors_injection_hook() {
    let format = Format::new(vec![FieldType::Unsigned, FieldType::Unsigned, FieldType::Unsigned]);
    let mut space = Space::new(format);
    space.add_primary_key(pk_def(), RecoveryMode::AllKeys).unwrap();
    space
        .execute_replace(&replace_request(Opcode::Insert, row(1, 2, 3)))
        .unwrap();

    space.set_errinj_build_secondary(Some(1));
    let err = space.build_secondary_key(secondary_unique_def()).unwrap_err();
    assert!(matches!(err, crate::error::Error::Injection(_)));
    assert_eq!(space.index_count(), 1);

    space.set_errinj_build_secondary(None);
    space.build_secondary_key(secondary_unique_def()).unwrap();
    assert_eq!(space.index_count(), 2);
}

#[test]
fn replace_primary_key_bsize_accounts_for_dislodged_tuple_on_replay() {
    let format = Format::new(vec![FieldType::Unsigned, FieldType::Unsigned, FieldType::Unsigned]);
    let mut space = Space::new(format);
    space.add_primary_key(pk_def(), RecoveryMode::PrimaryKey).unwrap();

    space
        .execute_replace(&replace_request(Opcode::Insert, row(1, 2, 3)))
        .unwrap();
    let bsize_after_insert = space.bsize();
    assert!(bsize_after_insert > 0);

    // WAL-replay REPLACE of the same key: old == None at the call site,
    // but the primary index's DUP_REPLACE_OR_INSERT dislodges the
    // existing tuple. bsize must reflect that dislodged tuple's size,
    // not double-count it.
    space
        .execute_replace(&replace_request(Opcode::Replace, row(1, 9, 9)))
        .unwrap();
    assert_eq!(space.bsize(), bsize_after_insert);
}

#[test]
fn invariant_3_refcount_equals_index_membership() {
    let mut space = space_with_unique_secondary();
    let stmt = space
        .execute_replace(&replace_request(Opcode::Insert, row(1, 2, 3)))
        .unwrap();
    let tuple = stmt.new_tuple.unwrap();
    // One hold from the statement (taken before the fan-out, per the
    // §4.3.2 precondition that the caller already holds a reference to
    // `new`), plus one from each of the two indexes.
    assert_eq!(tuple.refcount(), 3);
}
