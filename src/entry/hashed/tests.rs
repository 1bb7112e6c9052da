use super::*;
use crate::codec::Utf8;
use crate::memory::HeapMemoryManager;

type Set = HashEntrySet<Utf8, Utf8>;

fn new_set(config: HashSetConfig) -> (Set, Arc<HeapMemoryManager>) {
    let mm = Arc::new(HeapMemoryManager::new());
    let set = Set::with_memory_manager(config, mm.clone());
    (set, mm)
}

fn allocate(set: &Set, key: &str, full_hash: u64) -> OpContext {
    let mut ctx = OpContext::new();
    let hint = set.home_slot(full_hash);
    assert!(set
        .allocate_key(&mut ctx, &Utf8::from(key), hint, full_hash)
        .unwrap());
    ctx
}

fn insert(set: &Set, key: &str, value: &str, full_hash: u64) -> OpContext {
    let mut ctx = allocate(set, key, full_hash);
    set.write_value_start(&mut ctx, &Utf8::from(value), false)
        .unwrap();
    assert_eq!(set.write_value_commit(&mut ctx), ValueResult::True);
    ctx
}

fn get(set: &Set, key: &str, full_hash: u64) -> Option<Utf8> {
    let mut ctx = OpContext::new();
    let hint = set.home_slot(full_hash);
    if !set
        .look_up(&mut ctx, &Utf8::from(key), hint, full_hash)
        .unwrap()
    {
        return None;
    }
    Some(set.deserialize_value(&ctx.value).unwrap())
}

fn delete(set: &Set, ctx: &mut OpContext) {
    assert_eq!(set.delete_value_start(ctx), ValueResult::True);
    assert!(set.delete_value_finish(ctx));
}

#[test]
fn test_insert_and_look_up() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    let ctx = insert(&set, "a", "1", 3);

    assert_eq!(ctx.entry_index, 3);
    assert_eq!(ctx.entry_state, EntryState::Valid);
    assert_eq!(set.get_full_hash(3), 3);
    assert_eq!(set.num_entries(), 1);
    assert_eq!(get(&set, "a", 3), Some(Utf8::from("1")));
    assert_eq!(get(&set, "b", 3), None);
}

#[test]
fn test_look_up_fills_context() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    insert(&set, "a", "1", 5);

    let mut ctx = OpContext::new();
    assert!(set.look_up(&mut ctx, &Utf8::from("a"), 5, 5).unwrap());
    assert_eq!(ctx.entry_index, 5);
    assert_eq!(ctx.entry_state, EntryState::Valid);
    assert_eq!(set.deserialize_key(&ctx.key).unwrap(), Utf8::from("a"));
    assert!(set.read_value(&mut ctx));
    assert_eq!(ctx.value_state, ValueState::Valid);
}

#[test]
fn test_allocate_existing_key_reports_present() {
    let (set, mm) = new_set(HashSetConfig::new(8));
    let first = insert(&set, "a", "1", 2);
    let live = mm.live_blocks();

    let mut ctx = allocate(&set, "a", 2);
    assert_eq!(ctx.entry_state, EntryState::Valid);
    assert_eq!(ctx.entry_index, first.entry_index);
    assert_eq!(ctx.value.reference(), first.value.reference());
    assert_eq!(mm.live_blocks(), live);

    set.write_value_start(&mut ctx, &Utf8::from("2"), false)
        .unwrap();
    assert_eq!(set.write_value_commit(&mut ctx), ValueResult::True);
    assert_eq!(get(&set, "a", 2), Some(Utf8::from("2")));
    assert_eq!(set.num_entries(), 1);
}

#[test]
fn test_second_allocation_joins_pending_insert() {
    let (set, mm) = new_set(HashSetConfig::new(8));
    let mut first = allocate(&set, "a", 4);
    assert_eq!(first.entry_state, EntryState::InsertNotFinalized);
    let live = mm.live_blocks();

    let mut second = allocate(&set, "a", 4);
    assert_eq!(second.entry_state, EntryState::InsertNotFinalized);
    assert_eq!(second.entry_index, first.entry_index);
    assert_eq!(second.key.reference(), first.key.reference());
    assert_eq!(mm.live_blocks(), live);
    assert_eq!(set.num_entries(), 1);

    set.write_value_start(&mut second, &Utf8::from("2"), false)
        .unwrap();
    assert_eq!(set.write_value_commit(&mut second), ValueResult::True);

    set.write_value_start(&mut first, &Utf8::from("1"), false)
        .unwrap();
    assert_eq!(set.write_value_commit(&mut first), ValueResult::False);
    set.release_new_value(&mut first);

    assert_eq!(get(&set, "a", 4), Some(Utf8::from("2")));
}

#[test]
fn test_pending_insert_is_not_found() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    allocate(&set, "a", 1);

    let mut ctx = OpContext::new();
    assert!(!set.look_up(&mut ctx, &Utf8::from("a"), 1, 1).unwrap());
    assert_eq!(ctx.entry_state, EntryState::Unknown);
    assert_eq!(ctx.key.reference(), Reference::INVALID);
}

#[test]
fn test_pending_insert_of_other_key_occupies_slot() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    let pending = allocate(&set, "a", 1);
    let ctx = insert(&set, "b", "2", 1);
    assert_eq!(pending.entry_index, 1);
    assert_eq!(ctx.entry_index, 2);
}

#[test]
fn test_delete_value_finish_once() {
    let (set, mm) = new_set(HashSetConfig::new(8));
    let mut ctx = insert(&set, "a", "1", 6);
    let mut helper = ctx.clone();
    let live = mm.live_blocks();

    assert_eq!(set.delete_value_start(&mut ctx), ValueResult::True);
    assert!(set.delete_value_finish(&mut ctx));
    assert_eq!(ctx.entry_state, EntryState::Deleted);
    assert_eq!(set.num_entries(), 0);
    assert_eq!(set.get_full_hash(6), INVALID_FULL_HASH);
    assert_eq!(mm.live_blocks(), live - 2);

    assert!(!set.delete_value_finish(&mut ctx));
    assert!(!set.delete_value_finish(&mut helper));
    assert_eq!(helper.entry_state, EntryState::Deleted);
    assert_eq!(set.num_entries(), 0);
    assert_eq!(mm.live_blocks(), live - 2);
}

#[test]
fn test_delete_value_finish_requires_mark() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    let mut ctx = insert(&set, "a", "1", 6);

    assert!(!set.delete_value_finish(&mut ctx));
    assert_eq!(ctx.entry_state, EntryState::Valid);
    assert_eq!(get(&set, "a", 6), Some(Utf8::from("1")));
}

#[test]
fn test_marked_value_is_not_found_before_finish() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    let mut ctx = insert(&set, "a", "1", 2);
    assert_eq!(set.delete_value_start(&mut ctx), ValueResult::True);

    assert_eq!(get(&set, "a", 2), None);
    assert_eq!(set.num_entries(), 1);

    let mut probe = OpContext::new();
    let state = set
        .get_entry_state(&mut probe, 2, &Utf8::from("a"), 2)
        .unwrap();
    assert_eq!(state, EntryState::DeletedNotFinalized);
}

#[test]
fn test_insert_finalizes_pending_deletion() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    let mut a = insert(&set, "a", "1", 3);
    assert_eq!(set.delete_value_start(&mut a), ValueResult::True);

    let b = insert(&set, "b", "2", 3);
    assert_eq!(b.entry_index, a.entry_index);
    assert_eq!(set.num_entries(), 1);
    assert_eq!(get(&set, "a", 3), None);
    assert_eq!(get(&set, "b", 3), Some(Utf8::from("2")));

    // the first deleter finds its work done
    assert!(!set.delete_value_finish(&mut a));
    assert_eq!(set.num_entries(), 1);
}

#[test]
fn test_commit_after_value_retired_fails_and_retries() {
    let (set, mm) = new_set(HashSetConfig::new(8));
    insert(&set, "k", "1", 3);

    let mut writer = allocate(&set, "k", 3);
    assert_eq!(writer.entry_state, EntryState::Valid);
    set.write_value_start(&mut writer, &Utf8::from("2"), false)
        .unwrap();

    let mut deleter = OpContext::new();
    assert!(set.look_up(&mut deleter, &Utf8::from("k"), 3, 3).unwrap());
    assert_eq!(set.delete_value_start(&mut deleter), ValueResult::True);

    // the deleter gets through the first finalization step only
    let target = deleter.value.reference();
    let retired = mm.alter_reference_for_delete(target);
    assert!(set.array().cas_value_reference(3, target, retired));
    set.array.decrement_num_entries();
    set.array.release_value_reference(target);

    assert_eq!(set.write_value_commit(&mut writer), ValueResult::False);
    set.release_new_value(&mut writer);
    assert_eq!(get(&set, "k", 3), None);
    let mut state = OpContext::new();
    assert_eq!(
        set.get_entry_state(&mut state, 3, &Utf8::from("k"), 3)
            .unwrap(),
        EntryState::DeletedNotFinalized
    );

    // the retry finishes the deletion and inserts afresh
    let again = insert(&set, "k", "2", 3);
    assert_eq!(again.entry_index, 3);
    assert_eq!(get(&set, "k", 3), Some(Utf8::from("2")));
    assert_eq!(set.num_entries(), 1);

    assert!(!set.delete_value_finish(&mut deleter));
    assert_eq!(get(&set, "k", 3), Some(Utf8::from("2")));
    assert_eq!(set.num_entries(), 1);
}

#[test]
fn test_reused_slot_ignores_finisher_of_previous_occupant() {
    let (set, mm) = new_set(HashSetConfig::new(8));
    let mut a = insert(&set, "a", "1", 3);
    let mut stale = a.clone();
    delete(&set, &mut a);

    let mut b = allocate(&set, "b", 3);
    assert_eq!(b.entry_index, 3);
    let vacated = set.array().value_reference(3);
    assert!(!mm.is_reference_valid(vacated));
    assert_ne!(vacated, Reference::INVALID);

    assert!(!set.delete_value_finish(&mut stale));
    let mut state = OpContext::new();
    assert_eq!(
        set.get_entry_state(&mut state, 3, &Utf8::from("b"), 3)
            .unwrap(),
        EntryState::InsertNotFinalized
    );

    set.write_value_start(&mut b, &Utf8::from("2"), false)
        .unwrap();
    assert_eq!(set.write_value_commit(&mut b), ValueResult::True);
    assert_eq!(get(&set, "b", 3), Some(Utf8::from("2")));
    assert_eq!(set.num_entries(), 1);
}

#[test]
fn test_stale_joiner_cannot_commit_into_reused_slot() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    let mut first = allocate(&set, "a", 3);
    let mut joiner = allocate(&set, "a", 3);
    assert_eq!(joiner.entry_index, first.entry_index);

    set.write_value_start(&mut first, &Utf8::from("1"), false)
        .unwrap();
    assert_eq!(set.write_value_commit(&mut first), ValueResult::True);
    delete(&set, &mut first);
    let mut b = allocate(&set, "b", 3);
    assert_eq!(b.entry_index, joiner.entry_index);

    set.write_value_start(&mut joiner, &Utf8::from("x"), false)
        .unwrap();
    assert_eq!(set.write_value_commit(&mut joiner), ValueResult::False);
    set.release_new_value(&mut joiner);

    set.write_value_start(&mut b, &Utf8::from("2"), false)
        .unwrap();
    assert_eq!(set.write_value_commit(&mut b), ValueResult::True);
    assert_eq!(get(&set, "a", 3), None);
    assert_eq!(get(&set, "b", 3), Some(Utf8::from("2")));
    assert_eq!(set.num_entries(), 1);
}

#[test]
fn test_insert_scans_past_tombstone_for_own_key() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    let mut y = insert(&set, "y", "1", 2);
    let x = insert(&set, "x", "old", 10);
    assert_eq!(x.entry_index, 3);
    delete(&set, &mut y);

    let again = allocate(&set, "x", 10);
    assert_eq!(again.entry_index, 3);
    assert_eq!(again.entry_state, EntryState::Valid);
    assert_eq!(again.value.reference(), x.value.reference());
}

#[test]
fn test_exhausted_window_is_a_miss() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    for (key, hash) in [("a", 1), ("b", 9), ("c", 17)] {
        insert(&set, key, key, hash);
    }

    let mut ctx = OpContext::new();
    assert_eq!(set.look_up(&mut ctx, &Utf8::from("d"), 1, 25), Ok(false));
    assert_eq!(ctx.entry_state, EntryState::Unknown);
}

#[test]
fn test_deleted_key_can_be_inserted_again() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    let mut ctx = insert(&set, "a", "1", 5);
    delete(&set, &mut ctx);

    let again = insert(&set, "a", "2", 5);
    assert_eq!(again.entry_index, 5);
    assert_eq!(get(&set, "a", 5), Some(Utf8::from("2")));
    assert_eq!(set.num_entries(), 1);
}

#[test]
fn test_same_hash_pileup_grows_probe_bound() {
    let (set, _mm) = new_set(HashSetConfig::new(64));
    let keys = ["k0", "k1", "k2", "k3", "k4"];
    for (i, key) in keys.iter().enumerate() {
        let ctx = insert(&set, key, key, 7);
        assert_eq!(ctx.entry_index, 7 + i);
    }
    assert_eq!(set.collision_escapes(), 5);

    for key in keys {
        assert_eq!(get(&set, key, 7), Some(Utf8::from(key)));
    }
}

#[test]
fn test_pileup_past_limit_is_fatal() {
    let config = HashSetConfig::new(16)
        .with_collision_escapes(1)
        .with_max_collision_factor(2);
    let (set, mm) = new_set(config);
    insert(&set, "a", "1", 9);
    insert(&set, "b", "2", 9);
    assert_eq!(set.collision_escapes(), 2);
    let live = mm.live_blocks();

    let mut ctx = OpContext::new();
    assert_eq!(
        set.allocate_key(&mut ctx, &Utf8::from("c"), 9, 9),
        Err(Status::TooManyCollisions)
    );
    assert_eq!(mm.live_blocks(), live);
    assert_eq!(set.num_entries(), 2);
}

#[test]
fn test_distinct_hashes_request_rebalance() {
    let (set, mm) = new_set(HashSetConfig::new(16));
    for (key, hash) in [("a", 1), ("b", 17), ("c", 33)] {
        insert(&set, key, key, hash);
    }
    let live = mm.live_blocks();

    let mut ctx = OpContext::new();
    assert!(!set
        .allocate_key(&mut ctx, &Utf8::from("d"), 1, 49)
        .unwrap());
    assert_eq!(set.collision_escapes(), 3);
    assert_eq!(mm.live_blocks(), live);

    for (key, hash) in [("a", 1), ("b", 17), ("c", 33)] {
        assert_eq!(get(&set, key, hash), Some(Utf8::from(key)));
    }
}

#[test]
fn test_probe_wraps_around() {
    let (set, _mm) = new_set(HashSetConfig::new(4));
    insert(&set, "a", "1", 3);
    let ctx = insert(&set, "b", "2", 3);
    assert_eq!(ctx.entry_index, 0);
    assert_eq!(get(&set, "b", 3), Some(Utf8::from("2")));
}

#[test]
fn test_hint_out_of_bound() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    let mut ctx = OpContext::new();
    assert_eq!(
        set.look_up(&mut ctx, &Utf8::from("a"), 8, 8),
        Err(Status::InvalidArgument)
    );
    assert_eq!(
        set.allocate_key(&mut ctx, &Utf8::from("a"), 8, 8),
        Err(Status::InvalidArgument)
    );
    assert_eq!(set.num_entries(), 0);
}

#[test]
fn test_zero_full_hash_is_stored_as_one() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    assert_eq!(set.home_slot(0), 1);
    let ctx = insert(&set, "a", "1", 0);
    assert_eq!(ctx.entry_index, 1);
    assert_eq!(set.get_full_hash(1), 1);
    assert_eq!(get(&set, "a", 0), Some(Utf8::from("1")));
}

#[test]
fn test_full_hash_of_uses_codec() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    let key = Utf8::from("a");
    assert_eq!(
        set.full_hash_of(&key).unwrap(),
        crate::codec::hash64(b"a")
    );
}

#[test]
fn test_copy_entry_rehashes_live_entries() {
    let (src, mm) = new_set(HashSetConfig::new(8));
    insert(&src, "a", "1", 1);
    let mut b = insert(&src, "b", "2", 2);
    insert(&src, "c", "3", 10);
    allocate(&src, "pending", 5);
    delete(&src, &mut b);

    let mut dst = Set::with_memory_manager(HashSetConfig::new(16), mm);
    let mut temp = Slice::new();
    for ei in 0..src.capacity() {
        assert!(dst.copy_entry(&mut temp, &src, ei).unwrap());
    }

    assert_eq!(dst.num_entries(), 2);
    assert!(dst.is_entry_set_valid_after_rebalance());
    assert_eq!(get(&dst, "a", 1), Some(Utf8::from("1")));
    assert_eq!(get(&dst, "c", 10), Some(Utf8::from("3")));
    assert_eq!(get(&dst, "b", 2), None);
    assert_eq!(get(&dst, "pending", 5), None);
    assert_eq!(dst.get_full_hash(10), 10);
}

#[test]
fn test_copy_entry_rehashes_with_codec_when_hash_lost() {
    let (src, mm) = new_set(HashSetConfig::new(8));
    let hash = src.full_hash_of(&Utf8::from("a")).unwrap();
    let ctx = insert(&src, "a", "1", hash);
    src.array()
        .set_entry_field(ctx.entry_index, FULL_HASH, INVALID_FULL_HASH);

    let mut dst = Set::with_memory_manager(HashSetConfig::new(32), mm);
    let mut temp = Slice::new();
    assert!(dst.copy_entry(&mut temp, &src, ctx.entry_index).unwrap());
    assert!(dst.is_entry_set_valid_after_rebalance());
    assert_eq!(get(&dst, "a", hash), Some(Utf8::from("1")));
}

#[test]
fn test_copy_entry_reports_full_neighborhood() {
    let (src, mm) = new_set(HashSetConfig::new(8));
    for (key, hash) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
        insert(&src, key, key, hash);
    }

    let mut dst = Set::with_memory_manager(HashSetConfig::new(2).with_collision_escapes(1), mm);
    let mut temp = Slice::new();
    assert!(dst.copy_entry(&mut temp, &src, 1).unwrap());
    assert!(dst.copy_entry(&mut temp, &src, 2).unwrap());
    assert!(!dst.copy_entry(&mut temp, &src, 3).unwrap());
    assert_eq!(
        dst.copy_entry(&mut temp, &src, 8),
        Err(Status::InvalidArgument)
    );
    assert_eq!(dst.num_entries(), 2);
}

#[test]
fn test_copy_entry_grows_bound_for_pileup() {
    let (src, mm) = new_set(HashSetConfig::new(16));
    for key in ["p0", "p1", "p2", "p3", "p4"] {
        insert(&src, key, key, 4);
    }
    assert_eq!(src.collision_escapes(), 5);

    let mut dst = Set::with_memory_manager(HashSetConfig::new(64), mm);
    let mut temp = Slice::new();
    for ei in 0..src.capacity() {
        assert!(dst.copy_entry(&mut temp, &src, ei).unwrap());
    }
    assert_eq!(dst.collision_escapes(), 5);
    assert!(dst.is_entry_set_valid_after_rebalance());
    for key in ["p0", "p1", "p2", "p3", "p4"] {
        assert_eq!(get(&dst, key, 4), Some(Utf8::from(key)));
    }
}

#[test]
fn test_rebalance_check_detects_broken_slots() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    let mut a = insert(&set, "a", "1", 1);
    insert(&set, "b", "2", 2);
    assert!(set.is_entry_set_valid_after_rebalance());

    // out of its home neighborhood
    set.array().set_entry_field(2, FULL_HASH, 6);
    assert!(!set.is_entry_set_valid_after_rebalance());
    set.array().set_entry_field(2, FULL_HASH, INVALID_FULL_HASH);
    assert!(!set.is_entry_set_valid_after_rebalance());
    set.array().set_entry_field(2, FULL_HASH, 2);
    assert!(set.is_entry_set_valid_after_rebalance());

    assert_eq!(set.delete_value_start(&mut a), ValueResult::True);
    assert!(!set.is_entry_set_valid_after_rebalance());
}

#[test]
fn test_empty_set_is_valid_after_rebalance() {
    let (set, _mm) = new_set(HashSetConfig::new(8));
    assert!(set.is_entry_set_valid_after_rebalance());
}

#[test]
#[should_panic(expected = "capacity must be positive")]
fn test_zero_capacity_panics() {
    let _ = new_set(HashSetConfig::new(0));
}

#[test]
fn test_config_limits() {
    let config = HashSetConfig::default();
    assert_eq!(config.capacity, 1024);
    assert_eq!(config.default_collision_escapes, 3);
    assert_eq!(config.max_collision_escapes(), 30);
    assert_eq!(config.max_allocate_retries, 1024);
}
