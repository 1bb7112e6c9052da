//! Shared helpers for the entry set integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use oxioak::codec::{PersistKey, PersistValue};
use oxioak::prelude::*;

pub fn heap() -> Arc<HeapMemoryManager> {
    Arc::new(HeapMemoryManager::new())
}

pub fn expect_ok<T>(ctx: &'static str, r: Result<T, Status>) -> T {
    match r {
        Ok(v) => v,
        Err(s) => panic!("{ctx} failed: {s:?}"),
    }
}

/// Insert or replace `key` in a hash set, hashing with the key codec.
///
/// Returns false when the set asks for a rebalance.
pub fn hash_put<K: PersistKey, V: PersistValue>(
    set: &HashEntrySet<K, V>,
    key: &K,
    value: &V,
) -> Result<bool, Status> {
    let hash = set.full_hash_of(key)?;
    hash_put_with(set, key, value, hash)
}

/// Insert or replace `key` in a hash set under a caller-chosen full hash.
pub fn hash_put_with<K: PersistKey, V: PersistValue>(
    set: &HashEntrySet<K, V>,
    key: &K,
    value: &V,
    hash: u64,
) -> Result<bool, Status> {
    let hint = set.home_slot(hash);
    let mut ctx = OpContext::new();
    loop {
        if !set.allocate_key(&mut ctx, key, hint, hash)? {
            return Ok(false);
        }
        set.write_value_start(&mut ctx, value, false)?;
        if set.write_value_commit(&mut ctx).is_true() {
            return Ok(true);
        }
        set.release_new_value(&mut ctx);
    }
}

/// Look `key` up in a hash set, hashing with the key codec.
pub fn hash_get<K: PersistKey, V: PersistValue>(
    set: &HashEntrySet<K, V>,
    key: &K,
) -> Result<Option<V>, Status> {
    let hash = set.full_hash_of(key)?;
    hash_get_with(set, key, hash)
}

/// Look `key` up in a hash set under a caller-chosen full hash.
pub fn hash_get_with<K: PersistKey, V: PersistValue>(
    set: &HashEntrySet<K, V>,
    key: &K,
    hash: u64,
) -> Result<Option<V>, Status> {
    let mut ctx = OpContext::new();
    if !set.look_up(&mut ctx, key, set.home_slot(hash), hash)? {
        return Ok(None);
    }
    set.deserialize_value(&ctx.value).map(Some)
}

/// Remove `key` from a hash set: mark the value, then finalize.
///
/// Returns true when this call linearized the removal.
pub fn hash_remove<K: PersistKey, V: PersistValue>(
    set: &HashEntrySet<K, V>,
    key: &K,
) -> Result<bool, Status> {
    let hash = set.full_hash_of(key)?;
    hash_remove_with(set, key, hash)
}

/// Remove `key` from a hash set under a caller-chosen full hash.
pub fn hash_remove_with<K: PersistKey, V: PersistValue>(
    set: &HashEntrySet<K, V>,
    key: &K,
    hash: u64,
) -> Result<bool, Status> {
    let mut ctx = OpContext::new();
    if !set.look_up(&mut ctx, key, set.home_slot(hash), hash)? {
        return Ok(false);
    }
    let marked = set.delete_value_start(&mut ctx).is_true();
    set.delete_value_finish(&mut ctx);
    Ok(marked)
}

/// Append `key` to an ordered set with its value and link it after `prev`.
///
/// Returns the new entry index, or `None` when the set is full.
pub fn ordered_append<K: PersistKey, V: PersistValue>(
    set: &OrderedEntrySet<K, V>,
    prev: usize,
    key: &K,
    value: &V,
) -> Result<Option<usize>, Status> {
    let mut ctx = OpContext::new();
    if !set.allocate_entry(&mut ctx, key)? {
        return Ok(None);
    }
    set.write_value_start(&mut ctx, value, false)?;
    assert!(set.write_value_commit(&mut ctx).is_true());
    if prev == INVALID_ENTRY_INDEX {
        set.set_head_entry_index(ctx.entry_index);
    } else {
        set.set_next_entry_index(prev, ctx.entry_index);
    }
    Ok(Some(ctx.entry_index))
}

/// Walk an ordered set's list and collect the live key/value pairs.
pub fn ordered_entries<K: PersistKey, V: PersistValue>(
    set: &OrderedEntrySet<K, V>,
) -> Vec<(K, V)> {
    let mut out = Vec::new();
    let mut ctx = OpContext::new();
    let mut curr = set.get_head_entry_index();
    while curr != INVALID_ENTRY_INDEX {
        ctx.entry_index = curr;
        if set.read_key(&mut ctx) && set.read_value(&mut ctx) {
            let key = set.deserialize_key(&ctx.key).expect("decode key");
            let value = set.deserialize_value(&ctx.value).expect("decode value");
            out.push((key, value));
        }
        curr = set.get_next_entry_index(curr);
    }
    out
}
