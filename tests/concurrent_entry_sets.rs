mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use common::{expect_ok, hash_get, hash_put, heap};
use oxioak::prelude::*;

const THREADS: usize = 8;

type StrHash = HashEntrySet<Utf8, Utf8>;

#[test]
fn test_concurrent_allocate_same_key_single_winner() {
    for _round in 0..20 {
        let mm = heap();
        let set = Arc::new(StrHash::with_memory_manager(HashSetConfig::new(64), mm.clone()));
        let barrier = Arc::new(Barrier::new(THREADS));
        let key = Utf8::from("contended");

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let set = Arc::clone(&set);
                let barrier = Arc::clone(&barrier);
                let key = key.clone();
                thread::spawn(move || {
                    let hash = expect_ok("hash", set.full_hash_of(&key));
                    let hint = set.home_slot(hash);
                    let mut ctx = OpContext::new();
                    barrier.wait();
                    assert!(expect_ok("allocate", set.allocate_key(&mut ctx, &key, hint, hash)));
                    let claimed = (ctx.entry_index, ctx.key.reference());

                    expect_ok(
                        "write",
                        set.write_value_start(&mut ctx, &Utf8::from(format!("v{t}")), false),
                    );
                    let won = set.write_value_commit(&mut ctx).is_true();
                    if !won {
                        set.release_new_value(&mut ctx);
                    }
                    (claimed, won)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let claimed: HashSet<_> = results.iter().map(|(c, _)| *c).collect();
        assert_eq!(claimed.len(), 1, "all threads must share one slot and key");
        assert!(results.iter().any(|(_, won)| *won));
        assert_eq!(set.num_entries(), 1);

        // one key block, plus the values that were published
        let published = results.iter().filter(|(_, won)| *won).count();
        assert_eq!(mm.live_blocks(), 1 + published);
        assert!(expect_ok("get", hash_get(&set, &key)).is_some());
    }
}

#[test]
fn test_concurrent_delete_finish_exactly_once() {
    for _round in 0..20 {
        let set = Arc::new(StrHash::with_memory_manager(HashSetConfig::new(32), heap()));
        let key = Utf8::from("victim");
        assert!(expect_ok("put", hash_put(&set, &key, &Utf8::from("v"))));

        let hash = expect_ok("hash", set.full_hash_of(&key));
        let mut ctx = OpContext::new();
        assert!(expect_ok(
            "look_up",
            set.look_up(&mut ctx, &key, set.home_slot(hash), hash)
        ));
        assert!(set.delete_value_start(&mut ctx).is_true());

        let barrier = Arc::new(Barrier::new(THREADS));
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let set = Arc::clone(&set);
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                let mut helper = ctx.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if set.delete_value_finish(&mut helper) {
                        winners.fetch_add(1, Ordering::AcqRel);
                    }
                    assert!(!set.delete_value_finish(&mut helper));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::Acquire), 1);
        assert_eq!(set.num_entries(), 0);
        assert_eq!(expect_ok("get", hash_get(&set, &key)), None);
        assert_eq!(set.get_full_hash(ctx.entry_index), 0);
    }
}

#[test]
fn test_no_resurrection_while_others_finalize() {
    let set = Arc::new(StrHash::with_memory_manager(HashSetConfig::new(1 << 13), heap()));
    let keys: Vec<Utf8> = (0..128).map(|i| Utf8::from(format!("key-{i}"))).collect();
    for key in &keys {
        assert!(expect_ok("put", hash_put(&set, key, key)));
    }

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let set = Arc::clone(&set);
            let barrier = Arc::clone(&barrier);
            let keys = keys.clone();
            thread::spawn(move || {
                barrier.wait();
                for (i, key) in keys.iter().enumerate() {
                    let hash = expect_ok("hash", set.full_hash_of(key));
                    let hint = set.home_slot(hash);
                    let mut ctx = OpContext::new();
                    if i % THREADS == t {
                        // owner: mark, check, finalize
                        assert!(expect_ok("look_up", set.look_up(&mut ctx, key, hint, hash)));
                        assert!(set.delete_value_start(&mut ctx).is_true());
                        let mut probe = OpContext::new();
                        assert!(!expect_ok("look_up", set.look_up(&mut probe, key, hint, hash)));
                        set.delete_value_finish(&mut ctx);
                    } else if !expect_ok("look_up", set.look_up(&mut ctx, key, hint, hash)) {
                        // once gone, a key stays gone
                        let mut again = OpContext::new();
                        assert!(!expect_ok("look_up", set.look_up(&mut again, key, hint, hash)));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(set.num_entries(), 0);
    for key in &keys {
        assert_eq!(expect_ok("get", hash_get(&set, key)), None);
    }
}

#[test]
fn test_concurrent_disjoint_inserts() {
    let set = Arc::new(HashEntrySet::<u64, u64>::with_memory_manager(
        HashSetConfig::new(1 << 17),
        heap(),
    ));
    let per_thread = 128u64;

    let handles: Vec<_> = (0..THREADS as u64)
        .map(|t| {
            let set = Arc::clone(&set);
            thread::spawn(move || {
                for i in 0..per_thread {
                    let key = t * per_thread + i;
                    assert!(expect_ok("put", hash_put(&set, &key, &(key + 1))));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(set.num_entries(), THREADS * per_thread as usize);
    for key in 0..THREADS as u64 * per_thread {
        assert_eq!(expect_ok("get", hash_get(&set, &key)), Some(key + 1));
    }
}

#[test]
fn test_concurrent_ordered_allocation_hands_out_unique_indices() {
    let set = Arc::new(OrderedEntrySet::<u64, u64>::with_memory_manager(
        OrderedSetConfig::new(1 + THREADS * 32),
        heap(),
    ));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS as u64)
        .map(|t| {
            let set = Arc::clone(&set);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut claimed = Vec::new();
                let mut ctx = OpContext::new();
                // more attempts than room: the tail must fail cleanly
                for i in 0..64u64 {
                    if expect_ok("allocate", set.allocate_entry(&mut ctx, &(t * 1000 + i))) {
                        claimed.push(ctx.entry_index);
                    }
                }
                claimed
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(unique.len(), all.len());
    assert_eq!(all.len(), set.usable_capacity());
    assert!(!unique.contains(&INVALID_ENTRY_INDEX));
    assert_eq!(set.num_entries(), set.usable_capacity());
    assert_eq!(set.last_entry_index(), set.capacity());
}
