//! Insertion-ordered entry set
//!
//! Entries are handed out by a cursor that only grows, so an index is never
//! reused by allocation. Entry 0 is a permanent dummy: index 0 doubles as the
//! "no entry" sentinel for next pointers and the head. How entries are linked
//! is decided by the map layer; this set only provides the next/head
//! primitives.
//!
//! Entry layout: `[next (low 32 bits) | reserved][key ref][value ref]`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::codec::{PersistKey, PersistValue};
use crate::context::OpContext;
use crate::entry::{EntryArray, EntryLayout, ValueState};
use crate::memory::{MemoryManager, Slice};
use crate::status::{Status, ValueResult};

/// Entry index meaning "no entry"
pub const INVALID_ENTRY_INDEX: usize = 0;

const NEXT: usize = 0;
const NEXT_MASK: u64 = u32::MAX as u64;

/// Configuration for [`OrderedEntrySet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedSetConfig {
    /// Declared number of entries, including the dummy entry 0
    pub capacity: usize,
}

impl OrderedSetConfig {
    /// Default declared capacity
    pub const DEFAULT_CAPACITY: usize = 4096;

    /// Create a configuration with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl Default for OrderedSetConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Insertion-ordered entry set over an [`EntryArray`]
#[derive(Debug)]
pub struct OrderedEntrySet<K, V> {
    array: EntryArray<K, V>,
    next_free_index: AtomicUsize,
    head_entry_index: AtomicUsize,
}

impl<K, V> OrderedEntrySet<K, V>
where
    K: PersistKey,
    V: PersistValue,
{
    /// Create an empty set.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is 0 or does not fit the 32-bit next field.
    pub fn new(
        config: OrderedSetConfig,
        keys_mm: Arc<dyn MemoryManager>,
        values_mm: Arc<dyn MemoryManager>,
    ) -> Self {
        assert!(
            config.capacity >= 1 && config.capacity as u64 <= NEXT_MASK,
            "ordered entry set capacity {} out of range",
            config.capacity
        );
        Self {
            array: EntryArray::new(EntryLayout::ORDERED, config.capacity, keys_mm, values_mm),
            next_free_index: AtomicUsize::new(1),
            head_entry_index: AtomicUsize::new(INVALID_ENTRY_INDEX),
        }
    }

    /// Create an empty set sharing one memory manager for keys and values
    pub fn with_memory_manager(config: OrderedSetConfig, mm: Arc<dyn MemoryManager>) -> Self {
        Self::new(config, mm.clone(), mm)
    }

    /// Underlying entry array
    #[inline]
    pub fn array(&self) -> &EntryArray<K, V> {
        &self.array
    }

    /// Declared capacity, including the dummy entry
    #[inline]
    pub fn capacity(&self) -> usize {
        self.array.capacity()
    }

    /// Number of entries allocation can hand out
    #[inline]
    pub fn usable_capacity(&self) -> usize {
        self.array.capacity() - 1
    }

    /// Live-entry counter
    #[inline]
    pub fn num_entries(&self) -> usize {
        self.array.num_entries()
    }

    /// One past the last entry handed out
    #[inline]
    pub fn last_entry_index(&self) -> usize {
        self.next_free_index
            .load(Ordering::Acquire)
            .min(self.array.capacity())
    }

    /// Check if `ei` addresses an entry of this set
    #[inline]
    pub fn is_index_in_bound(&self, ei: usize) -> bool {
        self.array.is_index_in_bound(ei)
    }

    // ============ Next / head primitives ============

    /// Successor of `ei`, or [`INVALID_ENTRY_INDEX`]
    #[inline]
    pub fn get_next_entry_index(&self, ei: usize) -> usize {
        if ei == INVALID_ENTRY_INDEX || !self.is_index_in_bound(ei) {
            return INVALID_ENTRY_INDEX;
        }
        (self.array.get_entry_field(ei, NEXT) & NEXT_MASK) as usize
    }

    /// Set the successor of `ei`
    pub fn set_next_entry_index(&self, ei: usize, next: usize) {
        debug_assert!(ei != INVALID_ENTRY_INDEX && ei < self.last_entry_index());
        debug_assert!(next < self.last_entry_index());
        loop {
            let word = self.array.get_entry_field(ei, NEXT);
            let new = (word & !NEXT_MASK) | (next as u64 & NEXT_MASK);
            if self.array.cas_entry_field(ei, NEXT, word, new) {
                return;
            }
        }
    }

    /// CAS the successor of `ei` from `expected` to `new`
    pub fn cas_next_entry_index(&self, ei: usize, expected: usize, new: usize) -> bool {
        if ei == INVALID_ENTRY_INDEX || !self.is_index_in_bound(ei) {
            return false;
        }
        loop {
            let word = self.array.get_entry_field(ei, NEXT);
            if (word & NEXT_MASK) as usize != expected {
                return false;
            }
            let updated = (word & !NEXT_MASK) | (new as u64 & NEXT_MASK);
            if self.array.cas_entry_field(ei, NEXT, word, updated) {
                return true;
            }
        }
    }

    /// First entry of the list, or [`INVALID_ENTRY_INDEX`]
    #[inline]
    pub fn get_head_entry_index(&self) -> usize {
        self.head_entry_index.load(Ordering::Acquire)
    }

    /// Set the first entry of the list
    #[inline]
    pub fn set_head_entry_index(&self, ei: usize) {
        self.head_entry_index.store(ei, Ordering::Release);
    }

    /// CAS the first entry of the list
    #[inline]
    pub fn cas_head_entry_index(&self, expected: usize, new: usize) -> bool {
        self.head_entry_index
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // ============ Allocation ============

    /// Claim the next free entry for `key`.
    ///
    /// The key is serialized before an index is claimed. Returns `Ok(false)`
    /// when the set is full: the caller must move on to a fresh set. On
    /// success `ctx.entry_index` and `ctx.key` describe the new entry and its
    /// value reference is invalid.
    pub fn allocate_entry(&self, ctx: &mut OpContext, key: &K) -> Result<bool, Status> {
        ctx.invalidate();
        self.array.allocate_key(key, &mut ctx.key)?;

        let ei = self.next_free_index.fetch_add(1, Ordering::AcqRel);
        if !self.is_index_in_bound(ei) {
            self.array.release_key(ctx);
            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(
                    capacity = self.capacity(),
                    num_entries = self.num_entries(),
                    "ordered entry set exhausted"
                );
            }
            return Ok(false);
        }

        self.array.increment_num_entries();
        self.array.set_key_reference(ei, ctx.key.reference());
        ctx.entry_index = ei;
        Ok(true)
    }

    /// Release `ctx.key` when it was never published
    pub fn release_key(&self, ctx: &mut OpContext) {
        self.array.release_key(ctx);
    }

    /// Release `ctx.new_value` when it was never published
    pub fn release_new_value(&self, ctx: &mut OpContext) {
        self.array.release_new_value(ctx);
    }

    /// Copy the serialized key in `src` into a fresh allocation
    pub fn duplicate_key(&self, src: &Slice, dst: &mut Slice) -> Result<(), Status> {
        self.array.duplicate_key(src, dst)
    }

    // ============ Reads ============

    /// Decode the key of `ctx.entry_index` into `ctx.key`
    #[inline]
    pub fn read_key(&self, ctx: &mut OpContext) -> bool {
        self.array.read_key(&mut ctx.key, ctx.entry_index)
    }

    /// Decode the value of `ctx.entry_index` into `ctx.value` and set
    /// `ctx.value_state`. Returns true for a live value.
    pub fn read_value(&self, ctx: &mut OpContext) -> bool {
        self.array.read_value_state(ctx)
    }

    /// Check the value reference of `ei` without decoding it
    #[inline]
    pub fn is_value_ref_valid_and_not_deleted(&self, ei: usize) -> bool {
        self.array.is_value_ref_valid_and_not_deleted(ei)
    }

    /// Check if `ei` has no live value, by reference or off-heap mark
    #[inline]
    pub fn is_entry_deleted(&self, temp_value: &mut Slice, ei: usize) -> bool {
        self.array.is_entry_deleted(temp_value, ei)
    }

    /// Decode a key slice
    pub fn deserialize_key(&self, slice: &Slice) -> Result<K, Status> {
        self.array.deserialize_key(slice)
    }

    /// Decode a value slice
    pub fn deserialize_value(&self, slice: &Slice) -> Result<V, Status> {
        self.array.deserialize_value(slice)
    }

    // ============ Value protocol ============

    /// Serialize `value` into `ctx.new_value`; the entry is not touched
    pub fn write_value_start(
        &self,
        ctx: &mut OpContext,
        value: &V,
        for_move: bool,
    ) -> Result<(), Status> {
        self.array.write_value_start(ctx, value, for_move)
    }

    /// Publish `ctx.new_value` (insert linearization point)
    pub fn write_value_commit(&self, ctx: &mut OpContext) -> ValueResult {
        let result = self.array.write_value_commit(ctx);
        if result.is_true() {
            ctx.value_state = ValueState::Valid;
        }
        result
    }

    /// Mark the off-heap value in `ctx.value` deleted (remove linearization point)
    pub fn delete_value_start(&self, ctx: &mut OpContext) -> ValueResult {
        self.array.delete_value_start(ctx)
    }

    /// Retire the value reference of a value already marked deleted off-heap.
    ///
    /// Returns true for the single call that retired it; that call also
    /// decrements the live count and releases the value. Any other call,
    /// including a repeat with the same context, returns false.
    pub fn delete_value_finish(&self, ctx: &mut OpContext) -> bool {
        let mm = self.array.values_memory_manager();
        let expected = ctx.value.reference();
        if !mm.is_reference_valid_and_not_deleted(expected) {
            return false;
        }
        if ctx.value.is_deleted() == ValueResult::False {
            return false;
        }

        let retired = mm.alter_reference_for_delete(expected);
        if self
            .array
            .cas_value_reference(ctx.entry_index, expected, retired)
        {
            debug_assert!(mm.is_reference_consistent(self.array.value_reference(ctx.entry_index)));
            self.array.decrement_num_entries();
            self.array.release_value_reference(expected);
            ctx.value.associate(retired, None);
            ctx.value_state = ValueState::Deleted;
            return true;
        }

        self.read_value(ctx);
        false
    }

    // ============ Compaction ============

    /// Copy entry `src_ei` of `src` into the next free entry of this set.
    ///
    /// Deleted source entries are skipped and reported as copied. Returns
    /// false when this set is full or `src_ei` is not an entry. Next pointers
    /// are left for the caller to link. Both sets must share their memory
    /// managers.
    pub fn copy_entry(
        &mut self,
        temp_value: &mut Slice,
        src: &OrderedEntrySet<K, V>,
        src_ei: usize,
    ) -> bool {
        if src_ei == INVALID_ENTRY_INDEX || !src.is_index_in_bound(src_ei) {
            return false;
        }

        let dst_ei = *self.next_free_index.get_mut();
        if !self.is_index_in_bound(dst_ei) {
            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(
                    capacity = self.capacity(),
                    src_ei,
                    "compaction target ordered set is full"
                );
            }
            return false;
        }

        if src.is_entry_deleted(temp_value, src_ei) {
            return true;
        }
        debug_assert!(self
            .array
            .values_memory_manager()
            .is_reference_consistent(temp_value.reference()));

        self.array
            .copy_entry_words(&src.array, src_ei, dst_ei, NEXT + 1..EntryLayout::ORDERED.fields);

        *self.next_free_index.get_mut() += 1;
        self.array.increment_num_entries();
        true
    }

    /// Check the list after compaction: every linked entry is live,
    /// reference-consistent and directly follows its predecessor.
    pub fn is_entry_set_valid_after_rebalance(&self) -> bool {
        let last = self.last_entry_index();
        let values_mm = self.array.values_memory_manager();
        let mut temp = Slice::new();

        let mut prev = INVALID_ENTRY_INDEX;
        let mut curr = self.get_head_entry_index();
        let mut visited = 0usize;

        while curr != INVALID_ENTRY_INDEX {
            if curr >= last {
                return false;
            }
            visited += 1;
            if visited > self.usable_capacity() {
                return false;
            }
            if self.array.is_entry_deleted(&mut temp, curr) {
                return false;
            }
            if !values_mm.is_reference_consistent(self.array.value_reference(curr)) {
                return false;
            }
            if prev != INVALID_ENTRY_INDEX && curr != prev + 1 {
                return false;
            }
            prev = curr;
            curr = self.get_next_entry_index(curr);
        }
        true
    }
}
