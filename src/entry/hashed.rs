//! Open-addressing entry set
//!
//! A key lives in the first slot it could claim at or after its home slot,
//! within the adaptive probe bound. Every slot carries the full hash of its key
//! next to the key and value references, so probing rejects most foreign keys
//! without touching off-heap memory.
//!
//! Entry layout: `[key ref][value ref][full hash]`.
//!
//! The probe bound starts at [`HashSetConfig::default_collision_escapes`] and
//! grows by one only when every probed slot carries the same full hash (a true
//! pile-up). A neighborhood of distinct hashes asks for a rebalance into a
//! larger set instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::codec::{KeyCodec, PersistKey, PersistValue};
use crate::context::OpContext;
use crate::entry::{
    DeletionStep, EntryArray, EntryLayout, EntryState, RefState, SlotObservation, ValueState,
};
use crate::memory::{MemoryManager, Slice};
use crate::reference::Reference;
use crate::status::{Status, ValueResult};

const KEY: usize = 0;
const VALUE: usize = 1;
const FULL_HASH: usize = 2;

/// Full-hash word of a slot that holds no hash
pub const INVALID_FULL_HASH: u64 = 0;

// Every deletion step runs at most once per logical deletion, plus one pass to
// observe the finished slot.
const MAX_FINALIZE_PASSES: usize = 4;

/// Stored form of a caller hash. 0 is the invalid sentinel, so it becomes 1.
#[inline]
pub const fn encode_full_hash(full_hash: u64) -> u64 {
    if full_hash == INVALID_FULL_HASH {
        1
    } else {
        full_hash
    }
}

/// Configuration for [`HashEntrySet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashSetConfig {
    /// Number of slots
    pub capacity: usize,
    /// Initial probe bound
    pub default_collision_escapes: usize,
    /// The probe bound never grows past `default_collision_escapes * max_collision_factor`
    pub max_collision_factor: usize,
    /// Attempts `allocate_key` makes before giving up with [`Status::Aborted`]
    pub max_allocate_retries: usize,
}

impl HashSetConfig {
    /// Default number of slots
    pub const DEFAULT_CAPACITY: usize = 1024;
    /// Default initial probe bound
    pub const DEFAULT_COLLISION_ESCAPES: usize = 3;
    /// Default probe bound growth limit factor
    pub const DEFAULT_MAX_COLLISION_FACTOR: usize = 10;
    /// Default allocation retry cap
    pub const DEFAULT_MAX_ALLOCATE_RETRIES: usize = 1024;

    /// Create a configuration with the given capacity and default limits
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            default_collision_escapes: Self::DEFAULT_COLLISION_ESCAPES,
            max_collision_factor: Self::DEFAULT_MAX_COLLISION_FACTOR,
            max_allocate_retries: Self::DEFAULT_MAX_ALLOCATE_RETRIES,
        }
    }

    /// Set the initial probe bound
    pub fn with_collision_escapes(mut self, escapes: usize) -> Self {
        self.default_collision_escapes = escapes;
        self
    }

    /// Set the probe bound growth limit factor
    pub fn with_max_collision_factor(mut self, factor: usize) -> Self {
        self.max_collision_factor = factor;
        self
    }

    /// Set the allocation retry cap
    pub fn with_max_allocate_retries(mut self, retries: usize) -> Self {
        self.max_allocate_retries = retries;
        self
    }

    /// Largest probe bound the set may grow to
    #[inline]
    pub fn max_collision_escapes(&self) -> usize {
        self.default_collision_escapes
            .saturating_mul(self.max_collision_factor)
    }
}

impl Default for HashSetConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Open-addressing entry set over an [`EntryArray`]
#[derive(Debug)]
pub struct HashEntrySet<K, V> {
    array: EntryArray<K, V>,
    collision_escapes: AtomicUsize,
    config: HashSetConfig,
}

impl<K, V> HashEntrySet<K, V>
where
    K: PersistKey,
    V: PersistValue,
{
    /// Create an empty set.
    ///
    /// # Panics
    ///
    /// Panics if the capacity, the initial probe bound or the retry cap is 0.
    pub fn new(
        config: HashSetConfig,
        keys_mm: Arc<dyn MemoryManager>,
        values_mm: Arc<dyn MemoryManager>,
    ) -> Self {
        assert!(config.capacity >= 1, "hash entry set capacity must be positive");
        assert!(
            config.default_collision_escapes >= 1,
            "hash entry set probe bound must be positive"
        );
        assert!(
            config.max_allocate_retries >= 1,
            "hash entry set retry cap must be positive"
        );
        Self {
            array: EntryArray::new(EntryLayout::HASHED, config.capacity, keys_mm, values_mm),
            collision_escapes: AtomicUsize::new(config.default_collision_escapes),
            config,
        }
    }

    /// Create an empty set sharing one memory manager for keys and values
    pub fn with_memory_manager(config: HashSetConfig, mm: Arc<dyn MemoryManager>) -> Self {
        Self::new(config, mm.clone(), mm)
    }

    /// Underlying entry array
    #[inline]
    pub fn array(&self) -> &EntryArray<K, V> {
        &self.array
    }

    /// Configuration the set was built with
    #[inline]
    pub fn config(&self) -> &HashSetConfig {
        &self.config
    }

    /// Number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.array.capacity()
    }

    /// Live-entry counter
    #[inline]
    pub fn num_entries(&self) -> usize {
        self.array.num_entries()
    }

    /// Current probe bound
    #[inline]
    pub fn collision_escapes(&self) -> usize {
        self.collision_escapes.load(Ordering::Acquire)
    }

    /// Check if `ei` addresses a slot of this set
    #[inline]
    pub fn is_index_in_bound(&self, ei: usize) -> bool {
        self.array.is_index_in_bound(ei)
    }

    /// Home slot of a full hash.
    ///
    /// Callers derive the slot hint they pass to [`look_up`](Self::look_up) and
    /// [`allocate_key`](Self::allocate_key) with this, and compaction places
    /// entries by it.
    #[inline]
    pub fn home_slot(&self, full_hash: u64) -> usize {
        (encode_full_hash(full_hash) % self.capacity() as u64) as usize
    }

    /// Full hash of `key` with its codec
    #[inline]
    pub fn full_hash_of(&self, key: &K) -> Result<u64, Status> {
        K::Codec::hash(key)
    }

    /// Stored full-hash word of slot `ei`
    #[inline]
    pub fn get_full_hash(&self, ei: usize) -> u64 {
        self.array.get_entry_field(ei, FULL_HASH)
    }

    #[inline]
    fn probe_slot(&self, hint: usize, step: usize) -> usize {
        (hint + step) % self.capacity()
    }

    // ============ Classification ============

    /// Snapshot slot `ctx.entry_index`: the key into `ctx.temp_key`, the value
    /// into `ctx.value`, then the full hash into `ctx.full_hash`.
    fn observe(&self, ctx: &mut OpContext) -> SlotObservation {
        let ei = ctx.entry_index;
        let keys_mm = self.array.keys_memory_manager();
        let values_mm = self.array.values_memory_manager();

        self.array.read_key(&mut ctx.temp_key, ei);
        let key = RefState::of(keys_mm, ctx.temp_key.reference());

        let (value, value_marked) = loop {
            let decoded = self.array.read_value(&mut ctx.value, ei);
            let reference = ctx.value.reference();
            let state = RefState::of(values_mm, reference);
            if state.is_live() && !decoded && self.array.value_reference(ei) != reference {
                continue;
            }
            let marked =
                state.is_live() && (!decoded || ctx.value.is_deleted() != ValueResult::False);
            break (state, marked);
        };

        ctx.full_hash = self.get_full_hash(ei);
        ctx.value_state = ValueState::classify(value, value_marked);

        SlotObservation {
            key,
            value,
            value_marked,
            full_hash_valid: ctx.full_hash != INVALID_FULL_HASH,
        }
    }

    /// Classify slot `ei` for `key`.
    ///
    /// Sets `ctx.entry_index` and `ctx.entry_state`, leaves the slot key in
    /// `ctx.temp_key`, its value in `ctx.value` and its stored hash in
    /// `ctx.full_hash`. The key comparison only runs for a live key without a
    /// live value, to tell our own pending insert from someone else's.
    pub fn get_entry_state(
        &self,
        ctx: &mut OpContext,
        ei: usize,
        key: &K,
        full_hash: u64,
    ) -> Result<EntryState, Status> {
        ctx.entry_index = ei;
        let obs = self.observe(ctx);

        let mut compare_error = None;
        let state = obs.classify(|| {
            match self.equal_key_and_entry_key(ctx, key, full_hash) {
                Ok(same) => same,
                Err(status) => {
                    compare_error = Some(status);
                    false
                }
            }
        });
        if let Some(status) = compare_error {
            return Err(status);
        }

        ctx.entry_state = state;
        Ok(state)
    }

    /// Compare the key in `ctx.temp_key` with `key`, rejecting on a differing
    /// stored hash first
    fn equal_key_and_entry_key(
        &self,
        ctx: &OpContext,
        key: &K,
        full_hash: u64,
    ) -> Result<bool, Status> {
        if ctx.full_hash != INVALID_FULL_HASH && ctx.full_hash != encode_full_hash(full_hash) {
            return Ok(false);
        }
        self.array.key_equals(&ctx.temp_key, key)
    }

    // ============ Lookup ============

    /// Find `key`, probing from slot `hint`.
    ///
    /// On a hit `ctx.entry_index`, `ctx.key` and `ctx.value` describe the
    /// entry. A key found mid-deletion or mid-insert is reported absent: a key
    /// never lives in two slots, so the search stops there.
    ///
    /// An exhausted probe window is a plain miss (`Ok(false)`), never
    /// [`Status::TooManyCollisions`]: only inserts fail on the probe bound.
    pub fn look_up(
        &self,
        ctx: &mut OpContext,
        key: &K,
        hint: usize,
        full_hash: u64,
    ) -> Result<bool, Status> {
        ctx.invalidate();
        if !self.is_index_in_bound(hint) {
            return Err(Status::InvalidArgument);
        }

        let steps = self.collision_escapes().min(self.capacity());
        for step in 0..steps {
            let ei = self.probe_slot(hint, step);
            match self.get_entry_state(ctx, ei, key, full_hash)? {
                // Nothing was ever inserted past a never-used slot.
                EntryState::Unknown => break,
                EntryState::Deleted => {}
                EntryState::Valid => {
                    if !ctx.value_state.is_valid()
                        || !self.equal_key_and_entry_key(ctx, key, full_hash)?
                    {
                        continue;
                    }
                    ctx.key = ctx.temp_key.clone();
                    if ctx.key.is_deleted() != ValueResult::False {
                        ctx.invalidate();
                        return Ok(false);
                    }
                    return Ok(true);
                }
                // Classified as ours only when the slot holds `key`.
                EntryState::InsertNotFinalized => {
                    ctx.invalidate();
                    return Ok(false);
                }
                EntryState::DeletedNotFinalized => {
                    if self.equal_key_and_entry_key(ctx, key, full_hash)? {
                        ctx.invalidate();
                        return Ok(false);
                    }
                }
            }
        }

        ctx.invalidate();
        Ok(false)
    }

    // ============ Insert ============

    /// Locate the slot an insert of `key` should use.
    ///
    /// `Ok(true)` leaves the slot in `ctx`: the slot already holding `key`
    /// (`Valid` or `InsertNotFinalized`), or else the first claimable slot of
    /// the window. The whole window up to the first `Unknown` slot is scanned
    /// before a claimable slot is handed out, so a live copy of `key` behind a
    /// tombstone is always found. `Ok(false)` asks for a rebalance. May grow
    /// the probe bound.
    fn find_suitable_entry_for_insert(
        &self,
        ctx: &mut OpContext,
        key: &K,
        hint: usize,
        full_hash: u64,
    ) -> Result<bool, Status> {
        loop {
            let bound = self.collision_escapes();
            let steps = bound.min(self.capacity());
            let mut candidate = None;
            let mut first_hash = None;
            let mut same_hash = true;

            for step in 0..steps {
                let ei = self.probe_slot(hint, step);
                let mut state = self.get_entry_state(ctx, ei, key, full_hash)?;
                if state == EntryState::DeletedNotFinalized {
                    self.delete_value_finish(ctx);
                    state = self.get_entry_state(ctx, ei, key, full_hash)?;
                }

                match state {
                    EntryState::InsertNotFinalized => return Ok(true),
                    EntryState::Valid
                        if ctx.value_state.is_valid()
                            && self.equal_key_and_entry_key(ctx, key, full_hash)? =>
                    {
                        return Ok(true)
                    }
                    _ => {}
                }

                if state.is_claimable() {
                    candidate = candidate.or(Some(ei));
                    // Nothing was ever inserted past a never-used slot.
                    if state == EntryState::Unknown {
                        break;
                    }
                    continue;
                }

                match first_hash {
                    None => first_hash = Some(ctx.full_hash),
                    Some(h) if h != ctx.full_hash => same_hash = false,
                    Some(_) => {}
                }
            }

            if let Some(ei) = candidate {
                match self.get_entry_state(ctx, ei, key, full_hash)? {
                    EntryState::Unknown | EntryState::Deleted | EntryState::InsertNotFinalized => {
                        return Ok(true)
                    }
                    // Taken since the scan; look again.
                    _ => continue,
                }
            }

            if !same_hash || steps < bound {
                if tracing::enabled!(tracing::Level::DEBUG) {
                    tracing::debug!(
                        hint,
                        collision_escapes = bound,
                        num_entries = self.num_entries(),
                        "hash entry set neighborhood full, rebalance required"
                    );
                }
                return Ok(false);
            }

            let grown = bound + 1;
            if grown > self.config.max_collision_escapes() {
                if tracing::enabled!(tracing::Level::ERROR) {
                    tracing::error!(
                        hint,
                        full_hash,
                        collision_escapes = bound,
                        limit = self.config.max_collision_escapes(),
                        "too many full-hash collisions"
                    );
                }
                return Err(Status::TooManyCollisions);
            }
            if self
                .collision_escapes
                .compare_exchange(bound, grown, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
                && tracing::enabled!(tracing::Level::WARN)
            {
                tracing::warn!(
                    hint,
                    full_hash,
                    collision_escapes = grown,
                    "full-hash pile-up, probe bound grown"
                );
            }
        }
    }

    /// Write our hash into slot `ei` after our key CAS won.
    ///
    /// Returns false when the slot stopped holding `own_key` meanwhile; our
    /// write is then undone.
    fn publish_full_hash(&self, ei: usize, own_key: Reference, encoded: u64) -> bool {
        let mut seen = INVALID_FULL_HASH;
        loop {
            if self.array.cas_entry_field(ei, FULL_HASH, seen, encoded) {
                if self.array.key_reference(ei) == own_key {
                    return true;
                }
                self.array
                    .cas_entry_field(ei, FULL_HASH, encoded, INVALID_FULL_HASH);
                return false;
            }
            if self.array.key_reference(ei) != own_key {
                return false;
            }
            // A claimer delayed from an earlier occupation of the slot wrote
            // its hash; ours replaces it.
            seen = self.get_full_hash(ei);
            if seen == encoded {
                return true;
            }
        }
    }

    /// Find or claim a slot for `key`, probing from slot `hint`.
    ///
    /// `Ok(true)` leaves the slot in `ctx.entry_index`, its key in `ctx.key`
    /// and the value reference to replace in `ctx.value`. `ctx.entry_state` is
    /// `Valid` when `key` was already present and `InsertNotFinalized` when the
    /// slot still waits for a value; either way the caller continues with
    /// [`write_value_start`](Self::write_value_start) and
    /// [`write_value_commit`](Self::write_value_commit). `Ok(false)` asks for a
    /// rebalance.
    pub fn allocate_key(
        &self,
        ctx: &mut OpContext,
        key: &K,
        hint: usize,
        full_hash: u64,
    ) -> Result<bool, Status> {
        ctx.invalidate();
        if !self.is_index_in_bound(hint) {
            return Err(Status::InvalidArgument);
        }
        let encoded = encode_full_hash(full_hash);
        let mut own_key: Option<Slice> = None;

        for _ in 0..self.config.max_allocate_retries {
            let found = self.find_suitable_entry_for_insert(ctx, key, hint, full_hash);
            if !matches!(found, Ok(true)) {
                self.release_unpublished_key(own_key.take());
                return found;
            }
            let ei = ctx.entry_index;

            if matches!(
                ctx.entry_state,
                EntryState::Valid | EntryState::InsertNotFinalized
            ) {
                self.release_unpublished_key(own_key.take());
                ctx.key = ctx.temp_key.clone();
                return Ok(true);
            }

            // The previous occupant's retired value never sits under a new key.
            let values_mm = self.array.values_memory_manager();
            let seen_value = ctx.value.reference();
            if values_mm.is_reference_deleted(seen_value) {
                let vacated = values_mm.vacate_reference(seen_value);
                if !self.array.cas_value_reference(ei, seen_value, vacated)
                    && self.array.value_reference(ei) != vacated
                {
                    continue;
                }
                values_mm.decode(vacated, &mut ctx.value);
            }

            let new_key = match &own_key {
                Some(slice) => slice.clone(),
                None => {
                    let mut slice = Slice::new();
                    self.array.allocate_key(key, &mut slice)?;
                    own_key = Some(slice.clone());
                    slice
                }
            };

            let expected = ctx.temp_key.reference();
            if self
                .array
                .cas_key_reference(ei, expected, new_key.reference())
            {
                // Published: from here on the key is retired by deletion only.
                own_key = None;
                self.array.increment_num_entries();
                if self.publish_full_hash(ei, new_key.reference(), encoded) {
                    ctx.key = new_key;
                    ctx.full_hash = encoded;
                    ctx.entry_state = EntryState::InsertNotFinalized;
                    return Ok(true);
                }
            }
            // Lost the slot or the slot moved on. The next scan joins the
            // winner if it inserted the same key.
        }

        self.release_unpublished_key(own_key.take());
        if tracing::enabled!(tracing::Level::WARN) {
            tracing::warn!(
                hint,
                retries = self.config.max_allocate_retries,
                "hash entry set allocation aborted after retry cap"
            );
        }
        ctx.invalidate();
        Err(Status::Aborted)
    }

    fn release_unpublished_key(&self, key: Option<Slice>) {
        if let Some(slice) = key {
            self.array.release_key_reference(slice.reference());
        }
    }

    /// Release `ctx.key` when it was never published
    pub fn release_key(&self, ctx: &mut OpContext) {
        self.array.release_key(ctx);
    }

    /// Release `ctx.new_value` when it was never published
    pub fn release_new_value(&self, ctx: &mut OpContext) {
        self.array.release_new_value(ctx);
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

    /// Serialize `value` into `ctx.new_value`; the slot is not touched
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
            ctx.entry_state = EntryState::Valid;
        }
        result
    }

    /// Mark the off-heap value in `ctx.value` deleted (remove linearization point)
    pub fn delete_value_start(&self, ctx: &mut OpContext) -> ValueResult {
        self.array.delete_value_start(ctx)
    }

    /// Finalize the deletion of the value in `ctx.value` at `ctx.entry_index`.
    ///
    /// Runs the remaining steps (retire the value, retire the key, clear the
    /// full hash), helping whichever deleter got there first. Returns true for
    /// the single call that retired the value; that call also decrements the
    /// live count and releases the value. A value that replaced the marked
    /// one is a later write and is left alone.
    pub fn delete_value_finish(&self, ctx: &mut OpContext) -> bool {
        let ei = ctx.entry_index;
        let target = ctx.value.reference();
        let keys_mm = self.array.keys_memory_manager();
        let values_mm = self.array.values_memory_manager();
        let target_live = values_mm.is_reference_valid_and_not_deleted(target);
        let mut retired = false;

        for _ in 0..MAX_FINALIZE_PASSES {
            let obs = self.observe(ctx);
            let Some(step) = obs.next_deletion_step() else {
                break;
            };
            match step {
                DeletionStep::RetireValue => {
                    if !target_live || ctx.value.reference() != target {
                        break;
                    }
                    let retired_value = values_mm.alter_reference_for_delete(target);
                    if self.array.cas_value_reference(ei, target, retired_value) {
                        self.array.decrement_num_entries();
                        self.array.release_value_reference(target);
                        retired = true;
                    }
                }
                DeletionStep::RetireKey => {
                    let key = ctx.temp_key.reference();
                    let retired_key = keys_mm.alter_reference_for_delete(key);
                    if self.array.cas_key_reference(ei, key, retired_key) {
                        self.array.release_key_reference(key);
                    }
                }
                DeletionStep::ClearFullHash => {
                    self.array
                        .cas_entry_field(ei, FULL_HASH, ctx.full_hash, INVALID_FULL_HASH);
                }
            }
        }

        let obs = self.observe(ctx);
        ctx.entry_state = obs.classify(|| false);
        retired
    }

    // ============ Compaction ============

    /// Rehash live slot `src_ei` of `src` into this set.
    ///
    /// The entry goes to the first empty slot within the probe bound of its
    /// home slot, computed from the stored full hash or, if that was lost,
    /// from the key codec. A window filled with the same full hash grows the
    /// bound like an insert would. Deleted and value-less source slots are
    /// skipped and reported as copied. `Ok(false)` means the neighborhood is
    /// full. Both sets must share their memory managers.
    pub fn copy_entry(
        &mut self,
        temp_value: &mut Slice,
        src: &HashEntrySet<K, V>,
        src_ei: usize,
    ) -> Result<bool, Status> {
        if !src.is_index_in_bound(src_ei) {
            return Err(Status::InvalidArgument);
        }
        if src.is_entry_deleted(temp_value, src_ei) {
            return Ok(true);
        }
        let mut key = Slice::new();
        if !src.array.read_key(&mut key, src_ei) {
            return Ok(true);
        }

        let stored = src.get_full_hash(src_ei);
        let encoded = if stored != INVALID_FULL_HASH {
            stored
        } else {
            encode_full_hash(src.array.hash_key_slice(&key).ok_or(Status::Corruption)?)
        };

        let home = self.home_slot(encoded);
        loop {
            let bound = *self.collision_escapes.get_mut();
            let steps = bound.min(self.capacity());
            let mut same_hash = true;
            for step in 0..steps {
                let ei = self.probe_slot(home, step);
                if !self.array.key_reference(ei).is_invalid() {
                    same_hash &= self.get_full_hash(ei) == encoded;
                    continue;
                }
                self.array
                    .copy_entry_words(&src.array, src_ei, ei, KEY..VALUE + 1);
                self.array.set_entry_field(ei, FULL_HASH, encoded);
                self.array.increment_num_entries();
                return Ok(true);
            }

            // A pile-up the source grew its bound for grows ours the same way.
            if same_hash && steps == bound && bound < self.config.max_collision_escapes() {
                *self.collision_escapes.get_mut() = bound + 1;
                continue;
            }

            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(
                    capacity = self.capacity(),
                    home,
                    src_ei,
                    collision_escapes = bound,
                    "compaction target hash set neighborhood full"
                );
            }
            return Ok(false);
        }
    }

    /// Check the set after compaction: every occupied slot is live,
    /// reference-consistent, carries a hash and sits within the probe bound of
    /// its home slot, and the live count matches.
    pub fn is_entry_set_valid_after_rebalance(&self) -> bool {
        let keys_mm = self.array.keys_memory_manager();
        let values_mm = self.array.values_memory_manager();
        let bound = self.collision_escapes();
        let capacity = self.capacity();
        let mut temp = Slice::new();
        let mut occupied = 0usize;

        for ei in 0..capacity {
            let key = self.array.key_reference(ei);
            if key.is_invalid() {
                continue;
            }
            if !keys_mm.is_reference_valid_and_not_deleted(key)
                || !keys_mm.is_reference_consistent(key)
            {
                return false;
            }
            if self.array.is_entry_deleted(&mut temp, ei)
                || !values_mm.is_reference_consistent(self.array.value_reference(ei))
            {
                return false;
            }
            let stored = self.get_full_hash(ei);
            if stored == INVALID_FULL_HASH {
                return false;
            }
            let distance = (ei + capacity - self.home_slot(stored)) % capacity;
            if distance >= bound {
                return false;
            }
            occupied += 1;
        }

        if occupied != self.num_entries() {
            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(
                    occupied,
                    num_entries = self.num_entries(),
                    "hash entry set live count mismatch"
                );
            }
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests;
