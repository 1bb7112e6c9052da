//! Shared entry storage for the ordered and hash entry sets
//!
//! An [`EntryArray`] is a flat array of 64-bit words grouped into fixed-width
//! entries. The [`EntryLayout`] descriptor is the only place the record shape
//! is known; the sets compose an array with their own layout and build their
//! protocols on the typed accessors here.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::codec::{KeyCodec, PersistKey, PersistValue, ValueCodec};
use crate::context::OpContext;
use crate::entry::{RefState, ValueState};
use crate::memory::{MemoryManager, Slice};
use crate::reference::Reference;
use crate::status::{Status, ValueResult};

/// Field layout of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLayout {
    /// Layout name (for diagnostics)
    pub name: &'static str,
    /// Words per entry
    pub fields: usize,
    /// Offset of the key reference
    pub key_field: usize,
    /// Offset of the value reference
    pub value_field: usize,
}

impl EntryLayout {
    /// `[next | reserved][key ref][value ref]`
    pub const ORDERED: Self = Self {
        name: "ordered",
        fields: 3,
        key_field: 1,
        value_field: 2,
    };

    /// `[key ref][value ref][full hash]`
    pub const HASHED: Self = Self {
        name: "hashed",
        fields: 3,
        key_field: 0,
        value_field: 1,
    };
}

/// Fixed-capacity array of entries with typed field access.
///
/// Storage starts zeroed, so every key and value reference starts out as
/// [`Reference::INVALID`]. Field loads are `Acquire`, stores `Release` and
/// CASes `AcqRel`.
pub struct EntryArray<K, V> {
    layout: EntryLayout,
    capacity: usize,
    words: Box<[AtomicU64]>,
    num_entries: AtomicUsize,
    keys_mm: Arc<dyn MemoryManager>,
    values_mm: Arc<dyn MemoryManager>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> EntryArray<K, V>
where
    K: PersistKey,
    V: PersistValue,
{
    /// Create a zeroed array of `capacity` entries
    pub fn new(
        layout: EntryLayout,
        capacity: usize,
        keys_mm: Arc<dyn MemoryManager>,
        values_mm: Arc<dyn MemoryManager>,
    ) -> Self {
        let words = (0..capacity * layout.fields)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            layout,
            capacity,
            words,
            num_entries: AtomicUsize::new(0),
            keys_mm,
            values_mm,
            _marker: PhantomData,
        }
    }

    /// Entry layout
    #[inline]
    pub fn layout(&self) -> EntryLayout {
        self.layout
    }

    /// Declared number of entries
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live-entry counter
    #[inline]
    pub fn num_entries(&self) -> usize {
        self.num_entries.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn increment_num_entries(&self) {
        self.num_entries.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn decrement_num_entries(&self) {
        self.num_entries.fetch_sub(1, Ordering::AcqRel);
    }

    /// Check if `ei` addresses an entry of this array
    #[inline]
    pub fn is_index_in_bound(&self, ei: usize) -> bool {
        ei < self.capacity
    }

    /// Memory manager for keys
    #[inline]
    pub fn keys_memory_manager(&self) -> &dyn MemoryManager {
        self.keys_mm.as_ref()
    }

    /// Memory manager for values
    #[inline]
    pub fn values_memory_manager(&self) -> &dyn MemoryManager {
        self.values_mm.as_ref()
    }

    #[inline]
    fn word_index(&self, ei: usize, field: usize) -> usize {
        assert!(
            ei < self.capacity,
            "entry index {ei} out of bounds for {} entry array of capacity {}",
            self.layout.name,
            self.capacity
        );
        assert!(
            field < self.layout.fields,
            "field {field} outside the {} layout",
            self.layout.name
        );
        ei * self.layout.fields + field
    }

    /// Load a field.
    ///
    /// # Panics
    ///
    /// Panics if `ei` or `field` is out of bounds.
    #[inline]
    pub fn get_entry_field(&self, ei: usize, field: usize) -> u64 {
        self.words[self.word_index(ei, field)].load(Ordering::Acquire)
    }

    /// Store a field.
    ///
    /// # Panics
    ///
    /// Panics if `ei` or `field` is out of bounds.
    #[inline]
    pub fn set_entry_field(&self, ei: usize, field: usize, value: u64) {
        self.words[self.word_index(ei, field)].store(value, Ordering::Release);
    }

    /// Compare-and-swap a field.
    ///
    /// # Panics
    ///
    /// Panics if `ei` or `field` is out of bounds.
    #[inline]
    pub fn cas_entry_field(&self, ei: usize, field: usize, expected: u64, new: u64) -> bool {
        self.words[self.word_index(ei, field)]
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Key reference of entry `ei`
    #[inline]
    pub fn key_reference(&self, ei: usize) -> Reference {
        Reference::from_control(self.get_entry_field(ei, self.layout.key_field))
    }

    /// Value reference of entry `ei`
    #[inline]
    pub fn value_reference(&self, ei: usize) -> Reference {
        Reference::from_control(self.get_entry_field(ei, self.layout.value_field))
    }

    #[inline]
    pub(crate) fn set_key_reference(&self, ei: usize, reference: Reference) {
        self.set_entry_field(ei, self.layout.key_field, reference.control());
    }

    /// CAS the key reference of entry `ei`
    #[inline]
    pub fn cas_key_reference(&self, ei: usize, expected: Reference, new: Reference) -> bool {
        self.cas_entry_field(ei, self.layout.key_field, expected.control(), new.control())
    }

    /// CAS the value reference of entry `ei`
    #[inline]
    pub fn cas_value_reference(&self, ei: usize, expected: Reference, new: Reference) -> bool {
        self.cas_entry_field(ei, self.layout.value_field, expected.control(), new.control())
    }

    /// Decode the key of entry `ei` into `slice`.
    ///
    /// The observed reference is always recorded in `slice`; returns false if it
    /// is invalid, deleted or no longer resolves.
    #[inline]
    pub fn read_key(&self, slice: &mut Slice, ei: usize) -> bool {
        self.keys_mm.decode(self.key_reference(ei), slice)
    }

    /// Decode the value of entry `ei` into `slice` (see [`read_key`](Self::read_key))
    #[inline]
    pub fn read_value(&self, slice: &mut Slice, ei: usize) -> bool {
        self.values_mm.decode(self.value_reference(ei), slice)
    }

    /// Decode the value of `ctx.entry_index` into `ctx.value` and classify it
    /// into `ctx.value_state`. Returns true for a live value.
    pub fn read_value_state(&self, ctx: &mut OpContext) -> bool {
        let mm = self.values_memory_manager();
        loop {
            let decoded = self.read_value(&mut ctx.value, ctx.entry_index);
            let reference = ctx.value.reference();
            let state = RefState::of(mm, reference);

            // A live reference that no longer resolves was retired and released
            // while we decoded it, unless the entry moved on to another value.
            if state.is_live() && !decoded && self.value_reference(ctx.entry_index) != reference {
                continue;
            }

            let marked = !decoded || ctx.value.is_deleted() != ValueResult::False;
            ctx.value_state = ValueState::classify(state, marked);
            return ctx.value_state.is_valid();
        }
    }

    /// Check the value reference of entry `ei` without decoding it
    #[inline]
    pub fn is_value_ref_valid_and_not_deleted(&self, ei: usize) -> bool {
        self.values_mm
            .is_reference_valid_and_not_deleted(self.value_reference(ei))
    }

    /// Check if entry `ei` has no live value, by reference or off-heap mark
    pub fn is_entry_deleted(&self, temp_value: &mut Slice, ei: usize) -> bool {
        if !self.read_value(temp_value, ei) {
            return true;
        }
        temp_value.is_deleted() != ValueResult::False
    }

    /// Serialize `key` into a fresh, unpublished allocation
    pub fn allocate_key(&self, key: &K, slice: &mut Slice) -> Result<(), Status> {
        let len = K::Codec::encoded_len(key)?;
        *slice = self
            .keys_mm
            .allocate(len, &mut |dst| K::Codec::encode_into(key, dst))?;
        Ok(())
    }

    /// Copy an already serialized key into a fresh, unpublished allocation
    pub fn duplicate_key(&self, src: &Slice, dst: &mut Slice) -> Result<(), Status> {
        let bytes = src.bytes().ok_or(Status::InvalidArgument)?;
        *dst = self.keys_mm.allocate(bytes.len(), &mut |buf| {
            buf.copy_from_slice(bytes);
            Ok(())
        })?;
        Ok(())
    }

    /// Compare a decoded key with `key`; an unresolved slice never matches
    #[inline]
    pub fn key_equals(&self, slice: &Slice, key: &K) -> Result<bool, Status> {
        match slice.bytes() {
            Some(encoded) => K::Codec::equals_encoded(encoded, key),
            None => Ok(false),
        }
    }

    /// Hash of a decoded key, computed from its encoded bytes
    #[inline]
    pub fn hash_key_slice(&self, slice: &Slice) -> Option<u64> {
        slice.bytes().map(K::Codec::hash_encoded)
    }

    /// Decode a key slice with the key codec
    pub fn deserialize_key(&self, slice: &Slice) -> Result<K, Status> {
        let encoded = slice.bytes().ok_or(Status::InvalidArgument)?;
        K::Codec::decode(encoded)
    }

    /// Decode a value slice with the value codec
    pub fn deserialize_value(&self, slice: &Slice) -> Result<V, Status> {
        let encoded = slice.bytes().ok_or(Status::InvalidArgument)?;
        V::Codec::decode(encoded)
    }

    /// Serialize `value` into `ctx.new_value` without touching the entry.
    ///
    /// `for_move` marks the new value as a relocation of an existing value.
    pub fn write_value_start(
        &self,
        ctx: &mut OpContext,
        value: &V,
        for_move: bool,
    ) -> Result<(), Status> {
        let len = V::Codec::encoded_len(value)?;
        ctx.new_value = self
            .values_mm
            .allocate(len, &mut |dst| V::Codec::encode_into(value, dst))?;
        ctx.is_new_value_for_move = for_move;
        Ok(())
    }

    /// CAS the value reference of `ctx.entry_index` from `ctx.value` to
    /// `ctx.new_value`.
    ///
    /// On success the staged value becomes `ctx.value`. On `False` a
    /// concurrent writer won and `ctx.new_value` is left staged for the caller
    /// to retry with or release.
    pub fn write_value_commit(&self, ctx: &mut OpContext) -> ValueResult {
        let expected = ctx.value.reference();
        let new = ctx.new_value.reference();
        debug_assert!(self.values_mm.is_reference_valid(new));

        if !self.cas_value_reference(ctx.entry_index, expected, new) {
            return ValueResult::False;
        }
        ctx.value = std::mem::take(&mut ctx.new_value);
        ValueResult::True
    }

    /// Mark the off-heap value in `ctx.value` deleted.
    ///
    /// This is the linearization point of a remove: `True` for the caller
    /// that marked it, `False` if it was already marked, `Retry` if the
    /// context holds no resolved value.
    pub fn delete_value_start(&self, ctx: &mut OpContext) -> ValueResult {
        ctx.value.mark_deleted()
    }

    /// Release a key that was never published
    pub fn release_key(&self, ctx: &mut OpContext) {
        self.keys_mm.release(ctx.key.reference());
        ctx.key.invalidate();
    }

    /// Release a staged value that was never published
    pub fn release_new_value(&self, ctx: &mut OpContext) {
        self.values_mm.release(ctx.new_value.reference());
        ctx.new_value.invalidate();
    }

    #[inline]
    pub(crate) fn release_key_reference(&self, reference: Reference) {
        self.keys_mm.release(reference);
    }

    #[inline]
    pub(crate) fn release_value_reference(&self, reference: Reference) {
        self.values_mm.release(reference);
    }

    /// Raw copy of `fields` of entry `src_ei` in `src` into entry `dst_ei`.
    ///
    /// Both arrays must share their memory managers. Exclusive access to the
    /// destination is required.
    pub fn copy_entry_words(
        &mut self,
        src: &EntryArray<K, V>,
        src_ei: usize,
        dst_ei: usize,
        fields: Range<usize>,
    ) {
        debug_assert_eq!(self.layout, src.layout);
        for field in fields {
            let value = src.get_entry_field(src_ei, field);
            let idx = self.word_index(dst_ei, field);
            *self.words[idx].get_mut() = value;
        }
    }
}

impl<K, V> fmt::Debug for EntryArray<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryArray")
            .field("layout", &self.layout.name)
            .field("capacity", &self.capacity)
            .field("num_entries", &self.num_entries.load(Ordering::Relaxed))
            .finish()
    }
}
