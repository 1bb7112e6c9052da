//! Entry classification and the deletion state machine
//!
//! Nothing here touches shared memory. The entry sets take a snapshot of a
//! slot (a [`SlotObservation`]), classify it, and ask which finalization step
//! comes next. The CASes that apply a step live in the sets.
//!
//! A hash slot moves through deletion like this:
//!
//! ```text
//!   key live, value live, value marked        DeletedNotFinalized
//!     | RetireValue   (CAS value ref -> deleted encoding, count -1)
//!   key live, value deleted                   DeletedNotFinalized
//!     | RetireKey     (CAS key ref -> deleted encoding)
//!   key deleted, hash valid                   DeletedNotFinalized
//!     | ClearFullHash (CAS full hash -> invalid)
//!   key deleted, hash invalid                 Deleted
//! ```
//!
//! The value goes first, so a value commit racing the deletion and the
//! `RetireValue` CAS expect the same word and only one of them lands. A new
//! occupant of a `Deleted` slot swaps the retired value for its vacated
//! encoding (see [`MemoryManager::vacate_reference`]) before it claims the key.
//! "Key live, value deleted" therefore always means a deletion between its
//! first two steps, and "key live, value invalid" an insert that has not
//! attached its value yet.

use crate::memory::MemoryManager;
use crate::reference::Reference;

/// Classification of a hash entry set slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryState {
    /// Never used
    #[default]
    Unknown,
    /// Live key and value
    Valid,
    /// Fully deleted; the slot may be claimed by any key
    Deleted,
    /// Value marked deleted, references not yet retired
    DeletedNotFinalized,
    /// Key attached by the probing key, value not attached yet
    InsertNotFinalized,
}

impl EntryState {
    /// Slots an insert may claim without further work
    #[inline]
    pub const fn is_claimable(&self) -> bool {
        matches!(self, EntryState::Unknown | EntryState::Deleted)
    }

    /// Get the state as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntryState::Unknown => "Unknown",
            EntryState::Valid => "Valid",
            EntryState::Deleted => "Deleted",
            EntryState::DeletedNotFinalized => "DeletedNotFinalized",
            EntryState::InsertNotFinalized => "InsertNotFinalized",
        }
    }
}

/// Value state of an ordered entry set entry.
///
/// Ordered so that "valid" tests as `state >= ValueState::Valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum ValueState {
    /// No value attached
    #[default]
    Unknown = 0,
    /// Value reference retired
    Deleted = 1,
    /// Value marked deleted off-heap, reference not retired yet
    DeletedNotFinalized = 2,
    /// Live value
    Valid = 3,
}

impl ValueState {
    /// Check for a live value
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self >= ValueState::Valid
    }

    /// Derive the state from the value reference and the off-heap mark
    #[inline]
    pub const fn classify(value: RefState, value_marked: bool) -> Self {
        match value {
            RefState::Invalid => ValueState::Unknown,
            RefState::Deleted => ValueState::Deleted,
            RefState::Live if value_marked => ValueState::DeletedNotFinalized,
            RefState::Live => ValueState::Valid,
        }
    }
}

/// What a memory manager says about a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefState {
    /// Never allocated, or vacated for a new occupant
    Invalid,
    /// Allocated, not in its deleted encoding
    Live,
    /// Deleted encoding
    Deleted,
}

impl RefState {
    /// Ask `mm` about `reference`
    #[inline]
    pub fn of(mm: &dyn MemoryManager, reference: Reference) -> Self {
        if !mm.is_reference_valid(reference) {
            RefState::Invalid
        } else if mm.is_reference_deleted(reference) {
            RefState::Deleted
        } else {
            RefState::Live
        }
    }

    /// Check for `Live`
    #[inline]
    pub const fn is_live(&self) -> bool {
        matches!(self, RefState::Live)
    }
}

/// One finalization step of a hash slot deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionStep {
    /// CAS the key reference to its deleted encoding
    RetireKey,
    /// CAS the value reference to its deleted encoding
    RetireValue,
    /// CAS the full-hash word to the invalid sentinel
    ClearFullHash,
}

/// Snapshot of one hash slot.
///
/// Fields are read key first, then value, then full hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotObservation {
    /// Key reference
    pub key: RefState,
    /// Value reference
    pub value: RefState,
    /// Off-heap deleted mark of the value (only meaningful for a live value)
    pub value_marked: bool,
    /// Full-hash word holds a hash
    pub full_hash_valid: bool,
}

impl SlotObservation {
    /// Snapshot of a zeroed slot
    pub const EMPTY: Self = Self {
        key: RefState::Invalid,
        value: RefState::Invalid,
        value_marked: false,
        full_hash_valid: false,
    };

    /// Classify the slot.
    ///
    /// `same_key` is consulted only for a live key without any value: the slot
    /// is then either our own pending insert or another key's.
    pub fn classify(&self, same_key: impl FnOnce() -> bool) -> EntryState {
        match (self.key, self.value) {
            (RefState::Invalid, _) => EntryState::Unknown,
            (RefState::Deleted, _) if self.full_hash_valid => EntryState::DeletedNotFinalized,
            (RefState::Deleted, _) => EntryState::Deleted,
            (RefState::Live, RefState::Live) if self.value_marked => {
                EntryState::DeletedNotFinalized
            }
            (RefState::Live, RefState::Live) => EntryState::Valid,
            (RefState::Live, RefState::Deleted) => EntryState::DeletedNotFinalized,
            (RefState::Live, RefState::Invalid) if same_key() => EntryState::InsertNotFinalized,
            (RefState::Live, RefState::Invalid) => EntryState::Valid,
        }
    }

    /// Next deletion finalization step, or `None` when nothing is pending
    pub fn next_deletion_step(&self) -> Option<DeletionStep> {
        match (self.key, self.value) {
            (RefState::Live, RefState::Live) if self.value_marked => {
                Some(DeletionStep::RetireValue)
            }
            (RefState::Live, RefState::Deleted) => Some(DeletionStep::RetireKey),
            (RefState::Deleted, _) if self.full_hash_valid => Some(DeletionStep::ClearFullHash),
            _ => None,
        }
    }

    /// The observation after `step` was applied successfully
    pub fn after(&self, step: DeletionStep) -> Self {
        let mut next = *self;
        match step {
            DeletionStep::RetireKey => next.key = RefState::Deleted,
            DeletionStep::RetireValue => {
                next.value = RefState::Deleted;
                next.value_marked = false;
            }
            DeletionStep::ClearFullHash => next.full_hash_valid = false,
        }
        next
    }
}
