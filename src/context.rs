//! Per-operation scratch state
//!
//! The entry set protocols are multi-step: a lookup observes references, a
//! later CAS uses them as expected values. `OpContext` carries those
//! observations between steps. One context belongs to one thread and one
//! logical operation at a time; callers `invalidate` it between keys.

use crate::entry::{EntryState, ValueState};
use crate::memory::Slice;

/// Scratch object threaded through entry set operations.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    /// Entry (slot) currently under examination
    pub entry_index: usize,
    /// Classification of `entry_index` (hash entry sets)
    pub entry_state: EntryState,
    /// State of the value at `entry_index` (ordered entry sets)
    pub value_state: ValueState,
    /// Key observed at, or allocated for, `entry_index`
    pub key: Slice,
    /// Value observed at `entry_index`; the expected value of the next value CAS
    pub value: Slice,
    /// Value staged by `write_value_start`, not yet published
    pub new_value: Slice,
    /// Scratch key view used while probing
    pub temp_key: Slice,
    /// Full-hash word observed at `entry_index`
    pub full_hash: u64,
    /// `new_value` relocates an existing value rather than inserting one
    pub is_new_value_for_move: bool,
}

impl OpContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every field to "no result"
    pub fn invalidate(&mut self) {
        self.entry_index = 0;
        self.entry_state = EntryState::Unknown;
        self.value_state = ValueState::Unknown;
        self.key.invalidate();
        self.value.invalidate();
        self.new_value.invalidate();
        self.temp_key.invalidate();
        self.full_hash = 0;
        self.is_new_value_for_move = false;
    }

    /// Check if the last observation found a live value
    #[inline]
    pub fn is_value_valid(&self) -> bool {
        self.value_state.is_valid()
    }
}
