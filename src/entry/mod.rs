//! Entry sets
//!
//! Both sets compose an [`EntryArray`] with their own [`EntryLayout`]:
//!
//! - [`OrderedEntrySet`]: entries handed out by a monotonically growing cursor
//!   and threaded into a singly linked list by the map layer.
//! - [`HashEntrySet`]: open addressing with a per-entry full hash and an
//!   adaptive probe bound.
//!
//! Inserts, lookups and deletes are lock-free. Compaction into a fresh set
//! (`copy_entry`) needs exclusive access to the destination and takes `&mut`.

mod array;
mod hashed;
mod ordered;
mod state;

pub use array::{EntryArray, EntryLayout};
pub use hashed::{encode_full_hash, HashEntrySet, HashSetConfig, INVALID_FULL_HASH};
pub use ordered::{OrderedEntrySet, OrderedSetConfig, INVALID_ENTRY_INDEX};
pub use state::{DeletionStep, EntryState, RefState, SlotObservation, ValueState};
