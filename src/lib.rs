//! oxioak - lock-free entry indexing for an off-heap key-value map
//!
//! Keys and values live in off-heap blocks handed out by a [`MemoryManager`];
//! the entry sets map keys to those blocks through arrays of 64-bit words that
//! are only ever updated with compare-and-swap:
//!
//! - **Ordered entry set**: entries claimed by a growing cursor and threaded
//!   into a singly linked list by the map layer above.
//! - **Hash entry set**: open addressing with a per-slot full hash and an
//!   adaptive probe bound.
//!
//! Inserts linearize when the value reference is published, deletes when the
//! off-heap value is marked. Retiring the references afterwards is bookkeeping
//! any thread may finish.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use oxioak::prelude::*;
//!
//! let mm = Arc::new(HeapMemoryManager::new());
//! let set: HashEntrySet<Utf8, Utf8> =
//!     HashEntrySet::with_memory_manager(HashSetConfig::new(64), mm);
//!
//! let key = Utf8::from("apple");
//! let hash = set.full_hash_of(&key)?;
//! let hint = set.home_slot(hash);
//!
//! let mut ctx = OpContext::new();
//! assert!(set.allocate_key(&mut ctx, &key, hint, hash)?);
//! set.write_value_start(&mut ctx, &Utf8::from("red"), false)?;
//! assert!(set.write_value_commit(&mut ctx).is_true());
//!
//! assert!(set.look_up(&mut ctx, &key, hint, hash)?);
//! assert_eq!(set.deserialize_value(&ctx.value)?, Utf8::from("red"));
//! # Ok::<(), oxioak::Status>(())
//! ```
//!
//! [`MemoryManager`]: memory::MemoryManager

#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod context;
pub mod entry;
pub mod memory;
pub mod reference;
pub mod status;

// Re-exports for convenience
pub use config::{ConfigError, OxioakConfig};
pub use context::OpContext;
pub use entry::{
    EntryState, HashEntrySet, HashSetConfig, OrderedEntrySet, OrderedSetConfig, ValueState,
    INVALID_ENTRY_INDEX,
};
pub use memory::{HeapMemoryConfig, HeapMemoryManager, MemoryManager, Slice};
pub use reference::Reference;
pub use status::{Status, ValueResult};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::codec::{PersistKey, PersistValue, RawBytes, Utf8};
    pub use crate::context::OpContext;
    pub use crate::entry::{
        EntryState, HashEntrySet, HashSetConfig, OrderedEntrySet, OrderedSetConfig, ValueState,
        INVALID_ENTRY_INDEX,
    };
    pub use crate::memory::{HeapMemoryManager, MemoryManager, Slice};
    pub use crate::reference::Reference;
    pub use crate::status::{Status, ValueResult};
}
