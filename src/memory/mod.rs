//! Off-heap memory management
//!
//! Keys and values live outside the entry arrays, in blocks handed out by a
//! [`MemoryManager`]. The entry sets only hold [`Reference`]s to those blocks and
//! resolve them into [`Slice`] views when they need the bytes or the block header.
//!
//! # Block header
//!
//! Every block carries an 8-byte header next to its payload. Bit 0 is the
//! deleted mark: setting it is the linearization point of a logical remove,
//! everything after that (retiring references in the entry array) is
//! bookkeeping that any thread may complete.

mod heap;

pub use heap::{HeapMemoryConfig, HeapMemoryManager};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::reference::Reference;
use crate::status::{Status, ValueResult};

/// An off-heap allocation: header word plus payload bytes.
///
/// The payload is written once, before the block's reference is published
/// into an entry array, and is read-only afterwards.
pub struct Block {
    header: AtomicU64,
    data: Box<[u8]>,
}

impl Block {
    /// Deleted mark in the header
    const DELETED_BIT: u64 = 1;

    /// Wrap an initialized payload into a block with a clear header
    pub fn new(data: Box<[u8]>) -> Self {
        Self {
            header: AtomicU64::new(0),
            data,
        }
    }

    /// Payload bytes
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check the deleted mark
    #[inline]
    pub fn is_deleted(&self) -> bool {
        (self.header.load(Ordering::Acquire) & Self::DELETED_BIT) != 0
    }

    /// Set the deleted mark.
    ///
    /// Returns true only for the call that actually flipped the bit.
    #[inline]
    pub fn mark_deleted(&self) -> bool {
        let prev = self.header.fetch_or(Self::DELETED_BIT, Ordering::AcqRel);
        (prev & Self::DELETED_BIT) == 0
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("len", &self.len())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

/// Decoded view of a reference.
///
/// A slice always remembers the reference it was last decoded from, even when
/// that reference did not resolve to a live block (invalid, deleted or stale).
/// The entry set protocols rely on this: the remembered reference is the
/// expected value of the next CAS on the entry field.
#[derive(Clone, Default)]
pub struct Slice {
    reference: Reference,
    block: Option<Arc<Block>>,
}

impl Slice {
    /// Create an empty slice holding the invalid reference
    pub fn new() -> Self {
        Self::default()
    }

    /// Point this slice at `reference`, optionally resolved to `block`.
    ///
    /// Called by memory managers from [`MemoryManager::decode`] and
    /// [`MemoryManager::allocate`].
    #[inline]
    pub fn associate(&mut self, reference: Reference, block: Option<Arc<Block>>) {
        self.reference = reference;
        self.block = block;
    }

    /// The reference this slice was last decoded from
    #[inline]
    pub fn reference(&self) -> Reference {
        self.reference
    }

    /// Check if the slice resolved to a live block
    #[inline]
    pub fn is_associated(&self) -> bool {
        self.block.is_some()
    }

    /// Payload bytes, if the slice resolved to a block
    #[inline]
    pub fn bytes(&self) -> Option<&[u8]> {
        self.block.as_deref().map(Block::bytes)
    }

    /// Payload length (0 when unresolved)
    #[inline]
    pub fn len(&self) -> usize {
        self.block.as_deref().map_or(0, Block::len)
    }

    /// Check if the slice has no payload
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the deleted mark of the off-heap header.
    ///
    /// `Retry` when the slice is not resolved to a block.
    #[inline]
    pub fn is_deleted(&self) -> ValueResult {
        match &self.block {
            Some(block) => ValueResult::from_bool(block.is_deleted()),
            None => ValueResult::Retry,
        }
    }

    /// Set the deleted mark of the off-heap header.
    ///
    /// `True` for the single caller that linearizes the delete, `False` if the
    /// block was already marked, `Retry` when the slice is unresolved.
    #[inline]
    pub fn mark_deleted(&self) -> ValueResult {
        match &self.block {
            Some(block) => ValueResult::from_bool(block.mark_deleted()),
            None => ValueResult::Retry,
        }
    }

    /// Reset to the invalid reference and drop the block view
    #[inline]
    pub fn invalidate(&mut self) {
        self.reference = Reference::INVALID;
        self.block = None;
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slice")
            .field("reference", &self.reference)
            .field("block", &self.block)
            .finish()
    }
}

/// Initializer invoked on a freshly allocated, unpublished payload
pub type BlockInit<'a> = &'a mut dyn FnMut(&mut [u8]) -> Result<(), Status>;

/// Allocator and reference codec for off-heap blocks.
///
/// Implementations own the reference encoding. The contract the entry sets
/// depend on:
///
/// - [`Reference::INVALID`] is the invalid reference (zeroed storage).
/// - `alter_reference_for_delete(r)` never equals any live reference the
///   manager has handed out or will hand out for the same storage.
/// - A reference captured before a block was released never equals a
///   reference to the storage after it was reused.
/// - `vacate_reference(r)` of a deleted `r` is not valid, and never equals
///   [`Reference::INVALID`], any reference or any other vacated encoding.
pub trait MemoryManager: Send + Sync {
    /// Allocate `size` bytes, let `init` fill them, and return a resolved slice.
    fn allocate(&self, size: usize, init: BlockInit<'_>) -> Result<Slice, Status>;

    /// Return a block to the manager. Stale references to it stop resolving.
    fn release(&self, reference: Reference);

    /// Resolve `reference` into `slice`.
    ///
    /// Always records `reference` in the slice; returns false (and leaves the
    /// slice unresolved) for invalid, deleted and stale references.
    fn decode(&self, reference: Reference, slice: &mut Slice) -> bool;

    /// Check if `reference` was ever allocated
    fn is_reference_valid(&self, reference: Reference) -> bool;

    /// Check if `reference` carries the deleted encoding
    fn is_reference_deleted(&self, reference: Reference) -> bool;

    /// Check if `reference` is allocated and not in its deleted encoding
    fn is_reference_valid_and_not_deleted(&self, reference: Reference) -> bool {
        self.is_reference_valid(reference) && !self.is_reference_deleted(reference)
    }

    /// Check that a reference is well formed for this manager
    fn is_reference_consistent(&self, reference: Reference) -> bool;

    /// The deleted encoding of `reference`
    fn alter_reference_for_delete(&self, reference: Reference) -> Reference;

    /// Invalid encoding that stands for retired reference `retired` once its
    /// slot is handed to a new occupant. Other references are returned as is.
    fn vacate_reference(&self, retired: Reference) -> Reference;

    /// The invalid reference sentinel
    fn invalid_reference(&self) -> Reference {
        Reference::INVALID
    }

    /// Bytes currently allocated
    fn allocated_bytes(&self) -> usize;
}
