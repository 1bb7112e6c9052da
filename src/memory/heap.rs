//! Slab-backed memory manager
//!
//! Blocks are kept in a slab of slots. A slot is reused after release, and each
//! reuse bumps the slot version, so references captured before the release never
//! resolve to the new block.
//!
//! Reference layout:
//! - slot + 1 (32 bits): 0 is reserved for the invalid reference
//! - version (30 bits): incremented every time the slot is released
//! - vacated (1 bit): set by `vacate_reference`; the result is not valid
//! - deleted (1 bit): set by `alter_reference_for_delete`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{Block, BlockInit, MemoryManager, Slice};
use crate::reference::Reference;
use crate::status::Status;

/// Configuration for [`HeapMemoryManager`]
#[derive(Debug, Clone, Default)]
pub struct HeapMemoryConfig {
    /// Upper bound on allocated payload bytes (unbounded when `None`)
    pub capacity_bytes: Option<usize>,
}

impl HeapMemoryConfig {
    /// Create a configuration with a byte budget
    pub fn with_capacity_bytes(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes: Some(capacity_bytes),
        }
    }
}

#[derive(Default)]
struct SlabSlot {
    version: u32,
    block: Option<Arc<Block>>,
}

/// In-process memory manager with versioned, ABA-safe references.
pub struct HeapMemoryManager {
    slots: RwLock<Vec<SlabSlot>>,
    free: Mutex<Vec<u32>>,
    allocated_bytes: AtomicUsize,
    config: HeapMemoryConfig,
}

impl HeapMemoryManager {
    const SLOT_MASK: u64 = (1 << 32) - 1;
    const VERSION_SHIFT: u32 = 32;
    const VERSION_BITS: u32 = 30;
    const VERSION_MASK: u64 = (1 << Self::VERSION_BITS) - 1;
    const VACATED_BIT: u64 = 1 << 62;
    const DELETED_BIT: u64 = 1 << 63;

    /// Create an unbounded manager
    pub fn new() -> Self {
        Self::with_config(HeapMemoryConfig::default())
    }

    /// Create a manager with the given configuration
    pub fn with_config(config: HeapMemoryConfig) -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            free: Mutex::new(Vec::new()),
            allocated_bytes: AtomicUsize::new(0),
            config,
        }
    }

    /// Number of blocks currently allocated
    pub fn live_blocks(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|slot| slot.block.is_some())
            .count()
    }

    #[inline]
    fn encode(slot: u32, version: u32) -> Reference {
        let control = (((version as u64) & Self::VERSION_MASK) << Self::VERSION_SHIFT)
            | ((slot as u64) + 1);
        Reference::from_control(control)
    }

    /// Split a valid reference into (slot, version)
    #[inline]
    fn split(reference: Reference) -> (usize, u32) {
        let control = reference.control();
        let slot = (control & Self::SLOT_MASK) as usize - 1;
        let version = ((control >> Self::VERSION_SHIFT) & Self::VERSION_MASK) as u32;
        (slot, version)
    }

    fn reserve_bytes(&self, size: usize) -> Result<(), Status> {
        let prev = self.allocated_bytes.fetch_add(size, Ordering::AcqRel);
        if let Some(limit) = self.config.capacity_bytes {
            if prev + size > limit {
                self.allocated_bytes.fetch_sub(size, Ordering::AcqRel);
                return Err(Status::OutOfMemory);
            }
        }
        Ok(())
    }

    fn install(&self, block: Arc<Block>) -> Reference {
        let reused = self.free.lock().pop();
        let mut slots = self.slots.write();
        match reused {
            Some(slot) => {
                let entry = &mut slots[slot as usize];
                debug_assert!(entry.block.is_none());
                entry.block = Some(block);
                Self::encode(slot, entry.version)
            }
            None => {
                let slot = slots.len() as u32;
                slots.push(SlabSlot {
                    version: 0,
                    block: Some(block),
                });
                Self::encode(slot, 0)
            }
        }
    }
}

impl Default for HeapMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager for HeapMemoryManager {
    fn allocate(&self, size: usize, init: BlockInit<'_>) -> Result<Slice, Status> {
        self.reserve_bytes(size)?;

        let mut data = vec![0u8; size].into_boxed_slice();
        if let Err(status) = init(&mut data) {
            self.allocated_bytes.fetch_sub(size, Ordering::AcqRel);
            return Err(status);
        }

        let block = Arc::new(Block::new(data));
        let reference = self.install(Arc::clone(&block));

        let mut slice = Slice::new();
        slice.associate(reference, Some(block));
        Ok(slice)
    }

    fn release(&self, reference: Reference) {
        if !self.is_reference_valid(reference) {
            return;
        }
        let (slot, version) = Self::split(reference);

        let released = {
            let mut slots = self.slots.write();
            match slots.get_mut(slot) {
                Some(entry) if entry.version == version && entry.block.is_some() => {
                    let block = entry.block.take();
                    entry.version = ((entry.version as u64 + 1) & Self::VERSION_MASK) as u32;
                    block
                }
                _ => None,
            }
        };

        if let Some(block) = released {
            self.allocated_bytes.fetch_sub(block.len(), Ordering::AcqRel);
            self.free.lock().push(slot as u32);
        }
    }

    fn decode(&self, reference: Reference, slice: &mut Slice) -> bool {
        if !self.is_reference_valid_and_not_deleted(reference) {
            slice.associate(reference, None);
            return false;
        }
        let (slot, version) = Self::split(reference);

        let block = {
            let slots = self.slots.read();
            slots
                .get(slot)
                .filter(|entry| entry.version == version)
                .and_then(|entry| entry.block.clone())
        };
        let resolved = block.is_some();
        slice.associate(reference, block);
        resolved
    }

    #[inline]
    fn is_reference_valid(&self, reference: Reference) -> bool {
        let control = reference.control();
        (control & Self::SLOT_MASK) != 0 && (control & Self::VACATED_BIT) == 0
    }

    #[inline]
    fn is_reference_deleted(&self, reference: Reference) -> bool {
        self.is_reference_valid(reference) && (reference.control() & Self::DELETED_BIT) != 0
    }

    fn is_reference_consistent(&self, reference: Reference) -> bool {
        if !self.is_reference_valid(reference) {
            return reference.is_invalid() || (reference.control() & Self::VACATED_BIT) != 0;
        }
        let (slot, version) = Self::split(reference);
        let slots = self.slots.read();
        match slots.get(slot) {
            None => false,
            Some(_) if self.is_reference_deleted(reference) => true,
            Some(entry) => entry.version == version && entry.block.is_some(),
        }
    }

    #[inline]
    fn alter_reference_for_delete(&self, reference: Reference) -> Reference {
        if !self.is_reference_valid(reference) {
            return reference;
        }
        Reference::from_control(reference.control() | Self::DELETED_BIT)
    }

    #[inline]
    fn vacate_reference(&self, retired: Reference) -> Reference {
        if !self.is_reference_deleted(retired) {
            return retired;
        }
        Reference::from_control(retired.control() | Self::VACATED_BIT)
    }

    fn allocated_bytes(&self) -> usize {
        self.allocated_bytes.load(Ordering::Acquire)
    }
}
