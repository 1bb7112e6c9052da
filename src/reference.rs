//! Reference handles for off-heap allocations
//!
//! A `Reference` identifies one allocation handed out by a [`MemoryManager`].
//! The entry sets store references in their word arrays, compare them and CAS
//! them, but never look inside: validity, deletion and version bits are
//! interpreted only by the memory manager that produced them.
//!
//! [`MemoryManager`]: crate::memory::MemoryManager

use std::fmt;

/// Opaque 64-bit handle to an off-heap allocation.
///
/// The all-zero value is reserved as the invalid reference, so a zeroed entry
/// array starts out with every key and value reference invalid.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Reference(u64);

impl Reference {
    /// Reference that was never allocated.
    pub const INVALID: Self = Self(0);

    /// Create a reference from its raw control word
    #[inline]
    pub const fn from_control(control: u64) -> Self {
        Self(control)
    }

    /// Get the raw control word
    #[inline]
    pub const fn control(&self) -> u64 {
        self.0
    }

    /// Check if this is the invalid reference
    #[inline]
    pub const fn is_invalid(&self) -> bool {
        self.0 == Self::INVALID.0
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "Reference(INVALID)")
        } else {
            write!(f, "Reference({:#018x})", self.0)
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Reference {
    #[inline]
    fn from(control: u64) -> Self {
        Self(control)
    }
}

impl From<Reference> for u64 {
    #[inline]
    fn from(reference: Reference) -> Self {
        reference.0
    }
}
