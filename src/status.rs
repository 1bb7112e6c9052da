//! Status codes and operation results for entry set operations
//!
//! Expected outcomes (a full ordered set, a hash neighbourhood that needs a
//! rebalance, a lost CAS race) are ordinary return values. `Status` is reserved
//! for conditions the caller cannot paper over by retrying.

use std::fmt;

/// Status code returned by fallible entry set operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    /// Operation completed successfully
    #[default]
    Ok = 0,
    /// The memory manager could not satisfy an allocation
    OutOfMemory = 1,
    /// Invalid argument provided (e.g. a slot hint outside the table)
    InvalidArgument = 2,
    /// Encoded bytes did not match what the codec expected
    Corruption = 3,
    /// Operation gave up after exhausting its retry budget
    Aborted = 4,
    /// The probe bound grew past its hard limit: the hash function is degenerate
    TooManyCollisions = 5,
}

impl Status {
    /// Check if the status indicates success
    #[inline]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Check if the status indicates an error
    #[inline]
    pub const fn is_error(&self) -> bool {
        matches!(
            self,
            Status::OutOfMemory
                | Status::InvalidArgument
                | Status::Corruption
                | Status::Aborted
                | Status::TooManyCollisions
        )
    }

    /// Get the status as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "Ok",
            Status::OutOfMemory => "OutOfMemory",
            Status::InvalidArgument => "InvalidArgument",
            Status::Corruption => "Corruption",
            Status::Aborted => "Aborted",
            Status::TooManyCollisions => "TooManyCollisions",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::error::Error for Status {}

/// Three-valued outcome of operations touching an off-heap header or a CAS.
///
/// `Retry` means the observation raced with a release/reallocation of the
/// underlying block and says nothing about the entry itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueResult {
    /// The condition holds / the update was applied
    True,
    /// The condition does not hold / another thread won
    False,
    /// The view was stale; re-read and try again
    Retry,
}

impl ValueResult {
    /// Check for `True`
    #[inline]
    pub const fn is_true(&self) -> bool {
        matches!(self, ValueResult::True)
    }

    /// Build from a plain boolean outcome
    #[inline]
    pub const fn from_bool(value: bool) -> Self {
        if value {
            ValueResult::True
        } else {
            ValueResult::False
        }
    }
}
