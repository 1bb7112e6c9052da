//! Stable hashing for encoded keys.
//!
//! Full hashes are stored in hash entry sets and reused when a set is
//! compacted, so the function must not depend on per-process seeds
//! (`DefaultHasher` is ruled out).

#[cfg(not(any(feature = "hash-xxh3", feature = "hash-xxh64")))]
compile_error!("Enable a hash feature: `hash-xxh3` (default) or `hash-xxh64`.");

/// Deterministic 64-bit hash of key bytes.
#[inline]
pub fn hash64(bytes: &[u8]) -> u64 {
    #[cfg(feature = "hash-xxh3")]
    {
        xxhash_rust::xxh3::xxh3_64(bytes)
    }

    #[cfg(all(not(feature = "hash-xxh3"), feature = "hash-xxh64"))]
    {
        xxhash_rust::xxh64::xxh64(bytes, 0)
    }
}
