//! Key/value serialization for the entry sets.
//!
//! An entry set is parameterized by its key and value types. `PersistKey` and
//! `PersistValue` select a codec for each type, and the codec turns keys and
//! values into the off-heap bytes the entry arrays reference. Key codecs also
//! provide the stable hash and the key comparator used when probing slots.

mod bincode;
mod bytes;
mod hash;

pub use bincode::Bincode;
pub use hash::hash64;

use std::cmp::Ordering;

use crate::status::Status;

/// Trait binding a key type to its default codec.
pub trait PersistKey: Clone + Eq + Send + Sync + 'static {
    /// Default codec for this key type.
    type Codec: KeyCodec<Self>;
}

/// Trait binding a value type to its default codec.
pub trait PersistValue: Clone + Send + Sync + 'static {
    /// Default codec for this value type.
    type Codec: ValueCodec<Self>;
}

/// Encode/decode, comparison and hashing contract for keys.
pub trait KeyCodec<K>: Send + Sync + 'static {
    /// Encoded length for the given key.
    fn encoded_len(key: &K) -> Result<usize, Status>;
    /// Encode the key into the provided buffer.
    ///
    /// Implementations must write exactly `encoded_len(key)` bytes.
    fn encode_into(key: &K, dst: &mut [u8]) -> Result<(), Status>;
    /// Compare an off-heap encoded key to a typed key for equality.
    ///
    /// This should avoid allocations when possible.
    fn equals_encoded(encoded: &[u8], key: &K) -> Result<bool, Status>;
    /// Decode an encoded key into an owned value.
    fn decode(encoded: &[u8]) -> Result<K, Status>;

    /// Order an encoded key against a typed key.
    ///
    /// The default orders by encoded bytes. The entry sets only consult
    /// equality; the ordering is for the map layer threading ordered sets.
    fn compare_encoded(encoded: &[u8], key: &K) -> Result<Ordering, Status> {
        let len = Self::encoded_len(key)?;
        let mut buf = vec![0u8; len];
        Self::encode_into(key, &mut buf)?;
        Ok(encoded.cmp(buf.as_slice()))
    }

    /// Hash encoded key bytes (stable, deterministic).
    #[inline]
    fn hash_encoded(encoded: &[u8]) -> u64 {
        hash::hash64(encoded)
    }

    /// Hash a typed key (stable, deterministic).
    ///
    /// Must agree with `hash_encoded` on the key's encoding: compaction
    /// rehashes entries from their off-heap bytes.
    #[inline]
    fn hash(key: &K) -> Result<u64, Status> {
        let len = Self::encoded_len(key)?;
        let mut buf = vec![0u8; len];
        Self::encode_into(key, &mut buf)?;
        Ok(Self::hash_encoded(&buf))
    }
}

/// Encode/decode contract for values.
pub trait ValueCodec<V>: Send + Sync + 'static {
    /// Encoded length for the given value.
    fn encoded_len(value: &V) -> Result<usize, Status>;
    /// Encode the value into the provided buffer.
    ///
    /// Implementations must write exactly `encoded_len(value)` bytes.
    fn encode_into(value: &V, dst: &mut [u8]) -> Result<(), Status>;
    /// Decode an encoded value into an owned value.
    fn decode(encoded: &[u8]) -> Result<V, Status>;
}

pub use bincode::SerdeBincodeCodec;
pub use bytes::{BlittableCodec, RawBytes, RawBytesCodec, Utf8, Utf8Codec};
