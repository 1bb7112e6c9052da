//! Built-in codecs for plain-old-data, raw bytes and UTF-8 strings.

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::mem;

use bytemuck::Pod;

use crate::codec::{hash64, KeyCodec, PersistKey, PersistValue, ValueCodec};
use crate::status::Status;

/// Codec storing `bytemuck::Pod` types as their in-memory bytes.
pub struct BlittableCodec<T>(PhantomData<T>);

impl<T: Pod> BlittableCodec<T> {
    #[inline]
    fn decode_pod(encoded: &[u8]) -> Result<T, Status> {
        if encoded.len() != mem::size_of::<T>() {
            return Err(Status::Corruption);
        }
        Ok(bytemuck::pod_read_unaligned(encoded))
    }

    #[inline]
    fn encode_pod(value: &T, dst: &mut [u8]) -> Result<(), Status> {
        if dst.len() != mem::size_of::<T>() {
            return Err(Status::InvalidArgument);
        }
        dst.copy_from_slice(bytemuck::bytes_of(value));
        Ok(())
    }
}

impl<T: Pod + Send + Sync> KeyCodec<T> for BlittableCodec<T> {
    #[inline]
    fn encoded_len(_key: &T) -> Result<usize, Status> {
        Ok(mem::size_of::<T>())
    }

    #[inline]
    fn encode_into(key: &T, dst: &mut [u8]) -> Result<(), Status> {
        Self::encode_pod(key, dst)
    }

    #[inline]
    fn equals_encoded(encoded: &[u8], key: &T) -> Result<bool, Status> {
        Ok(encoded == bytemuck::bytes_of(key))
    }

    #[inline]
    fn decode(encoded: &[u8]) -> Result<T, Status> {
        Self::decode_pod(encoded)
    }

    #[inline]
    fn compare_encoded(encoded: &[u8], key: &T) -> Result<Ordering, Status> {
        Ok(encoded.cmp(bytemuck::bytes_of(key)))
    }

    #[inline]
    fn hash(key: &T) -> Result<u64, Status> {
        Ok(hash64(bytemuck::bytes_of(key)))
    }
}

impl<T: Pod + Send + Sync> ValueCodec<T> for BlittableCodec<T> {
    #[inline]
    fn encoded_len(_value: &T) -> Result<usize, Status> {
        Ok(mem::size_of::<T>())
    }

    #[inline]
    fn encode_into(value: &T, dst: &mut [u8]) -> Result<(), Status> {
        Self::encode_pod(value, dst)
    }

    #[inline]
    fn decode(encoded: &[u8]) -> Result<T, Status> {
        Self::decode_pod(encoded)
    }
}

impl<T: Pod + Clone + Eq + Send + Sync + 'static> PersistKey for T {
    type Codec = BlittableCodec<T>;
}

impl<T: Pod + Clone + Send + Sync + 'static> PersistValue for T {
    type Codec = BlittableCodec<T>;
}

/// Opaque byte-string keys and values, stored without an envelope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct RawBytes(pub bytes::Bytes);

impl RawBytes {
    /// Borrow the bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    #[inline]
    fn from_encoded(encoded: &[u8]) -> Result<Self, Status> {
        Ok(Self(bytes::Bytes::copy_from_slice(encoded)))
    }
}

impl From<bytes::Bytes> for RawBytes {
    fn from(value: bytes::Bytes) -> Self {
        Self(value)
    }
}

impl From<Vec<u8>> for RawBytes {
    fn from(value: Vec<u8>) -> Self {
        Self(bytes::Bytes::from(value))
    }
}

impl From<&[u8]> for RawBytes {
    fn from(value: &[u8]) -> Self {
        Self(bytes::Bytes::copy_from_slice(value))
    }
}

/// Codec for [`RawBytes`]
pub struct RawBytesCodec;

/// String keys and values, stored as raw UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Utf8(pub String);

impl Utf8 {
    /// Borrow the UTF-8 bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    #[inline]
    fn from_encoded(encoded: &[u8]) -> Result<Self, Status> {
        std::str::from_utf8(encoded)
            .map(|s| Self(s.to_owned()))
            .map_err(|_| Status::Corruption)
    }
}

impl From<String> for Utf8 {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Utf8 {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Codec for [`Utf8`]
pub struct Utf8Codec;

/// Key and value codecs for wrappers whose encoding is their byte view.
macro_rules! byte_view_codec {
    ($codec:ty, $ty:ty) => {
        impl KeyCodec<$ty> for $codec {
            #[inline]
            fn encoded_len(key: &$ty) -> Result<usize, Status> {
                Ok(key.as_bytes().len())
            }

            #[inline]
            fn encode_into(key: &$ty, dst: &mut [u8]) -> Result<(), Status> {
                if dst.len() != key.as_bytes().len() {
                    return Err(Status::InvalidArgument);
                }
                dst.copy_from_slice(key.as_bytes());
                Ok(())
            }

            #[inline]
            fn equals_encoded(encoded: &[u8], key: &$ty) -> Result<bool, Status> {
                Ok(encoded == key.as_bytes())
            }

            #[inline]
            fn decode(encoded: &[u8]) -> Result<$ty, Status> {
                <$ty>::from_encoded(encoded)
            }

            #[inline]
            fn compare_encoded(encoded: &[u8], key: &$ty) -> Result<Ordering, Status> {
                Ok(encoded.cmp(key.as_bytes()))
            }

            #[inline]
            fn hash(key: &$ty) -> Result<u64, Status> {
                Ok(hash64(key.as_bytes()))
            }
        }

        impl ValueCodec<$ty> for $codec {
            #[inline]
            fn encoded_len(value: &$ty) -> Result<usize, Status> {
                Ok(value.as_bytes().len())
            }

            #[inline]
            fn encode_into(value: &$ty, dst: &mut [u8]) -> Result<(), Status> {
                if dst.len() != value.as_bytes().len() {
                    return Err(Status::InvalidArgument);
                }
                dst.copy_from_slice(value.as_bytes());
                Ok(())
            }

            #[inline]
            fn decode(encoded: &[u8]) -> Result<$ty, Status> {
                <$ty>::from_encoded(encoded)
            }
        }

        impl PersistKey for $ty {
            type Codec = $codec;
        }

        impl PersistValue for $ty {
            type Codec = $codec;
        }
    };
}

byte_view_codec!(RawBytesCodec, RawBytes);
byte_view_codec!(Utf8Codec, Utf8);
