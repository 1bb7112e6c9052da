//! Serde+bincode opt-in codec (via the [`Bincode`] wrapper type).

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{KeyCodec, PersistKey, PersistValue, ValueCodec};
use crate::status::Status;

/// Wrapper type to opt into serde+bincode serialization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Bincode<T>(pub T);

/// Serde+bincode codec. The off-heap bytes are the bare bincode payload.
pub struct SerdeBincodeCodec<T>(PhantomData<T>);

impl<T: Serialize> SerdeBincodeCodec<T> {
    #[inline]
    fn payload_len(value: &T) -> Result<usize, Status> {
        let n = bincode::serialized_size(value).map_err(|_| Status::InvalidArgument)?;
        usize::try_from(n).map_err(|_| Status::OutOfMemory)
    }

    #[inline]
    fn encode_payload(value: &T, dst: &mut [u8]) -> Result<(), Status> {
        if dst.len() != Self::payload_len(value)? {
            return Err(Status::InvalidArgument);
        }
        bincode::serialize_into(dst, value).map_err(|_| Status::InvalidArgument)
    }
}

impl<T: DeserializeOwned> SerdeBincodeCodec<T> {
    #[inline]
    fn decode_payload(bytes: &[u8]) -> Result<T, Status> {
        bincode::deserialize(bytes).map_err(|_| Status::Corruption)
    }
}

impl<T> KeyCodec<Bincode<T>> for SerdeBincodeCodec<T>
where
    T: Serialize + DeserializeOwned + Eq + Clone + Send + Sync + 'static,
{
    #[inline]
    fn encoded_len(key: &Bincode<T>) -> Result<usize, Status> {
        Self::payload_len(&key.0)
    }

    #[inline]
    fn encode_into(key: &Bincode<T>, dst: &mut [u8]) -> Result<(), Status> {
        Self::encode_payload(&key.0, dst)
    }

    #[inline]
    fn equals_encoded(encoded: &[u8], key: &Bincode<T>) -> Result<bool, Status> {
        Ok(Self::decode_payload(encoded)? == key.0)
    }

    #[inline]
    fn decode(encoded: &[u8]) -> Result<Bincode<T>, Status> {
        Self::decode_payload(encoded).map(Bincode)
    }
}

impl<T> ValueCodec<Bincode<T>> for SerdeBincodeCodec<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    #[inline]
    fn encoded_len(value: &Bincode<T>) -> Result<usize, Status> {
        Self::payload_len(&value.0)
    }

    #[inline]
    fn encode_into(value: &Bincode<T>, dst: &mut [u8]) -> Result<(), Status> {
        Self::encode_payload(&value.0, dst)
    }

    #[inline]
    fn decode(encoded: &[u8]) -> Result<Bincode<T>, Status> {
        Self::decode_payload(encoded).map(Bincode)
    }
}

impl<T> PersistKey for Bincode<T>
where
    T: Serialize + DeserializeOwned + Eq + Clone + Send + Sync + 'static,
{
    type Codec = SerdeBincodeCodec<T>;
}

impl<T> PersistValue for Bincode<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Codec = SerdeBincodeCodec<T>;
}
