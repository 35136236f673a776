//! Codec abstraction
//!
//! A [`Codec<T>`] turns values of one semantic type into bytes and back. The
//! cache holds one codec for its key type and one for its value type, shared
//! between writers (encode) and the apply loop (decode).

use crate::error::CodecResult;
use std::sync::Arc;

/// Converts values of type `T` to and from their log representation
pub trait Codec<T>: Send + Sync {
    /// Encode a value into the bytes written to the log
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>>;

    /// Decode bytes read from the log
    ///
    /// Must reject input that is not a valid encoding of `T`.
    fn decode(&self, bytes: &[u8]) -> CodecResult<T>;
}

impl<T, C> Codec<T> for Arc<C>
where
    C: Codec<T> + ?Sized,
{
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>> {
        (**self).encode(value)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        (**self).decode(bytes)
    }
}

impl<T, C> Codec<T> for Box<C>
where
    C: Codec<T> + ?Sized,
{
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>> {
        (**self).encode(value)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        (**self).decode(bytes)
    }
}
