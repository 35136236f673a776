//! Built-in scalar codecs
//!
//! Scalars are stored as plain text so the log stays readable with generic
//! tooling: integers and floats in decimal, booleans as `1`/`0`, timestamps
//! in RFC 3339 with up to nanosecond precision. Byte payloads pass through
//! unchanged.

use crate::codec::Codec;
use crate::error::{CodecError, CodecResult};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::marker::PhantomData;

/// A type with a built-in byte representation
pub trait Scalar: Sized + Send + Sync + 'static {
    /// Type name used in error messages
    const KIND: &'static str;

    /// Encode into the log representation
    fn to_bytes(&self) -> Vec<u8>;

    /// Strictly decode the log representation
    fn from_bytes(bytes: &[u8]) -> CodecResult<Self>;
}

/// Codec for any [`Scalar`] type
pub struct ScalarCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ScalarCodec<T> {
    /// Create a codec for `T`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ScalarCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ScalarCodec<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ScalarCodec<T> {}

impl<T: Scalar> fmt::Debug for ScalarCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScalarCodec<{}>", T::KIND)
    }
}

impl<T: Scalar> Codec<T> for ScalarCodec<T> {
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>> {
        Ok(value.to_bytes())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        T::from_bytes(bytes)
    }
}

fn as_text(bytes: &[u8]) -> CodecResult<&str> {
    Ok(std::str::from_utf8(bytes)?)
}

impl Scalar for String {
    const KIND: &'static str = "string";

    fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        as_text(bytes).map(str::to_owned)
    }
}

impl Scalar for Vec<u8> {
    const KIND: &'static str = "bytes";

    fn to_bytes(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        Ok(bytes.to_vec())
    }
}

impl Scalar for Bytes {
    const KIND: &'static str = "bytes";

    fn to_bytes(&self) -> Vec<u8> {
        self.to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        Ok(Self::copy_from_slice(bytes))
    }
}

macro_rules! impl_decimal_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const KIND: &'static str = stringify!($ty);

                fn to_bytes(&self) -> Vec<u8> {
                    self.to_string().into_bytes()
                }

                fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
                    let text = as_text(bytes)?;
                    text.parse::<$ty>()
                        .map_err(|e| CodecError::invalid_scalar(Self::KIND, text, e))
                }
            }
        )*
    };
}

// Rust's float formatting is the shortest text that parses back to the same
// value, so floats share the decimal path with integers.
impl_decimal_scalar!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64
);

impl Scalar for bool {
    const KIND: &'static str = "bool";

    fn to_bytes(&self) -> Vec<u8> {
        if *self { b"1".to_vec() } else { b"0".to_vec() }
    }

    fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        match bytes {
            b"1" => Ok(true),
            b"0" => Ok(false),
            other => Err(CodecError::invalid_scalar(
                Self::KIND,
                &String::from_utf8_lossy(other),
                "expected \"1\" or \"0\"",
            )),
        }
    }
}

impl Scalar for DateTime<Utc> {
    const KIND: &'static str = "timestamp";

    fn to_bytes(&self) -> Vec<u8> {
        self.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            .into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let text = as_text(bytes)?;
        DateTime::parse_from_rfc3339(text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| CodecError::invalid_scalar(Self::KIND, text, e))
    }
}
