//! KCache Codecs
//!
//! Converts typed cache keys and values to the bytes stored in the log and
//! back again.
//!
//! # Codecs
//!
//! - [`ScalarCodec`]: textual encoding of built-in scalar types (text,
//!   integers of every width, floats, `1`/`0` booleans, RFC 3339 timestamps)
//!   plus raw byte payloads
//! - [`JsonCodec`]: structured fallback for any serde type
//! - [`BincodeCodec`]: compact binary form for serde types that own their
//!   wire representation
//!
//! Decoding is strict: malformed text for a numeric, boolean or timestamp
//! type is an error, never a best-effort parse.

pub mod codec;
pub mod error;
pub mod scalar;
pub mod structured;

pub use codec::Codec;
pub use error::{CodecError, CodecResult};
pub use scalar::{Scalar, ScalarCodec};
pub use structured::{BincodeCodec, JsonCodec};
