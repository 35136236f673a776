//! Cache error types

use kcache_codec::CodecError;
use kcache_common::{CleanupPolicy, Offset, Partition};
use kcache_log::LogError;
use std::time::Duration;
use thiserror::Error;

/// Cache error
#[derive(Error, Debug)]
pub enum CacheError {
    /// A key or value could not be encoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The log rejected a request (admin, produce, or subscribe)
    #[error("Log error: {0}")]
    Log(#[from] LogError),

    /// The cache configuration is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] kcache_common::Error),

    /// The topic exists but does not retain the latest record per key
    #[error("Topic {topic} must use cleanup.policy=compact, found {policy}")]
    TopicNotCompacted { topic: String, policy: CleanupPolicy },

    /// The apply loop did not reach an offset before the deadline
    #[error("Timed out after {waited:?} waiting for offset {offset} of partition {partition}")]
    Timeout {
        partition: Partition,
        offset: Offset,
        waited: Duration,
    },

    /// Writes require a completed `init`
    #[error("Cache is not initialized")]
    NotInitialized,

    /// `init` may only run once
    #[error("Cache is already initialized")]
    AlreadyInitialized,

    /// The apply loop has been stopped
    #[error("Cache is closed")]
    Closed,
}

impl CacheError {
    /// Check if this error came from a deadline expiring
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
