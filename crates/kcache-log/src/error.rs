//! Log client error types

use kcache_common::Partition;
use thiserror::Error;

/// Log client error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    /// Topic creation found an existing topic
    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    /// Topic does not exist
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Partition does not exist in the topic
    #[error("Unknown partition {partition} of topic {topic}")]
    UnknownPartition { topic: String, partition: Partition },

    /// Topic settings rejected by the log
    #[error("Invalid topic configuration: {0}")]
    InvalidTopic(String),

    /// The partition currently has no leader to accept writes
    #[error("No leader for partition {partition} of topic {topic}")]
    NotLeader { topic: String, partition: Partition },

    /// Broker connection or protocol failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request did not complete in time
    #[error("Request timed out")]
    Timeout,

    /// The consumer or client has been closed
    #[error("Log client closed")]
    Closed,
}

impl LogError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Check if retrying the same request may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::NotLeader { .. } | Self::Timeout
        )
    }
}

/// Result type for log operations
pub type LogResult<T> = Result<T, LogError>;
