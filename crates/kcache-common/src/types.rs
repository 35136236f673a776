//! Core type definitions for KCache
//!
//! This module defines the fundamental types shared between the log client
//! and the cache engine: topic names and topic configuration, log positions,
//! and the records that flow through the log.

use bytes::Bytes;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Partition number within a topic
pub type Partition = i32;

/// Position of a record within a partition
pub type Offset = i64;

/// Offset sentinel meaning "nothing to wait for" (empty partition)
pub const NO_OFFSET: Offset = -1;

/// Maximum length of a topic name accepted by the log
pub const MAX_TOPIC_NAME_LEN: usize = 249;

/// Name of a log topic
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(try_from = "String", into = "String")]
pub struct TopicName(String);

impl TopicName {
    /// Create a new topic name (validates log naming rules)
    pub fn new(name: impl Into<String>) -> Result<Self, TopicNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the topic name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<(), TopicNameError> {
        if name.is_empty() {
            return Err(TopicNameError::Empty);
        }
        if name.len() > MAX_TOPIC_NAME_LEN {
            return Err(TopicNameError::TooLong);
        }
        if name == "." || name == ".." {
            return Err(TopicNameError::Reserved);
        }

        // Only ASCII alphanumerics, '.', '_' and '-'
        if let Some(c) = name
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '_' | '-'))
        {
            return Err(TopicNameError::InvalidChar(c));
        }

        Ok(())
    }
}

impl fmt::Debug for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicName({:?})", self.0)
    }
}

impl TryFrom<String> for TopicName {
    type Error = TopicNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TopicName> for String {
    fn from(name: TopicName) -> Self {
        name.0
    }
}

impl AsRef<str> for TopicName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when creating a topic name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicNameError {
    #[error("topic name must not be empty")]
    Empty,
    #[error("topic name must be at most 249 characters")]
    TooLong,
    #[error("topic name cannot be '.' or '..'")]
    Reserved,
    #[error("topic name contains invalid character: {0:?}")]
    InvalidChar(char),
}

/// Log retention policy for a topic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    /// Segments are deleted by age/size; old values per key are lost
    Delete,
    /// Only the latest record per key is retained; a null value deletes
    #[default]
    Compact,
    /// Compaction plus age/size based deletion
    #[serde(rename = "compact,delete")]
    CompactDelete,
}

impl CleanupPolicy {
    /// Value of the `cleanup.policy` topic setting
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Compact => "compact",
            Self::CompactDelete => "compact,delete",
        }
    }

    /// Check whether the log keeps the latest record for every key
    #[must_use]
    pub const fn is_compacted(&self) -> bool {
        matches!(self, Self::Compact)
    }
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of the topic backing a cache
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Topic name
    pub name: TopicName,
    /// Number of partitions
    pub partitions: i32,
    /// Replication factor
    pub replication_factor: i16,
    /// Retention policy
    #[serde(default)]
    pub cleanup_policy: CleanupPolicy,
}

impl TopicConfig {
    /// Create a compacted topic description
    #[must_use]
    pub const fn compacted(name: TopicName, partitions: i32, replication_factor: i16) -> Self {
        Self {
            name,
            partitions,
            replication_factor,
            cleanup_policy: CleanupPolicy::Compact,
        }
    }

    /// Topic-level settings as they are sent to the log's admin API
    #[must_use]
    pub fn settings(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            "cleanup.policy".to_string(),
            self.cleanup_policy.as_str().to_string(),
        )])
    }

    /// All partition numbers of the topic, in order
    pub fn partition_ids(&self) -> impl Iterator<Item = Partition> + use<> {
        0..self.partitions
    }
}

/// Partition and offset assigned to a record by the log
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordPosition {
    pub partition: Partition,
    pub offset: Offset,
}

impl fmt::Display for RecordPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]@{}", self.partition, self.offset)
    }
}

/// A keyed record read from the log
///
/// A record without a value is a tombstone: it marks its key as deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Partition the record was read from
    pub partition: Partition,
    /// Offset of the record within its partition
    pub offset: Offset,
    /// Encoded key
    pub key: Bytes,
    /// Encoded value, `None` for a tombstone
    pub value: Option<Bytes>,
}

impl Record {
    /// Check if this record is a deletion marker
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Position of this record in the log
    #[must_use]
    pub const fn position(&self) -> RecordPosition {
        RecordPosition {
            partition: self.partition,
            offset: self.offset,
        }
    }
}
