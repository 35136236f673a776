//! Log client abstraction
//!
//! The cache needs five things from the log: create a topic, describe it,
//! append a keyed record and learn its position, ask where a partition ends,
//! and read every record of a set of partitions in order.

use crate::error::{LogError, LogResult};
use async_trait::async_trait;
use bytes::Bytes;
use kcache_common::{
    Offset, Partition, Record, RecordPosition, TopicConfig, TopicName,
};

/// Parameters of a consumer assignment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    /// Topic to read
    pub topic: TopicName,
    /// Partitions assigned to the consumer (no group rebalancing); each is
    /// read from its earliest retained offset
    pub partitions: Vec<Partition>,
    /// Consumer group, used for identification only
    pub group_id: String,
    /// Client id reported to the log
    pub client_id: String,
}

/// Producer and admin side of a replicated log
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Create a topic
    ///
    /// Fails with [`LogError::TopicAlreadyExists`] when a topic with that
    /// name exists, regardless of its settings.
    async fn create_topic(&self, topic: &TopicConfig) -> LogResult<()>;

    /// Current settings of an existing topic
    async fn describe_topic(&self, name: &TopicName) -> LogResult<TopicConfig>;

    /// Append a record and wait for the log to acknowledge it
    ///
    /// A `None` value appends a tombstone.
    async fn produce(
        &self,
        topic: &TopicName,
        partition: Partition,
        key: Bytes,
        value: Option<Bytes>,
    ) -> LogResult<RecordPosition>;

    /// Offset one past the last record of a partition
    async fn high_watermark(&self, topic: &TopicName, partition: Partition) -> LogResult<Offset>;

    /// Assign a consumer to the given partitions
    async fn subscribe(&self, subscription: Subscription) -> LogResult<Box<dyn LogConsumer>>;

    /// Create a topic unless it already exists
    ///
    /// Returns `true` if the topic was created by this call.
    async fn ensure_topic(&self, topic: &TopicConfig) -> LogResult<bool> {
        match self.create_topic(topic).await {
            Ok(()) => Ok(true),
            Err(LogError::TopicAlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Consumer side of a replicated log
///
/// Records of one partition are returned in strictly increasing offset
/// order. `next_record` waits for new records once the consumer has caught
/// up, so the sequence only ends when the consumer is closed.
#[async_trait]
pub trait LogConsumer: Send {
    /// Wait for the next record of any assigned partition
    async fn next_record(&mut self) -> LogResult<Record>;

    /// Release the assignment; further reads fail with [`LogError::Closed`]
    async fn close(&mut self);
}
