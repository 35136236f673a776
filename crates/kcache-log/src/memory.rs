//! In-memory log
//!
//! A single-process stand-in for a replicated log broker. Every partition is
//! an append-only vector whose indexes are the record offsets, so ordering
//! and acknowledgment semantics match a real log while staying inspectable.
//! Faults can be queued to exercise the error paths of producers and
//! consumers.

use crate::client::{LogClient, LogConsumer, Subscription};
use crate::error::{LogError, LogResult};
use async_trait::async_trait;
use bytes::Bytes;
use kcache_common::{
    Offset, Partition, Record, RecordPosition, TopicConfig, TopicName,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

/// A record as stored in a partition (its offset is its index)
#[derive(Debug, Clone)]
struct StoredRecord {
    key: Bytes,
    value: Option<Bytes>,
}

#[derive(Debug)]
struct TopicLog {
    config: TopicConfig,
    partitions: Vec<Vec<StoredRecord>>,
}

impl TopicLog {
    fn partition(&self, partition: Partition) -> LogResult<&Vec<StoredRecord>> {
        usize::try_from(partition)
            .ok()
            .and_then(|p| self.partitions.get(p))
            .ok_or_else(|| LogError::UnknownPartition {
                topic: self.config.name.to_string(),
                partition,
            })
    }

    fn partition_mut(&mut self, partition: Partition) -> LogResult<&mut Vec<StoredRecord>> {
        let topic = self.config.name.to_string();
        usize::try_from(partition)
            .ok()
            .and_then(|p| self.partitions.get_mut(p))
            .ok_or(LogError::UnknownPartition { topic, partition })
    }
}

/// Queued failures, each consumed by the next matching request
#[derive(Debug, Default)]
struct Faults {
    create_topic: VecDeque<LogError>,
    produce: VecDeque<LogError>,
    consume: VecDeque<LogError>,
}

#[derive(Debug, Default)]
struct LogState {
    topics: HashMap<TopicName, TopicLog>,
    faults: Faults,
    /// Consumers hold back records while set
    delivery_paused: bool,
    /// Number of open consumers
    consumers: usize,
}

impl LogState {
    fn topic(&self, name: &TopicName) -> LogResult<&TopicLog> {
        self.topics
            .get(name)
            .ok_or_else(|| LogError::UnknownTopic(name.to_string()))
    }

    fn topic_mut(&mut self, name: &TopicName) -> LogResult<&mut TopicLog> {
        self.topics
            .get_mut(name)
            .ok_or_else(|| LogError::UnknownTopic(name.to_string()))
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<LogState>,
    /// Signalled on every append and when delivery resumes
    appended: Notify,
}

/// In-memory log shared by any number of producers and consumers
///
/// Cloning is cheap and yields a handle to the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    shared: Arc<Shared>,
}

impl MemoryLog {
    /// Create an empty log with no topics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record without going through fault injection
    ///
    /// Lets tests place arbitrary bytes, including ones no codec produced.
    pub fn append(
        &self,
        topic: &TopicName,
        partition: Partition,
        key: impl Into<Bytes>,
        value: Option<Bytes>,
    ) -> LogResult<RecordPosition> {
        let position = {
            let mut state = self.shared.state.lock();
            let records = state.topic_mut(topic)?.partition_mut(partition)?;
            let offset = Offset::try_from(records.len())
                .map_err(|_| LogError::transport("partition offset overflow"))?;
            records.push(StoredRecord {
                key: key.into(),
                value,
            });
            RecordPosition { partition, offset }
        };
        self.shared.appended.notify_waiters();
        Ok(position)
    }

    /// All records currently stored in a partition
    pub fn records(&self, topic: &TopicName, partition: Partition) -> LogResult<Vec<Record>> {
        let state = self.shared.state.lock();
        let records = state.topic(topic)?.partition(partition)?;
        Ok(records
            .iter()
            .enumerate()
            .map(|(offset, stored)| Record {
                partition,
                offset: offset as Offset,
                key: stored.key.clone(),
                value: stored.value.clone(),
            })
            .collect())
    }

    /// Fail the next `create_topic` call with `error`
    pub fn fail_next_create_topic(&self, error: LogError) {
        self.shared.state.lock().faults.create_topic.push_back(error);
    }

    /// Fail the next `produce` call with `error`; nothing is appended
    pub fn fail_next_produce(&self, error: LogError) {
        self.shared.state.lock().faults.produce.push_back(error);
    }

    /// Fail the next `next_record` call of any consumer with `error`
    pub fn fail_next_consume(&self, error: LogError) {
        self.shared.state.lock().faults.consume.push_back(error);
        self.shared.appended.notify_waiters();
    }

    /// Stop handing records to consumers (appends still succeed)
    pub fn pause_delivery(&self) {
        self.shared.state.lock().delivery_paused = true;
    }

    /// Resume handing records to consumers
    pub fn resume_delivery(&self) {
        self.shared.state.lock().delivery_paused = false;
        self.shared.appended.notify_waiters();
    }

    /// Number of consumers that have not been closed
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.shared.state.lock().consumers
    }
}

#[async_trait]
impl LogClient for MemoryLog {
    async fn create_topic(&self, topic: &TopicConfig) -> LogResult<()> {
        let mut state = self.shared.state.lock();
        if let Some(error) = state.faults.create_topic.pop_front() {
            return Err(error);
        }
        if state.topics.contains_key(&topic.name) {
            return Err(LogError::TopicAlreadyExists(topic.name.to_string()));
        }
        let partitions = usize::try_from(topic.partitions)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| {
                LogError::InvalidTopic(format!(
                    "partition count must be positive, got {}",
                    topic.partitions
                ))
            })?;
        if topic.replication_factor < 1 {
            return Err(LogError::InvalidTopic(format!(
                "replication factor must be positive, got {}",
                topic.replication_factor
            )));
        }

        info!(
            "Created topic {} with {} partitions, settings {:?}",
            topic.name,
            topic.partitions,
            topic.settings()
        );
        state.topics.insert(
            topic.name.clone(),
            TopicLog {
                config: topic.clone(),
                partitions: vec![Vec::new(); partitions],
            },
        );
        Ok(())
    }

    async fn describe_topic(&self, name: &TopicName) -> LogResult<TopicConfig> {
        let state = self.shared.state.lock();
        Ok(state.topic(name)?.config.clone())
    }

    async fn produce(
        &self,
        topic: &TopicName,
        partition: Partition,
        key: Bytes,
        value: Option<Bytes>,
    ) -> LogResult<RecordPosition> {
        let injected = self.shared.state.lock().faults.produce.pop_front();
        if let Some(error) = injected {
            return Err(error);
        }
        let position = self.append(topic, partition, key, value)?;
        debug!("Appended record to {} at {}", topic, position);
        Ok(position)
    }

    async fn high_watermark(&self, topic: &TopicName, partition: Partition) -> LogResult<Offset> {
        let state = self.shared.state.lock();
        let records = state.topic(topic)?.partition(partition)?;
        Ok(records.len() as Offset)
    }

    async fn subscribe(&self, subscription: Subscription) -> LogResult<Box<dyn LogConsumer>> {
        let mut state = self.shared.state.lock();
        let topic = state.topic(&subscription.topic)?;

        let mut positions = Vec::with_capacity(subscription.partitions.len());
        for &partition in &subscription.partitions {
            topic.partition(partition)?;
            positions.push((partition, 0));
        }

        state.consumers += 1;
        debug!(
            "Consumer {} (group {}) assigned to {} partitions {:?}",
            subscription.client_id,
            subscription.group_id,
            subscription.topic,
            subscription.partitions
        );

        Ok(Box::new(MemoryConsumer {
            shared: Arc::clone(&self.shared),
            topic: subscription.topic,
            positions,
            cursor: 0,
            closed: false,
        }))
    }
}

/// Consumer over a [`MemoryLog`]
///
/// Partitions are served round-robin so a busy partition cannot starve the
/// others; within a partition records come out in offset order.
#[derive(Debug)]
pub struct MemoryConsumer {
    shared: Arc<Shared>,
    topic: TopicName,
    /// Assigned partitions and the index of the next record to return
    positions: Vec<(Partition, usize)>,
    /// Index into `positions` where the next scan starts
    cursor: usize,
    closed: bool,
}

impl MemoryConsumer {
    /// Take the next available record, if any, without waiting
    fn poll_record(&mut self) -> Option<LogResult<Record>> {
        let mut state = self.shared.state.lock();
        if let Some(error) = state.faults.consume.pop_front() {
            return Some(Err(error));
        }
        if state.delivery_paused {
            return None;
        }
        let topic = match state.topic(&self.topic) {
            Ok(topic) => topic,
            Err(e) => return Some(Err(e)),
        };

        let assigned = self.positions.len();
        for step in 0..assigned {
            let slot = (self.cursor + step) % assigned;
            let (partition, next) = self.positions[slot];
            let records = match topic.partition(partition) {
                Ok(records) => records,
                Err(e) => return Some(Err(e)),
            };
            if let Some(stored) = records.get(next) {
                let record = Record {
                    partition,
                    offset: next as Offset,
                    key: stored.key.clone(),
                    value: stored.value.clone(),
                };
                self.positions[slot].1 = next + 1;
                self.cursor = (slot + 1) % assigned;
                return Some(Ok(record));
            }
        }
        None
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            let mut state = self.shared.state.lock();
            state.consumers = state.consumers.saturating_sub(1);
        }
    }
}

#[async_trait]
impl LogConsumer for MemoryConsumer {
    async fn next_record(&mut self) -> LogResult<Record> {
        loop {
            if self.closed {
                return Err(LogError::Closed);
            }

            // Register interest before looking so an append between the
            // check and the await still wakes us.
            let shared = Arc::clone(&self.shared);
            let notified = shared.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.poll_record() {
                return result;
            }
            notified.await;
        }
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        self.release();
    }
}
