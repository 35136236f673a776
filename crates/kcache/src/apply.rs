//! Apply loop
//!
//! A single background task per cache instance that reads the topic from the
//! beginning and folds every record into the local store. It is the only
//! writer of the store and of the offset tracker.

use crate::handler::CacheUpdateHandler;
use crate::offsets::OffsetTracker;
use crate::store::LocalStore;
use kcache_codec::Codec;
use kcache_common::{Record, TopicName};
use kcache_log::{LogConsumer, LogError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Pause after a transient read failure before asking the consumer again
const CONSUME_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Pause after a read failure the log does not expect to clear on retry
const CONSUME_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Counters maintained by the apply loop
#[derive(Debug, Default)]
pub struct ApplyStats {
    /// Records folded into the store
    pub applied: AtomicU64,
    /// Records dropped because their key or value failed to decode
    pub skipped: AtomicU64,
    /// Failed reads from the consumer
    pub consume_errors: AtomicU64,
}

impl ApplyStats {
    #[must_use]
    pub fn snapshot(&self) -> ApplyStatsSnapshot {
        ApplyStatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            consume_errors: self.consume_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ApplyStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStatsSnapshot {
    pub applied: u64,
    pub skipped: u64,
    pub consume_errors: u64,
}

/// State owned by the background apply task
pub(crate) struct ApplyLoop<K, V> {
    pub(crate) topic: TopicName,
    pub(crate) consumer: Box<dyn LogConsumer>,
    pub(crate) store: Arc<LocalStore<K, V>>,
    pub(crate) offsets: Arc<OffsetTracker>,
    pub(crate) key_codec: Arc<dyn Codec<K>>,
    pub(crate) value_codec: Arc<dyn Codec<V>>,
    pub(crate) handler: Option<Arc<dyn CacheUpdateHandler<K, V>>>,
    pub(crate) stats: Arc<ApplyStats>,
}

impl<K, V> ApplyLoop<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Consume records until `shutdown` flips or the consumer is closed
    ///
    /// On exit the consumer is released and the offset tracker closed, which
    /// fails every pending wait. The tracker is closed even if the update
    /// handler panics.
    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let _close_offsets = CloseOnExit(Arc::clone(&self.offsets));
        info!("Apply loop started for topic {}", self.topic);

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                result = self.consumer.next_record() => Some(result),
            };

            match next {
                None => break,
                Some(Ok(record)) => self.apply(record),
                Some(Err(LogError::Closed)) => {
                    debug!("Consumer for topic {} closed", self.topic);
                    break;
                }
                Some(Err(e)) => {
                    self.stats.consume_errors.fetch_add(1, Ordering::Relaxed);
                    let backoff = if e.is_retryable() {
                        warn!("Failed to read from topic {}: {}", self.topic, e);
                        CONSUME_RETRY_BACKOFF
                    } else {
                        error!("Failed to read from topic {}: {}", self.topic, e);
                        CONSUME_ERROR_BACKOFF
                    };
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        () = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        self.consumer.close().await;
        info!(
            "Apply loop stopped for topic {} (applied {} records)",
            self.topic,
            self.stats.applied.load(Ordering::Relaxed)
        );
    }

    /// Fold one record into the store
    ///
    /// Records that fail to decode are skipped and their offset is not
    /// marked applied.
    fn apply(&self, record: Record) {
        let position = record.position();

        let key = match self.key_codec.decode(&record.key) {
            Ok(key) => key,
            Err(e) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                warn!("Skipping record {} with undecodable key: {}", position, e);
                return;
            }
        };

        match record.value {
            None => {
                self.store.remove(&key);
                if let Some(handler) = &self.handler {
                    handler.on_update(&key, None);
                }
            }
            Some(bytes) => {
                let value = match self.value_codec.decode(&bytes) {
                    Ok(value) => value,
                    Err(e) => {
                        self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                        warn!("Skipping record {} with undecodable value: {}", position, e);
                        return;
                    }
                };
                match &self.handler {
                    Some(handler) => {
                        self.store.insert(key.clone(), value.clone());
                        handler.on_update(&key, Some(&value));
                    }
                    None => {
                        self.store.insert(key, value);
                    }
                }
            }
        }

        // Count first so a writer woken by the offset sees the counter
        self.stats.applied.fetch_add(1, Ordering::Relaxed);
        self.offsets.record_applied(record.partition, record.offset);
    }
}

/// Closes the offset tracker when the apply task ends, unwinding included
struct CloseOnExit(Arc<OffsetTracker>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}
