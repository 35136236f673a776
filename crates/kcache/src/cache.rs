//! Cache engine
//!
//! [`KCache`] owns the local store, the offset tracker and the apply task, and
//! implements the startup catch-up and the write-then-wait protocol on top of
//! them.

use crate::apply::{ApplyLoop, ApplyStats, ApplyStatsSnapshot};
use crate::error::{CacheError, CacheResult};
use crate::handler::CacheUpdateHandler;
use crate::offsets::OffsetTracker;
use crate::store::{Comparator, LocalStore};
use bytes::Bytes;
use kcache_codec::Codec;
use kcache_common::{CacheConfig, NO_OFFSET, Offset, Partition, TopicConfig};
use kcache_log::{LogClient, Subscription};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Partition every write is produced to
///
/// The whole keyspace lives in one partition so that a single offset order
/// decides which write wins. Extra partitions are still read during catch-up.
pub const WRITE_PARTITION: Partition = 0;

/// Handle to the running apply task
struct ApplyTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ApplyTask {
    async fn stop(self) {
        // The loop may already have exited on its own
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!("Apply task ended abnormally: {}", e);
        }
    }
}

enum Lifecycle {
    Created,
    /// Apply task spawned, catch-up not yet confirmed
    CatchingUp {
        task: ApplyTask,
        targets: Vec<(Partition, Offset)>,
    },
    Running(ApplyTask),
    Closed,
}

impl Lifecycle {
    fn task(&self) -> Option<&ApplyTask> {
        match self {
            Self::CatchingUp { task, .. } | Self::Running(task) => Some(task),
            Self::Created | Self::Closed => None,
        }
    }
}

/// Key-value cache materialized from a compacted log topic
///
/// Reads are served from local memory and never touch the log. Writes are
/// produced to the log and return once this instance has applied them.
pub struct KCache<K, V> {
    config: CacheConfig,
    topic: TopicConfig,
    log: Arc<dyn LogClient>,
    key_codec: Arc<dyn Codec<K>>,
    value_codec: Arc<dyn Codec<V>>,
    store: Arc<LocalStore<K, V>>,
    offsets: Arc<OffsetTracker>,
    stats: Arc<ApplyStats>,
    handler: Option<Arc<dyn CacheUpdateHandler<K, V>>>,
    initialized: AtomicBool,
    closed: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

impl<K, V> KCache<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache; nothing touches the log until [`KCache::init`]
    pub fn new(
        config: CacheConfig,
        log: Arc<dyn LogClient>,
        key_codec: impl Codec<K> + 'static,
        value_codec: impl Codec<V> + 'static,
        comparator: impl Comparator<K> + 'static,
    ) -> CacheResult<Self> {
        config.validate()?;
        let topic = config.topic_config()?;

        Ok(Self {
            config,
            topic,
            log,
            key_codec: Arc::new(key_codec),
            value_codec: Arc::new(value_codec),
            store: Arc::new(LocalStore::new(Arc::new(comparator))),
            offsets: Arc::new(OffsetTracker::new()),
            stats: Arc::new(ApplyStats::default()),
            handler: None,
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::Created),
        })
    }

    /// Register a callback for every applied record, catch-up included
    #[must_use]
    pub fn with_update_handler(mut self, handler: impl CacheUpdateHandler<K, V> + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Ensure the topic, start the apply loop and catch up
    ///
    /// Returns once every record present in the log when the high watermarks
    /// were read has been applied. A failed catch-up stops the apply loop and
    /// leaves the cache closed. If the returned future is dropped during
    /// catch-up, the apply loop keeps running and the next call resumes
    /// waiting on the same targets.
    pub async fn init(&self) -> CacheResult<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let targets = match &*lifecycle {
            Lifecycle::Created => {
                let (task, targets) = self.start_apply_task().await?;
                *lifecycle = Lifecycle::CatchingUp {
                    task,
                    targets: targets.clone(),
                };
                targets
            }
            Lifecycle::CatchingUp { targets, .. } => {
                info!(
                    "Resuming catch-up of topic {} after an interrupted init",
                    self.topic.name
                );
                targets.clone()
            }
            Lifecycle::Running(_) => return Err(CacheError::AlreadyInitialized),
            Lifecycle::Closed => return Err(CacheError::Closed),
        };

        let name = &self.topic.name;
        for (partition, target) in targets {
            debug!("Catching up partition {} to offset {}", partition, target);
            let caught_up = self
                .offsets
                .wait_for_offset(partition, target, Some(self.config.init_timeout()))
                .await;
            if let Err(e) = caught_up {
                error!(
                    "Catch-up of topic {} partition {} failed: {}",
                    name, partition, e
                );
                self.closed.store(true, Ordering::SeqCst);
                if let Lifecycle::CatchingUp { task, .. } =
                    std::mem::replace(&mut *lifecycle, Lifecycle::Closed)
                {
                    task.stop().await;
                }
                return Err(e);
            }
        }

        if let Lifecycle::CatchingUp { task, .. } =
            std::mem::replace(&mut *lifecycle, Lifecycle::Closed)
        {
            *lifecycle = Lifecycle::Running(task);
        }
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "Cache on topic {} initialized with {} entries",
            name,
            self.store.len()
        );
        Ok(())
    }

    /// Ensure the topic, subscribe, snapshot the high watermarks and spawn
    /// the apply loop
    ///
    /// Errors here leave nothing running, so `init` can be retried.
    async fn start_apply_task(&self) -> CacheResult<(ApplyTask, Vec<(Partition, Offset)>)> {
        let name = &self.topic.name;
        info!(
            "Initializing cache on topic {} ({} partitions, rf {})",
            name, self.topic.partitions, self.topic.replication_factor
        );

        if self.log.ensure_topic(&self.topic).await? {
            info!("Created topic {}", name);
        } else {
            debug!("Topic {} already exists", name);
        }

        let described = self.log.describe_topic(name).await?;
        if !described.cleanup_policy.is_compacted() {
            if self.config.require_compact {
                return Err(CacheError::TopicNotCompacted {
                    topic: name.to_string(),
                    policy: described.cleanup_policy,
                });
            }
            warn!(
                "Topic {} uses cleanup.policy={}; deleted keys may reappear",
                name, described.cleanup_policy
            );
        }
        if described.partitions != self.topic.partitions {
            warn!(
                "Topic {} has {} partitions, configured {}",
                name, described.partitions, self.topic.partitions
            );
        }

        let partitions: Vec<Partition> = described.partition_ids().collect();
        let consumer = self
            .log
            .subscribe(Subscription {
                topic: name.clone(),
                partitions: partitions.clone(),
                group_id: self.config.group_id.clone(),
                client_id: self.config.client_id(),
            })
            .await?;

        let mut targets: Vec<(Partition, Offset)> = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let high = self.log.high_watermark(name, partition).await?;
            let target = if high > 0 { high - 1 } else { NO_OFFSET };
            targets.push((partition, target));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let apply = ApplyLoop {
            topic: name.clone(),
            consumer,
            store: Arc::clone(&self.store),
            offsets: Arc::clone(&self.offsets),
            key_codec: Arc::clone(&self.key_codec),
            value_codec: Arc::clone(&self.value_codec),
            handler: self.handler.clone(),
            stats: Arc::clone(&self.stats),
        };
        let handle = tokio::spawn(apply.run(shutdown_rx));
        Ok((ApplyTask { shutdown, handle }, targets))
    }

    /// Look up a key in the local store
    pub fn get(&self, key: &K) -> Option<V> {
        self.store.get(key)
    }

    /// Write `value` under `key`, returning the locally known previous value
    ///
    /// Waits at most the configured `timeout` for the write to be applied.
    pub async fn put(&self, key: &K, value: &V) -> CacheResult<Option<V>> {
        self.mutate(key, Some(value), Some(self.config.timeout())).await
    }

    /// Delete `key`, returning the locally known previous value
    pub async fn delete(&self, key: &K) -> CacheResult<Option<V>> {
        self.mutate(key, None, Some(self.config.timeout())).await
    }

    /// [`KCache::put`] with an explicit deadline; `None` waits indefinitely
    pub async fn put_with_timeout(
        &self,
        key: &K,
        value: &V,
        deadline: Option<Duration>,
    ) -> CacheResult<Option<V>> {
        self.mutate(key, Some(value), deadline).await
    }

    /// [`KCache::delete`] with an explicit deadline; `None` waits indefinitely
    pub async fn delete_with_timeout(
        &self,
        key: &K,
        deadline: Option<Duration>,
    ) -> CacheResult<Option<V>> {
        self.mutate(key, None, deadline).await
    }

    /// Produce a record and wait until the apply loop has applied it
    ///
    /// The previous value is read before producing and may be stale if other
    /// instances write the same key concurrently. A timed out wait does not
    /// undo the write: the record is in the log and will still be applied.
    async fn mutate(
        &self,
        key: &K,
        value: Option<&V>,
        deadline: Option<Duration>,
    ) -> CacheResult<Option<V>> {
        self.ensure_running()?;

        let previous = self.store.get(key);
        let key_bytes = Bytes::from(self.key_codec.encode(key)?);
        let value_bytes = value
            .map(|v| self.value_codec.encode(v))
            .transpose()?
            .map(Bytes::from);

        let position = self
            .log
            .produce(&self.topic.name, WRITE_PARTITION, key_bytes, value_bytes)
            .await?;
        debug!(
            "{} acknowledged at {} on topic {}",
            if value.is_some() { "Put" } else { "Delete" },
            position,
            self.topic.name
        );

        self.offsets
            .wait_for_offset(position.partition, position.offset, deadline)
            .await?;
        Ok(previous)
    }

    fn ensure_running(&self) -> CacheResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Closed);
        }
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(CacheError::NotInitialized);
        }
        Ok(())
    }

    /// Entries accepted by `filter`, in comparator order
    pub fn scan<F>(&self, filter: F) -> Vec<(K, V)>
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.store.select(filter)
    }

    /// All keys in comparator order
    pub fn keys(&self) -> Vec<K> {
        self.store.keys()
    }

    pub fn size(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Stop the apply loop and release the consumer
    ///
    /// Entries stay readable; writes fail with [`CacheError::Closed`].
    /// Closing twice is a no-op. Waits for a running `init` to finish first.
    pub async fn close(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
            Lifecycle::CatchingUp { task, .. } | Lifecycle::Running(task) => {
                task.stop().await;
                info!("Cache on topic {} closed", self.topic.name);
            }
            Lifecycle::Created => self.offsets.close(),
            Lifecycle::Closed => {}
        }
    }
}

impl<K, V> KCache<K, V> {
    /// Check whether `init` has completed successfully
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Highest offset of `partition` applied to the local store
    pub fn applied_offset(&self, partition: Partition) -> Option<Offset> {
        self.offsets.applied(partition)
    }

    /// Counters of the apply loop
    pub fn stats(&self) -> ApplyStatsSnapshot {
        self.stats.snapshot()
    }

    pub const fn topic(&self) -> &TopicConfig {
        &self.topic
    }

    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl<K, V> fmt::Debug for KCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KCache")
            .field("topic", &self.topic.name)
            .field("initialized", &self.is_initialized())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<K, V> Drop for KCache<K, V> {
    fn drop(&mut self) {
        if let Some(task) = self.lifecycle.get_mut().task() {
            let _ = task.shutdown.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NaturalOrder;
    use kcache_codec::{JsonCodec, ScalarCodec};
    use kcache_common::{CleanupPolicy, TopicName};
    use kcache_log::{LogError, MemoryLog};
    use parking_lot::Mutex as SyncMutex;
    use serde::{Deserialize, Serialize};

    fn s(v: &str) -> String {
        v.to_string()
    }

    fn config() -> CacheConfig {
        let mut config = CacheConfig::for_topic("_schemas");
        config.init_timeout_ms = 5_000;
        config.timeout_ms = 5_000;
        config
    }

    fn topic_name() -> TopicName {
        TopicName::new("_schemas").unwrap()
    }

    fn string_cache(log: &MemoryLog, config: CacheConfig) -> KCache<String, String> {
        KCache::new(
            config,
            Arc::new(log.clone()),
            ScalarCodec::new(),
            ScalarCodec::new(),
            NaturalOrder,
        )
        .unwrap()
    }

    async fn started(log: &MemoryLog) -> KCache<String, String> {
        let cache = string_cache(log, config());
        cache.init().await.unwrap();
        cache
    }

    /// Create the topic and append raw records before any cache starts
    async fn seed(log: &MemoryLog, partitions: i32, records: &[(Partition, &str, Option<&str>)]) {
        log.create_topic(&TopicConfig::compacted(topic_name(), partitions, 1))
            .await
            .unwrap();
        for &(partition, key, value) in records {
            log.append(
                &topic_name(),
                partition,
                Bytes::copy_from_slice(key.as_bytes()),
                value.map(|v| Bytes::copy_from_slice(v.as_bytes())),
            )
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_put_get_delete_scenario() {
        let log = MemoryLog::new();
        let cache = started(&log).await;
        assert!(cache.is_initialized());

        assert_eq!(cache.put(&s("a"), &s("1")).await.unwrap(), None);
        assert_eq!(cache.get(&s("a")), Some(s("1")));
        assert_eq!(cache.put(&s("a"), &s("2")).await.unwrap(), Some(s("1")));
        assert_eq!(cache.delete(&s("a")).await.unwrap(), Some(s("2")));
        assert_eq!(cache.get(&s("a")), None);
        assert_eq!(cache.size(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_read_your_write_many_keys() {
        let log = MemoryLog::new();
        let cache = started(&log).await;
        for i in 0..50 {
            let key = format!("key-{i:02}");
            let value = format!("value-{i}");
            cache.put(&key, &value).await.unwrap();
            assert_eq!(cache.get(&key), Some(value));
        }
        assert_eq!(cache.size(), 50);
        assert_eq!(cache.applied_offset(WRITE_PARTITION), Some(49));
    }

    #[tokio::test]
    async fn test_delete_absent_key() {
        let log = MemoryLog::new();
        let cache = started(&log).await;
        assert_eq!(cache.delete(&s("missing")).await.unwrap(), None);
        assert!(cache.is_empty());
        assert!(log.records(&topic_name(), 0).unwrap()[0].is_tombstone());
    }

    #[tokio::test]
    async fn test_catch_up_reflects_existing_records() {
        let log = MemoryLog::new();
        seed(
            &log,
            1,
            &[
                (0, "a", Some("1")),
                (0, "b", Some("2")),
                (0, "a", Some("3")),
                (0, "c", Some("4")),
                (0, "b", None),
                (0, "d", None),
            ],
        )
        .await;

        let cache = started(&log).await;
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get(&s("a")), Some(s("3")));
        assert_eq!(cache.get(&s("b")), None);
        assert_eq!(cache.get(&s("c")), Some(s("4")));
        assert_eq!(cache.applied_offset(0), Some(5));
    }

    #[tokio::test]
    async fn test_catch_up_across_partitions() {
        let log = MemoryLog::new();
        seed(
            &log,
            3,
            &[
                (0, "a", Some("1")),
                (2, "b", Some("2")),
                (2, "c", Some("3")),
            ],
        )
        .await;

        let mut config = config();
        config.partitions = 3;
        let cache = string_cache(&log, config);
        cache.init().await.unwrap();

        assert_eq!(cache.keys(), vec![s("a"), s("b"), s("c")]);
        assert_eq!(cache.applied_offset(1), None);
        assert_eq!(cache.applied_offset(2), Some(1));
    }

    #[tokio::test]
    async fn test_init_on_empty_partitions() {
        let log = MemoryLog::new();
        let mut config = config();
        config.partitions = 4;
        let cache = string_cache(&log, config);
        cache.init().await.unwrap();

        assert!(cache.is_empty());
        assert_eq!(log.describe_topic(&topic_name()).await.unwrap().partitions, 4);
    }

    #[tokio::test]
    async fn test_later_offset_wins() {
        let log = MemoryLog::new();
        let cache = started(&log).await;
        cache.put(&s("k"), &s("first")).await.unwrap();
        cache.put(&s("k"), &s("second")).await.unwrap();
        assert_eq!(cache.get(&s("k")), Some(s("second")));

        // A raw append behind the cache's back still applies in offset order
        log.append(&topic_name(), 0, "k", Some(Bytes::from_static(b"third")))
            .unwrap();
        cache.put(&s("other"), &s("x")).await.unwrap();
        assert_eq!(cache.get(&s("k")), Some(s("third")));
    }

    #[tokio::test]
    async fn test_malformed_record_skipped_during_catch_up() {
        let log = MemoryLog::new();
        seed(&log, 1, &[(0, "good", Some("1"))]).await;
        log.append(&topic_name(), 0, vec![0xffu8, 0xfe], Some(Bytes::from_static(b"2")))
            .unwrap();
        log.append(&topic_name(), 0, "tail", Some(Bytes::from_static(b"3")))
            .unwrap();

        let cache = started(&log).await;
        assert_eq!(cache.keys(), vec![s("good"), s("tail")]);
        assert_eq!(cache.stats().skipped, 1);
        assert_eq!(cache.stats().applied, 2);
    }

    #[tokio::test]
    async fn test_malformed_tail_times_out_init() {
        let log = MemoryLog::new();
        seed(&log, 1, &[(0, "good", Some("1"))]).await;
        log.append(&topic_name(), 0, "bad", Some(Bytes::from_static(&[0xc0])))
            .unwrap();

        let mut config = config();
        config.init_timeout_ms = 100;
        let cache = string_cache(&log, config);
        let result = cache.init().await;
        assert!(matches!(
            result,
            Err(CacheError::Timeout {
                partition: 0,
                offset: 1,
                ..
            })
        ));

        assert!(!cache.is_initialized());
        assert_eq!(log.consumer_count(), 0);
        assert!(matches!(
            cache.put(&s("k"), &s("v")).await,
            Err(CacheError::Closed)
        ));
        // What was applied before the failure is still readable
        assert_eq!(cache.get(&s("good")), Some(s("1")));
    }

    #[tokio::test]
    async fn test_produce_failure_leaves_cache_unchanged() {
        let log = MemoryLog::new();
        let cache = started(&log).await;
        cache.put(&s("k"), &s("v1")).await.unwrap();

        log.fail_next_produce(LogError::NotLeader {
            topic: s("_schemas"),
            partition: 0,
        });
        let result = cache.put(&s("k"), &s("v2")).await;
        assert!(matches!(
            result,
            Err(CacheError::Log(LogError::NotLeader { .. }))
        ));
        assert_eq!(cache.get(&s("k")), Some(s("v1")));

        assert_eq!(cache.put(&s("k"), &s("v3")).await.unwrap(), Some(s("v1")));
    }

    #[tokio::test]
    async fn test_stalled_apply_loop_hits_deadline() {
        let log = MemoryLog::new();
        let cache = started(&log).await;

        log.pause_delivery();
        let result = cache
            .put_with_timeout(&s("k"), &s("v"), Some(Duration::from_millis(50)))
            .await;
        assert!(matches!(
            result,
            Err(CacheError::Timeout {
                partition: 0,
                offset: 0,
                ..
            })
        ));
        assert!(result.unwrap_err().is_timeout());
        assert_eq!(cache.get(&s("k")), None);

        // The write is in the log and lands once delivery resumes
        log.resume_delivery();
        cache
            .delete_with_timeout(&s("other"), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(cache.get(&s("k")), Some(s("v")));
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let log = MemoryLog::new();
        let cache = string_cache(&log, config());

        assert!(matches!(
            cache.put(&s("k"), &s("v")).await,
            Err(CacheError::NotInitialized)
        ));
        assert!(matches!(
            cache.delete(&s("k")).await,
            Err(CacheError::NotInitialized)
        ));

        cache.init().await.unwrap();
        assert!(matches!(
            cache.init().await,
            Err(CacheError::AlreadyInitialized)
        ));

        cache.put(&s("k"), &s("v")).await.unwrap();
        cache.close().await;
        cache.close().await;

        assert!(matches!(
            cache.put(&s("k"), &s("w")).await,
            Err(CacheError::Closed)
        ));
        assert!(matches!(cache.init().await, Err(CacheError::Closed)));
        assert_eq!(cache.get(&s("k")), Some(s("v")));
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_init_can_be_retried() {
        let log = MemoryLog::new();
        seed(&log, 1, &[(0, "a", Some("1")), (0, "b", Some("2"))]).await;
        let cache = string_cache(&log, config());

        log.pause_delivery();
        let interrupted = tokio::time::timeout(Duration::from_millis(100), cache.init()).await;
        assert!(interrupted.is_err());
        assert!(!cache.is_initialized());
        assert_eq!(log.consumer_count(), 1);

        log.resume_delivery();
        cache.init().await.unwrap();
        assert!(cache.is_initialized());
        assert_eq!(cache.keys(), vec![s("a"), s("b")]);
        assert_eq!(log.consumer_count(), 1);

        cache.put(&s("c"), &s("3")).await.unwrap();
        assert_eq!(cache.get(&s("c")), Some(s("3")));
        assert!(matches!(
            cache.init().await,
            Err(CacheError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_close_after_cancelled_init() {
        let log = MemoryLog::new();
        seed(&log, 1, &[(0, "a", Some("1"))]).await;
        let cache = string_cache(&log, config());

        log.pause_delivery();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), cache.init())
                .await
                .is_err()
        );
        cache.close().await;
        assert_eq!(log.consumer_count(), 0);
        assert!(matches!(cache.init().await, Err(CacheError::Closed)));
    }

    #[tokio::test]
    async fn test_close_releases_consumer() {
        let log = MemoryLog::new();
        let cache = started(&log).await;
        assert_eq!(log.consumer_count(), 1);
        cache.close().await;
        assert_eq!(log.consumer_count(), 0);
    }

    #[tokio::test]
    async fn test_close_before_init() {
        let log = MemoryLog::new();
        let cache = string_cache(&log, config());
        cache.close().await;
        assert!(matches!(cache.init().await, Err(CacheError::Closed)));
        assert!(log.describe_topic(&topic_name()).await.is_err());
    }

    #[tokio::test]
    async fn test_require_compact() {
        let log = MemoryLog::new();
        let mut topic = TopicConfig::compacted(topic_name(), 1, 1);
        topic.cleanup_policy = CleanupPolicy::Delete;
        log.create_topic(&topic).await.unwrap();

        let strict = string_cache(&log, config());
        assert!(matches!(
            strict.init().await,
            Err(CacheError::TopicNotCompacted {
                policy: CleanupPolicy::Delete,
                ..
            })
        ));
        assert_eq!(log.consumer_count(), 0);

        let mut lenient_config = config();
        lenient_config.require_compact = false;
        let lenient = string_cache(&log, lenient_config);
        lenient.init().await.unwrap();
        lenient.put(&s("k"), &s("v")).await.unwrap();
        assert_eq!(lenient.get(&s("k")), Some(s("v")));
    }

    #[tokio::test]
    async fn test_existing_topic_is_reused() {
        let log = MemoryLog::new();
        let first = started(&log).await;
        first.put(&s("k"), &s("v")).await.unwrap();

        let second = started(&log).await;
        assert_eq!(second.get(&s("k")), Some(s("v")));
    }

    #[tokio::test]
    async fn test_admin_failure_is_fatal() {
        let log = MemoryLog::new();
        log.fail_next_create_topic(LogError::transport("no brokers available"));
        let cache = string_cache(&log, config());
        assert!(matches!(
            cache.init().await,
            Err(CacheError::Log(LogError::Transport(_)))
        ));
        assert!(!cache.is_initialized());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let log = MemoryLog::new();
        let mut config = config();
        config.partitions = 0;
        let result: CacheResult<KCache<String, String>> = KCache::new(
            config,
            Arc::new(log),
            ScalarCodec::new(),
            ScalarCodec::new(),
            NaturalOrder,
        );
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_update_handler_sees_every_update_in_order() {
        let log = MemoryLog::new();
        seed(&log, 1, &[(0, "seeded", Some("0"))]).await;

        let seen: Arc<SyncMutex<Vec<(String, Option<String>)>>> = Arc::default();
        let recorder = Arc::clone(&seen);
        let cache = string_cache(&log, config()).with_update_handler(
            move |key: &String, value: Option<&String>| {
                recorder.lock().push((key.clone(), value.cloned()));
            },
        );
        cache.init().await.unwrap();
        cache.put(&s("a"), &s("1")).await.unwrap();
        cache.delete(&s("a")).await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                (s("seeded"), Some(s("0"))),
                (s("a"), Some(s("1"))),
                (s("a"), None),
            ]
        );
    }

    #[tokio::test]
    async fn test_instances_converge() {
        let log = MemoryLog::new();
        let a = started(&log).await;
        let b = started(&log).await;

        a.put(&s("shared"), &s("from-a")).await.unwrap();
        // b's own write lands after a's, so b has applied both once it returns
        b.put(&s("mine"), &s("from-b")).await.unwrap();
        assert_eq!(b.get(&s("shared")), Some(s("from-a")));

        b.delete(&s("shared")).await.unwrap();
        a.put(&s("sync"), &s("1")).await.unwrap();
        assert_eq!(a.get(&s("shared")), None);
        assert_eq!(a.keys(), b.keys());
    }

    #[tokio::test]
    async fn test_scan_uses_comparator_order() {
        let log = MemoryLog::new();
        let reverse = |a: &i64, b: &i64| b.cmp(a);
        let cache: KCache<i64, String> = KCache::new(
            config(),
            Arc::new(log.clone()),
            ScalarCodec::new(),
            ScalarCodec::new(),
            reverse,
        )
        .unwrap();
        cache.init().await.unwrap();

        for i in 1..=6 {
            cache.put(&i, &format!("v{i}")).await.unwrap();
        }
        assert_eq!(cache.keys(), vec![6, 5, 4, 3, 2, 1]);

        let even = cache.scan(|k, _| k % 2 == 0);
        assert_eq!(
            even,
            vec![(6, s("v6")), (4, s("v4")), (2, s("v2"))]
        );
        assert_eq!(log.records(&topic_name(), 0).unwrap()[0].key.as_ref(), b"1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers() {
        let log = MemoryLog::new();
        let cache = Arc::new(started(&log).await);

        let mut writers = Vec::new();
        for w in 0..8 {
            let cache = Arc::clone(&cache);
            writers.push(tokio::spawn(async move {
                for i in 0..10 {
                    let key = format!("w{w}-{i}");
                    cache.put(&key, &format!("{w}:{i}")).await.unwrap();
                    assert_eq!(cache.get(&key), Some(format!("{w}:{i}")));
                }
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(cache.size(), 80);
        assert_eq!(cache.applied_offset(WRITE_PARTITION), Some(79));
        assert_eq!(cache.stats().applied, 80);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Schema {
        subject: String,
        version: u32,
        definition: String,
    }

    #[tokio::test]
    async fn test_structured_values() {
        let log = MemoryLog::new();
        let cache: KCache<String, Schema> = KCache::new(
            config(),
            Arc::new(log.clone()),
            ScalarCodec::new(),
            JsonCodec::new(),
            NaturalOrder,
        )
        .unwrap();
        cache.init().await.unwrap();

        let schema = Schema {
            subject: s("orders-value"),
            version: 3,
            definition: s(r#"{"type":"string"}"#),
        };
        cache.put(&s("orders-value/3"), &schema).await.unwrap();
        assert_eq!(cache.get(&s("orders-value/3")), Some(schema));

        // A value that is not valid JSON for the type is skipped
        log.append(&topic_name(), 0, "broken", Some(Bytes::from_static(b"{")))
            .unwrap();
        cache.delete(&s("nothing")).await.unwrap();
        assert_eq!(cache.get(&s("broken")), None);
        assert_eq!(cache.stats().skipped, 1);
    }
}
