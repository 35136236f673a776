//! Applied-offset tracking
//!
//! The apply loop reports every record it applies; writers and the startup
//! catch-up wait here until the loop has reached the offset they care about.
//! One lock guards the per-partition offsets and one broadcast signal wakes
//! every waiter on each update. Each waiter re-checks its own target after
//! waking, so updates to unrelated partitions never satisfy it by accident.

use crate::error::{CacheError, CacheResult};
use kcache_common::{Offset, Partition};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct TrackerState {
    /// Highest applied offset per partition
    applied: BTreeMap<Partition, Offset>,
    /// Set once the apply loop has stopped for good
    closed: bool,
}

/// Highest applied offset per partition, with waiting
#[derive(Debug, Default)]
pub struct OffsetTracker {
    state: Mutex<TrackerState>,
    changed: Notify,
}

impl OffsetTracker {
    /// Create a tracker with no applied offsets
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `offset` of `partition` has been applied and wake waiters
    ///
    /// Offsets never move backwards; a lower offset than the current one is
    /// ignored.
    pub fn record_applied(&self, partition: Partition, offset: Offset) {
        {
            let mut state = self.state.lock();
            let current = state.applied.entry(partition).or_insert(offset);
            if offset < *current {
                warn!(
                    "Ignoring offset {} for partition {}: already at {}",
                    offset, partition, *current
                );
                return;
            }
            *current = offset;
        }
        self.changed.notify_waiters();
    }

    /// Highest applied offset of a partition, if any record was applied
    #[must_use]
    pub fn applied(&self, partition: Partition) -> Option<Offset> {
        self.state.lock().applied.get(&partition).copied()
    }

    /// Mark the tracker closed; pending and future waits fail with
    /// [`CacheError::Closed`] unless their offset is already applied
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.changed.notify_waiters();
    }

    /// Wait until `offset` of `partition` has been applied
    ///
    /// Negative offsets mean there is nothing to wait for and return at once.
    /// Without a deadline this waits as long as the apply loop makes no
    /// progress on the partition.
    pub async fn wait_for_offset(
        &self,
        partition: Partition,
        offset: Offset,
        deadline: Option<Duration>,
    ) -> CacheResult<()> {
        if offset < 0 {
            return Ok(());
        }
        match deadline {
            None => self.wait_until_applied(partition, offset).await,
            Some(limit) => tokio::time::timeout(limit, self.wait_until_applied(partition, offset))
                .await
                .map_err(|_| {
                    debug!(
                        "Wait for offset {} of partition {} expired after {:?}",
                        offset, partition, limit
                    );
                    CacheError::Timeout {
                        partition,
                        offset,
                        waited: limit,
                    }
                })?,
        }
    }

    async fn wait_until_applied(&self, partition: Partition, offset: Offset) -> CacheResult<()> {
        loop {
            // Register before checking so an update in between still wakes us.
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock();
                if state
                    .applied
                    .get(&partition)
                    .is_some_and(|&applied| applied >= offset)
                {
                    return Ok(());
                }
                if state.closed {
                    return Err(CacheError::Closed);
                }
            }

            notified.await;
        }
    }
}
