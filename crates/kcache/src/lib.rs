//! KCache - a key-value cache materialized from a compacted log
//!
//! Every process keeps a full, ordered copy of the cache in memory and reads
//! it locally. Writes go through the log: a `put` or `delete` appends a
//! record, waits for the log to acknowledge it, and then waits until this
//! process's own apply loop has read the record back and applied it. All
//! instances reading the same topic converge on the same state.
//!
//! # Architecture
//!
//! ```text
//!  put/delete ──encode──► LogClient::produce ──ack(offset)──┐
//!                                                           │ wait_for_offset
//!  ┌───────────────────────── apply loop ─────────────────┐ │
//!  │ LogConsumer ─► decode ─► LocalStore ─► handler ─► OffsetTracker
//!  └──────────────────────────────────────────────────────┘
//!  get/scan/size ──────────────► LocalStore
//! ```
//!
//! # Guarantees
//!
//! - **Read-your-write**: once `put`/`delete` returns, `get` on the same
//!   instance observes it
//! - **Catch-up**: once `init` returns, the cache reflects every record that
//!   was in the log when `init` took its high-watermark snapshot
//! - **Per-partition order**: records are applied in offset order, so the
//!   last acknowledged write for a key wins
//!
//! Other instances see a write once their own apply loops reach it.

pub mod apply;
pub mod cache;
pub mod error;
pub mod handler;
pub mod offsets;
pub mod store;

pub use apply::{ApplyStats, ApplyStatsSnapshot};
pub use cache::{KCache, WRITE_PARTITION};
pub use error::{CacheError, CacheResult};
pub use handler::CacheUpdateHandler;
pub use offsets::OffsetTracker;
pub use store::{Comparator, LocalStore, NaturalOrder};

pub use kcache_codec as codec;
pub use kcache_common::{CacheConfig, CleanupPolicy, Offset, Partition, TopicConfig, TopicName};
pub use kcache_log as log;
