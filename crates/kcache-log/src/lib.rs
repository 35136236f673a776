//! KCache Log Client
//!
//! This crate defines how the cache talks to the replicated log that backs
//! it, and ships an in-process implementation of that log.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  produce   ┌───────────────┐  subscribe  ┌──────────────┐
//! │ KCache write │ ─────────► │   LogClient   │ ──────────► │  apply loop  │
//! │ (put/delete) │ ◄───────── │ (topic/parts) │ ──records─► │ (LogConsumer)│
//! └──────────────┘    ack     └───────────────┘             └──────────────┘
//! ```
//!
//! - [`LogClient`]: topic administration, produce with acknowledgment, and
//!   high-watermark queries
//! - [`LogConsumer`]: an assigned, restartable stream of records
//! - [`MemoryLog`]: a single-process log with per-partition ordering and
//!   fault injection, used by tests and the CLI

pub mod client;
pub mod error;
pub mod memory;

pub use client::{LogClient, LogConsumer, Subscription};
pub use error::{LogError, LogResult};
pub use memory::{MemoryConsumer, MemoryLog};
