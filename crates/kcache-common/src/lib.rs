//! KCache Common - Shared types and configuration
//!
//! This crate provides the record and topic types, configuration, and error
//! definitions shared by the codec, log client, and cache engine crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::CacheConfig;
pub use error::{Error, Result};
pub use types::*;
