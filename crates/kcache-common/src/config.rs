//! Configuration for a cache instance
//!
//! A [`CacheConfig`] is usually read from the `[cache]` table of a TOML file,
//! but every field has a default so an empty document is a valid config.

use crate::error::{Error, Result};
use crate::types::{TopicConfig, TopicName};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration of one cache instance and the topic behind it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Comma-separated broker addresses handed to the log client
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    /// Topic holding the cache changelog
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Consumer group of the apply loop (offsets are never committed)
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Client id of the apply loop; derived from the topic when unset
    #[serde(default)]
    pub client_id: Option<String>,
    /// Number of partitions the topic is created with
    #[serde(default = "default_partitions")]
    pub partitions: i32,
    /// Replication factor the topic is created with
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i16,
    /// Refuse to start unless the topic uses `cleanup.policy=compact`
    #[serde(default = "default_require_compact")]
    pub require_compact: bool,
    /// Upper bound for the startup catch-up, per partition (milliseconds)
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
    /// Upper bound for a write to become visible locally (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_topic() -> String {
    "_schemas".to_string()
}

fn default_group_id() -> String {
    "kafkacache".to_string()
}

const fn default_partitions() -> i32 {
    1
}

const fn default_replication_factor() -> i16 {
    1
}

const fn default_require_compact() -> bool {
    true
}

const fn default_init_timeout_ms() -> u64 {
    300_000
}

const fn default_timeout_ms() -> u64 {
    60_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            topic: default_topic(),
            group_id: default_group_id(),
            client_id: None,
            partitions: default_partitions(),
            replication_factor: default_replication_factor(),
            require_compact: default_require_compact(),
            init_timeout_ms: default_init_timeout_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Layout of a configuration file: the cache settings live under `[cache]`
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    cache: CacheConfig,
}

impl CacheConfig {
    /// Config for the given topic with all other fields defaulted
    #[must_use]
    pub fn for_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document and validate the result
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(s)?;
        file.cache.validate()?;
        Ok(file.cache)
    }

    /// Read and parse a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Check the values for consistency
    pub fn validate(&self) -> Result<()> {
        TopicName::new(self.topic.as_str())?;
        if self.partitions < 1 {
            return Err(Error::configuration(format!(
                "partitions must be at least 1, got {}",
                self.partitions
            )));
        }
        if self.replication_factor < 1 {
            return Err(Error::configuration(format!(
                "replication_factor must be at least 1, got {}",
                self.replication_factor
            )));
        }
        if self.init_timeout_ms == 0 {
            return Err(Error::configuration("init_timeout_ms must be non-zero"));
        }
        if self.timeout_ms == 0 {
            return Err(Error::configuration("timeout_ms must be non-zero"));
        }
        Ok(())
    }

    /// Description of the compacted topic this config asks for
    pub fn topic_config(&self) -> Result<TopicConfig> {
        let name = TopicName::new(self.topic.as_str())?;
        Ok(TopicConfig::compacted(
            name,
            self.partitions,
            self.replication_factor,
        ))
    }

    /// Client id of the apply loop
    #[must_use]
    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("kafkacache-reader-{}", self.topic.trim_start_matches('_')))
    }

    /// Catch-up deadline per partition
    #[must_use]
    pub const fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    /// Read-your-write deadline for put/delete
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.topic, "_schemas");
        assert_eq!(config.group_id, "kafkacache");
        assert_eq!(config.client_id(), "kafkacache-reader-schemas");
        assert_eq!(config.partitions, 1);
        assert!(config.require_compact);
        assert_eq!(config.init_timeout(), Duration::from_secs(300));
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = CacheConfig::from_toml_str("").unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = CacheConfig::from_toml_str(
            r#"
            [cache]
            topic = "users"
            partitions = 3
            timeout_ms = 500
            client_id = "reader-1"
            "#,
        )
        .unwrap();
        assert_eq!(config.topic, "users");
        assert_eq!(config.partitions, 3);
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.client_id(), "reader-1");
        assert_eq!(config.group_id, "kafkacache");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            CacheConfig::from_toml_str("[cache]\npartitions = 0"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            CacheConfig::from_toml_str("[cache]\ntopic = \"bad topic\""),
            Err(Error::InvalidTopicName(_))
        ));
        assert!(matches!(
            CacheConfig::from_toml_str("[cache]\ntimeout_ms = 0"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            CacheConfig::from_toml_str("[cache]\npartitions = \"many\""),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\ntopic = \"from-file\"\nrequire_compact = false").unwrap();

        let config = CacheConfig::load(file.path()).unwrap();
        assert_eq!(config.topic, "from-file");
        assert!(!config.require_compact);

        let topic = config.topic_config().unwrap();
        assert_eq!(topic.name.as_str(), "from-file");
        assert!(topic.cleanup_policy.is_compacted());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            CacheConfig::load("/nonexistent/kcache.toml"),
            Err(Error::Io(_))
        ));
    }
}
