//! Crawler configuration.
//!
//! [`CrawlerConfig`] is the single object handed to
//! [`Crawler::new`](crate::Crawler::new). Every field has a default, so a
//! TOML file only needs the keys it wants to change:
//!
//! ```
//! use dht_crawler::CrawlerConfig;
//!
//! let config = CrawlerConfig::from_toml_str(
//!     r#"
//!     table_capacity = 2000
//!     walk_delay_ms = 50
//!     port_range = { start = 6881, end = 6889 }
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.table_capacity, 2000);
//! assert_eq!(config.port_range.end, 6889);
//! assert_eq!(config.bootstrap_nodes.len(), 2);
//! ```

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::constants::*;
use crate::dht::DhtError;

/// Inclusive range of local ports the crawler may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn len(&self) -> usize {
        usize::from(self.end.saturating_sub(self.start)) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_PORT_RANGE_START,
            end: DEFAULT_PORT_RANGE_END,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlerConfig {
    /// Maximum number of nodes kept in the routing table.
    pub table_capacity: usize,
    /// `host:port` routers queried on every join round.
    pub bootstrap_nodes: Vec<String>,
    #[serde(rename = "join_interval_ms", deserialize_with = "millis")]
    pub join_interval: Duration,
    #[serde(rename = "walk_delay_ms", deserialize_with = "millis")]
    pub walk_delay: Duration,
    /// Table size at which the walk stops re-arming itself.
    pub walk_ceiling: usize,
    pub port_range: PortRange,
    pub bind_ip: Ipv4Addr,
    #[serde(rename = "token_rotation_secs", deserialize_with = "secs")]
    pub token_rotation: Duration,
    pub event_capacity: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            table_capacity: DEFAULT_TABLE_CAPACITY,
            bootstrap_nodes: DEFAULT_BOOTSTRAP_NODES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            join_interval: DEFAULT_JOIN_INTERVAL,
            walk_delay: DEFAULT_WALK_DELAY,
            walk_ceiling: DEFAULT_WALK_CEILING,
            port_range: PortRange::default(),
            bind_ip: Ipv4Addr::UNSPECIFIED,
            token_rotation: DEFAULT_TOKEN_ROTATION,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

impl CrawlerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, DhtError> {
        let config: Self = toml::from_str(text).map_err(|e| DhtError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DhtError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Rejects values the engine cannot run with: zero-length timers, an
    /// empty table or port range, port 0, or an event channel with no room.
    pub fn validate(&self) -> Result<(), DhtError> {
        let fail = |msg: &str| Err(DhtError::Config(msg.to_string()));

        if self.table_capacity == 0 {
            return fail("table_capacity must be at least 1");
        }
        if self.port_range.is_empty() || self.port_range.start == 0 {
            return fail("port_range must satisfy 1 <= start <= end");
        }
        if self.join_interval.is_zero() || self.walk_delay.is_zero() || self.token_rotation.is_zero() {
            return fail("timer intervals must be non-zero");
        }
        if self.event_capacity == 0 {
            return fail("event_capacity must be at least 1");
        }
        if let Some(bad) = self.bootstrap_nodes.iter().find(|n| n.rsplit_once(':').is_none()) {
            return Err(DhtError::Config(format!("bootstrap node {bad:?} is not host:port")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CrawlerConfig::default();
        assert_eq!(config.table_capacity, 600);
        assert_eq!(config.walk_ceiling, 1000);
        assert_eq!(config.join_interval, Duration::from_secs(3));
        assert_eq!(config.walk_delay, Duration::from_millis(200));
        assert_eq!(
            config.bootstrap_nodes,
            vec!["router.bittorrent.com:6881", "dht.transmissionbt.com:6881"]
        );
        assert_eq!(config.port_range.len(), 49);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CrawlerConfig::from_toml_str(
            "join_interval_ms = 500\nbootstrap_nodes = [\"127.0.0.1:6881\"]\ntoken_rotation_secs = 60\n",
        )
        .unwrap();
        assert_eq!(config.join_interval, Duration::from_millis(500));
        assert_eq!(config.token_rotation, Duration::from_secs(60));
        assert_eq!(config.bootstrap_nodes, vec!["127.0.0.1:6881"]);
        assert_eq!(config.table_capacity, DEFAULT_TABLE_CAPACITY);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            CrawlerConfig::from_toml_str("table_caption = 10"),
            Err(DhtError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(CrawlerConfig::from_toml_str("table_capacity = 0").is_err());
        assert!(CrawlerConfig::from_toml_str("walk_delay_ms = 0").is_err());
        assert!(CrawlerConfig::from_toml_str("port_range = { start = 5000, end = 4000 }").is_err());
        assert!(CrawlerConfig::from_toml_str("port_range = { start = 0, end = 10 }").is_err());
        assert!(CrawlerConfig::from_toml_str("bootstrap_nodes = [\"no-port\"]").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "walk_ceiling = 50\nbind_ip = \"127.0.0.1\"").unwrap();

        let config = CrawlerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.walk_ceiling, 50);
        assert_eq!(config.bind_ip, Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            CrawlerConfig::from_file("/nonexistent/crawler.toml"),
            Err(DhtError::Io(_))
        ));
    }
}
