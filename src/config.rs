//! RingCache Configuration
//!
//! This module provides configuration structures for a RingCache node.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main RingCache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingCacheConfig {
    /// Node-specific configuration
    pub node: NodeConfig,

    /// Cluster configuration
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Leader election configuration
    #[serde(default)]
    pub election: ElectionSettings,

    /// Cache and backing store configuration
    pub cache: CacheConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Election identifier of this node (its position on the ring)
    pub id: String,

    /// Address to bind for election traffic
    pub bind_address: String,

    /// Advertised address for other nodes to connect
    #[serde(default)]
    pub advertise_address: Option<String>,
}

/// A statically known peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerConfig {
    /// Election identifier of the peer
    pub id: String,

    /// Address the peer listens on for election traffic
    pub address: String,
}

/// Cluster configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Known peers (excluding this node)
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

/// Leader election configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSettings {
    /// How long to wait for a neighbor's acknowledgement before moving on
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Connect timeout for election messages
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Capacity of the per-node event queue
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
}

/// Cache and backing store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Base URL of the data server backing the cache
    pub data_server: String,

    /// Request timeout against the data server in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_ack_timeout_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    500
}

fn default_event_queue_size() -> usize {
    1024
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ElectionSettings {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            event_queue_size: default_event_queue_size(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl RingCacheConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: RingCacheConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.is_empty() {
            return Err(crate::Error::Config("node.id cannot be empty".into()));
        }

        if self.node.bind_address.is_empty() {
            return Err(crate::Error::Config("node.bind_address cannot be empty".into()));
        }

        if self.cache.data_server.is_empty() {
            return Err(crate::Error::Config("cache.data_server cannot be empty".into()));
        }

        if self.election.ack_timeout_ms == 0 {
            return Err(crate::Error::Config("election.ack_timeout_ms must be positive".into()));
        }

        if self.election.event_queue_size == 0 {
            return Err(crate::Error::Config("election.event_queue_size must be positive".into()));
        }

        let mut seen = HashSet::new();
        for peer in &self.cluster.peers {
            if peer.id == self.node.id {
                return Err(crate::Error::Config(format!(
                    "peer id {} collides with node.id",
                    peer.id
                )));
            }
            if !seen.insert(peer.id.as_str()) {
                return Err(crate::Error::Config(format!("duplicate peer id {}", peer.id)));
            }
        }

        Ok(())
    }

    /// Get the advertised address (or bind address if not set)
    pub fn advertise_address(&self) -> &str {
        self.node
            .advertise_address
            .as_deref()
            .unwrap_or(&self.node.bind_address)
    }

    /// Get the acknowledgement timeout as Duration
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.election.ack_timeout_ms)
    }

    /// Get the election connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.election.connect_timeout_ms)
    }

    /// Get the data server request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.cache.request_timeout_secs)
    }

    /// Render a commented sample configuration
    pub fn sample(node_id: &str) -> String {
        format!(
            r#"# RingCache node configuration

[node]
# Election identifier; the node with the greatest id becomes leader
id = "{node_id}"
bind_address = "0.0.0.0:7654"
# advertise_address = "10.0.0.1:7654"

[cluster]
# peers = [
#     {{ id = "2", address = "10.0.0.2:7654" }},
#     {{ id = "3", address = "10.0.0.3:7654" }},
# ]
peers = []

[election]
ack_timeout_ms = 1000
connect_timeout_ms = 500

[cache]
data_server = "http://localhost:8081/"
request_timeout_secs = 30

[api]
enabled = true
bind_address = "0.0.0.0:8080"

[logging]
level = "info"
format = "pretty"
"#
        )
    }
}
