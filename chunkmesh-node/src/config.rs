//! Configuration management for the chunkmesh node daemon
//!
//! Supports loading from TOML files and environment variables.

use chunkmesh_network::NetworkConfig;
use chunkmesh_protocol::NodeId;
use chunkmesh_storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hub the nodes register with
    #[serde(default)]
    pub hub: HubSettings,

    /// Nodes started by this process
    #[serde(default)]
    pub nodes: NodesSettings,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageSettings,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkSettings,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.address.is_empty() {
            return Err(ConfigError::ValidationError(
                "hub address cannot be empty".to_string(),
            ));
        }
        if self.nodes.count == 0 {
            return Err(ConfigError::ValidationError(
                "node count must be at least 1".to_string(),
            ));
        }
        let last_port = self.nodes.starting_port as usize + self.nodes.count;
        if last_port > u16::MAX as usize {
            return Err(ConfigError::ValidationError(format!(
                "{} nodes starting after port {} would exceed port {}",
                self.nodes.count,
                self.nodes.starting_port,
                u16::MAX
            )));
        }
        if self.storage.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        let net = &self.network;
        for (name, value) in [
            ("connect_timeout_ms", net.connect_timeout_ms as usize),
            ("request_timeout_ms", net.request_timeout_ms as usize),
            ("max_frame_size_mb", net.max_frame_size_mb),
            ("max_fanout", net.max_fanout),
            ("max_inbound_connections", net.max_inbound_connections),
            ("max_replication_rounds", net.max_replication_rounds),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "network.{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        hub: Option<String>,
        count: Option<usize>,
        owner: Option<String>,
        chunk_size: Option<usize>,
    ) -> Result<Self, ConfigError> {
        if let Some(hub) = hub {
            let (address, port) = parse_host_port(&hub)?;
            self.hub.address = address;
            self.hub.port = port;
        }
        if let Some(count) = count {
            self.nodes.count = count;
        }
        if let Some(owner) = owner {
            self.nodes.owner = owner;
        }
        if let Some(size) = chunk_size {
            self.storage.chunk_size = size;
        }
        Ok(self)
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source shaped like the environment
    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(addr) = lookup("CHUNKMESH_HUB_ADDR") {
            self.hub.address = addr;
        }
        if let Some(port) = lookup("CHUNKMESH_HUB_PORT").and_then(|p| p.parse().ok()) {
            self.hub.port = port;
        }
        if let Some(owner) = lookup("CHUNKMESH_NODE_OWNER") {
            self.nodes.owner = owner;
        }
        if let Some(count) = lookup("CHUNKMESH_NODE_COUNT").and_then(|c| c.parse().ok()) {
            self.nodes.count = count;
        }
        if let Some(size) = lookup("CHUNKMESH_CHUNK_SIZE").and_then(|s| s.parse().ok()) {
            self.storage.chunk_size = size;
        }
        self
    }

    pub fn hub_id(&self) -> NodeId {
        NodeId::new(self.hub.address.clone(), self.hub.port as i32)
    }

    /// `(index, advertised id)` of every node, indices starting at 1
    pub fn node_ids(&self) -> Vec<(i32, NodeId)> {
        (1..=self.nodes.count)
            .map(|i| {
                let port = self.nodes.starting_port as i32 + i as i32;
                (i as i32, NodeId::new(self.nodes.address.clone(), port))
            })
            .collect()
    }
}

fn parse_host_port(value: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::ValidationError(format!("expected host:port, got '{}'", value));
    let (host, port) = value.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

/// Hub connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_base_port")]
    pub port: u16,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_base_port(),
        }
    }
}

/// Nodes hosted by this process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesSettings {
    /// Address to bind, also advertised to peers
    #[serde(default = "default_address")]
    pub address: String,

    /// Node `i` listens on `starting_port + i`
    #[serde(default = "default_base_port")]
    pub starting_port: u16,

    /// Owner reported at registration
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Number of nodes to start
    #[serde(default = "default_node_count")]
    pub count: usize,
}

impl Default for NodesSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            starting_port: default_base_port(),
            owner: default_owner(),
            count: default_node_count(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_base_port() -> u16 {
    5000
}

fn default_owner() -> String {
    "owner".to_string()
}

fn default_node_count() -> usize {
    3
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl StorageSettings {
    /// Convert to chunkmesh_storage::StorageConfig
    pub fn to_storage_config(&self) -> StorageConfig {
        StorageConfig::new(self.chunk_size)
    }
}

fn default_chunk_size() -> usize {
    chunkmesh_core::DEFAULT_CHUNK_SIZE
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Maximum frame size in MB
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size_mb: usize,

    /// Peer calls in flight during a search or replication round
    #[serde(default = "default_max_fanout")]
    pub max_fanout: usize,

    /// Connections served concurrently per node
    #[serde(default = "default_max_inbound")]
    pub max_inbound_connections: usize,

    #[serde(default = "default_max_rounds")]
    pub max_replication_rounds: usize,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_frame_size_mb: default_max_frame_size(),
            max_fanout: default_max_fanout(),
            max_inbound_connections: default_max_inbound(),
            max_replication_rounds: default_max_rounds(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl NetworkSettings {
    /// Convert to chunkmesh_network::NetworkConfig
    pub fn to_network_config(&self) -> NetworkConfig {
        NetworkConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            max_frame_size: self.max_frame_size_mb * 1024 * 1024,
            max_fanout: self.max_fanout,
            max_inbound_connections: self.max_inbound_connections,
            max_replication_rounds: self.max_replication_rounds,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

fn default_connect_timeout() -> u64 {
    3000
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_max_frame_size() -> usize {
    64
}

fn default_max_fanout() -> usize {
    16
}

fn default_max_inbound() -> usize {
    32
}

fn default_max_rounds() -> usize {
    32
}

fn default_retry_delay() -> u64 {
    50
}

/// Metrics and monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Enable the Prometheus endpoint
    #[serde(default)]
    pub enabled: bool,

    /// Metrics HTTP server port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9100
}
