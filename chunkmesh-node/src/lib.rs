//! chunkmesh Node Library
//!
//! Provides components for running a group of chunkmesh nodes:
//! - Configuration management
//! - Node startup and hub registration
//! - Prometheus metrics and readiness

pub mod config;
pub mod metrics;
pub mod runner;

pub use config::{
    ConfigError, HubSettings, MetricsSettings, NetworkSettings, NodeConfig, NodesSettings,
    StorageSettings,
};
pub use metrics::{init_metrics, MetricsServer, Readiness};
pub use runner::{start_nodes, RunningNode};
