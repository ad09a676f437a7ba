//! chunkmesh Network Layer
//!
//! Everything a node does over TCP:
//! - **wire**: length-prefixed protobuf framing
//! - **client**: one-shot request/reply calls to peers and to the hub
//! - **server**: the per-node accept loop and request dispatch
//! - **replication**: pulling every chunk of a file from the subnet
//! - **search**: fanning a filename search out across the subnet
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 NodeService                  │
//! │                                              │
//! │  ┌────────────┐  ┌──────────────────────┐    │
//! │  │ LocalStore │  │  ReplicationEngine   │    │
//! │  └────────────┘  └──────────────────────┘    │
//! │         │                  │                 │
//! │         │        ┌──────────────────────┐    │
//! │         │        │ PeerClient/HubClient │    │
//! │         │        └──────────────────────┘    │
//! └─────────│──────────────────│─────────────────┘
//!           ▼                  ▼
//!     inbound requests   peers and the hub
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use chunkmesh_network::{NetworkConfig, NodeService};
//! use chunkmesh_protocol::NodeId;
//! use chunkmesh_storage::LocalStore;
//! use std::sync::Arc;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5001").await?;
//! let store = Arc::new(LocalStore::with_chunk_size(16 * 1024)?);
//! let service = Arc::new(NodeService::new(
//!     NodeId::new("127.0.0.1", 5001),
//!     NodeId::new("127.0.0.1", 5000),
//!     store,
//!     NetworkConfig::default(),
//! ));
//!
//! let server = tokio::spawn(service.clone().serve(listener));
//! service.register("owner", 1).await?;
//! ```

pub mod client;
pub mod metrics;
pub mod replication;
pub mod search;
pub mod server;
pub mod wire;

// Re-exports
pub use client::{ClientConfig, HubClient, PeerClient};
pub use replication::ReplicationEngine;
pub use search::search_subnet;
pub use server::NodeService;
pub use wire::{read_message, write_message, DEFAULT_MAX_FRAME_SIZE};

use std::time::Duration;

/// Network configuration shared by every node in a process
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Deadline for establishing a TCP connection to a peer
    pub connect_timeout: Duration,
    /// Deadline for one request/reply exchange once connected
    pub request_timeout: Duration,
    /// Largest frame accepted from the wire
    pub max_frame_size: usize,
    /// Peer calls in flight at once during a search or replication round
    pub max_fanout: usize,
    /// Inbound connections handled concurrently per node (1 = serial)
    pub max_inbound_connections: usize,
    /// Replication rounds before giving up on transient failures
    pub max_replication_rounds: usize,
    /// Pause between replication rounds
    pub retry_delay: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_fanout: 16,
            max_inbound_connections: 32,
            max_replication_rounds: 32,
            retry_delay: Duration::from_millis(50),
        }
    }
}

impl NetworkConfig {
    /// Set both peer call deadlines
    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    /// Set the fan-out limit
    pub fn with_max_fanout(mut self, max_fanout: usize) -> Self {
        self.max_fanout = max_fanout;
        self
    }

    /// Set the replication round cap and the pause between rounds
    pub fn with_replication_limits(mut self, max_rounds: usize, retry_delay: Duration) -> Self {
        self.max_replication_rounds = max_rounds;
        self.retry_delay = retry_delay;
        self
    }

    /// Settings for outbound calls
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            max_frame_size: self.max_frame_size,
        }
    }
}
