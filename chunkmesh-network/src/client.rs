//! Outbound calls to peers and to the hub
//!
//! Every call opens a fresh TCP connection, sends one framed request, reads
//! one framed reply and closes. There is no pooling or keep-alive.

use crate::wire::{read_message, write_message, DEFAULT_MAX_FRAME_SIZE};
use chunkmesh_core::error::{MeshError, Result};
use chunkmesh_protocol::{
    Message, NodeId, RegistrationRequest, RegistrationResponse, SubnetRequest, SubnetResponse,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

/// Configuration for outbound calls
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Timeout for writing the request and reading the reply
    pub request_timeout: Duration,
    /// Largest reply accepted
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Request/reply client for talking to other nodes
#[derive(Debug, Clone, Default)]
pub struct PeerClient {
    config: ClientConfig,
}

impl PeerClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send `request` to `peer` and wait for its reply
    #[instrument(skip(self, request), fields(peer = %peer, kind = request.kind()))]
    pub async fn call(&self, peer: &NodeId, request: Message) -> Result<Message> {
        let addr = peer.address();

        let mut stream = timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| MeshError::Timeout {
                peer: addr.clone(),
                after_ms: self.config.connect_timeout.as_millis() as u64,
            })?
            .map_err(|e| MeshError::Network(format!("Connection failed to {}: {}", addr, e)))?;

        let exchange = async {
            write_message(&mut stream, &request).await?;
            read_message(&mut stream, self.config.max_frame_size).await
        };

        let reply = timeout(self.config.request_timeout, exchange)
            .await
            .map_err(|_| MeshError::Timeout {
                peer: addr.clone(),
                after_ms: self.config.request_timeout.as_millis() as u64,
            })??;

        debug!(reply = reply.kind(), "Peer replied");
        Ok(reply)
    }

    /// Typed [`call`](Self::call): the reply must be a `Resp`
    pub async fn request<Req, Resp>(&self, peer: &NodeId, request: Req) -> Result<Resp>
    where
        Req: Into<Message>,
        Resp: TryFrom<Message, Error = MeshError>,
    {
        let reply = self.call(peer, request.into()).await?;
        Resp::try_from(reply)
    }
}

/// Client for the hub that tracks subnet membership
#[derive(Debug, Clone)]
pub struct HubClient {
    hub: NodeId,
    client: PeerClient,
}

impl HubClient {
    pub fn new(hub: NodeId, client: PeerClient) -> Self {
        Self { hub, client }
    }

    pub fn hub(&self) -> &NodeId {
        &self.hub
    }

    /// Announce a node listening on `port`. Any non-success reply is an error.
    #[instrument(skip(self), fields(hub = %self.hub))]
    pub async fn register(&self, owner: &str, index: i32, port: i32) -> Result<()> {
        let response: RegistrationResponse = self
            .client
            .request(
                &self.hub,
                RegistrationRequest {
                    owner: owner.to_string(),
                    index,
                    port,
                },
            )
            .await?;

        if !response.is_success() {
            return Err(MeshError::Hub(format!(
                "registration of node {} refused with {}: {}",
                index,
                response.status(),
                response.error_message
            )));
        }

        info!("node {} owned by {} registered", index, owner);
        Ok(())
    }

    /// Current members of a subnet, in the hub's order
    #[instrument(skip(self), fields(hub = %self.hub))]
    pub async fn subnet_members(&self, subnet_id: i32) -> Result<Vec<NodeId>> {
        let response: SubnetResponse = self
            .client
            .request(&self.hub, SubnetRequest { subnet_id })
            .await?;

        debug!(members = response.nodes.len(), "Fetched subnet members");
        Ok(response.nodes)
    }
}
