//! Node service
//!
//! Accepts connections, reads one request per connection, answers it and
//! closes. Each connection runs in its own task; a semaphore caps how many
//! are served at once.

use crate::client::{HubClient, PeerClient};
use crate::metrics;
use crate::replication::ReplicationEngine;
use crate::search::search_subnet;
use crate::wire::{read_message, write_message};
use crate::NetworkConfig;
use chunkmesh_core::error::{MeshError, Result};
use chunkmesh_protocol::{Message, NodeId, Payload, ReplicateRequest, ReplicateResponse, Status};
use chunkmesh_storage::LocalStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// One chunkmesh node: its store plus everything needed to answer peers
pub struct NodeService {
    /// Advertised address, used to recognize this node in subnet lists
    local: NodeId,
    store: Arc<LocalStore>,
    client: PeerClient,
    hub: HubClient,
    engine: ReplicationEngine,
    config: NetworkConfig,
    active: AtomicUsize,
}

impl NodeService {
    pub fn new(local: NodeId, hub: NodeId, store: Arc<LocalStore>, config: NetworkConfig) -> Self {
        let client = PeerClient::new(config.client_config());
        let engine = ReplicationEngine::new(local.clone(), store.clone(), client.clone())
            .with_max_fanout(config.max_fanout)
            .with_rounds(config.max_replication_rounds, config.retry_delay);

        Self {
            hub: HubClient::new(hub, client.clone()),
            local,
            store,
            client,
            engine,
            config,
            active: AtomicUsize::new(0),
        }
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Register this node with the hub
    pub async fn register(&self, owner: &str, index: i32) -> Result<()> {
        self.hub.register(owner, index, self.local.port).await
    }

    /// Serve connections from `listener` until the task is dropped
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let limit = self.config.max_inbound_connections.max(1);
        let permits = Arc::new(Semaphore::new(limit));
        info!(node = %self.local, max_connections = limit, "Node listening");

        loop {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| MeshError::Internal("Connection limiter closed".to_string()))?;

            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(node = %self.local, error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let slot = ConnectionSlot::open(self.clone(), permit);
            tokio::spawn(async move {
                let service = slot.service.clone();
                if let Err(e) = service.handle_connection(stream).await {
                    debug!(node = %service.local, remote = %remote, error = %e, "Connection closed with error");
                }
                drop(slot);
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let request = timeout(
            self.config.request_timeout,
            read_message(&mut stream, self.config.max_frame_size),
        )
        .await
        .map_err(|_| MeshError::Timeout {
            peer: self.local.to_string(),
            after_ms: self.config.request_timeout.as_millis() as u64,
        })??;

        let kind = request.kind();
        let started = Instant::now();
        match self.dispatch(request).await {
            Some(reply) => {
                write_message(&mut stream, &reply).await?;
                metrics::record_request(kind, started.elapsed().as_secs_f64());
            }
            None => {
                warn!(node = %self.local, kind, "Closing connection on a message this node does not serve");
                metrics::record_ignored(kind);
            }
        }
        Ok(())
    }

    /// Answer one request. `None` means the message gets no reply.
    pub async fn dispatch(&self, request: Message) -> Option<Message> {
        let reply: Message = match request.payload? {
            Payload::UploadRequest(req) => self.store.upload(&req.filename, req.data).into(),
            Payload::LocalSearchRequest(req) => self.store.search_local(&req.regex).into(),
            Payload::DownloadRequest(req) => self.store.download_by_hash(&req.file_hash).into(),
            Payload::ChunkRequest(req) => {
                self.store.get_chunk(&req.file_hash, req.chunk_index).into()
            }
            Payload::SearchRequest(req) => search_subnet(
                &self.local,
                &self.store,
                &self.hub,
                &self.client,
                self.config.max_fanout,
                req,
            )
            .await
            .into(),
            Payload::ReplicateRequest(req) => self.replicate(req).await.into(),
            _ => return None,
        };
        Some(reply)
    }

    #[instrument(skip(self, request), fields(node = %self.local, subnet = request.subnet_id))]
    async fn replicate(&self, request: ReplicateRequest) -> ReplicateResponse {
        let Some(file_info) = request.file_info else {
            metrics::record_replication("rejected");
            return ReplicateResponse::failure(
                Status::MessageError,
                "Replicate request carries no file info",
            );
        };

        let members = match self.hub.subnet_members(request.subnet_id).await {
            Ok(members) => members,
            Err(e) => {
                error!(error = %e, "Could not fetch subnet members");
                metrics::record_replication("failed");
                return ReplicateResponse::failure(
                    Status::ProcessingError,
                    format!("Failed to fetch subnet {}: {}", request.subnet_id, e),
                );
            }
        };

        match self.engine.replicate(&file_info, &members).await {
            Ok(response) => {
                metrics::record_replication(if response.is_success() {
                    "success"
                } else {
                    "failed"
                });
                response
            }
            Err(e) if e.is_chunk_unavailable() => {
                warn!(file = %file_info.filename, error = %e, "File cannot be replicated");
                metrics::record_replication("unavailable");
                ReplicateResponse::failure(Status::UnableToComplete, e.to_string())
            }
            Err(e) => {
                error!(file = %file_info.filename, error = %e, "Replication failed");
                metrics::record_replication("failed");
                ReplicateResponse::failure(Status::ProcessingError, e.to_string())
            }
        }
    }
}

/// A connection being served. Holds its permit and keeps the gauge current.
struct ConnectionSlot {
    service: Arc<NodeService>,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionSlot {
    fn open(service: Arc<NodeService>, permit: OwnedSemaphorePermit) -> Self {
        let active = service.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_connections(service.local.to_string(), active);
        Self {
            service,
            _permit: permit,
        }
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let active = self.service.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_connections(self.service.local.to_string(), active);
    }
}
