//! Pulling a whole file from the subnet
//!
//! Replication works in rounds. Each round hands every pending chunk to a
//! subnet member, fetches all of them concurrently and re-queues whatever
//! failed. A member that answers "not here" for a chunk is never asked for
//! that chunk again during the same replication. A member that could not be
//! reached is passed over for that chunk while any other candidate remains.
//! When a full walk over the members cannot place the next chunk anywhere,
//! the file is unobtainable.

use crate::client::PeerClient;
use crate::metrics;
use chunkmesh_core::error::{MeshError, Result};
use chunkmesh_protocol::{
    ChunkRequest, ChunkResponse, FileInfo, NodeId, NodeReplicationStatus, ReplicateResponse,
    Status,
};
use chunkmesh_storage::LocalStore;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Chunk index to a set of members
type MissingSet = HashMap<u32, HashSet<NodeId>>;

/// Fetches every chunk of a file and stores the reassembled content locally
#[derive(Clone)]
pub struct ReplicationEngine {
    local: NodeId,
    store: Arc<LocalStore>,
    client: PeerClient,
    max_fanout: usize,
    max_rounds: usize,
    retry_delay: Duration,
}

impl ReplicationEngine {
    pub fn new(local: NodeId, store: Arc<LocalStore>, client: PeerClient) -> Self {
        Self {
            local,
            store,
            client,
            max_fanout: 16,
            max_rounds: 32,
            retry_delay: Duration::from_millis(50),
        }
    }

    /// Bound the number of chunk fetches in flight at once
    pub fn with_max_fanout(mut self, max_fanout: usize) -> Self {
        self.max_fanout = max_fanout.max(1);
        self
    }

    /// Bound the number of rounds and set the pause between them
    pub fn with_rounds(mut self, max_rounds: usize, retry_delay: Duration) -> Self {
        self.max_rounds = max_rounds;
        self.retry_delay = retry_delay;
        self
    }

    /// Replicate the file described by `file_info` from `members`.
    ///
    /// `members` is the subnet in hub order and may include this node, which
    /// serves its own chunks without going through the network. Fails with
    /// [`MeshError::ChunkNotFound`] when some chunk is held by no member, and
    /// with [`MeshError::ReplicationExhausted`] when transient failures outlast
    /// the round cap.
    #[instrument(
        skip(self, file_info, members),
        fields(node = %self.local, file = %file_info.filename, chunks = file_info.chunks.len())
    )]
    pub async fn replicate(
        &self,
        file_info: &FileInfo,
        members: &[NodeId],
    ) -> Result<ReplicateResponse> {
        let file_hash = hex::encode(&file_info.hash);
        let mut pending: BTreeSet<u32> = file_info.chunks.iter().map(|c| c.index).collect();
        let hash: Arc<[u8]> = Arc::from(file_info.hash.as_slice());
        // members known not to hold a chunk, and members that failed to answer
        let mut missing = MissingSet::new();
        let mut unreachable = MissingSet::new();
        let mut parts = Vec::with_capacity(pending.len());
        let mut rounds = 0;

        while !pending.is_empty() {
            if rounds >= self.max_rounds {
                return Err(MeshError::ReplicationExhausted {
                    file_hash,
                    rounds,
                    pending: pending.len(),
                });
            }
            if rounds > 0 && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
            rounds += 1;
            forget_exhausted_failures(&mut unreachable, &missing, members);

            let assignments = plan_round(&pending, members, &missing, &unreachable)
                .ok_or_else(|| MeshError::ChunkNotFound {
                    file_hash: file_hash.clone(),
                })?;
            debug!(round = rounds, fetches = assignments.len(), "Dispatching chunk fetches");

            let outcomes: Vec<_> = stream::iter(assignments)
                .map(|(index, peer)| {
                    let engine = self.clone();
                    let hash = hash.clone();
                    async move { engine.fetch(&hash, index, peer).await }
                })
                .buffer_unordered(self.max_fanout)
                .collect()
                .await;

            for (status, chunk) in outcomes {
                let (Some(index), Some(peer)) = (status.chunk_index, status.node.clone()) else {
                    continue;
                };
                match status.status() {
                    Status::Success => {
                        pending.remove(&index);
                        parts.push((status, chunk));
                    }
                    Status::UnableToComplete => {
                        debug!(chunk = index, peer = %peer, "Peer does not hold chunk");
                        missing.entry(index).or_default().insert(peer);
                    }
                    other => {
                        debug!(chunk = index, peer = %peer, status = %other, "Chunk fetch failed, will retry");
                        unreachable.entry(index).or_default().insert(peer);
                    }
                }
            }
        }

        metrics::record_replication_rounds(rounds);
        info!(rounds, hash = %file_hash, "All chunks fetched");

        Ok(self.store.reconstruct(parts, file_info))
    }

    /// Ask one member for one chunk. Transport failures become `NETWORK_ERROR`.
    async fn fetch(
        &self,
        file_hash: &[u8],
        index: u32,
        peer: NodeId,
    ) -> (NodeReplicationStatus, ChunkResponse) {
        // the hub lists members by the port they registered, so the host may differ
        let response = if peer.port == self.local.port {
            self.store.get_chunk(file_hash, index)
        } else {
            let request = ChunkRequest {
                file_hash: file_hash.to_vec(),
                chunk_index: index,
            };
            match self.client.request::<_, ChunkResponse>(&peer, request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(peer = %peer, chunk = index, error = %e, "Chunk request failed");
                    metrics::record_peer_failure();
                    ChunkResponse::failure(Status::NetworkError, e.to_string())
                }
            }
        };

        let status = NodeReplicationStatus::new(
            peer,
            index,
            response.status(),
            response.error_message.clone(),
        );
        (status, response)
    }
}

/// Give every member another chance at a chunk once all of them have failed it
fn forget_exhausted_failures(
    unreachable: &mut MissingSet,
    missing: &MissingSet,
    members: &[NodeId],
) {
    unreachable.retain(|index, failed| {
        members.iter().any(|peer| {
            !failed.contains(peer) && !missing.get(index).is_some_and(|peers| peers.contains(peer))
        })
    });
}

/// Assign every pending chunk to a member for one round.
///
/// Walks the members in order, handing the head of the queue to each member
/// not known to lack it. Members in `unreachable` for a chunk are skipped
/// unless no other member could take it. Returns `None` when a whole walk
/// places nothing.
fn plan_round(
    pending: &BTreeSet<u32>,
    members: &[NodeId],
    missing: &MissingSet,
    unreachable: &MissingSet,
) -> Option<Vec<(u32, NodeId)>> {
    let listed = |set: &MissingSet, index: u32, peer: &NodeId| {
        set.get(&index).is_some_and(|peers| peers.contains(peer))
    };
    let has_fresh_candidate = |index: u32| {
        members
            .iter()
            .any(|peer| !listed(missing, index, peer) && !listed(unreachable, index, peer))
    };

    let mut queue: VecDeque<u32> = pending.iter().copied().collect();
    let mut assignments = Vec::with_capacity(queue.len());

    while !queue.is_empty() {
        let before = queue.len();
        for peer in members {
            let Some(&head) = queue.front() else {
                break;
            };
            if listed(missing, head, peer) {
                continue;
            }
            if listed(unreachable, head, peer) && has_fresh_candidate(head) {
                continue;
            }
            queue.pop_front();
            assignments.push((head, peer.clone()));
        }
        if queue.len() == before {
            return None;
        }
    }

    Some(assignments)
}
