//! Subnet-wide filename search

use crate::client::{HubClient, PeerClient};
use crate::metrics;
use chunkmesh_protocol::{
    LocalSearchRequest, LocalSearchResponse, NodeId, NodeSearchResult, SearchRequest,
    SearchResponse, Status,
};
use chunkmesh_storage::LocalStore;
use futures::stream::{self, StreamExt};
use tracing::{debug, instrument};

/// Run `request` against every member of its subnet.
///
/// The local node's result comes first, followed by one entry per peer that
/// answered, in subnet order. Peers that cannot be reached are left out.
#[instrument(skip(local, store, hub, client, request), fields(node = %local, regex = %request.regex))]
pub async fn search_subnet(
    local: &NodeId,
    store: &LocalStore,
    hub: &HubClient,
    client: &PeerClient,
    max_fanout: usize,
    request: SearchRequest,
) -> SearchResponse {
    // The local search validates the pattern before anything leaves the node
    let own = store.search_local(&request.regex);
    if own.status() == Status::MessageError {
        return SearchResponse::failure(Status::MessageError, own.error_message);
    }

    let members = match hub.subnet_members(request.subnet_id).await {
        Ok(members) => members,
        Err(e) => {
            return SearchResponse::failure(
                Status::ProcessingError,
                format!("Failed to fetch subnet {}: {}", request.subnet_id, e),
            )
        }
    };

    // the hub lists members by the port they registered, so the host may differ
    let peers: Vec<NodeId> = members
        .into_iter()
        .filter(|m| m.port != local.port)
        .collect();
    let peer_results: Vec<Option<NodeSearchResult>> = stream::iter(peers)
        .map(|peer| {
            let client = client.clone();
            let request = LocalSearchRequest {
                regex: request.regex.clone(),
            };
            async move {
                match client.request::<_, LocalSearchResponse>(&peer, request).await {
                    Ok(response) => Some(node_result(peer, response)),
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "Peer left out of search results");
                        metrics::record_peer_failure();
                        None
                    }
                }
            }
        })
        .buffered(max_fanout.max(1))
        .collect()
        .await;

    let mut results = Vec::with_capacity(peer_results.len() + 1);
    results.push(node_result(local.clone(), own));
    results.extend(peer_results.into_iter().flatten());

    SearchResponse {
        status: Status::Success as i32,
        error_message: String::new(),
        results,
    }
}

fn node_result(node: NodeId, response: LocalSearchResponse) -> NodeSearchResult {
    NodeSearchResult {
        node: Some(node),
        status: response.status,
        error_message: response.error_message,
        files: response.file_info,
    }
}
