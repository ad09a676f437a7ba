//! Starting the nodes hosted by one daemon

use crate::config::NodeConfig;
use crate::metrics::Readiness;
use anyhow::Context;
use chunkmesh_core::Result as MeshResult;
use chunkmesh_network::{NetworkConfig, NodeService};
use chunkmesh_protocol::NodeId;
use chunkmesh_storage::LocalStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

/// A node whose listener is running
pub struct RunningNode {
    pub index: i32,
    pub service: Arc<NodeService>,
    pub handle: JoinHandle<MeshResult<()>>,
}

/// Start every configured node and register it with the hub.
///
/// Each node's listener is up before it registers, so the hub never hands out
/// an address that refuses connections. A failed registration stops every
/// node started so far and fails the whole startup.
pub async fn start_nodes(
    config: &NodeConfig,
    readiness: &Readiness,
) -> anyhow::Result<Vec<RunningNode>> {
    let network = config.network.to_network_config();
    let hub = config.hub_id();
    let mut nodes: Vec<RunningNode> = Vec::with_capacity(config.nodes.count);

    for (index, id) in config.node_ids() {
        let started = start_node(config, index, id, hub.clone(), network.clone()).await;
        let node = match started {
            Ok(node) => node,
            Err(e) => {
                for node in &nodes {
                    node.handle.abort();
                }
                return Err(e);
            }
        };

        readiness.node_registered();
        nodes.push(node);
    }

    info!(count = nodes.len(), hub = %hub, "All nodes registered");
    Ok(nodes)
}

async fn start_node(
    config: &NodeConfig,
    index: i32,
    id: NodeId,
    hub: NodeId,
    network: NetworkConfig,
) -> anyhow::Result<RunningNode> {
    let listener = TcpListener::bind(id.address())
        .await
        .with_context(|| format!("Failed to bind node {} on {}", index, id))?;
    let store = Arc::new(LocalStore::new(config.storage.to_storage_config())?);
    let service = Arc::new(NodeService::new(id, hub, store, network));

    let handle = tokio::spawn(service.clone().serve(listener));

    if let Err(e) = service.register(&config.nodes.owner, index).await {
        handle.abort();
        return Err(e).with_context(|| format!("Failed to register node {} with the hub", index));
    }

    Ok(RunningNode {
        index,
        service,
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkmesh_network::{read_message, write_message};
    use chunkmesh_protocol::{Message, RegistrationRequest, RegistrationResponse};

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn single_node_config(node_port: u16, hub_port: u16) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.nodes.count = 1;
        config.nodes.starting_port = node_port - 1;
        config.nodes.owner = "tester".to_string();
        config.hub.port = hub_port;
        config.network.connect_timeout_ms = 200;
        config.network.request_timeout_ms = 1000;
        config
    }

    #[tokio::test]
    async fn test_start_registers_with_hub() {
        let hub = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let hub_port = hub.local_addr().unwrap().port();
        let hub_task = tokio::spawn(async move {
            let (mut stream, _) = hub.accept().await.unwrap();
            let request = read_message(&mut stream, 1024).await.unwrap();
            let reply: Message = RegistrationResponse::default().into();
            write_message(&mut stream, &reply).await.unwrap();
            RegistrationRequest::try_from(request).unwrap()
        });

        let config = single_node_config(free_port().await, hub_port);
        let readiness = Readiness::new(1);
        let nodes = start_nodes(&config, &readiness).await.unwrap();

        let registration = hub_task.await.unwrap();
        assert_eq!(registration.owner, "tester");
        assert_eq!(registration.index, 1);
        assert_eq!(registration.port, nodes[0].service.local_id().port);
        assert!(readiness.is_ready());

        for node in nodes {
            node.handle.abort();
        }
    }

    #[tokio::test]
    async fn test_start_fails_without_hub() {
        let config = single_node_config(free_port().await, free_port().await);
        let readiness = Readiness::new(1);

        let err = start_nodes(&config, &readiness).await.err().unwrap();
        assert!(err.to_string().contains("register node 1"));
        assert!(!readiness.is_ready());
    }
}
