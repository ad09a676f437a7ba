//! Prometheus metrics for the chunkmesh node daemon
//!
//! Describes the metrics recorded by the network layer and serves them over
//! HTTP together with a readiness probe.

use chunkmesh_network::metrics::names;
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Nodes registered with the hub so far
pub const NODES_REGISTERED: &str = "chunkmesh_nodes_registered";

/// Initialize metric descriptions
pub fn init_metrics() {
    // Request metrics
    describe_counter!(
        names::REQUESTS_TOTAL,
        "Total number of requests answered, by kind"
    );
    describe_counter!(
        names::REQUESTS_IGNORED,
        "Messages closed without a reply, by kind"
    );
    describe_histogram!(
        names::REQUEST_DURATION,
        "Request processing duration in seconds"
    );

    // Replication metrics
    describe_counter!(
        names::REPLICATIONS_TOTAL,
        "Replication requests handled, by outcome"
    );
    describe_histogram!(
        names::REPLICATION_ROUNDS,
        "Rounds needed to fetch every chunk of a file"
    );

    // Network metrics
    describe_counter!(
        names::PEER_CALL_FAILURES,
        "Outbound peer calls that failed in transport"
    );
    describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Inbound connections being served, per node"
    );

    describe_gauge!(NODES_REGISTERED, "Nodes registered with the hub");
}

/// Readiness shared between the node runner and the metrics server
#[derive(Debug, Clone)]
pub struct Readiness {
    registered: Arc<AtomicUsize>,
    expected: usize,
}

impl Readiness {
    pub fn new(expected: usize) -> Self {
        Self {
            registered: Arc::new(AtomicUsize::new(0)),
            expected,
        }
    }

    /// Record one more node registered with the hub
    pub fn node_registered(&self) {
        let registered = self.registered.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!(NODES_REGISTERED).set(registered as f64);
    }

    pub fn registered(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    /// Every node this process hosts is registered
    pub fn is_ready(&self) -> bool {
        self.registered() >= self.expected
    }
}

/// HTTP server for metrics endpoint
pub struct MetricsServer {
    handle: PrometheusHandle,
    addr: SocketAddr,
}

impl MetricsServer {
    /// Install the Prometheus recorder
    pub fn new(port: u16) -> anyhow::Result<Self> {
        let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
        let handle = PrometheusBuilder::new().install_recorder()?;
        Ok(Self { handle, addr })
    }

    /// Serve `/metrics` and `/health` until the task is dropped
    pub async fn start(self, readiness: Readiness) -> anyhow::Result<()> {
        use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};

        let handle = self.handle;

        let health_handler = move || {
            let readiness = readiness.clone();
            async move {
                if readiness.is_ready() {
                    (StatusCode::OK, "OK").into_response()
                } else {
                    (StatusCode::SERVICE_UNAVAILABLE, "STARTING").into_response()
                }
            }
        };

        let metrics_handler = move || {
            let handle = handle.clone();
            async move { handle.render() }
        };

        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler));

        info!(addr = %self.addr, "Starting metrics server");

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
