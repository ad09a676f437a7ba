//! Metrics recorded by the node service
//!
//! Recording goes through the `metrics` facade; nothing is exported unless the
//! binary installs a recorder.

use metrics::{counter, gauge, histogram};

/// Metric names as constants
pub mod names {
    // Request metrics
    pub const REQUESTS_TOTAL: &str = "chunkmesh_requests_total";
    pub const REQUESTS_IGNORED: &str = "chunkmesh_requests_ignored_total";
    pub const REQUEST_DURATION: &str = "chunkmesh_request_duration_seconds";

    // Replication metrics
    pub const REPLICATIONS_TOTAL: &str = "chunkmesh_replications_total";
    pub const REPLICATION_ROUNDS: &str = "chunkmesh_replication_rounds";

    // Network metrics
    pub const PEER_CALL_FAILURES: &str = "chunkmesh_peer_call_failures_total";
    pub const CONNECTIONS_ACTIVE: &str = "chunkmesh_connections_active";
}

/// Record a handled request of the given kind
pub fn record_request(kind: &'static str, duration_secs: f64) {
    counter!(names::REQUESTS_TOTAL, "kind" => kind).increment(1);
    histogram!(names::REQUEST_DURATION, "kind" => kind).record(duration_secs);
}

/// Record a message the node closed without answering
pub fn record_ignored(kind: &'static str) {
    counter!(names::REQUESTS_IGNORED, "kind" => kind).increment(1);
}

/// Record how a replication request ended
pub fn record_replication(outcome: &'static str) {
    counter!(names::REPLICATIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_replication_rounds(rounds: usize) {
    histogram!(names::REPLICATION_ROUNDS).record(rounds as f64);
}

/// Record a peer call that failed in transport
pub fn record_peer_failure() {
    counter!(names::PEER_CALL_FAILURES).increment(1);
}

/// Inbound connections currently being served by one node
pub fn set_active_connections(node: String, count: usize) {
    gauge!(names::CONNECTIONS_ACTIVE, "node" => node).set(count as f64);
}
