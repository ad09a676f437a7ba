//! chunkmesh Protocol Definitions
//!
//! Protocol Buffers messages exchanged between nodes, and between a node and
//! the hub. The schema is fixed here with `prost` derives so the field numbers
//! are part of the source rather than a build step.
//!
//! # Exchanges
//! - Hub: `RegistrationRequest`, `SubnetRequest`
//! - Peer: `UploadRequest`, `LocalSearchRequest`, `SearchRequest`,
//!   `DownloadRequest`, `ChunkRequest`, `ReplicateRequest`
//!
//! Every exchange is wrapped in a [`Message`] whose `payload` oneof carries
//! exactly one request or response.

pub mod messages;

pub use messages::message::Payload;
pub use messages::{
    ChunkInfo, ChunkRequest, ChunkResponse, DownloadRequest, DownloadResponse, FileInfo,
    LocalSearchRequest, LocalSearchResponse, Message, NodeId, NodeReplicationStatus,
    NodeSearchResult, RegistrationRequest, RegistrationResponse, ReplicateRequest,
    ReplicateResponse, SearchRequest, SearchResponse, Status, SubnetRequest, SubnetResponse,
    UploadRequest, UploadResponse,
};
