//! chunkmesh wire messages
//!
//! Field numbers are part of the protocol: never renumber an existing field,
//! only append new ones.

use chunkmesh_core::MeshError;
use std::fmt;

/// Outcome carried by every response
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    /// Malformed or invalid request
    MessageError = 1,
    /// Unexpected failure on the responder
    ProcessingError = 2,
    /// Well-formed request the responder cannot satisfy
    UnableToComplete = 3,
    /// The peer could not be reached. Only ever produced locally.
    NetworkError = 4,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::MessageError => write!(f, "MESSAGE_ERROR"),
            Self::ProcessingError => write!(f, "PROCESSING_ERROR"),
            Self::UnableToComplete => write!(f, "UNABLE_TO_COMPLETE"),
            Self::NetworkError => write!(f, "NETWORK_ERROR"),
        }
    }
}

/// Address of a node (or of the hub)
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct NodeId {
    #[prost(string, tag = "1")]
    pub host: String,
    #[prost(int32, tag = "2")]
    pub port: i32,
}

impl NodeId {
    pub fn new(host: impl Into<String>, port: i32) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkInfo {
    #[prost(uint32, tag = "1")]
    pub index: u32,
    #[prost(uint32, tag = "2")]
    pub size: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub hash: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileInfo {
    #[prost(string, tag = "1")]
    pub filename: String,
    #[prost(uint32, tag = "2")]
    pub size: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub hash: Vec<u8>,
    #[prost(message, repeated, tag = "4")]
    pub chunks: Vec<ChunkInfo>,
}

/* ---------------- Hub exchanges ---------------- */

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegistrationRequest {
    #[prost(string, tag = "1")]
    pub owner: String,
    #[prost(int32, tag = "2")]
    pub index: i32,
    #[prost(int32, tag = "3")]
    pub port: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegistrationResponse {
    #[prost(enumeration = "Status", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubnetRequest {
    #[prost(int32, tag = "1")]
    pub subnet_id: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubnetResponse {
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<NodeId>,
}

/* ---------------- Peer exchanges ---------------- */

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadRequest {
    #[prost(string, tag = "1")]
    pub filename: String,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UploadResponse {
    #[prost(enumeration = "Status", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
    #[prost(message, optional, tag = "3")]
    pub file_info: Option<FileInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LocalSearchRequest {
    #[prost(string, tag = "1")]
    pub regex: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LocalSearchResponse {
    #[prost(enumeration = "Status", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
    #[prost(message, repeated, tag = "3")]
    pub file_info: Vec<FileInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchRequest {
    #[prost(string, tag = "1")]
    pub regex: String,
    #[prost(int32, tag = "2")]
    pub subnet_id: i32,
}

/// Files one node reported for a distributed search
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeSearchResult {
    #[prost(message, optional, tag = "1")]
    pub node: Option<NodeId>,
    #[prost(enumeration = "Status", tag = "2")]
    pub status: i32,
    #[prost(string, tag = "3")]
    pub error_message: String,
    #[prost(message, repeated, tag = "4")]
    pub files: Vec<FileInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchResponse {
    #[prost(enumeration = "Status", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
    #[prost(message, repeated, tag = "3")]
    pub results: Vec<NodeSearchResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DownloadRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub file_hash: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DownloadResponse {
    #[prost(enumeration = "Status", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub file_hash: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub chunk_index: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkResponse {
    #[prost(enumeration = "Status", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReplicateRequest {
    #[prost(int32, tag = "1")]
    pub subnet_id: i32,
    #[prost(message, optional, tag = "2")]
    pub file_info: Option<FileInfo>,
}

/// Outcome of asking one node for one chunk during replication
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeReplicationStatus {
    #[prost(message, optional, tag = "1")]
    pub node: Option<NodeId>,
    #[prost(uint32, optional, tag = "2")]
    pub chunk_index: Option<u32>,
    #[prost(enumeration = "Status", tag = "3")]
    pub status: i32,
    #[prost(string, tag = "4")]
    pub error_message: String,
}

impl NodeReplicationStatus {
    pub fn new(node: NodeId, chunk_index: u32, status: Status, error_message: impl Into<String>) -> Self {
        Self {
            node: Some(node),
            chunk_index: Some(chunk_index),
            status: status as i32,
            error_message: error_message.into(),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReplicateResponse {
    #[prost(enumeration = "Status", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
    #[prost(message, repeated, tag = "3")]
    pub node_status_list: Vec<NodeReplicationStatus>,
}

/* ---------------- Envelope ---------------- */

/// Envelope for everything sent over a connection
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    #[prost(
        oneof = "message::Payload",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16"
    )]
    pub payload: Option<message::Payload>,
}

pub mod message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        RegistrationRequest(super::RegistrationRequest),
        #[prost(message, tag = "2")]
        RegistrationResponse(super::RegistrationResponse),
        #[prost(message, tag = "3")]
        SubnetRequest(super::SubnetRequest),
        #[prost(message, tag = "4")]
        SubnetResponse(super::SubnetResponse),
        #[prost(message, tag = "5")]
        LocalSearchRequest(super::LocalSearchRequest),
        #[prost(message, tag = "6")]
        LocalSearchResponse(super::LocalSearchResponse),
        #[prost(message, tag = "7")]
        SearchRequest(super::SearchRequest),
        #[prost(message, tag = "8")]
        SearchResponse(super::SearchResponse),
        #[prost(message, tag = "9")]
        UploadRequest(super::UploadRequest),
        #[prost(message, tag = "10")]
        UploadResponse(super::UploadResponse),
        #[prost(message, tag = "11")]
        DownloadRequest(super::DownloadRequest),
        #[prost(message, tag = "12")]
        DownloadResponse(super::DownloadResponse),
        #[prost(message, tag = "13")]
        ChunkRequest(super::ChunkRequest),
        #[prost(message, tag = "14")]
        ChunkResponse(super::ChunkResponse),
        #[prost(message, tag = "15")]
        ReplicateRequest(super::ReplicateRequest),
        #[prost(message, tag = "16")]
        ReplicateResponse(super::ReplicateResponse),
    }
}

impl Message {
    /// Name of the carried payload, `"none"` when it is missing or unknown
    pub fn kind(&self) -> &'static str {
        self.payload.as_ref().map_or("none", message::Payload::name)
    }
}

macro_rules! payload_conversions {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Message {
                fn from(inner: $variant) -> Self {
                    Message {
                        payload: Some(message::Payload::$variant(inner)),
                    }
                }
            }

            impl TryFrom<Message> for $variant {
                type Error = MeshError;

                fn try_from(msg: Message) -> Result<Self, Self::Error> {
                    match msg.payload {
                        Some(message::Payload::$variant(inner)) => Ok(inner),
                        other => Err(MeshError::UnexpectedMessage {
                            expected: stringify!($variant),
                            actual: other.as_ref().map_or("none", message::Payload::name),
                        }),
                    }
                }
            }
        )*

        impl message::Payload {
            pub fn name(&self) -> &'static str {
                match self {
                    $(message::Payload::$variant(_) => stringify!($variant),)*
                }
            }
        }
    };
}

payload_conversions!(
    RegistrationRequest,
    RegistrationResponse,
    SubnetRequest,
    SubnetResponse,
    LocalSearchRequest,
    LocalSearchResponse,
    SearchRequest,
    SearchResponse,
    UploadRequest,
    UploadResponse,
    DownloadRequest,
    DownloadResponse,
    ChunkRequest,
    ChunkResponse,
    ReplicateRequest,
    ReplicateResponse,
);

macro_rules! status_responses {
    ($($response:ident),* $(,)?) => {
        $(
            impl $response {
                /// Response carrying only a status and its message
                pub fn failure(status: Status, error_message: impl Into<String>) -> Self {
                    Self {
                        status: status as i32,
                        error_message: error_message.into(),
                        ..Default::default()
                    }
                }

                pub fn is_success(&self) -> bool {
                    self.status() == Status::Success
                }
            }
        )*
    };
}

status_responses!(
    RegistrationResponse,
    UploadResponse,
    LocalSearchResponse,
    SearchResponse,
    DownloadResponse,
    ChunkResponse,
    ReplicateResponse,
);

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;

    fn round_trip(msg: Message) {
        let bytes = msg.encode_to_vec();
        let decoded = Message::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_typed_extraction() {
        let msg: Message = ChunkRequest {
            file_hash: vec![1; 16],
            chunk_index: 3,
        }
        .into();
        assert_eq!(msg.kind(), "ChunkRequest");

        let req = ChunkRequest::try_from(msg.clone()).unwrap();
        assert_eq!(req.chunk_index, 3);

        let err = ChunkResponse::try_from(msg).unwrap_err();
        assert!(matches!(
            err,
            MeshError::UnexpectedMessage {
                expected: "ChunkResponse",
                actual: "ChunkRequest"
            }
        ));
    }

    #[test]
    fn test_empty_envelope() {
        let msg = Message::default();
        assert_eq!(msg.kind(), "none");
        assert!(msg.encode_to_vec().is_empty());
        round_trip(msg);
    }

    #[test]
    fn test_zero_length_payloads_round_trip() {
        round_trip(UploadRequest::default().into());
        round_trip(SubnetRequest::default().into());
        round_trip(DownloadResponse::default().into());
        round_trip(ReplicateResponse::default().into());
    }

    #[test]
    fn test_status_accessors() {
        let response = ChunkResponse::failure(Status::UnableToComplete, "missing");
        assert_eq!(response.status(), Status::UnableToComplete);
        assert!(!response.is_success());
        assert_eq!(response.error_message, "missing");
        assert!(response.data.is_empty());

        assert!(ChunkResponse::default().is_success());
    }

    #[test]
    fn test_replication_status_index_is_optional() {
        let status = NodeReplicationStatus::new(NodeId::new("127.0.0.1", 5001), 0, Status::Success, "");
        let decoded = NodeReplicationStatus::decode(status.encode_to_vec().as_slice()).unwrap();
        // index 0 must survive the round trip as present, not absent
        assert_eq!(decoded.chunk_index, Some(0));

        let without = NodeReplicationStatus::default();
        let decoded = NodeReplicationStatus::decode(without.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.chunk_index, None);
    }

    #[test]
    fn test_node_id_display() {
        let node = NodeId::new("10.0.0.2", 5003);
        assert_eq!(node.to_string(), "10.0.0.2:5003");
        assert_eq!(node.address(), "10.0.0.2:5003");
        assert_eq!(node, NodeId::new("10.0.0.2", 5003));
        assert_ne!(node, NodeId::new("10.0.0.3", 5003));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(Status::UnableToComplete.to_string(), "UNABLE_TO_COMPLETE");
        assert_eq!(Status::try_from(4).unwrap(), Status::NetworkError);
    }
}
