//! Error types for chunkmesh
//!
//! Provides a unified error type for all chunkmesh operations. Protocol-level
//! failures travel inside responses as a `Status`; these errors cover everything
//! that never crosses the wire.

use thiserror::Error;

/// Result type alias for chunkmesh operations
pub type Result<T> = std::result::Result<T, MeshError>;

/// Unified error type for chunkmesh
#[derive(Error, Debug)]
pub enum MeshError {
    // ===== Content Errors =====
    #[error("Invalid digest length: expected {expected}, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    #[error("File too large: {size} bytes (max: {max})")]
    FileTooLarge { size: usize, max: usize },

    // ===== Replication Errors =====
    #[error("The chunk from file {file_hash} cannot be found on any nodes")]
    ChunkNotFound { file_hash: String },

    #[error("Replication of {file_hash} gave up after {rounds} rounds with {pending} chunks pending")]
    ReplicationExhausted {
        file_hash: String,
        rounds: usize,
        pending: usize,
    },

    #[error("Replication part is missing its chunk index")]
    MissingChunkIndex,

    // ===== Wire Errors =====
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage {
        expected: &'static str,
        actual: &'static str,
    },

    // ===== Network Errors =====
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {after_ms} ms talking to {peer}")]
    Timeout { peer: String, after_ms: u64 },

    #[error("Hub rejected request: {0}")]
    Hub(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeshError {
    /// Whether the error happened while talking to another process.
    ///
    /// Callers map these onto `NETWORK_ERROR`.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MeshError::Io(_)
                | MeshError::Decode(_)
                | MeshError::Encode(_)
                | MeshError::FrameTooLarge { .. }
                | MeshError::UnexpectedMessage { .. }
                | MeshError::Network(_)
                | MeshError::Timeout { .. }
        )
    }

    /// Whether replication stopped because the subnet cannot supply the file
    pub fn is_chunk_unavailable(&self) -> bool {
        matches!(
            self,
            MeshError::ChunkNotFound { .. } | MeshError::ReplicationExhausted { .. }
        )
    }
}

impl From<prost::DecodeError> for MeshError {
    fn from(err: prost::DecodeError) -> Self {
        MeshError::Decode(err.to_string())
    }
}

impl From<prost::EncodeError> for MeshError {
    fn from(err: prost::EncodeError) -> Self {
        MeshError::Encode(err.to_string())
    }
}
