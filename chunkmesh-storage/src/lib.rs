//! chunkmesh Storage
//!
//! Every node keeps its files in a [`LocalStore`]: an in-memory map from
//! filename to content plus the chunk/digest metadata derived from it. Files
//! are immutable once stored; uploading an existing filename is a no-op.

pub mod store;

pub use store::{build_file_info, LocalStore, StoreStats};

use chunkmesh_core::{MeshError, Result, DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Size in bytes of every chunk except the last one of a file
    pub chunk_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl StorageConfig {
    /// Create a new storage config with the given chunk size
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    /// Set chunk size
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(MeshError::InvalidChunkSize(self.chunk_size));
        }
        Ok(())
    }
}
