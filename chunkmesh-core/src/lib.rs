//! chunkmesh Core Library
//!
//! Core abstractions shared by every chunkmesh crate:
//! - MD5 content digests identifying files and chunks
//! - Fixed-size chunk arithmetic (counts, byte ranges, splitting)
//! - Common error handling

pub mod chunk;
pub mod digest;
pub mod error;

pub use chunk::{chunk_count, chunk_range, split_into_chunks};
pub use digest::{Digest, DIGEST_LEN};
pub use error::{MeshError, Result};

/// Chunk size constants
pub const MIN_CHUNK_SIZE: usize = 1;
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024; // 16 KB

/// Largest file the protocol can describe (sizes travel as u32)
pub const MAX_FILE_SIZE: usize = u32::MAX as usize;
