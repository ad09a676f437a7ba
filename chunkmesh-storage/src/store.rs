//! In-memory chunk store
//!
//! Holds whole files keyed by filename. Chunks are never stored separately;
//! they are sliced out of the file content on demand.

use crate::StorageConfig;
use chunkmesh_core::{
    chunk_range, split_into_chunks, Digest, MeshError, Result, MAX_FILE_SIZE,
};
use chunkmesh_protocol::{
    ChunkInfo, ChunkResponse, DownloadResponse, FileInfo, LocalSearchResponse,
    NodeReplicationStatus, ReplicateResponse, Status, UploadResponse,
};
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

struct StoredFile {
    info: FileInfo,
    data: Vec<u8>,
}

#[derive(Default)]
struct Inner {
    files: HashMap<String, StoredFile>,
    /// Digest of the content to the first filename stored with it
    by_hash: HashMap<Digest, String>,
}

impl Inner {
    fn find_by_hash(&self, hash: &Digest) -> Option<&StoredFile> {
        self.by_hash
            .get(hash)
            .and_then(|filename| self.files.get(filename))
    }
}

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub file_count: u64,
    pub bytes_stored: u64,
    pub uploads: u64,
    pub chunk_reads: u64,
}

/// Files held by one node
pub struct LocalStore {
    inner: RwLock<Inner>,
    chunk_size: usize,

    /// Operation counters
    uploads: AtomicU64,
    chunk_reads: AtomicU64,
}

impl LocalStore {
    /// Create an empty store
    pub fn new(config: StorageConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: RwLock::new(Inner::default()),
            chunk_size: config.chunk_size,
            uploads: AtomicU64::new(0),
            chunk_reads: AtomicU64::new(0),
        })
    }

    /// Create an empty store with the given chunk size
    pub fn with_chunk_size(chunk_size: usize) -> Result<Self> {
        Self::new(StorageConfig::new(chunk_size))
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Store `data` under `filename` unless that name is already taken.
    ///
    /// Either way the response carries the metadata of what is stored.
    pub fn upload(&self, filename: &str, data: Vec<u8>) -> UploadResponse {
        if filename.is_empty() {
            return UploadResponse::failure(Status::MessageError, "Filename must not be empty");
        }

        if let Some(existing) = self.inner.read().files.get(filename) {
            debug!(filename, "File already stored, keeping existing content");
            return uploaded(existing.info.clone());
        }

        let info = match build_file_info(filename, &data, self.chunk_size) {
            Ok(info) => info,
            Err(e) => return UploadResponse::failure(Status::ProcessingError, e.to_string()),
        };
        let hash = match Digest::from_slice(&info.hash) {
            Ok(hash) => hash,
            Err(e) => return UploadResponse::failure(Status::ProcessingError, e.to_string()),
        };

        let mut inner = self.inner.write();
        // Re-check under the write lock: another upload may have won the race
        if let Some(existing) = inner.files.get(filename) {
            return uploaded(existing.info.clone());
        }

        inner
            .by_hash
            .entry(hash)
            .or_insert_with(|| filename.to_string());
        inner.files.insert(
            filename.to_string(),
            StoredFile {
                info: info.clone(),
                data,
            },
        );
        self.uploads.fetch_add(1, Ordering::Relaxed);

        debug!(
            filename,
            hash = %hash,
            size = info.size,
            chunks = info.chunks.len(),
            "Stored file"
        );

        uploaded(info)
    }

    /// Metadata of every stored file whose name matches `pattern`
    pub fn search_local(&self, pattern: &str) -> LocalSearchResponse {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(e) => {
                return LocalSearchResponse::failure(
                    Status::MessageError,
                    format!("Invalid regex '{}': {}", pattern, e),
                )
            }
        };

        let mut file_info: Vec<FileInfo> = self
            .inner
            .read()
            .files
            .iter()
            .filter(|(name, _)| regex.is_match(name))
            .map(|(_, stored)| stored.info.clone())
            .collect();
        file_info.sort_by(|a, b| a.filename.cmp(&b.filename));

        LocalSearchResponse {
            status: Status::Success as i32,
            error_message: String::new(),
            file_info,
        }
    }

    /// Full content of the file with the given digest
    pub fn download_by_hash(&self, hash: &[u8]) -> DownloadResponse {
        let hash = match Digest::from_slice(hash) {
            Ok(hash) => hash,
            Err(e) => return DownloadResponse::failure(Status::MessageError, e.to_string()),
        };

        match self.inner.read().find_by_hash(&hash) {
            Some(stored) => DownloadResponse {
                status: Status::Success as i32,
                error_message: String::new(),
                data: stored.data.clone(),
            },
            None => DownloadResponse::failure(
                Status::UnableToComplete,
                format!("No file with hash {}", hash.to_hex()),
            ),
        }
    }

    /// One chunk of the file with the given digest
    pub fn get_chunk(&self, hash: &[u8], index: u32) -> ChunkResponse {
        let hash = match Digest::from_slice(hash) {
            Ok(hash) => hash,
            Err(e) => return ChunkResponse::failure(Status::MessageError, e.to_string()),
        };

        let inner = self.inner.read();
        let Some(stored) = inner.find_by_hash(&hash) else {
            return ChunkResponse::failure(
                Status::UnableToComplete,
                format!("No file with hash {}", hash.to_hex()),
            );
        };

        let Some(range) = chunk_range(stored.data.len(), self.chunk_size, index as usize) else {
            return ChunkResponse::failure(
                Status::UnableToComplete,
                format!(
                    "File {} has no chunk {} ({} chunks)",
                    hash.to_hex(),
                    index,
                    stored.info.chunks.len()
                ),
            );
        };

        self.chunk_reads.fetch_add(1, Ordering::Relaxed);
        ChunkResponse {
            status: Status::Success as i32,
            error_message: String::new(),
            data: stored.data[range].to_vec(),
        }
    }

    /// Assemble fetched chunks into a file and store it.
    ///
    /// `parts` may arrive in any order; each status must name its chunk index.
    pub fn reconstruct(
        &self,
        mut parts: Vec<(NodeReplicationStatus, ChunkResponse)>,
        file_info: &FileInfo,
    ) -> ReplicateResponse {
        if parts.iter().any(|(status, _)| status.chunk_index.is_none()) {
            return ReplicateResponse {
                status: Status::ProcessingError as i32,
                error_message: MeshError::MissingChunkIndex.to_string(),
                node_status_list: parts.into_iter().map(|(status, _)| status).collect(),
            };
        }
        parts.sort_by_key(|(status, _)| status.chunk_index);

        let total: usize = parts.iter().map(|(_, chunk)| chunk.data.len()).sum();
        let mut data = Vec::with_capacity(total);
        let mut node_status_list = Vec::with_capacity(parts.len());
        for (status, chunk) in parts {
            data.extend_from_slice(&chunk.data);
            node_status_list.push(status);
        }

        if Digest::compute(&data).as_bytes().as_slice() != file_info.hash.as_slice() {
            warn!(
                filename = %file_info.filename,
                "Reassembled content does not match the advertised hash"
            );
        }

        // the per-node statuses are reported whether or not the store succeeds
        let stored = self.upload(&file_info.filename, data);
        ReplicateResponse {
            status: stored.status,
            error_message: stored.error_message,
            node_status_list,
        }
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.inner.read().files.contains_key(filename)
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            file_count: inner.files.len() as u64,
            bytes_stored: inner.files.values().map(|f| f.data.len() as u64).sum(),
            uploads: self.uploads.load(Ordering::Relaxed),
            chunk_reads: self.chunk_reads.load(Ordering::Relaxed),
        }
    }
}

fn uploaded(info: FileInfo) -> UploadResponse {
    UploadResponse {
        status: Status::Success as i32,
        error_message: String::new(),
        file_info: Some(info),
    }
}

/// Describe `data` as a file cut into `chunk_size` chunks
pub fn build_file_info(filename: &str, data: &[u8], chunk_size: usize) -> Result<FileInfo> {
    if data.len() > MAX_FILE_SIZE {
        return Err(MeshError::FileTooLarge {
            size: data.len(),
            max: MAX_FILE_SIZE,
        });
    }

    let chunks = split_into_chunks(data, chunk_size)?
        .into_iter()
        .map(|(index, chunk)| ChunkInfo {
            index,
            // bounded by the file size check above
            size: chunk.len() as u32,
            hash: Digest::compute(chunk).to_vec(),
        })
        .collect();

    Ok(FileInfo {
        filename: filename.to_string(),
        size: data.len() as u32,
        hash: Digest::compute(data).to_vec(),
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkmesh_protocol::NodeId;
    use proptest::prelude::*;

    fn store(chunk_size: usize) -> LocalStore {
        LocalStore::with_chunk_size(chunk_size).unwrap()
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(matches!(
            LocalStore::with_chunk_size(0),
            Err(MeshError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn test_upload_describes_chunks() {
        let store = store(4);
        let response = store.upload("a.txt", b"0123456789".to_vec());
        assert!(response.is_success());

        let info = response.file_info.unwrap();
        assert_eq!(info.filename, "a.txt");
        assert_eq!(info.size, 10);
        assert_eq!(info.hash, Digest::compute(b"0123456789").to_vec());

        let sizes: Vec<u32> = info.chunks.iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(info.chunks[2].index, 2);
        assert_eq!(info.chunks[2].hash, Digest::compute(b"89").to_vec());
    }

    #[test]
    fn test_upload_is_store_once() {
        let store = store(4);
        let first = store.upload("a.txt", b"first".to_vec()).file_info.unwrap();
        let second = store.upload("a.txt", b"second".to_vec());

        assert!(second.is_success());
        assert_eq!(second.file_info.unwrap(), first);
        assert_eq!(store.stats().file_count, 1);
        assert_eq!(store.stats().uploads, 1);

        let content = store.download_by_hash(&first.hash);
        assert_eq!(content.data, b"first");
    }

    #[test]
    fn test_upload_rejects_empty_filename() {
        let response = store(4).upload("", b"data".to_vec());
        assert_eq!(response.status(), Status::MessageError);
        assert!(response.file_info.is_none());
    }

    #[test]
    fn test_upload_empty_content() {
        let store = store(4);
        let info = store.upload("empty", Vec::new()).file_info.unwrap();
        assert_eq!(info.size, 0);
        assert!(info.chunks.is_empty());
        assert_eq!(info.hash, Digest::compute(b"").to_vec());

        let content = store.download_by_hash(&info.hash);
        assert!(content.is_success());
        assert!(content.data.is_empty());
    }

    #[test]
    fn test_search_local() {
        let store = store(4);
        store.upload("banana", b"b".to_vec());
        store.upload("apple", b"a".to_vec());
        store.upload("avocado", b"c".to_vec());

        let response = store.search_local("^a");
        assert!(response.is_success());
        let names: Vec<&str> = response.file_info.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["apple", "avocado"]);

        // unanchored by default
        let response = store.search_local("nan");
        assert_eq!(response.file_info.len(), 1);

        let response = store.search_local("^z");
        assert!(response.is_success());
        assert!(response.file_info.is_empty());
    }

    #[test]
    fn test_search_local_invalid_regex() {
        let response = store(4).search_local("[unclosed");
        assert_eq!(response.status(), Status::MessageError);
        assert!(response.error_message.contains("[unclosed"));
        assert!(response.file_info.is_empty());
    }

    #[test]
    fn test_download_boundaries() {
        let store = store(4);
        store.upload("a", b"content".to_vec());

        let short = store.download_by_hash(&[0u8; 15]);
        assert_eq!(short.status(), Status::MessageError);

        let unknown = store.download_by_hash(&[0u8; 16]);
        assert_eq!(unknown.status(), Status::UnableToComplete);
    }

    #[test]
    fn test_get_chunk_boundaries() {
        let store = store(4);
        let info = store.upload("a", b"0123456789".to_vec()).file_info.unwrap();

        assert_eq!(store.get_chunk(&info.hash, 0).data, b"0123");
        assert_eq!(store.get_chunk(&info.hash, 2).data, b"89");

        let past_end = store.get_chunk(&info.hash, 3);
        assert_eq!(past_end.status(), Status::UnableToComplete);

        let bad_hash = store.get_chunk(&info.hash[..15], 0);
        assert_eq!(bad_hash.status(), Status::MessageError);

        let unknown = store.get_chunk(&[7u8; 16], 0);
        assert_eq!(unknown.status(), Status::UnableToComplete);
    }

    fn part(index: Option<u32>, data: &[u8]) -> (NodeReplicationStatus, ChunkResponse) {
        let mut status = NodeReplicationStatus::new(
            NodeId::new("127.0.0.1", 5001),
            0,
            Status::Success,
            "",
        );
        status.chunk_index = index;
        let chunk = ChunkResponse {
            data: data.to_vec(),
            ..Default::default()
        };
        (status, chunk)
    }

    #[test]
    fn test_reconstruct_orders_parts() {
        let source = store(4);
        let info = source.upload("f", b"0123456789".to_vec()).file_info.unwrap();

        let target = store(4);
        let response = target.reconstruct(
            vec![
                part(Some(2), b"89"),
                part(Some(0), b"0123"),
                part(Some(1), b"4567"),
            ],
            &info,
        );
        assert!(response.is_success());

        let indices: Vec<Option<u32>> = response
            .node_status_list
            .iter()
            .map(|s| s.chunk_index)
            .collect();
        assert_eq!(indices, vec![Some(0), Some(1), Some(2)]);

        assert!(target.contains("f"));
        assert_eq!(target.download_by_hash(&info.hash).data, b"0123456789");
    }

    #[test]
    fn test_reconstruct_keeps_existing_file() {
        let target = store(4);
        let original = target.upload("f", b"local".to_vec()).file_info.unwrap();

        let remote = build_file_info("f", b"remote", 4).unwrap();
        let response = target.reconstruct(vec![part(Some(0), b"remo"), part(Some(1), b"te")], &remote);
        assert!(response.is_success());
        assert_eq!(target.download_by_hash(&original.hash).data, b"local");
        assert_eq!(target.download_by_hash(&remote.hash).status(), Status::UnableToComplete);
    }

    #[test]
    fn test_reconstruct_missing_index() {
        let target = store(4);
        let info = build_file_info("f", b"0123", 4).unwrap();
        let response = target.reconstruct(vec![part(None, b"0123")], &info);
        assert_eq!(response.status(), Status::ProcessingError);
        assert_eq!(response.node_status_list.len(), 1);
        assert!(!target.contains("f"));
    }

    #[test]
    fn test_reconstruct_failure_keeps_node_statuses() {
        let target = store(4);
        let info = build_file_info("", b"012345", 4).unwrap();
        let parts = vec![part(Some(1), b"45"), part(Some(0), b"0123")];
        let response = target.reconstruct(parts, &info);

        assert_eq!(response.status(), Status::MessageError);
        let indices: Vec<Option<u32>> = response
            .node_status_list
            .iter()
            .map(|s| s.chunk_index)
            .collect();
        assert_eq!(indices, vec![Some(0), Some(1)]);
        assert_eq!(target.stats().file_count, 0);
    }

    #[test]
    fn test_same_content_under_two_names() {
        let store = store(4);
        let first = store.upload("first.txt", b"same bytes".to_vec()).file_info.unwrap();
        let second = store.upload("second.txt", b"same bytes".to_vec()).file_info.unwrap();

        assert_eq!(first.hash, second.hash);
        assert_eq!(first.chunks, second.chunks);
        assert_eq!(store.stats().file_count, 2);

        // the digest resolves to whichever name was stored first
        assert_eq!(store.download_by_hash(&first.hash).data, b"same bytes");
        assert_eq!(store.get_chunk(&second.hash, 2).data, b"es");
        let names: Vec<String> = store
            .search_local("txt$")
            .file_info
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(names, vec!["first.txt", "second.txt"]);
    }

    proptest! {
        #[test]
        fn prop_chunks_reassemble(data in proptest::collection::vec(any::<u8>(), 0..600), chunk_size in 1usize..64) {
            let store = LocalStore::with_chunk_size(chunk_size).unwrap();
            let info = store.upload("f", data.clone()).file_info.unwrap();

            prop_assert_eq!(info.chunks.len(), data.len().div_ceil(chunk_size));
            let mut joined = Vec::new();
            for chunk in &info.chunks {
                let response = store.get_chunk(&info.hash, chunk.index);
                prop_assert!(response.is_success());
                prop_assert_eq!(response.data.len() as u32, chunk.size);
                prop_assert_eq!(Digest::compute(&response.data).to_vec(), chunk.hash.clone());
                joined.extend(response.data);
            }
            prop_assert_eq!(joined, data);
        }
    }
}
