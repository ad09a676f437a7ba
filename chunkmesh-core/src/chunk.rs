//! Chunk arithmetic
//!
//! Files are cut into fixed-size chunks; only the last one may be shorter.
//! Chunk `i` of a file of length `len` covers the bytes
//! `[i * chunk_size, min(len, (i + 1) * chunk_size))`.

use crate::error::{MeshError, Result};
use std::ops::Range;

/// Number of chunks needed for `len` bytes (zero for an empty file)
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    len.div_ceil(chunk_size)
}

/// Byte range of chunk `index`, or `None` if the index is past the end
pub fn chunk_range(len: usize, chunk_size: usize, index: usize) -> Option<Range<usize>> {
    if index >= chunk_count(len, chunk_size) {
        return None;
    }
    let start = index * chunk_size;
    let end = len.min(start + chunk_size);
    Some(start..end)
}

/// Split `data` into `(index, bytes)` pairs
pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Result<Vec<(u32, &[u8])>> {
    if chunk_size == 0 {
        return Err(MeshError::InvalidChunkSize(chunk_size));
    }

    data.chunks(chunk_size)
        .enumerate()
        .map(|(index, chunk)| {
            let index = u32::try_from(index).map_err(|_| {
                MeshError::Internal(format!("chunk index {} does not fit in u32", index))
            })?;
            Ok((index, chunk))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0, 4), 0);
        assert_eq!(chunk_count(1, 4), 1);
        assert_eq!(chunk_count(4, 4), 1);
        assert_eq!(chunk_count(5, 4), 2);
        assert_eq!(chunk_count(12, 4), 3);
    }

    #[test]
    fn test_chunk_range_last_chunk_is_short() {
        assert_eq!(chunk_range(10, 4, 0), Some(0..4));
        assert_eq!(chunk_range(10, 4, 1), Some(4..8));
        assert_eq!(chunk_range(10, 4, 2), Some(8..10));
        assert_eq!(chunk_range(10, 4, 3), None);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = split_into_chunks(b"data", 0);
        assert!(matches!(result, Err(MeshError::InvalidChunkSize(0))));
    }

    #[test]
    fn test_empty_input_has_no_chunks() {
        let chunks = split_into_chunks(b"", 8).unwrap();
        assert!(chunks.is_empty());
    }

    proptest! {
        #[test]
        fn prop_split_reassembles(data in proptest::collection::vec(any::<u8>(), 0..2048), chunk_size in 1usize..300) {
            let chunks = split_into_chunks(&data, chunk_size).unwrap();
            prop_assert_eq!(chunks.len(), chunk_count(data.len(), chunk_size));

            let total: usize = chunks.iter().map(|(_, c)| c.len()).sum();
            prop_assert_eq!(total, data.len());

            for (i, (index, chunk)) in chunks.iter().enumerate() {
                prop_assert_eq!(*index as usize, i);
                if i + 1 < chunks.len() {
                    prop_assert_eq!(chunk.len(), chunk_size);
                }
                let range = chunk_range(data.len(), chunk_size, i).unwrap();
                prop_assert_eq!(&data[range], *chunk);
            }

            let joined: Vec<u8> = chunks.iter().flat_map(|(_, c)| c.iter().copied()).collect();
            prop_assert_eq!(joined, data);
        }
    }
}
