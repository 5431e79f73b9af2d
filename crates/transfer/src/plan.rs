use std::ops::Range;

use crate::DEFAULT_CHUNK_SIZE;

/// One contiguous byte range of the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position in the upload order.
    pub index: usize,
    /// Byte range `[start, end)` within the file.
    pub range: Range<u64>,
}

impl Chunk {
    /// Size of this chunk in bytes.
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }
}

/// Splits a file of known size into fixed-size chunks.
///
/// All chunks are exactly `chunk_size` bytes except the last one, which
/// holds the remainder. An empty file has zero chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
    total_chunks: usize,
}

impl ChunkPlan {
    /// Plans `file_size` bytes in chunks of `chunk_size`.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (5 MiB) is used.
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let total_chunks = file_size.div_ceil(chunk_size) as usize;
        Self {
            file_size,
            chunk_size,
            total_chunks,
        }
    }

    /// Number of chunks, `ceil(file_size / chunk_size)`.
    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    /// Byte range of chunk `index`, or `None` past the last chunk.
    pub fn range_of(&self, index: usize) -> Option<Range<u64>> {
        if index >= self.total_chunks {
            return None;
        }
        let start = index as u64 * self.chunk_size;
        let end = (start + self.chunk_size).min(self.file_size);
        Some(start..end)
    }

    /// Chunk descriptor for `index`, or `None` past the last chunk.
    pub fn chunk(&self, index: usize) -> Option<Chunk> {
        self.range_of(index).map(|range| Chunk { index, range })
    }

    /// All chunks in upload order.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.total_chunks).filter_map(|i| self.chunk(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn twelve_mib_in_five_mib_chunks() {
        let plan = ChunkPlan::new(12 * MIB, 5 * MIB);
        assert_eq!(plan.total_chunks(), 3);

        let sizes: Vec<u64> = plan.chunks().map(|c| c.size()).collect();
        assert_eq!(sizes, vec![5 * MIB, 5 * MIB, 2 * MIB]);
        assert_eq!(plan.range_of(2), Some(10 * MIB..12 * MIB));
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let plan = ChunkPlan::new(10, 5);
        assert_eq!(plan.total_chunks(), 2);
        assert_eq!(plan.range_of(0), Some(0..5));
        assert_eq!(plan.range_of(1), Some(5..10));
        assert_eq!(plan.range_of(2), None);
    }

    #[test]
    fn ranges_are_contiguous_and_cover_file() {
        for (size, chunk) in [(1u64, 1u64), (7, 3), (100, 7), (4096, 4096), (4097, 4096)] {
            let plan = ChunkPlan::new(size, chunk);
            let mut expected_start = 0;
            for c in plan.chunks() {
                assert_eq!(c.range.start, expected_start);
                assert!(c.size() > 0 && c.size() <= chunk);
                if c.index + 1 < plan.total_chunks() {
                    assert_eq!(c.size(), chunk);
                }
                expected_start = c.range.end;
            }
            assert_eq!(expected_start, size, "size={size} chunk={chunk}");
        }
    }

    #[test]
    fn empty_file_has_no_chunks() {
        let plan = ChunkPlan::new(0, 5 * MIB);
        assert_eq!(plan.total_chunks(), 0);
        assert_eq!(plan.chunks().count(), 0);
        assert!(plan.range_of(0).is_none());
    }

    #[test]
    fn zero_chunk_size_falls_back_to_default() {
        let plan = ChunkPlan::new(12 * MIB, 0);
        assert_eq!(plan.range_of(0), Some(0..DEFAULT_CHUNK_SIZE));
        assert_eq!(plan.total_chunks(), 3);
    }
}
