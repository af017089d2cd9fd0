// rust/chunked-csv/src/dataset/traits.rs

use crate::error::Result;

use super::stream::StreamDescriptor;

/// Record-aligned byte range owned by one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub chunk_id: u32,
    pub total_chunks: u32,
    pub byte_start: u64,
    pub byte_end: u64,
}

impl ChunkRange {
    /// Returns the size of this chunk in bytes
    pub fn size(&self) -> u64 {
        self.byte_end.saturating_sub(self.byte_start)
    }
}

/// Chunk description known before any chunk is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub id: u32,
    /// `id * chunk_size`, before snapping to a record boundary.
    pub nominal_start: u64,
    /// Nominal end, clamped to the file size.
    pub nominal_end: u64,
}

/// Per-row metadata handed to the minibatch loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceInfo {
    pub index_in_chunk: usize,
    /// Always 1: a row is a sequence of a single sample.
    pub number_of_samples: u32,
    pub chunk_id: u32,
    /// Global sequence id, contiguous across chunks in file order.
    pub id: u64,
}

/// Lifecycle of a chunk as seen by the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChunkState {
    #[default]
    Unparsed,
    Parsed {
        rows: usize,
    },
    Failed,
}

/// A loaded chunk that exposes its rows as sequences.
pub trait SequenceChunk {
    fn chunk_id(&self) -> u32;

    /// Number of sequences (rows) in this chunk.
    fn sequence_count(&self) -> usize;

    /// Metadata for every sequence, in row order.
    fn sequence_infos(&self) -> Vec<SequenceInfo>;

    /// Per-stream slices of the sequence at `index`, in stream order.
    ///
    /// # Panics
    ///
    /// Panics if `index >= sequence_count()`.
    fn sequence(&self, index: usize) -> Vec<&[f32]>;
}

/// The data source contract consumed by a minibatch loader.
///
/// Streams and chunk descriptions are fixed at construction; chunks are
/// produced on demand, one call per chunk.
pub trait DataDeserializer {
    type Chunk: SequenceChunk;

    fn stream_infos(&self) -> &[StreamDescriptor];

    fn chunk_infos(&self) -> &[ChunkInfo];

    /// Loads the chunk with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk id is out of range or the chunk cannot
    /// be read or parsed.
    fn get_chunk(&mut self, chunk_id: u32) -> Result<Self::Chunk>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_range_size() {
        let range = ChunkRange {
            chunk_id: 0,
            total_chunks: 4,
            byte_start: 100,
            byte_end: 250,
        };
        assert_eq!(range.size(), 150);

        let empty = ChunkRange {
            chunk_id: 0,
            total_chunks: 1,
            byte_start: 100,
            byte_end: 100,
        };
        assert_eq!(empty.size(), 0);
    }

    #[test]
    fn test_chunk_state_default() {
        assert_eq!(ChunkState::default(), ChunkState::Unparsed);
    }
}
