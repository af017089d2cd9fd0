// rust/chunked-csv/src/dataset/planner.rs

use tracing::debug;

use crate::config::ChunkingConfig;
use crate::error::{Result, ReaderError};
use crate::storage::StorageReader;

use super::traits::{ChunkInfo, ChunkRange};

/// Byte that terminates every record.
pub const RECORD_TERMINATOR: u8 = b'\n';

/// Maps chunk ids to record-aligned byte ranges.
///
/// The file is cut at multiples of the nominal chunk size and every cut is
/// snapped backward to the byte after the nearest preceding terminator.
/// Chunk `id` therefore owns the records whose terminator lies in
/// `[id * chunk_size, (id + 1) * chunk_size)`, and the last chunk also owns
/// an unterminated trailing record. Boundaries are resolved lazily, one
/// chunk at a time, without scanning the whole file.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    file_size: u64,
    chunk_size: u64,
    probe_window: usize,
    total_chunks: u32,
}

impl ChunkPlanner {
    /// Creates a planner for a file of `file_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::Config` if the chunk size or probe window is
    /// zero, or the file would need more than `u32::MAX` chunks.
    pub fn new(file_size: u64, chunking: &ChunkingConfig) -> Result<Self> {
        chunking.validate()?;

        let total_chunks = file_size.div_ceil(chunking.chunk_size);
        let total_chunks = u32::try_from(total_chunks).map_err(|e| {
            ReaderError::config_with_source(
                format!(
                    "file of {file_size} bytes needs {total_chunks} chunks of {} bytes",
                    chunking.chunk_size
                ),
                e,
            )
        })?;

        Ok(Self {
            file_size,
            chunk_size: chunking.chunk_size,
            probe_window: chunking.probe_window,
            total_chunks,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn probe_window(&self) -> usize {
        self.probe_window
    }

    /// `ceil(file_size / chunk_size)`; zero for an empty file.
    pub fn chunk_count(&self) -> u32 {
        self.total_chunks
    }

    pub fn is_last(&self, chunk_id: u32) -> bool {
        chunk_id.checked_add(1) == Some(self.total_chunks)
    }

    /// Returns an error unless `chunk_id` names a chunk of this file.
    pub fn check_chunk_id(&self, chunk_id: u32) -> Result<()> {
        if chunk_id < self.total_chunks {
            Ok(())
        } else {
            Err(ReaderError::invalid_chunk(chunk_id, self.total_chunks))
        }
    }

    /// Nominal, unsnapped description of every chunk.
    pub fn chunk_infos(&self) -> Vec<ChunkInfo> {
        (0..self.total_chunks)
            .map(|id| ChunkInfo {
                id,
                nominal_start: u64::from(id) * self.chunk_size,
                nominal_end: self.span_end(id),
            })
            .collect()
    }

    /// End of the bytes a chunk read must cover: the nominal end of the
    /// chunk, or end-of-file for the last one.
    pub fn span_end(&self, chunk_id: u32) -> u64 {
        if self.is_last(chunk_id) {
            self.file_size
        } else {
            (u64::from(chunk_id) + 1) * self.chunk_size
        }
    }

    /// Resolves the first byte of a chunk.
    ///
    /// Chunk 0 starts at byte 0. Any other chunk starts right after the last
    /// terminator before its nominal start, found by reading backward in
    /// `probe_window` steps. The search only stops at the file start, so a
    /// very long record degrades to a backward linear scan.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::RecordTooLarge` if no terminator precedes the
    /// nominal start, and propagates read failures.
    pub fn resolve_start(&self, reader: &mut dyn StorageReader, chunk_id: u32) -> Result<u64> {
        self.check_chunk_id(chunk_id)?;
        if chunk_id == 0 {
            return Ok(0);
        }

        let nominal_start = u64::from(chunk_id) * self.chunk_size;
        match find_last_terminator(reader, nominal_start, self.probe_window)? {
            Some(position) => Ok(position + 1),
            None => Err(ReaderError::record_too_large(chunk_id)),
        }
    }

    /// Resolves the end of a chunk from the bytes `[start, span_end)`.
    ///
    /// The last chunk ends at end-of-file. Any other chunk is trimmed back
    /// to the last terminator inside the span.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::RecordTooLarge` if a non-final span holds no
    /// terminator.
    pub fn resolve_end(&self, chunk_id: u32, start: u64, span: &[u8]) -> Result<u64> {
        if self.is_last(chunk_id) {
            return Ok(start + span.len() as u64);
        }

        span.iter()
            .rposition(|&b| b == RECORD_TERMINATOR)
            .map(|index| start + index as u64 + 1)
            .ok_or_else(|| ReaderError::record_too_large(chunk_id))
    }

    /// Checks that every record of a resolved chunk fits the nominal size,
    /// terminator included.
    pub fn check_records(&self, chunk_id: u32, bytes: &[u8]) -> Result<()> {
        let oversized = bytes
            .split_inclusive(|&b| b == RECORD_TERMINATOR)
            .any(|record| record.len() as u64 > self.chunk_size);

        if oversized {
            Err(ReaderError::record_too_large(chunk_id))
        } else {
            Ok(())
        }
    }

    /// Resolves the exact byte range of one chunk.
    ///
    /// Reads the chunk's span once to find its end, so the cost is one
    /// backward probe plus one chunk-sized read.
    pub fn resolve_range(&self, reader: &mut dyn StorageReader, chunk_id: u32) -> Result<ChunkRange> {
        let start = self.resolve_start(reader, chunk_id)?;
        let span = read_span(reader, start, self.span_end(chunk_id))?;
        let end = self.resolve_end(chunk_id, start, &span)?;
        self.check_records(chunk_id, &span[..(end - start) as usize])?;

        Ok(ChunkRange {
            chunk_id,
            total_chunks: self.total_chunks,
            byte_start: start,
            byte_end: end,
        })
    }

    /// Resolves every chunk in order. This touches every byte of the file.
    pub fn plan(&self, reader: &mut dyn StorageReader) -> Result<Vec<ChunkRange>> {
        (0..self.total_chunks)
            .map(|chunk_id| self.resolve_range(reader, chunk_id))
            .collect()
    }
}

/// Reads `[start, end)` with a single seek and a single bounded read.
pub(crate) fn read_span(reader: &mut dyn StorageReader, start: u64, end: u64) -> Result<Vec<u8>> {
    if end <= start {
        return Ok(Vec::new());
    }
    reader.read_range(start, (end - start) as usize)
}

/// Finds the last terminator strictly before `end`.
///
/// Reads backward in `window`-sized steps until a terminator is found or
/// the file start is reached.
fn find_last_terminator(
    reader: &mut dyn StorageReader,
    end: u64,
    window: usize,
) -> Result<Option<u64>> {
    let mut cursor = end;
    let mut probes = 0u32;

    while cursor > 0 {
        let window_start = cursor.saturating_sub(window as u64);
        let data = reader.read_range(window_start, (cursor - window_start) as usize)?;
        probes += 1;

        if let Some(index) = data.iter().rposition(|&b| b == RECORD_TERMINATOR) {
            let position = window_start + index as u64;
            debug!(end, position, probes, "found record terminator");
            return Ok(Some(position));
        }

        cursor = window_start;
    }

    debug!(end, probes, "no record terminator before offset");
    Ok(None)
}
