// rust/chunked-csv/src/dataset/reader.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{ChunkingConfig, ReaderConfig, StreamSpec};
use crate::error::{Result, ReaderError};
use crate::storage::{LocalStorage, StorageBackend, StorageReader};

use super::chunk::{count_fields, parse_rows, Chunk};
use super::planner::{read_span, ChunkPlanner, RECORD_TERMINATOR};
use super::stream::{StreamDescriptor, StreamLayout};
use super::traits::{ChunkInfo, ChunkRange, ChunkState, DataDeserializer};

/// Reads a headerless numeric CSV file one record-aligned chunk at a time.
///
/// The reader owns a single open handle to the file until [`shutdown`] is
/// called or the reader is dropped. Chunks may be read in any order and any
/// number of times; each read resolves the chunk's boundaries, reads its
/// bytes once and parses them into a fresh [`Chunk`].
///
/// [`shutdown`]: ChunkReader::shutdown
pub struct ChunkReader {
    path: PathBuf,
    source: Option<Box<dyn StorageReader>>,
    planner: ChunkPlanner,
    layout: Arc<StreamLayout>,
    chunk_infos: Vec<ChunkInfo>,
    states: Vec<ChunkState>,
    /// Known chunk starts, indexed by chunk id. Has one extra slot for the
    /// position after the last chunk.
    anchors: Vec<Option<Anchor>>,
}

/// A byte offset together with the number of records before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Anchor {
    byte_start: u64,
    sequence_base: u64,
}

impl ChunkReader {
    /// Opens `path` through a storage backend.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::Storage` if the file cannot be opened,
    /// `ReaderError::Config` if the streams or chunking options are invalid
    /// or do not match the file's column count, and
    /// `ReaderError::RecordTooLarge` if the first record exceeds the chunk
    /// size.
    pub fn open(
        storage: &dyn StorageBackend,
        path: impl AsRef<Path>,
        streams: &[StreamSpec],
        chunking: &ChunkingConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let meta = storage.metadata(path)?;
        if meta.is_dir {
            return Err(ReaderError::storage(path, "expected a file, found a directory"));
        }

        let source = storage.open_read(path)?;
        Self::from_reader(path, source, streams, chunking)
    }

    /// Validates `config` and opens `path` on the local filesystem.
    pub fn from_config(config: &ReaderConfig, path: impl AsRef<Path>) -> Result<Self> {
        config.validate()?;
        let storage = LocalStorage::new(&config.storage)?;
        Self::open(&storage, path, &config.streams, &config.chunking)
    }

    /// Builds a reader over an already opened source.
    pub fn from_reader(
        path: impl Into<PathBuf>,
        mut source: Box<dyn StorageReader>,
        streams: &[StreamSpec],
        chunking: &ChunkingConfig,
    ) -> Result<Self> {
        let path = path.into();
        let layout = Arc::new(StreamLayout::new(streams)?);
        let planner = ChunkPlanner::new(source.size(), chunking)?;

        check_first_record(&planner, source.as_mut(), &layout)?;

        let chunk_count = planner.chunk_count() as usize;
        let mut anchors = vec![None; chunk_count + 1];
        anchors[0] = Some(Anchor::default());

        info!(
            path = %path.display(),
            file_size = planner.file_size(),
            chunk_size = planner.chunk_size(),
            chunk_count,
            columns = layout.total_columns(),
            "opened chunked CSV reader"
        );

        Ok(Self {
            path,
            source: Some(source),
            chunk_infos: planner.chunk_infos(),
            planner,
            layout,
            states: vec![ChunkState::Unparsed; chunk_count],
            anchors,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.planner.file_size()
    }

    pub fn chunk_count(&self) -> u32 {
        self.planner.chunk_count()
    }

    pub fn layout(&self) -> &StreamLayout {
        &self.layout
    }

    pub fn chunk_state(&self, chunk_id: u32) -> Option<ChunkState> {
        self.states.get(chunk_id as usize).copied()
    }

    /// Returns true until [`ChunkReader::shutdown`] has run.
    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Reads and parses one chunk.
    ///
    /// The chunk's rows carry global sequence ids that are contiguous with
    /// the neighbouring chunks regardless of the order chunks are read in.
    ///
    /// A read costs one backward probe for the start plus one span read of
    /// the chunk itself. The first time a chunk is reached without its
    /// predecessors, records are also counted forward from the nearest known
    /// chunk start; every chunk start crossed is remembered, so over any
    /// visiting order the file is counted at most once.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::Closed` after shutdown,
    /// `ReaderError::InvalidChunk` for an id outside `0..chunk_count()`,
    /// `ReaderError::RecordTooLarge` if a record does not fit the chunk
    /// size, `ReaderError::Parse` for malformed rows, and storage errors
    /// from the underlying reads. A failed chunk can be retried.
    pub fn read_chunk(&mut self, chunk_id: u32) -> Result<Chunk> {
        if self.source.is_none() {
            return Err(ReaderError::closed(&self.path));
        }
        self.planner.check_chunk_id(chunk_id)?;
        debug!(chunk_id, "chunk requested");

        match self.load(chunk_id) {
            Ok(chunk) => {
                let index = chunk_id as usize;
                if !matches!(self.states[index], ChunkState::Parsed { .. }) {
                    info!(
                        chunk_id,
                        rows = chunk.row_count(),
                        bytes = chunk.range().size(),
                        "parsed chunk"
                    );
                }
                self.states[index] = ChunkState::Parsed {
                    rows: chunk.row_count(),
                };
                Ok(chunk)
            }
            Err(e) => {
                warn!(chunk_id, error = %e, "failed to read chunk");
                self.states[chunk_id as usize] = ChunkState::Failed;
                Err(e)
            }
        }
    }

    fn load(&mut self, chunk_id: u32) -> Result<Chunk> {
        let source = self
            .source
            .as_deref_mut()
            .ok_or_else(|| ReaderError::closed(&self.path))?;

        let start = self.planner.resolve_start(source, chunk_id)?;
        let span = read_span(source, start, self.planner.span_end(chunk_id))?;
        let end = self.planner.resolve_end(chunk_id, start, &span)?;
        let bytes = &span[..(end - start) as usize];
        self.planner.check_records(chunk_id, bytes)?;

        let (values, rows) = parse_rows(chunk_id, start, bytes, self.layout.total_columns())?;

        let index = chunk_id as usize;
        let first_sequence_id = match self.anchors[index] {
            Some(anchor) => anchor.sequence_base,
            None => count_records_before(source, &self.planner, &mut self.anchors, index, start)?,
        };
        self.anchors[index] = Some(Anchor {
            byte_start: start,
            sequence_base: first_sequence_id,
        });
        self.anchors[index + 1] = Some(Anchor {
            byte_start: end,
            sequence_base: first_sequence_id + rows as u64,
        });

        debug!(
            chunk_id,
            byte_start = start,
            byte_end = end,
            rows,
            first_sequence_id,
            "resolved chunk"
        );

        let range = ChunkRange {
            chunk_id,
            total_chunks: self.planner.chunk_count(),
            byte_start: start,
            byte_end: end,
        };
        Ok(Chunk::new(
            range,
            first_sequence_id,
            rows,
            values,
            Arc::clone(&self.layout),
        ))
    }

    /// Resolves the byte range of one chunk without parsing it.
    pub fn resolve_range(&mut self, chunk_id: u32) -> Result<ChunkRange> {
        let source = self
            .source
            .as_deref_mut()
            .ok_or_else(|| ReaderError::closed(&self.path))?;
        self.planner.resolve_range(source, chunk_id)
    }

    /// Resolves the byte range of every chunk. Reads the whole file.
    pub fn plan(&mut self) -> Result<Vec<ChunkRange>> {
        let source = self
            .source
            .as_deref_mut()
            .ok_or_else(|| ReaderError::closed(&self.path))?;
        self.planner.plan(source)
    }

    /// Releases the file handle.
    ///
    /// Returns true if this call closed the reader, false if it was already
    /// closed. Later reads fail with `ReaderError::Closed`.
    pub fn shutdown(&mut self) -> bool {
        match self.source.take() {
            Some(source) => {
                drop(source);
                info!(path = %self.path.display(), "closed chunked CSV reader");
                true
            }
            None => false,
        }
    }
}

impl Drop for ChunkReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkReader")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("planner", &self.planner)
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}

impl DataDeserializer for ChunkReader {
    type Chunk = Chunk;

    fn stream_infos(&self) -> &[StreamDescriptor] {
        self.layout.streams()
    }

    fn chunk_infos(&self) -> &[ChunkInfo] {
        &self.chunk_infos
    }

    fn get_chunk(&mut self, chunk_id: u32) -> Result<Chunk> {
        self.read_chunk(chunk_id)
    }
}

/// Checks the first record against the stream layout.
///
/// Reads forward in probe windows, at most one chunk's worth of bytes. An
/// empty file has nothing to check.
fn check_first_record(
    planner: &ChunkPlanner,
    source: &mut dyn StorageReader,
    layout: &StreamLayout,
) -> Result<()> {
    let file_size = planner.file_size();
    if file_size == 0 {
        return Ok(());
    }

    let limit = file_size.min(planner.chunk_size());
    let window = planner.probe_window() as u64;
    let mut record = Vec::new();
    let mut offset = 0u64;
    let mut terminated = false;

    while offset < limit {
        let length = (limit - offset).min(window) as usize;
        let data = source.read_range(offset, length)?;
        if let Some(index) = data.iter().position(|&b| b == RECORD_TERMINATOR) {
            record.extend_from_slice(&data[..=index]);
            terminated = true;
            break;
        }
        record.extend_from_slice(&data);
        offset += length as u64;
    }

    if !terminated && file_size > planner.chunk_size() {
        return Err(ReaderError::record_too_large(0));
    }

    let columns = count_fields(&record)?;
    if columns != layout.total_columns() {
        return Err(ReaderError::config(format!(
            "streams declare {} columns but the first record has {columns}",
            layout.total_columns()
        )));
    }
    Ok(())
}

/// Counts the records before chunk `index`, which starts at `start`.
///
/// Scans forward from the nearest known chunk start below `index` and
/// records an anchor for every chunk start passed on the way. No record
/// terminator lies between a chunk's start and its nominal cut, so the
/// count at the cut is the count at the start.
fn count_records_before(
    reader: &mut dyn StorageReader,
    planner: &ChunkPlanner,
    anchors: &mut [Option<Anchor>],
    index: usize,
    start: u64,
) -> Result<u64> {
    let (from, origin) = anchors[..index]
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, anchor)| anchor.map(|anchor| (i, anchor)))
        .unwrap_or_default();

    let window = planner.probe_window() as u64;
    let mut count = origin.sequence_base;
    let mut last_terminator = None;
    let mut next = from + 1;
    let mut offset = origin.byte_start;

    while offset < start {
        let length = (start - offset).min(window) as usize;
        let data = reader.read_range(offset, length)?;
        let window_end = offset + length as u64;
        let mut scanned = 0;

        while next < index {
            let cut = (next as u64 * planner.chunk_size()).min(start);
            if cut > window_end {
                break;
            }
            let upto = (cut - offset) as usize;
            scan(&data[scanned..upto], offset + scanned as u64, &mut count, &mut last_terminator);
            scanned = upto;

            anchors[next] = Some(Anchor {
                byte_start: last_terminator.map_or(origin.byte_start, |p| p + 1),
                sequence_base: count,
            });
            next += 1;
        }

        scan(&data[scanned..], offset + scanned as u64, &mut count, &mut last_terminator);
        offset = window_end;
    }

    debug!(
        from_chunk = from,
        from_byte = origin.byte_start,
        end = start,
        count,
        "counted records before chunk"
    );
    Ok(count)
}

/// Adds the terminators in `data`, which begins at byte `offset`.
fn scan(data: &[u8], offset: u64, count: &mut u64, last_terminator: &mut Option<u64>) {
    *count += data.iter().filter(|&&b| b == RECORD_TERMINATOR).count() as u64;
    if let Some(index) = data.iter().rposition(|&b| b == RECORD_TERMINATOR) {
        *last_terminator = Some(offset + index as u64);
    }
}
