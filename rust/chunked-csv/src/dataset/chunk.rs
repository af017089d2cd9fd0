// rust/chunked-csv/src/dataset/chunk.rs

use std::sync::Arc;

use crate::error::{Result, ReaderError};

use super::planner::RECORD_TERMINATOR;
use super::stream::{StreamDescriptor, StreamLayout};
use super::traits::{ChunkRange, SequenceChunk, SequenceInfo};

/// The parsed rows of one chunk.
///
/// Values are stored row-major, `columns` per row; stream fields are
/// slices into that buffer. A chunk owns its data and is never shared with
/// another chunk id.
#[derive(Debug, Clone)]
pub struct Chunk {
    range: ChunkRange,
    first_sequence_id: u64,
    rows: usize,
    values: Vec<f32>,
    layout: Arc<StreamLayout>,
}

impl Chunk {
    pub(crate) fn new(
        range: ChunkRange,
        first_sequence_id: u64,
        rows: usize,
        values: Vec<f32>,
        layout: Arc<StreamLayout>,
    ) -> Self {
        debug_assert_eq!(values.len(), rows * layout.total_columns());
        Self {
            range,
            first_sequence_id,
            rows,
            values,
            layout,
        }
    }

    pub fn id(&self) -> u32 {
        self.range.chunk_id
    }

    /// Record-aligned byte range this chunk was parsed from.
    pub fn range(&self) -> ChunkRange {
        self.range
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Global sequence id of row 0.
    pub fn first_sequence_id(&self) -> u64 {
        self.first_sequence_id
    }

    /// All columns of a row.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range.
    pub fn row(&self, row: usize) -> &[f32] {
        self.assert_row(row);
        let columns = self.layout.total_columns();
        &self.values[row * columns..(row + 1) * columns]
    }

    /// The slice of `stream` within `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range or `stream` is not part of this
    /// chunk's layout.
    pub fn row_fields(&self, row: usize, stream: &StreamDescriptor) -> &[f32] {
        let fields = &self.row(row)[self.layout.columns(stream.index())];
        debug_assert_eq!(fields.len(), stream.element_count());
        fields
    }

    /// The slice of the stream called `name` within `row`, if it exists.
    pub fn field(&self, row: usize, name: &str) -> Option<&[f32]> {
        let stream = self.layout.stream(name)?;
        Some(self.row_fields(row, stream))
    }

    fn assert_row(&self, row: usize) {
        assert!(
            row < self.rows,
            "row {row} out of range for chunk {} with {} rows",
            self.range.chunk_id,
            self.rows
        );
    }
}

impl SequenceChunk for Chunk {
    fn chunk_id(&self) -> u32 {
        self.range.chunk_id
    }

    fn sequence_count(&self) -> usize {
        self.rows
    }

    fn sequence_infos(&self) -> Vec<SequenceInfo> {
        (0..self.rows)
            .map(|index_in_chunk| SequenceInfo {
                index_in_chunk,
                number_of_samples: 1,
                chunk_id: self.range.chunk_id,
                id: self.first_sequence_id + index_in_chunk as u64,
            })
            .collect()
    }

    fn sequence(&self, index: usize) -> Vec<&[f32]> {
        let row = self.row(index);
        (0..self.layout.streams().len())
            .map(|stream| &row[self.layout.columns(stream)])
            .collect()
    }
}

/// Parses the bytes of one chunk into row-major f32 values.
///
/// Every record must be non-empty and hold exactly `columns` numeric
/// fields; quoted fields are accepted. Returns the values and the row
/// count. `byte_start` is the file offset of `bytes`, used in errors.
pub(crate) fn parse_rows(
    chunk_id: u32,
    byte_start: u64,
    bytes: &[u8],
    columns: usize,
) -> Result<(Vec<f32>, usize)> {
    let expected_rows = count_records(chunk_id, byte_start, bytes)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut record = csv::ByteRecord::new();
    let mut values = Vec::with_capacity(expected_rows * columns);
    let mut row = 0usize;

    loop {
        let more = reader.read_byte_record(&mut record).map_err(|e| {
            let offset = e.position().map(|p| p.byte()).unwrap_or(0);
            ReaderError::parse(chunk_id, row, byte_start + offset, e.to_string())
        })?;
        if !more {
            break;
        }

        let offset = byte_start + record.position().map(|p| p.byte()).unwrap_or(0);
        if record.len() != columns {
            return Err(ReaderError::parse(
                chunk_id,
                row,
                offset,
                format!("expected {columns} columns, found {}", record.len()),
            ));
        }

        for (column, field) in record.iter().enumerate() {
            let value = parse_field(field).ok_or_else(|| {
                ReaderError::parse(
                    chunk_id,
                    row,
                    offset,
                    format!(
                        "column {column}: '{}' is not a number",
                        String::from_utf8_lossy(field)
                    ),
                )
            })?;
            values.push(value);
        }
        row += 1;
    }

    if row != expected_rows {
        return Err(ReaderError::parse(
            chunk_id,
            row,
            byte_start + bytes.len() as u64,
            format!("parsed {row} records from {expected_rows} lines"),
        ));
    }

    Ok((values, row))
}

/// Counts the records in `bytes`, rejecting empty lines.
fn count_records(chunk_id: u32, byte_start: u64, bytes: &[u8]) -> Result<usize> {
    let mut offset = byte_start;
    let mut rows = 0usize;

    for line in bytes.split_inclusive(|&b| b == RECORD_TERMINATOR) {
        if trim_terminator(line).is_empty() {
            return Err(ReaderError::parse(chunk_id, rows, offset, "empty record"));
        }
        offset += line.len() as u64;
        rows += 1;
    }

    Ok(rows)
}

/// Number of fields in a single record.
pub(crate) fn count_fields(record: &[u8]) -> Result<usize> {
    if trim_terminator(record).is_empty() {
        return Err(ReaderError::parse(0, 0, 0, "empty record"));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(record);
    let mut fields = csv::ByteRecord::new();
    reader
        .read_byte_record(&mut fields)
        .map_err(|e| ReaderError::parse(0, 0, 0, e.to_string()))?;
    Ok(fields.len())
}

fn trim_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(&[RECORD_TERMINATOR]).unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_field(field: &[u8]) -> Option<f32> {
    std::str::from_utf8(field).ok()?.trim().parse().ok()
}
