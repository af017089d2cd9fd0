// rust/chunked-csv/src/dataset/testing.rs

//! In-memory storage reader shared by the dataset unit tests.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Result, ReaderError};
use crate::storage::StorageReader;

/// Mock storage reader that records every ranged read.
pub(crate) struct MockReader {
    data: Cursor<Vec<u8>>,
    size: u64,
    reads: Arc<AtomicUsize>,
    bytes: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
}

impl MockReader {
    pub(crate) fn new(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self {
            data: Cursor::new(data),
            size,
            reads: Arc::new(AtomicUsize::new(0)),
            bytes: Arc::new(AtomicUsize::new(0)),
            drops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of `read_range` calls, shared with the reader.
    pub(crate) fn reads(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }

    /// Total bytes requested through `read_range`.
    pub(crate) fn bytes(&self) -> Arc<AtomicUsize> {
        self.bytes.clone()
    }

    /// Counter of drops, shared with the reader.
    pub(crate) fn drops(&self) -> Arc<AtomicUsize> {
        self.drops.clone()
    }
}

impl Drop for MockReader {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl Read for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.data.read(buf)
    }
}

impl Seek for MockReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.data.seek(pos)
    }
}

impl StorageReader for MockReader {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(length, Ordering::SeqCst);
        self.data
            .seek(SeekFrom::Start(start))
            .map_err(|e| ReaderError::storage_with_source("mock", "seek failed", e))?;

        let mut buf = vec![0u8; length];
        self.data
            .read_exact(&mut buf)
            .map_err(|e| ReaderError::storage_with_source("mock", "read failed", e))?;
        Ok(buf)
    }
}

/// Builds CSV text where row `i` has `columns` fields all equal to `i`.
pub(crate) fn uniform_rows(rows: usize, columns: usize) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..rows {
        let row: Vec<String> = (0..columns).map(|_| format!("{i}.0")).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out.into_bytes()
}
