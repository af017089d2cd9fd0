// rust/chunked-csv/src/storage/traits.rs

//! Storage traits.
//!
//! The chunk reader only needs random-access reads of a single file, but
//! the backend sits behind a trait so tests and tools can swap in
//! in-memory sources.

use std::io::{Read, Seek, Write};
use std::path::Path;

use crate::error::Result;

/// File metadata as reported by a backend.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: u64,
    pub modified: Option<std::time::SystemTime>,
    pub is_dir: bool,
}

/// An open file that supports bounded reads at arbitrary offsets.
pub trait StorageReader: Read + Seek + Send {
    /// Size of the file in bytes, fixed when it was opened.
    fn size(&self) -> u64;

    /// Reads exactly `length` bytes starting at `start`.
    ///
    /// Leaves the read position at `start + length`.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::Storage` if the range extends past the end of
    /// the file or the read fails.
    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>>;
}

/// An open file being written.
pub trait StorageWriter: Write + Send {
    /// Flushes buffered data and syncs it to durable storage. Consumes the
    /// writer.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// A place files are read from and written to.
///
/// Object-safe; readers hold `&dyn StorageBackend` or
/// `Box<dyn StorageBackend>`.
pub trait StorageBackend: Send + Sync {
    fn exists(&self, path: &Path) -> Result<bool>;

    /// # Errors
    ///
    /// Returns `ReaderError::Storage` if the path does not exist.
    fn metadata(&self, path: &Path) -> Result<ObjectMeta>;

    /// Opens a file for ranged reads.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::Storage` if the path is missing, is a
    /// directory or cannot be opened.
    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>>;

    /// Creates or truncates a file, creating missing parent directories.
    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>>;
}
