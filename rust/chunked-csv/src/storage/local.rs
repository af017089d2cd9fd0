// rust/chunked-csv/src/storage/local.rs

//! Local filesystem storage backend.
//!
//! Small files are read through a buffered `File`; files at or above the
//! configured threshold are memory-mapped so chunk reads become slice
//! copies.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::traits::{ObjectMeta, StorageBackend, StorageReader, StorageWriter};
use crate::config::StorageConfig;
use crate::error::{Result, ReaderError};

/// Local filesystem storage backend rooted at a base directory.
pub struct LocalStorage {
    config: StorageConfig,
}

impl LocalStorage {
    /// Creates the backend, creating the base directory if it is missing.
    ///
    /// # Errors
    ///
    /// Returns `ReaderError::Storage` if the base directory cannot be created.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let base_path = &config.base_path;
        if !base_path.exists() {
            fs::create_dir_all(base_path).map_err(|e| {
                ReaderError::storage_with_source(base_path, "failed to create base directory", e)
            })?;
        }

        Ok(Self {
            config: config.clone(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Absolute paths are used as-is, relative ones are joined to the base.
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.base_path.join(path)
        }
    }

    // Empty files are never mapped; not every platform can map zero bytes.
    fn should_map(&self, size: u64) -> bool {
        self.config.use_mmap && size > 0 && size >= self.config.mmap_threshold
    }
}

impl StorageBackend for LocalStorage {
    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.resolve_path(path).exists())
    }

    fn metadata(&self, path: &Path) -> Result<ObjectMeta> {
        let full_path = self.resolve_path(path);
        let meta = fs::metadata(&full_path).map_err(|e| {
            ReaderError::storage_with_source(&full_path, "failed to read metadata", e)
        })?;

        Ok(ObjectMeta {
            size: meta.len(),
            modified: meta.modified().ok(),
            is_dir: meta.is_dir(),
        })
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        let full_path = self.resolve_path(path);
        let file = File::open(&full_path)
            .map_err(|e| ReaderError::storage_with_source(&full_path, "failed to open file", e))?;

        let meta = file.metadata().map_err(|e| {
            ReaderError::storage_with_source(&full_path, "failed to read file metadata", e)
        })?;
        if meta.is_dir() {
            return Err(ReaderError::storage(&full_path, "path is a directory"));
        }

        let reader = if self.should_map(meta.len()) {
            // SAFETY: the file is opened read-only and the mapping is owned
            // by the reader.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                ReaderError::storage_with_source(&full_path, "failed to memory-map file", e)
            })?;
            LocalReader::mapped(full_path, mmap)
        } else {
            LocalReader::buffered(full_path, file, meta.len(), self.config.buffer_size)
        };
        Ok(Box::new(reader))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>> {
        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent().filter(|p| !p.exists()) {
            fs::create_dir_all(parent).map_err(|e| {
                ReaderError::storage_with_source(parent, "failed to create parent directories", e)
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full_path)
            .map_err(|e| {
                ReaderError::storage_with_source(&full_path, "failed to create file", e)
            })?;

        Ok(Box::new(LocalWriter {
            writer: BufWriter::with_capacity(self.config.buffer_size, file),
            path: full_path,
        }))
    }
}

/// Where a [`LocalReader`] gets its bytes from.
enum FileSource {
    Buffered(BufReader<File>),
    Mapped(Cursor<Mmap>),
}

/// Random-access reader over one local file.
struct LocalReader {
    path: PathBuf,
    size: u64,
    source: FileSource,
}

impl LocalReader {
    fn buffered(path: PathBuf, file: File, size: u64, buffer_size: usize) -> Self {
        Self {
            path,
            size,
            source: FileSource::Buffered(BufReader::with_capacity(buffer_size, file)),
        }
    }

    fn mapped(path: PathBuf, mmap: Mmap) -> Self {
        Self {
            path,
            size: mmap.len() as u64,
            source: FileSource::Mapped(Cursor::new(mmap)),
        }
    }

    fn check_range(&self, start: u64, length: usize) -> Result<u64> {
        match start.checked_add(length as u64) {
            Some(end) if end <= self.size => Ok(end),
            _ => Err(ReaderError::storage(
                &self.path,
                format!(
                    "read of {length} bytes at {start} exceeds file size {}",
                    self.size
                ),
            )),
        }
    }
}

impl Read for LocalReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.source {
            FileSource::Buffered(reader) => reader.read(buf),
            FileSource::Mapped(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for LocalReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match &mut self.source {
            FileSource::Buffered(reader) => reader.seek(pos),
            FileSource::Mapped(cursor) => cursor.seek(pos),
        }
    }
}

impl StorageReader for LocalReader {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        let end = self.check_range(start, length)?;

        if let FileSource::Mapped(cursor) = &mut self.source {
            // Slice the mapping directly and leave the cursor after the range
            let bytes = cursor.get_ref()[start as usize..end as usize].to_vec();
            cursor.set_position(end);
            return Ok(bytes);
        }

        self.seek(SeekFrom::Start(start)).map_err(|e| {
            ReaderError::storage_with_source(&self.path, format!("failed to seek to {start}"), e)
        })?;
        let mut buf = vec![0u8; length];
        self.read_exact(&mut buf).map_err(|e| {
            ReaderError::storage_with_source(
                &self.path,
                format!("failed to read {length} bytes at {start}"),
                e,
            )
        })?;
        Ok(buf)
    }
}

/// Buffered writer that syncs the file on `finish`.
struct LocalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageWriter for LocalWriter {
    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer
            .flush()
            .and_then(|()| self.writer.get_ref().sync_all())
            .map_err(|e| ReaderError::storage_with_source(&self.path, "failed to persist file", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_storage() -> (LocalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            buffer_size: 4096,
            use_mmap: true,
            mmap_threshold: 1024, // Low threshold for testing
        };
        let storage = LocalStorage::new(&config).unwrap();
        (storage, temp_dir)
    }

    fn write_file(storage: &LocalStorage, path: &str, data: &[u8]) {
        let mut writer = storage.open_write(Path::new(path)).unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_new_creates_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let new_base = temp_dir.path().join("new_subdir");

        let config = StorageConfig {
            base_path: new_base.clone(),
            ..Default::default()
        };

        let storage = LocalStorage::new(&config).unwrap();
        assert!(new_base.exists());
        assert_eq!(storage.base_path(), new_base);
    }

    #[test]
    fn test_exists_and_metadata() {
        let (storage, _temp) = temp_storage();
        assert!(!storage.exists(Path::new("rows.csv")).unwrap());

        write_file(&storage, "rows.csv", b"1,2\n3,4\n");

        assert!(storage.exists(Path::new("rows.csv")).unwrap());
        let meta = storage.metadata(Path::new("rows.csv")).unwrap();
        assert_eq!(meta.size, 8);
        assert!(!meta.is_dir);
        assert!(meta.modified.is_some());
    }

    #[test]
    fn test_metadata_not_found() {
        let (storage, _temp) = temp_storage();
        assert!(storage.metadata(Path::new("nonexistent.csv")).is_err());
    }

    #[test]
    fn test_open_read_not_found() {
        let (storage, _temp) = temp_storage();
        let err = storage.open_read(Path::new("nonexistent.csv")).err().unwrap();
        assert!(matches!(err, ReaderError::Storage { .. }));
    }

    #[test]
    fn test_read_range_small_file() {
        let (storage, _temp) = temp_storage();
        write_file(&storage, "small.csv", b"1.0,2.0\n3.0,4.0\n");

        let mut reader = storage.open_read(Path::new("small.csv")).unwrap();
        assert_eq!(reader.size(), 16);
        assert_eq!(reader.read_range(8, 8).unwrap(), b"3.0,4.0\n");
    }

    #[test]
    fn test_read_range_large_file() {
        let (storage, _temp) = temp_storage();
        let data: Vec<u8> = (0..2048).map(|i| (i % 256) as u8).collect();
        write_file(&storage, "large.bin", &data);

        // Above the mmap threshold
        let mut reader = storage.open_read(Path::new("large.bin")).unwrap();
        assert_eq!(reader.read_range(100, 50).unwrap(), &data[100..150]);
    }

    #[test]
    fn test_read_range_out_of_bounds() {
        let (storage, _temp) = temp_storage();
        let data = vec![b'x'; 2048];
        write_file(&storage, "large.bin", &data);
        write_file(&storage, "small.bin", &data[..64]);

        let mut mapped = storage.open_read(Path::new("large.bin")).unwrap();
        assert!(mapped.read_range(2000, 100).is_err());

        let mut buffered = storage.open_read(Path::new("small.bin")).unwrap();
        assert!(buffered.read_range(60, 10).is_err());
    }

    #[test]
    fn test_seek_and_read_mmap() {
        let (storage, _temp) = temp_storage();
        let data: Vec<u8> = (0..2048).map(|i| (i % 10) as u8 + b'0').collect();
        write_file(&storage, "digits.txt", &data);

        let mut reader = storage.open_read(Path::new("digits.txt")).unwrap();
        assert_eq!(reader.seek(SeekFrom::Start(5)).unwrap(), 5);
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], b'5');

        assert_eq!(reader.seek(SeekFrom::Current(2)).unwrap(), 8);
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], b'8');

        assert_eq!(reader.seek(SeekFrom::End(-3)).unwrap(), 2045);
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], b'5');
    }

    #[test]
    fn test_read_range_moves_cursor_to_range_end() {
        let (storage, _temp) = temp_storage();
        let data: Vec<u8> = (0..2048).map(|i| (i % 10) as u8 + b'0').collect();
        write_file(&storage, "mapped.txt", &data);
        write_file(&storage, "buffered.txt", &data[..512]);

        for name in ["mapped.txt", "buffered.txt"] {
            let mut reader = storage.open_read(Path::new(name)).unwrap();
            assert_eq!(reader.read_range(10, 3).unwrap(), b"012");
            let mut next = [0u8; 2];
            reader.read_exact(&mut next).unwrap();
            assert_eq!(&next, b"34", "{name}");
        }
    }

    #[test]
    fn test_read_range_error_names_the_file() {
        let (storage, temp) = temp_storage();
        write_file(&storage, "short.csv", b"1,2\n");

        let mut reader = storage.open_read(Path::new("short.csv")).unwrap();
        match reader.read_range(2, 10).unwrap_err() {
            ReaderError::Storage { path, message, .. } => {
                assert_eq!(path, temp.path().join("short.csv"));
                assert!(message.contains("exceeds file size 4"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_file_uses_buffered_reader() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            mmap_threshold: 0,
            ..Default::default()
        };
        let storage = LocalStorage::new(&config).unwrap();
        write_file(&storage, "empty.csv", b"");

        let mut reader = storage.open_read(Path::new("empty.csv")).unwrap();
        assert_eq!(reader.size(), 0);
        assert!(reader.read_range(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_write_creates_parent_dirs_and_overwrites() {
        let (storage, _temp) = temp_storage();
        write_file(&storage, "nested/path/rows.csv", b"initial\n");
        write_file(&storage, "nested/path/rows.csv", b"new\n");

        let mut reader = storage.open_read(Path::new("nested/path/rows.csv")).unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"new\n");
    }

    #[test]
    fn test_mmap_disabled() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            buffer_size: 4096,
            use_mmap: false,
            mmap_threshold: 1024,
        };
        let storage = LocalStorage::new(&config).unwrap();

        let data: Vec<u8> = (0..2048).map(|i| (i % 256) as u8).collect();
        write_file(&storage, "large.bin", &data);

        let mut reader = storage.open_read(Path::new("large.bin")).unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn test_object_safety() {
        let (storage, _temp) = temp_storage();
        let backend: Box<dyn StorageBackend> = Box::new(storage);

        let mut writer = backend.open_write(Path::new("rows.csv")).unwrap();
        writer.write_all(b"1\n").unwrap();
        writer.finish().unwrap();

        assert!(backend.exists(Path::new("rows.csv")).unwrap());
    }
}
