// rust/chunked-csv/src/storage/mod.rs

//! Storage abstraction for chunked reads.
//!
//! The chunk reader talks to its source through [`StorageReader`], whose
//! `read_range` is the single seek-then-read primitive every chunk load is
//! built on. [`LocalStorage`] is the filesystem implementation.
//!
//! # Example
//!
//! ```no_run
//! use chunked_csv::config::StorageConfig;
//! use chunked_csv::storage::{LocalStorage, StorageBackend};
//! use std::io::Write;
//! use std::path::Path;
//!
//! let storage = LocalStorage::new(&StorageConfig::default()).unwrap();
//!
//! let mut writer = storage.open_write(Path::new("rows.csv")).unwrap();
//! writer.write_all(b"1.0,2.0\n").unwrap();
//! writer.finish().unwrap();
//!
//! let mut reader = storage.open_read(Path::new("rows.csv")).unwrap();
//! let bytes = reader.read_range(0, 4).unwrap();
//! assert_eq!(bytes, b"1.0,");
//! ```

mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{ObjectMeta, StorageBackend, StorageReader, StorageWriter};
