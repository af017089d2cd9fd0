// rust/chunked-csv/src/lib.rs

//! Chunked CSV reader - Core Library
//!
//! Splits large headerless numeric CSV files into record-aligned chunks,
//! parses chunks on demand into named `f32` streams and exposes them
//! through a chunk/sequence protocol for minibatch loaders.

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::{ChunkingConfig, ReaderConfig, StreamSpec, SweepConfig};
pub use error::{ReaderError, Result};
pub use storage::{LocalStorage, ObjectMeta, StorageBackend, StorageReader, StorageWriter};

pub mod dataset;
pub use dataset::{
    Chunk, ChunkInfo, ChunkPlanner, ChunkRange, ChunkReader, ChunkState, DataDeserializer,
    SequenceChunk, SequenceInfo, StreamDescriptor, StreamLayout, Sweep, SweepItem, SweepState,
};
