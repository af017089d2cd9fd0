// rust/chunked-csv/src/dataset/mod.rs

//! Record-aligned chunked reading of numeric CSV files.
//!
//! A file is cut into chunks of a nominal byte size. Each cut is snapped
//! back to the nearest preceding newline, so no record is ever split and
//! every byte belongs to exactly one chunk. Chunks are resolved and parsed
//! lazily, one at a time, into rows of `f32` columns grouped into named
//! streams.
//!
//! # Example
//!
//! ```no_run
//! use chunked_csv::config::{ChunkingConfig, StorageConfig, StreamSpec};
//! use chunked_csv::dataset::ChunkReader;
//! use chunked_csv::storage::LocalStorage;
//!
//! let storage = LocalStorage::new(&StorageConfig::default())?;
//! let streams = [StreamSpec::new("x", [150]), StreamSpec::new("y", [1])];
//! let mut reader = ChunkReader::open(&storage, "train.csv", &streams, &ChunkingConfig::default())?;
//!
//! let label = reader.layout().stream("y").cloned().unwrap();
//! for chunk_id in 0..reader.chunk_count() {
//!     let chunk = reader.read_chunk(chunk_id)?;
//!     for row in 0..chunk.row_count() {
//!         let _y = chunk.row_fields(row, &label);
//!         // Feed y to the model
//!     }
//! }
//! reader.shutdown();
//! # Ok::<(), chunked_csv::ReaderError>(())
//! ```

mod chunk;
mod planner;
mod reader;
mod stream;
mod sweep;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use chunk::Chunk;
pub use planner::{ChunkPlanner, RECORD_TERMINATOR};
pub use reader::ChunkReader;
pub use stream::{ElementType, StreamDescriptor, StreamLayout};
pub use sweep::{Sweep, SweepItem, SweepState};
pub use traits::{
    ChunkInfo, ChunkRange, ChunkState, DataDeserializer, SequenceChunk, SequenceInfo,
};
