// rust/chunked-csv/src/config.rs

//! Configuration for the chunked CSV reader.
//!
//! Configuration is parsed from TOML, optionally overridden from
//! `CSVCHUNK_*` environment variables, and validated before any file is
//! opened.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, ReaderError};

/// Default nominal chunk size (32 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 32 * 1024 * 1024;

/// Default backward probe window (64 KiB).
pub const DEFAULT_PROBE_WINDOW: usize = 64 * 1024;

// Top-level reader configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub sweep: SweepConfig,
    /// Streams in column order.
    pub streams: Vec<StreamSpec>,
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Base path that relative data paths are resolved against.
    pub base_path: PathBuf,
    // Buffer size in bytes for buffered reads.
    pub buffer_size: usize,
    // Whether to use memory-mapped I/O.
    pub use_mmap: bool,
    // File size threshold (bytes) above which to use mmap.
    pub mmap_threshold: u64,
}

/// Chunk boundary options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Nominal chunk size in bytes, before boundary snapping.
    pub chunk_size: u64,
    /// Window size in bytes for the backward terminator search.
    pub probe_window: usize,
}

/// Sequential sweep options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Rank of this worker, in `0..number_of_workers`.
    pub worker_rank: usize,
    /// Number of workers sequences are decimated across.
    pub number_of_workers: usize,
    /// Number of full passes over the data.
    pub max_sweeps: usize,
}

/// A named, fixed-shape group of columns within a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            buffer_size: 64 * 1024, // 64 KB
            use_mmap: true,
            mmap_threshold: 1024 * 1024, // 1 MB
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            probe_window: DEFAULT_PROBE_WINDOW,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ReaderError::config(
                "chunking.chunk_size must be greater than 0",
            ));
        }
        if self.probe_window == 0 {
            return Err(ReaderError::config(
                "chunking.probe_window must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            worker_rank: 0,
            number_of_workers: 1,
            max_sweeps: 1,
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<()> {
        if self.number_of_workers == 0 {
            return Err(ReaderError::config(
                "sweep.number_of_workers must be greater than 0",
            ));
        }
        if self.worker_rank >= self.number_of_workers {
            return Err(ReaderError::config(format!(
                "sweep.worker_rank {} must be less than sweep.number_of_workers {}",
                self.worker_rank, self.number_of_workers
            )));
        }
        if self.max_sweeps == 0 {
            return Err(ReaderError::config(
                "sweep.max_sweeps must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl StreamSpec {
    pub fn new(name: impl Into<String>, shape: impl Into<Vec<usize>>) -> Self {
        Self {
            name: name.into(),
            shape: shape.into(),
        }
    }

    /// Number of columns this stream occupies in a row.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ReaderError::config("stream name must not be empty"));
        }
        if self.shape.is_empty() {
            return Err(ReaderError::config(format!(
                "stream '{}' must have at least one dimension",
                self.name
            )));
        }
        if self.shape.contains(&0) {
            return Err(ReaderError::config(format!(
                "stream '{}' has a zero-sized dimension in shape {:?}",
                self.name, self.shape
            )));
        }
        Ok(())
    }
}

impl FromStr for StreamSpec {
    type Err = ReaderError;

    /// Parses `name:dims`, where dims are `x`-separated, e.g. `x:150` or
    /// `image:28x28`.
    fn from_str(s: &str) -> Result<Self> {
        let (name, dims) = s.split_once(':').ok_or_else(|| {
            ReaderError::config(format!("invalid stream '{s}'. Expected 'name:dims'"))
        })?;

        let shape = dims
            .split('x')
            .map(|d| {
                d.trim().parse::<usize>().map_err(|e| {
                    ReaderError::config_with_source(
                        format!("invalid dimension '{d}' in stream '{s}'"),
                        e,
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let spec = Self::new(name.trim(), shape);
        spec.validate()?;
        Ok(spec)
    }
}

/// Validates a list of streams: non-empty, each valid, names unique.
pub fn validate_streams(streams: &[StreamSpec]) -> Result<()> {
    if streams.is_empty() {
        return Err(ReaderError::config("at least one stream must be configured"));
    }

    let mut seen = HashSet::new();
    for stream in streams {
        stream.validate()?;
        if !seen.insert(stream.name.as_str()) {
            return Err(ReaderError::config(format!(
                "duplicate stream name '{}'",
                stream.name
            )));
        }
    }
    Ok(())
}

impl FromStr for ReaderConfig {
    type Err = ReaderError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| ReaderError::config_with_source("failed to parse TOML config", e))
    }
}

impl ReaderConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReaderError::storage_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // - `CSVCHUNK_STORAGE_BASE_PATH` overrides `storage.base_path`
    // - `CSVCHUNK_CHUNK_SIZE` overrides `chunking.chunk_size`
    // - `CSVCHUNK_STREAMS` replaces `streams`, e.g. "x:150,y:1"
    // - `CSVCHUNK_WORKER_RANK` overrides `sweep.worker_rank`
    //
    // Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Storage overrides
        if let Ok(val) = std::env::var("CSVCHUNK_STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("CSVCHUNK_STORAGE_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.storage.buffer_size = v;
            }
        }
        if let Ok(val) = std::env::var("CSVCHUNK_STORAGE_USE_MMAP") {
            if let Ok(v) = val.parse() {
                self.storage.use_mmap = v;
            }
        }
        if let Ok(val) = std::env::var("CSVCHUNK_STORAGE_MMAP_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.storage.mmap_threshold = v;
            }
        }

        // Chunking overrides
        if let Ok(val) = std::env::var("CSVCHUNK_CHUNK_SIZE") {
            if let Ok(v) = val.parse() {
                self.chunking.chunk_size = v;
            }
        }
        if let Ok(val) = std::env::var("CSVCHUNK_PROBE_WINDOW") {
            if let Ok(v) = val.parse() {
                self.chunking.probe_window = v;
            }
        }

        // Streams are replaced as a whole, and only when every entry parses
        if let Ok(val) = std::env::var("CSVCHUNK_STREAMS") {
            let parsed: Result<Vec<StreamSpec>> = val.split(',').map(str::parse).collect();
            if let Ok(streams) = parsed {
                self.streams = streams;
            }
        }

        // Sweep overrides
        if let Ok(val) = std::env::var("CSVCHUNK_WORKER_RANK") {
            if let Ok(v) = val.parse() {
                self.sweep.worker_rank = v;
            }
        }
        if let Ok(val) = std::env::var("CSVCHUNK_NUMBER_OF_WORKERS") {
            if let Ok(v) = val.parse() {
                self.sweep.number_of_workers = v;
            }
        }
        if let Ok(val) = std::env::var("CSVCHUNK_MAX_SWEEPS") {
            if let Ok(v) = val.parse() {
                self.sweep.max_sweeps = v;
            }
        }

        self
    }

    // Validate all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.storage.buffer_size == 0 {
            return Err(ReaderError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }

        self.chunking.validate()?;
        self.sweep.validate()?;
        validate_streams(&self.streams)
    }
}
