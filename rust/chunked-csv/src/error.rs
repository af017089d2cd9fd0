// rust/chunked-csv/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error(
        "A single record in chunk {chunk_id} does not fit into the chunk, consider increasing the chunk size"
    )]
    RecordTooLarge {
        chunk_id: u32,
    },

    #[error("Parse error in chunk {chunk_id} at row {row} (byte {byte_offset}): {message}")]
    Parse {
        chunk_id: u32,
        row: usize,
        byte_offset: u64,
        message: String,
    },

    #[error("Chunk {chunk_id} out of range (total chunks: {total_chunks})")]
    InvalidChunk {
        chunk_id: u32,
        total_chunks: u32,
    },

    #[error("Reader for '{path}' has been shut down")]
    Closed {
        path: PathBuf,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, ReaderError>;

// Convenience constructors
impl ReaderError {

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn record_too_large(chunk_id: u32) -> Self {
        Self::RecordTooLarge { chunk_id }
    }

    pub fn parse(
        chunk_id: u32,
        row: usize,
        byte_offset: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::Parse {
            chunk_id,
            row,
            byte_offset,
            message: message.into(),
        }
    }

    pub fn invalid_chunk(chunk_id: u32, total_chunks: u32) -> Self {
        Self::InvalidChunk {
            chunk_id,
            total_chunks,
        }
    }

    pub fn closed(path: impl Into<PathBuf>) -> Self {
        Self::Closed { path: path.into() }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns the chunk id this error is attributed to, if any.
    pub fn chunk_id(&self) -> Option<u32> {
        match self {
            Self::RecordTooLarge { chunk_id }
            | Self::Parse { chunk_id, .. }
            | Self::InvalidChunk { chunk_id, .. } => Some(*chunk_id),
            _ => None,
        }
    }
}
