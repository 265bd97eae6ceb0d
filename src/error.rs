//! Error handling for ingestion engine operations.
//!
//! Infrastructure failures (I/O, malformed CSV framing, bad configuration,
//! worker-pool collapse) surface here. Expected data-quality conditions never
//! do: those are recovered locally and reported as [`ValidationIssue`] values
//! alongside the coerced data.
//!
//! [`ValidationIssue`]: crate::models::ValidationIssue

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Schema resolution failed: {reason}")]
    SchemaResolution { reason: String },

    #[error("Column '{name}' not found in buffer")]
    ColumnNotFound { name: String },

    #[error("Column '{name}' has unexpected type: expected {expected}, found {found}")]
    ColumnTypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Chunk {index} failed: {reason}")]
    ChunkFailed { index: usize, reason: String },

    #[error("All {total} chunks failed; no data produced")]
    NoChunksSucceeded { total: usize },

    #[error("Processing interrupted: {reason}")]
    ProcessingInterrupted { reason: String },
}

impl EngineError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a schema resolution error
    pub fn schema_resolution(reason: impl Into<String>) -> Self {
        Self::SchemaResolution {
            reason: reason.into(),
        }
    }

    /// Create a chunk failure error
    pub fn chunk_failed(index: usize, reason: impl Into<String>) -> Self {
        Self::ChunkFailed {
            index,
            reason: reason.into(),
        }
    }

    /// Create a column-not-found error
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self::ColumnNotFound { name: name.into() }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
