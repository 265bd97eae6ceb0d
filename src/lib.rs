//! Envlab Engine Library
//!
//! A Rust library for ingesting environmental laboratory report spreadsheets
//! into typed, memory-optimized columnar data.
//!
//! This library provides tools for:
//! - Resolving messy spreadsheet headers against a canonical field schema
//! - Coercing raw cells into typed values with partial-failure semantics
//! - Filling missing reference thresholds from group-wise mode imputation
//! - Chunked parallel processing with bounded workers and order preservation
//! - A streaming fallback path with memory high-water reclamation
//! - Caching expensive derived summaries behind deterministic keys
//! - Lossless integer downcasting and dictionary coding of columns
//! - Severity-grouped reporting of every issue found along the way

pub mod buffer;
pub mod cache;
pub mod coerce;
pub mod config;
pub mod error;
pub mod impute;
pub mod models;
pub mod optimize;
pub mod processor;
pub mod report;
pub mod resolver;
pub mod schema;
pub mod summary;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use buffer::{Column, TypedBuffer, TypedValue};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use models::{
    IssueCategory, ProcessingResult, RawBatch, RawRecord, RawValue, Severity, ValidationIssue,
};
pub use processor::IngestPipeline;
pub use report::IssueReport;
