//! Command-line argument definitions for the envlab engine.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments for the envlab report ingestion engine
///
/// Ingests environmental laboratory report CSV files, validates and types
/// every column, and prints a severity-grouped issue report plus per-item
/// result summaries.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "envlab",
    version,
    about = "Ingest and validate environmental lab report CSV files"
)]
pub struct Args {
    /// Input CSV file to process
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Rows per processing chunk
    #[arg(long = "chunk-size", value_name = "ROWS", default_value_t = 1000)]
    pub chunk_size: usize,

    /// Parallel worker count (defaults to available cores, capped at 4)
    #[arg(short = 'w', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Per-chunk timeout in seconds
    #[arg(long = "chunk-timeout", value_name = "SECS", default_value_t = 30)]
    pub chunk_timeout_secs: u64,

    /// Use the sequential streaming path instead of parallel chunking
    #[arg(long = "streaming")]
    pub streaming: bool,

    /// Memory high-water mark for the streaming path, in MB
    #[arg(long = "memory-limit", value_name = "MB", default_value_t = 1000)]
    pub memory_high_water_mb: u64,

    /// Allow lossy f64 -> f32 downcasting during optimization
    #[arg(long = "allow-lossy-floats")]
    pub allow_lossy_floats: bool,

    /// Print per-test-item summaries of the result values
    #[arg(long = "summarize")]
    pub summarize: bool,

    /// Enable verbose (debug) logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    /// Check argument combinations before any work starts
    pub fn validate(&self) -> Result<()> {
        if !self.input.exists() {
            return Err(EngineError::configuration(format!(
                "Input file does not exist: {}",
                self.input.display()
            )));
        }
        if self.chunk_size == 0 {
            return Err(EngineError::configuration("Chunk size must be at least 1"));
        }
        if matches!(self.workers, Some(0)) {
            return Err(EngineError::configuration(
                "Worker count must be at least 1",
            ));
        }
        Ok(())
    }

    /// Build the engine configuration from the parsed arguments
    pub fn to_engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default()
            .with_chunk_size(self.chunk_size)
            .with_chunk_timeout(Duration::from_secs(self.chunk_timeout_secs))
            .with_memory_high_water_mb(self.memory_high_water_mb);
        if self.allow_lossy_floats {
            config = config.with_lossy_float_downcast();
        }
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        config
    }

    /// Log level derived from the verbosity flag
    pub fn get_log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}
