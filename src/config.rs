//! Configuration management and validation.
//!
//! Provides the tunable parameters for chunked processing, caching,
//! memory monitoring, and columnar optimization. Defaults are chosen for
//! typical lab-report batches (thousands to low millions of rows).

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-wide configuration for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rows per chunk for parallel and streaming processing
    pub chunk_size: usize,

    /// Maximum number of concurrent chunk workers
    pub worker_pool_width: usize,

    /// Per-chunk timeout in milliseconds; a chunk exceeding this is dropped
    pub chunk_timeout_ms: u64,

    /// Maximum number of entries held by the adaptive cache
    pub cache_max_size: usize,

    /// Cache entry time-to-live in seconds
    pub cache_ttl_secs: u64,

    /// Memory high-water mark in MB for the streaming path
    pub memory_high_water_mb: u64,

    /// Distinct-value ratio below which a text column is dictionary-coded
    pub low_cardinality_threshold: f64,

    /// Allow f64 -> f32 downcasting (lossy); disabled by default
    pub allow_lossy_float_downcast: bool,

    /// Fraction of failed cells in a required column that triggers an
    /// aggregate column-level error (tunable, not a fixed law)
    pub column_failure_threshold: f64,

    /// Background memory sampler interval in milliseconds
    pub sampler_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            worker_pool_width: default_worker_width(),
            chunk_timeout_ms: 30_000,
            cache_max_size: 100,
            cache_ttl_secs: 3600,
            memory_high_water_mb: 1000,
            low_cardinality_threshold: 0.5,
            allow_lossy_float_downcast: false,
            column_failure_threshold: 0.3,
            sampler_interval_ms: 200,
        }
    }
}

/// Worker pool width: at most 4, bounded by available parallelism
fn default_worker_width() -> usize {
    num_cpus::get().min(4).max(1)
}

impl EngineConfig {
    /// Create configuration with a custom chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Create configuration with a custom worker pool width
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_pool_width = workers;
        self
    }

    /// Create configuration with a custom per-chunk timeout
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Create configuration with custom cache bounds
    pub fn with_cache_bounds(mut self, max_size: usize, ttl: Duration) -> Self {
        self.cache_max_size = max_size;
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Create configuration with a custom memory high-water mark
    pub fn with_memory_high_water_mb(mut self, limit_mb: u64) -> Self {
        self.memory_high_water_mb = limit_mb;
        self
    }

    /// Enable lossy float downcasting in the memory optimizer
    pub fn with_lossy_float_downcast(mut self) -> Self {
        self.allow_lossy_float_downcast = true;
        self
    }

    /// Create configuration with a custom column failure threshold
    pub fn with_column_failure_threshold(mut self, threshold: f64) -> Self {
        self.column_failure_threshold = threshold;
        self
    }

    /// Per-chunk timeout as a [`Duration`]
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    /// Cache TTL as a [`Duration`]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::configuration("chunk_size must be at least 1"));
        }
        if self.worker_pool_width == 0 {
            return Err(EngineError::configuration(
                "worker_pool_width must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.low_cardinality_threshold) {
            return Err(EngineError::configuration(
                "low_cardinality_threshold must be within [0.0, 1.0]",
            ));
        }
        if !(0.0..=1.0).contains(&self.column_failure_threshold) {
            return Err(EngineError::configuration(
                "column_failure_threshold must be within [0.0, 1.0]",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert!(config.worker_pool_width >= 1 && config.worker_pool_width <= 4);
        assert_eq!(config.chunk_timeout(), Duration::from_secs(30));
        assert_eq!(config.cache_max_size, 100);
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.memory_high_water_mb, 1000);
        assert_eq!(config.low_cardinality_threshold, 0.5);
        assert!(!config.allow_lossy_float_downcast);
        config.validate().unwrap();
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::default()
            .with_chunk_size(250)
            .with_workers(2)
            .with_chunk_timeout(Duration::from_secs(5))
            .with_lossy_float_downcast();

        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.worker_pool_width, 2);
        assert_eq!(config.chunk_timeout(), Duration::from_secs(5));
        assert!(config.allow_lossy_float_downcast);
    }

    #[test]
    fn test_sub_second_chunk_timeout_is_preserved() {
        let config = EngineConfig::default().with_chunk_timeout(Duration::from_millis(500));
        assert_eq!(config.chunk_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(EngineConfig::default().with_chunk_size(0).validate().is_err());
        assert!(EngineConfig::default().with_workers(0).validate().is_err());

        let mut config = EngineConfig::default();
        config.column_failure_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
