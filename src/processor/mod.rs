//! Pipeline orchestration.
//!
//! Runs the full ingestion workflow: schema resolution once per input,
//! chunked coercion on the bounded worker pool (or inline on the streaming
//! path), batch-wide reference imputation, columnar optimization, and
//! result assembly. A background memory sampler brackets every run and its
//! peak reading lands in the run metadata.

pub mod chunked;
pub mod memory;
pub mod streaming;

#[cfg(test)]
pub mod tests;

use self::memory::MemorySampler;
use self::streaming::CsvChunkSource;

use crate::cache::{AdaptiveCache, CacheKeyBuilder};
use crate::coerce::{self, CoercionOutput};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::impute;
use crate::models::{
    IssueCategory, ProcessingResult, RawBatch, RunMetadata, Severity, ValidationIssue,
};
use crate::optimize::MemoryOptimizer;
use crate::resolver;
use crate::schema::{self, CanonicalField, ColumnMapping};
use crate::summary::{self, GroupSummary};

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Ingestion pipeline for one schema and configuration.
///
/// The canonical schema is shared read-only across runs and chunk workers;
/// the adaptive cache is owned here and injected nowhere else.
pub struct IngestPipeline {
    config: EngineConfig,
    schema: Arc<Vec<CanonicalField>>,
    reference_fill: Option<(String, String)>,
    summary_cache: AdaptiveCache<Vec<GroupSummary>>,
}

impl IngestPipeline {
    /// Create a pipeline over a custom schema
    pub fn new(config: EngineConfig, schema: Arc<Vec<CanonicalField>>) -> Result<Self> {
        config.validate()?;
        let summary_cache = AdaptiveCache::new(config.cache_max_size, config.cache_ttl());
        Ok(Self {
            config,
            schema,
            reference_fill: None,
            summary_cache,
        })
    }

    /// Create a pipeline over the built-in lab-report schema, with
    /// threshold imputation grouped by test item.
    pub fn with_default_schema(config: EngineConfig) -> Result<Self> {
        let pipeline = Self::new(config, schema::lab_report_schema())?;
        Ok(pipeline.with_reference_fill("test_item", "threshold"))
    }

    /// Enable group-wise imputation of a reference field
    pub fn with_reference_fill(
        mut self,
        group_key_field: impl Into<String>,
        reference_field: impl Into<String>,
    ) -> Self {
        self.reference_fill = Some((group_key_field.into(), reference_field.into()));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process a fully materialized batch on the parallel path
    pub async fn run_batch(&self, batch: RawBatch) -> Result<ProcessingResult> {
        let start = Instant::now();
        let sampler = MemorySampler::start(Duration::from_millis(self.config.sampler_interval_ms));
        let total_rows = batch.len();

        info!(
            "Starting batch run: {} rows, chunk size {}, {} workers",
            total_rows, self.config.chunk_size, self.config.worker_pool_width
        );

        let (mapping, mut issues) = resolver::resolve(&batch.headers, &self.schema);
        if !mapping.is_complete() {
            warn!(
                "Required fields unmapped ({:?}); skipping chunk processing",
                mapping.missing_required_fields
            );
            return Ok(self
                .abort_before_chunking(issues, total_rows, sampler, start)
                .await);
        }

        let mapping = Arc::new(mapping);
        let schema = self.schema.clone();
        let chunk_size = self.config.chunk_size;
        let transform_mapping = mapping.clone();

        let run = chunked::process_chunks(
            batch.rows,
            chunk_size,
            self.config.worker_pool_width,
            self.config.chunk_timeout(),
            move |index, chunk| {
                Ok(coerce::coerce_records(
                    &chunk,
                    &transform_mapping,
                    &schema,
                    index * chunk_size,
                ))
            },
        )
        .await?;

        let stats = run.stats;
        let (mut buffer, coercion_issues, failure_counts, row_map) = merge_outputs(run.outputs)?;
        issues.extend(coercion_issues);

        self.finish_run(
            &mut buffer,
            &mapping,
            issues,
            failure_counts,
            row_map,
            total_rows,
            stats.chunks_dispatched,
            stats.chunks_failed,
            stats.rows_dropped,
            sampler,
            start,
        )
        .await
    }

    /// Process a bounded-read CSV stream on the sequential path
    pub async fn run_csv_stream<R: Read>(&self, reader: R) -> Result<ProcessingResult> {
        let start = Instant::now();
        let sampler = MemorySampler::start(Duration::from_millis(self.config.sampler_interval_ms));

        let mut source = CsvChunkSource::new(reader, self.config.chunk_size)?;
        let (mapping, mut issues) = resolver::resolve(source.headers(), &self.schema);
        if !mapping.is_complete() {
            // Drain the source so total_rows still reflects the input
            while source.next_chunk()?.is_some() {}
            let total_rows = source.rows_read();
            warn!(
                "Required fields unmapped ({:?}); skipping stream processing",
                mapping.missing_required_fields
            );
            return Ok(self
                .abort_before_chunking(issues, total_rows, sampler, start)
                .await);
        }

        info!(
            "Starting streaming run: chunk size {}, high-water {}MB",
            self.config.chunk_size, self.config.memory_high_water_mb
        );

        let schema = self.schema.clone();
        let mut row_offset = 0usize;
        let (outputs, stats) = streaming::process_sequential(
            &mut source,
            self.config.memory_high_water_mb,
            |_, chunk| {
                let offset = row_offset;
                row_offset += chunk.len();
                Ok(coerce::coerce_records(&chunk, &mapping, &schema, offset))
            },
            |outputs| {
                for output in outputs.iter_mut() {
                    output.buffer.shrink_to_fit();
                }
            },
        )?;

        let total_rows = source.rows_read();
        let (mut buffer, coercion_issues, failure_counts, row_map) = merge_outputs(outputs)?;
        issues.extend(coercion_issues);

        self.finish_run(
            &mut buffer,
            &mapping,
            issues,
            failure_counts,
            row_map,
            total_rows,
            stats.chunks_processed,
            stats.chunks_failed,
            stats.rows_dropped,
            sampler,
            start,
        )
        .await
    }

    /// Per-group summary of a numeric column, served through the cache
    pub fn summarize(
        &self,
        buffer: &crate::buffer::TypedBuffer,
        group_field: &str,
        value_field: &str,
    ) -> Result<Vec<GroupSummary>> {
        let fingerprint = summary::buffer_fingerprint(buffer, &[group_field, value_field]);
        let key = CacheKeyBuilder::new("group_summary")
            .named_arg("group", group_field)
            .named_arg("value", value_field)
            .arg(&fingerprint)
            .finish();

        if let Some(cached) = self.summary_cache.get(key) {
            debug!("Summary cache hit for '{}'/'{}'", group_field, value_field);
            return Ok(cached);
        }
        let computed = summary::summarize_by_group(buffer, group_field, value_field)?;
        self.summary_cache.set(key, computed.clone());
        Ok(computed)
    }

    /// Drop all cached summaries
    pub fn clear_cache(&self) {
        self.summary_cache.clear();
    }

    /// Result assembly for runs stopped by a Critical schema issue
    async fn abort_before_chunking(
        &self,
        issues: Vec<ValidationIssue>,
        total_rows: usize,
        sampler: MemorySampler,
        start: Instant,
    ) -> ProcessingResult {
        let peak_memory_mb = sampler.stop().await;
        let metadata = RunMetadata {
            peak_memory_mb: Some(peak_memory_mb),
            processing_time_ms: start.elapsed().as_millis(),
            ..Default::default()
        };
        ProcessingResult::from_issues(None, issues, 0, total_rows, metadata)
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_run(
        &self,
        buffer: &mut crate::buffer::TypedBuffer,
        mapping: &ColumnMapping,
        mut issues: Vec<ValidationIssue>,
        failure_counts: std::collections::HashMap<String, usize>,
        row_map: Vec<usize>,
        total_rows: usize,
        chunks_dispatched: usize,
        chunks_failed: usize,
        rows_dropped: usize,
        sampler: MemorySampler,
        start: Instant,
    ) -> Result<ProcessingResult> {
        let processed_rows = buffer.num_rows();

        issues.extend(coerce::aggregate_column_errors(
            &failure_counts,
            processed_rows,
            mapping,
            &self.schema,
            self.config.column_failure_threshold,
        ));

        if chunks_failed > 0 {
            issues.push(
                ValidationIssue::new(
                    IssueCategory::Processing,
                    Severity::Warning,
                    format!(
                        "{} of {} chunks failed; {} rows were dropped",
                        chunks_failed, chunks_dispatched, rows_dropped
                    ),
                )
                .with_suggested_fix("Re-run the affected input range or raise the chunk timeout"),
            );
        }

        if let Some((group_field, reference_field)) = &self.reference_fill {
            if buffer.column(group_field).is_some() && buffer.column(reference_field).is_some() {
                let mut fill_issues =
                    impute::fill_missing_references(buffer, group_field, reference_field)?;
                fill_issues.extend(impute::unresolved_reference_warnings(
                    buffer,
                    group_field,
                    reference_field,
                )?);
                // Buffer positions shift when chunks are dropped; report
                // original input row indices like every other issue.
                remap_row_indices(&mut fill_issues, &row_map);
                issues.extend(fill_issues);
            }
        }

        let optimizer = MemoryOptimizer::from_config(&self.config);
        let (optimized, report) = optimizer.optimize(std::mem::take(buffer));
        debug!(
            "Optimizer: {} -> {} bytes ({:.1}% reduction)",
            report.bytes_before,
            report.bytes_after,
            report.reduction_pct()
        );

        let peak_memory_mb = sampler.stop().await;
        let metadata = RunMetadata {
            peak_memory_mb: Some(peak_memory_mb),
            chunks_dispatched,
            chunks_failed,
            rows_dropped,
            processing_time_ms: start.elapsed().as_millis(),
            optimization: Some(report),
        };

        let result = ProcessingResult::from_issues(
            Some(optimized),
            issues,
            processed_rows,
            total_rows,
            metadata,
        );
        info!(
            "Run complete: {}/{} rows in {}ms (success: {})",
            result.processed_rows, result.total_rows, result.metadata.processing_time_ms, result.success
        );
        Ok(result)
    }
}

/// Merge per-chunk coercion outputs in chunk index order.
///
/// Also builds the merged-position to original-row-index map, which is the
/// identity unless chunks were dropped along the way.
fn merge_outputs(
    outputs: Vec<CoercionOutput>,
) -> Result<(
    crate::buffer::TypedBuffer,
    Vec<ValidationIssue>,
    std::collections::HashMap<String, usize>,
    Vec<usize>,
)> {
    let mut buffers = Vec::with_capacity(outputs.len());
    let mut issues = Vec::new();
    let mut failure_counts = std::collections::HashMap::new();
    let mut row_map = Vec::new();
    for output in outputs {
        let rows = output.buffer.num_rows();
        row_map.extend(output.row_offset..output.row_offset + rows);
        buffers.push(output.buffer);
        issues.extend(output.issues);
        for (column, count) in output.failure_counts {
            *failure_counts.entry(column).or_insert(0) += count;
        }
    }
    let merged = crate::buffer::TypedBuffer::concat(buffers)?;
    Ok((merged, issues, failure_counts, row_map))
}

/// Rewrite merged-buffer row positions as original input row indices
fn remap_row_indices(issues: &mut [ValidationIssue], row_map: &[usize]) {
    for issue in issues.iter_mut() {
        if let Some(row) = issue.row_index {
            if let Some(&original) = row_map.get(row) {
                issue.row_index = Some(original);
            }
        }
    }
}
