//! Bounded-parallel chunk execution with ordering guarantees.
//!
//! The input is split into contiguous chunks which are dispatched to a
//! semaphore-bounded worker pool. Each chunk runs under a timeout; a chunk
//! that errors, panics, or times out is logged and its contribution dropped.
//! Results are merged in chunk index order, so the combined output preserves
//! original row order regardless of completion order. The run only fails as
//! a whole when every chunk failed.

use crate::error::{EngineError, Result};
use crate::models::RawRecord;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task;
use tracing::{debug, error};

/// Counters from one chunked run
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkRunStats {
    pub chunks_dispatched: usize,
    pub chunks_failed: usize,
    /// Rows lost to failed chunks
    pub rows_dropped: usize,
}

/// Successful chunk outputs in chunk index order, plus run counters
#[derive(Debug)]
pub struct ChunkRunOutput<T> {
    pub outputs: Vec<T>,
    pub stats: ChunkRunStats,
}

/// Split records into contiguous chunks and run `transform` over them on a
/// bounded worker pool.
///
/// The transform receives the chunk index and its owned record slice; chunk
/// transforms share no mutable state, which is what keeps the pool safe
/// without per-chunk locking.
pub async fn process_chunks<T, F>(
    records: Vec<RawRecord>,
    chunk_size: usize,
    worker_width: usize,
    timeout: Duration,
    transform: F,
) -> Result<ChunkRunOutput<T>>
where
    T: Send + 'static,
    F: Fn(usize, Vec<RawRecord>) -> Result<T> + Send + Sync + 'static,
{
    if records.is_empty() {
        return Ok(ChunkRunOutput {
            outputs: Vec::new(),
            stats: ChunkRunStats::default(),
        });
    }

    let chunk_size = chunk_size.max(1);
    let transform = Arc::new(transform);
    let semaphore = Arc::new(Semaphore::new(worker_width.max(1)));

    let mut chunks: Vec<Vec<RawRecord>> = Vec::new();
    let mut records = records;
    while !records.is_empty() {
        let rest = records.split_off(chunk_size.min(records.len()));
        chunks.push(records);
        records = rest;
    }

    let total_chunks = chunks.len();
    debug!(
        "Dispatching {} chunks of up to {} rows across {} workers",
        total_chunks,
        chunk_size,
        worker_width.max(1)
    );

    let mut handles = Vec::with_capacity(total_chunks);
    for (index, chunk) in chunks.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let transform = transform.clone();
        let chunk_rows = chunk.len();

        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| EngineError::chunk_failed(index, e.to_string()))?;

            let worker = task::spawn_blocking(move || transform(index, chunk));
            match tokio::time::timeout(timeout, worker).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(EngineError::chunk_failed(
                    index,
                    format!("worker panicked: {}", join_error),
                )),
                Err(_) => Err(EngineError::chunk_failed(
                    index,
                    format!("timed out after {:?}", timeout),
                )),
            }
        });
        handles.push((handle, chunk_rows));
    }

    // Collecting in spawn order merges by chunk index, not by completion
    // order.
    let (handles, chunk_row_counts): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let joined = join_all(handles).await;

    let mut outputs = Vec::with_capacity(total_chunks);
    let mut stats = ChunkRunStats {
        chunks_dispatched: total_chunks,
        ..Default::default()
    };
    for (index, (joined, chunk_rows)) in joined.into_iter().zip(chunk_row_counts).enumerate() {
        let outcome = match joined {
            Ok(result) => result,
            Err(join_error) => Err(EngineError::chunk_failed(
                index,
                format!("task aborted: {}", join_error),
            )),
        };
        match outcome {
            Ok(output) => outputs.push(output),
            Err(e) => {
                error!("Chunk {} dropped: {}", index, e);
                stats.chunks_failed += 1;
                stats.rows_dropped += chunk_rows;
            }
        }
    }

    if outputs.is_empty() {
        return Err(EngineError::NoChunksSucceeded {
            total: total_chunks,
        });
    }

    Ok(ChunkRunOutput { outputs, stats })
}
