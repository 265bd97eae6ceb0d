//! Sequential streaming path for bounded-read sources.
//!
//! Reads fixed-size chunks from a CSV source in order and applies the
//! transform inline, with no cross-chunk dispatch, to bound peak memory.
//! After each chunk the current memory reading is checked against a
//! high-water threshold; exceeding it triggers an explicit reclamation pass
//! before reading continues.

use super::memory;
use crate::error::Result;
use crate::models::{RawRecord, RawValue};
use std::io::Read;
use tracing::{debug, error, warn};

/// Pull-based chunk source over a CSV stream
pub struct CsvChunkSource<R: Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    chunk_size: usize,
    rows_read: usize,
}

impl<R: Read> CsvChunkSource<R> {
    /// Open a source, reading the header row immediately
    pub fn new(reader: R, chunk_size: usize) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        Ok(Self {
            reader,
            headers,
            chunk_size: chunk_size.max(1),
            rows_read: 0,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Rows handed out so far
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    /// Read the next chunk, or `None` at end of input
    pub fn next_chunk(&mut self) -> Result<Option<Vec<RawRecord>>> {
        let mut rows = Vec::with_capacity(self.chunk_size);
        for record in self.reader.records() {
            let record = record?;
            rows.push(RawRecord::new(
                record
                    .iter()
                    .map(|cell| {
                        if cell.trim().is_empty() {
                            RawValue::Empty
                        } else {
                            RawValue::Text(cell.to_string())
                        }
                    })
                    .collect(),
            ));
            if rows.len() >= self.chunk_size {
                break;
            }
        }
        if rows.is_empty() {
            return Ok(None);
        }
        self.rows_read += rows.len();
        Ok(Some(rows))
    }
}

/// Counters from one sequential run
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStats {
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub rows_dropped: usize,
    /// Number of high-water reclamation passes triggered
    pub reclamations: usize,
}

/// Drive a chunk source to completion, applying `transform` inline.
///
/// `reclaim` is invoked over the accumulated outputs whenever the current
/// memory reading exceeds `high_water_mb`. Chunk failures are isolated the
/// same way as on the parallel path.
pub fn process_sequential<R, T, F, G>(
    source: &mut CsvChunkSource<R>,
    high_water_mb: u64,
    mut transform: F,
    mut reclaim: G,
) -> Result<(Vec<T>, SequentialStats)>
where
    R: Read,
    F: FnMut(usize, Vec<RawRecord>) -> Result<T>,
    G: FnMut(&mut Vec<T>),
{
    let mut outputs = Vec::new();
    let mut stats = SequentialStats::default();
    let mut chunk_index = 0usize;

    while let Some(chunk) = source.next_chunk()? {
        let chunk_rows = chunk.len();
        match transform(chunk_index, chunk) {
            Ok(output) => outputs.push(output),
            Err(e) => {
                error!("Chunk {} dropped: {}", chunk_index, e);
                stats.chunks_failed += 1;
                stats.rows_dropped += chunk_rows;
            }
        }
        stats.chunks_processed += 1;
        chunk_index += 1;

        let current_mb = memory::current_used_mb();
        if current_mb > high_water_mb {
            warn!(
                "Memory high-water exceeded ({}MB > {}MB); running reclamation pass",
                current_mb, high_water_mb
            );
            reclaim(&mut outputs);
            stats.reclamations += 1;
        } else {
            debug!(
                "Chunk {} done ({} rows, {}MB in use)",
                chunk_index - 1,
                chunk_rows,
                current_mb
            );
        }
    }

    Ok((outputs, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CSV: &str = "Sample ID,Test Item,Result\n\
                       S-1,lead,0.5\n\
                       S-2,lead,0.7\n\
                       S-3,zinc,1.1\n\
                       S-4,zinc,\n\
                       S-5,zinc,0.9\n";

    #[test]
    fn test_headers_read_eagerly() {
        let source = CsvChunkSource::new(Cursor::new(CSV), 2).unwrap();
        assert_eq!(source.headers(), &["Sample ID", "Test Item", "Result"]);
    }

    #[test]
    fn test_chunks_are_fixed_size_in_order() {
        let mut source = CsvChunkSource::new(Cursor::new(CSV), 2).unwrap();
        let first = source.next_chunk().unwrap().unwrap();
        let second = source.next_chunk().unwrap().unwrap();
        let third = source.next_chunk().unwrap().unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(third.len(), 1);
        assert!(source.next_chunk().unwrap().is_none());
        assert_eq!(source.rows_read(), 5);

        assert_eq!(first[0].cell(0), &RawValue::Text("S-1".to_string()));
        assert_eq!(third[0].cell(0), &RawValue::Text("S-5".to_string()));
    }

    #[test]
    fn test_blank_cells_become_empty() {
        let mut source = CsvChunkSource::new(Cursor::new(CSV), 10).unwrap();
        let chunk = source.next_chunk().unwrap().unwrap();
        assert_eq!(chunk[3].cell(2), &RawValue::Empty);
    }

    #[test]
    fn test_sequential_processing_preserves_order() {
        let mut source = CsvChunkSource::new(Cursor::new(CSV), 2).unwrap();
        let (outputs, stats) = process_sequential(
            &mut source,
            u64::MAX / 2, // never trips
            |index, chunk| Ok((index, chunk.len())),
            |_| {},
        )
        .unwrap();

        assert_eq!(outputs, vec![(0, 2), (1, 2), (2, 1)]);
        assert_eq!(stats.chunks_processed, 3);
        assert_eq!(stats.reclamations, 0);
    }

    #[test]
    fn test_reclamation_triggered_below_high_water() {
        let mut source = CsvChunkSource::new(Cursor::new(CSV), 2).unwrap();
        // Threshold of zero guarantees every chunk trips the check
        let (_, stats) = process_sequential(
            &mut source,
            0,
            |_, chunk| Ok(chunk.len()),
            |outputs| outputs.shrink_to_fit(),
        )
        .unwrap();

        assert_eq!(stats.reclamations, 3);
    }

    #[test]
    fn test_sequential_chunk_failure_is_isolated() {
        let mut source = CsvChunkSource::new(Cursor::new(CSV), 2).unwrap();
        let (outputs, stats) = process_sequential(
            &mut source,
            u64::MAX / 2,
            |index, chunk| {
                if index == 1 {
                    Err(crate::error::EngineError::chunk_failed(index, "bad chunk"))
                } else {
                    Ok(chunk.len())
                }
            },
            |_| {},
        )
        .unwrap();

        assert_eq!(outputs, vec![2, 1]);
        assert_eq!(stats.chunks_failed, 1);
        assert_eq!(stats.rows_dropped, 2);
    }
}
