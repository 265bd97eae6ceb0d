//! Row order preservation across the parallel and streaming paths

use super::{lab_batch, lab_headers, lab_row};
use crate::coerce;
use crate::config::EngineConfig;
use crate::models::{IssueCategory, Severity, ValidationIssue};
use crate::processor::{IngestPipeline, merge_outputs, remap_row_indices};
use crate::resolver;
use crate::schema::lab_report_schema;
use std::io::Cursor;

fn pipeline(chunk_size: usize, workers: usize) -> IngestPipeline {
    let config = EngineConfig::default()
        .with_chunk_size(chunk_size)
        .with_workers(workers);
    IngestPipeline::with_default_schema(config).unwrap()
}

#[tokio::test]
async fn test_large_batch_preserves_row_order() {
    // Chunks complete in arbitrary order on 4 workers; the merged buffer
    // must still read back in input order.
    let rows: Vec<_> = (0..10_000)
        .map(|i| lab_row(&format!("S-{:05}", i), "lead", "0.5", "1.0"))
        .collect();

    let result = pipeline(1000, 4).run_batch(lab_batch(rows)).await.unwrap();
    assert!(result.success);
    assert_eq!(result.processed_rows, 10_000);
    assert_eq!(result.metadata.chunks_dispatched, 10);

    let buffer = result.data.as_ref().unwrap();
    let samples = buffer.text_values("sample_id").unwrap();
    for (i, sample) in samples.iter().enumerate() {
        assert_eq!(sample, &format!("S-{:05}", i));
    }
}

#[tokio::test]
async fn test_streaming_matches_batch_output() {
    let mut csv = String::from("Sample No.,Test Item,Result,Limit\n");
    for i in 0..100 {
        csv.push_str(&format!("S-{:03},lead,0.{},1.0\n", i, i % 10));
    }

    let pipeline = pipeline(16, 2);
    let streamed = pipeline
        .run_csv_stream(Cursor::new(csv.clone()))
        .await
        .unwrap();
    assert!(streamed.success);
    assert_eq!(streamed.processed_rows, 100);
    assert_eq!(streamed.total_rows, 100);

    let buffer = streamed.data.as_ref().unwrap();
    let samples = buffer.text_values("sample_id").unwrap();
    assert_eq!(samples[0], "S-000");
    assert_eq!(samples[99], "S-099");
    for (i, sample) in samples.iter().enumerate() {
        assert_eq!(sample, &format!("S-{:03}", i));
    }
}

#[tokio::test]
async fn test_row_indices_in_issues_are_global() {
    // A broken cell in the second chunk reports its original row index
    let mut rows: Vec<_> = (0..30)
        .map(|i| lab_row(&format!("S-{:03}", i), "lead", "0.5", "1.0"))
        .collect();
    rows[25] = lab_row("S-025", "lead", "unreadable", "1.0");

    let result = pipeline(10, 2).run_batch(lab_batch(rows)).await.unwrap();
    let warning = result
        .warnings
        .iter()
        .find(|i| i.original_value.as_deref() == Some("unreadable"))
        .unwrap();
    assert_eq!(warning.row_index, Some(25));
}

#[test]
fn test_dropped_chunks_do_not_shift_reported_row_indices() {
    let schema = lab_report_schema();
    let headers = lab_headers();
    let (mapping, _) = resolver::resolve(&headers, &schema);

    let rows: Vec<_> = (0..6)
        .map(|i| lab_row(&format!("S-{:03}", i), "lead", "0.5", "1.0"))
        .collect();

    // Middle chunk (rows 2..4) dropped; surviving chunks keep their offsets
    let first = coerce::coerce_records(&rows[0..2], &mapping, &schema, 0);
    let last = coerce::coerce_records(&rows[4..6], &mapping, &schema, 4);
    let (buffer, _, _, row_map) = merge_outputs(vec![first, last]).unwrap();

    assert_eq!(buffer.num_rows(), 4);
    assert_eq!(row_map, vec![0, 1, 4, 5]);

    // An issue raised at merged position 2 names original input row 4
    let mut issues = vec![
        ValidationIssue::new(IssueCategory::MissingReference, Severity::Info, "filled")
            .with_row(2),
    ];
    remap_row_indices(&mut issues, &row_map);
    assert_eq!(issues[0].row_index, Some(4));
}
