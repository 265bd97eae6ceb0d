//! Integration tests for the pipeline module
//!
//! Exercises the full ingestion workflow over in-memory lab report batches
//! and CSV streams.

pub mod ordering;

use crate::models::{RawBatch, RawRecord, RawValue};

/// Header set that exactly matches the built-in lab report schema
pub fn lab_headers() -> Vec<String> {
    [
        "Sample No.",
        "Test Item",
        "Result",
        "Unit",
        "Limit",
        "Judgement",
        "Sample Date",
        "Remarks",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// One well-formed lab report row
pub fn lab_row(sample: &str, item: &str, result: &str, limit: &str) -> RawRecord {
    RawRecord::new(vec![
        RawValue::Text(sample.to_string()),
        RawValue::Text(item.to_string()),
        RawValue::Text(result.to_string()),
        RawValue::Text("mg/L".to_string()),
        if limit.is_empty() {
            RawValue::Empty
        } else {
            RawValue::Text(limit.to_string())
        },
        RawValue::Text("Pass".to_string()),
        RawValue::Text("2024-03-01 10:00:00".to_string()),
        RawValue::Empty,
    ])
}

pub fn lab_batch(rows: Vec<RawRecord>) -> RawBatch {
    RawBatch::new(lab_headers(), rows)
}
