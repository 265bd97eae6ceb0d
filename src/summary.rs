//! Derived aggregate summaries over typed buffers.
//!
//! These are the "expensive derived computations" routed through the
//! adaptive cache by the pipeline: per-group descriptive statistics of a
//! numeric column, grouped by a text column.

use crate::buffer::TypedBuffer;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Descriptive statistics for one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: String,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Per-group count/mean/min/max of `value_field`, grouped by `group_field`.
///
/// Rows with an empty group key or an empty value are skipped. Groups are
/// returned sorted by name so repeated calls agree.
pub fn summarize_by_group(
    buffer: &TypedBuffer,
    group_field: &str,
    value_field: &str,
) -> Result<Vec<GroupSummary>> {
    let groups = buffer.text_values(group_field)?;
    let values = buffer.float_column(value_field)?;

    let mut accumulators: HashMap<&str, (usize, f64, f64, f64)> = HashMap::new();
    for (group, value) in groups.iter().zip(values.iter()) {
        if group.is_empty() {
            continue;
        }
        let Some(v) = value else { continue };
        let entry = accumulators
            .entry(group.as_str())
            .or_insert((0, 0.0, f64::INFINITY, f64::NEG_INFINITY));
        entry.0 += 1;
        entry.1 += v;
        entry.2 = entry.2.min(*v);
        entry.3 = entry.3.max(*v);
    }

    let mut summaries: Vec<GroupSummary> = accumulators
        .into_iter()
        .map(|(group, (count, sum, min, max))| GroupSummary {
            group: group.to_string(),
            count,
            mean: sum / count as f64,
            min,
            max,
        })
        .collect();
    summaries.sort_by(|a, b| a.group.cmp(&b.group));
    Ok(summaries)
}

/// Deterministic content fingerprint over selected buffer columns, used to
/// key cached summaries.
pub fn buffer_fingerprint(buffer: &TypedBuffer, fields: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    buffer.num_rows().hash(&mut hasher);
    for field in fields {
        field.hash(&mut hasher);
        if let Some(column) = buffer.column(field) {
            for value in column.decode() {
                match value {
                    crate::buffer::TypedValue::Int(i) => i.hash(&mut hasher),
                    crate::buffer::TypedValue::Float(f) => f.to_bits().hash(&mut hasher),
                    crate::buffer::TypedValue::Timestamp(ts) => {
                        ts.and_utc().timestamp().hash(&mut hasher)
                    }
                    crate::buffer::TypedValue::Text(s) => s.hash(&mut hasher),
                    crate::buffer::TypedValue::Empty => 0u8.hash(&mut hasher),
                }
            }
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Column;

    fn buffer() -> TypedBuffer {
        let mut buffer = TypedBuffer::new();
        buffer
            .add_column(
                "test_item",
                Column::Text(vec![
                    "lead".into(),
                    "lead".into(),
                    "zinc".into(),
                    "zinc".into(),
                    String::new(),
                ]),
            )
            .unwrap();
        buffer
            .add_column(
                "result_value",
                Column::Float64(vec![Some(0.4), Some(0.6), Some(2.0), None, Some(9.0)]),
            )
            .unwrap();
        buffer
    }

    #[test]
    fn test_group_statistics() {
        let summaries = summarize_by_group(&buffer(), "test_item", "result_value").unwrap();
        assert_eq!(summaries.len(), 2);

        let lead = &summaries[0];
        assert_eq!(lead.group, "lead");
        assert_eq!(lead.count, 2);
        assert!((lead.mean - 0.5).abs() < 1e-9);
        assert_eq!(lead.min, 0.4);
        assert_eq!(lead.max, 0.6);

        // zinc's empty value row is skipped
        assert_eq!(summaries[1].count, 1);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = buffer();
        let b = buffer();
        assert_eq!(
            buffer_fingerprint(&a, &["test_item", "result_value"]),
            buffer_fingerprint(&b, &["test_item", "result_value"])
        );

        let mut changed = buffer();
        changed
            .replace_column(
                "result_value",
                Column::Float64(vec![Some(0.4), Some(0.6), Some(2.0), None, Some(9.1)]),
            )
            .unwrap();
        assert_ne!(
            buffer_fingerprint(&a, &["test_item", "result_value"]),
            buffer_fingerprint(&changed, &["test_item", "result_value"])
        );
    }
}
