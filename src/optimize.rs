//! Columnar memory optimization.
//!
//! Rewrites a typed buffer into a smaller-footprint representation without
//! changing logical values: integer columns downcast losslessly to the
//! smallest width that holds their observed range, low-cardinality text
//! columns become dictionary-coded, and floats shrink to f32 only when the
//! caller has explicitly opted into lossy reduction. Rows are never
//! reordered and columns are never dropped.

use crate::buffer::{Column, TypedBuffer};
use crate::config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One column rewrite performed by the optimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnChange {
    pub column: String,
    pub from_repr: String,
    pub to_repr: String,
    pub lossy: bool,
}

/// Before/after footprint report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub bytes_before: usize,
    pub bytes_after: usize,
    pub changes: Vec<ColumnChange>,
}

impl OptimizeReport {
    /// Percentage reduction of the estimated footprint
    pub fn reduction_pct(&self) -> f64 {
        if self.bytes_before == 0 {
            return 0.0;
        }
        (self.bytes_before.saturating_sub(self.bytes_after)) as f64
            / self.bytes_before as f64
            * 100.0
    }
}

/// Columnar memory optimizer
#[derive(Debug, Clone)]
pub struct MemoryOptimizer {
    low_cardinality_threshold: f64,
    allow_lossy_float_downcast: bool,
}

impl MemoryOptimizer {
    pub fn new(low_cardinality_threshold: f64, allow_lossy_float_downcast: bool) -> Self {
        Self {
            low_cardinality_threshold,
            allow_lossy_float_downcast,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.low_cardinality_threshold,
            config.allow_lossy_float_downcast,
        )
    }

    /// Optimize every column of the buffer, returning the rewritten buffer
    /// and a footprint report.
    pub fn optimize(&self, buffer: TypedBuffer) -> (TypedBuffer, OptimizeReport) {
        let bytes_before = buffer.estimated_bytes();
        let mut changes = Vec::new();
        let mut optimized = TypedBuffer::new();

        let names: Vec<String> = buffer.field_names().to_vec();
        let columns: Vec<Column> = names
            .iter()
            .map(|n| buffer.column(n).expect("field names match columns").clone())
            .collect();

        for (name, column) in names.into_iter().zip(columns) {
            let from_repr = column.type_name();
            let (rewritten, lossy) = self.optimize_column(column);
            if rewritten.type_name() != from_repr {
                debug!(
                    "Column '{}' rewritten: {} -> {}",
                    name,
                    from_repr,
                    rewritten.type_name()
                );
                changes.push(ColumnChange {
                    column: name.clone(),
                    from_repr: from_repr.to_string(),
                    to_repr: rewritten.type_name().to_string(),
                    lossy,
                });
            }
            optimized
                .add_column(name, rewritten)
                .expect("optimization preserves column lengths");
        }

        let report = OptimizeReport {
            bytes_before,
            bytes_after: optimized.estimated_bytes(),
            changes,
        };
        (optimized, report)
    }

    fn optimize_column(&self, column: Column) -> (Column, bool) {
        match column {
            Column::Int64(v) => (downcast_ints(v), false),
            Column::Int32(v) => {
                (downcast_ints(v.into_iter().map(|o| o.map(i64::from)).collect()), false)
            }
            Column::Int16(v) => {
                (downcast_ints(v.into_iter().map(|o| o.map(i64::from)).collect()), false)
            }
            Column::Float64(v) if self.allow_lossy_float_downcast => {
                let narrowed = v.into_iter().map(|o| o.map(|f| f as f32)).collect();
                (Column::Float32(narrowed), true)
            }
            Column::Text(v) => self.maybe_dictionary(v),
            other => (other, false),
        }
    }

    fn maybe_dictionary(&self, values: Vec<String>) -> (Column, bool) {
        if values.is_empty() {
            return (Column::Text(values), false);
        }

        let mut index_of: HashMap<&str, u32> = HashMap::new();
        let mut distinct: Vec<&str> = Vec::new();
        for value in &values {
            if !index_of.contains_key(value.as_str()) {
                index_of.insert(value.as_str(), distinct.len() as u32);
                distinct.push(value.as_str());
            }
        }

        let ratio = distinct.len() as f64 / values.len() as f64;
        if ratio >= self.low_cardinality_threshold {
            return (Column::Text(values), false);
        }

        let indices: Vec<u32> = values.iter().map(|v| index_of[v.as_str()]).collect();
        let dictionary = Column::Dictionary {
            values: distinct.into_iter().map(str::to_string).collect(),
            indices,
        };
        (dictionary, false)
    }
}

/// Downcast an integer column to the smallest signed or unsigned width
/// that represents the observed min/max exactly.
fn downcast_ints(values: Vec<Option<i64>>) -> Column {
    let observed: Vec<i64> = values.iter().flatten().copied().collect();
    let Some((&min, &max)) = observed
        .iter()
        .min()
        .zip(observed.iter().max())
    else {
        // All-empty column: the narrowest width is trivially lossless
        return Column::Int8(values.into_iter().map(|_| None).collect());
    };

    if min >= 0 {
        if max <= u8::MAX as i64 {
            return Column::UInt8(values.into_iter().map(|o| o.map(|v| v as u8)).collect());
        }
        if max <= u16::MAX as i64 {
            return Column::UInt16(values.into_iter().map(|o| o.map(|v| v as u16)).collect());
        }
        if max <= u32::MAX as i64 {
            return Column::UInt32(values.into_iter().map(|o| o.map(|v| v as u32)).collect());
        }
        return Column::Int64(values);
    }

    if min >= i8::MIN as i64 && max <= i8::MAX as i64 {
        return Column::Int8(values.into_iter().map(|o| o.map(|v| v as i8)).collect());
    }
    if min >= i16::MIN as i64 && max <= i16::MAX as i64 {
        return Column::Int16(values.into_iter().map(|o| o.map(|v| v as i16)).collect());
    }
    if min >= i32::MIN as i64 && max <= i32::MAX as i64 {
        return Column::Int32(values.into_iter().map(|o| o.map(|v| v as i32)).collect());
    }
    Column::Int64(values)
}
