//! Typed columnar buffer produced by the coercion layer.
//!
//! Columns are nullable except for text, where absence is an empty string.
//! Integer variants exist in every width the memory optimizer can downcast
//! to; the coercion layer itself only produces `Float64`, `Timestamp`, and
//! `Text` columns.

use crate::error::{EngineError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::mem::size_of;

/// A single typed cell value, as seen by consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    Int(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    Text(String),
    Empty,
}

/// One column of typed values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Int8(Vec<Option<i8>>),
    Int16(Vec<Option<i16>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    UInt8(Vec<Option<u8>>),
    UInt16(Vec<Option<u16>>),
    UInt32(Vec<Option<u32>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    Text(Vec<String>),
    /// Dictionary-coded text: each cell is an index into `values`
    Dictionary { values: Vec<String>, indices: Vec<u32> },
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int8(v) => v.len(),
            Column::Int16(v) => v.len(),
            Column::Int32(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::UInt8(v) => v.len(),
            Column::UInt16(v) => v.len(),
            Column::UInt32(v) => v.len(),
            Column::Float32(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Timestamp(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Dictionary { indices, .. } => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Int8(_) => "int8",
            Column::Int16(_) => "int16",
            Column::Int32(_) => "int32",
            Column::Int64(_) => "int64",
            Column::UInt8(_) => "uint8",
            Column::UInt16(_) => "uint16",
            Column::UInt32(_) => "uint32",
            Column::Float32(_) => "float32",
            Column::Float64(_) => "float64",
            Column::Timestamp(_) => "timestamp",
            Column::Text(_) => "text",
            Column::Dictionary { .. } => "dictionary",
        }
    }

    /// Logical value at a row index, independent of physical representation
    pub fn get(&self, index: usize) -> TypedValue {
        match self {
            Column::Int8(v) => int_value(v.get(index).copied().flatten().map(i64::from)),
            Column::Int16(v) => int_value(v.get(index).copied().flatten().map(i64::from)),
            Column::Int32(v) => int_value(v.get(index).copied().flatten().map(i64::from)),
            Column::Int64(v) => int_value(v.get(index).copied().flatten()),
            Column::UInt8(v) => int_value(v.get(index).copied().flatten().map(i64::from)),
            Column::UInt16(v) => int_value(v.get(index).copied().flatten().map(i64::from)),
            Column::UInt32(v) => int_value(v.get(index).copied().flatten().map(i64::from)),
            Column::Float32(v) => match v.get(index).copied().flatten() {
                Some(f) => TypedValue::Float(f as f64),
                None => TypedValue::Empty,
            },
            Column::Float64(v) => match v.get(index).copied().flatten() {
                Some(f) => TypedValue::Float(f),
                None => TypedValue::Empty,
            },
            Column::Timestamp(v) => match v.get(index).copied().flatten() {
                Some(ts) => TypedValue::Timestamp(ts),
                None => TypedValue::Empty,
            },
            Column::Text(v) => TypedValue::Text(v.get(index).cloned().unwrap_or_default()),
            Column::Dictionary { values, indices } => {
                let value = indices
                    .get(index)
                    .and_then(|&i| values.get(i as usize))
                    .cloned()
                    .unwrap_or_default();
                TypedValue::Text(value)
            }
        }
    }

    /// Decode the full column into logical values
    pub fn decode(&self) -> Vec<TypedValue> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    /// Approximate heap footprint of the column in bytes
    pub fn estimated_bytes(&self) -> usize {
        match self {
            Column::Int8(v) => v.len() * size_of::<Option<i8>>(),
            Column::Int16(v) => v.len() * size_of::<Option<i16>>(),
            Column::Int32(v) => v.len() * size_of::<Option<i32>>(),
            Column::Int64(v) => v.len() * size_of::<Option<i64>>(),
            Column::UInt8(v) => v.len() * size_of::<Option<u8>>(),
            Column::UInt16(v) => v.len() * size_of::<Option<u16>>(),
            Column::UInt32(v) => v.len() * size_of::<Option<u32>>(),
            Column::Float32(v) => v.len() * size_of::<Option<f32>>(),
            Column::Float64(v) => v.len() * size_of::<Option<f64>>(),
            Column::Timestamp(v) => v.len() * size_of::<Option<NaiveDateTime>>(),
            Column::Text(v) => v.iter().map(|s| size_of::<String>() + s.len()).sum(),
            Column::Dictionary { values, indices } => {
                let dict: usize = values.iter().map(|s| size_of::<String>() + s.len()).sum();
                dict + indices.len() * size_of::<u32>()
            }
        }
    }

    /// Append another column of the same physical type
    pub fn append(&mut self, other: Column) -> Result<()> {
        match (self, other) {
            (Column::Int64(a), Column::Int64(b)) => a.extend(b),
            (Column::Float64(a), Column::Float64(b)) => a.extend(b),
            (Column::Timestamp(a), Column::Timestamp(b)) => a.extend(b),
            (Column::Text(a), Column::Text(b)) => a.extend(b),
            (this, other) => {
                return Err(EngineError::ColumnTypeMismatch {
                    name: "<append>".to_string(),
                    expected: this.type_name(),
                    found: other.type_name(),
                });
            }
        }
        Ok(())
    }

    /// Release any spare vector capacity
    pub fn shrink_to_fit(&mut self) {
        match self {
            Column::Int8(v) => v.shrink_to_fit(),
            Column::Int16(v) => v.shrink_to_fit(),
            Column::Int32(v) => v.shrink_to_fit(),
            Column::Int64(v) => v.shrink_to_fit(),
            Column::UInt8(v) => v.shrink_to_fit(),
            Column::UInt16(v) => v.shrink_to_fit(),
            Column::UInt32(v) => v.shrink_to_fit(),
            Column::Float32(v) => v.shrink_to_fit(),
            Column::Float64(v) => v.shrink_to_fit(),
            Column::Timestamp(v) => v.shrink_to_fit(),
            Column::Text(v) => v.shrink_to_fit(),
            Column::Dictionary { values, indices } => {
                values.shrink_to_fit();
                indices.shrink_to_fit();
            }
        }
    }
}

fn int_value(value: Option<i64>) -> TypedValue {
    match value {
        Some(i) => TypedValue::Int(i),
        None => TypedValue::Empty,
    }
}

/// A typed columnar buffer: named columns of equal length, in field order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypedBuffer {
    fields: Vec<String>,
    columns: Vec<Column>,
}

impl TypedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    /// Add a column; all columns must share the same length
    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.num_rows() {
            return Err(EngineError::configuration(format!(
                "column length {} does not match buffer rows {}",
                column.len(),
                self.num_rows()
            )));
        }
        self.fields.push(name.into());
        self.columns.push(column);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.fields
            .iter()
            .position(|f| f == name)
            .map(|i| &self.columns[i])
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.fields
            .iter()
            .position(|f| f == name)
            .map(|i| &mut self.columns[i])
    }

    /// Replace a column in place, preserving field order
    pub fn replace_column(&mut self, name: &str, column: Column) -> Result<()> {
        let index = self
            .fields
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| EngineError::column_not_found(name))?;
        if column.len() != self.columns[index].len() {
            return Err(EngineError::configuration(
                "replacement column has a different length",
            ));
        }
        self.columns[index] = column;
        Ok(())
    }

    /// Iterate (name, column) pairs in field order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.fields.iter().map(|s| s.as_str()).zip(self.columns.iter())
    }

    /// Nullable f64 view of a numeric column
    pub fn float_column(&self, name: &str) -> Result<&Vec<Option<f64>>> {
        match self.column(name) {
            Some(Column::Float64(v)) => Ok(v),
            Some(other) => Err(EngineError::ColumnTypeMismatch {
                name: name.to_string(),
                expected: "float64",
                found: other.type_name(),
            }),
            None => Err(EngineError::column_not_found(name)),
        }
    }

    /// Text view of a string column (dictionary columns are decoded)
    pub fn text_values(&self, name: &str) -> Result<Vec<String>> {
        match self.column(name) {
            Some(Column::Text(v)) => Ok(v.clone()),
            Some(Column::Dictionary { values, indices }) => Ok(indices
                .iter()
                .map(|&i| values.get(i as usize).cloned().unwrap_or_default())
                .collect()),
            Some(other) => Err(EngineError::ColumnTypeMismatch {
                name: name.to_string(),
                expected: "text",
                found: other.type_name(),
            }),
            None => Err(EngineError::column_not_found(name)),
        }
    }

    /// Approximate heap footprint of the whole buffer in bytes
    pub fn estimated_bytes(&self) -> usize {
        self.columns.iter().map(Column::estimated_bytes).sum()
    }

    /// Release spare capacity across all columns
    pub fn shrink_to_fit(&mut self) {
        for column in &mut self.columns {
            column.shrink_to_fit();
        }
    }

    /// Concatenate buffers with identical layouts, preserving part order
    pub fn concat(parts: Vec<TypedBuffer>) -> Result<TypedBuffer> {
        let mut iter = parts.into_iter();
        let Some(mut merged) = iter.next() else {
            return Ok(TypedBuffer::new());
        };
        for part in iter {
            if part.fields != merged.fields {
                return Err(EngineError::configuration(
                    "cannot concatenate buffers with different layouts",
                ));
            }
            for (target, source) in merged.columns.iter_mut().zip(part.columns) {
                target.append(source)?;
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_rejects_mismatched_lengths() {
        let mut buffer = TypedBuffer::new();
        buffer
            .add_column("a", Column::Float64(vec![Some(1.0), Some(2.0)]))
            .unwrap();
        let result = buffer.add_column("b", Column::Text(vec!["x".to_string()]));
        assert!(result.is_err());
    }

    #[test]
    fn test_logical_values_survive_representation() {
        let int64 = Column::Int64(vec![Some(7), None, Some(-3)]);
        let int8 = Column::Int8(vec![Some(7), None, Some(-3)]);
        assert_eq!(int64.decode(), int8.decode());
    }

    #[test]
    fn test_dictionary_decodes_to_text() {
        let dict = Column::Dictionary {
            values: vec!["pass".to_string(), "fail".to_string()],
            indices: vec![0, 1, 0, 0],
        };
        assert_eq!(dict.get(1), TypedValue::Text("fail".to_string()));
        assert_eq!(dict.get(3), TypedValue::Text("pass".to_string()));
        assert_eq!(dict.len(), 4);
    }

    #[test]
    fn test_concat_preserves_order() {
        let mut a = TypedBuffer::new();
        a.add_column("v", Column::Float64(vec![Some(1.0), Some(2.0)]))
            .unwrap();
        let mut b = TypedBuffer::new();
        b.add_column("v", Column::Float64(vec![Some(3.0)])).unwrap();

        let merged = TypedBuffer::concat(vec![a, b]).unwrap();
        assert_eq!(merged.num_rows(), 3);
        assert_eq!(merged.float_column("v").unwrap()[2], Some(3.0));
    }

    #[test]
    fn test_concat_rejects_layout_mismatch() {
        let mut a = TypedBuffer::new();
        a.add_column("v", Column::Float64(vec![Some(1.0)])).unwrap();
        let mut b = TypedBuffer::new();
        b.add_column("w", Column::Float64(vec![Some(2.0)])).unwrap();

        assert!(TypedBuffer::concat(vec![a, b]).is_err());
    }

    #[test]
    fn test_estimated_bytes_shrinks_with_narrower_ints() {
        let wide = Column::Int64(vec![Some(1); 1000]);
        let narrow = Column::Int8(vec![Some(1); 1000]);
        assert!(narrow.estimated_bytes() < wide.estimated_bytes());
    }
}
