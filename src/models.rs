//! Core data structures for the ingestion pipeline.
//!
//! Defines raw input records, the validation-issue taxonomy, and the
//! aggregate result returned to persistence and presentation collaborators.

use crate::buffer::TypedBuffer;
use crate::optimize::OptimizeReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single untyped cell value as read from the input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Text(String),
    Number(f64),
    Empty,
}

impl RawValue {
    /// View the cell as trimmed text, if it carries any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            _ => None,
        }
    }

    /// Whether the cell is blank (empty variant or whitespace-only text)
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Number(_) => false,
        }
    }

    /// Render the original value for issue reporting
    pub fn display(&self) -> String {
        match self {
            RawValue::Text(s) => s.clone(),
            RawValue::Number(n) => n.to_string(),
            RawValue::Empty => String::new(),
        }
    }
}

/// One input row, positionally aligned to the batch header list.
///
/// Immutable once read; owned by the chunk that contains it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub cells: Vec<RawValue>,
}

impl RawRecord {
    pub fn new(cells: Vec<RawValue>) -> Self {
        Self { cells }
    }

    /// Cell at a header position, treating short rows as trailing blanks
    pub fn cell(&self, index: usize) -> &RawValue {
        static EMPTY: RawValue = RawValue::Empty;
        self.cells.get(index).unwrap_or(&EMPTY)
    }
}

/// A fully materialized finite input: shared headers plus rows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBatch {
    pub headers: Vec<String>,
    pub rows: Vec<RawRecord>,
}

impl RawBatch {
    pub fn new(headers: Vec<String>, rows: Vec<RawRecord>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Which stage of the pipeline an issue originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueCategory {
    SchemaMapping,
    TypeCoercion,
    MissingReference,
    Validation,
    Processing,
    System,
}

/// Severity of a validation issue, from fatal to informational
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

/// A single data-quality finding, accumulated and never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub category: IssueCategory,
    pub severity: Severity,
    pub message: String,
    pub details: Option<String>,
    pub row_index: Option<usize>,
    pub column_name: Option<String>,
    pub original_value: Option<String>,
    pub suggested_fix: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ValidationIssue {
    pub fn new(category: IssueCategory, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            details: None,
            row_index: None,
            column_name: None,
            original_value: None,
            suggested_fix: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_row(mut self, row_index: usize) -> Self {
        self.row_index = Some(row_index);
        self
    }

    pub fn with_column(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = Some(column_name.into());
        self
    }

    pub fn with_original_value(mut self, value: impl Into<String>) -> Self {
        self.original_value = Some(value.into());
        self
    }

    pub fn with_suggested_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    /// Human-readable location string ("row 12, column 'result_value'")
    pub fn location(&self) -> String {
        match (self.row_index, self.column_name.as_deref()) {
            (Some(row), Some(col)) => format!("row {}, column '{}'", row, col),
            (Some(row), None) => format!("row {}", row),
            (None, Some(col)) => format!("column '{}'", col),
            (None, None) => "dataset".to_string(),
        }
    }
}

/// Counters and measurements collected across a pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Highest resident-memory reading observed during the run, in MB
    pub peak_memory_mb: Option<u64>,
    pub chunks_dispatched: usize,
    pub chunks_failed: usize,
    /// Rows lost to dropped chunks
    pub rows_dropped: usize,
    pub processing_time_ms: u128,
    /// Footprint report from the memory optimizer, when it ran
    pub optimization: Option<OptimizeReport>,
}

/// Aggregate outcome of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// True when no Critical-severity issue is present
    pub success: bool,
    pub data: Option<TypedBuffer>,
    /// Critical and Error severity issues
    pub errors: Vec<ValidationIssue>,
    /// Warning and Info severity issues
    pub warnings: Vec<ValidationIssue>,
    pub processed_rows: usize,
    pub total_rows: usize,
    pub metadata: RunMetadata,
}

impl ProcessingResult {
    /// Assemble a result from accumulated issues, preserving issue order
    pub fn from_issues(
        data: Option<TypedBuffer>,
        issues: Vec<ValidationIssue>,
        processed_rows: usize,
        total_rows: usize,
        metadata: RunMetadata,
    ) -> Self {
        let success = !issues.iter().any(|i| i.severity == Severity::Critical);
        let (errors, warnings): (Vec<_>, Vec<_>) = issues
            .into_iter()
            .partition(|i| matches!(i.severity, Severity::Critical | Severity::Error));

        Self {
            success,
            data,
            errors,
            warnings,
            processed_rows,
            total_rows,
            metadata,
        }
    }

    /// All issues in severity buckets, errors first
    pub fn all_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().chain(self.warnings.iter())
    }

    /// Processed rows as a percentage of total rows
    pub fn success_rate(&self) -> f64 {
        if self.total_rows == 0 {
            return 100.0;
        }
        (self.processed_rows as f64 / self.total_rows as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_value_blank_detection() {
        assert!(RawValue::Empty.is_blank());
        assert!(RawValue::Text("   ".to_string()).is_blank());
        assert!(!RawValue::Text("nd".to_string()).is_blank());
        assert!(!RawValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_short_row_reads_as_blank() {
        let record = RawRecord::new(vec![RawValue::Number(1.0)]);
        assert_eq!(record.cell(0), &RawValue::Number(1.0));
        assert_eq!(record.cell(5), &RawValue::Empty);
    }

    #[test]
    fn test_issue_builder_and_location() {
        let issue = ValidationIssue::new(
            IssueCategory::TypeCoercion,
            Severity::Warning,
            "unparseable numeric value",
        )
        .with_row(12)
        .with_column("result_value")
        .with_original_value("abc")
        .with_suggested_fix("enter a numeric value");

        assert_eq!(issue.location(), "row 12, column 'result_value'");
        assert_eq!(issue.original_value.as_deref(), Some("abc"));
    }

    #[test]
    fn test_result_success_depends_on_critical() {
        let critical = ValidationIssue::new(
            IssueCategory::SchemaMapping,
            Severity::Critical,
            "missing required field",
        );
        let warning =
            ValidationIssue::new(IssueCategory::TypeCoercion, Severity::Warning, "bad cell");

        let failed =
            ProcessingResult::from_issues(None, vec![critical, warning.clone()], 0, 10, RunMetadata::default());
        assert!(!failed.success);
        assert_eq!(failed.errors.len(), 1);
        assert_eq!(failed.warnings.len(), 1);

        let ok = ProcessingResult::from_issues(None, vec![warning], 10, 10, RunMetadata::default());
        assert!(ok.success);
        assert_eq!(ok.success_rate(), 100.0);
    }
}
