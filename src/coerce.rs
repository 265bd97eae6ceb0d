//! Type coercion and validation of raw cells into typed domain values.
//!
//! Every converter is applied independently per cell and never aborts the
//! row: a failed cell degrades to the field's empty value and emits one
//! Warning. Column-level aggregate errors are computed over the whole batch
//! once per-chunk failure counts have been merged.

use crate::buffer::{Column, TypedBuffer};
use crate::models::{IssueCategory, RawRecord, Severity, ValidationIssue};
use crate::schema::{CanonicalField, ColumnMapping, FieldKind};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Earliest year accepted by the timestamp converter
const MIN_TIMESTAMP_YEAR: i32 = 1900;
/// Years beyond the current year still accepted by the timestamp converter
const MAX_FUTURE_YEARS: i32 = 10;

fn numeric_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?").unwrap())
}

/// Output of coercing one slice of records
#[derive(Debug, Default)]
pub struct CoercionOutput {
    pub buffer: TypedBuffer,
    pub issues: Vec<ValidationIssue>,
    /// Failed-cell count per canonical field, for batch-level aggregation
    pub failure_counts: HashMap<String, usize>,
    /// Global index of the first record in this slice
    pub row_offset: usize,
}

/// Coerce a slice of records into a typed buffer.
///
/// `row_offset` is the global index of the first record, so issues emitted
/// from chunk workers carry original row positions.
pub fn coerce_records(
    rows: &[RawRecord],
    mapping: &ColumnMapping,
    schema: &[CanonicalField],
    row_offset: usize,
) -> CoercionOutput {
    let mut output = CoercionOutput {
        row_offset,
        ..Default::default()
    };

    for field in schema {
        let source = mapping.column_for_field(&field.name);
        let column = match &field.kind {
            FieldKind::Numeric => coerce_numeric_column(rows, source.map(|c| c.header_index), field, row_offset, &mut output),
            FieldKind::Timestamp => coerce_timestamp_column(rows, source.map(|c| c.header_index), field, row_offset, &mut output),
            FieldKind::Enum(_) | FieldKind::Text => coerce_text_column(rows, source.map(|c| c.header_index), field, row_offset, &mut output),
        };
        // Layout is identical across chunks: one column per schema field,
        // empty when no header resolved to it.
        output
            .buffer
            .add_column(field.name.clone(), column)
            .expect("columns built from the same row slice share a length");
    }

    output
}

/// Convenience full-batch entry point matching the layer contract
pub fn coerce(
    rows: &[RawRecord],
    mapping: &ColumnMapping,
    schema: &[CanonicalField],
    failure_threshold: f64,
) -> (TypedBuffer, Vec<ValidationIssue>) {
    let mut output = coerce_records(rows, mapping, schema, 0);
    let aggregate = aggregate_column_errors(
        &output.failure_counts,
        rows.len(),
        mapping,
        schema,
        failure_threshold,
    );
    output.issues.extend(aggregate);
    (output.buffer, output.issues)
}

/// Emit one aggregate Error per required column whose failure proportion
/// exceeds the configured threshold.
pub fn aggregate_column_errors(
    failure_counts: &HashMap<String, usize>,
    total_rows: usize,
    mapping: &ColumnMapping,
    schema: &[CanonicalField],
    failure_threshold: f64,
) -> Vec<ValidationIssue> {
    if total_rows == 0 {
        return Vec::new();
    }

    let mut issues = Vec::new();
    for field in schema {
        if !field.required || mapping.column_for_field(&field.name).is_none() {
            continue;
        }
        let failed = failure_counts.get(&field.name).copied().unwrap_or(0);
        let proportion = failed as f64 / total_rows as f64;
        if proportion > failure_threshold {
            issues.push(
                ValidationIssue::new(
                    IssueCategory::TypeCoercion,
                    Severity::Error,
                    format!(
                        "Column '{}' failed coercion for {:.0}% of rows ({} of {})",
                        field.name,
                        proportion * 100.0,
                        failed,
                        total_rows
                    ),
                )
                .with_column(field.name.clone())
                .with_suggested_fix(
                    "Check the source column for systematic formatting problems",
                ),
            );
        }
    }
    issues
}

fn coerce_numeric_column(
    rows: &[RawRecord],
    header_index: Option<usize>,
    field: &CanonicalField,
    row_offset: usize,
    output: &mut CoercionOutput,
) -> Column {
    let mut values = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let Some(index) = header_index else {
            values.push(None);
            continue;
        };
        let cell = row.cell(index);
        if cell.is_blank() {
            values.push(None);
            continue;
        }
        if let crate::models::RawValue::Number(n) = cell {
            values.push(Some(*n));
            continue;
        }
        let text = cell.as_text().unwrap_or_default();
        match parse_numeric(text) {
            Some(value) => values.push(Some(value)),
            None => {
                values.push(None);
                *output.failure_counts.entry(field.name.clone()).or_insert(0) += 1;
                output.issues.push(
                    ValidationIssue::new(
                        IssueCategory::TypeCoercion,
                        Severity::Warning,
                        format!("Value '{}' could not be read as a number", text),
                    )
                    .with_row(row_offset + i)
                    .with_column(field.name.clone())
                    .with_original_value(text)
                    .with_suggested_fix(
                        "Enter a numeric value or a recognized non-detection token",
                    ),
                );
            }
        }
    }
    Column::Float64(values)
}

fn coerce_timestamp_column(
    rows: &[RawRecord],
    header_index: Option<usize>,
    field: &CanonicalField,
    row_offset: usize,
    output: &mut CoercionOutput,
) -> Column {
    let mut values = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let Some(index) = header_index else {
            values.push(None);
            continue;
        };
        let cell = row.cell(index);
        if cell.is_blank() {
            values.push(None);
            continue;
        }
        let text = cell.display();
        match parse_timestamp(text.trim()) {
            Some(ts) => values.push(Some(ts)),
            None => {
                values.push(None);
                *output.failure_counts.entry(field.name.clone()).or_insert(0) += 1;
                output.issues.push(
                    ValidationIssue::new(
                        IssueCategory::TypeCoercion,
                        Severity::Warning,
                        format!("Value '{}' could not be read as a date/time", text.trim()),
                    )
                    .with_row(row_offset + i)
                    .with_column(field.name.clone())
                    .with_original_value(text.trim())
                    .with_suggested_fix("Use an ISO-style date such as 2024-03-01 14:30:00"),
                );
            }
        }
    }
    Column::Timestamp(values)
}

fn coerce_text_column(
    rows: &[RawRecord],
    header_index: Option<usize>,
    field: &CanonicalField,
    row_offset: usize,
    output: &mut CoercionOutput,
) -> Column {
    let mut values = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let Some(index) = header_index else {
            values.push(String::new());
            continue;
        };
        let cell = row.cell(index);
        let text = cell.display().trim().to_string();
        if text.is_empty() {
            values.push(String::new());
            continue;
        }

        if let FieldKind::Enum(domain) = &field.kind {
            match domain.normalize(&text) {
                Some(canonical) => values.push(canonical.to_string()),
                None => {
                    // Unrecognized judgement values pass through unchanged
                    output.issues.push(
                        ValidationIssue::new(
                            IssueCategory::Validation,
                            Severity::Warning,
                            format!(
                                "Value '{}' is not a recognized {} value",
                                text, field.name
                            ),
                        )
                        .with_row(row_offset + i)
                        .with_column(field.name.clone())
                        .with_original_value(text.clone())
                        .with_suggested_fix("Use one of the standard judgement values"),
                    );
                    values.push(text);
                }
            }
        } else {
            values.push(text);
        }
    }
    Column::Text(values)
}

/// Parse a numeric cell. Recognized non-detection tokens and censored
/// values ("not detected", "nd", a leading `<`) convert to `0.0`; otherwise
/// the first numeric substring is extracted and parsed.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let folded = text.trim().to_lowercase();
    if folded.is_empty() {
        return None;
    }
    if folded == "nd" || folded == "n.d." || folded == "not detected" || folded.starts_with('<') {
        return Some(0.0);
    }
    numeric_pattern()
        .find(&folded)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Parse a timestamp cell against an ordered ladder of formats. A parsed
/// year outside the sane window is rejected as if unparsed.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

    let parsed = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    let year = parsed.year();
    let max_year = Utc::now().year() + MAX_FUTURE_YEARS;
    if !(MIN_TIMESTAMP_YEAR..=max_year).contains(&year) {
        return None;
    }
    Some(parsed)
}
