//! Group-wise imputation of missing reference values.
//!
//! Rows with an empty reference cell borrow the most frequent value among
//! sibling rows sharing the same group key (e.g. a missing threshold is
//! taken from other rows of the same test item). Ties break toward the
//! smallest value so repeated runs agree. The pass is idempotent: a second
//! run over a filled buffer changes nothing and reports nothing. Rows with
//! no donor are left empty silently; callers report them once after the
//! pass via [`unresolved_reference_warnings`].

use crate::buffer::{Column, TypedBuffer};
use crate::error::{EngineError, Result};
use crate::models::{IssueCategory, Severity, ValidationIssue};
use std::collections::HashMap;
use tracing::debug;

/// Fill empty cells of `reference_field` using the per-group mode over
/// `group_key_field`. Returns one Info issue per filled cell; the buffer
/// is updated in place.
pub fn fill_missing_references(
    buffer: &mut TypedBuffer,
    group_key_field: &str,
    reference_field: &str,
) -> Result<Vec<ValidationIssue>> {
    let group_keys = buffer.text_values(group_key_field)?;

    match buffer.column(reference_field) {
        Some(Column::Float64(_)) => fill_numeric(buffer, &group_keys, group_key_field, reference_field),
        Some(Column::Text(_)) => fill_text(buffer, &group_keys, group_key_field, reference_field),
        Some(other) => Err(EngineError::ColumnTypeMismatch {
            name: reference_field.to_string(),
            expected: "float64 or text",
            found: other.type_name(),
        }),
        None => Err(EngineError::column_not_found(reference_field)),
    }
}

fn fill_numeric(
    buffer: &mut TypedBuffer,
    group_keys: &[String],
    group_key_field: &str,
    reference_field: &str,
) -> Result<Vec<ValidationIssue>> {
    let values = buffer.float_column(reference_field)?.clone();

    // Most frequent non-empty value per group, ties toward the smallest
    let mut counts: HashMap<&str, HashMap<u64, (usize, f64)>> = HashMap::new();
    for (key, value) in group_keys.iter().zip(values.iter()) {
        if key.is_empty() {
            continue;
        }
        if let Some(v) = value {
            let entry = counts
                .entry(key.as_str())
                .or_default()
                .entry(v.to_bits())
                .or_insert((0, *v));
            entry.0 += 1;
        }
    }
    let modes: HashMap<&str, f64> = counts
        .iter()
        .map(|(key, by_value)| {
            let (_, mode) = by_value.values().fold((0usize, f64::INFINITY), |acc, &(n, v)| {
                if n > acc.0 || (n == acc.0 && v < acc.1) {
                    (n, v)
                } else {
                    acc
                }
            });
            (*key, mode)
        })
        .collect();

    let mut issues = Vec::new();
    let mut filled = values;
    for (row, (key, value)) in group_keys.iter().zip(filled.iter_mut()).enumerate() {
        if value.is_some() || key.is_empty() {
            continue;
        }
        if let Some(&mode) = modes.get(key.as_str()) {
            *value = Some(mode);
            debug!(
                "Filled missing '{}' at row {} from group '{}'",
                reference_field, row, key
            );
            issues.push(
                ValidationIssue::new(
                    IssueCategory::MissingReference,
                    Severity::Info,
                    format!(
                        "Missing '{}' filled with {} from other '{}' rows",
                        reference_field, mode, key
                    ),
                )
                .with_row(row)
                .with_column(reference_field.to_string())
                .with_details(format!("{} = '{}'", group_key_field, key)),
            );
        }
    }

    buffer.replace_column(reference_field, Column::Float64(filled))?;
    Ok(issues)
}

fn fill_text(
    buffer: &mut TypedBuffer,
    group_keys: &[String],
    group_key_field: &str,
    reference_field: &str,
) -> Result<Vec<ValidationIssue>> {
    let values = buffer.text_values(reference_field)?;

    let mut counts: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
    for (key, value) in group_keys.iter().zip(values.iter()) {
        if key.is_empty() || value.is_empty() {
            continue;
        }
        *counts
            .entry(key.as_str())
            .or_default()
            .entry(value.as_str())
            .or_insert(0) += 1;
    }
    // Ties toward the lexicographically smallest value
    let modes: HashMap<&str, String> = counts
        .iter()
        .map(|(key, by_value)| {
            let mut candidates: Vec<(&str, usize)> =
                by_value.iter().map(|(v, n)| (*v, *n)).collect();
            candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
            (*key, candidates[0].0.to_string())
        })
        .collect();

    let mut issues = Vec::new();
    let mut filled = values;
    for (row, key) in group_keys.iter().enumerate() {
        if !filled[row].is_empty() || key.is_empty() {
            continue;
        }
        if let Some(mode) = modes.get(key.as_str()) {
            filled[row] = mode.clone();
            issues.push(
                ValidationIssue::new(
                    IssueCategory::MissingReference,
                    Severity::Info,
                    format!(
                        "Missing '{}' filled with '{}' from other '{}' rows",
                        reference_field, mode, key
                    ),
                )
                .with_row(row)
                .with_column(reference_field.to_string())
                .with_details(format!("{} = '{}'", group_key_field, key)),
            );
        }
    }

    buffer.replace_column(reference_field, Column::Text(filled))?;
    Ok(issues)
}

/// Warnings for reference cells still empty after an imputation pass.
///
/// Called once by the pipeline after the fill, so rows that can never be
/// resolved are reported exactly once rather than on every pass.
pub fn unresolved_reference_warnings(
    buffer: &TypedBuffer,
    group_key_field: &str,
    reference_field: &str,
) -> Result<Vec<ValidationIssue>> {
    let group_keys = buffer.text_values(group_key_field)?;
    let empty_rows: Vec<usize> = match buffer.column(reference_field) {
        Some(Column::Float64(values)) => values
            .iter()
            .enumerate()
            .filter_map(|(row, v)| v.is_none().then_some(row))
            .collect(),
        Some(Column::Text(values)) => values
            .iter()
            .enumerate()
            .filter_map(|(row, v)| v.is_empty().then_some(row))
            .collect(),
        Some(other) => {
            return Err(EngineError::ColumnTypeMismatch {
                name: reference_field.to_string(),
                expected: "float64 or text",
                found: other.type_name(),
            });
        }
        None => return Err(EngineError::column_not_found(reference_field)),
    };

    Ok(empty_rows
        .into_iter()
        .map(|row| no_donor_warning(reference_field, group_key_field, &group_keys[row], row))
        .collect())
}

fn no_donor_warning(
    reference_field: &str,
    group_key_field: &str,
    key: &str,
    row: usize,
) -> ValidationIssue {
    ValidationIssue::new(
        IssueCategory::MissingReference,
        Severity::Warning,
        format!(
            "Missing '{}' could not be filled: no sibling row with {} = '{}' has a value",
            reference_field, group_key_field, key
        ),
    )
    .with_row(row)
    .with_column(reference_field.to_string())
}
