//! Schema resolution: mapping arbitrary input headers onto canonical fields.
//!
//! Resolution is a two-pass strategy table evaluated in schema declaration
//! order: exact/alias matching first, then keyword fuzzy matching for
//! whatever is left. Given identical headers and schema the mapping and the
//! ordered issue list are reproducible; ties always break toward the earlier
//! field declaration and the earlier header.

use crate::models::{IssueCategory, Severity, ValidationIssue};
use crate::schema::{CanonicalField, ColumnMapping, MappedColumn, MatchConfidence};
use tracing::debug;

/// Normalize a raw header for matching: trim, fold embedded line breaks,
/// collapse internal whitespace runs to single spaces.
pub fn normalize_header(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve input headers against a canonical field schema.
///
/// Returns the mapping plus the ordered issue list: fuzzy-match warnings,
/// missing-field issues (Critical for required, Warning for recommended),
/// then one Info per header that matched nothing.
pub fn resolve(headers: &[String], schema: &[CanonicalField]) -> (ColumnMapping, Vec<ValidationIssue>) {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let folded: Vec<String> = normalized.iter().map(|h| h.to_lowercase()).collect();

    let mut columns: Vec<MappedColumn> = Vec::new();
    let mut issues: Vec<ValidationIssue> = Vec::new();
    let mut field_taken = vec![false; schema.len()];
    let mut header_mapped = vec![false; headers.len()];

    // Pass 1: exact/alias matches, schema declaration order breaks ties
    for (header_index, header) in folded.iter().enumerate() {
        for (field_index, field) in schema.iter().enumerate() {
            if field_taken[field_index] {
                continue;
            }
            if field.synonyms.iter().any(|s| s.eq_ignore_ascii_case(header)) {
                columns.push(MappedColumn {
                    header_index,
                    raw_header: headers[header_index].clone(),
                    field_name: field.name.clone(),
                    confidence: MatchConfidence::Exact,
                });
                field_taken[field_index] = true;
                header_mapped[header_index] = true;
                break;
            }
        }
    }

    // Pass 2: keyword fuzzy matches for headers still unmapped
    for (header_index, header) in folded.iter().enumerate() {
        if header_mapped[header_index] {
            continue;
        }
        for (field_index, field) in schema.iter().enumerate() {
            if field_taken[field_index] {
                continue;
            }
            if field.keywords.iter().any(|k| header.contains(k.as_str())) {
                debug!(
                    "Fuzzy-mapped header '{}' to field '{}'",
                    headers[header_index], field.name
                );
                columns.push(MappedColumn {
                    header_index,
                    raw_header: headers[header_index].clone(),
                    field_name: field.name.clone(),
                    confidence: MatchConfidence::Fuzzy,
                });
                issues.push(
                    ValidationIssue::new(
                        IssueCategory::SchemaMapping,
                        Severity::Warning,
                        format!(
                            "Column '{}' was inferred to be '{}' by keyword match",
                            headers[header_index], field.name
                        ),
                    )
                    .with_column(field.name.clone())
                    .with_original_value(headers[header_index].clone())
                    .with_suggested_fix(format!(
                        "Rename the column to '{}' to make the mapping explicit",
                        field.name
                    )),
                );
                field_taken[field_index] = true;
                header_mapped[header_index] = true;
                break;
            }
        }
    }

    // Unmapped fields: Critical when required, Warning when recommended
    let mut missing_required_fields = Vec::new();
    let unmapped_headers: Vec<(usize, &String)> = normalized
        .iter()
        .enumerate()
        .filter(|(i, _)| !header_mapped[*i])
        .collect();

    for (field_index, field) in schema.iter().enumerate() {
        if field_taken[field_index] {
            continue;
        }
        if field.required {
            missing_required_fields.push(field.name.clone());
            issues.push(
                ValidationIssue::new(
                    IssueCategory::SchemaMapping,
                    Severity::Critical,
                    format!("Required field '{}' has no matching column", field.name),
                )
                .with_column(field.name.clone())
                .with_suggested_fix(missing_field_suggestion(field, &unmapped_headers)),
            );
        } else {
            issues.push(
                ValidationIssue::new(
                    IssueCategory::SchemaMapping,
                    Severity::Warning,
                    format!("Recommended field '{}' has no matching column", field.name),
                )
                .with_column(field.name.clone())
                .with_suggested_fix(format!(
                    "Add a '{}' column if the data is available",
                    field.name
                )),
            );
        }
    }

    // Leftover headers: informational only, dropped downstream
    let unmapped_raw_headers: Vec<String> = unmapped_headers
        .iter()
        .map(|(i, _)| headers[*i].clone())
        .collect();

    for raw in &unmapped_raw_headers {
        issues.push(
            ValidationIssue::new(
                IssueCategory::SchemaMapping,
                Severity::Info,
                format!("Column '{}' matched no schema field and will be ignored", raw),
            )
            .with_original_value(raw.clone()),
        );
    }

    let mapping = ColumnMapping {
        columns,
        unmapped_raw_headers,
        missing_required_fields,
    };

    (mapping, issues)
}

/// Suggestion text for a missing required field: name up to 3 unmapped
/// headers whose normalized text overlaps the field's keyword bucket.
fn missing_field_suggestion(
    field: &CanonicalField,
    unmapped_headers: &[(usize, &String)],
) -> String {
    let candidates: Vec<&str> = unmapped_headers
        .iter()
        .filter(|(_, h)| {
            let folded = h.to_lowercase();
            field.keywords.iter().any(|k| folded.contains(k.as_str()))
        })
        .take(3)
        .map(|(_, h)| h.as_str())
        .collect();

    if candidates.is_empty() {
        format!("Add a column for '{}' to the input", field.name)
    } else {
        format!(
            "Add a column for '{}'; possibly related input columns: {}",
            field.name,
            candidates.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::lab_report_schema;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_header_folds_whitespace() {
        assert_eq!(normalize_header("  Sample\nName "), "Sample Name");
        assert_eq!(normalize_header("Test\t\tItem"), "Test Item");
    }

    #[test]
    fn test_exact_match_wins_over_fuzzy() {
        let schema = lab_report_schema();
        let (mapping, _) = resolve(&headers(&["Result", "Sample ID", "Test Item"]), &schema);

        let result = mapping.column_for_field("result_value").unwrap();
        assert_eq!(result.confidence, MatchConfidence::Exact);
        assert_eq!(result.raw_header, "Result");
    }

    #[test]
    fn test_fuzzy_mapping_emits_warning() {
        // All three required fields resolve via keyword matching
        let schema = lab_report_schema();
        let (mapping, issues) = resolve(
            &headers(&["Sample Name", "Test Item", "Result"]),
            &schema,
        );

        assert!(mapping.is_complete());
        assert!(mapping.column_for_field("sample_id").is_some());
        assert!(mapping.column_for_field("test_item").is_some());
        assert!(mapping.column_for_field("result_value").is_some());
        assert!(!issues.iter().any(|i| i.severity == Severity::Critical));
        // "Sample Name" is a fuzzy match for sample_id
        assert!(
            issues
                .iter()
                .any(|i| i.severity == Severity::Warning
                    && i.column_name.as_deref() == Some("sample_id"))
        );
    }

    #[test]
    fn test_missing_required_field_is_critical() {
        // Nothing resembles test_item
        let schema = lab_report_schema();
        let (mapping, issues) = resolve(&headers(&["Sample ID", "Result"]), &schema);

        assert_eq!(mapping.missing_required_fields, vec!["test_item".to_string()]);
        let critical: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].column_name.as_deref(), Some("test_item"));
    }

    #[test]
    fn test_unknown_header_is_informational() {
        let schema = lab_report_schema();
        let (mapping, issues) = resolve(
            &headers(&["Sample ID", "Test Item", "Result", "Lab Bench"]),
            &schema,
        );

        assert_eq!(mapping.unmapped_raw_headers, vec!["Lab Bench".to_string()]);
        assert!(
            issues
                .iter()
                .any(|i| i.severity == Severity::Info
                    && i.original_value.as_deref() == Some("Lab Bench"))
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let schema = lab_report_schema();
        let input = headers(&["Sample Name", "Analyte", "Measured Value", "Limit", "Extra"]);

        let (first_mapping, first_issues) = resolve(&input, &schema);
        for _ in 0..10 {
            let (mapping, issues) = resolve(&input, &schema);
            assert_eq!(
                format!("{:?}", mapping.columns),
                format!("{:?}", first_mapping.columns)
            );
            assert_eq!(issues.len(), first_issues.len());
            for (a, b) in issues.iter().zip(first_issues.iter()) {
                assert_eq!(a.message, b.message);
                assert_eq!(a.severity, b.severity);
            }
        }
    }

    #[test]
    fn test_missing_field_suggestion_lists_candidates() {
        let schema = lab_report_schema();
        let (_, issues) = resolve(&headers(&["Sample ID", "Result"]), &schema);
        let critical = issues
            .iter()
            .find(|i| i.severity == Severity::Critical)
            .unwrap();
        // No overlapping header: generic suggestion
        assert!(critical.suggested_fix.as_deref().unwrap().contains("test_item"));
    }

    #[test]
    fn test_duplicate_headers_map_first_occurrence() {
        let schema = lab_report_schema();
        let (mapping, _) = resolve(
            &headers(&["Result", "Result", "Sample ID", "Test Item"]),
            &schema,
        );

        let result = mapping.column_for_field("result_value").unwrap();
        assert_eq!(result.header_index, 0);
        assert_eq!(mapping.unmapped_raw_headers, vec!["Result".to_string()]);
    }
}
