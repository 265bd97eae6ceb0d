//! Human-readable reporting of validation issues.
//!
//! Turns a [`ProcessingResult`] into a severity-grouped report for display
//! at the boundary. Formatting never fails and never mutates the result;
//! issues the formatter does not recognize fall through with their raw
//! message intact.

use crate::models::{IssueCategory, ProcessingResult, Severity, ValidationIssue};
use serde::{Deserialize, Serialize};

/// One issue prepared for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedIssue {
    pub message: String,
    /// "row N, column 'name'" when known
    pub location: Option<String>,
    pub suggested_fix: Option<String>,
}

impl FormattedIssue {
    fn from_issue(issue: &ValidationIssue) -> Self {
        let suggested_fix = issue
            .suggested_fix
            .clone()
            .or_else(|| default_suggestion(issue).map(str::to_string));
        let location = (issue.row_index.is_some() || issue.column_name.is_some())
            .then(|| issue.location());
        Self {
            message: issue.message.clone(),
            location,
            suggested_fix,
        }
    }
}

/// Severity-grouped report over one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueReport {
    pub success: bool,
    pub processed_rows: usize,
    pub total_rows: usize,
    pub success_rate: f64,
    pub critical: Vec<FormattedIssue>,
    pub errors: Vec<FormattedIssue>,
    pub warnings: Vec<FormattedIssue>,
    pub info: Vec<FormattedIssue>,
}

impl IssueReport {
    /// Build a report from a run result. Infallible.
    pub fn from_result(result: &ProcessingResult) -> Self {
        let mut report = Self {
            success: result.success,
            processed_rows: result.processed_rows,
            total_rows: result.total_rows,
            success_rate: result.success_rate(),
            critical: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            info: Vec::new(),
        };
        for issue in result.all_issues() {
            let formatted = FormattedIssue::from_issue(issue);
            match issue.severity {
                Severity::Critical => report.critical.push(formatted),
                Severity::Error => report.errors.push(formatted),
                Severity::Warning => report.warnings.push(formatted),
                Severity::Info => report.info.push(formatted),
            }
        }
        report
    }

    pub fn issue_count(&self) -> usize {
        self.critical.len() + self.errors.len() + self.warnings.len() + self.info.len()
    }

    pub fn has_blocking_issues(&self) -> bool {
        !self.critical.is_empty()
    }

    /// Render the report as plain text, one section per non-empty severity
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Processed {}/{} rows ({:.1}% success)\n",
            self.processed_rows,
            self.total_rows,
            self.success_rate
        ));

        let sections: [(&str, &[FormattedIssue]); 4] = [
            ("CRITICAL", &self.critical),
            ("ERROR", &self.errors),
            ("WARNING", &self.warnings),
            ("INFO", &self.info),
        ];
        for (label, issues) in sections {
            if issues.is_empty() {
                continue;
            }
            out.push_str(&format!("\n{} ({})\n", label, issues.len()));
            for issue in issues {
                match &issue.location {
                    Some(location) => {
                        out.push_str(&format!("  - [{}] {}\n", location, issue.message))
                    }
                    None => out.push_str(&format!("  - {}\n", issue.message)),
                }
                if let Some(fix) = &issue.suggested_fix {
                    out.push_str(&format!("    fix: {}\n", fix));
                }
            }
        }
        out
    }
}

/// Category-driven next step when the issue carries no suggestion of its own
fn default_suggestion(issue: &ValidationIssue) -> Option<&'static str> {
    match issue.category {
        IssueCategory::SchemaMapping => {
            Some("Rename the column header to a recognized name, or add a synonym to the schema")
        }
        IssueCategory::TypeCoercion => {
            Some("Check the source cell for stray characters or a wrong format")
        }
        IssueCategory::MissingReference => {
            Some("Supply the reference value in the source data to avoid imputation")
        }
        IssueCategory::Validation => Some("Review the flagged rows against the schema rules"),
        IssueCategory::Processing | IssueCategory::System => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunMetadata;

    fn result_with_issues(issues: Vec<ValidationIssue>) -> ProcessingResult {
        ProcessingResult::from_issues(None, issues, 8, 10, RunMetadata::default())
    }

    #[test]
    fn test_issues_grouped_by_severity() {
        let result = result_with_issues(vec![
            ValidationIssue::new(
                IssueCategory::SchemaMapping,
                Severity::Critical,
                "Required field 'sample_id' not found",
            ),
            ValidationIssue::new(IssueCategory::TypeCoercion, Severity::Warning, "odd value")
                .with_row(3)
                .with_column("result_value"),
            ValidationIssue::new(IssueCategory::Processing, Severity::Info, "note"),
        ]);

        let report = IssueReport::from_result(&result);
        assert_eq!(report.critical.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.info.len(), 1);
        assert!(report.errors.is_empty());
        assert!(report.has_blocking_issues());
        assert_eq!(report.issue_count(), 3);
    }

    #[test]
    fn test_explicit_suggestion_wins_over_category_default() {
        let result = result_with_issues(vec![
            ValidationIssue::new(IssueCategory::TypeCoercion, Severity::Warning, "bad cell")
                .with_suggested_fix("Use a plain decimal number"),
            ValidationIssue::new(IssueCategory::TypeCoercion, Severity::Warning, "bad cell"),
        ]);

        let report = IssueReport::from_result(&result);
        assert_eq!(
            report.warnings[0].suggested_fix.as_deref(),
            Some("Use a plain decimal number")
        );
        assert!(
            report.warnings[1]
                .suggested_fix
                .as_deref()
                .unwrap()
                .contains("stray characters")
        );
    }

    #[test]
    fn test_render_skips_empty_sections() {
        let result = result_with_issues(vec![ValidationIssue::new(
            IssueCategory::Validation,
            Severity::Warning,
            "threshold exceeded",
        )
        .with_row(12)
        .with_column("result_value")]);

        let rendered = IssueReport::from_result(&result).render();
        assert!(rendered.contains("WARNING (1)"));
        assert!(rendered.contains("row 12, column 'result_value'"));
        assert!(!rendered.contains("CRITICAL"));
        assert!(!rendered.contains("ERROR ("));
    }

    #[test]
    fn test_report_of_clean_result() {
        let report = IssueReport::from_result(&result_with_issues(Vec::new()));
        assert!(report.success);
        assert_eq!(report.issue_count(), 0);
        assert!(!report.has_blocking_issues());
    }
}
