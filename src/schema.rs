//! Canonical field schema for lab-report ingestion.
//!
//! A schema is an ordered list of [`CanonicalField`]s, each describing one
//! semantic slot independent of how it is spelled in any given input.
//! Declaration order matters: the resolver breaks all ties by it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Closed value domain for judgement-like enum fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDomain {
    /// (canonical value, accepted spellings) in priority order
    pub variants: Vec<(String, Vec<String>)>,
}

impl EnumDomain {
    /// Normalize a raw value into the closed set, if it is recognized
    pub fn normalize(&self, raw: &str) -> Option<&str> {
        let folded = raw.trim().to_lowercase();
        for (canonical, spellings) in &self.variants {
            if canonical.eq_ignore_ascii_case(&folded)
                || spellings.iter().any(|s| s.eq_ignore_ascii_case(&folded))
            {
                return Some(canonical);
            }
        }
        None
    }
}

/// Target type of a canonical field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldKind {
    Numeric,
    Timestamp,
    Enum(EnumDomain),
    Text,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Numeric => "numeric",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Enum(_) => "enum",
            FieldKind::Text => "text",
        }
    }
}

/// One semantic slot in the target schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalField {
    /// Canonical field name used throughout the typed buffer
    pub name: String,

    /// A missing required field makes the whole run unusable for analysis
    pub required: bool,

    /// Exact-match spellings (compared after header normalization, case-folded)
    pub synonyms: Vec<String>,

    /// Keyword bucket for substring fuzzy matching
    pub keywords: Vec<String>,

    pub kind: FieldKind,
}

impl CanonicalField {
    pub fn new(name: impl Into<String>, required: bool, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            required,
            synonyms: Vec::new(),
            keywords: Vec::new(),
            kind,
        }
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// Confidence of a header-to-field association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchConfidence {
    /// Header matched a declared synonym exactly
    Exact,
    /// Header matched by keyword/substring overlap
    Fuzzy,
}

/// One resolved header-to-field association
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedColumn {
    /// Position of the header in the input
    pub header_index: usize,
    pub raw_header: String,
    pub field_name: String,
    pub confidence: MatchConfidence,
}

/// Outcome of resolving input headers against a schema.
///
/// Produced once per input and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub columns: Vec<MappedColumn>,
    pub unmapped_raw_headers: Vec<String>,
    pub missing_required_fields: Vec<String>,
}

impl ColumnMapping {
    /// Look up the mapping for a canonical field, if any header resolved to it
    pub fn column_for_field(&self, field_name: &str) -> Option<&MappedColumn> {
        self.columns.iter().find(|c| c.field_name == field_name)
    }

    /// Whether every required field found a header
    pub fn is_complete(&self) -> bool {
        self.missing_required_fields.is_empty()
    }
}

/// The default environmental lab-report schema.
///
/// Shared read-only across resolution calls and chunk workers.
pub fn lab_report_schema() -> Arc<Vec<CanonicalField>> {
    let judgement_domain = EnumDomain {
        variants: vec![
            (
                "pass".to_string(),
                vec![
                    "ok".to_string(),
                    "passed".to_string(),
                    "compliant".to_string(),
                    "acceptable".to_string(),
                    "within limit".to_string(),
                ],
            ),
            (
                "fail".to_string(),
                vec![
                    "failed".to_string(),
                    "exceeded".to_string(),
                    "non-compliant".to_string(),
                    "noncompliant".to_string(),
                    "over limit".to_string(),
                ],
            ),
            (
                "attention".to_string(),
                vec![
                    "review".to_string(),
                    "borderline".to_string(),
                    "marginal".to_string(),
                ],
            ),
        ],
    };

    Arc::new(vec![
        CanonicalField::new("sample_id", true, FieldKind::Text)
            .with_synonyms(["sample_id", "sample id", "sample no", "sample no.", "sample number"])
            .with_keywords(["sample", "specimen", "point"]),
        CanonicalField::new("test_item", true, FieldKind::Text)
            .with_synonyms(["test_item", "test item", "parameter", "analyte", "determinand"])
            .with_keywords(["item", "test", "parameter", "analyte"]),
        CanonicalField::new("result_value", true, FieldKind::Numeric)
            .with_synonyms(["result_value", "result", "value", "measured value", "concentration"])
            .with_keywords(["result", "value", "conc", "measure"]),
        CanonicalField::new("unit", false, FieldKind::Text)
            .with_synonyms(["unit", "units", "uom"])
            .with_keywords(["unit"]),
        CanonicalField::new("threshold", false, FieldKind::Numeric)
            .with_synonyms(["threshold", "limit", "limit value", "standard limit", "mac"])
            .with_keywords(["limit", "threshold", "standard"]),
        CanonicalField::new("judgement", false, FieldKind::Enum(judgement_domain))
            .with_synonyms(["judgement", "judgment", "assessment", "compliance", "verdict"])
            .with_keywords(["judge", "assess", "comply", "verdict", "status"]),
        CanonicalField::new("sampled_at", false, FieldKind::Timestamp)
            .with_synonyms(["sampled_at", "sample date", "sampling date", "date sampled", "date"])
            .with_keywords(["date", "time", "sampled"]),
        CanonicalField::new("remark", false, FieldKind::Text)
            .with_synonyms(["remark", "remarks", "comment", "comments", "note", "notes"])
            .with_keywords(["remark", "comment", "note"]),
    ])
}
