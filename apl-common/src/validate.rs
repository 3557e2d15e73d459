//! Submission validation and batch preparation
//!
//! Runs before the merge engine: malformed submissions are rejected with
//! their issues and duplicates within one batch are dropped, so the engine
//! only sees records worth merging.

use crate::identity::{normalize_doi, IdentityResolver};
use crate::record::{Record, Value};
use crate::schema::{names, SchemaRegistry};
use std::fmt;
use tracing::{debug, info};

/// Fields holding links, checked for an http(s) scheme
const LINK_FIELDS: [&str; 2] = [names::PAPER_URL, names::PROJECT_URL];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingRequired { field: String },
    MalformedDoi { value: String },
    MalformedUrl { field: String, value: String },
    UnknownCategory { unique_name: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingRequired { field } => {
                write!(f, "required field '{field}' is empty")
            }
            ValidationIssue::MalformedDoi { value } => write!(f, "malformed DOI '{value}'"),
            ValidationIssue::MalformedUrl { field, value } => {
                write!(f, "field '{field}' is not an http(s) URL: '{value}'")
            }
            ValidationIssue::UnknownCategory { unique_name } => {
                write!(f, "unknown or disabled category '{unique_name}'")
            }
        }
    }
}

/// `10.<digits>/<non-empty suffix>`
fn is_well_formed_doi(normalized: &str) -> bool {
    let Some(rest) = normalized.strip_prefix("10.") else {
        return false;
    };
    match rest.split_once('/') {
        Some((registrant, suffix)) => {
            !registrant.is_empty()
                && registrant.chars().all(|c| c.is_ascii_digit() || c == '.')
                && registrant.starts_with(|c: char| c.is_ascii_digit())
                && !suffix.trim().is_empty()
        }
        None => false,
    }
}

fn is_http_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    ["http://", "https://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

/// Every problem found in one submission (empty when valid)
pub fn validate_record(
    registry: &SchemaRegistry,
    resolver: &IdentityResolver,
    record: &Record,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for field in registry.required_fields() {
        if record.get(field).map_or(true, Value::is_empty) {
            issues.push(ValidationIssue::MissingRequired {
                field: field.name.clone(),
            });
        }
    }

    let doi = record.doi();
    if !doi.trim().is_empty() {
        let normalized = normalize_doi(doi, resolver.conflict_marker_token());
        if !is_well_formed_doi(&normalized) {
            issues.push(ValidationIssue::MalformedDoi {
                value: doi.to_string(),
            });
        }
    }

    for name in LINK_FIELDS {
        let Some(field) = registry.field(name).filter(|f| f.is_active()) else {
            continue;
        };
        if let Some(value) = record.get(field).and_then(Value::as_str) {
            let value = value.trim();
            if !value.is_empty() && !is_http_url(value) {
                issues.push(ValidationIssue::MalformedUrl {
                    field: field.name.clone(),
                    value: value.to_string(),
                });
            }
        }
    }

    for unique_name in record.categories().iter() {
        let known = registry
            .category(unique_name)
            .is_some_and(|c| c.enabled);
        if !known {
            issues.push(ValidationIssue::UnknownCategory {
                unique_name: unique_name.to_string(),
            });
        }
    }

    issues
}

/// Submission rejected by validation
#[derive(Debug, Clone)]
pub struct Rejected {
    pub record: Record,
    pub issues: Vec<ValidationIssue>,
}

/// Result of [`prepare_batch`]
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    /// Valid, pairwise non-duplicate submissions in input order
    pub accepted: Vec<Record>,
    pub rejected: Vec<Rejected>,
    /// Valid submissions dropped as duplicates of an earlier accepted one
    pub duplicates: Vec<Record>,
}

impl PreparedBatch {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Validate a batch and drop intra-batch duplicates
pub fn prepare_batch(
    registry: &SchemaRegistry,
    resolver: &IdentityResolver,
    records: Vec<Record>,
) -> PreparedBatch {
    let mut batch = PreparedBatch::default();

    for record in records {
        let issues = validate_record(registry, resolver, &record);
        if !issues.is_empty() {
            debug!(title = %record.title(), issues = issues.len(), "Submission rejected");
            batch.rejected.push(Rejected { record, issues });
            continue;
        }
        if resolver.is_duplicate_submission(registry, &batch.accepted, &record) {
            debug!(title = %record.title(), "Duplicate within batch dropped");
            batch.duplicates.push(record);
            continue;
        }
        batch.accepted.push(record);
    }

    info!(
        accepted = batch.accepted.len(),
        rejected = batch.rejected.len(),
        duplicates = batch.duplicates.len(),
        "Batch prepared"
    );
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CategorySet;

    fn submission(registry: &SchemaRegistry, doi: &str, title: &str, category: &str) -> Record {
        Record::blank(registry)
            .with(registry.core_field(names::DOI), doi)
            .unwrap()
            .with(registry.core_field(names::TITLE), title)
            .unwrap()
            .with(registry.core_field(names::CATEGORY), CategorySet::parse(category))
            .unwrap()
    }

    #[test]
    fn test_valid_submission_has_no_issues() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        let record = submission(&registry, "https://doi.org/10.1145/3.4", "Foo", "method")
            .with(registry.core_field(names::PAPER_URL), "https://arxiv.org/abs/1")
            .unwrap();
        assert!(validate_record(&registry, &resolver, &record).is_empty());
    }

    #[test]
    fn test_empty_doi_is_allowed() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        let record = submission(&registry, "", "Foo", "survey");
        assert!(validate_record(&registry, &resolver, &record).is_empty());
    }

    #[test]
    fn test_reports_each_problem() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        let record = submission(&registry, "not-a-doi", "", "nonexistent")
            .with(registry.core_field(names::PROJECT_URL), "github.com/x")
            .unwrap();

        let issues = validate_record(&registry, &resolver, &record);
        assert!(issues.contains(&ValidationIssue::MissingRequired {
            field: "title".to_string()
        }));
        assert!(issues.contains(&ValidationIssue::MalformedDoi {
            value: "not-a-doi".to_string()
        }));
        assert!(issues.contains(&ValidationIssue::MalformedUrl {
            field: "project_url".to_string(),
            value: "github.com/x".to_string()
        }));
        assert!(issues.contains(&ValidationIssue::UnknownCategory {
            unique_name: "nonexistent".to_string()
        }));
    }

    #[test]
    fn test_missing_category_is_reported() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        let record = submission(&registry, "10.1/a", "Foo", "");
        assert_eq!(
            validate_record(&registry, &resolver, &record),
            vec![ValidationIssue::MissingRequired {
                field: "category".to_string()
            }]
        );
    }

    #[test]
    fn test_doi_shape() {
        assert!(is_well_formed_doi("10.1145/3340531.3412"));
        assert!(is_well_formed_doi("10.1000.10/abc"));
        assert!(!is_well_formed_doi("10./abc"));
        assert!(!is_well_formed_doi("10.1145"));
        assert!(!is_well_formed_doi("10.1145/"));
        assert!(!is_well_formed_doi("11.1/abc"));
    }

    #[test]
    fn test_prepare_batch_splits_records() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        let records = vec![
            submission(&registry, "10.1/a", "Alpha", "method"),
            submission(&registry, "https://doi.org/10.1/A", "Alpha", "method"),
            submission(&registry, "10.1/b", "", "method"),
            submission(&registry, "10.1/a", "Alpha revised", "method"),
        ];

        let batch = prepare_batch(&registry, &resolver, records);
        assert_eq!(batch.accepted.len(), 2);
        assert_eq!(batch.duplicates.len(), 1);
        assert_eq!(batch.rejected.len(), 1);
        assert!(!batch.is_clean());
        // Same identity but different fields is kept for the merge engine
        assert_eq!(batch.accepted[1].title(), "Alpha revised");
    }
}
