//! Identity Resolver
//!
//! Two separate questions are answered here:
//! - **Same paper?** [`IdentityResolver::same_identity`]: normalized DOIs match,
//!   or trimmed case-insensitive titles match. Either alone is enough, so two
//!   distinct papers sharing a title are treated as the same paper. This is a
//!   known false-positive source and is kept on purpose; re-submissions that
//!   lack a DOI are only caught through the title.
//! - **Same content?** [`IdentityResolver::fields_equal`]: every schema field
//!   except the bookkeeping ones compares equal.
//!
//! A duplicate submission is a record that is both.

use crate::record::{Record, Value};
use crate::schema::{names, FieldDescriptor, FieldType, SchemaRegistry};
use std::collections::HashSet;

/// Token prefixed onto the displayed DOI of conflict shadows
pub const DEFAULT_CONFLICT_MARKER_TOKEN: &str = "[CONFLICT]";

/// Fields ignored by [`IdentityResolver::fields_equal`] unless overridden
pub const DEFAULT_IGNORED_FIELDS: [&str; 4] = [
    names::CONFLICT_MARKER,
    names::SUBMISSION_TIME,
    names::STATUS,
    names::SHOW_IN_OUTPUT,
];

/// Resolver hosts and labels removed from the front of a DOI, checked
/// repeatedly. A scheme is only stripped together with a DOI host.
const DOI_PREFIXES: [&str; 7] = [
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "https://doi.org/",
    "http://doi.org/",
    "dx.doi.org/",
    "doi.org/",
    "doi:",
];

/// Normalize a DOI for comparison
///
/// Removes the conflict-marker token, lower-cases, keeps only what follows the
/// last `doi/`, strips DOI resolver prefixes (with or without scheme), and trims. The result
/// is a fixed point: normalizing it again returns it unchanged.
pub fn normalize_doi(doi: &str, conflict_marker_token: &str) -> String {
    let mut doi = doi.trim().to_string();

    if !conflict_marker_token.is_empty() {
        let lowered_token = conflict_marker_token.to_lowercase();
        while doi.contains(conflict_marker_token) {
            doi = doi.replace(conflict_marker_token, "");
        }
        doi = doi.to_lowercase();
        while doi.contains(&lowered_token) {
            doi = doi.replace(&lowered_token, "");
        }
    } else {
        doi = doi.to_lowercase();
    }

    if let Some(pos) = doi.rfind("doi/") {
        doi = doi[pos + "doi/".len()..].to_string();
    }

    let mut rest = doi.as_str();
    loop {
        rest = rest.trim();
        match DOI_PREFIXES.iter().find(|p| rest.starts_with(*p)) {
            Some(prefix) => rest = &rest[prefix.len()..],
            None => break,
        }
    }

    rest.to_string()
}

/// Normalize a title for identity comparison
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Decides sameness and equality of paper records
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    conflict_marker_token: String,
    ignored_fields: HashSet<String>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CONFLICT_MARKER_TOKEN)
    }
}

impl IdentityResolver {
    /// Create resolver with the default ignored fields
    pub fn new(conflict_marker_token: impl Into<String>) -> Self {
        Self {
            conflict_marker_token: conflict_marker_token.into(),
            ignored_fields: DEFAULT_IGNORED_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the set of fields skipped by [`Self::fields_equal`]
    pub fn with_ignored_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn conflict_marker_token(&self) -> &str {
        &self.conflict_marker_token
    }

    pub fn normalized_doi(&self, record: &Record) -> String {
        normalize_doi(record.doi(), &self.conflict_marker_token)
    }

    /// Same paper: DOI match OR title match (both sides non-empty)
    pub fn same_identity(&self, a: &Record, b: &Record) -> bool {
        let doi_a = self.normalized_doi(a);
        if !doi_a.is_empty() && doi_a == self.normalized_doi(b) {
            return true;
        }

        let title_a = normalize_title(a.title());
        !title_a.is_empty() && title_a == normalize_title(b.title())
    }

    /// Same content: every active schema field except the ignored ones
    pub fn fields_equal(&self, registry: &SchemaRegistry, a: &Record, b: &Record) -> bool {
        registry
            .active_fields()
            .into_iter()
            .filter(|field| !self.ignored_fields.contains(&field.name))
            .all(|field| self.field_equal(field, a, b))
    }

    fn field_equal(&self, field: &FieldDescriptor, a: &Record, b: &Record) -> bool {
        let empty = Value::empty_for(field.field_type);
        let left = a.get(field).unwrap_or(&empty);
        let right = b.get(field).unwrap_or(&empty);

        if field.field_type == FieldType::Bool {
            return left.truthy() == right.truthy();
        }

        if field.name == names::DOI {
            return normalize_doi(&left.to_cell(), &self.conflict_marker_token)
                == normalize_doi(&right.to_cell(), &self.conflict_marker_token);
        }

        match (left, right) {
            (Value::Categories(l), Value::Categories(r)) => l.same_members(r),
            (Value::Int(l), Value::Int(r)) => l == r,
            (Value::Float(l), Value::Float(r)) => l == r,
            (Value::Int(l), Value::Float(r)) | (Value::Float(r), Value::Int(l)) => {
                (*l as f64) == *r
            }
            _ => left.to_cell().trim() == right.to_cell().trim(),
        }
    }

    /// True if some existing record is both same-identity and field-equal
    pub fn is_duplicate_submission<'a, I>(
        &self,
        registry: &SchemaRegistry,
        existing: I,
        new_record: &Record,
    ) -> bool
    where
        I: IntoIterator<Item = &'a Record>,
    {
        existing.into_iter().any(|e| {
            self.same_identity(e, new_record) && self.fields_equal(registry, e, new_record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CategorySet;

    const TOKEN: &str = DEFAULT_CONFLICT_MARKER_TOKEN;

    fn paper(registry: &SchemaRegistry, doi: &str, title: &str) -> Record {
        Record::blank(registry)
            .with(registry.core_field(names::DOI), doi)
            .unwrap()
            .with(registry.core_field(names::TITLE), title)
            .unwrap()
            .with(registry.core_field(names::CATEGORY), CategorySet::parse("method"))
            .unwrap()
    }

    #[test]
    fn test_normalize_doi_prefixes() {
        assert_eq!(normalize_doi("https://doi.org/10.1/ABC", TOKEN), "10.1/abc");
        assert_eq!(normalize_doi("http://dx.doi.org/10.1/abc", TOKEN), "10.1/abc");
        assert_eq!(normalize_doi("DOI: 10.1/abc ", TOKEN), "10.1/abc");
        assert_eq!(normalize_doi("doi.org/10.1/abc", TOKEN), "10.1/abc");
        assert_eq!(
            normalize_doi("https://dl.acm.org/doi/10.1145/3 ", TOKEN),
            "10.1145/3"
        );
    }

    #[test]
    fn test_normalize_doi_keeps_scheme_without_doi_host() {
        assert_eq!(
            normalize_doi("https://example.org/paper", TOKEN),
            "https://example.org/paper"
        );
        assert_ne!(
            normalize_doi("https://example.org/paper", TOKEN),
            normalize_doi("http://example.org/paper", TOKEN)
        );
    }

    #[test]
    fn test_normalize_doi_strips_conflict_token() {
        assert_eq!(normalize_doi("[CONFLICT]10.1/a", TOKEN), "10.1/a");
        assert_eq!(normalize_doi("[conflict] 10.1/A", TOKEN), "10.1/a");
        assert_eq!(normalize_doi("[CONF[CONFLICT]LICT]10.1/a", TOKEN), "10.1/a");
    }

    #[test]
    fn test_normalize_doi_empty() {
        assert_eq!(normalize_doi("", TOKEN), "");
        assert_eq!(normalize_doi("   ", TOKEN), "");
        assert_eq!(normalize_doi("[CONFLICT]", TOKEN), "");
    }

    #[test]
    fn test_normalize_doi_idempotent() {
        let samples = [
            "https://doi.org/10.1/X",
            "doi:doi:10.1/x",
            "doi/doi:10.1/x",
            " a doi/b doi/c ",
            "[CONFLICT]https://doi.org/ 10.1/x",
            "HTTPS://DX.DOI.ORG/10.5555/ABC",
            "doi: https://doi.org/10.1/x",
            "10.1/plain",
            "",
        ];
        for sample in samples {
            let once = normalize_doi(sample, TOKEN);
            assert_eq!(normalize_doi(&once, TOKEN), once, "sample {sample:?}");
        }
    }

    #[test]
    fn test_same_identity_by_doi_or_title() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();

        let a = paper(&registry, "10.1/a", "Alpha");
        let same_doi = paper(&registry, "https://doi.org/10.1/A", "Different");
        let same_title = paper(&registry, "10.9/z", "  alpha ");
        let unrelated = paper(&registry, "10.2/b", "Beta");

        assert!(resolver.same_identity(&a, &same_doi));
        assert!(resolver.same_identity(&a, &same_title));
        assert!(!resolver.same_identity(&a, &unrelated));
    }

    #[test]
    fn test_same_identity_ignores_empty_keys() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();

        let a = paper(&registry, "", "");
        let b = paper(&registry, "", "");
        assert!(!resolver.same_identity(&a, &b));

        let c = paper(&registry, "", "Shared");
        let d = paper(&registry, "", "shared");
        assert!(resolver.same_identity(&c, &d));
    }

    #[test]
    fn test_same_identity_is_symmetric() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        let records = [
            paper(&registry, "10.1/a", "Alpha"),
            paper(&registry, "[CONFLICT]10.1/a", ""),
            paper(&registry, "", "ALPHA"),
            paper(&registry, "10.2/b", "Beta"),
            paper(&registry, "", ""),
        ];
        for a in &records {
            for b in &records {
                assert_eq!(resolver.same_identity(a, b), resolver.same_identity(b, a));
            }
        }
    }

    #[test]
    fn test_fields_equal_ignores_bookkeeping() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();

        let a = paper(&registry, "10.1/a", "Alpha");
        let mut b = a.clone();
        b.set_submission_time("2024-01-01 00:00:00.000");
        b.set_conflict_marker(true);

        assert!(resolver.fields_equal(&registry, &a, &b));
    }

    #[test]
    fn test_fields_equal_trims_and_normalizes_doi() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();

        let a = paper(&registry, "10.1/a", "Alpha");
        let b = paper(&registry, "[CONFLICT]https://doi.org/10.1/A", "Alpha  ");
        assert!(resolver.fields_equal(&registry, &a, &b));
    }

    #[test]
    fn test_fields_equal_detects_summary_change() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();

        let a = paper(&registry, "10.1/a", "Alpha");
        let b = a
            .clone()
            .with(registry.field("summary_method").unwrap(), "new method")
            .unwrap();
        assert!(!resolver.fields_equal(&registry, &a, &b));
        // Title comparison is case-sensitive for content equality
        let c = paper(&registry, "10.1/a", "ALPHA");
        assert!(!resolver.fields_equal(&registry, &a, &c));
    }

    #[test]
    fn test_custom_ignored_fields() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default().with_ignored_fields(["summary_method"]);

        let a = paper(&registry, "10.1/a", "Alpha");
        let b = a
            .clone()
            .with(registry.field("summary_method").unwrap(), "changed")
            .unwrap();
        assert!(resolver.fields_equal(&registry, &a, &b));
    }

    #[test]
    fn test_duplicate_requires_identity_and_equality() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();

        let existing = vec![paper(&registry, "10.1/a", "Alpha")];
        assert!(resolver.is_duplicate_submission(
            &registry,
            &existing,
            &paper(&registry, "10.1/a", "Alpha")
        ));
        assert!(!resolver.is_duplicate_submission(
            &registry,
            &existing,
            &paper(&registry, "10.1/a", "Alpha 2")
        ));
        assert!(!resolver.is_duplicate_submission(&registry, &[], &existing[0]));
    }
}
