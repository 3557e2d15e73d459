//! Merge Engine
//!
//! Folds a batch of submitted records into the canonical set under a
//! [`MergePolicy`]. Every entry point (batch update, dry run, validation
//! tooling) goes through [`MergeEngine`]; there is no second implementation.
//!
//! # Algorithm
//! 1. Partition the canonical set into identity groups (orphan shadows are
//!    promoted or rejected per [`OrphanPolicy`]).
//! 2. For each incoming record, find every group with a same-identity member:
//!    - none: new group (added)
//!    - duplicate of a member: dropped silently
//!    - otherwise per policy: `skip` drops it, `replace` removes all matching
//!      groups and adds it as a new group, `mark` attaches it as a conflict
//!      shadow of the first matching group (added and conflict)
//! 3. Fill missing `submission_time` and `contributor`.
//! 4. Order is derived from the groups on demand ([`CanonicalSet::display_order`]).
//! 5. [`MergeEngine::merge_and_persist`] saves the result; if anything fails
//!    nothing counts as added and the whole batch is returned unresolved.

mod group;
mod ordering;

pub use group::{CanonicalSet, IdentityGroup, SetSummary};

use crate::identity::IdentityResolver;
use crate::record::Record;
use crate::schema::SchemaRegistry;
use crate::store::RecordStore;
use crate::{time, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Contributor assigned to records submitted without one
pub const DEFAULT_CONTRIBUTOR: &str = "anonymous";

/// How a same-identity, different-content submission is handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Keep both; the new record becomes a conflict shadow
    #[default]
    Mark,
    /// Drop the new record
    Skip,
    /// The new record supersedes every matching record
    Replace,
}

impl FromStr for MergePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mark" => Ok(MergePolicy::Mark),
            "skip" => Ok(MergePolicy::Skip),
            "replace" => Ok(MergePolicy::Replace),
            other => Err(Error::InvalidInput(format!(
                "unknown merge policy '{other}' (expected mark, skip or replace)"
            ))),
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergePolicy::Mark => "mark",
            MergePolicy::Skip => "skip",
            MergePolicy::Replace => "replace",
        };
        f.write_str(name)
    }
}

/// Handling of conflict shadows without a representative in the loaded set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Promote the orphan to representative and log a warning
    #[default]
    Promote,
    /// Refuse to merge until the store is repaired
    Fail,
}

/// Merge engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub policy: MergePolicy,
    pub default_contributor: String,
    pub orphan_policy: OrphanPolicy,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            policy: MergePolicy::Mark,
            default_contributor: DEFAULT_CONTRIBUTOR.to_string(),
            orphan_policy: OrphanPolicy::Promote,
        }
    }
}

/// Fate of one incoming record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No same-identity record existed
    Added,
    /// Identical content already present
    Duplicate,
    /// Same identity, different content, `skip` policy
    Skipped,
    /// Same identity, different content, `replace` policy
    Replaced {
        /// Number of records removed
        removed: usize,
    },
    /// Same identity, different content, `mark` policy
    Conflict,
}

/// In-memory result of a merge
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Updated canonical set
    pub canonical: CanonicalSet,
    /// Every incoming record now in the set (conflicts included)
    pub added: Vec<Record>,
    /// Incoming records held as conflict shadows
    pub conflicts: Vec<Record>,
    /// One decision per incoming record, in batch order
    pub decisions: Vec<Decision>,
}

impl MergeOutcome {
    pub fn count(&self, predicate: impl Fn(&Decision) -> bool) -> usize {
        self.decisions.iter().filter(|d| predicate(d)).count()
    }
}

/// Caller-facing result of [`MergeEngine::merge_and_persist`]
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub added: Vec<Record>,
    /// Conflict shadows on success; the whole unresolved batch on failure
    pub conflicts: Vec<Record>,
    /// Reason the merge was not applied
    pub failure: Option<String>,
}

impl MergeReport {
    pub fn applied(&self) -> bool {
        self.failure.is_none()
    }

    fn not_applied(incoming: Vec<Record>, reason: String) -> Self {
        Self {
            added: Vec::new(),
            conflicts: incoming,
            failure: Some(reason),
        }
    }
}

/// Record identity, conflict-resolution and merge engine
pub struct MergeEngine<'r> {
    registry: &'r SchemaRegistry,
    resolver: IdentityResolver,
    options: MergeOptions,
}

impl<'r> MergeEngine<'r> {
    pub fn new(registry: &'r SchemaRegistry, resolver: IdentityResolver, options: MergeOptions) -> Self {
        Self {
            registry,
            resolver,
            options,
        }
    }

    /// Same engine with a different policy
    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.options.policy = policy;
        self
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Merge using the current time for new submission times
    pub fn merge(&self, canonical: Vec<Record>, incoming: Vec<Record>) -> Result<MergeOutcome> {
        self.merge_at(canonical, incoming, &time::submission_timestamp())
    }

    /// Merge, stamping records that lack a submission time with `now`
    pub fn merge_at(
        &self,
        mut canonical: Vec<Record>,
        incoming: Vec<Record>,
        now: &str,
    ) -> Result<MergeOutcome> {
        for record in canonical.iter_mut() {
            self.fill_contributor(record);
        }

        let mut set = CanonicalSet::partition(canonical, &self.resolver, self.options.orphan_policy)?;
        let mut known_ids: HashSet<Uuid> = set.records().map(Record::id).collect();

        let mut added_ids: Vec<Uuid> = Vec::new();
        let mut conflict_ids: Vec<Uuid> = Vec::new();
        let mut decisions = Vec::with_capacity(incoming.len());

        for mut record in incoming {
            record.set_conflict_marker(false);
            self.fill_contributor(&mut record);
            if !known_ids.insert(record.id()) {
                record.reassign_id();
                known_ids.insert(record.id());
            }

            let decision = self.fold(&mut set, record, &mut added_ids, &mut conflict_ids);
            decisions.push(decision);
        }

        for record in set.records_mut() {
            if record.submission_time().is_none() {
                record.set_submission_time(now);
            }
        }

        let by_id: HashMap<Uuid, &Record> = set.records().map(|r| (r.id(), r)).collect();
        let collect = |ids: &[Uuid]| -> Vec<Record> {
            ids.iter()
                .filter_map(|id| by_id.get(id).map(|r| (*r).clone()))
                .collect()
        };
        let added = collect(&added_ids);
        let conflicts = collect(&conflict_ids);

        info!(
            policy = %self.options.policy,
            incoming = decisions.len(),
            added = added.len(),
            conflicts = conflicts.len(),
            duplicates = decisions.iter().filter(|d| **d == Decision::Duplicate).count(),
            total = set.len(),
            "Merge complete"
        );

        Ok(MergeOutcome {
            canonical: set,
            added,
            conflicts,
            decisions,
        })
    }

    /// Apply one incoming record to the grouped set
    fn fold(
        &self,
        set: &mut CanonicalSet,
        record: Record,
        added_ids: &mut Vec<Uuid>,
        conflict_ids: &mut Vec<Uuid>,
    ) -> Decision {
        let matching = set.matching_groups(&self.resolver, &record);

        if matching.is_empty() {
            debug!(record_id = %record.id(), title = %record.title(), "New paper");
            added_ids.push(record.id());
            set.groups.push(IdentityGroup::new(record));
            return Decision::Added;
        }

        let groups = &set.groups;
        let members = matching.iter().flat_map(|&i| groups[i].members());
        if self
            .resolver
            .is_duplicate_submission(self.registry, members, &record)
        {
            debug!(record_id = %record.id(), title = %record.title(), "Duplicate submission dropped");
            return Decision::Duplicate;
        }

        match self.options.policy {
            MergePolicy::Skip => {
                debug!(record_id = %record.id(), title = %record.title(), "Conflicting submission skipped");
                Decision::Skipped
            }
            MergePolicy::Replace => {
                let mut removed = 0;
                for &index in matching.iter().rev() {
                    removed += set.groups.remove(index).len();
                }
                debug!(
                    record_id = %record.id(),
                    title = %record.title(),
                    removed = removed,
                    "Submission replaced existing records"
                );
                added_ids.push(record.id());
                set.groups.push(IdentityGroup::new(record));
                Decision::Replaced { removed }
            }
            MergePolicy::Mark => {
                // Representatives always carry a clear marker after
                // partitioning, so the first matching group is the target.
                let target = matching[0];
                debug!(
                    record_id = %record.id(),
                    title = %record.title(),
                    representative = %set.groups[target].representative().id(),
                    "Submission marked as conflict"
                );
                added_ids.push(record.id());
                conflict_ids.push(record.id());
                set.groups[target].attach(record);
                Decision::Conflict
            }
        }
    }

    fn fill_contributor(&self, record: &mut Record) {
        if record.contributor().trim().is_empty() {
            record.set_contributor(&self.options.default_contributor);
        }
    }

    /// Load, merge and save as one unit
    ///
    /// On any failure the store is left as it was (as far as the store
    /// guarantees) and the report carries no added records and the entire
    /// incoming batch.
    pub async fn merge_and_persist<S: RecordStore>(
        &self,
        store: &S,
        incoming: Vec<Record>,
    ) -> MergeReport {
        let canonical = match store.load().await {
            Ok(records) => records,
            Err(e) => {
                error!(store = %store.describe(), error = %e, "Failed to load canonical set");
                return MergeReport::not_applied(incoming, format!("load failed: {e}"));
            }
        };

        let outcome = match self.merge(canonical, incoming.clone()) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Merge abandoned");
                return MergeReport::not_applied(incoming, format!("merge failed: {e}"));
            }
        };

        if let Err(e) = store.save(&outcome.canonical.display_order()).await {
            error!(store = %store.describe(), error = %e, "Failed to persist canonical set");
            return MergeReport::not_applied(incoming, format!("save failed: {e}"));
        }

        info!(
            store = %store.describe(),
            records = outcome.canonical.len(),
            "Canonical set persisted"
        );

        MergeReport {
            added: outcome.added,
            conflicts: outcome.conflicts,
            failure: None,
        }
    }

    /// Load and merge without saving
    pub async fn dry_run<S: RecordStore>(&self, store: &S, incoming: Vec<Record>) -> Result<MergeOutcome> {
        let canonical = store.load().await?;
        self.merge(canonical, incoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CategorySet;
    use crate::schema::names;

    const T0: &str = "2024-01-01 00:00:00.000";
    const T1: &str = "2024-02-01 00:00:00.000";

    fn paper(registry: &SchemaRegistry, doi: &str, title: &str) -> Record {
        Record::blank(registry)
            .with(registry.core_field(names::DOI), doi)
            .unwrap()
            .with(registry.core_field(names::TITLE), title)
            .unwrap()
            .with(registry.core_field(names::CATEGORY), CategorySet::parse("X"))
            .unwrap()
    }

    fn engine(registry: &SchemaRegistry, policy: MergePolicy) -> MergeEngine<'_> {
        MergeEngine::new(registry, IdentityResolver::default(), MergeOptions::default())
            .with_policy(policy)
    }

    #[test]
    fn test_policy_parse_and_display() {
        assert_eq!("Replace".parse::<MergePolicy>().unwrap(), MergePolicy::Replace);
        assert_eq!(MergePolicy::Skip.to_string(), "skip");
        assert!("merge".parse::<MergePolicy>().is_err());
    }

    #[test]
    fn test_bookkeeping_assigned() {
        let registry = SchemaRegistry::builtin();
        let outcome = engine(&registry, MergePolicy::Mark)
            .merge_at(vec![], vec![paper(&registry, "10.1/a", "T1")], T0)
            .unwrap();

        let record = &outcome.added[0];
        assert_eq!(record.submission_time(), Some(T0));
        assert_eq!(record.contributor(), DEFAULT_CONTRIBUTOR);
        assert!(!record.conflict_marker());
    }

    #[test]
    fn test_existing_submission_time_kept() {
        let registry = SchemaRegistry::builtin();
        let mut existing = paper(&registry, "10.1/a", "T1");
        existing.set_submission_time(T0);

        let outcome = engine(&registry, MergePolicy::Mark)
            .merge_at(vec![existing], vec![paper(&registry, "10.2/b", "T2")], T1)
            .unwrap();

        let times: Vec<_> = outcome
            .canonical
            .display_order()
            .iter()
            .map(|r| r.submission_time().unwrap().to_string())
            .collect();
        assert_eq!(times, vec![T1.to_string(), T0.to_string()]);
    }

    #[test]
    fn test_incoming_marker_is_cleared() {
        let registry = SchemaRegistry::builtin();
        let mut incoming = paper(&registry, "10.1/a", "T1");
        incoming.set_conflict_marker(true);

        let outcome = engine(&registry, MergePolicy::Mark)
            .merge_at(vec![], vec![incoming], T0)
            .unwrap();
        assert!(!outcome.added[0].conflict_marker());
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn test_skip_policy_leaves_set_unchanged() {
        let registry = SchemaRegistry::builtin();
        let existing = paper(&registry, "10.1/a", "T1");
        let changed = paper(&registry, "10.1/a", "T1 revised");

        let outcome = engine(&registry, MergePolicy::Skip)
            .merge_at(vec![existing.clone()], vec![changed], T0)
            .unwrap();

        assert!(outcome.added.is_empty());
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.decisions, vec![Decision::Skipped]);
        assert_eq!(outcome.canonical.len(), 1);
        assert_eq!(outcome.canonical.records().next().unwrap().title(), "T1");
    }

    #[test]
    fn test_replace_removes_every_matching_group() {
        let registry = SchemaRegistry::builtin();
        let by_doi = paper(&registry, "10.1/a", "First");
        let by_title = paper(&registry, "10.9/z", "Second");
        let mut shadow = paper(&registry, "10.1/a", "First v2");
        shadow.set_conflict_marker(true);
        let unrelated = paper(&registry, "10.5/q", "Other");

        let incoming = paper(&registry, "10.1/a", "Second");
        let outcome = engine(&registry, MergePolicy::Replace)
            .merge_at(vec![by_doi, by_title, shadow, unrelated], vec![incoming], T0)
            .unwrap();

        assert_eq!(outcome.decisions, vec![Decision::Replaced { removed: 3 }]);
        assert_eq!(outcome.canonical.len(), 2);
        assert_eq!(outcome.added.len(), 1);
        assert!(!outcome.added[0].conflict_marker());
    }

    #[test]
    fn test_mark_attaches_to_first_matching_group() {
        let registry = SchemaRegistry::builtin();
        let first = paper(&registry, "10.1/a", "First");
        let second = paper(&registry, "10.9/z", "Second");
        let incoming = paper(&registry, "10.1/a", "Second");

        let outcome = engine(&registry, MergePolicy::Mark)
            .merge_at(vec![first, second], vec![incoming], T0)
            .unwrap();

        let groups = outcome.canonical.groups();
        assert_eq!(groups[0].shadows().len(), 1);
        assert!(groups[1].shadows().is_empty());
        assert!(groups[0].shadows()[0].conflict_marker());
    }

    #[test]
    fn test_duplicate_of_shadow_is_dropped() {
        let registry = SchemaRegistry::builtin();
        let rep = paper(&registry, "10.1/a", "First");
        let mut shadow = paper(&registry, "10.1/a", "First v2");
        shadow.set_conflict_marker(true);

        let outcome = engine(&registry, MergePolicy::Mark)
            .merge_at(vec![rep, shadow], vec![paper(&registry, "10.1/a", "First v2")], T0)
            .unwrap();

        assert_eq!(outcome.decisions, vec![Decision::Duplicate]);
        assert_eq!(outcome.canonical.len(), 2);
    }

    #[test]
    fn test_orphan_fail_policy_aborts_merge() {
        let registry = SchemaRegistry::builtin();
        let mut orphan = paper(&registry, "10.1/a", "First");
        orphan.set_conflict_marker(true);

        let options = MergeOptions {
            orphan_policy: OrphanPolicy::Fail,
            ..MergeOptions::default()
        };
        let engine = MergeEngine::new(&registry, IdentityResolver::default(), options);
        assert!(engine.merge_at(vec![orphan], vec![], T0).is_err());
    }

    #[test]
    fn test_colliding_incoming_id_is_reassigned() {
        let registry = SchemaRegistry::builtin();
        let existing = paper(&registry, "10.1/a", "First");
        let mut incoming = paper(&registry, "10.1/a", "First revised");
        incoming.set_id(existing.id());

        let outcome = engine(&registry, MergePolicy::Mark)
            .merge_at(vec![existing.clone()], vec![incoming], T0)
            .unwrap();

        assert_ne!(outcome.conflicts[0].id(), existing.id());
        assert_eq!(outcome.canonical.len(), 2);
    }
}
