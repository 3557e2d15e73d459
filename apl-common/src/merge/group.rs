//! Identity groups and the canonical set
//!
//! The canonical set is held as groups: one representative (conflict marker
//! false) plus the conflict shadows that lost a same-identity contest against
//! it. Storage order is not kept here; see [`super::ordering`].

use super::OrphanPolicy;
use crate::identity::IdentityResolver;
use crate::record::Record;
use crate::{Error, Result};
use tracing::{debug, warn};
use uuid::Uuid;

/// A representative and its conflict shadows
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityGroup {
    pub(crate) representative: Record,
    pub(crate) shadows: Vec<Record>,
}

impl IdentityGroup {
    /// Representative-only group; the record's conflict marker is cleared
    pub fn new(mut representative: Record) -> Self {
        representative.set_conflict_marker(false);
        Self {
            representative,
            shadows: Vec::new(),
        }
    }

    pub fn representative(&self) -> &Record {
        &self.representative
    }

    pub fn shadows(&self) -> &[Record] {
        &self.shadows
    }

    /// Representative first, then shadows
    pub fn members(&self) -> impl Iterator<Item = &Record> {
        std::iter::once(&self.representative).chain(self.shadows.iter())
    }

    pub(crate) fn members_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        std::iter::once(&mut self.representative).chain(self.shadows.iter_mut())
    }

    pub fn len(&self) -> usize {
        1 + self.shadows.len()
    }

    /// Attach a conflict shadow (sets its conflict marker)
    pub(crate) fn attach(&mut self, mut shadow: Record) {
        shadow.set_conflict_marker(true);
        self.shadows.push(shadow);
    }

    fn matches(&self, resolver: &IdentityResolver, record: &Record) -> bool {
        self.members().any(|m| resolver.same_identity(m, record))
    }
}

/// Attach shadows to groups until a full pass attaches nothing; returns the
/// shadows left over, in input order
fn attach_reachable(
    groups: &mut [IdentityGroup],
    mut pending: Vec<Record>,
    resolver: &IdentityResolver,
) -> Vec<Record> {
    loop {
        let before = pending.len();
        let mut unattached = Vec::with_capacity(before);
        for shadow in pending {
            match groups.iter().position(|g| g.matches(resolver, &shadow)) {
                Some(index) => groups[index].attach(shadow),
                None => unattached.push(shadow),
            }
        }
        if unattached.len() == before {
            return unattached;
        }
        pending = unattached;
    }
}

/// Counts reported by [`CanonicalSet::summarize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetSummary {
    pub records: usize,
    pub groups: usize,
    pub shadows: usize,
    pub orphans: usize,
}

/// Canonical record set, grouped by identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalSet {
    pub(crate) groups: Vec<IdentityGroup>,
}

impl CanonicalSet {
    /// Group a flat record list
    ///
    /// Every record with a clear conflict marker starts a group. Each marked
    /// record is attached to the first group with a member (representative
    /// or already attached shadow) sharing its identity, the same rule the
    /// merge engine uses when it marks a conflict. Attachment repeats until
    /// nothing changes, so shadows chained through other shadows find their
    /// group regardless of stored order.
    ///
    /// A marked record reachable from no representative is an orphan: with
    /// [`OrphanPolicy::Promote`] it becomes a representative itself (and
    /// remaining orphans may attach to it); with [`OrphanPolicy::Fail`] the
    /// whole partition fails.
    pub fn partition(
        records: Vec<Record>,
        resolver: &IdentityResolver,
        orphan_policy: OrphanPolicy,
    ) -> Result<Self> {
        let (shadows, representatives): (Vec<Record>, Vec<Record>) =
            records.into_iter().partition(Record::conflict_marker);

        let mut groups: Vec<IdentityGroup> =
            representatives.into_iter().map(IdentityGroup::new).collect();
        let mut pending = attach_reachable(&mut groups, shadows, resolver);
        let mut promoted = 0usize;

        while !pending.is_empty() {
            let orphan = pending.remove(0);
            match orphan_policy {
                OrphanPolicy::Promote => {
                    warn!(
                        record_id = %orphan.id(),
                        doi = %orphan.doi(),
                        title = %orphan.title(),
                        "Conflict shadow has no representative; promoting it"
                    );
                    promoted += 1;
                    groups.push(IdentityGroup::new(orphan));
                    pending = attach_reachable(&mut groups, pending, resolver);
                }
                OrphanPolicy::Fail => {
                    return Err(Error::CorruptState(format!(
                        "conflict shadow {} (doi '{}', title '{}') has no representative",
                        orphan.id(),
                        orphan.doi(),
                        orphan.title()
                    )));
                }
            }
        }

        debug!(
            groups = groups.len(),
            promoted = promoted,
            "Partitioned canonical set"
        );

        Ok(Self { groups })
    }

    /// Count marked records reachable from no representative, without
    /// changing anything
    pub fn count_orphans(records: &[Record], resolver: &IdentityResolver) -> usize {
        let mut groups: Vec<IdentityGroup> = records
            .iter()
            .filter(|r| !r.conflict_marker())
            .cloned()
            .map(IdentityGroup::new)
            .collect();
        let shadows = records.iter().filter(|r| r.conflict_marker()).cloned().collect();
        attach_reachable(&mut groups, shadows, resolver).len()
    }

    /// Group and shadow counts of a stored record list
    ///
    /// Orphans are counted before promotion, then promoted so the group
    /// count reflects what the next merge will work with.
    pub fn summarize(records: Vec<Record>, resolver: &IdentityResolver) -> Result<SetSummary> {
        let orphans = Self::count_orphans(&records, resolver);
        let total = records.len();
        let set = Self::partition(records, resolver, OrphanPolicy::Promote)?;
        Ok(SetSummary {
            records: total,
            groups: set.groups.len(),
            shadows: set.groups.iter().map(|g| g.shadows.len()).sum(),
            orphans,
        })
    }

    pub fn groups(&self) -> &[IdentityGroup] {
        &self.groups
    }

    /// Total number of records (representatives and shadows)
    pub fn len(&self) -> usize {
        self.groups.iter().map(IdentityGroup::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.groups.iter().flat_map(IdentityGroup::members)
    }

    pub(crate) fn records_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.groups.iter_mut().flat_map(IdentityGroup::members_mut)
    }

    pub fn find(&self, id: Uuid) -> Option<&Record> {
        self.records().find(|r| r.id() == id)
    }

    /// Indices of groups containing a record with the same identity
    pub(crate) fn matching_groups(&self, resolver: &IdentityResolver, record: &Record) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.matches(resolver, record))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{names, SchemaRegistry};

    fn paper(registry: &SchemaRegistry, doi: &str, title: &str, marked: bool) -> Record {
        let mut record = Record::blank(registry)
            .with(registry.core_field(names::DOI), doi)
            .unwrap()
            .with(registry.core_field(names::TITLE), title)
            .unwrap();
        record.set_conflict_marker(marked);
        record
    }

    #[test]
    fn test_partition_attaches_shadows() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        let records = vec![
            paper(&registry, "[CONFLICT]10.1/a", "A v2", true),
            paper(&registry, "10.1/a", "A", false),
            paper(&registry, "10.2/b", "B", false),
        ];

        let set = CanonicalSet::partition(records, &resolver, OrphanPolicy::Promote).unwrap();

        assert_eq!(set.groups().len(), 2);
        assert_eq!(set.groups()[0].representative().title(), "A");
        assert_eq!(set.groups()[0].shadows().len(), 1);
        assert!(set.groups()[1].shadows().is_empty());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_partition_promotes_orphan() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        let records = vec![
            paper(&registry, "10.9/x", "Orphan", true),
            paper(&registry, "10.9/x", "Orphan v2", true),
            paper(&registry, "10.2/b", "B", false),
        ];

        let set = CanonicalSet::partition(records, &resolver, OrphanPolicy::Promote).unwrap();

        assert_eq!(set.groups().len(), 2);
        let promoted = &set.groups()[1];
        assert_eq!(promoted.representative().title(), "Orphan");
        assert!(!promoted.representative().conflict_marker());
        assert_eq!(promoted.shadows().len(), 1);
    }

    #[test]
    fn test_partition_fail_policy_rejects_orphan() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        let records = vec![paper(&registry, "10.9/x", "Orphan", true)];

        let err = CanonicalSet::partition(records, &resolver, OrphanPolicy::Fail).unwrap_err();
        assert!(matches!(err, Error::CorruptState(_)));
    }

    #[test]
    fn test_count_orphans() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        let records = vec![
            paper(&registry, "10.1/a", "A", false),
            paper(&registry, "10.1/a", "A v2", true),
            paper(&registry, "10.9/x", "Orphan", true),
        ];
        assert_eq!(CanonicalSet::count_orphans(&records, &resolver), 1);
    }

    #[test]
    fn test_partition_follows_shadow_chain() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        // Title-only shadow is linked to the group through the DOI shadow
        let records = vec![
            paper(&registry, "", "Corrected Title", true),
            paper(&registry, "10.1/a", "Corrected Title", true),
            paper(&registry, "10.1/a", "Original Title", false),
        ];

        assert_eq!(CanonicalSet::count_orphans(&records, &resolver), 0);
        let set = CanonicalSet::partition(records, &resolver, OrphanPolicy::Fail).unwrap();
        assert_eq!(set.groups().len(), 1);
        assert_eq!(set.groups()[0].shadows().len(), 2);
    }

    #[test]
    fn test_summarize_counts_groups_not_records() {
        let registry = SchemaRegistry::builtin();
        let resolver = IdentityResolver::default();
        let records = vec![
            paper(&registry, "10.1/a", "Alpha", true),
            paper(&registry, "10.1/a", "Alpha", false),
            paper(&registry, "10.2/b", "Beta", false),
            paper(&registry, "10.9/x", "Lost", true),
        ];

        let summary = CanonicalSet::summarize(records, &resolver).unwrap();
        assert_eq!(
            summary,
            SetSummary {
                records: 4,
                groups: 3,
                shadows: 1,
                orphans: 1,
            }
        );
    }
}
