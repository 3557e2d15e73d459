//! Display order of the canonical set
//!
//! Order is derived, never stored in the groups:
//! 1. Representatives bucketed by category string, buckets ascending.
//! 2. Within a bucket, representatives by submission time, newest first.
//! 3. Each representative is preceded by its shadows, oldest first, so the
//!    newest conflicting submission sits right above its representative.
//!
//! Ties keep group order (stable sorts).

use super::group::{CanonicalSet, IdentityGroup};
use crate::record::Record;
use std::collections::BTreeMap;

fn time_key(record: &Record) -> &str {
    record.submission_time().unwrap_or_default()
}

/// Groups in display order, each with shadows sorted oldest first
fn ordered_groups(set: &CanonicalSet) -> Vec<(&IdentityGroup, Vec<&Record>)> {
    let mut buckets: BTreeMap<String, Vec<&IdentityGroup>> = BTreeMap::new();
    for group in set.groups() {
        buckets
            .entry(group.representative().category_key())
            .or_default()
            .push(group);
    }

    let mut ordered = Vec::with_capacity(set.groups().len());
    for (_, mut groups) in buckets {
        groups.sort_by(|a, b| time_key(b.representative()).cmp(time_key(a.representative())));
        for group in groups {
            let mut shadows: Vec<&Record> = group.shadows().iter().collect();
            shadows.sort_by(|a, b| time_key(a).cmp(time_key(b)));
            ordered.push((group, shadows));
        }
    }
    ordered
}

impl CanonicalSet {
    /// Flat record sequence in display (and file store) order
    pub fn display_order(&self) -> Vec<Record> {
        ordered_groups(self)
            .into_iter()
            .flat_map(|(group, shadows)| {
                shadows
                    .into_iter()
                    .chain(std::iter::once(group.representative()))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
