//! Ranking snapshots
//!
//! Within a group the newest, then smallest, source represents the snapshot.
//! Across groups the newest snapshot ranks first. A group is dated by its
//! newest dated member; a group with no dated member at all counts as newer
//! than any date, since it only comes from `latest` aliases.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use tracing::info;

use super::grouping::HashGroups;
use crate::types::{MirrorId, Source, Stat};

fn source_order(a: &Source, b: &Source) -> Ordering {
    b.recency()
        .cmp(&a.recency())
        .then_with(|| a.length.cmp(&b.length))
        .then_with(|| a.url.cmp(&b.url))
}

fn stat_order(a: &Stat, b: &Stat) -> Ordering {
    b.recency()
        .cmp(&a.recency())
        .then_with(|| a.size.cmp(&b.size))
        .then_with(|| a.hash.cmp(&b.hash))
}

/// Sort every group in place so its representative comes first
pub fn sort_groups(groups: &mut HashGroups) {
    for members in groups.values_mut() {
        members.sort_by(source_order);
    }
}

/// Summarise one sorted group
///
/// Size and hash come from the head. The timestamp is the newest known date
/// among members, unknown only when no member is dated. Redundancy counts
/// distinct mirrors, not files.
pub fn group_stat(members: &[Source]) -> Option<Stat> {
    let head = members.first()?;
    let mirrors: BTreeSet<MirrorId> = members.iter().map(|m| m.mirror).collect();
    Some(Stat {
        timestamp: members.iter().filter_map(|m| m.timestamp).max(),
        mirror_count: mirrors.len(),
        hash: head.hash.clone(),
        size: head.length,
    })
}

/// Sort groups, derive one [`Stat`] per group, and rank them newest first
pub fn rank(groups: &mut HashGroups) -> Vec<Stat> {
    sort_groups(groups);

    let mut stats: Vec<Stat> = groups.values().filter_map(|m| group_stat(m)).collect();
    stats.sort_by(stat_order);

    info!("latest available files:");
    for stat in &stats {
        info!("{stat}");
    }

    stats
}
