use std::cmp::Ordering;
use std::collections::BTreeMap;

use dd_common::types::{DisplayEntry, EntryGroup, UNGROUPED};

/// Group entries for display. Groups are ordered by name (case-insensitive)
/// with `ungrouped` last; entries by display name, then id. The result does
/// not depend on input order.
pub fn group_entries(entries: &[DisplayEntry]) -> Vec<EntryGroup> {
    let mut by_name: BTreeMap<&str, Vec<DisplayEntry>> = BTreeMap::new();
    for entry in entries {
        by_name.entry(entry.group.as_str()).or_default().push(entry.clone());
    }

    let mut groups: Vec<EntryGroup> = by_name
        .into_iter()
        .map(|(name, mut entries)| {
            entries.sort_by(compare_entries);
            EntryGroup {
                name: name.to_string(),
                entries,
            }
        })
        .collect();

    groups.sort_by(|a, b| compare_groups(&a.name, &b.name));
    groups
}

fn compare_groups(a: &str, b: &str) -> Ordering {
    (a == UNGROUPED)
        .cmp(&(b == UNGROUPED))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| a.cmp(b))
}

fn compare_entries(a: &DisplayEntry, b: &DisplayEntry) -> Ordering {
    a.display_name
        .to_lowercase()
        .cmp(&b.display_name.to_lowercase())
        .then_with(|| a.id.cmp(&b.id))
}
