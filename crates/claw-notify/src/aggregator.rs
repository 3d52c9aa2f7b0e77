//! Grouping of drained entries into notification groups.

use std::collections::HashMap;

use crate::types::{ErrorEntry, ErrorGroup};

/// Partitions entries by `(channel, source)`.
///
/// Groups come back in the order their first entry was seen, and entries
/// keep their relative order within a group.
#[must_use]
pub fn group_entries(entries: impl IntoIterator<Item = ErrorEntry>) -> Vec<ErrorGroup> {
    let mut groups: Vec<ErrorGroup> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for entry in entries {
        let key = (entry.req_channel.clone(), entry.source_name.clone());
        match index.get(&key) {
            Some(&i) => groups[i].push(entry),
            None => {
                index.insert(key, groups.len());
                groups.push(ErrorGroup::new(entry));
            }
        }
    }

    groups
}
