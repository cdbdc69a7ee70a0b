use std::collections::HashSet;
use tracing::debug;
use watch_sync_models::{SyncMode, SyncSnapshot, WatchedItem};

/// Items from a download that need to be written to the snapshot.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Changed items in download order.
    pub changed: Vec<WatchedItem>,
    /// Of `changed`, items with no prior snapshot entry.
    pub new_items: usize,
    /// Of `changed`, items replacing an existing entry.
    pub updated_items: usize,
    /// Repeated `source_id`s dropped from the download (first occurrence wins).
    pub duplicates: usize,
}

/// Computes the delta between a fresh download and the stored snapshot.
///
/// Full mode returns every downloaded item. Incremental mode returns items
/// without a snapshot entry or whose `last_modified` is strictly newer than
/// the stored one; equal timestamps are not re-emitted.
pub fn detect_changes(fetched: Vec<WatchedItem>, snapshot: &SyncSnapshot, mode: SyncMode) -> ChangeSet {
    let mut seen = HashSet::new();
    let mut changes = ChangeSet::default();

    for item in fetched {
        if !seen.insert(item.source_id.clone()) {
            changes.duplicates += 1;
            continue;
        }

        let previous = snapshot.get(&item.source_id);
        let include = match (mode, previous) {
            (SyncMode::Full, _) => true,
            (SyncMode::Incremental, None) => true,
            (SyncMode::Incremental, Some(entry)) => item.last_modified > entry.item.last_modified,
        };
        if !include {
            continue;
        }

        if previous.is_some() {
            changes.updated_items += 1;
        } else {
            changes.new_items += 1;
        }
        changes.changed.push(item);
    }

    if changes.duplicates > 0 {
        debug!(duplicates = changes.duplicates, "Dropped repeated source ids from download");
    }
    changes
}
