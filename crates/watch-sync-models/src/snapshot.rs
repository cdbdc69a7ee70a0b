use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::watch_history::WatchedItem;

/// Stored state for one source item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotEntry {
    pub item: WatchedItem,
    /// Set once the item has been pushed (or confirmed present) at its current `last_modified`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Durable local view of the source watch history, persisted between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncSnapshot {
    #[serde(default)]
    pub items: BTreeMap<String, SnapshotEntry>,
    #[serde(default)]
    pub last_full_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_incremental_sync_at: Option<DateTime<Utc>>,
    /// Last completed push per destination name.
    #[serde(default)]
    pub last_push_at: BTreeMap<String, DateTime<Utc>>,
}

/// What an upsert did to the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl SyncSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, source_id: &str) -> Option<&SnapshotEntry> {
        self.items.get(source_id)
    }

    /// Inserts or replaces the entry keyed by `item.source_id`.
    ///
    /// The pushed marker survives only when `last_modified` did not change.
    pub fn upsert(&mut self, item: WatchedItem) -> UpsertOutcome {
        match self.items.get_mut(&item.source_id) {
            Some(entry) => {
                let unchanged = entry.item.last_modified == item.last_modified;
                let outcome = if unchanged && entry.item == item {
                    UpsertOutcome::Unchanged
                } else {
                    UpsertOutcome::Updated
                };
                if !unchanged {
                    entry.pushed_at = None;
                }
                entry.item = item;
                outcome
            }
            None => {
                self.items.insert(
                    item.source_id.clone(),
                    SnapshotEntry {
                        item,
                        pushed_at: None,
                    },
                );
                UpsertOutcome::Inserted
            }
        }
    }

    pub fn mark_pushed(&mut self, source_id: &str, at: DateTime<Utc>) -> bool {
        match self.items.get_mut(source_id) {
            Some(entry) => {
                entry.pushed_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Most recent sync checkpoint, preferring the incremental one.
    pub fn incremental_cutoff(&self) -> Option<DateTime<Utc>> {
        self.last_incremental_sync_at.or(self.last_full_sync_at)
    }
}
