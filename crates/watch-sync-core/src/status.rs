use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use watch_sync_models::ItemKind;

use crate::error::Result;
use crate::store::{LedgerStore, SnapshotStore};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct KindCounts {
    pub total: usize,
    pub fully_watched: usize,
    pub partially_watched: usize,
    pub pushed: usize,
    /// Fully watched but not yet pushed at the current `last_modified`.
    pub pending: usize,
}

/// Local view of sync state, built without any network access.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatusSummary {
    pub movies: KindCounts,
    pub episodes: KindCounts,
    pub unmatched: usize,
    pub unmatched_reasons: BTreeMap<String, usize>,
    pub ledger_generated_at: Option<DateTime<Utc>>,
    pub last_full_sync_at: Option<DateTime<Utc>>,
    pub last_incremental_sync_at: Option<DateTime<Utc>>,
    pub last_push_at: BTreeMap<String, DateTime<Utc>>,
}

impl StatusSummary {
    pub fn total(&self) -> usize {
        self.movies.total + self.episodes.total
    }

    pub fn pending(&self) -> usize {
        self.movies.pending + self.episodes.pending
    }
}

pub fn load_status(snapshots: &SnapshotStore, ledger: &LedgerStore) -> Result<StatusSummary> {
    let snapshot = snapshots.load()?;
    let mut summary = StatusSummary {
        last_full_sync_at: snapshot.last_full_sync_at,
        last_incremental_sync_at: snapshot.last_incremental_sync_at,
        last_push_at: snapshot.last_push_at.clone(),
        ..Default::default()
    };

    for entry in snapshot.items.values() {
        let counts = match entry.item.kind {
            ItemKind::Movie => &mut summary.movies,
            ItemKind::Episode => &mut summary.episodes,
        };
        counts.total += 1;
        if entry.item.is_fully_watched {
            counts.fully_watched += 1;
            if entry.pushed_at.is_some() {
                counts.pushed += 1;
            } else {
                counts.pending += 1;
            }
        } else {
            counts.partially_watched += 1;
        }
    }

    if let Some(ledger) = ledger.load()? {
        summary.unmatched = ledger.len();
        summary.ledger_generated_at = Some(ledger.generated_at);
        summary.unmatched_reasons = ledger
            .reason_counts()
            .into_iter()
            .map(|(code, n)| (code.to_string(), n))
            .collect();
    }
    Ok(summary)
}
