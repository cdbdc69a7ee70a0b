use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::external_ids::ExternalIds;
use crate::media::ItemKind;
use crate::watch_history::WatchedItem;

/// Why an item could not be mapped to exactly one destination identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum UnmatchReason {
    NoExternalIds,
    MissingEpisodeNumbers,
    NotFound,
    ShowNotFound,
    EpisodeNotFound,
    YearMismatch,
    Ambiguous { candidates: usize },
}

impl UnmatchReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnmatchReason::NoExternalIds => "no_external_ids",
            UnmatchReason::MissingEpisodeNumbers => "missing_episode_numbers",
            UnmatchReason::NotFound => "not_found",
            UnmatchReason::ShowNotFound => "show_not_found",
            UnmatchReason::EpisodeNotFound => "episode_not_found",
            UnmatchReason::YearMismatch => "year_mismatch",
            UnmatchReason::Ambiguous { .. } => "ambiguous",
        }
    }
}

impl fmt::Display for UnmatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchReason::NoExternalIds => f.write_str("no external ids"),
            UnmatchReason::MissingEpisodeNumbers => f.write_str("season or episode number missing"),
            UnmatchReason::NotFound => f.write_str("no destination match"),
            UnmatchReason::ShowNotFound => f.write_str("show not found"),
            UnmatchReason::EpisodeNotFound => f.write_str("episode not found in show"),
            UnmatchReason::YearMismatch => f.write_str("candidates rejected on release year"),
            UnmatchReason::Ambiguous { candidates } => write!(f, "{} candidate matches", candidates),
        }
    }
}

/// An item that was skipped during a push because it could not be matched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnmatchedEntry {
    pub title: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub external_ids: ExternalIds,
    #[serde(default, skip_serializing_if = "ExternalIds::is_empty")]
    pub show_ids: ExternalIds,
    pub reason: UnmatchReason,
}

impl UnmatchedEntry {
    pub fn from_item(item: &WatchedItem, reason: UnmatchReason) -> Self {
        Self {
            title: item.display_title(),
            kind: item.kind,
            external_ids: item.external_ids.clone(),
            show_ids: item.show_ids.clone(),
            reason,
        }
    }
}

/// Report of items the last push run could not match. Rebuilt on every run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnmatchedLedger {
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub entries: BTreeMap<String, UnmatchedEntry>,
}

impl UnmatchedLedger {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            entries: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, item: &WatchedItem, reason: UnmatchReason) {
        self.entries
            .insert(item.source_id.clone(), UnmatchedEntry::from_item(item, reason));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry counts per reason code.
    pub fn reason_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.reason.code()).or_insert(0) += 1;
        }
        counts
    }
}
