use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::external_ids::ExternalIds;
use crate::media::ItemKind;

/// One watch event for one media unit, as reported by the source service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchedItem {
    /// Stable identifier assigned by the source service. Never reused.
    pub source_id: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub external_ids: ExternalIds,
    /// Parent show identifiers, only meaningful for episodes.
    #[serde(default, skip_serializing_if = "ExternalIds::is_empty")]
    pub show_ids: ExternalIds,

    // Descriptive fields. Used for logs and the unmatched report, never for matching.
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,

    /// Last completed watch. `None` means watched at an unknown time.
    pub watched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub play_count: u32,
    /// Change marker for incremental detection; monotonic per source item.
    pub last_modified: DateTime<Utc>,

    #[serde(default = "default_fully_watched")]
    pub is_fully_watched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_rating: Option<f64>,
}

fn default_fully_watched() -> bool {
    true
}

impl WatchedItem {
    pub fn movie(source_id: impl Into<String>, title: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            source_id: source_id.into(),
            kind: ItemKind::Movie,
            external_ids: ExternalIds::new(),
            show_ids: ExternalIds::new(),
            title: title.into(),
            year: None,
            show_title: None,
            season: None,
            episode_number: None,
            watched_at: None,
            play_count: 1,
            last_modified,
            is_fully_watched: true,
            completion_percentage: None,
            user_rating: None,
        }
    }

    pub fn episode(
        source_id: impl Into<String>,
        show_title: impl Into<String>,
        season: u32,
        episode_number: u32,
        last_modified: DateTime<Utc>,
    ) -> Self {
        let show_title = show_title.into();
        Self {
            kind: ItemKind::Episode,
            title: format!("{} S{:02}E{:02}", show_title, season, episode_number),
            show_title: Some(show_title),
            season: Some(season),
            episode_number: Some(episode_number),
            ..Self::movie(source_id, String::new(), last_modified)
        }
    }

    /// Sets the watch time, truncated to whole seconds.
    pub fn with_watched_at(mut self, watched_at: DateTime<Utc>) -> Self {
        self.watched_at = Some(watched_at.trunc_subsecs(0));
        self
    }

    /// Human-readable label used in logs and reports.
    pub fn display_title(&self) -> String {
        match self.kind {
            ItemKind::Movie => match self.year {
                Some(year) => format!("{} ({})", self.title, year),
                None => self.title.clone(),
            },
            ItemKind::Episode => match (&self.show_title, self.season, self.episode_number) {
                (Some(show), Some(s), Some(e)) => format!("{} S{:02}E{:02}", show, s, e),
                _ => self.title.clone(),
            },
        }
    }
}
