use async_trait::async_trait;
use chrono::{DateTime, Utc};
use watch_sync_models::{
    AddWatchedResult, ClearSummary, ContentFilter, ExternalIds, HistoryEntry, Identity, IdentityKind, WatchedItem,
    WatchedRecord,
};

use crate::error::SourceError;

/// A service watch events are read from.
#[async_trait]
pub trait WatchSource: Send + Sync {
    fn source_name(&self) -> &str;

    /// Verifies the configured session is usable.
    async fn authenticate(&self) -> Result<(), SourceError>;

    /// Watched items, optionally restricted to those modified after `since`.
    ///
    /// Order is stable for an unchanged library and `source_id`s are unique.
    async fn list_watched(
        &self,
        since: Option<DateTime<Utc>>,
        filter: ContentFilter,
    ) -> Result<Vec<WatchedItem>, SourceError>;
}

/// A service watch events are written to.
#[async_trait]
pub trait WatchDestination: Send + Sync {
    fn destination_name(&self) -> &str;

    /// Whether `add_watched` and `remove_watched` accept many entries per call.
    fn supports_batch(&self) -> bool {
        true
    }

    async fn authenticate(&self) -> Result<(), SourceError>;

    /// Catalogue entries matching the ids, using the first namespace (in
    /// preference order) that yields any result.
    async fn find_identity(&self, kind: IdentityKind, ids: &ExternalIds) -> Result<Vec<Identity>, SourceError>;

    async fn find_episode(&self, show: &Identity, season: u32, number: u32) -> Result<Vec<Identity>, SourceError>;

    /// `None` when the destination holds no watch events for the identity.
    async fn get_watched_record(&self, identity: &Identity) -> Result<Option<WatchedRecord>, SourceError>;

    async fn add_watched(&self, entries: &[HistoryEntry]) -> Result<AddWatchedResult, SourceError>;

    /// Removes every watch event for the identities.
    async fn remove_watched(&self, identities: &[Identity]) -> Result<(), SourceError>;

    async fn clear_all_history(&self) -> Result<ClearSummary, SourceError>;
}
