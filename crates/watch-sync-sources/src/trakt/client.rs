use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument};
use watch_sync_config::TraktConfig;
use watch_sync_models::{
    AddWatchedResult, ClearSummary, ExternalIds, HistoryEntry, Identity, IdentityKind, WatchedRecord,
};

use crate::error::SourceError;
use crate::traits::WatchDestination;
use crate::trakt::api::{self, TraktHttpClient};

pub struct TraktClient {
    api: TraktHttpClient,
}

impl TraktClient {
    pub fn new(config: &TraktConfig, timeout: Duration) -> anyhow::Result<Self> {
        let api = TraktHttpClient::new(&config.base_url, &config.client_id, &config.access_token, timeout)?;
        Ok(Self { api })
    }
}

#[async_trait]
impl WatchDestination for TraktClient {
    fn destination_name(&self) -> &str {
        "trakt"
    }

    async fn authenticate(&self) -> Result<(), SourceError> {
        let me = self.api.get_me().await?;
        debug!(user = me["username"].as_str().unwrap_or("unknown"), "Trakt session valid");
        Ok(())
    }

    async fn find_identity(&self, kind: IdentityKind, ids: &ExternalIds) -> Result<Vec<Identity>, SourceError> {
        for (namespace, value) in ids.iter() {
            let found = self.api.search_by_id(namespace, value, kind).await?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    async fn find_episode(&self, show: &Identity, season: u32, number: u32) -> Result<Vec<Identity>, SourceError> {
        Ok(self
            .api
            .get_episode(show.id, season, number)
            .await?
            .into_iter()
            .collect())
    }

    async fn get_watched_record(&self, identity: &Identity) -> Result<Option<WatchedRecord>, SourceError> {
        let history = self.api.get_history(identity).await?;
        if history.is_empty() {
            return Ok(None);
        }
        Ok(Some(WatchedRecord {
            plays: history.len() as u32,
            watched_at: history.into_iter().map(|h| h.watched_at).collect(),
        }))
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn add_watched(&self, entries: &[HistoryEntry]) -> Result<AddWatchedResult, SourceError> {
        let payload = api::build_add_payload(entries);
        if payload.is_empty() {
            return Ok(AddWatchedResult::default());
        }
        let response = self.api.add_history(&payload).await?;
        let not_found = api::not_found_identities(&response);
        Ok(AddWatchedResult {
            added: response.added.movies + response.added.episodes,
            not_found,
        })
    }

    async fn remove_watched(&self, identities: &[Identity]) -> Result<(), SourceError> {
        let payload = api::build_remove_payload(identities);
        if payload.is_empty() {
            return Ok(());
        }
        let response = self.api.remove_history(&payload).await?;
        debug!(
            movies = response.deleted.movies,
            episodes = response.deleted.episodes,
            "Removed Trakt history"
        );
        Ok(())
    }

    async fn clear_all_history(&self) -> Result<ClearSummary, SourceError> {
        let movies = self.api.get_watched_movies().await?;
        let shows = self.api.get_watched_shows().await?;

        let identities: Vec<Identity> = movies
            .iter()
            .filter_map(|m| m.movie.ids.trakt.map(|id| Identity::new(IdentityKind::Movie, id)))
            .chain(
                shows
                    .iter()
                    .filter_map(|s| s.show.ids.trakt.map(|id| Identity::new(IdentityKind::Show, id))),
            )
            .collect();
        if identities.is_empty() {
            return Ok(ClearSummary::default());
        }

        let payload = api::build_remove_payload(&identities);
        let response = self.api.remove_history(&payload).await?;
        info!(
            operation = "trakt_clear_history",
            movies = response.deleted.movies,
            episodes = response.deleted.episodes,
            "Cleared Trakt watch history"
        );
        Ok(ClearSummary {
            movies_removed: response.deleted.movies,
            episodes_removed: response.deleted.episodes,
        })
    }
}
