use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tracing::{debug, info, instrument};
use watch_sync_config::EmbyConfig;
use watch_sync_models::{ContentFilter, WatchedItem};

use crate::emby::api::{parse_item, EmbyHttpClient, PlayedFilter};
use crate::error::SourceError;
use crate::traits::WatchSource;

pub struct EmbyClient {
    api: EmbyHttpClient,
    include_partial: bool,
}

impl EmbyClient {
    pub fn new(config: &EmbyConfig, include_partial: bool, timeout: Duration) -> anyhow::Result<Self> {
        let api = EmbyHttpClient::new(
            &config.server_url,
            &config.user_id,
            &config.access_token,
            &config.device_id,
            timeout,
        )?;
        Ok(Self { api, include_partial })
    }

    fn passes(&self) -> Vec<PlayedFilter> {
        let mut passes = vec![PlayedFilter::Played];
        if self.include_partial {
            passes.push(PlayedFilter::Resumable);
        }
        passes
    }
}

#[async_trait]
impl WatchSource for EmbyClient {
    fn source_name(&self) -> &str {
        "emby"
    }

    async fn authenticate(&self) -> Result<(), SourceError> {
        self.api.system_info().await?;
        debug!("Emby session valid");
        Ok(())
    }

    #[instrument(skip(self), fields(source = "emby"))]
    async fn list_watched(
        &self,
        since: Option<DateTime<Utc>>,
        filter: ContentFilter,
    ) -> Result<Vec<WatchedItem>, SourceError> {
        let kinds = filter.kinds();
        let mut raw_items = Vec::new();
        let mut seen = HashSet::new();
        for pass in self.passes() {
            for raw in self.api.get_all_items(&kinds, pass, since).await? {
                if seen.insert(raw.id.clone()) {
                    raw_items.push(raw);
                }
            }
        }

        let series_ids: Vec<String> = raw_items
            .iter()
            .filter_map(|raw| raw.series_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let show_ids = if series_ids.is_empty() {
            Default::default()
        } else {
            self.api.get_provider_ids(&series_ids).await?
        };

        let items: Vec<WatchedItem> = raw_items
            .iter()
            .filter_map(|raw| {
                let parent = raw.series_id.as_ref().and_then(|id| show_ids.get(id));
                parse_item(raw, parent)
            })
            .collect();

        info!(
            operation = "emby_list_watched",
            count = items.len(),
            series = series_ids.len(),
            since = ?since,
            "Fetched watched items from Emby"
        );
        Ok(items)
    }
}
