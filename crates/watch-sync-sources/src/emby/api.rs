use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use watch_sync_models::{ExternalIds, IdNamespace, ItemKind, WatchedItem};

use crate::error::SourceError;

const CLIENT_NAME: &str = "emby-sync";
const PAGE_SIZE: usize = 500;
const IDS_PER_LOOKUP: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserData {
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub play_count: u32,
    pub last_played_date: Option<String>,
    #[serde(default)]
    pub playback_position_ticks: i64,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmbyItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub item_type: String,
    pub production_year: Option<u32>,
    #[serde(default)]
    pub provider_ids: HashMap<String, String>,
    #[serde(default)]
    pub user_data: UserData,
    #[serde(default)]
    pub run_time_ticks: i64,
    pub date_last_saved: Option<String>,
    pub series_id: Option<String>,
    pub series_name: Option<String>,
    pub parent_index_number: Option<u32>,
    pub index_number: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsPage {
    #[serde(default)]
    pub items: Vec<EmbyItem>,
    #[serde(default)]
    pub total_record_count: usize,
}

/// Which user-data filter a listing pass applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayedFilter {
    Played,
    Resumable,
}

impl PlayedFilter {
    fn as_param(&self) -> &'static str {
        match self {
            PlayedFilter::Played => "IsPlayed",
            PlayedFilter::Resumable => "IsResumable",
        }
    }
}

pub struct EmbyHttpClient {
    client: Client,
    server_url: String,
    user_id: String,
    auth_header: String,
}

impl EmbyHttpClient {
    pub fn new(
        server_url: &str,
        user_id: &str,
        access_token: &str,
        device_id: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        let auth_header = format!(
            "MediaBrowser Client=\"{}\", Device=\"{}\", DeviceId=\"{}\", Version=\"{}\", Token=\"{}\"",
            CLIENT_NAME,
            CLIENT_NAME,
            device_id,
            env!("CARGO_PKG_VERSION"),
            access_token
        );

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            auth_header,
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.server_url, path))
            .header("X-Emby-Authorization", &self.auth_header)
            .header("Accept", "application/json")
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SourceError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::from_status(status, &headers, &body));
        }
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Checks reachability and that the token is accepted.
    pub async fn system_info(&self) -> Result<serde_json::Value, SourceError> {
        self.send(self.get("/System/Info")).await
    }

    pub async fn get_items_page(
        &self,
        kinds: &[ItemKind],
        filter: PlayedFilter,
        since: Option<DateTime<Utc>>,
        start_index: usize,
    ) -> Result<ItemsPage, SourceError> {
        let include_types: Vec<&str> = kinds
            .iter()
            .map(|k| match k {
                ItemKind::Movie => "Movie",
                ItemKind::Episode => "Episode",
            })
            .collect();

        let mut query: Vec<(&str, String)> = vec![
            ("IncludeItemTypes", include_types.join(",")),
            ("Recursive", "true".to_string()),
            ("Fields", "ProviderIds,UserData,RunTimeTicks,DateLastSaved,ProductionYear".to_string()),
            ("Filters", filter.as_param().to_string()),
            ("SortBy", "DatePlayed,SortName".to_string()),
            ("SortOrder", "Ascending".to_string()),
            ("StartIndex", start_index.to_string()),
            ("Limit", PAGE_SIZE.to_string()),
        ];
        if let Some(since) = since {
            query.push(("MinDateLastSaved", since.to_rfc3339()));
        }

        let path = format!("/Users/{}/Items", self.user_id);
        self.send(self.get(&path).query(&query)).await
    }

    /// Every item matching the filter, following `StartIndex` paging.
    pub async fn get_all_items(
        &self,
        kinds: &[ItemKind],
        filter: PlayedFilter,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<EmbyItem>, SourceError> {
        let mut items = Vec::new();
        loop {
            let page = self.get_items_page(kinds, filter, since, items.len()).await?;
            let received = page.items.len();
            items.extend(page.items);
            debug!(
                filter = filter.as_param(),
                received,
                total = page.total_record_count,
                "Emby items page"
            );
            if received == 0 || items.len() >= page.total_record_count {
                break;
            }
        }
        Ok(items)
    }

    /// Provider ids for the given item ids (used for parent series).
    pub async fn get_provider_ids(&self, ids: &[String]) -> Result<HashMap<String, ExternalIds>, SourceError> {
        let mut result = HashMap::new();
        let path = format!("/Users/{}/Items", self.user_id);
        for chunk in ids.chunks(IDS_PER_LOOKUP) {
            let query = [("Ids", chunk.join(",")), ("Fields", "ProviderIds".to_string())];
            let page: ItemsPage = self.send(self.get(&path).query(&query)).await?;
            for item in page.items {
                result.insert(item.id.clone(), provider_ids(&item.provider_ids));
            }
        }
        Ok(result)
    }
}

pub fn provider_ids(raw: &HashMap<String, String>) -> ExternalIds {
    let mut ids = ExternalIds::new();
    for (key, value) in raw {
        if let Some(ns) = IdNamespace::from_provider_key(key) {
            ids.insert(ns, value.as_str());
        }
    }
    ids
}

/// Parses Emby timestamps, which carry seven fractional digits.
pub fn parse_emby_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let whole = raw.trim_end_matches('Z').split('.').next()?;
    NaiveDateTime::parse_from_str(whole, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Converts an Emby item to a watch event. `None` for unsupported item types.
pub fn parse_item(raw: &EmbyItem, show_ids: Option<&ExternalIds>) -> Option<WatchedItem> {
    let kind = match raw.item_type.to_lowercase().as_str() {
        "movie" => ItemKind::Movie,
        "episode" => ItemKind::Episode,
        _ => return None,
    };
    if raw.id.is_empty() {
        return None;
    }

    let user_data = &raw.user_data;
    let last_played = user_data.last_played_date.as_deref().and_then(parse_emby_date);
    let last_saved = raw.date_last_saved.as_deref().and_then(parse_emby_date);
    let last_modified = match (last_saved, last_played) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => DateTime::<Utc>::default(),
    };

    let completion = if raw.run_time_ticks > 0 {
        (user_data.playback_position_ticks as f64 / raw.run_time_ticks as f64) * 100.0
    } else if user_data.played {
        100.0
    } else {
        0.0
    };

    let mut item = WatchedItem {
        source_id: raw.id.clone(),
        kind,
        external_ids: provider_ids(&raw.provider_ids),
        show_ids: ExternalIds::new(),
        title: raw.name.clone(),
        year: raw.production_year,
        show_title: None,
        season: None,
        episode_number: None,
        watched_at: last_played.map(|t| t.trunc_subsecs(0)),
        play_count: user_data.play_count,
        last_modified,
        is_fully_watched: user_data.played,
        completion_percentage: Some((completion * 100.0).round() / 100.0),
        user_rating: user_data.rating,
    };

    if kind == ItemKind::Episode {
        item.show_title = raw.series_name.clone();
        item.season = raw.parent_index_number;
        item.episode_number = raw.index_number;
        item.show_ids = show_ids.cloned().unwrap_or_default();
    }

    Some(item)
}
