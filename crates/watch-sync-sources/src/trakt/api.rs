use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use watch_sync_models::{HistoryEntry, IdNamespace, Identity, IdentityKind};

use crate::error::SourceError;

const HISTORY_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraktIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trakt: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvdb: Option<u64>,
}

impl TraktIds {
    fn trakt_only(id: u64) -> Self {
        Self {
            trakt: Some(id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraktMedia {
    #[serde(default)]
    pub title: Option<String>,
    pub year: Option<u32>,
    pub ids: TraktIds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraktEpisode {
    pub season: Option<u32>,
    pub number: Option<u32>,
    pub title: Option<String>,
    pub ids: TraktIds,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "type")]
    pub result_type: String,
    pub movie: Option<TraktMedia>,
    pub show: Option<TraktMedia>,
    pub episode: Option<TraktEpisode>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryItem {
    pub watched_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct WatchedMovie {
    #[serde(default)]
    pub plays: u32,
    pub movie: TraktMedia,
}

#[derive(Debug, Deserialize)]
pub struct WatchedShow {
    #[serde(default)]
    pub plays: u32,
    pub show: TraktMedia,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaCounts {
    #[serde(default)]
    pub movies: usize,
    #[serde(default)]
    pub episodes: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotFound {
    #[serde(default)]
    pub movies: Vec<NotFoundEntry>,
    #[serde(default)]
    pub episodes: Vec<NotFoundEntry>,
    #[serde(default)]
    pub shows: Vec<NotFoundEntry>,
}

#[derive(Debug, Deserialize)]
pub struct NotFoundEntry {
    pub ids: TraktIds,
}

#[derive(Debug, Deserialize)]
pub struct AddHistoryResponse {
    #[serde(default)]
    pub added: MediaCounts,
    #[serde(default)]
    pub not_found: NotFound,
}

#[derive(Debug, Deserialize)]
pub struct RemoveHistoryResponse {
    #[serde(default)]
    pub deleted: MediaCounts,
}

#[derive(Debug, Serialize)]
struct HistoryPayloadItem {
    ids: TraktIds,
    #[serde(skip_serializing_if = "Option::is_none")]
    watched_at: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct HistoryPayload {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    movies: Vec<HistoryPayloadItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    shows: Vec<HistoryPayloadItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    episodes: Vec<HistoryPayloadItem>,
}

impl HistoryPayload {
    pub fn is_empty(&self) -> bool {
        self.movies.is_empty() && self.shows.is_empty() && self.episodes.is_empty()
    }

    fn push(&mut self, kind: IdentityKind, item: HistoryPayloadItem) {
        match kind {
            IdentityKind::Movie => self.movies.push(item),
            IdentityKind::Show => self.shows.push(item),
            IdentityKind::Episode => self.episodes.push(item),
        }
    }
}

/// Watch events to add. An entry with `plays > 1` is repeated that many times;
/// an unknown watch time is sent as `released`.
pub fn build_add_payload(entries: &[HistoryEntry]) -> HistoryPayload {
    let mut payload = HistoryPayload::default();
    for entry in entries {
        let watched_at = match entry.watched_at {
            Some(at) => at.trunc_subsecs(0).to_rfc3339_opts(SecondsFormat::Secs, true),
            None => "released".to_string(),
        };
        for _ in 0..entry.plays.max(1) {
            payload.push(
                entry.identity.kind,
                HistoryPayloadItem {
                    ids: TraktIds::trakt_only(entry.identity.id),
                    watched_at: Some(watched_at.clone()),
                },
            );
        }
    }
    payload
}

pub fn build_remove_payload(identities: &[Identity]) -> HistoryPayload {
    let mut payload = HistoryPayload::default();
    for identity in identities {
        payload.push(
            identity.kind,
            HistoryPayloadItem {
                ids: TraktIds::trakt_only(identity.id),
                watched_at: None,
            },
        );
    }
    payload
}

/// Identities the destination reported as unknown.
pub fn not_found_identities(response: &AddHistoryResponse) -> Vec<Identity> {
    let groups = [
        (IdentityKind::Movie, &response.not_found.movies),
        (IdentityKind::Episode, &response.not_found.episodes),
        (IdentityKind::Show, &response.not_found.shows),
    ];
    groups
        .into_iter()
        .flat_map(|(kind, entries)| {
            entries
                .iter()
                .filter_map(move |e| e.ids.trakt.map(|id| Identity::new(kind, id)))
        })
        .collect()
}

/// Catalogue entries of the requested kind from an id-lookup response.
pub fn identities_from_search(results: Vec<SearchResult>, kind: IdentityKind) -> Vec<Identity> {
    let wanted = match kind {
        IdentityKind::Movie => "movie",
        IdentityKind::Show => "show",
        IdentityKind::Episode => "episode",
    };
    let mut identities: Vec<Identity> = Vec::new();
    for result in results.into_iter().filter(|r| r.result_type == wanted) {
        let identity = match kind {
            IdentityKind::Movie => result.movie.and_then(|m| media_identity(kind, m)),
            IdentityKind::Show => result.show.and_then(|m| media_identity(kind, m)),
            IdentityKind::Episode => result.episode.and_then(episode_identity),
        };
        if let Some(identity) = identity {
            if !identities.iter().any(|i| i.id == identity.id) {
                identities.push(identity);
            }
        }
    }
    identities
}

fn media_identity(kind: IdentityKind, media: TraktMedia) -> Option<Identity> {
    let id = media.ids.trakt?;
    let mut identity = Identity::new(kind, id);
    identity.title = media.title;
    identity.year = media.year;
    Some(identity)
}

pub fn episode_identity(episode: TraktEpisode) -> Option<Identity> {
    let id = episode.ids.trakt?;
    let mut identity = Identity::new(IdentityKind::Episode, id);
    identity.title = episode.title;
    Some(identity)
}

fn search_type(kind: IdentityKind) -> &'static str {
    match kind {
        IdentityKind::Movie => "movie",
        IdentityKind::Show => "show",
        IdentityKind::Episode => "episode",
    }
}

pub struct TraktHttpClient {
    client: Client,
    base_url: String,
    client_id: String,
    access_token: String,
}

impl TraktHttpClient {
    pub fn new(base_url: &str, client_id: &str, access_token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("emby-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("trakt-api-version", "2")
            .header("trakt-api-key", &self.client_id)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
    }

    /// Sends a request, mapping non-success statuses. Returns the raw response.
    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, SourceError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(SourceError::from_status(status, &headers, &body))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SourceError> {
        let response = self.execute(request).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn get_me(&self) -> Result<serde_json::Value, SourceError> {
        self.json(self.request(Method::GET, "/users/me")).await
    }

    pub async fn search_by_id(
        &self,
        namespace: IdNamespace,
        id: &str,
        kind: IdentityKind,
    ) -> Result<Vec<Identity>, SourceError> {
        let path = format!(
            "/search/{}/{}?type={}",
            namespace.as_str(),
            urlencoding::encode(id),
            search_type(kind)
        );
        let results: Vec<SearchResult> = self.json(self.request(Method::GET, &path)).await?;
        let identities = identities_from_search(results, kind);
        debug!(namespace = namespace.as_str(), id, found = identities.len(), "Trakt id lookup");
        Ok(identities)
    }

    /// `None` when the show has no such episode.
    pub async fn get_episode(&self, show_id: u64, season: u32, number: u32) -> Result<Option<Identity>, SourceError> {
        let path = format!("/shows/{}/seasons/{}/episodes/{}", show_id, season, number);
        match self.json::<TraktEpisode>(self.request(Method::GET, &path)).await {
            Ok(episode) => Ok(episode_identity(episode)),
            Err(SourceError::Rejected { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// All history events recorded for one movie or episode, across pages.
    pub async fn get_history(&self, identity: &Identity) -> Result<Vec<HistoryItem>, SourceError> {
        let segment = match identity.kind {
            IdentityKind::Movie => "movies",
            IdentityKind::Show => "shows",
            IdentityKind::Episode => "episodes",
        };
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let path = format!(
                "/sync/history/{}/{}?page={}&limit={}",
                segment, identity.id, page, HISTORY_PAGE_LIMIT
            );
            let response = self.execute(self.request(Method::GET, &path)).await?;
            let page_count = response
                .headers()
                .get("X-Pagination-Page-Count")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(1);
            let text = response.text().await?;
            let batch: Vec<HistoryItem> = serde_json::from_str(&text)?;
            let received = batch.len();
            items.extend(batch);
            if received == 0 || page >= page_count {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    pub async fn add_history(&self, payload: &HistoryPayload) -> Result<AddHistoryResponse, SourceError> {
        self.json(self.request(Method::POST, "/sync/history").json(payload)).await
    }

    pub async fn remove_history(&self, payload: &HistoryPayload) -> Result<RemoveHistoryResponse, SourceError> {
        self.json(self.request(Method::POST, "/sync/history/remove").json(payload))
            .await
    }

    pub async fn get_watched_movies(&self) -> Result<Vec<WatchedMovie>, SourceError> {
        self.json(self.request(Method::GET, "/sync/watched/movies")).await
    }

    pub async fn get_watched_shows(&self) -> Result<Vec<WatchedShow>, SourceError> {
        self.json(self.request(Method::GET, "/sync/watched/shows?extended=noseasons"))
            .await
    }
}
