use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;
use watch_sync_models::{ExternalIds, Identity, IdentityKind, ItemKind, UnmatchReason, WatchedItem};
use watch_sync_sources::{SourceError, WatchDestination};

use crate::retry::RetryPolicy;

/// Outcome of mapping a source item to a destination identity.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Matched(Identity),
    Unmatched(UnmatchReason),
    Ambiguous(Vec<Identity>),
}

impl MatchResult {
    /// Ledger reason for anything but a match.
    pub fn unmatch_reason(&self) -> Option<UnmatchReason> {
        match self {
            MatchResult::Matched(_) => None,
            MatchResult::Unmatched(reason) => Some(reason.clone()),
            MatchResult::Ambiguous(candidates) => Some(UnmatchReason::Ambiguous {
                candidates: candidates.len(),
            }),
        }
    }
}

/// Resolves items by external identifier only; titles are never compared.
///
/// Show lookups are memoized for the lifetime of the resolver, so episodes of
/// the same show resolved concurrently share one remote lookup. Failed lookups
/// are not memoized.
pub struct IdentityResolver {
    destination: Arc<dyn WatchDestination>,
    retry: RetryPolicy,
    year_tolerance: u32,
    shows: Mutex<HashMap<ExternalIds, Arc<OnceCell<MatchResult>>>>,
}

impl IdentityResolver {
    pub fn new(destination: Arc<dyn WatchDestination>, retry: RetryPolicy, year_tolerance: u32) -> Self {
        Self {
            destination,
            retry,
            year_tolerance,
            shows: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, item: &WatchedItem) -> Result<MatchResult, SourceError> {
        let result = match item.kind {
            ItemKind::Movie => self.resolve_movie(item).await?,
            ItemKind::Episode => self.resolve_episode(item).await?,
        };
        debug!(
            source_id = %item.source_id,
            ids = %item.external_ids,
            result = ?result,
            "Resolved identity"
        );
        Ok(result)
    }

    async fn lookup(&self, kind: IdentityKind, ids: &ExternalIds) -> Result<Vec<Identity>, SourceError> {
        let destination = &self.destination;
        self.retry
            .run("find_identity", move || destination.find_identity(kind, ids))
            .await
    }

    async fn resolve_movie(&self, item: &WatchedItem) -> Result<MatchResult, SourceError> {
        if item.external_ids.is_empty() {
            return Ok(MatchResult::Unmatched(UnmatchReason::NoExternalIds));
        }
        let candidates = self.lookup(IdentityKind::Movie, &item.external_ids).await?;
        if candidates.is_empty() {
            return Ok(MatchResult::Unmatched(UnmatchReason::NotFound));
        }
        let candidates: Vec<Identity> = candidates
            .into_iter()
            .filter(|c| self.year_matches(item.year, c.year))
            .collect();
        if candidates.is_empty() {
            return Ok(MatchResult::Unmatched(UnmatchReason::YearMismatch));
        }
        Ok(single(candidates, UnmatchReason::NotFound))
    }

    fn year_matches(&self, local: Option<u32>, remote: Option<u32>) -> bool {
        match (local, remote) {
            (Some(a), Some(b)) => a.abs_diff(b) <= self.year_tolerance,
            _ => true,
        }
    }

    async fn resolve_episode(&self, item: &WatchedItem) -> Result<MatchResult, SourceError> {
        let (season, number) = match (item.season, item.episode_number) {
            (Some(s), Some(e)) => (s, e),
            _ => return Ok(MatchResult::Unmatched(UnmatchReason::MissingEpisodeNumbers)),
        };

        if item.show_ids.is_empty() {
            // No parent ids: fall back to the episode's own identifiers.
            if item.external_ids.is_empty() {
                return Ok(MatchResult::Unmatched(UnmatchReason::NoExternalIds));
            }
            let candidates = self.lookup(IdentityKind::Episode, &item.external_ids).await?;
            return Ok(single(candidates, UnmatchReason::EpisodeNotFound));
        }

        let show = match self.resolve_show(&item.show_ids).await? {
            MatchResult::Matched(show) => show,
            other => return Ok(other),
        };

        let destination = &self.destination;
        let show = &show;
        let episodes = self
            .retry
            .run("find_episode", move || destination.find_episode(show, season, number))
            .await?;
        Ok(single(episodes, UnmatchReason::EpisodeNotFound))
    }

    async fn resolve_show(&self, show_ids: &ExternalIds) -> Result<MatchResult, SourceError> {
        let cell = {
            let mut shows = self.shows.lock().unwrap_or_else(|e| e.into_inner());
            shows.entry(show_ids.clone()).or_default().clone()
        };
        let result = cell
            .get_or_try_init(|| async {
                let candidates = self.lookup(IdentityKind::Show, show_ids).await?;
                Ok::<_, SourceError>(single(candidates, UnmatchReason::ShowNotFound))
            })
            .await?;
        Ok(result.clone())
    }
}

fn single(mut candidates: Vec<Identity>, missing: UnmatchReason) -> MatchResult {
    match candidates.len() {
        0 => MatchResult::Unmatched(missing),
        1 => match candidates.pop() {
            Some(identity) => MatchResult::Matched(identity),
            None => MatchResult::Unmatched(missing),
        },
        _ => MatchResult::Ambiguous(candidates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{retry_policy, FakeDestination};
    use chrono::Utc;
    use watch_sync_models::IdNamespace;

    fn resolver(dest: &Arc<FakeDestination>) -> IdentityResolver {
        IdentityResolver::new(dest.clone(), retry_policy(), 1)
    }

    fn movie(id: &str, imdb: Option<&str>, year: Option<u32>) -> WatchedItem {
        let mut item = WatchedItem::movie(id, "Movie", Utc::now());
        if let Some(imdb) = imdb {
            item.external_ids.insert(IdNamespace::Imdb, imdb);
        }
        item.year = year;
        item
    }

    fn episode(id: &str, show_tvdb: &str, season: Option<u32>, number: Option<u32>) -> WatchedItem {
        let mut item = WatchedItem::episode(id, "Show", 1, 1, Utc::now());
        item.season = season;
        item.episode_number = number;
        item.show_ids.insert(IdNamespace::Tvdb, show_tvdb);
        item
    }

    #[tokio::test]
    async fn test_movie_without_ids_is_unmatched() {
        let dest = Arc::new(FakeDestination::new());
        let result = resolver(&dest).resolve(&movie("m", None, None)).await.unwrap();
        assert_eq!(result, MatchResult::Unmatched(UnmatchReason::NoExternalIds));
        assert_eq!(dest.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_movie_matched_by_imdb() {
        let dest = Arc::new(FakeDestination::new());
        dest.add_movie(IdNamespace::Imdb, "tt1", Identity::new(IdentityKind::Movie, 10).titled("Heat", Some(1995)));
        let result = resolver(&dest).resolve(&movie("m", Some("tt1"), Some(1995))).await.unwrap();
        assert_eq!(result, MatchResult::Matched(Identity::new(IdentityKind::Movie, 10).titled("Heat", Some(1995))));
    }

    #[tokio::test]
    async fn test_imdb_is_preferred_over_tmdb() {
        let dest = Arc::new(FakeDestination::new());
        dest.add_movie(IdNamespace::Imdb, "tt1", Identity::new(IdentityKind::Movie, 10));
        dest.add_movie(IdNamespace::Tmdb, "949", Identity::new(IdentityKind::Movie, 99));
        let mut item = movie("m", Some("tt1"), None);
        item.external_ids.insert(IdNamespace::Tmdb, "949");
        let result = resolver(&dest).resolve(&item).await.unwrap();
        assert_eq!(result, MatchResult::Matched(Identity::new(IdentityKind::Movie, 10)));
    }

    #[tokio::test]
    async fn test_movie_year_mismatch() {
        let dest = Arc::new(FakeDestination::new());
        dest.add_movie(IdNamespace::Imdb, "tt1", Identity::new(IdentityKind::Movie, 10).titled("Heat", Some(1986)));
        let result = resolver(&dest).resolve(&movie("m", Some("tt1"), Some(1995))).await.unwrap();
        assert_eq!(result, MatchResult::Unmatched(UnmatchReason::YearMismatch));
    }

    #[tokio::test]
    async fn test_year_within_tolerance_matches() {
        let dest = Arc::new(FakeDestination::new());
        dest.add_movie(IdNamespace::Imdb, "tt1", Identity::new(IdentityKind::Movie, 10).titled("Heat", Some(1996)));
        let result = resolver(&dest).resolve(&movie("m", Some("tt1"), Some(1995))).await.unwrap();
        assert!(matches!(result, MatchResult::Matched(_)));
    }

    #[tokio::test]
    async fn test_multiple_candidates_are_ambiguous() {
        let dest = Arc::new(FakeDestination::new());
        dest.add_movie(IdNamespace::Imdb, "tt1", Identity::new(IdentityKind::Movie, 10));
        dest.add_movie(IdNamespace::Imdb, "tt1", Identity::new(IdentityKind::Movie, 11));
        let result = resolver(&dest).resolve(&movie("m", Some("tt1"), None)).await.unwrap();
        assert_eq!(result.unmatch_reason(), Some(UnmatchReason::Ambiguous { candidates: 2 }));
    }

    #[tokio::test]
    async fn test_episode_needs_numbers() {
        let dest = Arc::new(FakeDestination::new());
        let result = resolver(&dest).resolve(&episode("e", "81189", Some(1), None)).await.unwrap();
        assert_eq!(result, MatchResult::Unmatched(UnmatchReason::MissingEpisodeNumbers));
    }

    #[tokio::test]
    async fn test_episode_resolved_through_show() {
        let dest = Arc::new(FakeDestination::new());
        let show = Identity::new(IdentityKind::Show, 1388);
        dest.add_show(IdNamespace::Tvdb, "81189", show.clone());
        dest.add_episode(&show, 1, 2, Identity::new(IdentityKind::Episode, 73482));
        let result = resolver(&dest).resolve(&episode("e", "81189", Some(1), Some(2))).await.unwrap();
        assert_eq!(result, MatchResult::Matched(Identity::new(IdentityKind::Episode, 73482)));

        let missing = resolver(&dest).resolve(&episode("e", "81189", Some(9), Some(9))).await.unwrap();
        assert_eq!(missing, MatchResult::Unmatched(UnmatchReason::EpisodeNotFound));
    }

    #[tokio::test]
    async fn test_unknown_show() {
        let dest = Arc::new(FakeDestination::new());
        let result = resolver(&dest).resolve(&episode("e", "1", Some(1), Some(1))).await.unwrap();
        assert_eq!(result, MatchResult::Unmatched(UnmatchReason::ShowNotFound));
    }

    #[tokio::test]
    async fn test_show_lookup_is_shared_across_episodes() {
        let dest = Arc::new(FakeDestination::new());
        let show = Identity::new(IdentityKind::Show, 1388);
        dest.add_show(IdNamespace::Tvdb, "81189", show.clone());
        for n in 1..=3 {
            dest.add_episode(&show, 1, n, Identity::new(IdentityKind::Episode, 100 + n as u64));
        }
        let resolver = resolver(&dest);
        let items: Vec<WatchedItem> = (1..=3).map(|n| episode(&n.to_string(), "81189", Some(1), Some(n))).collect();
        let results = futures::future::join_all(items.iter().map(|i| resolver.resolve(i))).await;
        assert!(results.iter().all(|r| matches!(r, Ok(MatchResult::Matched(_)))));
        assert_eq!(dest.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_show_lookup_is_not_cached() {
        let dest = Arc::new(FakeDestination::new());
        let show = Identity::new(IdentityKind::Show, 1388);
        dest.add_show(IdNamespace::Tvdb, "81189", show.clone());
        dest.add_episode(&show, 1, 1, Identity::new(IdentityKind::Episode, 5));
        dest.queue_lookup_error(SourceError::Rejected {
            status: 400,
            message: "bad".into(),
        });

        let resolver = resolver(&dest);
        let item = episode("e", "81189", Some(1), Some(1));
        assert!(resolver.resolve(&item).await.is_err());
        assert!(matches!(resolver.resolve(&item).await, Ok(MatchResult::Matched(_))));
    }
}
