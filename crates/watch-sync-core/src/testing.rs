//! In-memory source and destination used by the engine tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use watch_sync_models::{
    AddWatchedResult, ClearSummary, ContentFilter, ExternalIds, HistoryEntry, IdNamespace, Identity, IdentityKind,
    WatchedItem, WatchedRecord,
};
use watch_sync_sources::{SourceError, WatchDestination, WatchSource};

use crate::push::PushSettings;
use crate::retry::RetryPolicy;

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
        max_rate_limit_pauses: 3,
        call_timeout: None,
    }
}

pub fn push_settings(batch_size: usize) -> PushSettings {
    PushSettings {
        batch_size,
        request_interval: Duration::ZERO,
        lookup_concurrency: 4,
        year_tolerance: 1,
        retry: retry_policy(),
    }
}

#[derive(Default)]
struct SourceState {
    items: Vec<WatchedItem>,
    requests: Vec<Option<DateTime<Utc>>>,
    error: Option<SourceError>,
}

pub struct FakeSource {
    state: Mutex<SourceState>,
}

impl FakeSource {
    pub fn new(items: Vec<WatchedItem>) -> Self {
        Self {
            state: Mutex::new(SourceState {
                items,
                ..Default::default()
            }),
        }
    }

    pub fn set_items(&self, items: Vec<WatchedItem>) {
        self.state.lock().unwrap().items = items;
    }

    pub fn fail_next(&self, error: SourceError) {
        self.state.lock().unwrap().error = Some(error);
    }

    /// The `since` argument of every listing call so far.
    pub fn requests(&self) -> Vec<Option<DateTime<Utc>>> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl WatchSource for FakeSource {
    fn source_name(&self) -> &str {
        "fake-source"
    }

    async fn authenticate(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn list_watched(
        &self,
        since: Option<DateTime<Utc>>,
        filter: ContentFilter,
    ) -> Result<Vec<WatchedItem>, SourceError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(since);
        if let Some(err) = state.error.take() {
            return Err(err);
        }
        Ok(state
            .items
            .iter()
            .filter(|i| filter.includes(i.kind))
            .filter(|i| since.map_or(true, |s| i.last_modified > s))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct DestinationState {
    catalogue: HashMap<(IdentityKind, IdNamespace, String), Vec<Identity>>,
    episodes: HashMap<(u64, u32, u32), Identity>,
    records: HashMap<(IdentityKind, u64), WatchedRecord>,
    lookup_errors: VecDeque<SourceError>,
    add_errors: VecDeque<SourceError>,
    reject_ids: HashSet<u64>,
    reject_times: HashSet<DateTime<Utc>>,
    add_failures: HashMap<usize, SourceError>,
    not_found_ids: HashSet<u64>,
    lookups: usize,
    add_calls: Vec<Vec<HistoryEntry>>,
    remove_calls: Vec<Vec<Identity>>,
    auth_error: bool,
}

pub struct FakeDestination {
    batch: bool,
    state: Mutex<DestinationState>,
}

impl FakeDestination {
    pub fn new() -> Self {
        Self {
            batch: true,
            state: Mutex::new(DestinationState::default()),
        }
    }

    pub fn without_batch() -> Self {
        Self {
            batch: false,
            ..Self::new()
        }
    }

    fn add_catalogue(&self, kind: IdentityKind, ns: IdNamespace, value: &str, identity: Identity) {
        self.state
            .lock()
            .unwrap()
            .catalogue
            .entry((kind, ns, value.to_string()))
            .or_default()
            .push(identity);
    }

    pub fn add_movie(&self, ns: IdNamespace, value: &str, identity: Identity) {
        self.add_catalogue(IdentityKind::Movie, ns, value, identity);
    }

    pub fn add_show(&self, ns: IdNamespace, value: &str, identity: Identity) {
        self.add_catalogue(IdentityKind::Show, ns, value, identity);
    }

    pub fn add_episode(&self, show: &Identity, season: u32, number: u32, identity: Identity) {
        self.state
            .lock()
            .unwrap()
            .episodes
            .insert((show.id, season, number), identity);
    }

    pub fn set_record(&self, identity: &Identity, record: WatchedRecord) {
        self.state
            .lock()
            .unwrap()
            .records
            .insert((identity.kind, identity.id), record);
    }

    pub fn record(&self, identity: &Identity) -> Option<WatchedRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&(identity.kind, identity.id))
            .cloned()
    }

    pub fn queue_lookup_error(&self, error: SourceError) {
        self.state.lock().unwrap().lookup_errors.push_back(error);
    }

    pub fn queue_add_error(&self, error: SourceError) {
        self.state.lock().unwrap().add_errors.push_back(error);
    }

    /// Any add request containing this id is rejected as a whole.
    pub fn reject_id(&self, id: u64) {
        self.state.lock().unwrap().reject_ids.insert(id);
    }

    /// Any add request carrying this watch time is rejected as a whole.
    pub fn reject_watched_at(&self, at: DateTime<Utc>) {
        self.state.lock().unwrap().reject_times.insert(at);
    }

    /// The `call`-th add request (1-based) fails with `error`.
    pub fn fail_add_call(&self, call: usize, error: SourceError) {
        self.state.lock().unwrap().add_failures.insert(call, error);
    }

    /// Adds for this id are accepted but reported as not found.
    pub fn not_found_id(&self, id: u64) {
        self.state.lock().unwrap().not_found_ids.insert(id);
    }

    pub fn fail_auth(&self) {
        self.state.lock().unwrap().auth_error = true;
    }

    pub fn lookup_count(&self) -> usize {
        self.state.lock().unwrap().lookups
    }

    pub fn add_calls(&self) -> Vec<Vec<HistoryEntry>> {
        self.state.lock().unwrap().add_calls.clone()
    }

    pub fn remove_calls(&self) -> Vec<Vec<Identity>> {
        self.state.lock().unwrap().remove_calls.clone()
    }
}

#[async_trait]
impl WatchDestination for FakeDestination {
    fn destination_name(&self) -> &str {
        "fake-destination"
    }

    fn supports_batch(&self) -> bool {
        self.batch
    }

    async fn authenticate(&self) -> Result<(), SourceError> {
        if self.state.lock().unwrap().auth_error {
            return Err(SourceError::Auth("token revoked".to_string()));
        }
        Ok(())
    }

    async fn find_identity(&self, kind: IdentityKind, ids: &ExternalIds) -> Result<Vec<Identity>, SourceError> {
        let mut state = self.state.lock().unwrap();
        state.lookups += 1;
        if state.auth_error {
            return Err(SourceError::Auth("token revoked".to_string()));
        }
        if let Some(err) = state.lookup_errors.pop_front() {
            return Err(err);
        }
        for (ns, value) in ids.iter() {
            if let Some(found) = state.catalogue.get(&(kind, ns, value.to_string())) {
                if !found.is_empty() {
                    return Ok(found.clone());
                }
            }
        }
        Ok(Vec::new())
    }

    async fn find_episode(&self, show: &Identity, season: u32, number: u32) -> Result<Vec<Identity>, SourceError> {
        let state = self.state.lock().unwrap();
        Ok(state.episodes.get(&(show.id, season, number)).cloned().into_iter().collect())
    }

    async fn get_watched_record(&self, identity: &Identity) -> Result<Option<WatchedRecord>, SourceError> {
        Ok(self.record(identity))
    }

    async fn add_watched(&self, entries: &[HistoryEntry]) -> Result<AddWatchedResult, SourceError> {
        let mut state = self.state.lock().unwrap();
        state.add_calls.push(entries.to_vec());
        if state.auth_error {
            return Err(SourceError::Auth("token revoked".to_string()));
        }
        if let Some(err) = state.add_errors.pop_front() {
            return Err(err);
        }
        let call = state.add_calls.len();
        if let Some(err) = state.add_failures.remove(&call) {
            return Err(err);
        }
        let rejected = entries.iter().any(|e| {
            state.reject_ids.contains(&e.identity.id)
                || e.watched_at.is_some_and(|at| state.reject_times.contains(&at))
        });
        if rejected {
            return Err(SourceError::Rejected {
                status: 422,
                message: "invalid item in payload".to_string(),
            });
        }

        let mut result = AddWatchedResult::default();
        for entry in entries {
            if state.not_found_ids.contains(&entry.identity.id) {
                result.not_found.push(entry.identity.clone());
                continue;
            }
            let record = state
                .records
                .entry((entry.identity.kind, entry.identity.id))
                .or_default();
            let plays = entry.plays.max(1);
            record.plays += plays;
            if let Some(at) = entry.watched_at {
                record.watched_at.extend(std::iter::repeat(at).take(plays as usize));
            }
            result.added += plays as usize;
        }
        Ok(result)
    }

    async fn remove_watched(&self, identities: &[Identity]) -> Result<(), SourceError> {
        let mut state = self.state.lock().unwrap();
        state.remove_calls.push(identities.to_vec());
        for identity in identities {
            state.records.remove(&(identity.kind, identity.id));
        }
        Ok(())
    }

    async fn clear_all_history(&self) -> Result<ClearSummary, SourceError> {
        let mut state = self.state.lock().unwrap();
        let mut summary = ClearSummary::default();
        for ((kind, _), _) in state.records.drain() {
            match kind {
                IdentityKind::Movie => summary.movies_removed += 1,
                _ => summary.episodes_removed += 1,
            }
        }
        Ok(summary)
    }
}
