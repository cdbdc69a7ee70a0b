use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use watch_sync_config::PushOptions;
use watch_sync_models::{
    HistoryEntry, Identity, IdentityKind, ItemKind, PushMode, UnmatchReason, WatchedItem, WatchedRecord,
};
use watch_sync_sources::{SourceError, WatchDestination};

use crate::error::{Result, SyncError};
use crate::resolver::{IdentityResolver, MatchResult};
use crate::retry::RetryPolicy;

/// Tunables for one push run, derived from the `[push]` config section.
#[derive(Debug, Clone)]
pub struct PushSettings {
    pub batch_size: usize,
    pub request_interval: Duration,
    pub lookup_concurrency: usize,
    pub year_tolerance: u32,
    pub retry: RetryPolicy,
}

impl PushSettings {
    pub fn from_options(options: &PushOptions) -> Self {
        Self {
            batch_size: options.batch_size.max(1),
            request_interval: options.request_interval(),
            lookup_concurrency: options.lookup_concurrency.max(1),
            year_tolerance: options.year_tolerance,
            retry: RetryPolicy::from_options(options),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcomeKind {
    Pushed,
    SkippedAlreadyPresent,
    SkippedAmbiguousMatch,
    SkippedUnmatched,
    FailedTransient,
    FailedPermanent,
}

impl PushOutcomeKind {
    pub const ALL: [PushOutcomeKind; 6] = [
        PushOutcomeKind::Pushed,
        PushOutcomeKind::SkippedAlreadyPresent,
        PushOutcomeKind::SkippedAmbiguousMatch,
        PushOutcomeKind::SkippedUnmatched,
        PushOutcomeKind::FailedTransient,
        PushOutcomeKind::FailedPermanent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PushOutcomeKind::Pushed => "pushed",
            PushOutcomeKind::SkippedAlreadyPresent => "skipped_already_present",
            PushOutcomeKind::SkippedAmbiguousMatch => "skipped_ambiguous_match",
            PushOutcomeKind::SkippedUnmatched => "skipped_unmatched",
            PushOutcomeKind::FailedTransient => "failed_transient",
            PushOutcomeKind::FailedPermanent => "failed_permanent",
        }
    }

    /// Whether the destination now reflects the item, so its pushed marker can move.
    pub fn is_settled(&self) -> bool {
        matches!(self, PushOutcomeKind::Pushed | PushOutcomeKind::SkippedAlreadyPresent)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PushOutcomeKind::FailedTransient | PushOutcomeKind::FailedPermanent)
    }

    fn for_error(err: &SourceError) -> Self {
        if err.is_retryable() {
            PushOutcomeKind::FailedTransient
        } else {
            PushOutcomeKind::FailedPermanent
        }
    }
}

impl fmt::Display for PushOutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PushOutcome {
    pub source_id: String,
    pub title: String,
    pub item_kind: ItemKind,
    pub kind: PushOutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Set in dry runs: the write was decided but not performed.
    pub simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmatched: Option<UnmatchReason>,
}

impl PushOutcome {
    fn new(item: &WatchedItem, kind: PushOutcomeKind) -> Self {
        Self {
            source_id: item.source_id.clone(),
            title: item.display_title(),
            item_kind: item.kind,
            kind,
            identity: None,
            detail: None,
            simulated: false,
            unmatched: None,
        }
    }

    fn with_identity(mut self, identity: &Identity) -> Self {
        self.identity = Some(identity.clone());
        self
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn failed(item: &WatchedItem, err: &SourceError) -> Self {
        PushOutcome::new(item, PushOutcomeKind::for_error(err)).with_detail(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    pub destination: String,
    pub mode: PushMode,
    pub dry_run: bool,
    /// One outcome per candidate, in candidate order.
    pub outcomes: Vec<PushOutcome>,
}

impl PushReport {
    pub fn count(&self, kind: PushOutcomeKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind == kind).count()
    }

    /// Non-zero counts per outcome kind.
    pub fn summary(&self) -> Vec<(PushOutcomeKind, usize)> {
        PushOutcomeKind::ALL
            .iter()
            .map(|kind| (*kind, self.count(*kind)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }
}

/// A push that stopped on an authentication failure during the write stage
/// carries the error in `abort`; outcomes written before it are still valid.
#[derive(Debug)]
pub struct PushRun {
    pub report: PushReport,
    pub abort: Option<SyncError>,
}

/// A write decided during planning.
#[derive(Debug)]
struct PendingWrite {
    index: usize,
    identity: Identity,
    entry: HistoryEntry,
    /// Overwrite mode: the existing record is removed before the add.
    replace: bool,
    /// The record being replaced, put back if the destination rejects the new one.
    previous: Option<WatchedRecord>,
}

#[derive(Debug)]
enum Plan {
    Done(usize, PushOutcome),
    Write(PendingWrite),
}

/// Pushes watched items to a destination under a conflict policy.
pub struct PushEngine {
    destination: Arc<dyn WatchDestination>,
    settings: PushSettings,
}

impl PushEngine {
    pub fn new(destination: Arc<dyn WatchDestination>, settings: PushSettings) -> Self {
        Self { destination, settings }
    }

    fn service(&self) -> &str {
        self.destination.destination_name()
    }

    /// Resolves, plans and writes `items`.
    ///
    /// Lookups run concurrently up to `lookup_concurrency`; writes are applied
    /// sequentially. An authentication failure while planning returns `Err`
    /// before anything is written.
    pub async fn push(&self, items: &[WatchedItem], mode: PushMode, dry_run: bool) -> Result<PushRun> {
        info!(
            operation = "push",
            destination = self.service(),
            mode = %mode,
            dry_run,
            candidates = items.len(),
            "Starting push"
        );

        let resolver = IdentityResolver::new(
            self.destination.clone(),
            self.settings.retry.clone(),
            self.settings.year_tolerance,
        );
        let plans: Vec<Plan> = stream::iter(items.iter().enumerate())
            .map(|(index, item)| self.plan(&resolver, index, item, mode))
            .buffered(self.settings.lookup_concurrency)
            .try_collect()
            .await?;

        let mut outcomes: Vec<Option<PushOutcome>> = vec![None; items.len()];
        let mut writes = Vec::new();
        for plan in plans {
            match plan {
                Plan::Done(index, outcome) => outcomes[index] = Some(outcome),
                Plan::Write(write) => writes.push(write),
            }
        }
        let (writes, duplicates) = split_duplicates(writes, mode);

        let abort = if dry_run {
            for write in writes {
                let item = &items[write.index];
                let mut outcome = PushOutcome::new(item, PushOutcomeKind::Pushed)
                    .with_identity(&write.identity)
                    .with_detail(if write.replace { "would replace record" } else { "would add" });
                outcome.simulated = true;
                outcomes[write.index] = Some(outcome);
            }
            None
        } else {
            self.write_all(items, writes, &mut outcomes).await
        };

        for (index, first) in duplicates {
            let outcome = outcomes[first]
                .as_ref()
                .map(|first| duplicate_outcome(&items[index], first));
            outcomes[index] = outcome;
        }

        let report = PushReport {
            destination: self.service().to_string(),
            mode,
            dry_run,
            outcomes: outcomes.into_iter().flatten().collect(),
        };
        info!(
            operation = "push",
            destination = self.service(),
            pushed = report.count(PushOutcomeKind::Pushed),
            already_present = report.count(PushOutcomeKind::SkippedAlreadyPresent),
            unmatched = report.count(PushOutcomeKind::SkippedUnmatched),
            ambiguous = report.count(PushOutcomeKind::SkippedAmbiguousMatch),
            failed_transient = report.count(PushOutcomeKind::FailedTransient),
            failed_permanent = report.count(PushOutcomeKind::FailedPermanent),
            aborted = abort.is_some(),
            "Push finished"
        );
        Ok(PushRun { report, abort })
    }

    async fn plan(&self, resolver: &IdentityResolver, index: usize, item: &WatchedItem, mode: PushMode) -> Result<Plan> {
        let identity = match resolver.resolve(item).await {
            Ok(MatchResult::Matched(identity)) => identity,
            Ok(MatchResult::Unmatched(reason)) => {
                debug!(
                    source_id = %item.source_id,
                    id = item.external_ids.primary_id().as_deref().unwrap_or("-"),
                    reason = reason.code(),
                    "No destination match"
                );
                let mut outcome = PushOutcome::new(item, PushOutcomeKind::SkippedUnmatched).with_detail(reason.to_string());
                outcome.unmatched = Some(reason);
                return Ok(Plan::Done(index, outcome));
            }
            Ok(ambiguous @ MatchResult::Ambiguous(_)) => {
                let reason = ambiguous.unmatch_reason();
                let mut outcome = PushOutcome::new(item, PushOutcomeKind::SkippedAmbiguousMatch);
                if let Some(reason) = reason {
                    outcome = outcome.with_detail(reason.to_string());
                    outcome.unmatched = Some(reason);
                }
                return Ok(Plan::Done(index, outcome));
            }
            Err(err) => return self.planning_failure(index, item, err),
        };

        let destination = &self.destination;
        let target = &identity;
        let record = match self
            .settings
            .retry
            .run("get_watched_record", move || destination.get_watched_record(target))
            .await
        {
            Ok(record) => record,
            Err(err) => return self.planning_failure(index, item, err).map(|plan| attach(plan, &identity)),
        };

        Ok(decide(index, item, identity, record, mode))
    }

    fn planning_failure(&self, index: usize, item: &WatchedItem, err: SourceError) -> Result<Plan> {
        if err.is_auth() {
            return Err(SyncError::remote(self.service(), err));
        }
        warn!(source_id = %item.source_id, error = %err, "Lookup failed");
        Ok(Plan::Done(index, PushOutcome::failed(item, &err)))
    }

    /// Applies planned writes in order. Returns the abort error if the
    /// destination refused the credentials part way through; writes that
    /// already settled keep their outcome.
    async fn write_all(
        &self,
        items: &[WatchedItem],
        writes: Vec<PendingWrite>,
        outcomes: &mut [Option<PushOutcome>],
    ) -> Option<SyncError> {
        let batch_size = if self.destination.supports_batch() {
            self.settings.batch_size
        } else {
            1
        };

        let mut chunks = writes.chunks(batch_size).peekable();
        while let Some(chunk) = chunks.next() {
            if let Err(err) = self.write_chunk(items, chunk, outcomes).await {
                warn!(operation = "push", error = %err, "Aborting push");
                let rest = std::iter::once(chunk).chain(chunks).flatten();
                for write in rest {
                    if outcomes[write.index].is_some() {
                        continue;
                    }
                    outcomes[write.index] = Some(
                        PushOutcome::new(&items[write.index], PushOutcomeKind::FailedTransient)
                            .with_identity(&write.identity)
                            .with_detail("not attempted: run aborted"),
                    );
                }
                return Some(err);
            }
            if batch_size == 1 && chunks.peek().is_some() && !self.settings.request_interval.is_zero() {
                sleep(self.settings.request_interval).await;
            }
        }
        None
    }

    /// Writes one chunk, filling `outcomes` as items settle.
    async fn write_chunk(
        &self,
        items: &[WatchedItem],
        chunk: &[PendingWrite],
        outcomes: &mut [Option<PushOutcome>],
    ) -> Result<()> {
        let removals: Vec<Identity> = chunk
            .iter()
            .filter(|w| w.replace)
            .map(|w| w.identity.clone())
            .collect();
        if !removals.is_empty() {
            let destination = &self.destination;
            let removals = &removals;
            let removed = self
                .settings
                .retry
                .run("remove_watched", move || destination.remove_watched(removals))
                .await;
            if let Err(err) = removed {
                return self.fail_chunk(items, chunk, err, false, outcomes).await;
            }
        }

        match self.add(chunk).await {
            Ok(not_found) => store(outcomes, settle(items, chunk, &not_found)),
            Err(SourceError::Rejected { status, message }) if chunk.len() > 1 => {
                warn!(
                    operation = "add_watched",
                    status,
                    size = chunk.len(),
                    error = %message,
                    "Batch rejected, retrying items individually"
                );
                for write in chunk {
                    let single = std::slice::from_ref(write);
                    match self.add(single).await {
                        Ok(not_found) => store(outcomes, settle(items, single, &not_found)),
                        Err(err) => self.fail_chunk(items, single, err, true, outcomes).await?,
                    }
                }
            }
            Err(err) => self.fail_chunk(items, chunk, err, true, outcomes).await?,
        }
        Ok(())
    }

    async fn add(&self, chunk: &[PendingWrite]) -> std::result::Result<Vec<Identity>, SourceError> {
        let entries: Vec<HistoryEntry> = chunk.iter().map(|w| w.entry.clone()).collect();
        let destination = &self.destination;
        let entries = &entries;
        let result = self
            .settings
            .retry
            .run("add_watched", move || destination.add_watched(entries))
            .await?;
        debug!(operation = "add_watched", size = chunk.len(), added = result.added, "Submitted history");
        Ok(result.not_found)
    }

    /// Records `err` for every write in `chunk`. Authentication failures are
    /// returned instead so the run can abort.
    async fn fail_chunk(
        &self,
        items: &[WatchedItem],
        chunk: &[PendingWrite],
        err: SourceError,
        removed: bool,
        outcomes: &mut [Option<PushOutcome>],
    ) -> Result<()> {
        if err.is_auth() {
            return Err(SyncError::remote(self.service(), err));
        }
        warn!(operation = "add_watched", size = chunk.len(), error = %err, "Write failed");
        for write in chunk {
            let outcome = self.failed_write(items, write, &err, removed).await;
            outcomes[write.index] = Some(outcome);
        }
        Ok(())
    }

    async fn failed_write(
        &self,
        items: &[WatchedItem],
        write: &PendingWrite,
        err: &SourceError,
        removed: bool,
    ) -> PushOutcome {
        let outcome = PushOutcome::failed(&items[write.index], err).with_identity(&write.identity);
        let previous = match (&write.previous, err) {
            (Some(previous), SourceError::Rejected { .. }) if removed => previous,
            _ => return outcome,
        };
        let detail = match self.restore(&write.identity, previous).await {
            Ok(()) => format!("{}; existing record removed, re-add rejected, previous history restored", err),
            Err(restore_err) => {
                warn!(
                    operation = "restore_watched",
                    identity = %write.identity,
                    error = %restore_err,
                    "Could not restore replaced history"
                );
                format!(
                    "{}; existing record removed, re-add rejected, restore failed: {}",
                    err, restore_err
                )
            }
        };
        outcome.with_detail(detail)
    }

    /// Puts back history removed for an overwrite whose new record was rejected.
    async fn restore(&self, identity: &Identity, previous: &WatchedRecord) -> std::result::Result<(), SourceError> {
        let entries = restore_entries(identity, previous);
        if entries.is_empty() {
            return Ok(());
        }
        let destination = &self.destination;
        let entries = &entries;
        self.settings
            .retry
            .run("restore_watched", move || destination.add_watched(entries))
            .await?;
        info!(
            operation = "restore_watched",
            identity = %identity,
            events = entries.len(),
            "Restored history after rejected overwrite"
        );
        Ok(())
    }
}

fn store(outcomes: &mut [Option<PushOutcome>], settled: Vec<(usize, PushOutcome)>) {
    for (index, outcome) in settled {
        outcomes[index] = Some(outcome);
    }
}

fn restore_entries(identity: &Identity, previous: &WatchedRecord) -> Vec<HistoryEntry> {
    if previous.watched_at.is_empty() {
        if previous.plays == 0 {
            return Vec::new();
        }
        return vec![HistoryEntry {
            identity: identity.clone(),
            watched_at: None,
            plays: previous.plays,
        }];
    }
    previous
        .watched_at
        .iter()
        .map(|at| HistoryEntry {
            identity: identity.clone(),
            watched_at: Some(*at),
            plays: 1,
        })
        .collect()
}

/// Drops writes that would submit the same destination event as an earlier
/// candidate: same identity and watch second under merge, same identity
/// otherwise. Returns the kept writes and `(duplicate index, first index)` pairs.
fn split_duplicates(writes: Vec<PendingWrite>, mode: PushMode) -> (Vec<PendingWrite>, Vec<(usize, usize)>) {
    let mut first: HashMap<(IdentityKind, u64, Option<i64>), usize> = HashMap::new();
    let mut kept = Vec::with_capacity(writes.len());
    let mut duplicates = Vec::new();
    for write in writes {
        let at = match mode {
            PushMode::Merge => write.entry.watched_at.map(|at| at.timestamp()),
            PushMode::Skip | PushMode::Overwrite => None,
        };
        match first.entry((write.identity.kind, write.identity.id, at)) {
            Entry::Occupied(seen) => duplicates.push((write.index, *seen.get())),
            Entry::Vacant(slot) => {
                slot.insert(write.index);
                kept.push(write);
            }
        }
    }
    (kept, duplicates)
}

/// Outcome for a candidate whose write was folded into an earlier one.
fn duplicate_outcome(item: &WatchedItem, first: &PushOutcome) -> PushOutcome {
    let mut outcome = if first.kind.is_settled() {
        PushOutcome::new(item, PushOutcomeKind::SkippedAlreadyPresent)
            .with_detail(format!("same watch as {}", first.source_id))
    } else {
        PushOutcome::new(item, first.kind).with_detail(format!("same watch as {}, which failed", first.source_id))
    };
    outcome.identity = first.identity.clone();
    outcome.simulated = first.simulated;
    outcome
}

fn settle(items: &[WatchedItem], chunk: &[PendingWrite], not_found: &[Identity]) -> Vec<(usize, PushOutcome)> {
    chunk
        .iter()
        .map(|w| {
            let item = &items[w.index];
            let missing = not_found
                .iter()
                .any(|i| i.kind == w.identity.kind && i.id == w.identity.id);
            let outcome = if missing {
                PushOutcome::new(item, PushOutcomeKind::FailedPermanent).with_detail("destination reported identity not found")
            } else {
                PushOutcome::new(item, PushOutcomeKind::Pushed)
            };
            (w.index, outcome.with_identity(&w.identity))
        })
        .collect()
}

fn attach(plan: Plan, identity: &Identity) -> Plan {
    match plan {
        Plan::Done(index, outcome) => Plan::Done(index, outcome.with_identity(identity)),
        other => other,
    }
}

/// Applies the conflict policy to a resolved item and its existing record.
fn decide(index: usize, item: &WatchedItem, identity: Identity, record: Option<WatchedRecord>, mode: PushMode) -> Plan {
    let present = |detail: &str| {
        Plan::Done(
            index,
            PushOutcome::new(item, PushOutcomeKind::SkippedAlreadyPresent)
                .with_identity(&identity)
                .with_detail(detail),
        )
    };
    let write = |plays: u32, previous: Option<WatchedRecord>| {
        Plan::Write(PendingWrite {
            index,
            entry: HistoryEntry {
                identity: identity.clone(),
                watched_at: item.watched_at,
                plays,
            },
            identity: identity.clone(),
            replace: previous.is_some(),
            previous,
        })
    };

    match (mode, record) {
        (PushMode::Skip, Some(_)) => present("record exists"),
        (PushMode::Skip, None) | (PushMode::Merge, None) => write(1, None),
        (PushMode::Overwrite, record) => write(item.play_count.max(1), record),
        (PushMode::Merge, Some(record)) => match item.watched_at {
            None => present("record exists, local watch time unknown"),
            Some(at) if record.contains(at) => present("watch time already recorded"),
            Some(_) => write(1, None),
        },
    }
}

#[cfg(test)]
mod tests;
