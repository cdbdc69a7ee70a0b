use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use watch_sync_models::{ClearSummary, ContentFilter, PushMode, SyncMode, UnmatchedLedger, WatchedItem};
use watch_sync_sources::{SourceError, WatchDestination, WatchSource};

use crate::detect::detect_changes;
use crate::error::{Result, SyncError};
use crate::push::{PushEngine, PushReport, PushRun, PushSettings};
use crate::store::{LedgerStore, SnapshotStore};

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub mode: SyncMode,
    /// Cutoff passed to the source, if any.
    pub since: Option<DateTime<Utc>>,
    pub fetched: usize,
    pub changed: usize,
    pub new_items: usize,
    pub updated_items: usize,
    pub snapshot_size: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PushRequest {
    pub mode: PushMode,
    pub filter: ContentFilter,
    pub dry_run: bool,
    /// Only items without a pushed marker.
    pub pending_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub download: DownloadReport,
    pub push: PushReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceCheck {
    pub service: String,
    pub role: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<ServiceCheck>,
}

impl ValidationReport {
    pub fn all_ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }
}

/// Drives download and push against one source and one destination.
pub struct SyncOrchestrator {
    source: Arc<dyn WatchSource>,
    destination: Arc<dyn WatchDestination>,
    snapshots: SnapshotStore,
    ledger: LedgerStore,
    settings: PushSettings,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn WatchSource>,
        destination: Arc<dyn WatchDestination>,
        snapshots: SnapshotStore,
        ledger: LedgerStore,
        settings: PushSettings,
    ) -> Self {
        Self {
            source,
            destination,
            snapshots,
            ledger,
            settings,
        }
    }

    /// Downloads the source watch history and merges the changes into the snapshot.
    ///
    /// The sync checkpoint only moves on unfiltered downloads; a movies-only run
    /// must not hide episodes changed in the meantime from the next incremental run.
    #[instrument(skip(self))]
    pub async fn download(&self, mode: SyncMode, filter: ContentFilter) -> Result<DownloadReport> {
        let mut snapshot = self.snapshots.load()?;
        let started = Utc::now();
        let since = match mode {
            SyncMode::Full => None,
            SyncMode::Incremental => snapshot.incremental_cutoff(),
        };

        info!(
            operation = "download",
            source = self.source.source_name(),
            mode = %mode,
            since = ?since,
            "Downloading watch history"
        );
        let source = &self.source;
        let fetched = self
            .settings
            .retry
            .without_timeout()
            .run("list_watched", move || source.list_watched(since, filter))
            .await
            .map_err(|e| SyncError::remote(self.source.source_name(), e))?;

        let fetched_count = fetched.len();
        let changes = detect_changes(fetched, &snapshot, mode);
        let changed = changes.changed.len();
        for item in changes.changed {
            snapshot.upsert(item);
        }

        if filter == ContentFilter::All {
            match mode {
                SyncMode::Full => snapshot.last_full_sync_at = Some(started),
                SyncMode::Incremental => snapshot.last_incremental_sync_at = Some(started),
            }
        }
        self.snapshots.save(&snapshot)?;

        let report = DownloadReport {
            mode,
            since,
            fetched: fetched_count,
            changed,
            new_items: changes.new_items,
            updated_items: changes.updated_items,
            snapshot_size: snapshot.len(),
        };
        info!(
            operation = "download",
            fetched = report.fetched,
            new_items = report.new_items,
            updated_items = report.updated_items,
            total = report.snapshot_size,
            "Download complete"
        );
        Ok(report)
    }

    /// Pushes fully watched snapshot items to the destination.
    ///
    /// Outside dry runs the pushed markers, the unmatched ledger and the push
    /// checkpoint are saved afterwards, snapshot first. If the destination
    /// refuses the credentials mid-run, markers for completed writes are still
    /// saved before the error is returned.
    #[instrument(skip(self))]
    pub async fn push(&self, request: PushRequest) -> Result<PushReport> {
        let mut snapshot = self.snapshots.load()?;
        let candidates: Vec<WatchedItem> = snapshot
            .items
            .values()
            .filter(|e| e.item.is_fully_watched && request.filter.includes(e.item.kind))
            .filter(|e| !request.pending_only || e.pushed_at.is_none())
            .map(|e| e.item.clone())
            .collect();

        let engine = PushEngine::new(self.destination.clone(), self.settings.clone());
        let PushRun { report, abort } = engine.push(&candidates, request.mode, request.dry_run).await?;
        if request.dry_run {
            return Ok(report);
        }

        let now = Utc::now();
        for outcome in report.outcomes.iter().filter(|o| o.kind.is_settled()) {
            snapshot.mark_pushed(&outcome.source_id, now);
        }
        if let Some(err) = abort {
            self.snapshots.save(&snapshot)?;
            return Err(err);
        }

        let mut ledger = UnmatchedLedger::new(now);
        for outcome in &report.outcomes {
            if let (Some(reason), Some(entry)) = (&outcome.unmatched, snapshot.get(&outcome.source_id)) {
                ledger.record(&entry.item, reason.clone());
            }
        }
        snapshot
            .last_push_at
            .insert(self.destination.destination_name().to_string(), now);

        self.snapshots.save(&snapshot)?;
        self.ledger.save(&ledger)?;
        if !ledger.is_empty() {
            warn!(
                operation = "push",
                unmatched = ledger.len(),
                ledger = %self.ledger.path().display(),
                "Some items could not be matched"
            );
        }
        Ok(report)
    }

    /// Download followed by a push of everything still pending.
    pub async fn sync(&self, mode: SyncMode, request: PushRequest) -> Result<SyncReport> {
        let download = self.download(mode, request.filter).await?;
        let push = self
            .push(PushRequest {
                pending_only: true,
                ..request
            })
            .await?;
        Ok(SyncReport { download, push })
    }

    /// Removes all watched movies and shows from the destination history.
    pub async fn clear_destination(&self) -> Result<ClearSummary> {
        let service = self.destination.destination_name();
        warn!(operation = "clear", destination = service, "Clearing destination watch history");
        let destination = &self.destination;
        let summary = self
            .settings
            .retry
            .without_timeout()
            .run("clear_all_history", move || destination.clear_all_history())
            .await
            .map_err(|e| SyncError::remote(service, e))?;
        info!(
            operation = "clear",
            movies = summary.movies_removed,
            episodes = summary.episodes_removed,
            "Destination history cleared"
        );
        Ok(summary)
    }

    /// Checks that both services accept the configured credentials.
    pub async fn validate(&self) -> ValidationReport {
        let source = self.source.authenticate().await;
        let destination = self.destination.authenticate().await;
        let report = ValidationReport {
            checks: vec![
                service_check(self.source.source_name(), "source", source),
                service_check(self.destination.destination_name(), "destination", destination),
            ],
        };
        info!(operation = "validate", ok = report.all_ok(), "Validated credentials");
        report
    }
}

fn service_check(service: &str, role: &'static str, result: std::result::Result<(), SourceError>) -> ServiceCheck {
    let error = result.err().map(|e| e.to_string());
    ServiceCheck {
        service: service.to_string(),
        role,
        ok: error.is_none(),
        error,
    }
}
