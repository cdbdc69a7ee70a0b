use super::*;
use crate::testing::{push_settings, FakeDestination};
use chrono::{DateTime, TimeZone, Utc};
use watch_sync_models::{IdNamespace, IdentityKind};

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn movie(n: u64, watched: i64) -> WatchedItem {
    let mut item = WatchedItem::movie(format!("m{}", n), format!("Movie {}", n), t(0)).with_watched_at(t(watched));
    item.external_ids.insert(IdNamespace::Imdb, &format!("tt{}", n));
    item
}

fn identity(n: u64) -> Identity {
    Identity::new(IdentityKind::Movie, n)
}

/// Destination knowing movies `1..=count` by imdb id.
fn destination(count: u64) -> Arc<FakeDestination> {
    let dest = Arc::new(FakeDestination::new());
    for n in 1..=count {
        dest.add_movie(IdNamespace::Imdb, &format!("tt{}", n), identity(n));
    }
    dest
}

fn engine(dest: &Arc<FakeDestination>, batch_size: usize) -> PushEngine {
    PushEngine::new(dest.clone(), push_settings(batch_size))
}

fn kinds(report: &PushReport) -> Vec<PushOutcomeKind> {
    report.outcomes.iter().map(|o| o.kind).collect()
}

#[tokio::test]
async fn test_skip_adds_one_event_when_absent() {
    let dest = destination(1);
    let mut item = movie(1, 10);
    item.play_count = 4;
    let run = engine(&dest, 10).push(&[item], PushMode::Skip, false).await.unwrap();

    assert_eq!(kinds(&run.report), vec![PushOutcomeKind::Pushed]);
    let record = dest.record(&identity(1)).unwrap();
    assert_eq!(record.plays, 1);
    assert_eq!(record.watched_at, vec![t(10)]);
}

#[tokio::test]
async fn test_skip_never_alters_existing_record() {
    let dest = destination(1);
    let existing = WatchedRecord {
        plays: 3,
        watched_at: vec![t(1), t(2), t(3)],
    };
    dest.set_record(&identity(1), existing.clone());

    let run = engine(&dest, 10).push(&[movie(1, 99)], PushMode::Skip, false).await.unwrap();

    assert_eq!(kinds(&run.report), vec![PushOutcomeKind::SkippedAlreadyPresent]);
    assert_eq!(dest.record(&identity(1)), Some(existing));
    assert!(dest.add_calls().is_empty());
}

#[tokio::test]
async fn test_overwrite_replaces_record_with_local_state() {
    let dest = destination(1);
    dest.set_record(
        &identity(1),
        WatchedRecord {
            plays: 7,
            watched_at: vec![t(1)],
        },
    );
    let mut item = movie(1, 50);
    item.play_count = 2;

    let run = engine(&dest, 10).push(&[item], PushMode::Overwrite, false).await.unwrap();

    assert_eq!(kinds(&run.report), vec![PushOutcomeKind::Pushed]);
    assert_eq!(dest.remove_calls(), vec![vec![identity(1)]]);
    assert_eq!(
        dest.record(&identity(1)),
        Some(WatchedRecord {
            plays: 2,
            watched_at: vec![t(50), t(50)],
        })
    );
}

#[tokio::test]
async fn test_overwrite_without_record_does_not_remove() {
    let dest = destination(1);
    engine(&dest, 10).push(&[movie(1, 5)], PushMode::Overwrite, false).await.unwrap();
    assert!(dest.remove_calls().is_empty());
    assert_eq!(dest.record(&identity(1)).unwrap().plays, 1);
}

#[tokio::test]
async fn test_merge_same_timestamp_twice_yields_one_event() {
    let dest = destination(1);
    let engine = engine(&dest, 10);
    let item = movie(1, 30);

    let first = engine.push(&[item.clone()], PushMode::Merge, false).await.unwrap();
    let second = engine.push(&[item], PushMode::Merge, false).await.unwrap();

    assert_eq!(kinds(&first.report), vec![PushOutcomeKind::Pushed]);
    assert_eq!(kinds(&second.report), vec![PushOutcomeKind::SkippedAlreadyPresent]);
    assert_eq!(dest.record(&identity(1)).unwrap().watched_at, vec![t(30)]);
}

#[tokio::test]
async fn test_merge_adds_new_timestamp() {
    let dest = destination(1);
    dest.set_record(
        &identity(1),
        WatchedRecord {
            plays: 1,
            watched_at: vec![t(1)],
        },
    );
    let run = engine(&dest, 10).push(&[movie(1, 2)], PushMode::Merge, false).await.unwrap();

    assert_eq!(kinds(&run.report), vec![PushOutcomeKind::Pushed]);
    assert_eq!(dest.record(&identity(1)).unwrap().watched_at, vec![t(1), t(2)]);
}

#[tokio::test]
async fn test_merge_with_unknown_local_time_counts_as_present() {
    let dest = destination(1);
    dest.set_record(
        &identity(1),
        WatchedRecord {
            plays: 1,
            watched_at: vec![t(1)],
        },
    );
    let mut item = movie(1, 0);
    item.watched_at = None;

    let run = engine(&dest, 10).push(&[item], PushMode::Merge, false).await.unwrap();
    assert_eq!(kinds(&run.report), vec![PushOutcomeKind::SkippedAlreadyPresent]);
}

#[tokio::test]
async fn test_dry_run_performs_no_writes() {
    let dest = destination(2);
    dest.set_record(&identity(2), WatchedRecord::default());
    let items = vec![movie(1, 1), movie(2, 2)];

    let run = engine(&dest, 10).push(&items, PushMode::Overwrite, true).await.unwrap();

    assert!(run.report.dry_run);
    assert!(run.report.outcomes.iter().all(|o| o.simulated && o.kind == PushOutcomeKind::Pushed));
    assert!(dest.add_calls().is_empty());
    assert!(dest.remove_calls().is_empty());
    assert_eq!(dest.record(&identity(1)), None);
}

#[tokio::test]
async fn test_outcomes_follow_input_order() {
    let dest = destination(3);
    let mut orphan = WatchedItem::movie("orphan", "No Ids", t(0));
    orphan.watched_at = Some(t(0));
    let items = vec![movie(3, 1), orphan, movie(1, 1), movie(9, 1)];

    let run = engine(&dest, 10).push(&items, PushMode::Skip, false).await.unwrap();

    let ids: Vec<&str> = run.report.outcomes.iter().map(|o| o.source_id.as_str()).collect();
    assert_eq!(ids, vec!["m3", "orphan", "m1", "m9"]);
    assert_eq!(
        kinds(&run.report),
        vec![
            PushOutcomeKind::Pushed,
            PushOutcomeKind::SkippedUnmatched,
            PushOutcomeKind::Pushed,
            PushOutcomeKind::SkippedUnmatched,
        ]
    );
    assert_eq!(run.report.outcomes[1].unmatched, Some(UnmatchReason::NoExternalIds));
    assert_eq!(run.report.outcomes[3].unmatched, Some(UnmatchReason::NotFound));
}

#[tokio::test]
async fn test_writes_are_batched() {
    let dest = destination(5);
    let items: Vec<WatchedItem> = (1..=5).map(|n| movie(n, n as i64)).collect();

    engine(&dest, 2).push(&items, PushMode::Skip, false).await.unwrap();

    let sizes: Vec<usize> = dest.add_calls().iter().map(|c| c.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[tokio::test]
async fn test_non_batch_destination_sends_one_request_per_item() {
    let dest = Arc::new(FakeDestination::without_batch());
    for n in 1..=3 {
        dest.add_movie(IdNamespace::Imdb, &format!("tt{}", n), identity(n));
    }
    let items: Vec<WatchedItem> = (1..=3).map(|n| movie(n, 0)).collect();

    engine(&dest, 100).push(&items, PushMode::Skip, false).await.unwrap();

    assert_eq!(dest.add_calls().len(), 3);
}

#[tokio::test]
async fn test_rejected_batch_is_isolated_per_item() {
    let dest = destination(3);
    dest.reject_id(2);
    let items: Vec<WatchedItem> = (1..=3).map(|n| movie(n, 0)).collect();

    let run = engine(&dest, 10).push(&items, PushMode::Skip, false).await.unwrap();

    assert_eq!(
        kinds(&run.report),
        vec![
            PushOutcomeKind::Pushed,
            PushOutcomeKind::FailedPermanent,
            PushOutcomeKind::Pushed,
        ]
    );
    // The whole batch, then each item alone.
    assert_eq!(dest.add_calls().len(), 4);
    assert!(dest.record(&identity(1)).is_some());
    assert!(dest.record(&identity(2)).is_none());
}

#[tokio::test]
async fn test_not_found_on_write_is_permanent() {
    let dest = destination(2);
    dest.not_found_id(1);
    let run = engine(&dest, 10)
        .push(&[movie(1, 0), movie(2, 0)], PushMode::Skip, false)
        .await
        .unwrap();
    assert_eq!(
        kinds(&run.report),
        vec![PushOutcomeKind::FailedPermanent, PushOutcomeKind::Pushed]
    );
}

#[tokio::test]
async fn test_transient_write_failure_is_retried() {
    let dest = destination(1);
    dest.queue_add_error(SourceError::Transient("503".to_string()));
    let run = engine(&dest, 10).push(&[movie(1, 0)], PushMode::Skip, false).await.unwrap();
    assert_eq!(kinds(&run.report), vec![PushOutcomeKind::Pushed]);
    assert_eq!(dest.add_calls().len(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_downgrade_to_failed_transient() {
    let dest = destination(2);
    for _ in 0..3 {
        dest.queue_add_error(SourceError::Timeout);
    }
    let run = engine(&dest, 1)
        .push(&[movie(1, 0), movie(2, 0)], PushMode::Skip, false)
        .await
        .unwrap();
    assert_eq!(
        kinds(&run.report),
        vec![PushOutcomeKind::FailedTransient, PushOutcomeKind::Pushed]
    );
    assert!(run.abort.is_none());
}

#[tokio::test]
async fn test_rate_limit_mid_batch_pauses_and_completes() {
    let dest = destination(3);
    let engine = engine(&dest, 1);
    let items: Vec<WatchedItem> = (1..=3).map(|n| movie(n, 0)).collect();
    dest.queue_add_error(SourceError::RateLimited {
        retry_after: Duration::ZERO,
    });

    let run = engine.push(&items, PushMode::Skip, false).await.unwrap();

    assert_eq!(run.report.count(PushOutcomeKind::Pushed), 3);
    assert_eq!(dest.add_calls().len(), 4);
}

#[tokio::test]
async fn test_auth_failure_while_planning_aborts() {
    let dest = destination(1);
    dest.fail_auth();
    let err = engine(&dest, 10)
        .push(&[movie(1, 0)], PushMode::Skip, false)
        .await
        .unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn test_auth_failure_while_writing_marks_rest_failed() {
    let dest = destination(3);
    dest.queue_add_error(SourceError::Auth("expired".to_string()));
    let items: Vec<WatchedItem> = (1..=3).map(|n| movie(n, 0)).collect();

    let run = engine(&dest, 1).push(&items, PushMode::Skip, false).await.unwrap();

    assert!(run.abort.as_ref().is_some_and(|e| e.is_auth()));
    assert_eq!(run.report.count(PushOutcomeKind::FailedTransient), 3);
    assert_eq!(dest.add_calls().len(), 1);
}

/// Movie `n` under a different source id, as when a server holds two copies.
fn copy_of(n: u64, watched: i64, copy: &str) -> WatchedItem {
    let mut item = movie(n, watched);
    item.source_id = format!("m{}-{}", n, copy);
    item
}

#[tokio::test]
async fn test_merge_folds_copies_with_same_watch_time() {
    let dest = destination(1);
    let items = vec![movie(1, 10), copy_of(1, 10, "b"), copy_of(1, 20, "c")];

    let run = engine(&dest, 10).push(&items, PushMode::Merge, false).await.unwrap();

    assert_eq!(
        kinds(&run.report),
        vec![
            PushOutcomeKind::Pushed,
            PushOutcomeKind::SkippedAlreadyPresent,
            PushOutcomeKind::Pushed,
        ]
    );
    assert_eq!(run.report.outcomes[1].identity, Some(identity(1)));
    assert_eq!(dest.record(&identity(1)).unwrap().watched_at, vec![t(10), t(20)]);
    assert_eq!(dest.add_calls()[0].len(), 2);
}

#[tokio::test]
async fn test_skip_writes_one_event_per_identity() {
    let dest = destination(1);
    let items = vec![movie(1, 10), copy_of(1, 40, "b")];

    let run = engine(&dest, 10).push(&items, PushMode::Skip, false).await.unwrap();

    assert_eq!(
        kinds(&run.report),
        vec![PushOutcomeKind::Pushed, PushOutcomeKind::SkippedAlreadyPresent]
    );
    assert_eq!(dest.record(&identity(1)).unwrap().plays, 1);
}

#[tokio::test]
async fn test_copy_of_failed_write_is_not_settled() {
    let dest = destination(1);
    dest.reject_id(1);
    let items = vec![movie(1, 10), copy_of(1, 10, "b")];

    let run = engine(&dest, 10).push(&items, PushMode::Merge, false).await.unwrap();

    assert_eq!(
        kinds(&run.report),
        vec![PushOutcomeKind::FailedPermanent, PushOutcomeKind::FailedPermanent]
    );
    assert_eq!(dest.add_calls().len(), 1);
}

#[tokio::test]
async fn test_auth_failure_during_item_retry_keeps_written_items() {
    let dest = destination(3);
    dest.reject_id(3);
    // Call 1 is the rejected batch, call 2 writes movie 1 alone.
    dest.fail_add_call(3, SourceError::Auth("expired".to_string()));
    let items: Vec<WatchedItem> = (1..=3).map(|n| movie(n, 0)).collect();

    let run = engine(&dest, 10).push(&items, PushMode::Skip, false).await.unwrap();

    assert!(run.abort.as_ref().is_some_and(|e| e.is_auth()));
    assert_eq!(
        kinds(&run.report),
        vec![
            PushOutcomeKind::Pushed,
            PushOutcomeKind::FailedTransient,
            PushOutcomeKind::FailedTransient,
        ]
    );
    assert_eq!(run.report.outcomes[2].detail.as_deref(), Some("not attempted: run aborted"));
    assert!(dest.record(&identity(1)).is_some());
}

#[tokio::test]
async fn test_rejected_overwrite_restores_previous_history() {
    let dest = destination(2);
    let previous = WatchedRecord {
        plays: 2,
        watched_at: vec![t(1), t(2)],
    };
    dest.set_record(&identity(2), previous.clone());
    dest.reject_watched_at(t(99));
    let items = vec![movie(1, 5), movie(2, 99)];

    let run = engine(&dest, 10).push(&items, PushMode::Overwrite, false).await.unwrap();

    assert_eq!(
        kinds(&run.report),
        vec![PushOutcomeKind::Pushed, PushOutcomeKind::FailedPermanent]
    );
    let detail = run.report.outcomes[1].detail.as_deref().unwrap();
    assert!(detail.contains("previous history restored"), "{}", detail);
    assert_eq!(dest.record(&identity(2)), Some(previous));
}

#[tokio::test]
async fn test_rejected_overwrite_reports_lost_history() {
    let dest = destination(1);
    dest.set_record(
        &identity(1),
        WatchedRecord {
            plays: 1,
            watched_at: vec![t(1)],
        },
    );
    dest.reject_id(1);

    let run = engine(&dest, 1)
        .push(&[movie(1, 99)], PushMode::Overwrite, false)
        .await
        .unwrap();

    assert_eq!(kinds(&run.report), vec![PushOutcomeKind::FailedPermanent]);
    let detail = run.report.outcomes[0].detail.as_deref().unwrap();
    assert!(detail.contains("existing record removed, re-add rejected, restore failed"), "{}", detail);
    assert_eq!(dest.record(&identity(1)), None);
}

#[tokio::test]
async fn test_exhausted_rate_limit_pauses_fail_the_item() {
    let dest = destination(2);
    // One more than the pause budget of the test settings.
    for _ in 0..4 {
        dest.queue_add_error(SourceError::RateLimited {
            retry_after: Duration::ZERO,
        });
    }

    let run = engine(&dest, 1)
        .push(&[movie(1, 0), movie(2, 0)], PushMode::Skip, false)
        .await
        .unwrap();

    assert_eq!(
        kinds(&run.report),
        vec![PushOutcomeKind::FailedTransient, PushOutcomeKind::Pushed]
    );
    assert!(run.abort.is_none());
}

#[test]
fn test_summary_lists_non_zero_counts() {
    let item = movie(1, 0);
    let report = PushReport {
        destination: "trakt".to_string(),
        mode: PushMode::Skip,
        dry_run: false,
        outcomes: vec![
            PushOutcome::new(&item, PushOutcomeKind::Pushed),
            PushOutcome::new(&item, PushOutcomeKind::Pushed),
            PushOutcome::new(&item, PushOutcomeKind::FailedPermanent),
        ],
    };
    assert_eq!(
        report.summary(),
        vec![(PushOutcomeKind::Pushed, 2), (PushOutcomeKind::FailedPermanent, 1)]
    );
}
