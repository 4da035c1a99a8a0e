//! Strategy cascade and resilient downloader tests.

mod common;

use std::sync::{Arc, Mutex};

use clipflow_models::{AttemptOutcome, ErrorTier};
use clipflow_queue::{JsonFileManualQueue, ManualReviewQueue};
use clipflow_storage::{AuditLog, MemoryStore};
use clipflow_worker::{AcquireOutcome, CascadeOutcome, ResilientDownloader, StrategyCascade};
use tokio::sync::watch;

use common::{classifier, downloader_config, instant_policy, item, CallLog, ScriptedStrategy};

struct Harness {
    _dir: tempfile::TempDir,
    downloader: ResilientDownloader,
    manual: Arc<JsonFileManualQueue>,
    audit: Arc<MemoryStore>,
}

async fn harness(cascade: StrategyCascade) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let manual = Arc::new(
        JsonFileManualQueue::open(dir.path().join("manual.json"))
            .await
            .expect("manual queue"),
    );
    let audit = Arc::new(MemoryStore::new());
    let downloader = ResilientDownloader::new(
        downloader_config(dir.path()),
        cascade,
        Arc::new(classifier()),
        manual.clone(),
        audit.clone(),
    );
    Harness {
        _dir: dir,
        downloader,
        manual,
        audit,
    }
}

fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Two transient failures then a success, one try per strategy.
#[tokio::test]
async fn test_third_strategy_wins_after_two_failures() {
    let log = call_log();
    let first = ScriptedStrategy::always_failing("first", "connection reset by peer", &log);
    let second = ScriptedStrategy::always_failing("second", "read timed out", &log);
    let third = ScriptedStrategy::succeeding("third", &log);
    let fourth = ScriptedStrategy::succeeding("fourth", &log);

    let cascade = StrategyCascade::new(instant_policy(1))
        .push(first)
        .push(second)
        .push(third)
        .push(fourth.clone());
    let h = harness(cascade).await;
    let content = item("abc123");

    let outcome = h.downloader.acquire(&content).await.expect("acquire");
    let AcquireOutcome::Asset(asset) = outcome else {
        panic!("expected an asset, got {:?}", outcome);
    };
    assert_eq!(asset.strategy, "third");

    // Strict order, short-circuit after the first success
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    assert_eq!(fourth.calls(), 0);

    let attempts = h.audit.attempts_for(&content.id).await.expect("attempts");
    assert_eq!(attempts.len(), 3);
    let failed: Vec<_> = attempts
        .iter()
        .filter(|a| a.outcome == AttemptOutcome::Failed)
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|a| a.tier == Some(ErrorTier::Transient)));
    assert_eq!(attempts[2].outcome, AttemptOutcome::Succeeded);
    assert_eq!(attempts[2].strategy, "third");

    let stats = h.downloader.stats();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 0);
}

/// Each strategy gets its full try budget before the cascade moves on.
#[tokio::test]
async fn test_default_policy_tries_each_strategy_three_times() {
    let log = call_log();
    let cascade = StrategyCascade::new(instant_policy(3))
        .push(ScriptedStrategy::always_failing("first", "connection refused", &log))
        .push(ScriptedStrategy::always_failing("second", "connection refused", &log))
        .push(ScriptedStrategy::succeeding("third", &log));
    let h = harness(cascade).await;
    let content = item("budget");

    let outcome = h.downloader.acquire(&content).await.expect("acquire");
    assert!(matches!(outcome, AcquireOutcome::Asset(_)));

    let attempts = h.audit.attempts_for(&content.id).await.expect("attempts");
    let failures = attempts
        .iter()
        .filter(|a| a.outcome == AttemptOutcome::Failed)
        .count();
    assert_eq!(failures, 6);
    assert_eq!(
        attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(),
        vec![1, 2, 3, 1, 2, 3, 1]
    );
}

/// A strategy that recovers on its second try stays in place.
#[tokio::test]
async fn test_retry_within_strategy() {
    let log = call_log();
    let flaky = ScriptedStrategy::failing_then_ok("flaky", 1, "temporarily unavailable", &log);
    let backup = ScriptedStrategy::succeeding("backup", &log);
    let cascade = StrategyCascade::new(instant_policy(3))
        .push(flaky.clone())
        .push(backup.clone());
    let h = harness(cascade).await;

    let outcome = h.downloader.acquire(&item("flaky")).await.expect("acquire");
    let AcquireOutcome::Asset(asset) = outcome else {
        panic!("expected an asset");
    };
    assert_eq!(asset.strategy, "flaky");
    assert_eq!(flaky.calls(), 2);
    assert_eq!(backup.calls(), 0);
}

/// System-tier failures end the current strategy without using its retries.
#[tokio::test]
async fn test_system_error_skips_remaining_tries() {
    let log = call_log();
    let broken = ScriptedStrategy::always_failing("broken", "No space left on device", &log);
    let cascade = StrategyCascade::new(instant_policy(3))
        .push(broken.clone())
        .push(ScriptedStrategy::succeeding("next", &log));
    let h = harness(cascade).await;

    let outcome = h.downloader.acquire(&item("disk")).await.expect("acquire");
    assert!(matches!(outcome, AcquireOutcome::Asset(_)));
    assert_eq!(broken.calls(), 1);
}

/// Unsupported strategies are skipped without an attempt record.
#[tokio::test]
async fn test_unsupported_strategy_is_skipped() {
    let log = call_log();
    let skipped = ScriptedStrategy::unsupported("skipped", &log);
    let cascade = StrategyCascade::new(instant_policy(1))
        .push(skipped.clone())
        .push(ScriptedStrategy::succeeding("used", &log));
    let h = harness(cascade).await;
    let content = item("skip");

    h.downloader.acquire(&content).await.expect("acquire");
    assert_eq!(skipped.calls(), 0);
    let attempts = h.audit.attempts_for(&content.id).await.expect("attempts");
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].strategy, "used");
}

/// Exhaustion queues the item once, no matter how often it is retried.
#[tokio::test]
async fn test_exhaustion_enqueues_manual_entry_once() {
    let log = call_log();
    let cascade = StrategyCascade::new(instant_policy(2))
        .push(ScriptedStrategy::always_failing("first", "HTTP Error 403: Forbidden", &log))
        .push(ScriptedStrategy::always_failing("second", "Sign in to confirm you're not a bot", &log));
    let h = harness(cascade).await;
    let content = item("blocked");

    let first = h.downloader.acquire(&content).await.expect("acquire");
    let AcquireOutcome::Manual {
        entry,
        newly_queued,
    } = first
    else {
        panic!("expected a manual entry");
    };
    assert!(newly_queued);
    assert_eq!(entry.external_id, "blocked");
    assert_eq!(entry.strategies_tried, vec!["first", "second"]);
    assert!(entry
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("Sign in")));

    let second = h.downloader.acquire(&content).await.expect("acquire");
    assert!(matches!(
        second,
        AcquireOutcome::Manual {
            newly_queued: false,
            ..
        }
    ));

    assert_eq!(h.manual.len().await.expect("len"), 1);
    assert_eq!(h.downloader.stats().failed, 2);

    let attempts = h.audit.attempts_for(&content.id).await.expect("attempts");
    assert!(attempts
        .iter()
        .all(|a| a.tier == Some(ErrorTier::Persistent)));
}

/// The cascade alone reports exhaustion without writing to the manual queue.
#[tokio::test]
async fn test_cascade_exhaustion_leaves_queue_to_caller() {
    let log = call_log();
    let cascade = StrategyCascade::new(instant_policy(1))
        .push(ScriptedStrategy::always_failing("only", "HTTP Error 403: Forbidden", &log));
    let h = harness(cascade).await;

    let outcome = h.downloader.run_cascade(&item("later")).await.expect("cascade");
    let CascadeOutcome::Exhausted(entry) = outcome else {
        panic!("expected exhaustion");
    };
    assert_eq!(entry.strategies_tried, vec!["only"]);
    assert!(h.manual.is_empty().await.expect("empty"));

    assert!(h.downloader.queue_for_review(entry.clone()).await.expect("queue"));
    assert!(!h.downloader.queue_for_review(entry).await.expect("queue"));
    assert_eq!(h.manual.len().await.expect("len"), 1);
    assert_eq!(log.lock().unwrap().len(), 1);
}

/// A raised shutdown flag stops the cascade before any try.
#[tokio::test]
async fn test_shutdown_aborts_cascade() {
    let log = call_log();
    let only = ScriptedStrategy::succeeding("only", &log);
    let cascade = StrategyCascade::new(instant_policy(1)).push(only.clone());
    let h = harness(cascade).await;

    let (tx, rx) = watch::channel(false);
    let downloader = h.downloader.with_shutdown(rx);
    tx.send_replace(true);

    let outcome = downloader.acquire(&item("late")).await.expect("acquire");
    assert!(matches!(outcome, AcquireOutcome::Aborted));
    assert_eq!(only.calls(), 0);
}

/// Success patterns track every try per strategy and URL family.
#[tokio::test]
async fn test_success_pattern_rate() {
    let log = call_log();
    let cascade = StrategyCascade::new(instant_policy(3)).push(ScriptedStrategy::failing_then_ok(
        "api",
        2,
        "timeout",
        &log,
    ));
    let h = harness(cascade).await;

    h.downloader.acquire(&item("rate")).await.expect("acquire");
    let rate = h
        .downloader
        .patterns()
        .success_rate("api", "youtube.com")
        .expect("rate recorded");
    assert!((rate - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(h.downloader.patterns().recent().len(), 1);
}
