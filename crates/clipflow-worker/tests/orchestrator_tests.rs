//! End-to-end pipeline tests with fake sources, strategies, frames and
//! producers.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use clipflow_media::{
    AcquisitionStrategy, AnalyzerConfig, CandidateConfig, ClipAnalyzer, IntervalEnergyDetector,
};
use clipflow_models::{
    AcquisitionState, ClipId, ContentId, ContentItem, EngagementMetrics, ErrorTier, ProcessedClip,
    PublishState, Stage,
};
use clipflow_queue::{JsonFileManualQueue, WorkQueue};
use clipflow_storage::{read_json_lines, AuditLog, ContentStore, MemoryStore};
use clipflow_worker::config::{PipelineConfig, PublishConfig};
use clipflow_worker::publish::PublishRecord;
use clipflow_worker::{
    CaptionService, ClipSelector, Collaborators, ItemOutcome, ItemPipeline, LogPublisher,
    Orchestrator, ResilientDownloader, StrategyCascade,
};

use common::{
    classifier, downloader_config, instant_policy, item, CallLog, FakeFrames, FakeProducer,
    ScriptedStrategy, StaticSource,
};

struct Harness {
    dir: tempfile::TempDir,
    orchestrator: Arc<Orchestrator>,
    pipeline: Arc<ItemPipeline>,
    store: Arc<MemoryStore>,
    queue: Arc<WorkQueue>,
    producer: Arc<FakeProducer>,
}

async fn harness(items: Vec<ContentItem>, strategy: Arc<dyn AcquisitionStrategy>) -> Harness {
    harness_with_capacity(items, strategy, 10).await
}

async fn harness_with_capacity(
    items: Vec<ContentItem>,
    strategy: Arc<dyn AcquisitionStrategy>,
    capacity: usize,
) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryStore::new());
    let classifier = Arc::new(classifier().with_audit(store.clone()));
    let manual = Arc::new(
        JsonFileManualQueue::open(dir.path().join("manual.json"))
            .await
            .expect("manual queue"),
    );
    let queue = Arc::new(WorkQueue::new(capacity));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let downloader = Arc::new(
        ResilientDownloader::new(
            downloader_config(dir.path()),
            StrategyCascade::new(instant_policy(1)).push(strategy),
            classifier.clone(),
            manual.clone(),
            store.clone(),
        )
        .with_shutdown(shutdown_rx),
    );
    let analyzer = ClipAnalyzer::new(
        AnalyzerConfig::default(),
        Arc::new(FakeFrames {
            duration: 120.0,
            cuts: vec![30.0, 60.0, 90.0],
        }),
        Arc::new(IntervalEnergyDetector::default()),
    );
    let producer = Arc::new(FakeProducer::default());
    let pipeline = Arc::new(ItemPipeline::new(
        store.clone(),
        classifier.clone(),
        downloader,
        analyzer,
        CandidateConfig::default(),
        ClipSelector::new(3),
        producer.clone(),
    ));

    let config = PipelineConfig {
        work_dir: dir.path().to_path_buf(),
        max_in_flight: 2,
        shutdown_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    };
    let publish = PublishConfig {
        log_path: dir.path().join("publish.jsonl"),
        ..PublishConfig::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(
        config,
        publish,
        Collaborators {
            store: store.clone(),
            source: Arc::new(StaticSource { items }),
            queue: queue.clone(),
            manual,
            classifier,
            pipeline: pipeline.clone(),
            captions: CaptionService::template_only(),
            publisher: Arc::new(LogPublisher::new(dir.path().join("publish.jsonl"))),
        },
        shutdown_tx,
    ));

    Harness {
        dir,
        orchestrator,
        pipeline,
        store,
        queue,
        producer,
    }
}

fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn low_engagement(external_id: &str) -> ContentItem {
    item(external_id).with_metrics(EngagementMetrics {
        views: 100_000,
        likes: 10,
        comments: 0,
        shares: 0,
    })
}

/// Intake keeps engaging, unknown items only.
#[tokio::test]
async fn test_intake_filters_and_dedups() {
    let log = call_log();
    let h = harness(
        vec![item("a"), item("b"), low_engagement("quiet"), item("a")],
        ScriptedStrategy::succeeding("ok", &log),
    )
    .await;

    let report = h.orchestrator.run_intake_once().await.expect("intake");
    assert_eq!(report.discovered, 4);
    assert_eq!(report.eligible, 2);
    assert_eq!(report.queued, 2);
    assert_eq!(h.queue.len(), 2);

    let again = h.orchestrator.run_intake_once().await.expect("intake");
    assert_eq!(again.eligible, 0);
    assert_eq!(h.queue.len(), 2);

    let stored = h
        .store
        .items_in_state(AcquisitionState::Discovered)
        .await
        .expect("items");
    assert_eq!(stored.len(), 2);
}

/// The loops take items from discovery to published clips.
#[tokio::test]
async fn test_loops_process_items_end_to_end() {
    let log = call_log();
    let h = harness(
        vec![item("one"), item("two")],
        ScriptedStrategy::succeeding("ok", &log),
    )
    .await;

    let running = tokio::spawn(Arc::clone(&h.orchestrator).run());

    let ready = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let ready = h
                .store
                .items_in_state(AcquisitionState::ClipsReady)
                .await
                .expect("items");
            let published = h
                .store
                .items_in_state(AcquisitionState::Published)
                .await
                .expect("items");
            if ready.len() + published.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(ready.is_ok(), "items never became ready");

    h.orchestrator.shutdown();
    tokio::time::timeout(Duration::from_secs(10), running)
        .await
        .expect("orchestrator stops")
        .expect("join")
        .expect("run");

    // Pick up anything the first publish tick ran ahead of
    h.orchestrator.run_publish_once().await.expect("publish");

    let items = [item("one"), item("two")];
    let mut clips = 0;
    for original in &items {
        let stored = h
            .store
            .get_by_external_id(&original.external_id)
            .await
            .expect("lookup")
            .expect("stored");
        let processed = h.store.processed_for(&stored.id).await.expect("clips");
        assert!(!processed.is_empty());
        assert!(processed.len() <= 3);
        assert!(processed
            .iter()
            .all(|c| !matches!(c.publish, PublishState::Pending)));
        clips += processed.len();
    }
    assert_eq!(h.producer.produced.load(Ordering::SeqCst) as usize, clips);

    let status = h.orchestrator.status().await.expect("status");
    assert_eq!(status.acquisitions.succeeded, 2);
    assert_eq!(status.queue_depth, 0);
    assert_eq!(status.manual_queue_size, 0);
    assert_eq!(status.best_posting_hours, vec![19, 18, 20]);
    assert!(h.dir.path().join("publish.jsonl").exists());
}

/// Exhausted items wait in the manual queue until an operator supplies
/// the media, then continue at analysis.
#[tokio::test]
async fn test_manual_queue_round_trip() {
    let log = call_log();
    let h = harness(
        vec![item("blocked")],
        ScriptedStrategy::always_failing("only", "HTTP Error 403: Forbidden", &log),
    )
    .await;

    h.orchestrator.run_intake_once().await.expect("intake");
    let work = h.queue.pop().await.expect("queued");
    let (content, asset) = work.into_parts();
    let outcome = h.pipeline.process(content, asset).await.expect("process");
    assert_eq!(outcome, ItemOutcome::ManualQueue);

    let stored = h
        .store
        .get_by_external_id("blocked")
        .await
        .expect("lookup")
        .expect("stored");
    assert_eq!(stored.state, AcquisitionState::ManualQueue);

    let batch = h.orchestrator.next_manual_batch(10).await.expect("batch");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].external_id, "blocked");
    assert_eq!(batch[0].strategies_tried, vec!["only"]);

    // Claimed entries are hidden until released
    assert!(h.orchestrator.next_manual_batch(10).await.expect("batch").is_empty());
    assert!(h.orchestrator.release_manual("blocked").await.expect("release"));
    let batch = h.orchestrator.next_manual_batch(10).await.expect("batch");
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].retry_count, 1);

    let media = h.dir.path().join("operator.mp4");
    tokio::fs::write(&media, vec![0u8; 2048]).await.expect("write");
    h.orchestrator
        .submit_manual_asset("blocked", &media)
        .await
        .expect("submit");
    assert_eq!(h.orchestrator.status().await.expect("status").manual_queue_size, 0);

    let work = h.queue.pop().await.expect("requeued");
    let (content, asset) = work.into_parts();
    assert_eq!(content.state, AcquisitionState::Acquired);
    assert_eq!(asset.as_ref().map(|a| a.strategy.as_str()), Some("manual"));

    let outcome = h.pipeline.process(content, asset).await.expect("process");
    assert!(matches!(outcome, ItemOutcome::ClipsReady { .. }));

    // Unknown ids are rejected
    assert!(h
        .orchestrator
        .submit_manual_asset("nobody", &media)
        .await
        .is_err());
}

/// A critical fault while producing clips degrades the item and leaves a
/// recovery plan in the audit log.
#[tokio::test]
async fn test_critical_effect_failure_degrades_item() {
    let log = call_log();
    let h = harness(vec![item("fragile")], ScriptedStrategy::succeeding("ok", &log)).await;
    h.producer.fail.store(true, Ordering::SeqCst);

    h.orchestrator.run_intake_once().await.expect("intake");
    let (content, asset) = h.queue.pop().await.expect("queued").into_parts();
    let outcome = h.pipeline.process(content, asset).await.expect("process");
    assert!(matches!(outcome, ItemOutcome::Degraded { .. }));

    let stored = h
        .store
        .get_by_external_id("fragile")
        .await
        .expect("lookup")
        .expect("stored");
    assert_eq!(stored.state, AcquisitionState::Degraded);

    let errors = h.store.errors().await.expect("errors");
    let critical: Vec<_> = errors
        .iter()
        .filter(|e| e.tier == ErrorTier::Critical)
        .collect();
    assert!(!critical.is_empty());
    assert!(critical.iter().all(|e| !e.recovered));
    assert!(critical
        .iter()
        .all(|e| e.recovery_plan.as_ref().is_some_and(|p| p.steps.len() == 5)));

    let status = h.orchestrator.status().await.expect("status");
    assert!(status.recovery_rate < 1.0);
    assert_eq!(status.errors.get("critical").copied(), Some(critical.len() as u64));
}

async fn pop_id(queue: &WorkQueue) -> String {
    let work = tokio::time::timeout(Duration::from_secs(5), queue.pop())
        .await
        .expect("pop in time")
        .expect("queued item");
    work.content().external_id.clone()
}

/// A full queue holds intake back until the consumer makes room.
#[tokio::test]
async fn test_intake_waits_for_queue_space() {
    let log = call_log();
    let h = harness_with_capacity(
        vec![item("a"), item("b"), item("c")],
        ScriptedStrategy::succeeding("ok", &log),
        1,
    )
    .await;

    let orchestrator = Arc::clone(&h.orchestrator);
    let intake = tokio::spawn(async move { orchestrator.run_intake_once().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!intake.is_finished());
    assert_eq!(h.queue.len(), 1);
    assert!(h.store.get_by_external_id("a").await.expect("lookup").is_some());
    assert!(h.store.get_by_external_id("b").await.expect("lookup").is_none());

    let mut popped = Vec::new();
    for _ in 0..3 {
        popped.push(pop_id(&h.queue).await);
    }
    assert_eq!(popped, vec!["a", "b", "c"]);

    let report = tokio::time::timeout(Duration::from_secs(5), intake)
        .await
        .expect("intake finishes")
        .expect("join")
        .expect("intake");
    assert_eq!(report.queued, 3);
    let stored = h
        .store
        .items_in_state(AcquisitionState::Discovered)
        .await
        .expect("items");
    assert_eq!(stored.len(), 3);
}

/// Items cut off by shutdown are not stored, so the next pass sees them
/// as new.
#[tokio::test]
async fn test_shutdown_during_intake_leaves_items_for_next_pass() {
    let log = call_log();
    let h = harness_with_capacity(
        vec![item("a"), item("b"), item("c")],
        ScriptedStrategy::succeeding("ok", &log),
        1,
    )
    .await;

    let orchestrator = Arc::clone(&h.orchestrator);
    let intake = tokio::spawn(async move { orchestrator.run_intake_once().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.orchestrator.shutdown();

    let report = tokio::time::timeout(Duration::from_secs(5), intake)
        .await
        .expect("intake stops")
        .expect("join")
        .expect("intake");
    assert_eq!(report.eligible, 3);
    assert_eq!(report.queued, 1);

    assert!(h.store.get_by_external_id("a").await.expect("lookup").is_some());
    for id in ["b", "c"] {
        assert!(h.store.get_by_external_id(id).await.expect("lookup").is_none());
    }

    assert_eq!(pop_id(&h.queue).await, "a");
    let again = h.orchestrator.run_intake_once().await.expect("intake");
    assert_eq!(again.eligible, 2);
    assert_eq!(again.queued, 0);
}

/// Stored items that never reached this process's queue are pushed again.
#[tokio::test]
async fn test_resume_discovered_requeues_stored_items() {
    let log = call_log();
    let h = harness(Vec::new(), ScriptedStrategy::succeeding("ok", &log)).await;
    h.store
        .bulk_insert(&[item("left"), item("over")])
        .await
        .expect("insert");

    assert_eq!(h.orchestrator.resume_discovered().await.expect("resume"), 2);
    assert_eq!(h.queue.len(), 2);

    let (content, asset) = h.queue.pop().await.expect("queued").into_parts();
    let outcome = h.pipeline.process(content, asset).await.expect("process");
    assert!(matches!(outcome, ItemOutcome::ClipsReady { .. }));
}

/// A manual-queue write that keeps failing degrades the item without
/// running the strategies again.
#[tokio::test]
async fn test_manual_queue_write_failure_degrades_once() {
    let log = call_log();
    let h = harness(
        vec![item("stuck")],
        ScriptedStrategy::always_failing("only", "HTTP Error 403: Forbidden", &log),
    )
    .await;
    // A directory at the queue path makes every write fail
    tokio::fs::create_dir(h.dir.path().join("manual.json"))
        .await
        .expect("mkdir");

    h.orchestrator.run_intake_once().await.expect("intake");
    let (content, asset) = h.queue.pop().await.expect("queued").into_parts();
    let outcome = h.pipeline.process(content, asset).await.expect("process");
    assert_eq!(
        outcome,
        ItemOutcome::Degraded {
            reason: "manual queue write failed".into()
        }
    );
    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(h.pipeline.downloader().stats().failed, 1);

    let stored = h
        .store
        .get_by_external_id("stuck")
        .await
        .expect("lookup")
        .expect("stored");
    assert_eq!(stored.state, AcquisitionState::Degraded);

    let errors = h.store.errors().await.expect("errors");
    let writes: Vec<_> = errors
        .iter()
        .filter(|e| e.stage == Stage::Persistence)
        .collect();
    assert_eq!(writes.len(), 1);
    assert!(!writes[0].recovered);
    assert!(errors.iter().all(|e| e.stage != Stage::Acquisition));

    let status = h.orchestrator.status().await.expect("status");
    assert_eq!(status.manual_queue_size, 0);
}

fn finished_clip(id: &str, score: f64, duration_secs: f64, age_secs: i64) -> ProcessedClip {
    ProcessedClip {
        clip_id: ClipId::from_string(id),
        content_id: ContentId::from_string(format!("content-{}", id)),
        effects_applied: Vec::new(),
        output: format!("{}.mp4", id).into(),
        duration_secs,
        size_bytes: 1024,
        score,
        hook_text: None,
        warning: None,
        publish: PublishState::Pending,
        created_at: chrono::Utc::now() - chrono::Duration::seconds(age_secs),
    }
}

/// The clip with the stronger forecast goes out first, whatever its age.
#[tokio::test]
async fn test_publish_pass_orders_by_forecast() {
    let log = call_log();
    let h = harness(Vec::new(), ScriptedStrategy::succeeding("ok", &log)).await;
    h.store
        .save_processed(&finished_clip("older_plain", 0.5, 45.0, 120))
        .await
        .expect("save");
    h.store
        .save_processed(&finished_clip("newer_strong", 0.9, 20.0, 60))
        .await
        .expect("save");

    let report = h.orchestrator.run_publish_once().await.expect("publish");
    assert_eq!(report.published + report.scheduled, 2);

    let rows: Vec<PublishRecord> = read_json_lines(&h.dir.path().join("publish.jsonl"))
        .await
        .expect("publish log");
    let order: Vec<_> = rows.iter().map(|r| r.clip_id.to_string()).collect();
    assert_eq!(order, vec!["newer_strong", "older_plain"]);
}
