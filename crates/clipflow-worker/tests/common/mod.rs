//! Test doubles shared by the worker integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use clipflow_media::{
    AcquisitionRequest, AcquisitionStrategy, FrameSource, GrayFrame, MediaError, MediaResult,
};
use clipflow_models::{
    ContentItem, EngagementMetrics, LocalAsset, Platform, ProcessedClip, PublishState, RankedClip,
};
use clipflow_worker::config::{DownloaderConfig, RecoveryConfig};
use clipflow_worker::discovery::ContentSource;
use clipflow_worker::pipeline::ClipProducer;
use clipflow_worker::{ErrorClassifier, RetryConfig, StrategyPolicy, WorkerResult};

/// Shared call log, in call order.
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

/// Strategy that fails a fixed number of times with a fixed message, then
/// succeeds.
pub struct ScriptedStrategy {
    name: &'static str,
    failures: u32,
    message: String,
    supported: bool,
    calls: AtomicU32,
    log: CallLog,
}

impl ScriptedStrategy {
    pub fn succeeding(name: &'static str, log: &CallLog) -> Arc<Self> {
        Self::failing_then_ok(name, 0, "", log)
    }

    pub fn always_failing(name: &'static str, message: &str, log: &CallLog) -> Arc<Self> {
        Self::failing_then_ok(name, u32::MAX, message, log)
    }

    pub fn failing_then_ok(
        name: &'static str,
        failures: u32,
        message: &str,
        log: &CallLog,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            failures,
            message: message.to_string(),
            supported: true,
            calls: AtomicU32::new(0),
            log: Arc::clone(log),
        })
    }

    pub fn unsupported(name: &'static str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name,
            failures: 0,
            message: String::new(),
            supported: false,
            calls: AtomicU32::new(0),
            log: Arc::clone(log),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AcquisitionStrategy for ScriptedStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, _request: &AcquisitionRequest) -> bool {
        self.supported
    }

    async fn attempt(&self, request: &AcquisitionRequest) -> MediaResult<LocalAsset> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(self.name);
        if call < self.failures {
            return Err(MediaError::download_failed(self.name, self.message.clone()));
        }
        Ok(LocalAsset::new(&request.output_path, 4096, self.name))
    }
}

/// Zero-delay policy so tests never sleep.
pub fn instant_policy(max_tries: u32) -> StrategyPolicy {
    StrategyPolicy::new(max_tries, instant_backoff())
}

pub fn instant_backoff() -> RetryConfig {
    RetryConfig::default()
        .with_base_delay(Duration::ZERO)
        .with_max_delay(Duration::ZERO)
}

pub fn downloader_config(dir: &Path) -> DownloaderConfig {
    DownloaderConfig {
        output_dir: dir.join("downloads"),
        backoff: instant_backoff(),
        strategy_delay_min: Duration::ZERO,
        strategy_delay_max: Duration::ZERO,
        pattern_log: None,
        ..DownloaderConfig::default()
    }
}

pub fn classifier() -> ErrorClassifier {
    let config = RecoveryConfig {
        backoff: instant_backoff(),
        ..RecoveryConfig::default()
    };
    ErrorClassifier::new(config).expect("classifier")
}

pub fn item(external_id: &str) -> ContentItem {
    ContentItem::new(
        Platform::Youtube,
        external_id,
        format!("https://www.youtube.com/watch?v={}", external_id),
        format!("Workout {}", external_id),
    )
    .with_metrics(EngagementMetrics {
        views: 10_000,
        likes: 800,
        comments: 100,
        shares: 50,
    })
    .with_duration(120.0)
}

/// Fixed list of discovered items.
pub struct StaticSource {
    pub items: Vec<ContentItem>,
}

#[async_trait]
impl ContentSource for StaticSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn discover(
        &self,
        _platforms: &[Platform],
        _keywords: &[String],
        limit: usize,
    ) -> WorkerResult<Vec<ContentItem>> {
        Ok(self.items.iter().take(limit).cloned().collect())
    }
}

/// Flat frames for an asset of fixed duration, with hard cuts at the
/// listed seconds.
pub struct FakeFrames {
    pub duration: f64,
    pub cuts: Vec<f64>,
}

#[async_trait]
impl FrameSource for FakeFrames {
    async fn duration(&self, _path: &Path) -> MediaResult<f64> {
        Ok(self.duration)
    }

    async fn sample_frames(&self, _path: &Path, interval: f64) -> MediaResult<Vec<GrayFrame>> {
        let count = (self.duration / interval) as usize;
        Ok((0..count)
            .map(|i| {
                let ts = i as f64 * interval;
                let scene = self.cuts.iter().filter(|c| **c <= ts).count();
                GrayFrame {
                    timestamp: ts,
                    pixels: vec![if scene % 2 == 0 { 20 } else { 200 }; 16],
                }
            })
            .collect())
    }
}

/// Producer that skips FFmpeg and returns the ranked clip as processed.
#[derive(Default)]
pub struct FakeProducer {
    pub produced: AtomicU32,
    pub fail: AtomicBool,
}

#[async_trait]
impl ClipProducer for FakeProducer {
    async fn produce(&self, source: &Path, ranked: &RankedClip) -> WorkerResult<ProcessedClip> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(clipflow_worker::WorkerError::processing_failed(
                "fatal encoder fault",
            ));
        }
        self.produced.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessedClip {
            clip_id: ranked.id().clone(),
            content_id: ranked.candidate.content_id.clone(),
            effects_applied: Vec::new(),
            output: source.to_path_buf(),
            duration_secs: ranked.candidate.duration(),
            size_bytes: 1024,
            score: ranked.score,
            hook_text: None,
            warning: None,
            publish: PublishState::Pending,
            created_at: Utc::now(),
        })
    }
}
