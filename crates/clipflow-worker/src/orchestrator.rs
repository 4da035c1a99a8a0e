//! Intake, processing and publish loops joined by one bounded work queue.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};

use clipflow_models::{
    url_family, AcquisitionState, ContentItem, LocalAsset, ManualQueueEntry, Platform,
    PublishState, Stage,
};
use clipflow_queue::{ManualReviewQueue, WorkItem, WorkQueue, WorkStage};
use clipflow_storage::ContentStore;

use crate::acquisition::AcquisitionStats;
use crate::captions::{fit_for_platform, CaptionService};
use crate::config::{PipelineConfig, PublishConfig};
use crate::discovery::ContentSource;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::ItemLogger;
use crate::metrics;
use crate::pipeline::ItemPipeline;
use crate::prediction::{ClipFeatures, EngagementPredictor};
use crate::publish::{next_publish_slot, PublishDecision, Publisher};
use crate::recovery::{ErrorClassifier, RecoveryContext};
use crate::retry::FailureTracker;

const MAX_LOGGED_FAILURES: u32 = 5;

/// Everything the loops share.
pub struct Collaborators {
    pub store: Arc<dyn ContentStore>,
    pub source: Arc<dyn ContentSource>,
    pub queue: Arc<WorkQueue>,
    pub manual: Arc<dyn ManualReviewQueue>,
    pub classifier: Arc<ErrorClassifier>,
    pub pipeline: Arc<ItemPipeline>,
    pub captions: CaptionService,
    pub publisher: Arc<dyn Publisher>,
}

/// Result of one intake pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntakeReport {
    pub discovered: usize,
    pub eligible: usize,
    pub queued: usize,
}

/// Result of one publish pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub published: usize,
    pub scheduled: usize,
    pub failed: usize,
}

/// Point-in-time health of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub errors: BTreeMap<String, u64>,
    pub recovered: BTreeMap<String, u64>,
    pub recovery_rate: f64,
    pub queue_depth: usize,
    pub manual_queue_size: usize,
    pub acquisitions: AcquisitionStats,
    /// Strongest local posting hours, strongest first
    pub best_posting_hours: Vec<u32>,
}

pub struct Orchestrator {
    config: PipelineConfig,
    publish: PublishConfig,
    store: Arc<dyn ContentStore>,
    source: Arc<dyn ContentSource>,
    queue: Arc<WorkQueue>,
    manual: Arc<dyn ManualReviewQueue>,
    classifier: Arc<ErrorClassifier>,
    pipeline: Arc<ItemPipeline>,
    captions: CaptionService,
    publisher: Arc<dyn Publisher>,
    predictor: EngagementPredictor,
    in_flight: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

fn platform_for_url(url: &str) -> Platform {
    match url_family(url).as_str() {
        "youtube.com" => Platform::Youtube,
        "tiktok.com" => Platform::Tiktok,
        "instagram.com" => Platform::Instagram,
        _ => Platform::Other,
    }
}

impl Orchestrator {
    /// `shutdown` is the same sender whose receivers were handed to the
    /// downloader.
    pub fn new(
        config: PipelineConfig,
        publish: PublishConfig,
        parts: Collaborators,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            config,
            publish,
            store: parts.store,
            source: parts.source,
            queue: parts.queue,
            manual: parts.manual,
            classifier: parts.classifier,
            pipeline: parts.pipeline,
            captions: parts.captions,
            publisher: parts.publisher,
            predictor: EngagementPredictor::default(),
            in_flight,
            shutdown,
        }
    }

    /// Run all loops until [`Self::shutdown`] is called, then wait for
    /// in-flight items up to the configured timeout.
    pub async fn run(self: Arc<Self>) -> WorkerResult<()> {
        info!(
            capacity = self.queue.capacity(),
            max_in_flight = self.config.max_in_flight,
            intake_every = ?self.config.intake_interval,
            publish_every = ?self.publish.interval,
            "Starting orchestrator"
        );

        let intake = tokio::spawn(Arc::clone(&self).intake_loop());
        let processing = tokio::spawn(Arc::clone(&self).processing_loop());
        let publish = tokio::spawn(Arc::clone(&self).publish_loop());

        let finished = join_all([intake, processing, publish]).await;
        for (name, result) in ["intake", "processing", "publish"].into_iter().zip(finished) {
            if let Err(e) = result {
                error!(loop_name = name, error = %e, "Loop task panicked");
            }
        }

        info!("Waiting for in-flight items to complete...");
        let permits = self.config.max_in_flight.max(1) as u32;
        match tokio::time::timeout(self.config.shutdown_timeout, self.in_flight.acquire_many(permits))
            .await
        {
            Ok(_) => info!("Orchestrator stopped"),
            Err(_) => warn!(
                timeout = ?self.config.shutdown_timeout,
                "In-flight items still running at shutdown"
            ),
        }
        Ok(())
    }

    /// Ask every loop to stop at its next check.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn intake_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.config.intake_interval);
        let mut failures = FailureTracker::new(MAX_LOGGED_FAILURES);

        match self.resume_discovered().await {
            Ok(0) => {}
            Ok(resumed) => info!(resumed, "Re-queued items left over from an earlier run"),
            Err(e) => error!(error = %e, "Failed to re-queue discovered items"),
        }

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
                _ = interval.tick() => {
                    match self.run_intake_once().await {
                        Ok(report) => {
                            failures.record_success();
                            debug!(?report, "Intake pass finished");
                        }
                        Err(e) => {
                            if failures.record_failure() {
                                error!(error = %e, "Intake pass failed");
                            }
                        }
                    }
                }
            }
        }
        info!("Intake loop stopped");
    }

    /// Discover, score and enqueue new items. Blocks while the queue is
    /// full; returns early on shutdown.
    pub async fn run_intake_once(&self) -> WorkerResult<IntakeReport> {
        let platforms = self.config.platforms.clone();
        let keywords = self.config.keywords.clone();
        let limit = self.config.discovery_limit;

        let discovered = self
            .classifier
            .guard(
                Stage::Discovery,
                RecoveryContext::new(json!({
                    "source": self.source.name(),
                    "platforms": platforms,
                    "keywords": keywords,
                }))
                .with_fallback(Vec::new()),
                || self.source.discover(&platforms, &keywords, limit),
            )
            .await
            .into_value()
            .unwrap_or_default();

        let mut report = IntakeReport {
            discovered: discovered.len(),
            ..Default::default()
        };
        metrics::record_discovered(discovered.len());

        let mut fresh: Vec<ContentItem> = Vec::new();
        for item in discovered {
            let score = item.engagement_score();
            if score <= self.config.min_engagement {
                debug!(external_id = %item.external_id, score, "Below engagement threshold");
                continue;
            }
            if self.store.get_by_external_id(&item.external_id).await?.is_some()
                || fresh.iter().any(|f| f.external_id == item.external_id)
            {
                debug!(external_id = %item.external_id, "Already known, skipping");
                continue;
            }
            fresh.push(item);
        }
        report.eligible = fresh.len();
        if fresh.is_empty() {
            return Ok(report);
        }

        // An item is stored only once it is on the queue, so anything cut
        // off by shutdown is still unknown to the next pass.
        let mut shutdown_rx = self.shutdown.subscribe();
        for item in fresh {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                pushed = self.queue.push(WorkItem::acquire(item.clone())) => pushed?,
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
            }
            // Skips the row if the processing loop already created it
            self.store.bulk_insert(std::slice::from_ref(&item)).await?;
            debug!(external_id = %item.external_id, "Queued for acquisition");
            report.queued += 1;
        }

        info!(
            discovered = report.discovered,
            eligible = report.eligible,
            queued = report.queued,
            "Intake pass"
        );
        Ok(report)
    }

    /// Push items stored as `Discovered` back onto the queue. The work queue
    /// lives in memory, so these are items a previous process accepted but
    /// never started.
    pub async fn resume_discovered(&self) -> WorkerResult<usize> {
        let pending = self.store.items_in_state(AcquisitionState::Discovered).await?;
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut resumed = 0;
        for item in pending {
            tokio::select! {
                pushed = self.queue.push(WorkItem::acquire(item)) => pushed?,
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
            }
            resumed += 1;
        }
        Ok(resumed)
    }

    async fn processing_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            // Hold a slot before dequeuing so a busy pipeline leaves items
            // on the queue.
            let permit = tokio::select! {
                permit = Arc::clone(&self.in_flight).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
            };
            let work = tokio::select! {
                work = self.queue.pop() => match work {
                    Some(work) => work,
                    None => break,
                },
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
            };

            let this = Arc::clone(&self);
            tokio::spawn(async move {
                let _permit = permit;
                this.handle(work).await;
            });
        }
        info!("Processing loop stopped");
    }

    async fn handle(&self, work: WorkItem) {
        let stage = match work.stage {
            WorkStage::Acquire => Stage::Acquisition,
            WorkStage::Analyze => Stage::Analysis,
        };
        let (item, asset) = work.into_parts();
        let logger = ItemLogger::new(&item, stage);
        let span = logger.span();

        match self.pipeline.process(item, asset).instrument(span).await {
            Ok(outcome) => logger.finished(outcome.as_str()),
            Err(e) => logger.failed(&e),
        }
    }

    async fn publish_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.publish.interval);
        let mut failures = FailureTracker::new(MAX_LOGGED_FAILURES);

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
                _ = interval.tick() => {
                    match self.run_publish_once().await {
                        Ok(report) => {
                            failures.record_success();
                            debug!(?report, "Publish pass finished");
                        }
                        Err(e) => {
                            if failures.record_failure() {
                                error!(error = %e, "Publish pass failed");
                            }
                        }
                    }
                }
            }
        }
        info!("Publish loop stopped");
    }

    /// Caption and publish (or schedule) pending clips, strongest forecast
    /// first.
    pub async fn run_publish_once(&self) -> WorkerResult<PublishReport> {
        let clips = self.store.unpublished_clips(self.publish.batch_limit).await?;
        let mut report = PublishReport::default();
        if clips.is_empty() {
            return Ok(report);
        }
        let offset = self.publish.utc_offset_hours;
        let decision = self
            .predictor
            .optimal_slot(next_publish_slot(Utc::now(), offset), offset);

        let mut forecasts = Vec::with_capacity(clips.len());
        for clip in clips {
            let ranked = self.store.ranked_for(&clip.content_id).await?;
            let features = ClipFeatures::from_processed(
                &clip,
                ranked.iter().find(|r| r.id() == &clip.clip_id),
            );
            let forecast = self.predictor.predict(&features);
            forecasts.push((clip, forecast));
        }
        self.predictor.order_for_publish(&mut forecasts);

        for (mut clip, forecast) in forecasts {
            if self.is_shutdown() {
                break;
            }
            debug!(
                clip_id = %clip.clip_id,
                expected_views_day = forecast.views.first_day,
                viral_probability = forecast.viral_probability,
                "Engagement forecast"
            );
            let item = self.store.get_item(&clip.content_id).await?;
            let platform = item.as_ref().map(|i| i.platform).unwrap_or_default();
            let caption = fit_for_platform(self.captions.caption(&clip).await, platform);
            let ctx = || {
                RecoveryContext::new(json!({
                    "clip_id": clip.clip_id,
                    "content_id": clip.content_id,
                }))
            };

            let state = match decision {
                PublishDecision::Now => self
                    .classifier
                    .guard(Stage::Publish, ctx(), || self.publisher.publish(&clip, &caption))
                    .await
                    .into_value()
                    .map(|post_id| PublishState::Published {
                        post_id,
                        at: Utc::now(),
                    }),
                PublishDecision::At(at) => self
                    .classifier
                    .guard(Stage::Publish, ctx(), || {
                        self.publisher.schedule(&clip, &caption, at)
                    })
                    .await
                    .into_value()
                    .map(|reference| PublishState::Scheduled { at, reference }),
            };

            let Some(state) = state else {
                report.failed += 1;
                metrics::record_clip_published("failed");
                continue;
            };
            metrics::record_clip_published(state.as_str());
            let published = matches!(state, PublishState::Published { .. });
            if published {
                report.published += 1;
            } else {
                report.scheduled += 1;
            }
            clip.publish = state;
            self.store.save_processed(&clip).await?;

            if let Some(mut item) = item.filter(|i| i.state == AcquisitionState::ClipsReady) {
                if published {
                    item.transition(AcquisitionState::Published)?;
                    self.store.update_item(&item).await?;
                    metrics::record_item_finished(AcquisitionState::Published.as_str());
                }
            }
        }

        info!(
            published = report.published,
            scheduled = report.scheduled,
            failed = report.failed,
            "Publish pass"
        );
        Ok(report)
    }

    /// Counters for dashboards and health checks.
    pub async fn status(&self) -> WorkerResult<StatusSnapshot> {
        let stats = self.classifier.stats();
        let manual_queue_size = self.manual.len().await?;
        metrics::set_manual_queue_size(manual_queue_size);
        Ok(StatusSnapshot {
            errors: stats.errors,
            recovered: stats.recovered,
            recovery_rate: stats.recovery_rate,
            queue_depth: self.queue.len(),
            manual_queue_size,
            acquisitions: self.pipeline.downloader().stats(),
            best_posting_hours: self.predictor.best_hours(3),
        })
    }

    /// Claim up to `limit` manual-review entries for an operator.
    pub async fn next_manual_batch(&self, limit: usize) -> WorkerResult<Vec<ManualQueueEntry>> {
        Ok(self.manual.next_batch(limit).await?)
    }

    /// Hand back an entry the operator could not resolve.
    pub async fn release_manual(&self, external_id: &str) -> WorkerResult<bool> {
        Ok(self.manual.release(external_id).await?)
    }

    /// An operator downloaded `external_id` to `path`: resolve the manual
    /// entry and queue the item for analysis.
    pub async fn submit_manual_asset(&self, external_id: &str, path: &Path) -> WorkerResult<()> {
        let size = tokio::fs::metadata(path).await?.len();
        if size == 0 {
            return Err(WorkerError::acquisition_failed(format!(
                "manual asset {} is empty",
                path.display()
            )));
        }

        let existing = self.store.get_by_external_id(external_id).await?;
        if let Some(item) = &existing {
            if !item.state.can_transition_to(AcquisitionState::Acquired) {
                return Err(WorkerError::acquisition_failed(format!(
                    "{} is {}, not waiting for manual acquisition",
                    external_id, item.state
                )));
            }
        }

        let entry = self.manual.resolve(external_id).await?;
        let mut item = match (existing, entry) {
            (Some(item), _) => item,
            (None, Some(entry)) => {
                let mut item = ContentItem::new(
                    platform_for_url(&entry.url),
                    entry.external_id,
                    entry.url,
                    entry.title,
                );
                item.id = entry.content_id;
                item.state = AcquisitionState::ManualQueue;
                self.store.create_item(&item).await?;
                item
            }
            (None, None) => {
                return Err(WorkerError::acquisition_failed(format!(
                    "{} is not waiting for manual acquisition",
                    external_id
                )))
            }
        };

        item.transition(AcquisitionState::Acquired)?;
        self.store.update_item(&item).await?;
        metrics::set_manual_queue_size(self.manual.len().await?);

        let asset = LocalAsset::new(path, size, "manual");
        info!(external_id, path = %path.display(), size, "Manual asset accepted");
        self.queue.push(WorkItem::analyze(item, asset)).await?;
        Ok(())
    }
}
