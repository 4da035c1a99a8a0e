//! Turns a content item into a local asset or a manual-review entry.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use clipflow_media::{existing_asset, AcquisitionRequest};
use clipflow_models::{
    url_family, AcquisitionAttempt, ContentItem, ErrorTier, LocalAsset, ManualQueueEntry, Stage,
};
use clipflow_queue::ManualReviewQueue;
use clipflow_storage::AuditLog;

use super::cascade::StrategyCascade;
use super::patterns::SuccessPatternLog;
use crate::config::DownloaderConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::ItemLogger;
use crate::metrics;
use crate::recovery::ErrorClassifier;

/// What an acquisition produced.
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    Asset(LocalAsset),
    /// Every strategy failed; the item waits for an operator.
    Manual {
        entry: ManualQueueEntry,
        /// False when the item was already queued
        newly_queued: bool,
    },
    /// Shutdown was requested mid-cascade
    Aborted,
}

/// What the strategies alone produced, before any manual-queue write.
#[derive(Debug, Clone)]
pub enum CascadeOutcome {
    Asset(LocalAsset),
    /// Every strategy failed; the entry describes what was tried.
    Exhausted(ManualQueueEntry),
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AcquisitionStats {
    pub succeeded: u64,
    pub failed: u64,
}

/// Runs the strategy cascade for one item at a time per permit.
pub struct ResilientDownloader {
    config: DownloaderConfig,
    cascade: StrategyCascade,
    classifier: Arc<ErrorClassifier>,
    manual: Arc<dyn ManualReviewQueue>,
    audit: Arc<dyn AuditLog>,
    patterns: SuccessPatternLog,
    semaphore: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl ResilientDownloader {
    pub fn new(
        config: DownloaderConfig,
        cascade: StrategyCascade,
        classifier: Arc<ErrorClassifier>,
        manual: Arc<dyn ManualReviewQueue>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let patterns = SuccessPatternLog::new(config.pattern_log.clone());
        let (_, shutdown) = watch::channel(false);
        Self {
            config,
            cascade,
            classifier,
            manual,
            audit,
            patterns,
            semaphore,
            shutdown,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Stop between tries and strategies once `shutdown` flips to true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn stats(&self) -> AcquisitionStats {
        AcquisitionStats {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub fn patterns(&self) -> &SuccessPatternLog {
        &self.patterns
    }

    /// Where the item's download lands.
    pub fn output_path(&self, item: &ContentItem) -> PathBuf {
        let safe: String = item
            .external_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.config.output_dir.join(format!("{}.mp4", safe))
    }

    /// Acquire `item`: run the cascade and queue an exhausted item for
    /// manual review once.
    pub async fn acquire(&self, item: &ContentItem) -> WorkerResult<AcquireOutcome> {
        match self.run_cascade(item).await? {
            CascadeOutcome::Asset(asset) => Ok(AcquireOutcome::Asset(asset)),
            CascadeOutcome::Aborted => Ok(AcquireOutcome::Aborted),
            CascadeOutcome::Exhausted(entry) => {
                let newly_queued = self.queue_for_review(entry.clone()).await?;
                Ok(AcquireOutcome::Manual {
                    entry,
                    newly_queued,
                })
            }
        }
    }

    /// Run the strategies strictly in order; the first success wins.
    ///
    /// Errors come only from local setup, never from a strategy, so a
    /// caller may retry this without repeating failed downloads.
    pub async fn run_cascade(&self, item: &ContentItem) -> WorkerResult<CascadeOutcome> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| WorkerError::acquisition_failed("downloader semaphore closed"))?;

        let logger = ItemLogger::new(item, Stage::Acquisition);
        let started = Instant::now();
        let output_path = self.output_path(item);

        if let Some(asset) = existing_asset(&output_path, self.config.min_existing_bytes).await {
            logger.completed("reused existing download");
            return Ok(CascadeOutcome::Asset(asset));
        }
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let request = AcquisitionRequest {
            content_id: item.id.clone(),
            external_id: item.external_id.clone(),
            platform: item.platform,
            url: item.source_url.clone(),
            output_path,
        };
        let family = url_family(&item.source_url);
        logger.started(&format!("{} strategies for {}", self.cascade.len(), family));

        let mut tried: Vec<String> = Vec::new();
        let mut last_error: Option<String> = None;

        for entry in self.cascade.entries() {
            let strategy = &entry.strategy;
            let name = strategy.name();

            if self.is_shutdown() {
                logger.aborted(None);
                return Ok(CascadeOutcome::Aborted);
            }
            if !strategy.supports(&request) {
                debug!(strategy = name, "Strategy not applicable, skipping");
                continue;
            }
            if !tried.is_empty() {
                tokio::time::sleep(self.strategy_delay()).await;
                if self.is_shutdown() {
                    logger.aborted(Some(name));
                    return Ok(CascadeOutcome::Aborted);
                }
            }
            tried.push(name.to_string());

            for attempt in 1..=entry.policy.max_tries {
                match strategy.attempt(&request).await {
                    Ok(asset) => {
                        self.log_attempt(AcquisitionAttempt::succeeded(
                            item.id.clone(),
                            &item.external_id,
                            name,
                            attempt,
                        ))
                        .await;
                        self.succeeded.fetch_add(1, Ordering::Relaxed);
                        let pattern = self.patterns.record_success(name, &family).await;
                        metrics::record_acquisition(name, true, started.elapsed().as_secs_f64());
                        logger.acquired(name, attempt, asset.size_bytes, pattern.success_rate);
                        return Ok(CascadeOutcome::Asset(asset));
                    }
                    Err(e) => {
                        let message = e.to_string();
                        let tier = self.classifier.classify(&message);
                        self.log_attempt(AcquisitionAttempt::failed(
                            item.id.clone(),
                            &item.external_id,
                            name,
                            attempt,
                            tier,
                            &message,
                        ))
                        .await;
                        self.patterns.record_failure(name, &family);
                        logger.attempt_failed(name, attempt, entry.policy.max_tries, tier, &message);
                        last_error = Some(message);

                        // System and critical failures end this strategy early.
                        if matches!(tier, ErrorTier::System | ErrorTier::Critical) {
                            break;
                        }
                        if attempt < entry.policy.max_tries {
                            if self.is_shutdown() {
                                logger.aborted(Some(name));
                                return Ok(CascadeOutcome::Aborted);
                            }
                            tokio::time::sleep(entry.policy.backoff.delay_for_attempt(attempt - 1))
                                .await;
                        }
                    }
                }
            }
        }

        self.failed.fetch_add(1, Ordering::Relaxed);
        metrics::record_acquisition("manual_queue", false, started.elapsed().as_secs_f64());

        let mut entry = ManualQueueEntry::new(
            &item.external_id,
            item.id.clone(),
            &item.source_url,
            tried,
        )
        .with_title(&item.title);
        if let Some(error) = last_error {
            entry = entry.with_last_error(error);
        }
        logger.exhausted(&entry.strategies_tried, entry.last_error.as_deref());
        Ok(CascadeOutcome::Exhausted(entry))
    }

    /// Put an exhausted item in the manual queue. `false` when it was
    /// already there.
    pub async fn queue_for_review(&self, entry: ManualQueueEntry) -> WorkerResult<bool> {
        let external_id = entry.external_id.clone();
        let newly_queued = self.manual.enqueue(entry).await?;
        if newly_queued {
            info!(external_id = %external_id, "Awaiting manual acquisition");
        } else {
            debug!(external_id = %external_id, "Already in manual queue");
        }
        metrics::set_manual_queue_size(self.manual.len().await?);
        Ok(newly_queued)
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn strategy_delay(&self) -> Duration {
        let min = self.config.strategy_delay_min.as_millis() as u64;
        let max = self.config.strategy_delay_max.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    async fn log_attempt(&self, attempt: AcquisitionAttempt) {
        metrics::record_attempt(&attempt.strategy, !attempt.is_failure());
        if let Err(e) = self.audit.append_attempt(&attempt).await {
            warn!(error = %e, "Failed to persist acquisition attempt");
        }
    }
}
