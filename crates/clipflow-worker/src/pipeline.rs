//! Per-item processing: acquisition, analysis, selection and effects.
//!
//! Every stage boundary runs through the [`ErrorClassifier`]. A stage that
//! ends degraded moves the item to `Degraded`; nothing here aborts the
//! caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use clipflow_media::{
    extract_segment, generate_candidates, AnalysisResult, CandidateConfig, ClipAnalyzer,
    ClipAsset, EffectComposer,
};
use clipflow_models::{
    AcquisitionState, ContentItem, LocalAsset, ManualQueueEntry, ProcessedClip, RankedClip,
    Stage,
};
use clipflow_storage::{ContentStore, StorageError};

use crate::acquisition::{CascadeOutcome, ResilientDownloader};
use crate::captions::TemplateCaptioner;
use crate::error::WorkerResult;
use crate::logging::ItemLogger;
use crate::metrics;
use crate::recovery::{ErrorClassifier, RecoveryContext};
use crate::selection::ClipSelector;

/// Turns one ranked clip of a source asset into a processed clip.
#[async_trait]
pub trait ClipProducer: Send + Sync {
    async fn produce(&self, source: &Path, ranked: &RankedClip) -> WorkerResult<ProcessedClip>;
}

/// Cuts the segment with FFmpeg and runs it through the effect composer.
pub struct FfmpegClipProducer {
    clips_dir: PathBuf,
    composer: EffectComposer,
    effects: Vec<String>,
    captions: TemplateCaptioner,
}

impl FfmpegClipProducer {
    pub fn new(clips_dir: impl Into<PathBuf>, composer: EffectComposer, effects: Vec<String>) -> Self {
        Self {
            clips_dir: clips_dir.into(),
            composer,
            effects,
            captions: TemplateCaptioner::new(),
        }
    }
}

#[async_trait]
impl ClipProducer for FfmpegClipProducer {
    async fn produce(&self, source: &Path, ranked: &RankedClip) -> WorkerResult<ProcessedClip> {
        let candidate = &ranked.candidate;
        tokio::fs::create_dir_all(&self.clips_dir).await?;
        let output = self.clips_dir.join(format!("{}.mp4", candidate.id));

        extract_segment(source, &output, candidate.start, candidate.duration()).await?;

        let asset = ClipAsset {
            clip_id: candidate.id.clone(),
            content_id: candidate.content_id.clone(),
            path: output,
            duration_secs: candidate.duration(),
            score: ranked.score,
            hook_text: Some(self.captions.hook_line(&candidate.id)),
        };
        Ok(self.composer.apply(&asset, &self.effects).await)
    }
}

/// How an item left the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    ClipsReady { clips: usize, degraded_clips: usize },
    ManualQueue,
    Degraded { reason: String },
    /// Shutdown interrupted acquisition; the item stays `Acquiring`
    Aborted,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::ClipsReady { .. } => "clips_ready",
            ItemOutcome::ManualQueue => "manual_queue",
            ItemOutcome::Degraded { .. } => "degraded",
            ItemOutcome::Aborted => "aborted",
        }
    }
}

/// Collaborators the per-item pipeline needs.
pub struct ItemPipeline {
    store: Arc<dyn ContentStore>,
    classifier: Arc<ErrorClassifier>,
    downloader: Arc<ResilientDownloader>,
    analyzer: ClipAnalyzer,
    candidates: CandidateConfig,
    selector: ClipSelector,
    producer: Arc<dyn ClipProducer>,
}

impl ItemPipeline {
    pub fn new(
        store: Arc<dyn ContentStore>,
        classifier: Arc<ErrorClassifier>,
        downloader: Arc<ResilientDownloader>,
        analyzer: ClipAnalyzer,
        candidates: CandidateConfig,
        selector: ClipSelector,
        producer: Arc<dyn ClipProducer>,
    ) -> Self {
        Self {
            store,
            classifier,
            downloader,
            analyzer,
            candidates,
            selector,
            producer,
        }
    }

    pub fn downloader(&self) -> &Arc<ResilientDownloader> {
        &self.downloader
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Run `item` from its current state to `ClipsReady`, `ManualQueue` or
    /// `Degraded`. An `asset` skips acquisition.
    pub async fn process(
        &self,
        mut item: ContentItem,
        asset: Option<LocalAsset>,
    ) -> WorkerResult<ItemOutcome> {
        let logger = ItemLogger::new(&item, Stage::Acquisition);

        let asset = match asset {
            Some(asset) => asset,
            None => {
                item.transition(AcquisitionState::Acquiring)?;
                self.save_item(&item).await;

                let outcome = self
                    .classifier
                    .guard(
                        Stage::Acquisition,
                        RecoveryContext::new(json!({
                            "external_id": item.external_id,
                            "url": item.source_url,
                        })),
                        || self.downloader.run_cascade(&item),
                    )
                    .await;

                match outcome.into_value() {
                    Some(CascadeOutcome::Asset(asset)) => {
                        item.transition(AcquisitionState::Acquired)?;
                        self.save_item(&item).await;
                        asset
                    }
                    Some(CascadeOutcome::Exhausted(entry)) => {
                        return self.queue_for_review(item, entry).await;
                    }
                    Some(CascadeOutcome::Aborted) => return Ok(ItemOutcome::Aborted),
                    None => return self.degrade(item, "acquisition failed").await,
                }
            }
        };

        if item.state != AcquisitionState::Acquired {
            item.transition(AcquisitionState::Acquired)?;
        }
        item.transition(AcquisitionState::Analyzing)?;
        self.save_item(&item).await;

        let logger = logger.for_stage(Stage::Analysis);
        logger.started(&asset.path.display().to_string());

        let analysis = self
            .classifier
            .guard(
                Stage::Analysis,
                RecoveryContext::new(json!({
                    "external_id": item.external_id,
                    "path": asset.path,
                })),
                || self.analyze(&asset.path),
            )
            .await;
        let analysis = match analysis.into_value() {
            Some(analysis) => analysis,
            None => return self.degrade(item, "analysis failed").await,
        };
        logger.completed(&format!(
            "{} scenes, {} peaks, viral score {:.2}",
            analysis.scene_boundaries.len(),
            analysis.energy_peaks.len(),
            analysis.viral_score
        ));

        let candidates = generate_candidates(&item.id, &analysis, &self.candidates);
        if candidates.is_empty() {
            return self.degrade(item, "no clip candidates").await;
        }
        self.persist(Stage::Persistence, || self.store.save_candidates(&candidates))
            .await;

        let ranked = self.selector.select(&candidates);
        logger
            .for_stage(Stage::Selection)
            .completed(&format!("{} of {} candidates ranked", ranked.len(), candidates.len()));
        self.persist(Stage::Persistence, || self.store.save_ranked(&ranked))
            .await;

        let logger = logger.for_stage(Stage::Effects);
        let mut clips = 0;
        let mut degraded_clips = 0;
        for clip in &ranked {
            let outcome = self
                .classifier
                .guard(
                    Stage::Effects,
                    RecoveryContext::new(json!({
                        "external_id": item.external_id,
                        "clip_id": clip.id(),
                        "rank": clip.rank,
                    })),
                    || self.producer.produce(&asset.path, clip),
                )
                .await;
            let Some(processed) = outcome.into_value() else {
                logger.clip_skipped(clip.id(), clip.rank);
                continue;
            };

            let degraded = processed.is_degraded();
            if degraded {
                degraded_clips += 1;
            }
            metrics::record_clip_processed(degraded);
            self.persist(Stage::Persistence, || self.store.save_processed(&processed))
                .await;
            clips += 1;
            logger.clip_ready(clip.rank, ranked.len(), degraded);
        }

        if clips == 0 {
            return self.degrade(item, "no clips produced").await;
        }

        item.transition(AcquisitionState::ClipsReady)?;
        self.save_item(&item).await;
        metrics::record_item_finished(AcquisitionState::ClipsReady.as_str());
        info!(
            external_id = %item.external_id,
            clips,
            degraded_clips,
            "Item ready for publishing"
        );
        Ok(ItemOutcome::ClipsReady {
            clips,
            degraded_clips,
        })
    }

    /// Move an exhausted item to `ManualQueue`. A failed queue write is
    /// retried on its own and degrades the item; the cascade never reruns.
    async fn queue_for_review(
        &self,
        mut item: ContentItem,
        entry: ManualQueueEntry,
    ) -> WorkerResult<ItemOutcome> {
        let queued = self
            .classifier
            .guard(
                Stage::Persistence,
                RecoveryContext::new(json!({
                    "external_id": item.external_id,
                    "strategies_tried": entry.strategies_tried,
                })),
                || self.downloader.queue_for_review(entry.clone()),
            )
            .await;
        if queued.into_value().is_none() {
            return self.degrade(item, "manual queue write failed").await;
        }

        item.transition(AcquisitionState::ManualQueue)?;
        self.save_item(&item).await;
        metrics::record_item_finished(AcquisitionState::ManualQueue.as_str());
        Ok(ItemOutcome::ManualQueue)
    }

    async fn analyze(&self, path: &Path) -> Result<AnalysisResult, String> {
        let analysis = self.analyzer.analyze(path).await;
        match analysis.error {
            Some(error) => Err(error),
            None => Ok(analysis),
        }
    }

    async fn degrade(&self, mut item: ContentItem, reason: &str) -> WorkerResult<ItemOutcome> {
        warn!(
            external_id = %item.external_id,
            from = item.state.as_str(),
            reason,
            "Item degraded"
        );
        item.transition(AcquisitionState::Degraded)?;
        self.save_item(&item).await;
        metrics::record_item_finished(AcquisitionState::Degraded.as_str());
        Ok(ItemOutcome::Degraded {
            reason: reason.to_string(),
        })
    }

    /// Store the item's new state, creating the row if intake never did.
    pub async fn save_item(&self, item: &ContentItem) {
        self.persist(Stage::Persistence, || async {
            match self.store.update_item(item).await {
                Err(StorageError::NotFound(_)) => self.store.create_item(item).await,
                other => other,
            }
        })
        .await;
    }

    async fn persist<F, Fut>(&self, stage: Stage, op: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(), StorageError>>,
    {
        let outcome = self
            .classifier
            .guard(stage, RecoveryContext::default(), op)
            .await;
        if outcome.is_degraded() {
            warn!(stage = stage.as_str(), "Persistence degraded, continuing");
        }
    }
}
