//! Acquisition and clip production worker.
//!
//! This crate provides:
//! - Tiered error classification and recovery
//! - The strategy cascade and resilient downloader
//! - Clip ranking, captions, engagement forecasts and publish scheduling
//! - The per-item pipeline and the orchestrator loops
//! - Status snapshots and Prometheus metrics

pub mod acquisition;
pub mod captions;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod prediction;
pub mod publish;
pub mod recovery;
pub mod retry;
pub mod selection;

pub use acquisition::{
    AcquireOutcome, CascadeOutcome, ResilientDownloader, StrategyCascade, StrategyPolicy,
};
pub use captions::{CaptionGenerator, CaptionService, TemplateCaptioner};
pub use config::WorkerConfig;
pub use discovery::{ContentSource, JsonFeedSource};
pub use error::{WorkerError, WorkerResult};
pub use logging::ItemLogger;
pub use orchestrator::{Collaborators, Orchestrator, StatusSnapshot};
pub use pipeline::{ClipProducer, FfmpegClipProducer, ItemOutcome, ItemPipeline};
pub use prediction::{ClipFeatures, EngagementForecast, EngagementPredictor};
pub use publish::{LogPublisher, Publisher};
pub use recovery::{ErrorClassifier, RecoveryContext, RecoveryOutcome};
pub use retry::RetryConfig;
pub use selection::{rank, ClipSelector};
