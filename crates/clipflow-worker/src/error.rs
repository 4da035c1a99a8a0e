//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Acquisition failed: {0}")]
    AcquisitionFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("Caption generation failed: {0}")]
    CaptionFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid state transition: {0}")]
    StateTransition(#[from] clipflow_models::StateTransitionError),

    #[error("Storage error: {0}")]
    Storage(#[from] clipflow_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] clipflow_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] clipflow_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn acquisition_failed(msg: impl Into<String>) -> Self {
        Self::AcquisitionFailed(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn discovery_failed(msg: impl Into<String>) -> Self {
        Self::DiscoveryFailed(msg.into())
    }

    pub fn caption_failed(msg: impl Into<String>) -> Self {
        Self::CaptionFailed(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
