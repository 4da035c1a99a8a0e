//! Acquisition audit records, local assets and manual-review entries.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{ContentId, ErrorTier};

/// Outcome of a single acquisition try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
}

/// One try of one strategy for one content item. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AcquisitionAttempt {
    /// Item being acquired
    pub content_id: ContentId,
    /// Platform ID of the item
    pub external_id: String,
    /// Strategy name
    pub strategy: String,
    /// 1-based try index within the strategy
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    /// Tier of the failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<ErrorTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl AcquisitionAttempt {
    pub fn succeeded(
        content_id: ContentId,
        external_id: impl Into<String>,
        strategy: impl Into<String>,
        attempt: u32,
    ) -> Self {
        Self {
            content_id,
            external_id: external_id.into(),
            strategy: strategy.into(),
            attempt,
            outcome: AttemptOutcome::Succeeded,
            tier: None,
            error: None,
            at: Utc::now(),
        }
    }

    pub fn failed(
        content_id: ContentId,
        external_id: impl Into<String>,
        strategy: impl Into<String>,
        attempt: u32,
        tier: ErrorTier,
        error: impl Into<String>,
    ) -> Self {
        Self {
            content_id,
            external_id: external_id.into(),
            strategy: strategy.into(),
            attempt,
            outcome: AttemptOutcome::Failed,
            tier: Some(tier),
            error: Some(error.into()),
            at: Utc::now(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == AttemptOutcome::Failed
    }
}

/// A media file available on local disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocalAsset {
    /// Path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// Strategy that produced the file (`manual` for operator uploads)
    pub strategy: String,
}

impl LocalAsset {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64, strategy: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            strategy: strategy.into(),
        }
    }
}

/// Durable entry for an item that exhausted every acquisition strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ManualQueueEntry {
    /// Platform ID; the idempotency key of the manual queue
    pub external_id: String,
    pub content_id: ContentId,
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Strategy names in the order they were tried
    #[serde(default)]
    pub strategies_tried: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    /// Set when an operator pulls the entry in a batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
}

impl ManualQueueEntry {
    pub fn new(
        external_id: impl Into<String>,
        content_id: ContentId,
        url: impl Into<String>,
        strategies_tried: Vec<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            content_id,
            url: url.into(),
            title: String::new(),
            strategies_tried,
            last_error: None,
            enqueued_at: Utc::now(),
            claimed_at: None,
            retry_count: 0,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }
}

/// Record of a successful acquisition, used to reorder strategies later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SuccessPattern {
    pub strategy: String,
    /// Host family of the source URL (e.g. `youtube.com`)
    pub url_family: String,
    /// Rolling success rate of the downloader at the time of the record
    pub success_rate: f64,
    pub recorded_at: DateTime<Utc>,
}
