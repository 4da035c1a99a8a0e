//! Discovered content items and the acquisition state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a content item inside the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    /// Generate a new random content ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source platform of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Youtube,
    Tiktok,
    Instagram,
    Other,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Other => "other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "youtube" | "yt" => Ok(Platform::Youtube),
            "tiktok" => Ok(Platform::Tiktok),
            "instagram" | "ig" => Ok(Platform::Instagram),
            "other" => Ok(Platform::Other),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Public engagement counters reported by the source platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct EngagementMetrics {
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub shares: u64,
}

impl EngagementMetrics {
    /// Platform-weighted engagement score in `[0, 1]`.
    ///
    /// Comments count double on every platform; TikTok additionally weights
    /// shares, which is where most of its virality signal lives.
    pub fn score_for(&self, platform: Platform) -> f64 {
        if self.views == 0 {
            return 0.0;
        }
        let views = self.views as f64;
        let base = self.likes as f64 + 2.0 * self.comments as f64;
        let score = match platform {
            Platform::Tiktok => (base + 3.0 * self.shares as f64) / views * 20.0,
            _ => base / views * 50.0,
        };
        score.clamp(0.0, 1.0)
    }
}

/// Acquisition state of a content item.
///
/// ```text
/// Discovered -> Acquiring -> Acquired -> Analyzing -> ClipsReady -> Published
///                   \-> ManualQueue -(operator asset)-> Acquired
/// any non-terminal state -> Degraded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    #[default]
    Discovered,
    Acquiring,
    Acquired,
    Analyzing,
    ClipsReady,
    Published,
    /// Every acquisition strategy was exhausted; waiting for an operator.
    ManualQueue,
    /// A stage failed hard; the item is skipped from here on.
    Degraded,
}

impl AcquisitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionState::Discovered => "discovered",
            AcquisitionState::Acquiring => "acquiring",
            AcquisitionState::Acquired => "acquired",
            AcquisitionState::Analyzing => "analyzing",
            AcquisitionState::ClipsReady => "clips_ready",
            AcquisitionState::Published => "published",
            AcquisitionState::ManualQueue => "manual_queue",
            AcquisitionState::Degraded => "degraded",
        }
    }

    /// Terminal for the automatic pipeline. `ManualQueue` may still be left
    /// through an operator-supplied asset.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcquisitionState::Published
                | AcquisitionState::ManualQueue
                | AcquisitionState::Degraded
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: AcquisitionState) -> bool {
        use AcquisitionState::*;

        match (self, next) {
            (Discovered, Acquiring) => true,
            (Acquiring, Acquired) | (Acquiring, ManualQueue) => true,
            (Acquired, Analyzing) => true,
            (Analyzing, ClipsReady) => true,
            (ClipsReady, Published) => true,
            (ManualQueue, Acquired) | (ManualQueue, Acquiring) => true,
            (Published, _) | (Degraded, _) => false,
            (_, Degraded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid state transition for {external_id}: {from} -> {to}")]
pub struct StateTransitionError {
    pub external_id: String,
    pub from: AcquisitionState,
    pub to: AcquisitionState,
}

/// A discovered source video candidate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContentItem {
    /// Pipeline-internal ID
    pub id: ContentId,

    /// Source platform
    pub platform: Platform,

    /// Platform ID, unique across the pipeline
    pub external_id: String,

    /// URL the media is fetched from
    pub source_url: String,

    /// Title as reported by the platform
    #[serde(default)]
    pub title: String,

    /// Keywords the item was discovered with
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Engagement counters
    #[serde(default)]
    pub metrics: EngagementMetrics,

    /// Duration in seconds, when the platform reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    /// Discovery timestamp
    pub discovered_at: DateTime<Utc>,

    /// Current state
    #[serde(default)]
    pub state: AcquisitionState,

    /// Last state change
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// Create a freshly discovered item.
    pub fn new(
        platform: Platform,
        external_id: impl Into<String>,
        source_url: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ContentId::new(),
            platform,
            external_id: external_id.into(),
            source_url: source_url.into(),
            title: title.into(),
            keywords: Vec::new(),
            metrics: EngagementMetrics::default(),
            duration_secs: None,
            discovered_at: now,
            state: AcquisitionState::Discovered,
            updated_at: now,
        }
    }

    pub fn with_metrics(mut self, metrics: EngagementMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Platform-weighted engagement score in `[0, 1]`.
    pub fn engagement_score(&self) -> f64 {
        self.metrics.score_for(self.platform)
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: AcquisitionState) -> Result<(), StateTransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(StateTransitionError {
                external_id: self.external_id.clone(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
