//! Clip candidates, ranked clips and processed clips.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{ContentId, PublishState};

/// Unique identifier for a clip. Shared by a candidate, its ranking and
/// its processed output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    /// Generate a new random clip ID.
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

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a candidate was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClipCategory {
    /// Centered on an energy peak
    EnergyPeak,
    /// Spans a pair of scene boundaries
    SceneBased,
}

impl ClipCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipCategory::EnergyPeak => "energy_peak",
            ClipCategory::SceneBased => "scene_based",
        }
    }
}

impl fmt::Display for ClipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed sub-interval of a source asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipCandidate {
    pub id: ClipId,
    /// Source content item
    pub content_id: ContentId,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub category: ClipCategory,
    /// Generator's score in `[0, 1]`
    pub raw_score: f64,
}

impl ClipCandidate {
    pub fn new(
        content_id: ContentId,
        start: f64,
        end: f64,
        category: ClipCategory,
        raw_score: f64,
    ) -> Self {
        Self {
            id: ClipId::new(),
            content_id,
            start,
            end,
            category,
            raw_score: raw_score.clamp(0.0, 1.0),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A candidate after multi-criteria scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RankedClip {
    pub candidate: ClipCandidate,
    /// Selection score in `[0, 1]`
    pub score: f64,
    /// Human-readable reasons, in the order the bonuses were evaluated
    pub reasons: Vec<String>,
    /// 1-based rank within its item
    pub rank: usize,
}

impl RankedClip {
    pub fn id(&self) -> &ClipId {
        &self.candidate.id
    }
}

/// A named transform applied by the effect pipeline.
///
/// Declaration order is the canonical application order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Slow zoom over the first 3 seconds
    HookZoom,
    /// Burned-in text overlay
    Caption,
    /// Contrast/saturation lift plus a mild speed-up
    EnergyBoost,
    /// Loudness normalization
    AudioNormalize,
    /// Warm color balance
    ColorGrade,
}

impl EffectKind {
    pub const ALL: [EffectKind; 5] = [
        EffectKind::HookZoom,
        EffectKind::Caption,
        EffectKind::EnergyBoost,
        EffectKind::AudioNormalize,
        EffectKind::ColorGrade,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::HookZoom => "hook_zoom",
            EffectKind::Caption => "caption",
            EffectKind::EnergyBoost => "energy_boost",
            EffectKind::AudioNormalize => "audio_normalize",
            EffectKind::ColorGrade => "color_grade",
        }
    }

    /// Parse an effect name. Legacy names are accepted as aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "hook_zoom" | "hook_enhance" => Some(EffectKind::HookZoom),
            "caption" | "auto_caption" => Some(EffectKind::Caption),
            "energy_boost" => Some(EffectKind::EnergyBoost),
            "audio_normalize" | "trending_music" => Some(EffectKind::AudioNormalize),
            "color_grade" => Some(EffectKind::ColorGrade),
            _ => None,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked clip after the effect pipeline, ready for publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessedClip {
    /// ID of the ranked clip this was produced from
    pub clip_id: ClipId,
    pub content_id: ContentId,
    /// Effects that were applied, in order. Empty when composition degraded.
    pub effects_applied: Vec<EffectKind>,
    /// Output file (the unmodified input when composition degraded)
    pub output: PathBuf,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Output size in bytes
    pub size_bytes: u64,
    /// Selection score carried over from ranking
    #[serde(default)]
    pub score: f64,
    /// Text used for the caption overlay and hook metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_text: Option<String>,
    /// Warning recorded when composition degraded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default)]
    pub publish: PublishState,
    pub created_at: DateTime<Utc>,
}

impl ProcessedClip {
    pub fn is_degraded(&self) -> bool {
        self.warning.is_some()
    }
}
