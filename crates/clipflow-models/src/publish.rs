//! Caption metadata and publish state.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where a caption came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptionOrigin {
    /// Primary (model-backed) generator
    Model,
    /// Built-in templates
    #[default]
    Template,
}

/// Post metadata for a processed clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionMetadata {
    pub title: String,
    pub description: String,
    pub hashtags: Vec<String>,
    pub hook_text: String,
    pub call_to_action: String,
    #[serde(default)]
    pub origin: CaptionOrigin,
}

/// Publish lifecycle of a processed clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishState {
    #[default]
    Pending,
    Scheduled {
        at: DateTime<Utc>,
        reference: String,
    },
    Published {
        post_id: String,
        at: DateTime<Utc>,
    },
}

impl PublishState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishState::Pending => "pending",
            PublishState::Scheduled { .. } => "scheduled",
            PublishState::Published { .. } => "published",
        }
    }

    /// Still waiting for the publish loop.
    pub fn is_pending(&self) -> bool {
        matches!(self, PublishState::Pending)
    }
}
