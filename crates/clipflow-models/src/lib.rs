//! Shared data models for the ClipFlow pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Discovered content items and their acquisition state machine
//! - Acquisition attempts, local assets and manual-review entries
//! - Clip candidates, ranked clips and processed clips
//! - Error tiers, error records and recovery plans
//! - Caption metadata and publish state

pub mod acquisition;
pub mod clip;
pub mod content;
pub mod error_tier;
pub mod publish;
pub mod utils;

// Re-export common types
pub use acquisition::{
    AcquisitionAttempt, AttemptOutcome, LocalAsset, ManualQueueEntry, SuccessPattern,
};
pub use clip::{ClipCandidate, ClipCategory, ClipId, EffectKind, ProcessedClip, RankedClip};
pub use content::{
    AcquisitionState, ContentId, ContentItem, EngagementMetrics, Platform, StateTransitionError,
};
pub use error_tier::{ErrorRecord, ErrorTier, RecoveryPlan, Stage};
pub use publish::{CaptionMetadata, CaptionOrigin, PublishState};
pub use utils::url_family;
