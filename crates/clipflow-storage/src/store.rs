//! Persistence collaborator traits.

use async_trait::async_trait;

use clipflow_models::{
    AcquisitionAttempt, AcquisitionState, ClipCandidate, ContentId, ContentItem, ErrorRecord,
    ProcessedClip, RankedClip,
};

use crate::error::StorageResult;

/// Content items and the clips derived from them.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new item. Fails if the external ID is already stored.
    async fn create_item(&self, item: &ContentItem) -> StorageResult<()>;

    /// Insert many items, skipping known external IDs. Returns the number inserted.
    async fn bulk_insert(&self, items: &[ContentItem]) -> StorageResult<usize>;

    async fn get_item(&self, id: &ContentId) -> StorageResult<Option<ContentItem>>;

    async fn get_by_external_id(&self, external_id: &str) -> StorageResult<Option<ContentItem>>;

    /// Replace a stored item.
    async fn update_item(&self, item: &ContentItem) -> StorageResult<()>;

    async fn items_in_state(&self, state: AcquisitionState) -> StorageResult<Vec<ContentItem>>;

    async fn save_candidates(&self, candidates: &[ClipCandidate]) -> StorageResult<()>;

    async fn save_ranked(&self, ranked: &[RankedClip]) -> StorageResult<()>;

    async fn ranked_for(&self, content_id: &ContentId) -> StorageResult<Vec<RankedClip>>;

    /// Insert or replace a processed clip, keyed by clip ID.
    async fn save_processed(&self, clip: &ProcessedClip) -> StorageResult<()>;

    /// Processed clips still waiting to be published, oldest first.
    async fn unpublished_clips(&self, limit: usize) -> StorageResult<Vec<ProcessedClip>>;

    async fn processed_for(&self, content_id: &ContentId) -> StorageResult<Vec<ProcessedClip>>;
}

/// Append-only log of error records and acquisition attempts.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append_error(&self, record: &ErrorRecord) -> StorageResult<()>;

    async fn append_attempt(&self, attempt: &AcquisitionAttempt) -> StorageResult<()>;

    async fn errors(&self) -> StorageResult<Vec<ErrorRecord>>;

    async fn attempts_for(&self, content_id: &ContentId) -> StorageResult<Vec<AcquisitionAttempt>>;
}
