//! In-memory store used by the binary's default wiring and by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use clipflow_models::{
    AcquisitionAttempt, AcquisitionState, ClipCandidate, ClipId, ContentId, ContentItem,
    ErrorRecord, ProcessedClip, RankedClip,
};

use crate::error::{StorageError, StorageResult};
use crate::store::{AuditLog, ContentStore};

#[derive(Default)]
struct Tables {
    items: HashMap<ContentId, ContentItem>,
    by_external: HashMap<String, ContentId>,
    candidates: Vec<ClipCandidate>,
    ranked: Vec<RankedClip>,
    processed: Vec<ProcessedClip>,
    processed_index: HashMap<ClipId, usize>,
}

impl Tables {
    fn insert_item(&mut self, item: &ContentItem) -> bool {
        if self.by_external.contains_key(&item.external_id) {
            return false;
        }
        self.by_external
            .insert(item.external_id.clone(), item.id.clone());
        self.items.insert(item.id.clone(), item.clone());
        true
    }
}

/// Store keeping every table behind one `RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    errors: RwLock<Vec<ErrorRecord>>,
    attempts: RwLock<Vec<AcquisitionAttempt>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn create_item(&self, item: &ContentItem) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.insert_item(item) {
            return Err(StorageError::already_exists(&item.external_id));
        }
        Ok(())
    }

    async fn bulk_insert(&self, items: &[ContentItem]) -> StorageResult<usize> {
        let mut tables = self.tables.write().await;
        let inserted = items.iter().filter(|i| tables.insert_item(i)).count();
        debug!(inserted, offered = items.len(), "Bulk inserted content items");
        Ok(inserted)
    }

    async fn get_item(&self, id: &ContentId) -> StorageResult<Option<ContentItem>> {
        Ok(self.tables.read().await.items.get(id).cloned())
    }

    async fn get_by_external_id(&self, external_id: &str) -> StorageResult<Option<ContentItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_external
            .get(external_id)
            .and_then(|id| tables.items.get(id))
            .cloned())
    }

    async fn update_item(&self, item: &ContentItem) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        match tables.items.get_mut(&item.id) {
            Some(stored) => {
                *stored = item.clone();
                Ok(())
            }
            None => Err(StorageError::not_found(item.id.as_str())),
        }
    }

    async fn items_in_state(&self, state: AcquisitionState) -> StorageResult<Vec<ContentItem>> {
        let tables = self.tables.read().await;
        let mut items: Vec<_> = tables
            .items
            .values()
            .filter(|i| i.state == state)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.discovered_at);
        Ok(items)
    }

    async fn save_candidates(&self, candidates: &[ClipCandidate]) -> StorageResult<()> {
        self.tables
            .write()
            .await
            .candidates
            .extend_from_slice(candidates);
        Ok(())
    }

    async fn save_ranked(&self, ranked: &[RankedClip]) -> StorageResult<()> {
        self.tables.write().await.ranked.extend_from_slice(ranked);
        Ok(())
    }

    async fn ranked_for(&self, content_id: &ContentId) -> StorageResult<Vec<RankedClip>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ranked
            .iter()
            .filter(|r| &r.candidate.content_id == content_id)
            .cloned()
            .collect())
    }

    async fn save_processed(&self, clip: &ProcessedClip) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        match tables.processed_index.get(&clip.clip_id).copied() {
            Some(idx) => tables.processed[idx] = clip.clone(),
            None => {
                let idx = tables.processed.len();
                tables.processed.push(clip.clone());
                tables.processed_index.insert(clip.clip_id.clone(), idx);
            }
        }
        Ok(())
    }

    async fn unpublished_clips(&self, limit: usize) -> StorageResult<Vec<ProcessedClip>> {
        let tables = self.tables.read().await;
        let mut pending: Vec<_> = tables
            .processed
            .iter()
            .filter(|c| c.publish.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn processed_for(&self, content_id: &ContentId) -> StorageResult<Vec<ProcessedClip>> {
        let tables = self.tables.read().await;
        Ok(tables
            .processed
            .iter()
            .filter(|c| &c.content_id == content_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn append_error(&self, record: &ErrorRecord) -> StorageResult<()> {
        self.errors.write().await.push(record.clone());
        Ok(())
    }

    async fn append_attempt(&self, attempt: &AcquisitionAttempt) -> StorageResult<()> {
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }

    async fn errors(&self) -> StorageResult<Vec<ErrorRecord>> {
        Ok(self.errors.read().await.clone())
    }

    async fn attempts_for(&self, content_id: &ContentId) -> StorageResult<Vec<AcquisitionAttempt>> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| &a.content_id == content_id)
            .cloned()
            .collect())
    }
}
