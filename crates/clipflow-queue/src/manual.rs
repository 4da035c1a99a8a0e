//! Durable manual-review queue for items every acquisition strategy failed on.
//!
//! Entries are keyed by platform external ID; enqueuing an ID that is already
//! present is a no-op, so repeated failures of the same item never produce
//! duplicate review work.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use clipflow_models::ManualQueueEntry;

use crate::error::{QueueError, QueueResult};

/// Operator-facing queue of items awaiting manual acquisition.
#[async_trait]
pub trait ManualReviewQueue: Send + Sync {
    /// Insert an entry. Returns `false` when the external ID is already queued.
    async fn enqueue(&self, entry: ManualQueueEntry) -> QueueResult<bool>;

    async fn contains(&self, external_id: &str) -> QueueResult<bool>;

    /// Claim up to `limit` of the oldest unclaimed entries.
    async fn next_batch(&self, limit: usize) -> QueueResult<Vec<ManualQueueEntry>>;

    /// Return a claimed entry to the pool, bumping its retry count.
    async fn release(&self, external_id: &str) -> QueueResult<bool>;

    /// Remove an entry once the operator has supplied the media.
    async fn resolve(&self, external_id: &str) -> QueueResult<Option<ManualQueueEntry>>;

    async fn len(&self) -> QueueResult<usize>;

    async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Manual queue persisted as a JSON array on local disk.
///
/// The whole file is rewritten through a temp file on every mutation.
pub struct JsonFileManualQueue {
    path: PathBuf,
    entries: Mutex<Vec<ManualQueueEntry>>,
}

impl JsonFileManualQueue {
    /// Open the queue file, creating an empty queue when it does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> QueueResult<Self> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), count = entries.len(), "Opened manual queue file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &[ManualQueueEntry]) -> QueueResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ManualReviewQueue for JsonFileManualQueue {
    async fn enqueue(&self, entry: ManualQueueEntry) -> QueueResult<bool> {
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|e| e.external_id == entry.external_id) {
            debug!(external_id = %entry.external_id, "Already in manual queue");
            return Ok(false);
        }
        let external_id = entry.external_id.clone();
        let strategies = entry.strategies_tried.clone();

        let mut next = entries.clone();
        next.push(entry);
        self.persist(&next).await?;
        *entries = next;

        info!(
            external_id = %external_id,
            strategies = ?strategies,
            "Queued for manual acquisition"
        );
        Ok(true)
    }

    async fn contains(&self, external_id: &str) -> QueueResult<bool> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().any(|e| e.external_id == external_id))
    }

    async fn next_batch(&self, limit: usize) -> QueueResult<Vec<ManualQueueEntry>> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        let mut next = entries.clone();
        let mut batch = Vec::new();
        for entry in next.iter_mut().filter(|e| e.claimed_at.is_none()) {
            if batch.len() >= limit {
                break;
            }
            entry.claimed_at = Some(now);
            batch.push(entry.clone());
        }
        if !batch.is_empty() {
            self.persist(&next).await?;
            *entries = next;
        }
        Ok(batch)
    }

    async fn release(&self, external_id: &str) -> QueueResult<bool> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        let Some(entry) = next.iter_mut().find(|e| e.external_id == external_id) else {
            return Ok(false);
        };
        entry.claimed_at = None;
        entry.retry_count += 1;
        self.persist(&next).await?;
        *entries = next;
        Ok(true)
    }

    async fn resolve(&self, external_id: &str) -> QueueResult<Option<ManualQueueEntry>> {
        let mut entries = self.entries.lock().await;
        let Some(idx) = entries.iter().position(|e| e.external_id == external_id) else {
            return Ok(None);
        };
        let mut next = entries.clone();
        let entry = next.remove(idx);
        self.persist(&next).await?;
        *entries = next;
        info!(external_id = %external_id, "Resolved manual queue entry");
        Ok(Some(entry))
    }

    async fn len(&self) -> QueueResult<usize> {
        Ok(self.entries.lock().await.len())
    }
}

/// Manual queue in Redis: a hash of entries plus a sorted set for FIFO order.
pub struct RedisManualQueue {
    client: redis::Client,
    entries_key: String,
    order_key: String,
}

impl RedisManualQueue {
    pub fn new(redis_url: &str, key_prefix: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            entries_key: format!("{}:entries", key_prefix),
            order_key: format!("{}:order", key_prefix),
        })
    }

    async fn load(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        external_id: &str,
    ) -> QueueResult<Option<ManualQueueEntry>> {
        let raw: Option<String> = conn.hget(&self.entries_key, external_id).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(QueueError::from))
            .transpose()
    }

    async fn store(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        entry: &ManualQueueEntry,
    ) -> QueueResult<()> {
        let json = serde_json::to_string(entry)?;
        conn.hset::<_, _, _, ()>(&self.entries_key, &entry.external_id, json)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ManualReviewQueue for RedisManualQueue {
    async fn enqueue(&self, entry: ManualQueueEntry) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let json = serde_json::to_string(&entry)?;

        // HSETNX is the dedup point. ZADD NX in the same transaction keeps the
        // order set in step with the hash and re-links an entry orphaned by
        // an older partial write.
        let score = entry.enqueued_at.timestamp_millis() as f64;
        let (inserted,): (bool,) = redis::pipe()
            .atomic()
            .hset_nx(&self.entries_key, &entry.external_id, json)
            .cmd("ZADD")
            .arg(&self.order_key)
            .arg("NX")
            .arg(score)
            .arg(&entry.external_id)
            .ignore()
            .query_async(&mut conn)
            .await?;
        if !inserted {
            debug!(external_id = %entry.external_id, "Already in manual queue");
            return Ok(false);
        }

        info!(
            external_id = %entry.external_id,
            strategies = ?entry.strategies_tried,
            "Queued for manual acquisition"
        );
        Ok(true)
    }

    async fn contains(&self, external_id: &str) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.hexists(&self.entries_key, external_id).await?;
        Ok(exists)
    }

    async fn next_batch(&self, limit: usize) -> QueueResult<Vec<ManualQueueEntry>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn.zrange(&self.order_key, 0, -1).await?;
        let now = Utc::now();

        let mut batch = Vec::new();
        for id in ids {
            if batch.len() >= limit {
                break;
            }
            let Some(mut entry) = self.load(&mut conn, &id).await? else {
                warn!(external_id = %id, "Order set references missing entry");
                conn.zrem::<_, _, ()>(&self.order_key, &id).await?;
                continue;
            };
            if entry.claimed_at.is_some() {
                continue;
            }
            entry.claimed_at = Some(now);
            self.store(&mut conn, &entry).await?;
            batch.push(entry);
        }
        Ok(batch)
    }

    async fn release(&self, external_id: &str) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let Some(mut entry) = self.load(&mut conn, external_id).await? else {
            return Ok(false);
        };
        entry.claimed_at = None;
        entry.retry_count += 1;
        self.store(&mut conn, &entry).await?;
        Ok(true)
    }

    async fn resolve(&self, external_id: &str) -> QueueResult<Option<ManualQueueEntry>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let entry = self.load(&mut conn, external_id).await?;
        if entry.is_some() {
            redis::pipe()
                .atomic()
                .hdel(&self.entries_key, external_id)
                .ignore()
                .zrem(&self.order_key, external_id)
                .ignore()
                .query_async::<()>(&mut conn)
                .await?;
            info!(external_id = %external_id, "Resolved manual queue entry");
        }
        Ok(entry)
    }

    async fn len(&self) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: usize = conn.hlen(&self.entries_key).await?;
        Ok(len)
    }
}
