//! Queue configuration.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::error::QueueResult;
use crate::manual::{JsonFileManualQueue, ManualReviewQueue, RedisManualQueue};

/// Where manual-review entries are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualBackend {
    File,
    Redis,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Work queue capacity
    pub capacity: usize,
    pub manual_backend: ManualBackend,
    /// JSON file used by the file backend
    pub manual_path: PathBuf,
    /// Redis URL used by the redis backend
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            manual_backend: ManualBackend::File,
            manual_path: PathBuf::from("data/manual_queue.json"),
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "clipflow:manual".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: std::env::var("WORK_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.capacity),
            manual_backend: match std::env::var("MANUAL_QUEUE_BACKEND").as_deref() {
                Ok("redis") => ManualBackend::Redis,
                _ => ManualBackend::File,
            },
            manual_path: std::env::var("MANUAL_QUEUE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.manual_path),
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("MANUAL_QUEUE_PREFIX").unwrap_or(defaults.key_prefix),
        }
    }

    /// Open the configured manual-review backend.
    pub async fn open_manual_queue(&self) -> QueueResult<Arc<dyn ManualReviewQueue>> {
        match self.manual_backend {
            ManualBackend::File => {
                info!(path = %self.manual_path.display(), "Using file manual queue");
                Ok(Arc::new(JsonFileManualQueue::open(&self.manual_path).await?))
            }
            ManualBackend::Redis => {
                info!(prefix = %self.key_prefix, "Using Redis manual queue");
                Ok(Arc::new(RedisManualQueue::new(
                    &self.redis_url,
                    &self.key_prefix,
                )?))
            }
        }
    }
}
