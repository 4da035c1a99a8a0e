//! Bounded in-process work queue joining the intake and processing loops.
//!
//! Push waits while the queue is full and pop waits while it is empty, so a
//! slow processing loop throttles intake without dropping items.

use chrono::{DateTime, Utc};
use metrics::gauge;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use clipflow_models::{ContentItem, LocalAsset};

use crate::error::{QueueError, QueueResult};

/// Stage a work item is headed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStage {
    /// Needs acquisition first
    Acquire,
    /// Media is already local; start at analysis
    Analyze,
}

impl WorkStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStage::Acquire => "acquire",
            WorkStage::Analyze => "analyze",
        }
    }
}

/// Payload carried by a work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkPayload {
    Content(ContentItem),
    Acquired {
        item: ContentItem,
        asset: LocalAsset,
    },
}

/// Envelope placed on the work queue. Ownership moves to the consumer on pop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub stage: WorkStage,
    pub payload: WorkPayload,
    pub enqueued_at: DateTime<Utc>,
}

impl WorkItem {
    /// Freshly discovered content that still needs acquisition.
    pub fn acquire(item: ContentItem) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            stage: WorkStage::Acquire,
            payload: WorkPayload::Content(item),
            enqueued_at: Utc::now(),
        }
    }

    /// Content whose media is already on disk.
    pub fn analyze(item: ContentItem, asset: LocalAsset) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            stage: WorkStage::Analyze,
            payload: WorkPayload::Acquired { item, asset },
            enqueued_at: Utc::now(),
        }
    }

    pub fn content(&self) -> &ContentItem {
        match &self.payload {
            WorkPayload::Content(item) => item,
            WorkPayload::Acquired { item, .. } => item,
        }
    }

    pub fn into_parts(self) -> (ContentItem, Option<LocalAsset>) {
        match self.payload {
            WorkPayload::Content(item) => (item, None),
            WorkPayload::Acquired { item, asset } => (item, Some(asset)),
        }
    }
}

/// Bounded multi-producer, multi-consumer work queue.
pub struct WorkQueue {
    tx: mpsc::Sender<WorkItem>,
    rx: Mutex<mpsc::Receiver<WorkItem>>,
    capacity: usize,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }

    /// Push, waiting while the queue is full.
    pub async fn push(&self, item: WorkItem) -> QueueResult<()> {
        debug!(work_id = %item.id, stage = item.stage.as_str(), "Enqueueing work item");
        self.tx.send(item).await.map_err(|_| QueueError::Closed)?;
        self.record_depth();
        Ok(())
    }

    /// Push without waiting.
    pub fn try_push(&self, item: WorkItem) -> QueueResult<()> {
        match self.tx.try_send(item) {
            Ok(()) => {
                self.record_depth();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(QueueError::Full(self.capacity)),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Pop, waiting while the queue is empty. Cancel-safe: dropping the
    /// future loses no item.
    pub async fn pop(&self) -> Option<WorkItem> {
        let mut rx = self.rx.lock().await;
        let item = rx.recv().await;
        drop(rx);
        self.record_depth();
        item
    }

    /// Items currently buffered.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn record_depth(&self) {
        gauge!("clipflow_work_queue_depth").set(self.len() as f64);
    }
}
