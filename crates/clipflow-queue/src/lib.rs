//! Queues for the ClipFlow pipeline.
//!
//! This crate provides:
//! - A bounded work queue between the intake and processing loops
//! - A durable, idempotent manual-review queue (JSON file or Redis)

pub mod config;
pub mod error;
pub mod manual;
pub mod work;

pub use config::{ManualBackend, QueueConfig};
pub use error::{QueueError, QueueResult};
pub use manual::{JsonFileManualQueue, ManualReviewQueue, RedisManualQueue};
pub use work::{WorkItem, WorkPayload, WorkQueue, WorkStage};
