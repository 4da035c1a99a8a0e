//! Persistence for the ClipFlow pipeline.
//!
//! This crate provides:
//! - `ContentStore` for content items, rankings and processed clips
//! - `AuditLog` for append-only error records and acquisition attempts
//! - An in-memory implementation of both and a JSON-lines audit log

pub mod error;
pub mod jsonl;
pub mod memory;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use jsonl::{append_json_line, read_json_lines, JsonlAuditLog};
pub use memory::MemoryStore;
pub use store::{AuditLog, ContentStore};
