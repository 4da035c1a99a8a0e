//! Resilient media acquisition.

pub mod cascade;
pub mod downloader;
pub mod patterns;

pub use cascade::{CascadeEntry, StrategyCascade, StrategyPolicy};
pub use downloader::{AcquireOutcome, AcquisitionStats, CascadeOutcome, ResilientDownloader};
pub use patterns::SuccessPatternLog;
