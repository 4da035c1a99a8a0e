//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use clipflow_models::{ErrorTier, Stage};

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    // Recovery
    pub const ERRORS_TOTAL: &str = "clipflow_errors_total";
    pub const RECOVERIES_TOTAL: &str = "clipflow_recoveries_total";

    // Acquisition
    pub const ACQUISITION_ATTEMPTS_TOTAL: &str = "clipflow_acquisition_attempts_total";
    pub const ACQUISITIONS_TOTAL: &str = "clipflow_acquisitions_total";
    pub const ACQUISITION_DURATION_SECONDS: &str = "clipflow_acquisition_duration_seconds";
    pub const MANUAL_QUEUE_SIZE: &str = "clipflow_manual_queue_size";

    // Pipeline
    pub const ITEMS_DISCOVERED_TOTAL: &str = "clipflow_items_discovered_total";
    pub const ITEMS_FINISHED_TOTAL: &str = "clipflow_items_finished_total";
    pub const CLIPS_PROCESSED_TOTAL: &str = "clipflow_clips_processed_total";
    pub const CLIPS_PUBLISHED_TOTAL: &str = "clipflow_clips_published_total";
}

pub fn record_error(tier: ErrorTier, stage: Stage) {
    let labels = [
        ("tier", tier.as_str().to_string()),
        ("stage", stage.as_str().to_string()),
    ];
    counter!(names::ERRORS_TOTAL, &labels).increment(1);
}

pub fn record_recovery(tier: ErrorTier, stage: Stage) {
    let labels = [
        ("tier", tier.as_str().to_string()),
        ("stage", stage.as_str().to_string()),
    ];
    counter!(names::RECOVERIES_TOTAL, &labels).increment(1);
}

pub fn record_attempt(strategy: &str, succeeded: bool) {
    let labels = [
        ("strategy", strategy.to_string()),
        ("outcome", outcome_label(succeeded).to_string()),
    ];
    counter!(names::ACQUISITION_ATTEMPTS_TOTAL, &labels).increment(1);
}

/// Record a finished acquisition; `strategy` is `manual_queue` on exhaustion.
pub fn record_acquisition(strategy: &str, succeeded: bool, duration_secs: f64) {
    let labels = [
        ("strategy", strategy.to_string()),
        ("outcome", outcome_label(succeeded).to_string()),
    ];
    counter!(names::ACQUISITIONS_TOTAL, &labels).increment(1);
    histogram!(names::ACQUISITION_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn set_manual_queue_size(size: usize) {
    gauge!(names::MANUAL_QUEUE_SIZE).set(size as f64);
}

pub fn record_discovered(count: usize) {
    counter!(names::ITEMS_DISCOVERED_TOTAL).increment(count as u64);
}

/// Record an item leaving the processing loop in `state`.
pub fn record_item_finished(state: &str) {
    let labels = [("state", state.to_string())];
    counter!(names::ITEMS_FINISHED_TOTAL, &labels).increment(1);
}

pub fn record_clip_processed(degraded: bool) {
    let labels = [("degraded", degraded.to_string())];
    counter!(names::CLIPS_PROCESSED_TOTAL, &labels).increment(1);
}

pub fn record_clip_published(status: &str) {
    let labels = [("status", status.to_string())];
    counter!(names::CLIPS_PUBLISHED_TOTAL, &labels).increment(1);
}

fn outcome_label(succeeded: bool) -> &'static str {
    if succeeded {
        "success"
    } else {
        "failure"
    }
}
