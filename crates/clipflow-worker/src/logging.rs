//! Per-item log lines.
//!
//! Every event carries the item's external ID, platform and current stage,
//! so one item can be followed from intake through acquisition to its
//! clips. Strategy names and error tiers are recorded as fields, never
//! folded into the message.

use std::fmt::Display;

use tracing::{error, info, warn, Span};

use clipflow_models::{ContentItem, ErrorTier, Platform, Stage};

#[derive(Debug, Clone)]
pub struct ItemLogger {
    external_id: String,
    platform: Platform,
    stage: Stage,
}

impl ItemLogger {
    pub fn new(item: &ContentItem, stage: Stage) -> Self {
        Self {
            external_id: item.external_id.clone(),
            platform: item.platform,
            stage,
        }
    }

    /// Same item, next stage.
    pub fn for_stage(&self, stage: Stage) -> Self {
        Self {
            stage,
            ..self.clone()
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn started(&self, detail: &str) {
        info!(
            external_id = %self.external_id,
            platform = self.platform.as_str(),
            stage = self.stage.as_str(),
            detail,
            "Stage started"
        );
    }

    pub fn completed(&self, detail: &str) {
        info!(
            external_id = %self.external_id,
            platform = self.platform.as_str(),
            stage = self.stage.as_str(),
            detail,
            "Stage completed"
        );
    }

    pub fn acquired(&self, strategy: &str, attempt: u32, size_bytes: u64, success_rate: f64) {
        info!(
            external_id = %self.external_id,
            platform = self.platform.as_str(),
            strategy,
            attempt,
            size_bytes,
            success_rate,
            "Acquired"
        );
    }

    pub fn attempt_failed(
        &self,
        strategy: &str,
        attempt: u32,
        max_tries: u32,
        tier: ErrorTier,
        error: &str,
    ) {
        warn!(
            external_id = %self.external_id,
            platform = self.platform.as_str(),
            strategy,
            attempt,
            max_tries,
            tier = tier.as_str(),
            error,
            "Acquisition try failed"
        );
    }

    /// Every strategy was tried without success.
    pub fn exhausted(&self, tried: &[String], last_error: Option<&str>) {
        warn!(
            external_id = %self.external_id,
            platform = self.platform.as_str(),
            strategies = ?tried,
            last_error,
            "Acquisition cascade exhausted"
        );
    }

    pub fn aborted(&self, strategy: Option<&str>) {
        warn!(
            external_id = %self.external_id,
            stage = self.stage.as_str(),
            strategy,
            "Shutdown requested, stage abandoned"
        );
    }

    pub fn clip_ready(&self, rank: usize, total: usize, degraded: bool) {
        info!(
            external_id = %self.external_id,
            stage = self.stage.as_str(),
            rank,
            total,
            degraded,
            "Clip ready"
        );
    }

    pub fn clip_skipped(&self, clip_id: &dyn Display, rank: usize) {
        warn!(
            external_id = %self.external_id,
            stage = self.stage.as_str(),
            clip_id = %clip_id,
            rank,
            "Clip skipped"
        );
    }

    /// Final line for one pass of the item through the pipeline.
    pub fn finished(&self, outcome: &str) {
        info!(
            external_id = %self.external_id,
            platform = self.platform.as_str(),
            entry_stage = self.stage.as_str(),
            outcome,
            "Item pass finished"
        );
    }

    pub fn failed(&self, error: &dyn Display) {
        error!(
            external_id = %self.external_id,
            platform = self.platform.as_str(),
            entry_stage = self.stage.as_str(),
            error = %error,
            "Item pass failed"
        );
    }

    /// Span covering one pass of the item.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "item",
            external_id = %self.external_id,
            platform = self.platform.as_str(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn captured(f: impl FnOnce()) -> String {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = capture.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn item() -> ContentItem {
        ContentItem::new(Platform::Tiktok, "vid-9", "https://www.tiktok.com/@a/video/9", "t")
    }

    #[test]
    fn test_for_stage_keeps_item() {
        let logger = ItemLogger::new(&item(), Stage::Acquisition);
        let next = logger.for_stage(Stage::Analysis);
        assert_eq!(logger.stage(), Stage::Acquisition);
        assert_eq!(next.stage(), Stage::Analysis);

        let out = captured(|| next.started("scene scan"));
        assert!(out.contains("vid-9"));
        assert!(out.contains("analysis"));
    }

    #[test]
    fn test_failed_try_records_strategy_and_tier() {
        let logger = ItemLogger::new(&item(), Stage::Acquisition);
        let out = captured(|| {
            logger.attempt_failed("proxy", 2, 3, ErrorTier::Persistent, "HTTP Error 403")
        });

        assert!(out.contains("WARN"));
        assert!(out.contains("proxy"));
        assert!(out.contains("attempt=2"));
        assert!(out.contains("persistent"));
        assert!(out.contains("tiktok"));
    }
}
