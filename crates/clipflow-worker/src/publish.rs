//! Publish scheduling and the publish collaborator.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Offset, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use clipflow_models::{CaptionMetadata, ClipId, ProcessedClip};
use clipflow_storage::append_json_line;

use crate::error::{WorkerError, WorkerResult};

/// Local-time posting windows as `[start, end)` hours.
pub const PUBLISH_WINDOWS: [(u32, u32); 2] = [(6, 10), (19, 23)];

/// Whether to post now or at a later slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDecision {
    Now,
    At(DateTime<Utc>),
}

pub(crate) fn offset_for(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours.saturating_mul(3600)).unwrap_or_else(|| Utc.fix())
}

/// Now if `now` falls inside a posting window in the given UTC offset,
/// otherwise the start of the next window.
pub fn next_publish_slot(now: DateTime<Utc>, utc_offset_hours: i32) -> PublishDecision {
    let offset = offset_for(utc_offset_hours);
    let local = now.with_timezone(&offset);
    let hour = local.hour();

    if PUBLISH_WINDOWS
        .iter()
        .any(|(start, end)| hour >= *start && hour < *end)
    {
        return PublishDecision::Now;
    }

    let (day, start_hour) = match PUBLISH_WINDOWS.iter().find(|(start, _)| hour < *start) {
        Some((start, _)) => (local.date_naive(), *start),
        None => (
            local.date_naive() + ChronoDuration::days(1),
            PUBLISH_WINDOWS[0].0,
        ),
    };

    day.and_hms_opt(start_hour, 0, 0)
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|slot| PublishDecision::At(slot.with_timezone(&Utc)))
        .unwrap_or(PublishDecision::Now)
}

/// Hands finished clips to a platform.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Post immediately. Returns the platform post id.
    async fn publish(&self, clip: &ProcessedClip, caption: &CaptionMetadata) -> WorkerResult<String>;

    /// Schedule a post. Returns a scheduling reference.
    async fn schedule(
        &self,
        clip: &ProcessedClip,
        caption: &CaptionMetadata,
        at: DateTime<Utc>,
    ) -> WorkerResult<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishAction {
    Published,
    Scheduled,
}

/// One line of the publish log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRecord {
    pub reference: String,
    pub action: PublishAction,
    pub clip_id: ClipId,
    pub output: PathBuf,
    pub caption: CaptionMetadata,
    pub at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

/// Records publish decisions to a JSON-lines file instead of a platform.
#[derive(Debug, Clone)]
pub struct LogPublisher {
    path: PathBuf,
}

impl LogPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn write(
        &self,
        action: PublishAction,
        clip: &ProcessedClip,
        caption: &CaptionMetadata,
        at: DateTime<Utc>,
    ) -> WorkerResult<String> {
        let record = PublishRecord {
            reference: Uuid::new_v4().to_string(),
            action,
            clip_id: clip.clip_id.clone(),
            output: clip.output.clone(),
            caption: caption.clone(),
            at,
            recorded_at: Utc::now(),
        };
        append_json_line(&self.path, &record)
            .await
            .map_err(|e| WorkerError::publish_failed(e.to_string()))?;
        Ok(record.reference)
    }
}

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, clip: &ProcessedClip, caption: &CaptionMetadata) -> WorkerResult<String> {
        let post_id = self
            .write(PublishAction::Published, clip, caption, Utc::now())
            .await?;
        info!(clip_id = %clip.clip_id, post_id = %post_id, "Clip published");
        Ok(post_id)
    }

    async fn schedule(
        &self,
        clip: &ProcessedClip,
        caption: &CaptionMetadata,
        at: DateTime<Utc>,
    ) -> WorkerResult<String> {
        let reference = self.write(PublishAction::Scheduled, clip, caption, at).await?;
        info!(clip_id = %clip.clip_id, at = %at, "Clip scheduled");
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipflow_models::{CaptionOrigin, ContentId, PublishState};
    use clipflow_storage::read_json_lines;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_inside_window_publishes_now() {
        assert_eq!(next_publish_slot(at(7, 30), 0), PublishDecision::Now);
        assert_eq!(next_publish_slot(at(22, 59), 0), PublishDecision::Now);
    }

    #[test]
    fn test_gap_schedules_next_window() {
        assert_eq!(next_publish_slot(at(12, 0), 0), PublishDecision::At(at(19, 0)));
        assert_eq!(next_publish_slot(at(3, 0), 0), PublishDecision::At(at(6, 0)));
        assert_eq!(next_publish_slot(at(10, 0), 0), PublishDecision::At(at(19, 0)));
    }

    #[test]
    fn test_late_night_rolls_to_tomorrow() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 11, 6, 0, 0).unwrap();
        assert_eq!(next_publish_slot(at(23, 15), 0), PublishDecision::At(expected));
    }

    #[test]
    fn test_offset_is_applied() {
        // 04:00 UTC is 07:00 at UTC+3
        assert_eq!(next_publish_slot(at(4, 0), 3), PublishDecision::Now);
        // 12:00 UTC is 07:00 at UTC-5
        assert_eq!(next_publish_slot(at(12, 0), -5), PublishDecision::Now);
        // 05:00 UTC is 00:00 at UTC-5, next window 06:00 local = 11:00 UTC
        assert_eq!(next_publish_slot(at(5, 0), -5), PublishDecision::At(at(11, 0)));
    }

    #[tokio::test]
    async fn test_log_publisher_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("publish.jsonl");
        let publisher = LogPublisher::new(&path);
        let clip = ProcessedClip {
            clip_id: ClipId::from_string("clip-1"),
            content_id: ContentId::from_string("c1"),
            effects_applied: Vec::new(),
            output: "clip.mp4".into(),
            duration_secs: 20.0,
            size_bytes: 10,
            score: 0.5,
            hook_text: None,
            warning: None,
            publish: PublishState::Pending,
            created_at: Utc::now(),
        };
        let caption = CaptionMetadata {
            title: "t".to_string(),
            description: "d".to_string(),
            hashtags: vec!["#fitness".to_string()],
            hook_text: "h".to_string(),
            call_to_action: "c".to_string(),
            origin: CaptionOrigin::Template,
        };

        let post_id = publisher.publish(&clip, &caption).await.unwrap();
        publisher.schedule(&clip, &caption, at(19, 0)).await.unwrap();

        let rows: Vec<PublishRecord> = read_json_lines(&path).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].reference, post_id);
        assert!(matches!(rows[1].action, PublishAction::Scheduled));
        assert_eq!(rows[1].at, at(19, 0));
    }
}
