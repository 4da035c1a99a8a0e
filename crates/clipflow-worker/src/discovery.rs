//! Content discovery adapters.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use clipflow_models::{ContentItem, EngagementMetrics, Platform};

use crate::error::{WorkerError, WorkerResult};

/// Finds candidate content on external platforms.
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn discover(
        &self,
        platforms: &[Platform],
        keywords: &[String],
        limit: usize,
    ) -> WorkerResult<Vec<ContentItem>>;
}

/// One entry of a JSON feed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub platform: Platform,
    pub external_id: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub shares: u64,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

impl FeedEntry {
    fn matches(&self, platforms: &[Platform], keywords: &[String]) -> bool {
        if !platforms.is_empty() && !platforms.contains(&self.platform) {
            return false;
        }
        if keywords.is_empty() {
            return true;
        }
        let title = self.title.to_lowercase();
        keywords.iter().any(|k| {
            let k = k.to_lowercase();
            title.contains(&k) || self.keywords.iter().any(|own| own.to_lowercase() == k)
        })
    }

    fn into_item(self) -> ContentItem {
        let mut item = ContentItem::new(self.platform, self.external_id, self.url, self.title)
            .with_keywords(self.keywords)
            .with_metrics(EngagementMetrics {
                views: self.views,
                likes: self.likes,
                comments: self.comments,
                shares: self.shares,
            });
        if let Some(secs) = self.duration_secs {
            item = item.with_duration(secs);
        }
        item
    }
}

/// Reads discovery results from a JSON array on disk. The file is re-read
/// on every call so an external process can refresh it.
#[derive(Debug, Clone)]
pub struct JsonFeedSource {
    path: PathBuf,
}

impl JsonFeedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ContentSource for JsonFeedSource {
    fn name(&self) -> &'static str {
        "json_feed"
    }

    async fn discover(
        &self,
        platforms: &[Platform],
        keywords: &[String],
        limit: usize,
    ) -> WorkerResult<Vec<ContentItem>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Feed file not found, nothing discovered");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<FeedEntry> = serde_json::from_slice(&raw)
            .map_err(|e| WorkerError::discovery_failed(format!("invalid feed: {}", e)))?;

        let items: Vec<ContentItem> = entries
            .into_iter()
            .filter(|e| e.matches(platforms, keywords))
            .take(limit)
            .map(FeedEntry::into_item)
            .collect();

        debug!(path = %self.path.display(), count = items.len(), "Feed read");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(platform: Platform, id: &str, title: &str) -> FeedEntry {
        FeedEntry {
            platform,
            external_id: id.to_string(),
            url: format!("https://example.com/{}", id),
            title: title.to_string(),
            keywords: vec![],
            views: 1000,
            likes: 100,
            comments: 10,
            shares: 5,
            duration_secs: Some(60.0),
        }
    }

    async fn write_feed(entries: &[FeedEntry]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        tokio::fs::write(&path, serde_json::to_vec(entries).unwrap())
            .await
            .unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_filters_platform_keyword_and_limit() {
        let (_dir, path) = write_feed(&[
            entry(Platform::Youtube, "a", "Core workout"),
            entry(Platform::Tiktok, "b", "HIIT core blast"),
            entry(Platform::Instagram, "c", "Core stretch"),
            entry(Platform::Youtube, "d", "Leg day"),
            entry(Platform::Youtube, "e", "Another core session"),
        ])
        .await;
        let source = JsonFeedSource::new(&path);

        let items = source
            .discover(
                &[Platform::Youtube, Platform::Tiktok],
                &["core".to_string()],
                2,
            )
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.external_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(items[0].metrics.views, 1000);
        assert_eq!(items[0].duration_secs, Some(60.0));
    }

    #[tokio::test]
    async fn test_missing_feed_is_empty() {
        let source = JsonFeedSource::new("/nonexistent/feed.json");
        let items = source.discover(&[], &[], 20).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_feed_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let err = JsonFeedSource::new(&path)
            .discover(&[], &[], 20)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::DiscoveryFailed(_)));
    }
}
