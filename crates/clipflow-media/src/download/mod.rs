//! Media acquisition strategies.
//!
//! Each strategy is one way of turning a remote reference into a local file.
//! Ordering, retries and manual-queue fallback are handled by the caller's
//! cascade; a strategy only makes a single try per [`AcquisitionStrategy::attempt`].

pub mod http_api;
pub mod strategies;
pub mod ytdlp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use clipflow_models::{ContentId, LocalAsset, Platform};

use crate::error::MediaResult;

pub use http_api::CobaltApiStrategy;
pub use strategies::{
    youtube_video_id, CookieSessionStrategy, GatewayStrategy, HeaderRotationStrategy,
    ProxyStrategy, DEFAULT_USER_AGENTS,
};
pub use ytdlp::{YtDlpCommand, YtDlpSettings};

/// What to fetch and where to put it.
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub content_id: ContentId,
    pub external_id: String,
    pub platform: Platform,
    pub url: String,
    /// Final location of the downloaded file
    pub output_path: PathBuf,
}

/// One way of acquiring media.
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    /// Stable name used in attempt logs and success patterns.
    fn name(&self) -> &'static str;

    /// Whether this strategy can handle the request at all (configured,
    /// supported platform). Unsupported strategies are skipped without
    /// recording attempts.
    fn supports(&self, _request: &AcquisitionRequest) -> bool {
        true
    }

    /// Make a single try.
    async fn attempt(&self, request: &AcquisitionRequest) -> MediaResult<LocalAsset>;
}

/// Reuse a previously completed download at `path` if it is at least
/// `min_size` bytes; smaller leftovers are removed.
pub async fn existing_asset(path: &Path, min_size: u64) -> Option<LocalAsset> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    if meta.len() >= min_size && meta.len() > 0 {
        info!(path = %path.display(), size = meta.len(), "Using existing video file");
        return Some(LocalAsset::new(path, meta.len(), "existing"));
    }
    warn!(
        path = %path.display(),
        size = meta.len(),
        "Existing file is too small, re-downloading"
    );
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove partial download");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_existing_asset_reuse_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.mp4");
        let small = dir.path().join("small.mp4");
        tokio::fs::write(&big, vec![0u8; 2048]).await.unwrap();
        tokio::fs::write(&small, vec![0u8; 10]).await.unwrap();

        let asset = existing_asset(&big, 1024).await.unwrap();
        assert_eq!(asset.size_bytes, 2048);
        assert_eq!(asset.strategy, "existing");

        assert!(existing_asset(&small, 1024).await.is_none());
        assert!(!small.exists());

        assert!(existing_asset(&dir.path().join("none.mp4"), 1).await.is_none());
    }
}
