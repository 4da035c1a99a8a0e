//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during acquisition, analysis and composition.
///
/// Display strings are what the recovery layer classifies on, so they keep
/// the vocabulary of the failure (timed out, rate limit, not found, ...).
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH (dependency missing)")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH (dependency missing)")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH (dependency missing)")]
    YtDlpNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Download failed via {strategy}: {message}")]
    DownloadFailed { strategy: String, message: String },

    #[error("Strategy {strategy} unavailable: {reason}")]
    StrategyUnavailable { strategy: String, reason: String },

    #[error("Frame access failed: {0}")]
    FrameAccess(String),

    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            strategy: strategy.into(),
            message: message.into(),
        }
    }

    /// Create a strategy-unavailable error.
    pub fn strategy_unavailable(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StrategyUnavailable {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }

    /// Create a frame access error.
    pub fn frame_access(message: impl Into<String>) -> Self {
        Self::FrameAccess(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
