//! Frame sampling and scene-boundary detection.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner, STDOUT};
use crate::error::{MediaError, MediaResult};
use crate::probe::get_duration;

/// A downscaled grayscale frame.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayFrame {
    /// Presentation time in seconds
    pub timestamp: f64,
    /// Row-major luma samples (0-255)
    pub pixels: Vec<u8>,
}

/// Source of sampled frames for a media asset.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Duration of the asset in seconds.
    async fn duration(&self, path: &Path) -> MediaResult<f64>;

    /// Frames sampled every `interval_secs`, starting at 0.
    async fn sample_frames(&self, path: &Path, interval_secs: f64) -> MediaResult<Vec<GrayFrame>>;
}

/// Samples frames by piping raw grayscale thumbnails out of FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    width: u32,
    height: u32,
    timeout: Duration,
}

impl Default for FfmpegFrameSource {
    fn default() -> Self {
        Self::new(64, 36)
    }
}

impl FfmpegFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            timeout: Duration::from_secs(600),
        }
    }

    fn frame_len(&self) -> usize {
        (self.width * self.height) as usize
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn duration(&self, path: &Path) -> MediaResult<f64> {
        get_duration(path).await
    }

    async fn sample_frames(&self, path: &Path, interval_secs: f64) -> MediaResult<Vec<GrayFrame>> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let interval = interval_secs.max(0.05);

        let filter = format!(
            "fps=1/{},scale={}:{},format=gray",
            interval, self.width, self.height
        );
        let cmd = FfmpegCommand::new(path, STDOUT)
            .filters(filter, None)
            .flag("-an")
            .opt("-f", "rawvideo");

        let raw = FfmpegRunner::new(self.timeout)
            .run(&cmd)
            .await
            .map_err(|e| MediaError::frame_access(e.to_string()))?;

        let frames = split_frames(&raw, self.frame_len(), interval);
        debug!(
            path = %path.display(),
            frames = frames.len(),
            "Sampled frames"
        );
        Ok(frames)
    }
}

/// Split a raw gray8 stream into frames, dropping a trailing partial frame.
pub(crate) fn split_frames(raw: &[u8], frame_len: usize, interval_secs: f64) -> Vec<GrayFrame> {
    if frame_len == 0 {
        return Vec::new();
    }
    raw.chunks_exact(frame_len)
        .enumerate()
        .map(|(i, chunk)| GrayFrame {
            timestamp: i as f64 * interval_secs,
            pixels: chunk.to_vec(),
        })
        .collect()
}

/// Mean absolute per-pixel difference between two frames, on a 0-255 scale.
pub fn frame_difference(a: &GrayFrame, b: &GrayFrame) -> f64 {
    let n = a.pixels.len().min(b.pixels.len());
    if n == 0 {
        return 0.0;
    }
    let total: u64 = a
        .pixels
        .iter()
        .zip(&b.pixels)
        .map(|(x, y)| (*x as i16 - *y as i16).unsigned_abs() as u64)
        .sum();
    total as f64 / n as f64
}

/// Scene boundaries: 0 plus every sample whose difference to the previous
/// sample exceeds `threshold`.
pub fn detect_scene_boundaries(frames: &[GrayFrame], threshold: f64) -> Vec<f64> {
    let mut boundaries = vec![0.0];
    for pair in frames.windows(2) {
        if frame_difference(&pair[0], &pair[1]) > threshold && pair[1].timestamp > 0.0 {
            boundaries.push(pair[1].timestamp);
        }
    }
    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(ts: f64, value: u8) -> GrayFrame {
        GrayFrame {
            timestamp: ts,
            pixels: vec![value; 16],
        }
    }

    #[test]
    fn test_frame_difference() {
        assert_eq!(frame_difference(&flat(0.0, 10), &flat(1.0, 10)), 0.0);
        assert_eq!(frame_difference(&flat(0.0, 10), &flat(1.0, 60)), 50.0);
        assert_eq!(frame_difference(&flat(0.0, 200), &flat(1.0, 0)), 200.0);
    }

    #[test]
    fn test_boundaries_always_start_at_zero() {
        assert_eq!(detect_scene_boundaries(&[], 30.0), vec![0.0]);
        let frames = vec![flat(0.0, 0), flat(1.0, 0), flat(2.0, 0)];
        assert_eq!(detect_scene_boundaries(&frames, 30.0), vec![0.0]);
    }

    #[test]
    fn test_boundaries_above_threshold_only() {
        let frames = vec![
            flat(0.0, 0),
            flat(1.0, 20),  // diff 20, below
            flat(2.0, 100), // diff 80, cut
            flat(3.0, 100),
            flat(4.0, 131), // diff 31, cut
        ];
        assert_eq!(detect_scene_boundaries(&frames, 30.0), vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_split_frames_drops_partial() {
        let raw = vec![7u8; 16 * 3 + 5];
        let frames = split_frames(&raw, 16, 0.5);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].timestamp, 1.0);
    }
}
