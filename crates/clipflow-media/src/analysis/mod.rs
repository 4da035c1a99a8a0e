//! Clip analysis: scene boundaries, energy peaks, hook windows and a
//! composite viral-potential score.
//!
//! Frame access and energy detection sit behind traits so the FFmpeg
//! sampler and the placeholder energy heuristic can be replaced without
//! touching candidate generation.

pub mod candidates;
pub mod energy;
pub mod frames;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub use candidates::{generate_candidates, CandidateConfig};
pub use energy::{EnergyDetector, EnergyPeak, IntervalEnergyDetector, MotionEnergyDetector};
pub use frames::{detect_scene_boundaries, frame_difference, FfmpegFrameSource, FrameSource, GrayFrame};

/// A fixed sub-window near the start of the asset that may hook viewers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HookWindow {
    pub start: f64,
    pub end: f64,
    /// Strength in `[0, 1]`
    pub strength: f64,
}

/// Output of [`ClipAnalyzer::analyze`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Duration in seconds
    pub duration: f64,
    /// Ascending, always starting with 0
    pub scene_boundaries: Vec<f64>,
    pub energy_peaks: Vec<EnergyPeak>,
    pub hook_windows: Vec<HookWindow>,
    /// Composite score in `[0, 1]`
    pub viral_score: f64,
    /// Set when frames could not be read; no clips are derivable then
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Result for an asset whose frames could not be accessed.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            duration: 0.0,
            scene_boundaries: Vec::new(),
            energy_peaks: Vec::new(),
            hook_windows: Vec::new(),
            viral_score: 0.0,
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn max_hook_strength(&self) -> f64 {
        self.hook_windows
            .iter()
            .map(|h| h.strength)
            .fold(0.0, f64::max)
    }
}

/// Analyzer parameters.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Seconds between sampled frames
    pub sample_interval_secs: f64,
    /// Mean absolute frame difference (0-255) that marks a cut
    pub scene_threshold: f64,
    /// Hook windows start inside this many leading seconds
    pub hook_horizon_secs: f64,
    pub hook_window_secs: f64,
    pub hook_step_secs: f64,
    /// Scene count at which the scene-density term saturates
    pub scene_saturation: f64,
    /// Peak count at which the energy-density term saturates
    pub peak_saturation: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 1.0,
            scene_threshold: 30.0,
            hook_horizon_secs: 10.0,
            hook_window_secs: 3.0,
            hook_step_secs: 2.0,
            scene_saturation: 10.0,
            peak_saturation: 5.0,
        }
    }
}

impl AnalyzerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sample_interval_secs: std::env::var("ANALYZER_SAMPLE_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sample_interval_secs),
            scene_threshold: std::env::var("ANALYZER_SCENE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.scene_threshold),
            ..defaults
        }
    }
}

/// Derives scene boundaries, energy peaks, hook windows and a viral score.
#[derive(Clone)]
pub struct ClipAnalyzer {
    config: AnalyzerConfig,
    frames: Arc<dyn FrameSource>,
    energy: Arc<dyn EnergyDetector>,
}

impl ClipAnalyzer {
    pub fn new(
        config: AnalyzerConfig,
        frames: Arc<dyn FrameSource>,
        energy: Arc<dyn EnergyDetector>,
    ) -> Self {
        Self {
            config,
            frames,
            energy,
        }
    }

    /// FFmpeg frame sampling with the reference interval energy heuristic.
    pub fn with_defaults(config: AnalyzerConfig) -> Self {
        Self::new(
            config,
            Arc::new(FfmpegFrameSource::default()),
            Arc::new(IntervalEnergyDetector::default()),
        )
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze an asset. Never fails: frame access problems come back as a
    /// result with `error` set and a zero viral score.
    pub async fn analyze(&self, path: &Path) -> AnalysisResult {
        let duration = match self.frames.duration(path).await {
            Ok(d) if d > 0.0 => d,
            Ok(d) => {
                warn!(path = %path.display(), duration = d, "Asset has no usable duration");
                return AnalysisResult::failed(format!("invalid duration {:.2}s", d));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read asset duration");
                return AnalysisResult::failed(e.to_string());
            }
        };

        let frames = match self
            .frames
            .sample_frames(path, self.config.sample_interval_secs)
            .await
        {
            Ok(frames) if !frames.is_empty() => frames,
            Ok(_) => {
                warn!(path = %path.display(), "No frames decoded");
                return AnalysisResult::failed("no frames decoded");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Frame access failed");
                return AnalysisResult::failed(e.to_string());
            }
        };

        let scene_boundaries = detect_scene_boundaries(&frames, self.config.scene_threshold);
        let energy_peaks = self.energy.detect(duration, &frames);
        let hook_windows = self.hook_windows(duration);

        let mut result = AnalysisResult {
            duration,
            scene_boundaries,
            energy_peaks,
            hook_windows,
            viral_score: 0.0,
            error: None,
        };
        result.viral_score = self.viral_score(&result);

        info!(
            path = %path.display(),
            duration = result.duration,
            scenes = result.scene_boundaries.len(),
            peaks = result.energy_peaks.len(),
            detector = self.energy.name(),
            viral_score = result.viral_score,
            "Analysis complete"
        );
        result
    }

    /// Windows every `hook_step_secs` inside the hook horizon. The window
    /// opening the asset is the strongest.
    pub fn hook_windows(&self, duration: f64) -> Vec<HookWindow> {
        let mut windows = Vec::new();
        let step = self.config.hook_step_secs.max(0.1);
        let mut start = 0.0;
        while start < self.config.hook_horizon_secs && start < duration {
            windows.push(HookWindow {
                start,
                end: (start + self.config.hook_window_secs).min(duration),
                strength: if start == 0.0 { 0.8 } else { 0.6 },
            });
            start += step;
        }
        windows
    }

    /// `min(scenes/10, 1)*0.3 + min(peaks/5, 1)*0.4 + max_hook*0.3`
    pub fn viral_score(&self, result: &AnalysisResult) -> f64 {
        let scene_term =
            (result.scene_boundaries.len() as f64 / self.config.scene_saturation).min(1.0);
        let peak_term = (result.energy_peaks.len() as f64 / self.config.peak_saturation).min(1.0);
        let score = scene_term * 0.3 + peak_term * 0.4 + result.max_hook_strength() * 0.3;
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MediaError, MediaResult};
    use async_trait::async_trait;
    use clipflow_models::{ClipCategory, ContentId};

    /// Flat frames with a hard cut at each listed second.
    struct ScriptedFrames {
        duration: f64,
        cuts: Vec<f64>,
    }

    #[async_trait]
    impl FrameSource for ScriptedFrames {
        async fn duration(&self, _path: &Path) -> MediaResult<f64> {
            Ok(self.duration)
        }

        async fn sample_frames(&self, _path: &Path, interval: f64) -> MediaResult<Vec<GrayFrame>> {
            let count = (self.duration / interval) as usize;
            Ok((0..count)
                .map(|i| {
                    let ts = i as f64 * interval;
                    let scene = self.cuts.iter().filter(|c| **c <= ts).count();
                    GrayFrame {
                        timestamp: ts,
                        pixels: vec![if scene % 2 == 0 { 20 } else { 180 }; 16],
                    }
                })
                .collect())
        }
    }

    struct BrokenFrames;

    #[async_trait]
    impl FrameSource for BrokenFrames {
        async fn duration(&self, _path: &Path) -> MediaResult<f64> {
            Ok(42.0)
        }

        async fn sample_frames(&self, _path: &Path, _interval: f64) -> MediaResult<Vec<GrayFrame>> {
            Err(MediaError::frame_access("moov atom not found"))
        }
    }

    struct FixedPeaks(Vec<f64>);

    impl EnergyDetector for FixedPeaks {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&self, _duration: f64, _frames: &[GrayFrame]) -> Vec<EnergyPeak> {
            self.0
                .iter()
                .map(|t| EnergyPeak {
                    timestamp: *t,
                    strength: 1.0,
                })
                .collect()
        }
    }

    fn analyzer(frames: Arc<dyn FrameSource>, energy: Arc<dyn EnergyDetector>) -> ClipAnalyzer {
        ClipAnalyzer::new(AnalyzerConfig::default(), frames, energy)
    }

    #[tokio::test]
    async fn test_two_minute_asset_candidates() {
        let a = analyzer(
            Arc::new(ScriptedFrames {
                duration: 120.0,
                cuts: vec![30.0, 60.0, 90.0],
            }),
            Arc::new(FixedPeaks(vec![15.0, 45.0, 75.0])),
        );
        let result = a.analyze(Path::new("asset.mp4")).await;
        assert_eq!(result.scene_boundaries, vec![0.0, 30.0, 60.0, 90.0]);
        assert_eq!(result.energy_peaks.len(), 3);

        let config = CandidateConfig::default();
        let candidates = generate_candidates(&ContentId::new(), &result, &config);
        let energy = candidates
            .iter()
            .filter(|c| c.category == ClipCategory::EnergyPeak)
            .count();
        let scene = candidates
            .iter()
            .filter(|c| c.category == ClipCategory::SceneBased)
            .count();
        assert!(energy <= 3);
        assert!(scene <= 3);
        assert_eq!(energy + scene, 6);
        for c in &candidates {
            assert!(c.duration() >= config.min_duration && c.duration() <= config.max_duration);
        }
    }

    #[tokio::test]
    async fn test_frame_failure_yields_zero_score() {
        let a = analyzer(Arc::new(BrokenFrames), Arc::new(IntervalEnergyDetector::default()));
        let result = a.analyze(Path::new("broken.mp4")).await;
        assert!(result.is_failed());
        assert_eq!(result.viral_score, 0.0);
        assert!(generate_candidates(&ContentId::new(), &result, &CandidateConfig::default()).is_empty());
    }

    #[test]
    fn test_hook_windows() {
        let a = ClipAnalyzer::with_defaults(AnalyzerConfig::default());
        let hooks = a.hook_windows(60.0);
        let starts: Vec<f64> = hooks.iter().map(|h| h.start).collect();
        assert_eq!(starts, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(hooks[0].strength, 0.8);
        assert!(hooks[1..].iter().all(|h| h.strength == 0.6));
        assert_eq!(hooks[4].end, 11.0);
    }

    #[test]
    fn test_viral_score_formula() {
        let a = ClipAnalyzer::with_defaults(AnalyzerConfig::default());
        let mut r = AnalysisResult::failed("x");
        r.error = None;
        r.scene_boundaries = vec![0.0, 10.0, 20.0, 30.0, 40.0];
        r.energy_peaks = vec![
            EnergyPeak {
                timestamp: 5.0,
                strength: 1.0
            };
            10
        ];
        r.hook_windows = a.hook_windows(60.0);
        // 0.5*0.3 + 1.0*0.4 + 0.8*0.3 = 0.79
        assert!((a.viral_score(&r) - 0.79).abs() < 1e-9);
    }
}
