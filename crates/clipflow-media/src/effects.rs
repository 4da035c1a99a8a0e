//! Declarative effect composition.
//!
//! [`EffectComposer::apply`] never fails: any problem (unknown effect name,
//! FFmpeg error, timeout) produces a [`ProcessedClip`] that points at the
//! untouched input with an empty effect list and a warning.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use clipflow_models::{ClipId, ContentId, EffectKind, ProcessedClip, PublishState};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{build_effect_chains, ENERGY_SPEED};

/// Fixed output encoding profile.
#[derive(Debug, Clone)]
pub struct EffectProfile {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_bitrate: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub preset: String,
    /// Font for caption overlays; FFmpeg's default font when unset
    pub font_file: Option<String>,
    pub timeout: Duration,
}

impl Default for EffectProfile {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            video_bitrate: "5M".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            preset: "fast".to_string(),
            font_file: None,
            timeout: Duration::from_secs(600),
        }
    }
}

impl EffectProfile {
    /// Create profile from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            video_bitrate: std::env::var("EFFECTS_VIDEO_BITRATE")
                .unwrap_or(defaults.video_bitrate.clone()),
            preset: std::env::var("EFFECTS_PRESET").unwrap_or(defaults.preset.clone()),
            font_file: std::env::var("EFFECTS_FONT_FILE").ok(),
            timeout: Duration::from_secs(
                std::env::var("EFFECTS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            ..defaults
        }
    }
}

/// A cut clip ready for composition.
#[derive(Debug, Clone)]
pub struct ClipAsset {
    pub clip_id: ClipId,
    pub content_id: ContentId,
    pub path: PathBuf,
    pub duration_secs: f64,
    /// Selection score carried through to the processed clip
    pub score: f64,
    /// Caption overlay text
    pub hook_text: Option<String>,
}

/// Applies a canonical-order effect pipeline and re-encodes to the profile.
#[derive(Debug, Clone)]
pub struct EffectComposer {
    profile: EffectProfile,
    output_dir: PathBuf,
}

impl EffectComposer {
    pub fn new(profile: EffectProfile, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile,
            output_dir: output_dir.into(),
        }
    }

    pub fn profile(&self) -> &EffectProfile {
        &self.profile
    }

    /// Apply the named effects. Duplicates collapse and order is canonical
    /// regardless of the order requested.
    pub async fn apply(&self, clip: &ClipAsset, effect_names: &[String]) -> ProcessedClip {
        let effects = match resolve_effects(effect_names) {
            Ok(effects) => effects,
            Err(e) => return self.degraded(clip, e).await,
        };

        if effects.is_empty() {
            return self.passthrough(clip, None).await;
        }

        match self.render(clip, &effects).await {
            Ok(processed) => processed,
            Err(e) => self.degraded(clip, e).await,
        }
    }

    async fn render(&self, clip: &ClipAsset, effects: &[EffectKind]) -> MediaResult<ProcessedClip> {
        if !clip.path.exists() {
            return Err(MediaError::FileNotFound(clip.path.clone()));
        }
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let output = self.output_path(&clip.path, effects);
        let caption_text = clip.hook_text.as_deref().unwrap_or("WATCH THIS");
        let chains = build_effect_chains(
            effects,
            self.profile.width,
            self.profile.height,
            self.profile.fps,
            caption_text,
            self.profile.font_file.as_deref(),
        );

        let profile = &self.profile;
        let cmd = FfmpegCommand::new(&clip.path, &output)
            .filters(chains.video_graph(), chains.audio_graph())
            .opt("-c:v", &profile.video_codec)
            .opt("-b:v", &profile.video_bitrate)
            .opt("-preset", &profile.preset)
            .opt("-r", profile.fps)
            .opt("-c:a", &profile.audio_codec)
            .opt("-b:a", &profile.audio_bitrate)
            .opt("-movflags", "+faststart");

        if let Err(e) = FfmpegRunner::new(profile.timeout).run(&cmd).await {
            discard_partial(&output).await;
            return Err(e);
        }

        let size_bytes = tokio::fs::metadata(&output).await?.len();
        let duration_secs = if effects.contains(&EffectKind::EnergyBoost) {
            clip.duration_secs / ENERGY_SPEED
        } else {
            clip.duration_secs
        };

        info!(
            clip_id = %clip.clip_id,
            output = %output.display(),
            effects = ?effects,
            size_bytes,
            "Effects applied"
        );

        Ok(ProcessedClip {
            clip_id: clip.clip_id.clone(),
            content_id: clip.content_id.clone(),
            effects_applied: effects.to_vec(),
            output,
            duration_secs,
            size_bytes,
            score: clip.score,
            hook_text: clip.hook_text.clone(),
            warning: None,
            publish: PublishState::Pending,
            created_at: Utc::now(),
        })
    }

    async fn degraded(&self, clip: &ClipAsset, error: MediaError) -> ProcessedClip {
        warn!(
            clip_id = %clip.clip_id,
            error = %error,
            "Effect pipeline failed, keeping unmodified clip"
        );
        metrics::counter!("clipflow_effects_degraded_total").increment(1);
        self.passthrough(clip, Some(error.to_string())).await
    }

    async fn passthrough(&self, clip: &ClipAsset, warning: Option<String>) -> ProcessedClip {
        let size_bytes = tokio::fs::metadata(&clip.path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        ProcessedClip {
            clip_id: clip.clip_id.clone(),
            content_id: clip.content_id.clone(),
            effects_applied: Vec::new(),
            output: clip.path.clone(),
            duration_secs: clip.duration_secs,
            size_bytes,
            score: clip.score,
            hook_text: clip.hook_text.clone(),
            warning,
            publish: PublishState::Pending,
            created_at: Utc::now(),
        }
    }

    /// `{stem}_edited_{first three effects}.mp4` in the output directory.
    fn output_path(&self, input: &Path, effects: &[EffectKind]) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "clip".to_string());
        let tag = effects
            .iter()
            .take(3)
            .map(|e| e.as_str())
            .collect::<Vec<_>>()
            .join("_");
        self.output_dir.join(format!("{}_edited_{}.mp4", stem, tag))
    }
}

/// Remove whatever a failed render left at `path`.
async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial render"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial render"),
    }
}

/// Parse, dedupe and order effect names. Any unknown name fails the whole
/// request.
pub fn resolve_effects(names: &[String]) -> MediaResult<Vec<EffectKind>> {
    let mut effects = Vec::with_capacity(names.len());
    for name in names {
        let effect = EffectKind::parse(name).ok_or_else(|| MediaError::UnknownEffect(name.clone()))?;
        if !effects.contains(&effect) {
            effects.push(effect);
        }
    }
    effects.sort();
    Ok(effects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip_at(path: PathBuf) -> ClipAsset {
        ClipAsset {
            clip_id: ClipId::new(),
            content_id: ContentId::new(),
            path,
            duration_secs: 30.0,
            score: 0.9,
            hook_text: Some("WAIT FOR IT".to_string()),
        }
    }

    #[test]
    fn test_resolve_effects_canonical_order() {
        let names: Vec<String> = ["color_grade", "auto_caption", "hook_zoom", "caption"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            resolve_effects(&names).unwrap(),
            vec![EffectKind::HookZoom, EffectKind::Caption, EffectKind::ColorGrade]
        );
    }

    #[tokio::test]
    async fn test_unknown_effect_degrades_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        tokio::fs::write(&input, b"not really a video").await.unwrap();

        let composer = EffectComposer::new(EffectProfile::default(), dir.path().join("out"));
        let clip = clip_at(input.clone());
        let processed = composer
            .apply(&clip, &["nonexistent_effect_that_throws".to_string()])
            .await;

        assert!(processed.effects_applied.is_empty());
        assert_eq!(processed.output, input);
        assert_eq!(processed.size_bytes, 18);
        assert!(processed
            .warning
            .as_deref()
            .unwrap()
            .contains("nonexistent_effect_that_throws"));
    }

    #[tokio::test]
    async fn test_missing_input_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let composer = EffectComposer::new(EffectProfile::default(), dir.path());
        let clip = clip_at(dir.path().join("missing.mp4"));
        let processed = composer.apply(&clip, &["hook_zoom".to_string()]).await;
        assert!(processed.effects_applied.is_empty());
        assert_eq!(processed.output, clip.path);
        assert!(processed.is_degraded());
    }

    #[tokio::test]
    async fn test_failed_render_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        tokio::fs::write(&input, b"not really a video").await.unwrap();

        let out_dir = dir.path().join("out");
        let composer = EffectComposer::new(EffectProfile::default(), &out_dir);
        let output = composer.output_path(&input, &[EffectKind::HookZoom]);
        tokio::fs::create_dir_all(&out_dir).await.unwrap();
        tokio::fs::write(&output, b"half an mp4").await.unwrap();

        let processed = composer
            .apply(&clip_at(input.clone()), &["hook_zoom".to_string()])
            .await;

        assert!(processed.is_degraded());
        assert_eq!(processed.output, input);
        assert!(!output.exists());
    }

    #[test]
    fn test_output_name() {
        let composer = EffectComposer::new(EffectProfile::default(), "/tmp/out");
        let path = composer.output_path(
            Path::new("/work/abc.mp4"),
            &[
                EffectKind::HookZoom,
                EffectKind::Caption,
                EffectKind::EnergyBoost,
                EffectKind::ColorGrade,
            ],
        );
        assert_eq!(
            path,
            PathBuf::from("/tmp/out/abc_edited_hook_zoom_caption_energy_boost.mp4")
        );
    }
}
