//! Clip candidate generation from an analysis result.

use clipflow_models::{ClipCandidate, ClipCategory, ContentId};

use super::AnalysisResult;

/// Candidate generation parameters.
#[derive(Debug, Clone)]
pub struct CandidateConfig {
    /// Shortest allowed clip, seconds
    pub min_duration: f64,
    /// Longest allowed clip, seconds
    pub max_duration: f64,
    /// Seconds kept before an energy peak
    pub peak_lead: f64,
    /// Seconds kept after an energy peak
    pub peak_tail: f64,
    /// Energy peaks considered, strongest first
    pub max_energy_peaks: usize,
    /// Consecutive scene pairs considered
    pub max_scene_pairs: usize,
    pub energy_score: f64,
    pub scene_score: f64,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            min_duration: 15.0,
            max_duration: 60.0,
            peak_lead: 10.0,
            peak_tail: 20.0,
            max_energy_peaks: 5,
            max_scene_pairs: 3,
            energy_score: 0.85,
            scene_score: 0.7,
        }
    }
}

impl CandidateConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_duration: std::env::var("CLIP_MIN_DURATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_duration),
            max_duration: std::env::var("CLIP_MAX_DURATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_duration),
            ..defaults
        }
    }
}

/// Energy-centered candidates followed by scene-segmented candidates.
///
/// Every returned candidate satisfies
/// `min_duration <= end - start <= max_duration`. A failed analysis yields
/// no candidates.
pub fn generate_candidates(
    content_id: &ContentId,
    analysis: &AnalysisResult,
    config: &CandidateConfig,
) -> Vec<ClipCandidate> {
    if analysis.error.is_some() || analysis.duration <= 0.0 {
        return Vec::new();
    }
    let mut out = energy_candidates(content_id, analysis, config);
    out.extend(scene_candidates(content_id, analysis, config));
    out
}

fn energy_candidates(
    content_id: &ContentId,
    analysis: &AnalysisResult,
    config: &CandidateConfig,
) -> Vec<ClipCandidate> {
    let mut peaks = analysis.energy_peaks.clone();
    // Stable: equal strengths keep timestamp order.
    peaks.sort_by(|a, b| b.strength.total_cmp(&a.strength));

    peaks
        .iter()
        .take(config.max_energy_peaks)
        .filter_map(|peak| {
            let start = (peak.timestamp - config.peak_lead).max(0.0);
            let end = (peak.timestamp + config.peak_tail)
                .min(analysis.duration)
                .min(start + config.max_duration);
            bounded(content_id, start, end, ClipCategory::EnergyPeak, config.energy_score, config)
        })
        .collect()
}

fn scene_candidates(
    content_id: &ContentId,
    analysis: &AnalysisResult,
    config: &CandidateConfig,
) -> Vec<ClipCandidate> {
    analysis
        .scene_boundaries
        .windows(2)
        .take(config.max_scene_pairs)
        .filter_map(|pair| {
            let start = pair[0];
            let end = pair[1]
                .min(start + config.max_duration)
                .min(analysis.duration);
            bounded(content_id, start, end, ClipCategory::SceneBased, config.scene_score, config)
        })
        .collect()
}

fn bounded(
    content_id: &ContentId,
    start: f64,
    end: f64,
    category: ClipCategory,
    score: f64,
    config: &CandidateConfig,
) -> Option<ClipCandidate> {
    let duration = end - start;
    if duration < config.min_duration || duration > config.max_duration {
        return None;
    }
    Some(ClipCandidate::new(content_id.clone(), start, end, category, score))
}
