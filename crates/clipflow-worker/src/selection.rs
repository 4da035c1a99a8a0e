//! Multi-criteria clip ranking.

use std::cmp::Ordering;

use clipflow_models::{ClipCandidate, ClipCategory, RankedClip};

const BASE_WEIGHT: f64 = 0.3;
const ENERGY_BONUS: f64 = 0.2;
const SCENE_BONUS: f64 = 0.1;
const EARLY_START_BONUS: f64 = 0.15;
const EARLY_START_SECS: f64 = 10.0;
const EXCEPTIONAL_BASE: f64 = 0.8;

pub const REASON_ENERGY: &str = "High energy moment detected";
pub const REASON_DURATION: &str = "Optimal duration for engagement";
pub const REASON_HOOK: &str = "Strong hook potential";
pub const REASON_EXCEPTIONAL: &str = "Exceptional viral indicators";

/// Bonus for clip length: short clips score best.
fn duration_bonus(duration: f64) -> f64 {
    if (15.0..=30.0).contains(&duration) {
        0.25
    } else if duration > 30.0 && duration <= 45.0 {
        0.15
    } else if duration > 45.0 && duration <= 60.0 {
        0.10
    } else {
        0.0
    }
}

/// A clip's score and the reasons that contributed to it.
pub fn score_candidate(candidate: &ClipCandidate) -> (f64, Vec<String>) {
    let mut reasons = Vec::new();
    let mut score = candidate.raw_score * BASE_WEIGHT;

    match candidate.category {
        ClipCategory::EnergyPeak => {
            score += ENERGY_BONUS;
            reasons.push(REASON_ENERGY.to_string());
        }
        ClipCategory::SceneBased => score += SCENE_BONUS,
    }

    let duration = candidate.duration();
    score += duration_bonus(duration);
    if (15.0..=30.0).contains(&duration) {
        reasons.push(REASON_DURATION.to_string());
    }

    if candidate.start < EARLY_START_SECS {
        score += EARLY_START_BONUS;
        reasons.push(REASON_HOOK.to_string());
    }

    if candidate.raw_score > EXCEPTIONAL_BASE {
        reasons.push(REASON_EXCEPTIONAL.to_string());
    }

    (score.clamp(0.0, 1.0), reasons)
}

/// Ranks candidates and keeps the best `top_k`.
#[derive(Debug, Clone)]
pub struct ClipSelector {
    top_k: usize,
}

impl Default for ClipSelector {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

impl ClipSelector {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Rank with the configured `top_k`.
    pub fn select(&self, candidates: &[ClipCandidate]) -> Vec<RankedClip> {
        rank(candidates, self.top_k)
    }
}

/// Score, sort descending (stable: ties keep input order) and truncate.
pub fn rank(candidates: &[ClipCandidate], top_k: usize) -> Vec<RankedClip> {
    let mut scored: Vec<(f64, Vec<String>, &ClipCandidate)> = candidates
        .iter()
        .map(|c| {
            let (score, reasons) = score_candidate(c);
            (score, reasons, c)
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    scored
        .into_iter()
        .take(top_k)
        .enumerate()
        .map(|(i, (score, reasons, candidate))| RankedClip {
            candidate: candidate.clone(),
            score,
            reasons,
            rank: i + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipflow_models::ContentId;

    fn candidate(start: f64, end: f64, category: ClipCategory, raw: f64) -> ClipCandidate {
        ClipCandidate::new(ContentId::from_string("c"), start, end, category, raw)
    }

    #[test]
    fn test_score_formula() {
        // 0.3*0.85 + 0.2 + 0.25 + 0.15 = 0.855
        let c = candidate(5.0, 25.0, ClipCategory::EnergyPeak, 0.85);
        let (score, reasons) = score_candidate(&c);
        assert!((score - 0.855).abs() < 1e-9);
        assert_eq!(
            reasons,
            vec![REASON_ENERGY, REASON_DURATION, REASON_HOOK, REASON_EXCEPTIONAL]
        );

        // 0.3*0.7 + 0.1 + 0.15 = 0.46, no early start
        let c = candidate(30.0, 70.0, ClipCategory::SceneBased, 0.7);
        let (score, reasons) = score_candidate(&c);
        assert!((score - 0.46).abs() < 1e-9);
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_duration_bands() {
        assert_eq!(duration_bonus(15.0), 0.25);
        assert_eq!(duration_bonus(30.0), 0.25);
        assert_eq!(duration_bonus(30.5), 0.15);
        assert_eq!(duration_bonus(45.0), 0.15);
        assert_eq!(duration_bonus(60.0), 0.10);
        assert_eq!(duration_bonus(61.0), 0.0);
        assert_eq!(duration_bonus(10.0), 0.0);
    }

    #[test]
    fn test_score_is_clamped() {
        let c = candidate(0.0, 20.0, ClipCategory::EnergyPeak, 1.0);
        let (score, _) = score_candidate(&c);
        assert!(score <= 1.0);
    }

    #[test]
    fn test_rank_returns_higher_base_first() {
        let low = candidate(20.0, 40.0, ClipCategory::SceneBased, 0.6);
        let high = candidate(20.0, 40.0, ClipCategory::SceneBased, 0.9);
        let ranked = rank(&[low, high.clone()], 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id(), &high.id);
        assert_eq!(ranked[0].rank, 1);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let a = candidate(20.0, 40.0, ClipCategory::SceneBased, 0.7);
        let b = candidate(50.0, 70.0, ClipCategory::SceneBased, 0.7);
        let ranked = rank(&[a.clone(), b.clone()], 5);
        assert_eq!(ranked[0].id(), &a.id);
        assert_eq!(ranked[1].id(), &b.id);
    }

    #[test]
    fn test_rank_is_idempotent() {
        let candidates = vec![
            candidate(0.0, 20.0, ClipCategory::EnergyPeak, 0.85),
            candidate(30.0, 60.0, ClipCategory::SceneBased, 0.7),
            candidate(5.0, 35.0, ClipCategory::EnergyPeak, 0.85),
            candidate(60.0, 90.0, ClipCategory::SceneBased, 0.7),
        ];
        let first = rank(&candidates, 3);
        let second = rank(&candidates, 3);
        assert_eq!(first, second);

        let reranked: Vec<ClipCandidate> = first.iter().map(|r| r.candidate.clone()).collect();
        let again = rank(&reranked, 3);
        let ids = |v: &[RankedClip]| v.iter().map(|r| r.id().clone()).collect::<Vec<_>>();
        assert_eq!(ids(&again), ids(&first));
    }

    #[test]
    fn test_selector_uses_top_k() {
        let candidates: Vec<_> = (0..8)
            .map(|i| candidate(i as f64 * 10.0, i as f64 * 10.0 + 20.0, ClipCategory::SceneBased, 0.7))
            .collect();
        assert_eq!(ClipSelector::new(3).select(&candidates).len(), 3);
        assert_eq!(ClipSelector::default().top_k(), 5);
        assert!(rank(&[], 5).is_empty());
    }
}
