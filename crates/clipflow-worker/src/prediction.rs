//! Engagement forecasts for finished clips.
//!
//! A heuristic model: a base view count scaled by clip quality, length,
//! category and how early the hook lands, then projected over fixed
//! horizons. The forecast orders the publish batch and picks the strongest
//! hour inside the next posting window.

use chrono::{Duration as ChronoDuration, Timelike};
use serde::Serialize;

use clipflow_models::{ClipCategory, ProcessedClip, RankedClip};

use crate::publish::{offset_for, PublishDecision, PUBLISH_WINDOWS};

/// Relative audience activity by local hour. Hours not listed weigh 1.0.
pub const HOUR_WEIGHTS: [(u32, f64); 11] = [
    (6, 1.2),
    (7, 1.3),
    (8, 1.4),
    (12, 1.5),
    (13, 1.4),
    (14, 1.3),
    (18, 1.8),
    (19, 1.9),
    (20, 1.7),
    (21, 1.5),
    (22, 1.2),
];

const BASE_VIEWS: f64 = 10_000.0;
const LIKE_RATE: f64 = 0.08;
const SHARE_RATE: f64 = 0.02;
const VIRAL_BASE: f64 = 0.15;
const VIRAL_CAP: f64 = 0.95;
const CONFIDENCE: f64 = 0.75;

/// What the model looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipFeatures {
    /// Selection score in `[0, 1]`
    pub score: f64,
    pub duration_secs: f64,
    pub category: Option<ClipCategory>,
    /// Offset of the clip into its source
    pub start_secs: Option<f64>,
}

impl ClipFeatures {
    pub fn from_ranked(ranked: &RankedClip) -> Self {
        Self {
            score: ranked.score,
            duration_secs: ranked.candidate.duration(),
            category: Some(ranked.candidate.category),
            start_secs: Some(ranked.candidate.start),
        }
    }

    /// Features of a processed clip; category and start come from its
    /// ranking when known.
    pub fn from_processed(clip: &ProcessedClip, ranked: Option<&RankedClip>) -> Self {
        Self {
            score: clip.score,
            duration_secs: clip.duration_secs,
            category: ranked.map(|r| r.candidate.category),
            start_secs: ranked.map(|r| r.candidate.start),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewForecast {
    pub first_hour: u64,
    pub first_day: u64,
    pub first_week: u64,
    pub first_month: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementForecast {
    pub views: ViewForecast,
    pub like_rate: f64,
    pub likes_first_week: u64,
    pub share_rate: f64,
    pub shares_first_week: u64,
    /// Chance the clip breaks out, capped below certainty
    pub viral_probability: f64,
    /// Product of the category and hook multipliers
    pub multiplier: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct EngagementPredictor {
    hour_weights: Vec<(u32, f64)>,
}

impl Default for EngagementPredictor {
    fn default() -> Self {
        Self::new(HOUR_WEIGHTS.to_vec())
    }
}

impl EngagementPredictor {
    pub fn new(hour_weights: Vec<(u32, f64)>) -> Self {
        Self { hour_weights }
    }

    pub fn predict(&self, features: &ClipFeatures) -> EngagementForecast {
        let base = base_views(features);
        let multiplier = pattern_multiplier(features);
        let day = base * multiplier;
        let week = day * 5.0;

        EngagementForecast {
            views: ViewForecast {
                first_hour: (day * 0.1) as u64,
                first_day: day as u64,
                first_week: week as u64,
                first_month: (day * 15.0) as u64,
            },
            like_rate: LIKE_RATE * multiplier,
            likes_first_week: (week * LIKE_RATE) as u64,
            share_rate: SHARE_RATE * multiplier,
            shares_first_week: (week * SHARE_RATE) as u64,
            viral_probability: (VIRAL_BASE * multiplier).min(VIRAL_CAP),
            multiplier,
            confidence: CONFIDENCE,
        }
    }

    pub fn hour_weight(&self, hour: u32) -> f64 {
        self.hour_weights
            .iter()
            .find(|(h, _)| *h == hour)
            .map(|(_, w)| *w)
            .unwrap_or(1.0)
    }

    /// The `n` strongest local hours, strongest first.
    pub fn best_hours(&self, n: usize) -> Vec<u32> {
        let mut hours = self.hour_weights.clone();
        hours.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        hours.into_iter().take(n).map(|(h, _)| h).collect()
    }

    /// Strongest hour in `[start, end)`; the earliest one wins a tie.
    pub fn best_hour_in(&self, start: u32, end: u32) -> u32 {
        (start..end).fold(start, |best, hour| {
            if self.hour_weight(hour) > self.hour_weight(best) {
                hour
            } else {
                best
            }
        })
    }

    /// Move a scheduled slot from the start of its posting window to the
    /// window's strongest hour. `Now` is left alone.
    pub fn optimal_slot(&self, decision: PublishDecision, utc_offset_hours: i32) -> PublishDecision {
        let PublishDecision::At(slot) = decision else {
            return decision;
        };
        let hour = slot.with_timezone(&offset_for(utc_offset_hours)).hour();
        let Some((start, end)) = PUBLISH_WINDOWS.iter().find(|(s, e)| hour >= *s && hour < *e)
        else {
            return decision;
        };
        let best = self.best_hour_in(*start, *end);
        PublishDecision::At(slot + ChronoDuration::hours(i64::from(best.saturating_sub(hour))))
    }

    /// Sort clips so the highest forecast first-day views publish first.
    /// Equal forecasts keep their incoming order.
    pub fn order_for_publish<T>(&self, clips: &mut [(T, EngagementForecast)]) {
        clips.sort_by(|a, b| b.1.views.first_day.cmp(&a.1.views.first_day));
    }
}

fn base_views(features: &ClipFeatures) -> f64 {
    let mut views = BASE_VIEWS;
    if features.score > 0.8 {
        views *= 2.0;
    } else if features.score > 0.6 {
        views *= 1.5;
    }
    if (15.0..=30.0).contains(&features.duration_secs) {
        views *= 1.3;
    }
    views
}

fn pattern_multiplier(features: &ClipFeatures) -> f64 {
    let mut multiplier = 1.0;
    if features.category == Some(ClipCategory::EnergyPeak) {
        multiplier *= 1.4;
    }
    // Hook inside the first five seconds of the source
    if features.start_secs.is_some_and(|s| s < 5.0) {
        multiplier *= 1.2;
    }
    multiplier
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use clipflow_models::{ClipCandidate, ContentId};

    fn features(score: f64, duration: f64) -> ClipFeatures {
        ClipFeatures {
            score,
            duration_secs: duration,
            category: None,
            start_secs: None,
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, 0, 0).unwrap()
    }

    #[test]
    fn test_plain_clip_gets_base_forecast() {
        let forecast = EngagementPredictor::default().predict(&features(0.5, 45.0));
        assert_eq!(
            forecast.views,
            ViewForecast {
                first_hour: 1_000,
                first_day: 10_000,
                first_week: 50_000,
                first_month: 150_000,
            }
        );
        assert_eq!(forecast.likes_first_week, 4_000);
        assert_eq!(forecast.shares_first_week, 1_000);
        assert!((forecast.viral_probability - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_quality_length_and_hook_multiply() {
        let ranked = RankedClip {
            candidate: ClipCandidate::new(
                ContentId::new(),
                2.0,
                22.0,
                ClipCategory::EnergyPeak,
                0.9,
            ),
            score: 0.85,
            reasons: Vec::new(),
            rank: 1,
        };
        let forecast = EngagementPredictor::default().predict(&ClipFeatures::from_ranked(&ranked));

        // 10k * 2 (score) * 1.3 (length), then * 1.4 (energy) * 1.2 (early hook)
        assert!((forecast.multiplier - 1.68).abs() < 1e-9);
        assert!(forecast.views.first_day.abs_diff(43_680) <= 1);
        assert!((forecast.viral_probability - 0.252).abs() < 1e-9);
    }

    #[test]
    fn test_viral_probability_is_capped() {
        let predictor = EngagementPredictor::new(HOUR_WEIGHTS.to_vec());
        let mut f = features(0.9, 20.0);
        f.category = Some(ClipCategory::EnergyPeak);
        f.start_secs = Some(0.0);
        let forecast = predictor.predict(&f);
        assert!(forecast.viral_probability <= VIRAL_CAP);
    }

    #[test]
    fn test_best_hours() {
        let predictor = EngagementPredictor::default();
        assert_eq!(predictor.best_hours(3), vec![19, 18, 20]);
        assert_eq!(predictor.best_hour_in(6, 10), 8);
        assert_eq!(predictor.best_hour_in(19, 23), 19);
        assert_eq!(predictor.best_hour_in(0, 3), 0);
    }

    #[test]
    fn test_optimal_slot_moves_within_window() {
        let predictor = EngagementPredictor::default();
        assert_eq!(
            predictor.optimal_slot(PublishDecision::At(at(6)), 0),
            PublishDecision::At(at(8))
        );
        assert_eq!(
            predictor.optimal_slot(PublishDecision::At(at(19)), 0),
            PublishDecision::At(at(19))
        );
        assert_eq!(
            predictor.optimal_slot(PublishDecision::Now, 0),
            PublishDecision::Now
        );
        // 11:00 UTC is 06:00 at UTC-5; the best morning hour is 08:00 local
        assert_eq!(
            predictor.optimal_slot(PublishDecision::At(at(11)), -5),
            PublishDecision::At(at(13))
        );
    }

    #[test]
    fn test_order_for_publish() {
        let predictor = EngagementPredictor::default();
        let mut clips = vec![
            ("plain", predictor.predict(&features(0.5, 45.0))),
            ("strong", predictor.predict(&features(0.9, 20.0))),
            ("also_plain", predictor.predict(&features(0.5, 45.0))),
        ];
        predictor.order_for_publish(&mut clips);
        let order: Vec<_> = clips.iter().map(|(name, _)| *name).collect();
        assert_eq!(order, vec!["strong", "plain", "also_plain"]);
    }
}
