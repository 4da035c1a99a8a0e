//! Energy peak detection.
//!
//! The interval detector is a placeholder heuristic; the motion detector
//! uses the sampled frame differences. Both honor the same contract: peaks
//! ordered by timestamp, each with a strength in `[0, 1]`.

use serde::{Deserialize, Serialize};

use super::frames::{frame_difference, GrayFrame};

/// A moment of high energy in the asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyPeak {
    /// Time in seconds
    pub timestamp: f64,
    /// Relative strength in `[0, 1]`
    pub strength: f64,
}

/// Swappable energy peak detector.
pub trait EnergyDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Peaks ordered by timestamp.
    fn detect(&self, duration: f64, frames: &[GrayFrame]) -> Vec<EnergyPeak>;
}

/// Fixed-interval peaks: every `step` seconds from `first`, skipping the
/// final `tail_margin` seconds.
#[derive(Debug, Clone)]
pub struct IntervalEnergyDetector {
    pub first: f64,
    pub step: f64,
    pub tail_margin: f64,
}

impl Default for IntervalEnergyDetector {
    fn default() -> Self {
        Self {
            first: 5.0,
            step: 10.0,
            tail_margin: 10.0,
        }
    }
}

impl EnergyDetector for IntervalEnergyDetector {
    fn name(&self) -> &'static str {
        "interval"
    }

    fn detect(&self, duration: f64, _frames: &[GrayFrame]) -> Vec<EnergyPeak> {
        if self.step <= 0.0 {
            return Vec::new();
        }
        let mut peaks = Vec::new();
        let mut t = self.first;
        while t < duration - self.tail_margin {
            peaks.push(EnergyPeak {
                timestamp: t,
                strength: 1.0,
            });
            t += self.step;
        }
        peaks
    }
}

/// Local maxima of frame-to-frame motion above the asset's mean motion.
#[derive(Debug, Clone)]
pub struct MotionEnergyDetector {
    /// Minimum spacing between reported peaks, in seconds
    pub min_spacing: f64,
    pub tail_margin: f64,
}

impl Default for MotionEnergyDetector {
    fn default() -> Self {
        Self {
            min_spacing: 5.0,
            tail_margin: 10.0,
        }
    }
}

impl EnergyDetector for MotionEnergyDetector {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn detect(&self, duration: f64, frames: &[GrayFrame]) -> Vec<EnergyPeak> {
        let motion: Vec<(f64, f64)> = frames
            .windows(2)
            .map(|w| (w[1].timestamp, frame_difference(&w[0], &w[1])))
            .collect();
        if motion.len() < 3 {
            return Vec::new();
        }

        let mean = motion.iter().map(|(_, m)| m).sum::<f64>() / motion.len() as f64;
        let max = motion.iter().map(|(_, m)| *m).fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return Vec::new();
        }

        let mut peaks: Vec<EnergyPeak> = Vec::new();
        for i in 1..motion.len() - 1 {
            let (ts, m) = motion[i];
            let is_local_max = m >= motion[i - 1].1 && m > motion[i + 1].1;
            if !is_local_max || m <= mean || ts >= duration - self.tail_margin {
                continue;
            }
            if let Some(last) = peaks.last() {
                if ts - last.timestamp < self.min_spacing {
                    continue;
                }
            }
            peaks.push(EnergyPeak {
                timestamp: ts,
                strength: (m / max).clamp(0.0, 1.0),
            });
        }
        peaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_detector_matches_reference_heuristic() {
        let peaks = IntervalEnergyDetector::default().detect(60.0, &[]);
        let ts: Vec<f64> = peaks.iter().map(|p| p.timestamp).collect();
        assert_eq!(ts, vec![5.0, 15.0, 25.0, 35.0, 45.0]);
    }

    #[test]
    fn test_interval_detector_short_asset() {
        assert!(IntervalEnergyDetector::default().detect(12.0, &[]).is_empty());
    }

    #[test]
    fn test_motion_detector_finds_spike() {
        let frames: Vec<GrayFrame> = (0..40)
            .map(|i| GrayFrame {
                timestamp: i as f64,
                pixels: vec![if i < 12 { 10 } else { 200 }; 8],
            })
            .collect();
        let peaks = MotionEnergyDetector::default().detect(40.0, &frames);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].timestamp, 12.0);
        assert_eq!(peaks[0].strength, 1.0);
    }
}
