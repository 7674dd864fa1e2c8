// src/similarity.rs - Per-frame landmark similarity
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::landmarks::{normalize, Landmark};

/// Average normalized distance at which two frames stop looking alike at all.
pub const MAX_MEANINGFUL_DISTANCE: f64 = 0.3;
/// Depth estimates from the detector are noisy, so z counts for 10%.
pub const DEPTH_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameScorer {
    pub max_distance: f64,
    pub depth_weight: f64,
}

impl Default for FrameScorer {
    fn default() -> Self {
        Self {
            max_distance: MAX_MEANINGFUL_DISTANCE,
            depth_weight: DEPTH_WEIGHT,
        }
    }
}

impl FrameScorer {
    /// Similarity in [0, 1] between a live point set and a stored one.
    ///
    /// Both sets are normalized independently, then compared point by point.
    /// Pairs that produce a non-finite distance are left out of the average;
    /// if none remain, or the sets differ in length, or either side can't be
    /// normalized, the score is 0.
    pub fn similarity(&self, current: &[Landmark], stored: &[Landmark]) -> f64 {
        if current.len() != stored.len() {
            debug!("Point count mismatch: current={}, stored={}", current.len(), stored.len());
            return 0.0;
        }

        let (Some(current), Some(stored)) = (normalize(current), normalize(stored)) else {
            debug!("Normalization failed, frame not comparable");
            return 0.0;
        };

        let (total, valid) = current
            .iter()
            .zip(&stored)
            .map(|(a, b)| self.point_distance(a, b))
            .filter(|d| d.is_finite())
            .fold((0.0, 0usize), |(total, valid), d| (total + d, valid + 1));

        if valid == 0 {
            return 0.0;
        }

        let avg_distance = total / valid as f64;
        (1.0 - avg_distance / self.max_distance).clamp(0.0, 1.0)
    }

    pub fn point_distance(&self, a: &Landmark, b: &Landmark) -> f64 {
        let d = a - b;
        (d.x * d.x + d.y * d.y + self.depth_weight * d.z * d.z).sqrt()
    }
}

/// Scores with the stock calibration.
pub fn similarity(current: &[Landmark], stored: &[Landmark]) -> f64 {
    FrameScorer::default().similarity(current, stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::open_hand;
    use crate::landmarks::{landmark_from_components, HAND_LANDMARKS};
    use nalgebra::Vector3;

    fn with_depth_offset(points: &[Landmark], dz: f64) -> Vec<Landmark> {
        points.iter().map(|p| p + Vector3::new(0.0, 0.0, dz)).collect()
    }

    #[test]
    fn identical_frames_score_one() {
        let hand = open_hand(0.5, 0.8, 0.3);
        assert_eq!(similarity(&hand, &hand), 1.0);
    }

    #[test]
    fn translated_and_scaled_copy_scores_one() {
        let hand = open_hand(0.5, 0.8, 0.3);
        let moved: Vec<Landmark> = hand
            .iter()
            .map(|p| Vector3::new(p.x * 0.5 + 0.1, p.y * 0.5 + 0.2, p.z))
            .collect();
        assert!((similarity(&hand, &moved) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_symmetric() {
        let a = open_hand(0.5, 0.8, 0.3);
        let mut b = open_hand(0.4, 0.7, 0.2);
        b[8] += Vector3::new(0.03, -0.02, 0.05);
        assert_eq!(similarity(&a, &b), similarity(&b, &a));
    }

    #[test]
    fn depth_offset_falls_off_linearly() {
        let hand = open_hand(0.5, 0.8, 0.3);
        // every point sits sqrt(0.1) * dz away, so avg distance is exactly that
        let dz = 0.075 / DEPTH_WEIGHT.sqrt();
        let score = similarity(&hand, &with_depth_offset(&hand, dz));
        assert!((score - 0.75).abs() < 1e-9, "score was {score}");
    }

    #[test]
    fn distance_beyond_max_scores_zero() {
        let hand = open_hand(0.5, 0.8, 0.3);
        let far = with_depth_offset(&hand, 5.0);
        assert_eq!(similarity(&hand, &far), 0.0);
    }

    #[test]
    fn length_mismatch_scores_zero() {
        let hand = open_hand(0.5, 0.8, 0.3);
        assert_eq!(similarity(&hand, &hand[..20]), 0.0);
    }

    #[test]
    fn degenerate_inputs_stay_in_bounds() {
        let zeros = vec![Vector3::zeros(); HAND_LANDMARKS];
        let hand = open_hand(0.5, 0.8, 0.3);
        for (a, b) in [(&zeros, &zeros), (&zeros, &hand), (&hand, &zeros)] {
            let score = similarity(a, b);
            assert!((0.0..=1.0).contains(&score), "score was {score}");
        }
        assert_eq!(similarity(&[], &[]), 0.0);
    }

    #[test]
    fn malformed_points_are_skipped() {
        let hand = open_hand(0.5, 0.8, 0.3);
        let mut broken = hand.clone();
        broken[3] = landmark_from_components(&[f64::NAN, 0.2, 0.0]);
        broken[12] = landmark_from_components(&[]);
        assert_eq!(similarity(&hand, &broken), 1.0);
    }

    #[test]
    fn unusable_wrist_scores_zero() {
        let hand = open_hand(0.5, 0.8, 0.3);
        let mut broken = hand.clone();
        broken[0] = landmark_from_components(&[0.5]);
        assert_eq!(similarity(&hand, &broken), 0.0);
    }
}
