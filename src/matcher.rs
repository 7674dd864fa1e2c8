// src/matcher.rs - Matches live hands against every reference sign in a library
use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::landmarks::{HandObservation, Handedness, BOTH_HANDS_LANDMARKS, HAND_LANDMARKS};
use crate::signs::{HandType, ReferenceSign};
use crate::similarity::FrameScorer;

pub const SINGLE_HAND_THRESHOLD: f64 = 0.6;
pub const BOTH_HANDS_THRESHOLD: f64 = 0.6;
/// Lower bar when a two-hand sign could only be compared against one hand.
pub const PARTIAL_BOTH_THRESHOLD: f64 = 0.5;
pub const MISSING_HAND_PENALTY: f64 = 0.8;

const METRICS_WINDOW: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub single_hand_threshold: f64,
    pub both_hands_threshold: f64,
    pub partial_both_threshold: f64,
    pub missing_hand_penalty: f64,
    pub scorer: FrameScorer,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            single_hand_threshold: SINGLE_HAND_THRESHOLD,
            both_hands_threshold: BOTH_HANDS_THRESHOLD,
            partial_both_threshold: PARTIAL_BOTH_THRESHOLD,
            missing_hand_penalty: MISSING_HAND_PENALTY,
            scorer: FrameScorer::default(),
        }
    }
}

/// One detected sample fed to the consensus filter.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub sign_id: String,
    pub sign_name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOutcome<'a> {
    pub detected: bool,
    /// Best similarity found, reported even when nothing cleared the threshold.
    pub confidence: f64,
    pub sign: Option<&'a ReferenceSign>,
}

impl<'a> MatchOutcome<'a> {
    fn not_detected(confidence: f64) -> Self {
        Self {
            detected: false,
            confidence,
            sign: None,
        }
    }

    pub fn sign_name(&self) -> &str {
        self.sign.map(|s| s.name.as_str()).unwrap_or("")
    }

    pub fn candidate(&self) -> Option<MatchCandidate> {
        match (self.detected, self.sign) {
            (true, Some(sign)) => Some(MatchCandidate {
                sign_id: sign.id.clone(),
                sign_name: sign.name.clone(),
                confidence: self.confidence,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchMetrics {
    pub avg_processing_time: f32,
    pub evaluations: u64,
    frame_times: VecDeque<f32>,
}

impl MatchMetrics {
    fn record(&mut self, elapsed: f32) {
        self.evaluations += 1;
        self.frame_times.push_front(elapsed);
        if self.frame_times.len() > METRICS_WINDOW {
            self.frame_times.pop_back();
        }
        self.avg_processing_time =
            self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32;
    }
}

/// Highest-confidence hand on each side.
#[derive(Debug, Clone, Copy, Default)]
struct BestHands<'h> {
    left: Option<&'h HandObservation>,
    right: Option<&'h HandObservation>,
    observed: usize,
}

impl<'h> BestHands<'h> {
    fn select(observations: &'h [HandObservation]) -> Self {
        let mut best = BestHands::default();
        for hand in observations {
            if !hand.is_valid() {
                warn!(
                    "Discarding {:?} hand with {} landmarks (expected {})",
                    hand.handedness,
                    hand.landmarks.len(),
                    HAND_LANDMARKS
                );
                continue;
            }
            best.observed += 1;

            let slot = match hand.handedness {
                Handedness::Left => &mut best.left,
                Handedness::Right => &mut best.right,
            };
            // first seen wins ties
            let replace = slot.map_or(true, |current| {
                hand.detection_confidence > current.detection_confidence
            });
            if replace {
                *slot = Some(hand);
            }
        }
        best
    }
}

pub struct SignMatcher {
    config: MatcherConfig,
    metrics: MatchMetrics,
}

impl Default for SignMatcher {
    fn default() -> Self {
        Self::new(MatcherConfig::default())
    }
}

impl SignMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            metrics: MatchMetrics::default(),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MatchMetrics {
        &self.metrics
    }

    /// Same as [`find_match`](Self::find_match), timing the evaluation into the rolling metrics.
    pub fn find_match_with_metrics<'a>(
        &mut self,
        observations: &[HandObservation],
        library: &'a [ReferenceSign],
    ) -> MatchOutcome<'a> {
        let start = Instant::now();
        let outcome = self.find_match(observations, library);
        self.metrics.record(start.elapsed().as_secs_f32());
        outcome
    }

    /// Finds the library sign that best matches the current hands.
    ///
    /// Each sign is scored against its own frames with a strategy picked by
    /// its hand type; the single best sign across the library (first seen on
    /// ties) is then held against a threshold that depends on whether a
    /// two-hand sign was seen with both hands.
    pub fn find_match<'a>(
        &self,
        observations: &[HandObservation],
        library: &'a [ReferenceSign],
    ) -> MatchOutcome<'a> {
        let hands = BestHands::select(observations);
        if hands.observed == 0 {
            return MatchOutcome::not_detected(0.0);
        }

        let mut best_confidence = 0.0;
        let mut best_sign: Option<&'a ReferenceSign> = None;

        for sign in library {
            let similarity = self.sign_similarity(sign, &hands);
            debug!("Max similarity with \"{}\" ({:?}): {:.3}", sign.name, sign.hand_type, similarity);

            if similarity > best_confidence {
                best_confidence = similarity;
                best_sign = Some(sign);
            }
        }

        let Some(sign) = best_sign else {
            return MatchOutcome::not_detected(0.0);
        };

        let threshold = self.threshold_for(sign.hand_type, hands.observed);
        debug!(
            "Best match \"{}\" at {:.1}% (threshold {:.0}%)",
            sign.name,
            best_confidence * 100.0,
            threshold * 100.0
        );

        if best_confidence > threshold {
            MatchOutcome {
                detected: true,
                confidence: best_confidence,
                sign: Some(sign),
            }
        } else {
            MatchOutcome::not_detected(best_confidence)
        }
    }

    pub fn threshold_for(&self, hand_type: HandType, hands_observed: usize) -> f64 {
        match hand_type {
            HandType::Both if hands_observed >= 2 => self.config.both_hands_threshold,
            HandType::Both => self.config.partial_both_threshold,
            HandType::Left | HandType::Right => self.config.single_hand_threshold,
        }
    }

    fn sign_similarity(&self, sign: &ReferenceSign, hands: &BestHands) -> f64 {
        let scorer = &self.config.scorer;
        let frames = sign.frames();

        match (sign.hand_type, hands.left, hands.right) {
            (HandType::Left, Some(hand), _) | (HandType::Right, _, Some(hand)) => frames
                .iter()
                .map(|frame| scorer.similarity(&hand.landmarks, frame))
                .fold(0.0, f64::max),

            (HandType::Both, Some(left), Some(right)) => {
                let combined: Vec<_> = left
                    .landmarks
                    .iter()
                    .chain(&right.landmarks)
                    .copied()
                    .collect();
                frames
                    .iter()
                    .map(|frame| scorer.similarity(&combined, frame))
                    .fold(0.0, f64::max)
            }

            (HandType::Both, Some(hand), None) | (HandType::Both, None, Some(hand)) => frames
                .iter()
                .filter(|frame| frame.len() >= BOTH_HANDS_LANDMARKS)
                .map(|frame| {
                    let first = scorer.similarity(&hand.landmarks, &frame[..HAND_LANDMARKS]);
                    let second = scorer
                        .similarity(&hand.landmarks, &frame[HAND_LANDMARKS..BOTH_HANDS_LANDMARKS]);
                    first.max(second) * self.config.missing_hand_penalty
                })
                .fold(0.0, f64::max),

            _ => 0.0,
        }
    }
}
