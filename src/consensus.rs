// src/consensus.rs - Cooldown gate and temporal consensus over recent match samples
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::matcher::MatchCandidate;

pub const SAMPLE_CAPACITY: usize = 4;
pub const SAMPLE_THRESHOLD: usize = 2;
pub const DETECTION_COOLDOWN_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub sample_capacity: usize,
    pub sample_threshold: usize,
    pub cooldown_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            sample_capacity: SAMPLE_CAPACITY,
            sample_threshold: SAMPLE_THRESHOLD,
            cooldown_ms: DETECTION_COOLDOWN_MS,
        }
    }
}

impl ConsensusConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Lets the matcher run at most once per cooldown, whatever the detector frame rate.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    cooldown: Duration,
    last: Option<Instant>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last: None }
    }

    /// True, and the window restarts, if a full cooldown has passed since the last pass.
    pub fn try_pass(&mut self, now: Instant) -> bool {
        let open = match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
            None => true,
        };
        if open {
            self.last = Some(now);
        }
        open
    }

    /// Treats `now` as the last pass, so the first evaluation waits a full cooldown.
    pub fn reset(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}

#[derive(Debug, Clone)]
pub struct ConsensusFilter {
    capacity: usize,
    window: usize,
    samples: VecDeque<MatchCandidate>,
}

impl Default for ConsensusFilter {
    fn default() -> Self {
        Self::new(&ConsensusConfig::default())
    }
}

impl ConsensusFilter {
    pub fn new(config: &ConsensusConfig) -> Self {
        let window = config.sample_threshold.max(1);
        let capacity = config.sample_capacity.max(window);
        Self {
            capacity,
            window,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Adds a detected sample and checks the most recent window for a majority sign.
    ///
    /// A sign is confirmed once the window is full and the most frequent name
    /// in it (first occurrence wins ties) appears at least `ceil(window / 2)`
    /// times. The confirmed confidence is the mean over that sign's samples
    /// in the window. Confirming empties the buffer.
    pub fn push(&mut self, sample: MatchCandidate) -> Option<MatchCandidate> {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        if self.samples.len() < self.window {
            return None;
        }

        let recent: Vec<&MatchCandidate> = self
            .samples
            .iter()
            .skip(self.samples.len() - self.window)
            .collect();

        let mut tally: Vec<(&str, usize)> = Vec::new();
        for sample in &recent {
            match tally.iter_mut().find(|(name, _)| *name == sample.sign_name) {
                Some((_, count)) => *count += 1,
                None => tally.push((sample.sign_name.as_str(), 1)),
            }
        }

        let (name, count) = tally
            .iter()
            .copied()
            .reduce(|best, next| if next.1 > best.1 { next } else { best })?;

        let required = self.window.div_ceil(2);
        if count < required {
            debug!("\"{name}\" seen {count}/{} times, need {required}", self.window);
            return None;
        }

        let contributing: Vec<&MatchCandidate> = recent
            .iter()
            .copied()
            .filter(|s| s.sign_name == name)
            .collect();
        let confidence =
            contributing.iter().map(|s| s.confidence).sum::<f64>() / contributing.len() as f64;

        let confirmed = MatchCandidate {
            sign_id: contributing[0].sign_id.clone(),
            sign_name: name.to_string(),
            confidence,
        };
        self.samples.clear();
        Some(confirmed)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
