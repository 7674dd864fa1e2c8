// src/session.rs - Detection session: countdown, timed matching window, confirmed detections
//
// The session is a plain state machine driven by the caller's clock. Every
// transition takes `now`, so the same code runs under the tokio driver and
// under tests with hand-picked instants.
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consensus::{ConsensusConfig, ConsensusFilter, CooldownGate};
use crate::error::StartError;
use crate::landmarks::HandObservation;
use crate::matcher::{MatchMetrics, MatcherConfig, SignMatcher};
use crate::signs::ReferenceSign;

pub const COUNTDOWN_SECONDS: u32 = 3;
pub const COUNTDOWN_TICK_MS: u64 = 1000;
pub const DETECTION_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub countdown_seconds: u32,
    pub countdown_tick_ms: u64,
    pub detection_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_seconds: COUNTDOWN_SECONDS,
            countdown_tick_ms: COUNTDOWN_TICK_MS,
            detection_timeout_ms: DETECTION_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    fn tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub sign: ReferenceSign,
    pub confidence: f64,
    pub timestamp: DateTime<Local>,
}

/// Public view of where the session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Countdown { remaining: u32 },
    Active,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Seconds left before matching starts.
    Countdown(u32),
    Activated,
    Detected(DetectionResult),
    TimedOut,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Countdown { remaining: u32, next_tick: Instant },
    Active { expires_at: Instant },
}

pub struct DetectionSession {
    config: SessionConfig,
    phase: Phase,
    matcher: SignMatcher,
    gate: CooldownGate,
    consensus: ConsensusFilter,
    library: Arc<[ReferenceSign]>,
    displayed: Option<DetectionResult>,
    last_confidence: f64,
    wall_clock: fn() -> DateTime<Local>,
}

impl Default for DetectionSession {
    fn default() -> Self {
        Self::new(
            SessionConfig::default(),
            MatcherConfig::default(),
            ConsensusConfig::default(),
        )
    }
}

impl DetectionSession {
    pub fn new(config: SessionConfig, matcher: MatcherConfig, consensus: ConsensusConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            matcher: SignMatcher::new(matcher),
            gate: CooldownGate::new(consensus.cooldown()),
            consensus: ConsensusFilter::new(&consensus),
            library: Arc::from(Vec::new()),
            displayed: None,
            last_confidence: 0.0,
            wall_clock: Local::now,
        }
    }

    /// Replaces the clock that stamps [`DetectionResult::timestamp`].
    ///
    /// Transitions run on the `Instant` passed to each call; only the
    /// wall-clock stamp on a confirmed detection comes from here.
    pub fn with_wall_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.wall_clock = clock;
        self
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Countdown { remaining, .. } => SessionState::Countdown { remaining },
            Phase::Active { .. } => SessionState::Active,
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// The confirmed detection currently on screen, until dismissed.
    pub fn displayed(&self) -> Option<&DetectionResult> {
        self.displayed.as_ref()
    }

    /// Best similarity from the most recent evaluation, detected or not.
    pub fn last_confidence(&self) -> f64 {
        self.last_confidence
    }

    pub fn metrics(&self) -> &MatchMetrics {
        self.matcher.metrics()
    }

    /// When the caller should next call [`tick`](Self::tick), if anything is scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Idle => None,
            Phase::Countdown { next_tick, .. } => Some(next_tick),
            Phase::Active { expires_at } => Some(expires_at),
        }
    }

    /// Begins the countdown against a snapshot of the library.
    ///
    /// Ignored while a countdown or matching window is already running.
    /// Starting again replaces any detection still on display.
    pub fn start(
        &mut self,
        now: Instant,
        detector_loaded: bool,
        library: Arc<[ReferenceSign]>,
    ) -> Result<Vec<SessionEvent>, StartError> {
        if self.is_running() {
            debug!("Start ignored, session already {:?}", self.state());
            return Ok(Vec::new());
        }
        if !detector_loaded {
            warn!("Refusing to start: hand detector not loaded");
            return Err(StartError::DetectorNotLoaded);
        }
        if library.is_empty() {
            warn!("Refusing to start: no reference signs");
            return Err(StartError::EmptyLibrary);
        }

        self.library = library;
        self.displayed = None;
        self.last_confidence = 0.0;
        info!("Detection starting in {}s against {} sign(s)", self.config.countdown_seconds, self.library.len());

        if self.config.countdown_seconds == 0 {
            return Ok(vec![self.activate(now)]);
        }

        self.phase = Phase::Countdown {
            remaining: self.config.countdown_seconds,
            next_tick: now + self.config.tick(),
        };
        Ok(vec![SessionEvent::Countdown(self.config.countdown_seconds)])
    }

    /// Applies every countdown tick and timeout that is due at `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        loop {
            match self.phase {
                Phase::Countdown { remaining, next_tick } if now >= next_tick => {
                    let remaining = remaining.saturating_sub(1);
                    if remaining == 0 {
                        events.push(self.activate(next_tick));
                    } else {
                        self.phase = Phase::Countdown {
                            remaining,
                            next_tick: next_tick + self.config.tick(),
                        };
                        events.push(SessionEvent::Countdown(remaining));
                    }
                }
                Phase::Active { expires_at } if now >= expires_at => {
                    info!("No sign confirmed within {}ms", self.config.detection_timeout_ms);
                    self.reset_to_idle();
                    events.push(SessionEvent::TimedOut);
                }
                _ => return events,
            }
        }
    }

    /// Feeds one detector frame through the cooldown gate, matcher and consensus filter.
    pub fn on_frame(&mut self, now: Instant, observations: &[HandObservation]) -> Vec<SessionEvent> {
        let mut events = self.tick(now);

        if !matches!(self.phase, Phase::Active { .. }) || self.displayed.is_some() {
            return events;
        }
        if !self.gate.try_pass(now) {
            return events;
        }

        let library = Arc::clone(&self.library);
        let outcome = self.matcher.find_match_with_metrics(observations, &library);
        self.last_confidence = outcome.confidence;
        debug!(
            "Evaluated {} hand(s): best {:.3} ({:.2}ms avg)",
            observations.len(),
            outcome.confidence,
            self.matcher.metrics().avg_processing_time * 1000.0
        );

        let Some(candidate) = outcome.candidate() else {
            return events;
        };
        let Some(confirmed) = self.consensus.push(candidate) else {
            return events;
        };

        let Some(sign) = library.iter().find(|s| s.id == confirmed.sign_id) else {
            warn!("Confirmed sign {} is not in the session library", confirmed.sign_id);
            return events;
        };

        let result = DetectionResult {
            sign: sign.clone(),
            confidence: confirmed.confidence,
            timestamp: (self.wall_clock)(),
        };
        info!("Sign \"{}\" detected at {:.1}%", result.sign.name, result.confidence * 100.0);

        self.reset_to_idle();
        self.displayed = Some(result.clone());
        events.push(SessionEvent::Detected(result));
        events
    }

    /// Clears the displayed detection; the session state is untouched.
    pub fn dismiss(&mut self) -> Option<DetectionResult> {
        self.displayed.take()
    }

    /// Cancels any countdown or matching window. Pending deadlines are dropped with it.
    pub fn stop(&mut self) -> Option<SessionEvent> {
        if !self.is_running() {
            return None;
        }
        info!("Detection stopped");
        self.reset_to_idle();
        Some(SessionEvent::Stopped)
    }

    fn activate(&mut self, at: Instant) -> SessionEvent {
        self.consensus.clear();
        self.gate.reset(at);
        self.phase = Phase::Active {
            expires_at: at + self.config.timeout(),
        };
        info!("Detection active for {}ms", self.config.detection_timeout_ms);
        SessionEvent::Activated
    }

    fn reset_to_idle(&mut self) {
        self.phase = Phase::Idle;
        self.consensus.clear();
        self.gate.clear();
    }
}
