// src/detector.rs - Hand landmark sources: the detector seam and a recorded-capture replay
use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::landmarks::HandObservation;

/// Produces per-frame hand observations, like a camera feeding a hand-landmark model.
pub trait LandmarkSource {
    /// Whether the underlying detector is ready. Sessions refuse to start otherwise.
    fn is_loaded(&self) -> bool;

    /// The next frame, or `None` when the source is exhausted.
    fn next_frame(&mut self) -> Option<CapturedFrame>;
}

/// One detector result, stamped with its offset from the start of the capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedFrame {
    pub at_ms: u64,
    #[serde(default)]
    pub hands: Vec<HandObservation>,
}

/// Plays back frames recorded to a JSON array of [`CapturedFrame`].
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    frames: VecDeque<CapturedFrame>,
}

impl ReplaySource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        let frames: Vec<CapturedFrame> = serde_json::from_str(&data)
            .with_context(|| format!("invalid replay file {}", path.display()))?;

        let source = Self::from_frames(frames);
        info!("Loaded {} replay frame(s) from {}", source.len(), path.display());
        Ok(source)
    }

    /// Frames are sorted by timestamp; out-of-order captures are tolerated.
    pub fn from_frames(mut frames: Vec<CapturedFrame>) -> Self {
        if frames.windows(2).any(|pair| pair[0].at_ms > pair[1].at_ms) {
            warn!("Replay frames out of order, sorting by timestamp");
            frames.sort_by_key(|frame| frame.at_ms);
        }
        Self {
            frames: frames.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl LandmarkSource for ReplaySource {
    /// A replay counts as loaded while it still has frames to give.
    fn is_loaded(&self) -> bool {
        !self.frames.is_empty()
    }

    fn next_frame(&mut self) -> Option<CapturedFrame> {
        self.frames.pop_front()
    }
}
