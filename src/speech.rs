// src/speech.rs - Spoken alerts for confirmed detections
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::session::DetectionResult;

pub const ALERT_REPEAT_MS: u64 = 2000;

/// Text-to-speech backend.
pub trait Speaker: Send + Sync {
    fn speak(&self, text: &str) -> Result<()>;

    /// Cuts off whatever is being spoken.
    fn stop(&self);
}

/// Logs utterances instead of voicing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSpeaker;

impl Speaker for TracingSpeaker {
    fn speak(&self, text: &str) -> Result<()> {
        info!(target: "sign_alert::speech", "Speaking: {text}");
        Ok(())
    }

    fn stop(&self) {}
}

/// Repeats a detection's voice alert until it is dismissed or dropped.
pub struct VoiceAlertLoop {
    speaker: Arc<dyn Speaker>,
    task: JoinHandle<()>,
}

impl VoiceAlertLoop {
    /// Speaks the sign's alert now and then every `period`.
    ///
    /// Returns `None` without speaking when the sign has no alert text.
    /// Must be called from within a tokio runtime.
    pub fn start(speaker: Arc<dyn Speaker>, result: &DetectionResult, period: Duration) -> Option<Self> {
        let Some(text) = result.sign.alert_text() else {
            info!("Sign \"{}\" has no voice alert", result.sign.name);
            return None;
        };
        let text = text.to_string();

        if let Err(e) = speaker.speak(&text) {
            warn!("Voice alert failed: {e:#}");
        }

        let repeat = Arc::clone(&speaker);
        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticks.tick().await;
                if let Err(e) = repeat.speak(&text) {
                    warn!("Voice alert failed: {e:#}");
                }
            }
        });

        Some(Self { speaker, task })
    }

    /// Stops the repetition and cuts off the current utterance.
    pub fn dismiss(self) {
        info!("Voice alert dismissed");
    }
}

impl Drop for VoiceAlertLoop {
    fn drop(&mut self) {
        self.task.abort();
        self.speaker.stop();
    }
}
