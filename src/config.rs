// src/config.rs - Application settings: file locations and detection tunables
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consensus::ConsensusConfig;
use crate::matcher::MatcherConfig;
use crate::session::SessionConfig;
use crate::speech::ALERT_REPEAT_MS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub output_directory: PathBuf,
    pub library_path: PathBuf,
    pub history_path: PathBuf,
    pub voice_alerts: bool,
    pub alert_repeat_ms: u64,
    pub matcher: MatcherConfig,
    pub consensus: ConsensusConfig,
    pub session: SessionConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        let output_directory = directories::UserDirs::new()
            .and_then(|dirs| dirs.document_dir().map(|p| p.join("SignAlert")))
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self {
            library_path: output_directory.join("signs.json"),
            history_path: output_directory.join("history.json"),
            output_directory,
            voice_alerts: true,
            alert_repeat_ms: ALERT_REPEAT_MS,
            matcher: MatcherConfig::default(),
            consensus: ConsensusConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl AppSettings {
    /// Reads settings from JSON; fields left out keep their defaults.
    /// No path, or a path that doesn't exist, gives the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.filter(|p| p.exists()) else {
            return Ok(Self::default());
        };
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings {}", path.display()))?;
        let settings: AppSettings = serde_json::from_str(&data)
            .with_context(|| format!("invalid settings file {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::SAMPLE_THRESHOLD;
    use crate::matcher::SINGLE_HAND_THRESHOLD;

    #[test]
    fn partial_file_keeps_defaults() {
        let path = std::env::temp_dir().join(format!("sign_alert_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "voice_alerts": false, "session": { "detection_timeout_ms": 5000 } }"#).unwrap();

        let settings = AppSettings::load(Some(&path)).unwrap();
        assert!(!settings.voice_alerts);
        assert_eq!(settings.session.detection_timeout_ms, 5000);
        assert_eq!(settings.session.countdown_seconds, 3);
        assert_eq!(settings.consensus.sample_threshold, SAMPLE_THRESHOLD);
        assert_eq!(settings.matcher.single_hand_threshold, SINGLE_HAND_THRESHOLD);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_default() {
        assert_eq!(AppSettings::load(None).unwrap(), AppSettings::default());
        let absent = std::env::temp_dir().join("sign_alert_absent_settings.json");
        assert_eq!(AppSettings::load(Some(&absent)).unwrap(), AppSettings::default());
    }

    #[test]
    fn bad_json_is_an_error() {
        let path = std::env::temp_dir().join(format!("sign_alert_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{ not json").unwrap();
        assert!(AppSettings::load(Some(&path)).is_err());
        let _ = std::fs::remove_file(path);
    }
}
