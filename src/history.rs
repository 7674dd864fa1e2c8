// src/history.rs - Record of confirmed detections, with stats and CSV export
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local};
use csv::Writer;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::HistoryError;
use crate::session::DetectionResult;

pub const HISTORY_CAPACITY: usize = 100;
pub const CSV_FILE_NAME: &str = "detection_history.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub sign_name: String,
    #[serde(default)]
    pub sign_description: String,
    pub confidence: f64,
    pub timestamp: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_alert: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistoryStats {
    pub total: usize,
    pub today: usize,
    pub this_week: usize,
    pub avg_confidence: f64,
}

#[derive(Debug, Serialize)]
struct HistoryRecord<'a> {
    timestamp: String,
    sign_name: &'a str,
    sign_description: &'a str,
    confidence_percent: f64,
    voice_alert: Option<&'a str>,
}

/// Newest first, capped at [`HISTORY_CAPACITY`] entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionHistory {
    entries: Vec<HistoryEntry>,
}

impl DetectionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads saved history. A missing file is an empty history.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|source| HistoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut history: DetectionHistory = serde_json::from_str(&data)?;

        if history.entries.len() > HISTORY_CAPACITY {
            warn!("History file holds {} entries, keeping newest {HISTORY_CAPACITY}", history.entries.len());
            history.entries.truncate(HISTORY_CAPACITY);
        }
        Ok(history)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), HistoryError> {
        let path = path.as_ref();
        let io_err = |source| HistoryError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_err)
    }

    pub fn record(&mut self, detection: &DetectionResult) -> &HistoryEntry {
        let entry = HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            sign_name: detection.sign.name.clone(),
            sign_description: detection.sign.description.clone(),
            confidence: detection.confidence,
            timestamp: detection.timestamp,
            voice_alert: detection.sign.voice_alert.clone(),
        };
        self.entries.insert(0, entry);
        self.entries.truncate(HISTORY_CAPACITY);
        &self.entries[0]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self, now: DateTime<Local>) -> HistoryStats {
        let week_start = now - Duration::days(7);
        let avg_confidence = if self.entries.is_empty() {
            0.0
        } else {
            self.entries.iter().map(|e| e.confidence).sum::<f64>() / self.entries.len() as f64
        };

        HistoryStats {
            total: self.entries.len(),
            today: self.today(now).count(),
            this_week: self.entries.iter().filter(|e| e.timestamp >= week_start).count(),
            avg_confidence,
        }
    }

    /// The sign detected most often today, with its count.
    pub fn most_used_today(&self, now: DateTime<Local>) -> Option<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for entry in self.today(now) {
            match counts.iter_mut().find(|(name, _)| *name == entry.sign_name) {
                Some((_, count)) => *count += 1,
                None => counts.push((entry.sign_name.as_str(), 1)),
            }
        }
        counts
            .into_iter()
            .reduce(|best, next| if next.1 > best.1 { next } else { best })
    }

    /// Entries with `start <= timestamp <= end`, newest first.
    pub fn between(&self, start: DateTime<Local>, end: DateTime<Local>) -> Vec<&HistoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .collect()
    }

    pub fn export_csv(&self, output_dir: impl AsRef<Path>) -> Result<PathBuf, HistoryError> {
        let output_dir = output_dir.as_ref();
        let csv_path = output_dir.join(CSV_FILE_NAME);
        std::fs::create_dir_all(output_dir).map_err(|source| HistoryError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let file = File::create(&csv_path).map_err(|source| HistoryError::Io {
            path: csv_path.clone(),
            source,
        })?;
        let mut writer = Writer::from_writer(file);
        for entry in &self.entries {
            writer.serialize(HistoryRecord {
                timestamp: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                sign_name: &entry.sign_name,
                sign_description: &entry.sign_description,
                confidence_percent: (entry.confidence * 1000.0).round() / 10.0,
                voice_alert: entry.voice_alert.as_deref(),
            })?;
        }
        writer.flush().map_err(|source| HistoryError::Io {
            path: csv_path.clone(),
            source,
        })?;

        info!("Exported {} detection(s) to {}", self.entries.len(), csv_path.display());
        Ok(csv_path)
    }

    fn today(&self, now: DateTime<Local>) -> impl Iterator<Item = &HistoryEntry> {
        let today = now.date_naive();
        self.entries.iter().filter(move |e| e.timestamp.date_naive() >= today)
    }
}
