// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

use crate::signs::HandType;

/// Reasons a detection session refuses to start. The messages are shown to the user as-is.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    #[error("The camera must be active before detection can start")]
    DetectorNotLoaded,
    #[error("There are no saved signs to compare against")]
    EmptyLibrary,
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("failed to access sign library at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sign library is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sign \"{name}\" has no recorded frames for {hand_type:?} hand type")]
    MissingFrames { name: String, hand_type: HandType },
    #[error("sign name must not be empty")]
    EmptyName,
    #[error("no sign with id {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to access detection history at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("detection history is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write CSV export: {0}")]
    Csv(#[from] csv::Error),
}
