// src/lib.rs - Sign recognition against a user-recorded library of hand signs
pub mod config;
pub mod consensus;
pub mod detector;
pub mod error;
pub mod history;
pub mod landmarks;
pub mod matcher;
pub mod runtime;
pub mod session;
pub mod signs;
pub mod similarity;
pub mod speech;

pub use config::AppSettings;
pub use detector::{CapturedFrame, LandmarkSource, ReplaySource};
pub use error::{HistoryError, LibraryError, StartError};
pub use history::DetectionHistory;
pub use landmarks::{HandObservation, Handedness, Landmark};
pub use matcher::{MatchOutcome, SignMatcher};
pub use runtime::{SessionDriver, SessionHandle, SharedLibrary};
pub use session::{DetectionResult, DetectionSession, SessionEvent, SessionState};
pub use signs::{HandType, ReferenceSign, SignLibrary};
