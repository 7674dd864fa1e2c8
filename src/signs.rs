// src/signs.rs - Reference signs and the library they are matched against
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::LibraryError;
use crate::landmarks::{raw_frames, Landmark};

/// Which hand configuration a sign was recorded with. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandType {
    Left,
    Right,
    Both,
}

/// 21 points for a single hand, 42 for a combined two-hand frame (first hand, then second).
pub type ReferenceFrame = Vec<Landmark>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceFrames {
    #[serde(default, with = "raw_frames")]
    pub left_hand: Vec<ReferenceFrame>,
    #[serde(default, with = "raw_frames")]
    pub right_hand: Vec<ReferenceFrame>,
    #[serde(default, with = "raw_frames")]
    pub both_hands: Vec<ReferenceFrame>,
}

impl ReferenceFrames {
    pub fn for_hand_type(&self, hand_type: HandType) -> &[ReferenceFrame] {
        match hand_type {
            HandType::Left => &self.left_hand,
            HandType::Right => &self.right_hand,
            HandType::Both => &self.both_hands,
        }
    }

    pub fn total(&self) -> usize {
        self.left_hand.len() + self.right_hand.len() + self.both_hands.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSign {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_alert: Option<String>,
    pub hand_type: HandType,
    #[serde(rename = "landmarks", default)]
    pub reference_frames: ReferenceFrames,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ReferenceSign {
    /// Frames recorded for this sign's own hand type; the only ones the matcher looks at.
    pub fn frames(&self) -> &[ReferenceFrame] {
        self.frames_for(self.hand_type)
    }

    pub fn frames_for(&self, hand_type: HandType) -> &[ReferenceFrame] {
        self.reference_frames.for_hand_type(hand_type)
    }

    pub fn total_frames(&self) -> usize {
        self.reference_frames.total()
    }

    /// The spoken message, if one was recorded. Blank text counts as none.
    pub fn alert_text(&self) -> Option<&str> {
        self.voice_alert
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Input for a newly recorded sign.
#[derive(Debug, Clone)]
pub struct NewSign {
    pub name: String,
    pub description: String,
    pub voice_alert: Option<String>,
    pub hand_type: HandType,
    pub reference_frames: ReferenceFrames,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignLibrary {
    signs: Vec<ReferenceSign>,
}

impl SignLibrary {
    pub fn new(signs: Vec<ReferenceSign>) -> Self {
        Self { signs }
    }

    /// Loads a library from JSON. A missing file is an empty library.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LibraryError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No sign library at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path).map_err(|source| LibraryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let library: SignLibrary = serde_json::from_str(&data)?;

        for sign in library.signs.iter().filter(|s| s.frames().is_empty()) {
            warn!(
                "Sign \"{}\" has no {:?} frames and can never be matched",
                sign.name, sign.hand_type
            );
        }
        info!("Loaded {} sign(s) from {}", library.len(), path.display());
        Ok(library)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LibraryError> {
        let path = path.as_ref();
        let io_err = |source| LibraryError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_err)
    }

    pub fn add(&mut self, new_sign: NewSign) -> Result<&ReferenceSign, LibraryError> {
        let name = new_sign.name.trim();
        if name.is_empty() {
            return Err(LibraryError::EmptyName);
        }
        if new_sign.reference_frames.for_hand_type(new_sign.hand_type).is_empty() {
            return Err(LibraryError::MissingFrames {
                name: name.to_string(),
                hand_type: new_sign.hand_type,
            });
        }

        let sign = ReferenceSign {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: new_sign.description,
            voice_alert: new_sign.voice_alert,
            hand_type: new_sign.hand_type,
            reference_frames: new_sign.reference_frames,
            created_at: Utc::now(),
        };
        info!(
            "Added sign \"{}\" ({:?}, {} frames)",
            sign.name,
            sign.hand_type,
            sign.total_frames()
        );

        self.signs.push(sign);
        Ok(&self.signs[self.signs.len() - 1])
    }

    /// Updates the descriptive fields only; frames and hand type never change.
    pub fn edit(
        &mut self,
        id: &str,
        name: &str,
        description: &str,
        voice_alert: Option<String>,
    ) -> Result<&ReferenceSign, LibraryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LibraryError::EmptyName);
        }
        let sign = self
            .signs
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| LibraryError::NotFound(id.to_string()))?;

        sign.name = name.to_string();
        sign.description = description.to_string();
        sign.voice_alert = voice_alert;
        Ok(sign)
    }

    pub fn delete(&mut self, id: &str) -> Result<ReferenceSign, LibraryError> {
        let index = self
            .signs
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| LibraryError::NotFound(id.to_string()))?;
        let removed = self.signs.remove(index);
        info!("Deleted sign \"{}\"", removed.name);
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.signs.clear();
    }

    pub fn get(&self, id: &str) -> Option<&ReferenceSign> {
        self.signs.iter().find(|s| s.id == id)
    }

    pub fn signs(&self) -> &[ReferenceSign] {
        &self.signs
    }

    pub fn len(&self) -> usize {
        self.signs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signs.is_empty()
    }

    /// Read-only copy handed to a detection session when it starts; later
    /// edits to the library don't reach a session already running.
    pub fn snapshot(&self) -> Arc<[ReferenceSign]> {
        Arc::from(self.signs.clone())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn sign(name: &str, hand_type: HandType, frames: Vec<ReferenceFrame>) -> ReferenceSign {
        let mut reference_frames = ReferenceFrames::default();
        match hand_type {
            HandType::Left => reference_frames.left_hand = frames,
            HandType::Right => reference_frames.right_hand = frames,
            HandType::Both => reference_frames.both_hands = frames,
        }
        ReferenceSign {
            id: format!("{}-id", name.to_lowercase()),
            name: name.to_string(),
            description: format!("{name} sign"),
            voice_alert: Some(format!("{name}!")),
            hand_type,
            reference_frames,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::open_hand;

    fn new_left_sign(name: &str) -> NewSign {
        NewSign {
            name: name.to_string(),
            description: String::new(),
            voice_alert: Some("  ".to_string()),
            hand_type: HandType::Left,
            reference_frames: ReferenceFrames {
                left_hand: vec![open_hand(0.5, 0.8, 0.3)],
                ..Default::default()
            },
        }
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("sign_alert_{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn add_requires_frames_for_hand_type() {
        let mut library = SignLibrary::default();
        let mut sign = new_left_sign("Hello");
        sign.hand_type = HandType::Both;

        let err = library.add(sign).unwrap_err();
        assert!(matches!(err, LibraryError::MissingFrames { hand_type: HandType::Both, .. }));
        assert!(library.is_empty());
    }

    #[test]
    fn add_rejects_blank_name() {
        let mut library = SignLibrary::default();
        assert!(matches!(library.add(new_left_sign("   ")), Err(LibraryError::EmptyName)));
    }

    #[test]
    fn edit_keeps_frames_and_hand_type() {
        let mut library = SignLibrary::default();
        let id = library.add(new_left_sign("Hello")).unwrap().id.clone();

        let edited = library
            .edit(&id, "Hi", "greeting", Some("Hi there".to_string()))
            .unwrap();
        assert_eq!(edited.name, "Hi");
        assert_eq!(edited.hand_type, HandType::Left);
        assert_eq!(edited.frames().len(), 1);
        assert_eq!(edited.alert_text(), Some("Hi there"));

        assert!(matches!(
            library.edit("missing", "x", "", None),
            Err(LibraryError::NotFound(_))
        ));
    }

    #[test]
    fn blank_voice_alert_is_none() {
        let mut library = SignLibrary::default();
        let sign = library.add(new_left_sign("Hello")).unwrap();
        assert_eq!(sign.alert_text(), None);
    }

    #[test]
    fn snapshot_is_isolated_from_later_edits() {
        let mut library = SignLibrary::default();
        let id = library.add(new_left_sign("Hello")).unwrap().id.clone();
        let snapshot = library.snapshot();

        library.delete(&id).unwrap();
        assert!(library.is_empty());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "Hello");
    }

    #[test]
    fn stored_schema_parses() {
        let json = r#"[{
            "id": "abc",
            "name": "Stop",
            "description": "palm out",
            "voice_alert": "Stop now",
            "hand_type": "both",
            "landmarks": { "bothHands": [[[0.1, 0.2, 0.0], [0.3, 0.4]]], "leftHand": null }
        }]"#;
        let library: SignLibrary = serde_json::from_str(json).unwrap();
        let sign = &library.signs()[0];

        assert_eq!(sign.hand_type, HandType::Both);
        assert_eq!(sign.frames().len(), 1);
        assert_eq!(sign.frames()[0][1].z, 0.0);
        assert!(sign.reference_frames.left_hand.is_empty());
    }

    #[test]
    fn save_then_load_preserves_library() {
        let path = temp_path("signs.json");
        let mut library = SignLibrary::default();
        library.add(new_left_sign("Hello")).unwrap();
        library.save(&path).unwrap();

        let loaded = SignLibrary::load(&path).unwrap();
        assert_eq!(loaded, library);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn null_inside_stored_point_only_spoils_that_point() {
        let json = r#"[{
            "id": "abc",
            "name": "Wave",
            "hand_type": "right",
            "landmarks": { "rightHand": [[[0.1, 0.2, 0.0], [0.3, null, 0.1]]] }
        }]"#;
        let library: SignLibrary = serde_json::from_str(json).unwrap();
        let frame = &library.signs()[0].frames()[0];

        assert_eq!(frame.len(), 2);
        assert_eq!(frame[0].x, 0.1);
        assert!(frame[1].x.is_nan());
    }

    #[test]
    fn saved_coordinates_reload_bit_for_bit() {
        let path = temp_path("signs.json");
        let mut sign = new_left_sign("Precise");
        sign.reference_frames.left_hand[0][1].x = 0.41900000000000004;
        let mut library = SignLibrary::default();
        library.add(sign).unwrap();
        library.save(&path).unwrap();

        let loaded = SignLibrary::load(&path).unwrap();
        assert_eq!(loaded.signs()[0].frames()[0][1].x.to_bits(), 0.41900000000000004f64.to_bits());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_loads_empty() {
        let library = SignLibrary::load(temp_path("absent.json")).unwrap();
        assert!(library.is_empty());
    }
}
