// src/landmarks.rs - Hand observations from the detector and wrist-relative normalization
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// One tracked point: x/y in frame-relative [0,1], z relative depth.
pub type Landmark = Vector3<f64>;

// MediaPipe hand landmark model layout
pub const HAND_LANDMARKS: usize = 21;
pub const BOTH_HANDS_LANDMARKS: usize = HAND_LANDMARKS * 2;
pub const WRIST: usize = 0;

/// Lower bound on the bounding-box scale so flat or collapsed hands don't divide by zero.
pub const NORMALIZE_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// One detected hand in one frame, as delivered by the landmark detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    #[serde(default, with = "raw_points")]
    pub landmarks: Vec<Landmark>,
    pub handedness: Handedness,
    #[serde(default)]
    pub detection_confidence: f64,
}

impl HandObservation {
    pub fn new(landmarks: Vec<Landmark>, handedness: Handedness, detection_confidence: f64) -> Self {
        Self {
            landmarks,
            handedness,
            detection_confidence,
        }
    }

    /// Anything but exactly 21 points can't be compared and is dropped before matching.
    pub fn is_valid(&self) -> bool {
        self.landmarks.len() == HAND_LANDMARKS
    }
}

/// Builds a landmark from a raw `[x, y, z?]` array.
///
/// Missing depth reads as 0. A point with fewer than two components is
/// malformed and comes back as all-NaN, which the normalizer and the scorer
/// both treat as "no signal" for that point.
pub fn landmark_from_components(components: &[f64]) -> Landmark {
    match components {
        [x, y] => Vector3::new(*x, *y, 0.0),
        [x, y, z, ..] => Vector3::new(*x, *y, *z),
        _ => Vector3::from_element(f64::NAN),
    }
}

/// Builds a landmark from raw JSON components. A null point, or a null
/// anywhere inside one, makes the point malformed.
pub fn landmark_from_raw(components: Option<&[Option<f64>]>) -> Landmark {
    let present: Option<Vec<f64>> = components.and_then(|c| c.iter().copied().collect());
    match present {
        Some(components) => landmark_from_components(&components),
        None => Vector3::from_element(f64::NAN),
    }
}

fn has_position(point: &Landmark) -> bool {
    point.x.is_finite() && point.y.is_finite()
}

/// Translates the hand so the wrist sits at the origin and divides x/y by the
/// larger side of the 2-D bounding box. Depth passes through untouched.
///
/// Returns `None` when there is nothing to normalize against: an empty set or
/// a wrist without a usable x/y position.
pub fn normalize(points: &[Landmark]) -> Option<Vec<Landmark>> {
    let wrist = points.get(WRIST)?;
    if !has_position(wrist) {
        return None;
    }

    let (mut min_x, mut max_x) = (wrist.x, wrist.x);
    let (mut min_y, mut max_y) = (wrist.y, wrist.y);
    for point in points.iter().filter(|p| has_position(p)) {
        min_x = min_x.min(point.x);
        max_x = max_x.max(point.x);
        min_y = min_y.min(point.y);
        max_y = max_y.max(point.y);
    }

    let scale = (max_x - min_x).max(max_y - min_y).max(NORMALIZE_EPSILON);

    Some(
        points
            .iter()
            .map(|p| Vector3::new((p.x - wrist.x) / scale, (p.y - wrist.y) / scale, p.z))
            .collect(),
    )
}

/// Serde adapter for point lists stored as `[[x, y, z], ...]`.
pub mod raw_points {
    use super::{landmark_from_raw, Landmark};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(points: &[Landmark], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(points.len()))?;
        for p in points {
            seq.serialize_element(&[p.x, p.y, p.z])?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Landmark>, D::Error> {
        let raw: Vec<Option<Vec<Option<f64>>>> = Vec::deserialize(deserializer)?;
        Ok(raw.iter().map(|c| landmark_from_raw(c.as_deref())).collect())
    }
}

/// Serde adapter for frame sequences stored as `[[[x, y, z], ...], ...]`.
pub mod raw_frames {
    use super::{landmark_from_raw, Landmark};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(frames: &[Vec<Landmark>], serializer: S) -> Result<S::Ok, S::Error> {
        let raw: Vec<Vec<[f64; 3]>> = frames
            .iter()
            .map(|frame| frame.iter().map(|p| [p.x, p.y, p.z]).collect())
            .collect();
        raw.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<Landmark>>, D::Error> {
        // Older records store absent hands as null
        let raw: Option<Vec<Vec<Option<Vec<Option<f64>>>>>> = Option::deserialize(deserializer)?;
        Ok(raw
            .unwrap_or_default()
            .iter()
            .map(|frame| frame.iter().map(|c| landmark_from_raw(c.as_deref())).collect())
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A plausible open hand: wrist at the bottom, five fanned fingers.
    pub fn open_hand(origin_x: f64, origin_y: f64, size: f64) -> Vec<Landmark> {
        let mut points = vec![Vector3::new(origin_x, origin_y, 0.0)];
        for finger in 0..5 {
            let spread = (finger as f64 - 2.0) * 0.18;
            for joint in 1..=4 {
                let reach = size * joint as f64 / 4.0;
                points.push(Vector3::new(
                    origin_x + spread * reach,
                    origin_y - reach,
                    -0.01 * joint as f64,
                ));
            }
        }
        points
    }

    pub fn hand(handedness: Handedness, points: Vec<Landmark>, confidence: f64) -> HandObservation {
        HandObservation::new(points, handedness, confidence)
    }
}
