use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bounding box for a detected face, with optional facial landmarks.
///
/// Coordinates are in the space of the image that was handed to the detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Integer face box in `(top, right, bottom, left)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceLocation {
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Convert a detector box to a pixel box clamped inside a `width` x `height` image.
    pub fn from_bbox(bbox: &BoundingBox, width: u32, height: u32) -> Self {
        let clamp = |v: f32, max: u32| v.round().clamp(0.0, max.saturating_sub(1) as f32) as u32;
        Self {
            top: clamp(bbox.y, height),
            right: clamp(bbox.x + bbox.width, width),
            bottom: clamp(bbox.y + bbox.height, height),
            left: clamp(bbox.x, width),
        }
    }

    /// Map a box found on a downscaled image back to the original resolution.
    ///
    /// Each coordinate is divided by `resize_factor` and truncated.
    pub fn scaled_to_original(&self, resize_factor: f64) -> Self {
        let scale = |v: u32| (f64::from(v) / resize_factor) as u32;
        Self {
            top: scale(self.top),
            right: scale(self.right),
            bottom: scale(self.bottom),
            left: scale(self.left),
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Face encoding vector (512-dimensional for ArcFace).
///
/// Serialized as a bare array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Encoding {
    pub values: Vec<f32>,
}

impl Encoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance between two encodings.
    pub fn distance(&self, other: &Encoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A labeled face stored in the memory book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub encoding: Encoding,
    pub name: String,
    /// Local time the record was added, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
}

/// One face from a single detection pass, box and encoding paired.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub location: FaceLocation,
    pub bbox: BoundingBox,
    pub encoding: Encoding,
}

/// Detector operating point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionModel {
    /// Small detector input, quicker but misses small faces.
    #[default]
    Fast,
    /// Full-size detector input.
    Accurate,
}

#[derive(Error, Debug)]
#[error("unknown detection model: {0} (expected fast or accurate)")]
pub struct ParseModelError(String);

impl FromStr for DetectionModel {
    type Err = ParseModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "hog" => Ok(Self::Fast),
            "accurate" | "cnn" => Ok(Self::Accurate),
            _ => Err(ParseModelError(s.to_string())),
        }
    }
}

impl fmt::Display for DetectionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fast => "fast",
            Self::Accurate => "accurate",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_to_original_half() {
        let loc = FaceLocation::new(100, 200, 150, 120);
        assert_eq!(loc.scaled_to_original(0.5), FaceLocation::new(200, 400, 300, 240));
    }

    #[test]
    fn test_scaled_to_original_identity() {
        let loc = FaceLocation::new(10, 20, 30, 5);
        assert_eq!(loc.scaled_to_original(1.0), loc);
    }

    #[test]
    fn test_scaled_to_original_truncates() {
        // 10 / 0.75 = 13.33 -> 13
        let loc = FaceLocation::new(10, 10, 10, 10);
        assert_eq!(loc.scaled_to_original(0.75).top, 13);
    }

    #[test]
    fn test_scaled_to_original_exact_multiples() {
        // 30 / 0.3 and 40 / 0.4 are 100 in double precision.
        let loc = FaceLocation::new(30, 30, 30, 30);
        assert_eq!(loc.scaled_to_original(0.3), FaceLocation::new(100, 100, 100, 100));

        let loc = FaceLocation::new(40, 80, 120, 20);
        assert_eq!(loc.scaled_to_original(0.4), FaceLocation::new(100, 200, 300, 50));
    }

    #[test]
    fn test_scaled_to_original_point_six_and_eight() {
        assert_eq!(FaceLocation::new(60, 0, 0, 0).scaled_to_original(0.6).top, 100);
        assert_eq!(FaceLocation::new(80, 0, 0, 0).scaled_to_original(0.8).top, 100);
    }

    #[test]
    fn test_from_bbox_clamps_to_image() {
        let bbox = BoundingBox {
            x: -5.0,
            y: 10.4,
            width: 120.0,
            height: 30.0,
            confidence: 0.9,
            landmarks: None,
        };
        let loc = FaceLocation::from_bbox(&bbox, 100, 100);
        assert_eq!(loc, FaceLocation::new(10, 99, 40, 0));
    }

    #[test]
    fn test_distance() {
        let a = Encoding::new(vec![0.0, 0.0]);
        let b = Encoding::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_encoding_serializes_as_array() {
        let e = Encoding::new(vec![0.25, -1.5]);
        assert_eq!(serde_json::to_string(&e).unwrap(), "[0.25,-1.5]");
    }

    #[test]
    fn test_detection_model_parse() {
        assert_eq!("fast".parse::<DetectionModel>().unwrap(), DetectionModel::Fast);
        assert!("Accurate (cnn)".parse::<DetectionModel>().is_err());
        assert_eq!("CNN".parse::<DetectionModel>().unwrap(), DetectionModel::Accurate);
        assert_eq!(" hog ".parse::<DetectionModel>().unwrap(), DetectionModel::Fast);
        assert_eq!(DetectionModel::Accurate.to_string(), "accurate");
    }
}
