//! Detection + encoding adapter.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{DetectedFace, DetectionModel, FaceLocation};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds faces in an image and encodes each one.
///
/// Faces come back in the detector's order, box and encoding paired.
pub trait FaceEncoder {
    fn detect_and_encode(
        &mut self,
        image: &RgbImage,
        model: DetectionModel,
    ) -> Result<Vec<DetectedFace>, EncoderError>;
}

/// SCRFD detection followed by ArcFace encoding.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models. Fails if either file is missing.
    pub fn load(detector_path: &Path, recognizer_path: &Path) -> Result<Self, EncoderError> {
        let detector = FaceDetector::load(detector_path)?;
        let recognizer = FaceRecognizer::load(recognizer_path)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn detect_and_encode(
        &mut self,
        image: &RgbImage,
        model: DetectionModel,
    ) -> Result<Vec<DetectedFace>, EncoderError> {
        let boxes = self.detector.detect(image, model)?;

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let encoding = self.recognizer.extract(image, &bbox)?;
            faces.push(DetectedFace {
                location: FaceLocation::from_bbox(&bbox, image.width(), image.height()),
                bbox,
                encoding,
            });
        }
        Ok(faces)
    }
}
