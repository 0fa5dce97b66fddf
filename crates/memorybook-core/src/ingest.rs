//! Per-upload workflow.
//!
//! [`prepare`] takes the upload through decoding, resizing, detection and
//! identification, and stops where a person has to confirm names.
//! [`finalize`] applies their decisions: dedup, persist, annotate, and
//! write the history photo. Either step aborts on the first error.

use crate::annotate::{self, Annotator};
use crate::encoder::{EncoderError, FaceEncoder};
use crate::history::{HistoryDir, HistoryError};
use crate::matching::{Identification, MatchPolicy};
use crate::store::{BookStore, MemoryBook, StoreError};
use crate::types::{DetectedFace, DetectionModel, FaceLocation, FaceRecord};
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use std::path::PathBuf;
use thiserror::Error;

pub const MIN_RESIZE_FACTOR: f64 = 0.25;
pub const MAX_RESIZE_FACTOR: f64 = 1.0;
pub const DEFAULT_RESIZE_FACTOR: f64 = 0.5;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("resize factor {0} outside [0.25, 1.0]")]
    InvalidResizeFactor(f64),
    #[error("unsupported image format {0} (expected JPEG or PNG)")]
    UnsupportedFormat(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Session toggles that shape one upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestSettings {
    pub model: DetectionModel,
    pub resize_factor: f64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            model: DetectionModel::default(),
            resize_factor: DEFAULT_RESIZE_FACTOR,
        }
    }
}

impl IngestSettings {
    pub fn validate(&self) -> Result<(), IngestError> {
        if (MIN_RESIZE_FACTOR..=MAX_RESIZE_FACTOR).contains(&self.resize_factor) {
            Ok(())
        } else {
            Err(IngestError::InvalidResizeFactor(self.resize_factor))
        }
    }
}

/// A detected face awaiting review.
#[derive(Debug, Clone)]
pub struct PendingFace {
    pub detected: DetectedFace,
    pub identification: Identification,
}

/// An upload that has been detected and identified but not yet committed.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    /// Full-resolution photo.
    pub image: RgbImage,
    pub settings: IngestSettings,
    pub faces: Vec<PendingFace>,
}

/// What the reviewer said about one face.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceDecision {
    pub marked_wrong: bool,
    pub corrected_name: Option<String>,
}

/// Label for a reviewed face and whether it should be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub label: String,
    pub store: bool,
}

impl PendingFace {
    /// A name is asked for when the match was flagged wrong or nobody matched.
    pub fn needs_name(&self, decision: &FaceDecision) -> bool {
        decision.marked_wrong || self.identification.is_unknown()
    }

    pub fn resolve(&self, decision: &FaceDecision) -> Resolution {
        let corrected = decision
            .corrected_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        match corrected {
            Some(name) if self.needs_name(decision) => Resolution {
                label: name.to_string(),
                store: true,
            },
            _ => Resolution {
                label: self.identification.name.clone(),
                store: false,
            },
        }
    }
}

/// Result of a committed upload.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Label drawn for each detected face, in detection order.
    pub labels: Vec<String>,
    pub added: Vec<String>,
    /// Names that were not stored because a close face already exists.
    pub duplicates: Vec<String>,
    pub annotated_jpeg: Vec<u8>,
    pub history_file: PathBuf,
}

/// Decode an uploaded JPEG or PNG into RGB.
pub fn decode_upload(bytes: &[u8]) -> Result<RgbImage, IngestError> {
    let format = image::guess_format(bytes)?;
    if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
        return Err(IngestError::UnsupportedFormat(format!("{format:?}")));
    }
    Ok(image::load_from_memory_with_format(bytes, format)?.to_rgb8())
}

/// Scale both sides by `factor` (rounded, at least one pixel).
pub fn resize_for_detection(image: &RgbImage, factor: f64) -> RgbImage {
    let scale = |v: u32| ((f64::from(v) * factor).round() as u32).max(1);
    let (w, h) = (scale(image.width()), scale(image.height()));
    if (w, h) == image.dimensions() {
        return image.clone();
    }
    imageops::resize(image, w, h, FilterType::Triangle)
}

/// Decode, resize, detect, encode and identify every face of an upload.
pub fn prepare<E: FaceEncoder + ?Sized>(
    bytes: &[u8],
    settings: IngestSettings,
    encoder: &mut E,
    book: &MemoryBook,
    policy: &MatchPolicy,
) -> Result<PendingUpload, IngestError> {
    settings.validate()?;

    let image = decode_upload(bytes)?;
    let small = resize_for_detection(&image, settings.resize_factor);
    let detected = encoder.detect_and_encode(&small, settings.model)?;

    tracing::info!(
        width = image.width(),
        height = image.height(),
        resize_factor = settings.resize_factor,
        model = %settings.model,
        faces = detected.len(),
        "upload detected"
    );

    let faces = detected
        .into_iter()
        .map(|detected| {
            let identification = policy.identify(&detected.encoding, book.records());
            tracing::debug!(
                name = %identification.name,
                distance = ?identification.distance,
                "face identified"
            );
            PendingFace {
                detected,
                identification,
            }
        })
        .collect();

    Ok(PendingUpload {
        image,
        settings,
        faces,
    })
}

/// Draw every face of `pending` with its label onto a copy of the photo.
pub fn annotate_upload(
    pending: &PendingUpload,
    labels: &[String],
    annotator: &Annotator,
) -> RgbImage {
    let boxes: Vec<(FaceLocation, &str)> = pending
        .faces
        .iter()
        .zip(labels)
        .map(|(face, label)| {
            let location = face
                .detected
                .location
                .scaled_to_original(pending.settings.resize_factor);
            (location, label.as_str())
        })
        .collect();

    let mut image = pending.image.clone();
    annotator.annotate(&mut image, &boxes);
    image
}

/// Apply review decisions, persist new faces, and record the annotated photo.
///
/// `decisions[i]` belongs to face `i`; missing entries count as no input.
/// Candidates are checked for duplicates against the book as it stood before
/// this upload, not against each other.
pub fn finalize(
    pending: &PendingUpload,
    decisions: &[FaceDecision],
    book: &mut MemoryBook,
    store: &BookStore,
    history: &HistoryDir,
    annotator: &Annotator,
    policy: &MatchPolicy,
) -> Result<IngestReport, IngestError> {
    let no_input = FaceDecision::default();
    let resolutions: Vec<Resolution> = pending
        .faces
        .iter()
        .enumerate()
        .map(|(i, face)| face.resolve(decisions.get(i).unwrap_or(&no_input)))
        .collect();

    let baseline = book.len();
    let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
    let mut added = Vec::new();
    let mut duplicates = Vec::new();

    for (face, resolution) in pending.faces.iter().zip(&resolutions) {
        if !resolution.store {
            continue;
        }
        if policy.is_duplicate(&face.detected.encoding, &book.records()[..baseline]) {
            tracing::info!(name = %resolution.label, "face already in memory book; skipped");
            duplicates.push(resolution.label.clone());
            continue;
        }
        book.push(FaceRecord {
            encoding: face.detected.encoding.clone(),
            name: resolution.label.clone(),
            timestamp: timestamp.clone(),
        });
        tracing::info!(name = %resolution.label, "face added to memory book");
        added.push(resolution.label.clone());
    }

    store.save(book)?;

    let labels: Vec<String> = resolutions.into_iter().map(|r| r.label).collect();
    let annotated = annotate_upload(pending, &labels, annotator);
    let annotated_jpeg = annotate::encode_jpeg(&annotated)?;
    let history_file = history.save_jpeg(&annotated_jpeg)?;

    Ok(IngestReport {
        labels,
        added,
        duplicates,
        annotated_jpeg,
        history_file,
    })
}
