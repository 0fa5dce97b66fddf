//! memorybook-core: face book engine.
//!
//! Detects faces with SCRFD and encodes them with ArcFace (both via ONNX
//! Runtime), matches them against a flat-file book of labeled faces, and
//! renders annotated photos into a history directory.

pub mod alignment;
pub mod annotate;
pub mod config;
pub mod detector;
pub mod encoder;
pub mod history;
pub mod ingest;
pub mod matching;
pub mod recognizer;
pub mod store;
pub mod types;

pub use annotate::Annotator;
pub use config::Config;
pub use encoder::{EncoderError, FaceEncoder, OnnxFaceEncoder};
pub use history::{HistoryDir, HistoryError};
pub use ingest::{FaceDecision, IngestError, IngestReport, IngestSettings, PendingUpload};
pub use matching::{Identification, MatchPolicy, UNKNOWN_NAME};
pub use store::{BookError, BookStore, MemoryBook, StoreError};
pub use types::{BoundingBox, DetectedFace, DetectionModel, Encoding, FaceLocation, FaceRecord};
