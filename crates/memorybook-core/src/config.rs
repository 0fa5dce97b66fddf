use crate::ingest::{IngestSettings, DEFAULT_RESIZE_FACTOR};
use crate::matching::{MatchPolicy, DUPLICATE_TOLERANCE, MATCH_THRESHOLD};
use crate::types::DetectionModel;
use std::path::PathBuf;

const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";
const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Shared configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the memory book JSON file.
    pub book_path: PathBuf,
    /// Directory of annotated history photos.
    pub history_dir: PathBuf,
    /// Directory holding `dark.css` and `light.css`.
    pub theme_dir: PathBuf,
    /// TrueType font for face labels.
    pub font_path: PathBuf,
    pub match_threshold: f32,
    pub duplicate_tolerance: f32,
    /// Address the web UI listens on.
    pub listen_addr: String,
    pub max_upload_bytes: usize,
    /// Initial session toggles.
    pub default_model: DetectionModel,
    pub default_resize_factor: f64,
}

impl Config {
    /// Load configuration from `MEMORYBOOK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("MEMORYBOOK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        Self {
            model_dir: env_path("MEMORYBOOK_MODEL_DIR").unwrap_or_else(|| data_dir.join("models")),
            book_path: env_path("MEMORYBOOK_BOOK_PATH")
                .unwrap_or_else(|| data_dir.join("memory_book.json")),
            history_dir: env_path("MEMORYBOOK_HISTORY_DIR")
                .unwrap_or_else(|| data_dir.join("history_photos")),
            theme_dir: env_path("MEMORYBOOK_THEME_DIR")
                .unwrap_or_else(|| PathBuf::from("contrib/themes")),
            font_path: env_path("MEMORYBOOK_FONT_PATH")
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FONT_PATH)),
            match_threshold: env_parse("MEMORYBOOK_MATCH_THRESHOLD", MATCH_THRESHOLD),
            duplicate_tolerance: env_parse("MEMORYBOOK_DUPLICATE_TOLERANCE", DUPLICATE_TOLERANCE),
            listen_addr: std::env::var("MEMORYBOOK_LISTEN_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8501".to_string()),
            max_upload_bytes: env_parse("MEMORYBOOK_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            default_model: env_parse("MEMORYBOOK_DEFAULT_MODEL", DetectionModel::Fast),
            default_resize_factor: env_parse("MEMORYBOOK_DEFAULT_RESIZE", DEFAULT_RESIZE_FACTOR),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(DETECTOR_MODEL_FILE)
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join(RECOGNIZER_MODEL_FILE)
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            match_threshold: self.match_threshold,
            duplicate_tolerance: self.duplicate_tolerance,
        }
    }

    pub fn default_ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            model: self.default_model,
            resize_factor: self.default_resize_factor,
        }
    }
}

/// `$XDG_DATA_HOME/memorybook`, falling back to `~/.local/share/memorybook`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("memorybook")
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
