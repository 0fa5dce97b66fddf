use memorybook_core::ingest::{IngestReport, IngestSettings, MAX_RESIZE_FACTOR, MIN_RESIZE_FACTOR};
use memorybook_core::{Config, DetectionModel, PendingUpload};
use serde::Deserialize;

/// The three views of the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    MemoryBook,
    History,
}

impl Page {
    pub fn path(self) -> &'static str {
        match self {
            Page::Home => "/",
            Page::MemoryBook => "/book",
            Page::History => "/history",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Page::Home => "Home",
            Page::MemoryBook => "Memory Book",
            Page::History => "Historical Photos",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        [Page::Home, Page::MemoryBook, Page::History]
            .into_iter()
            .find(|page| page.path() == path)
    }
}

/// Per-session toggles passed to every render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub dark_mode: bool,
    pub model: DetectionModel,
    pub resize_factor: f64,
    pub page: Page,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dark_mode: true,
            model: config.default_model,
            resize_factor: clamp_resize(config.default_resize_factor),
            page: Page::Home,
        }
    }

    pub fn ingest(&self) -> IngestSettings {
        IngestSettings {
            model: self.model,
            resize_factor: self.resize_factor,
        }
    }

    /// Apply a submitted sidebar form. Returns the page to go back to.
    pub fn apply(&mut self, form: &SettingsForm) -> Page {
        // Unchecked checkboxes are simply absent from the form.
        self.dark_mode = form.dark_mode.is_some();
        match form.model.parse() {
            Ok(model) => self.model = model,
            Err(err) => tracing::warn!(error = %err, "ignoring model selection"),
        }
        self.resize_factor = clamp_resize(form.resize_factor);

        form.return_to
            .as_deref()
            .and_then(Page::from_path)
            .unwrap_or(self.page)
    }
}

fn clamp_resize(factor: f64) -> f64 {
    if factor.is_nan() {
        return MAX_RESIZE_FACTOR;
    }
    factor.clamp(MIN_RESIZE_FACTOR, MAX_RESIZE_FACTOR)
}

#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    pub dark_mode: Option<String>,
    pub model: String,
    pub resize_factor: f64,
    pub return_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl NoticeLevel {
    pub fn css_class(self) -> &'static str {
        match self {
            NoticeLevel::Success => "notice success",
            NoticeLevel::Info => "notice info",
            NoticeLevel::Warning => "notice warning",
            NoticeLevel::Error => "notice error",
        }
    }
}

/// One-shot message shown on the next render.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// What the upload page shows after a committed upload.
#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub model: DetectionModel,
    pub labels: Vec<String>,
    pub annotated_jpeg: Vec<u8>,
}

impl UploadSummary {
    pub fn new(model: DetectionModel, report: IngestReport) -> Self {
        Self {
            model,
            labels: report.labels,
            annotated_jpeg: report.annotated_jpeg,
        }
    }
}

/// The single logical session.
pub struct Session {
    pub settings: SessionSettings,
    /// Detected upload waiting for name confirmation.
    pub pending: Option<PendingUpload>,
    pub last_upload: Option<UploadSummary>,
    notices: Vec<Notice>,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            pending: None,
            last_upload: None,
            notices: Vec::new(),
        }
    }

    pub fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.notices.push(Notice {
            level,
            text: text.into(),
        });
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SessionSettings {
        SessionSettings {
            dark_mode: true,
            model: DetectionModel::Fast,
            resize_factor: 0.5,
            page: Page::MemoryBook,
        }
    }

    #[test]
    fn test_apply_form() {
        let mut s = settings();
        let form = SettingsForm {
            dark_mode: None,
            model: "accurate".into(),
            resize_factor: 0.75,
            return_to: Some("/history".into()),
        };
        assert_eq!(s.apply(&form), Page::History);
        assert!(!s.dark_mode);
        assert_eq!(s.model, DetectionModel::Accurate);
        assert_eq!(s.resize_factor, 0.75);
    }

    #[test]
    fn test_apply_clamps_and_keeps_bad_model() {
        let mut s = settings();
        let form = SettingsForm {
            dark_mode: Some("on".into()),
            model: "turbo".into(),
            resize_factor: 3.0,
            return_to: Some("https://elsewhere.example".into()),
        };
        assert_eq!(s.apply(&form), Page::MemoryBook);
        assert!(s.dark_mode);
        assert_eq!(s.model, DetectionModel::Fast);
        assert_eq!(s.resize_factor, MAX_RESIZE_FACTOR);

        let form = SettingsForm {
            resize_factor: 0.01,
            ..form
        };
        s.apply(&form);
        assert_eq!(s.resize_factor, MIN_RESIZE_FACTOR);
    }

    #[test]
    fn test_notices_are_drained() {
        let mut session = Session::new(settings());
        session.notify(NoticeLevel::Success, "saved");
        assert_eq!(session.take_notices().len(), 1);
        assert!(session.take_notices().is_empty());
    }

    #[test]
    fn test_page_paths() {
        for page in [Page::Home, Page::MemoryBook, Page::History] {
            assert_eq!(Page::from_path(page.path()), Some(page));
        }
        assert_eq!(Page::from_path("/nope"), None);
    }
}
