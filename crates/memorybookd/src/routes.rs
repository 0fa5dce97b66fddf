use crate::engine::{EngineError, EngineHandle};
use crate::pages;
use crate::session::{
    Notice, NoticeLevel, Page, Session, SessionSettings, SettingsForm, UploadSummary,
};
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use memorybook_core::{
    ingest, Annotator, BookError, BookStore, Config, FaceDecision, HistoryDir, HistoryError,
    IngestReport, MatchPolicy, PendingUpload,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct AppState {
    pub config: Config,
    pub engine: EngineHandle,
    pub store: BookStore,
    pub history: HistoryDir,
    pub annotator: Annotator,
    pub policy: MatchPolicy,
    session: Mutex<Session>,
}

impl AppState {
    pub fn new(
        config: Config,
        engine: EngineHandle,
        history: HistoryDir,
        annotator: Annotator,
    ) -> Self {
        let settings = SessionSettings::from_config(&config);
        Self {
            store: BookStore::new(&config.book_path),
            policy: config.match_policy(),
            session: Mutex::new(Session::new(settings)),
            config,
            engine,
            history,
            annotator,
        }
    }

    /// Never held across an `.await`.
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Render `body` inside the layout for `page`, consuming pending notices.
    fn render(&self, page: Page, body: String) -> Html<String> {
        let (settings, notices) = {
            let mut session = self.session();
            session.settings.page = page;
            (session.settings, session.take_notices())
        };
        let css = pages::load_css(&self.config.theme_dir, settings.dark_mode);
        if let Err(err) = &css {
            tracing::warn!(error = %err, "theme stylesheet unavailable");
        }
        Html(pages::layout(&settings, &css, &notices, &body))
    }

    fn notify(&self, level: NoticeLevel, text: impl Into<String>) {
        self.session().notify(level, text);
    }

    fn push_notice(&self, notice: Notice) {
        self.session().notify(notice.level, notice.text);
    }
}

/// Uncaught failure: logged, answered with a generic 500 page.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %format!("{:#}", self.0), "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Html(pages::failure())).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

type AppResult<T> = Result<T, AppError>;

/// Run blocking file work off the async runtime.
async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(home))
        .route("/upload", post(upload).layer(DefaultBodyLimit::max(upload_limit)))
        .route("/upload/confirm", post(confirm_upload))
        .route("/upload/annotated.jpg", get(annotated_photo))
        .route("/book", get(book))
        .route("/book/:index/rename", post(rename_entry))
        .route("/book/:index/delete", post(delete_entry))
        .route("/history", get(history))
        .route("/history/:file", get(history_photo))
        .route("/settings", post(update_settings))
        .with_state(state)
}

async fn home(State(state): State<Arc<AppState>>) -> Html<String> {
    let body = {
        let session = state.session();
        pages::home(session.pending.as_ref(), session.last_upload.as_ref())
    };
    state.render(Page::Home, body)
}

async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Redirect> {
    let mut photo = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("photo") {
            photo = Some(field.bytes().await?);
        }
    }

    let Some(photo) = photo.filter(|bytes| !bytes.is_empty()) else {
        state.notify(NoticeLevel::Warning, "Choose a photo to upload.");
        return Ok(Redirect::to(Page::Home.path()));
    };

    let store = state.store.clone();
    let book = blocking(move || Ok(store.load()?)).await?;
    let settings = state.session().settings.ingest();

    tracing::info!(bytes = photo.len(), model = %settings.model, "photo uploaded");
    let pending = match state.engine.prepare(photo.to_vec(), settings, book).await {
        Ok(pending) => pending,
        Err(EngineError::Ingest(err)) => {
            state.notify(NoticeLevel::Error, format!("Could not process photo: {err}"));
            return Ok(Redirect::to(Page::Home.path()));
        }
        Err(err) => return Err(err.into()),
    };

    let mut session = state.session();
    session.pending = Some(pending);
    session.last_upload = None;
    Ok(Redirect::to(Page::Home.path()))
}

/// Resolve the review form against a fresh copy of the book and commit.
fn commit_upload(
    pending: &PendingUpload,
    form: &HashMap<String, String>,
    store: &BookStore,
    history: &HistoryDir,
    annotator: &Annotator,
    policy: &MatchPolicy,
) -> anyhow::Result<IngestReport> {
    let decisions = decisions_from_form(form, pending.faces.len());
    let mut book = store.load()?;
    let report = ingest::finalize(
        pending,
        &decisions,
        &mut book,
        store,
        history,
        annotator,
        policy,
    )?;

    tracing::info!(
        faces = report.labels.len(),
        added = report.added.len(),
        history = %report.history_file.display(),
        "upload committed"
    );
    Ok(report)
}

fn upload_notices(report: &IngestReport) -> Vec<Notice> {
    let added = report.added.iter().map(|name| Notice {
        level: NoticeLevel::Success,
        text: format!("✅ Added '{name}' to Memory Book."),
    });
    let duplicates = report.duplicates.iter().map(|name| Notice {
        level: NoticeLevel::Warning,
        text: format!("⚠️ '{name}' already exists in Memory Book."),
    });
    added.chain(duplicates).collect()
}

/// Collect `wrong_<i>` / `name_<i>` fields for `count` faces.
fn decisions_from_form(form: &HashMap<String, String>, count: usize) -> Vec<FaceDecision> {
    (0..count)
        .map(|i| FaceDecision {
            marked_wrong: form.contains_key(&format!("wrong_{i}")),
            corrected_name: form.get(&format!("name_{i}")).cloned(),
        })
        .collect()
}

async fn confirm_upload(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HashMap<String, String>>,
) -> AppResult<Redirect> {
    let pending = state.session().pending.take();
    let Some(pending) = pending else {
        state.notify(NoticeLevel::Info, "Upload a photo first.");
        return Ok(Redirect::to(Page::Home.path()));
    };
    let model = pending.settings.model;

    let worker = state.clone();
    let report = blocking(move || {
        commit_upload(
            &pending,
            &form,
            &worker.store,
            &worker.history,
            &worker.annotator,
            &worker.policy,
        )
    })
    .await?;

    let mut session = state.session();
    for notice in upload_notices(&report) {
        session.notify(notice.level, notice.text);
    }
    session.last_upload = Some(UploadSummary::new(model, report));
    Ok(Redirect::to(Page::Home.path()))
}

async fn annotated_photo(State(state): State<Arc<AppState>>) -> Response {
    match state.session().last_upload.as_ref() {
        Some(last) => jpeg_response(last.annotated_jpeg.clone()),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn book(State(state): State<Arc<AppState>>) -> AppResult<Html<String>> {
    let store = state.store.clone();
    let book = blocking(move || Ok(store.load()?)).await?;
    Ok(state.render(Page::MemoryBook, pages::memory_book(&book)))
}

#[derive(Debug, Deserialize)]
struct RenameForm {
    name: String,
}

async fn rename_entry(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Form(form): Form<RenameForm>,
) -> AppResult<Redirect> {
    let store = state.store.clone();
    let notice = blocking(move || rename_record(&store, index, &form.name)).await?;
    if let Some(notice) = notice {
        state.push_notice(notice);
    }
    Ok(Redirect::to(Page::MemoryBook.path()))
}

/// Rename entry `index`. The store is only written when the name changes.
fn rename_record(store: &BookStore, index: usize, name: &str) -> anyhow::Result<Option<Notice>> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(Some(Notice {
            level: NoticeLevel::Warning,
            text: "Name cannot be empty.".to_string(),
        }));
    }

    let mut book = store.load()?;
    match book.rename(index, name) {
        Ok(true) => {
            store.save(&book)?;
            tracing::info!(index, name, "memory book entry renamed");
            Ok(Some(Notice {
                level: NoticeLevel::Success,
                text: format!("✅ Updated name to '{name}'"),
            }))
        }
        Ok(false) => Ok(None),
        Err(err) => Ok(Some(book_error_notice(&err))),
    }
}

async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> AppResult<Redirect> {
    let store = state.store.clone();
    let notice = blocking(move || delete_record(&store, index)).await?;
    state.push_notice(notice);
    Ok(Redirect::to(Page::MemoryBook.path()))
}

fn delete_record(store: &BookStore, index: usize) -> anyhow::Result<Notice> {
    let mut book = store.load()?;
    match book.remove(index) {
        Ok(record) => {
            store.save(&book)?;
            tracing::info!(index, name = %record.name, "memory book entry deleted");
            Ok(Notice {
                level: NoticeLevel::Info,
                text: format!("🗑️ Deleted '{}'", record.name),
            })
        }
        Err(err) => Ok(book_error_notice(&err)),
    }
}

fn book_error_notice(err: &BookError) -> Notice {
    Notice {
        level: NoticeLevel::Warning,
        text: format!("That entry no longer exists ({err})."),
    }
}

async fn history(State(state): State<Arc<AppState>>) -> AppResult<Html<String>> {
    let history = state.history.clone();
    let names = blocking(move || Ok(history.list()?)).await?;
    Ok(state.render(Page::History, pages::history(&names)))
}

async fn history_photo(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
) -> AppResult<Response> {
    let history = state.history.clone();
    let name = file.clone();
    let result = tokio::task::spawn_blocking(move || history.read(&name)).await?;

    match result {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, content_type(&file))], bytes).into_response()),
        Err(HistoryError::InvalidName(_)) => Ok(StatusCode::BAD_REQUEST.into_response()),
        Err(HistoryError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            Ok(StatusCode::NOT_FOUND.into_response())
        }
        Err(err) => Err(err.into()),
    }
}

fn content_type(file: &str) -> &'static str {
    let ext = file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

fn jpeg_response(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response()
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SettingsForm>,
) -> Redirect {
    let back = {
        let mut session = state.session();
        let back = session.settings.apply(&form);
        tracing::debug!(settings = ?session.settings, "session settings updated");
        back
    };
    Redirect::to(back.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use memorybook_core::ingest::PendingFace;
    use memorybook_core::{
        BoundingBox, DetectedFace, Encoding, FaceLocation, FaceRecord, Identification,
        IngestSettings, MemoryBook,
    };

    fn record(name: &str, values: Vec<f32>) -> FaceRecord {
        FaceRecord {
            encoding: Encoding::new(values),
            name: name.to_string(),
            timestamp: "2024-01-01 09:00:00".into(),
        }
    }

    /// Store holding a single "Jane" entry, plus its bytes on disk.
    fn jane_store(dir: &tempfile::TempDir) -> (BookStore, Vec<u8>) {
        let store = BookStore::new(dir.path().join("memory_book.json"));
        store
            .save(&MemoryBook::new(vec![record("Jane", vec![0.0, 0.0])]))
            .unwrap();
        let bytes = std::fs::read(store.path()).unwrap();
        (store, bytes)
    }

    fn pending_face(identification: Identification, values: Vec<f32>) -> PendingFace {
        let location = FaceLocation::new(10, 30, 30, 10);
        PendingFace {
            detected: DetectedFace {
                location,
                bbox: BoundingBox {
                    x: 10.0,
                    y: 10.0,
                    width: 20.0,
                    height: 20.0,
                    confidence: 0.9,
                    landmarks: None,
                },
                encoding: Encoding::new(values),
            },
            identification,
        }
    }

    fn known_jane() -> Identification {
        Identification {
            name: "Jane".into(),
            index: Some(0),
            distance: Some(0.3),
        }
    }

    fn form(fields: &[(&str, &str)]) -> HashMap<String, String> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_decisions_from_form() {
        let fields = form(&[
            ("wrong_0", "on"),
            ("name_0", "Ann"),
            ("name_1", ""),
            ("name_5", "ignored"),
        ]);

        let decisions = decisions_from_form(&fields, 3);
        assert_eq!(decisions.len(), 3);
        assert_eq!(
            decisions[0],
            FaceDecision {
                marked_wrong: true,
                corrected_name: Some("Ann".into()),
            }
        );
        assert_eq!(
            decisions[1],
            FaceDecision {
                marked_wrong: false,
                corrected_name: Some(String::new()),
            }
        );
        assert_eq!(decisions[2], FaceDecision::default());
    }

    #[test]
    fn test_rename_blank_name_warns_and_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let (store, before) = jane_store(&dir);

        let notice = rename_record(&store, 0, "   \t").unwrap().unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.text, "Name cannot be empty.");
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_rename_trims_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = jane_store(&dir);

        let notice = rename_record(&store, 0, "  Ann ").unwrap().unwrap();
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.text, "✅ Updated name to 'Ann'");

        let book = store.load().unwrap();
        assert_eq!(book.get(0).unwrap().name, "Ann");
        assert_eq!(book.get(0).unwrap().timestamp, "2024-01-01 09:00:00");
    }

    #[test]
    fn test_rename_unchanged_name_does_not_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let (store, mut bytes) = jane_store(&dir);
        // A save would drop the trailing blank lines.
        bytes.extend_from_slice(b"\n\n\n");
        std::fs::write(store.path(), &bytes).unwrap();

        assert!(rename_record(&store, 0, " Jane ").unwrap().is_none());
        assert_eq!(std::fs::read(store.path()).unwrap(), bytes);
    }

    #[test]
    fn test_rename_out_of_range_warns() {
        let dir = tempfile::tempdir().unwrap();
        let (store, before) = jane_store(&dir);

        let notice = rename_record(&store, 3, "Ann").unwrap().unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_delete_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = jane_store(&dir);

        let notice = delete_record(&store, 0).unwrap();
        assert_eq!(notice.level, NoticeLevel::Info);
        assert_eq!(notice.text, "🗑️ Deleted 'Jane'");
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_delete_out_of_range_keeps_book() {
        let dir = tempfile::tempdir().unwrap();
        let (store, before) = jane_store(&dir);

        let notice = delete_record(&store, 1).unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert!(notice.text.contains("no longer exists"));
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_commit_upload_applies_review_form() {
        let dir = tempfile::tempdir().unwrap();
        let store = BookStore::new(dir.path().join("memory_book.json"));
        let history = HistoryDir::open(dir.path().join("history_photos")).unwrap();
        let pending = PendingUpload {
            image: image::RgbImage::new(100, 100),
            settings: IngestSettings::default(),
            faces: vec![
                pending_face(Identification::unknown(None), vec![1.0, 0.0]),
                pending_face(known_jane(), vec![0.0, 1.0]),
                pending_face(Identification::unknown(None), vec![5.0, 5.0]),
            ],
        };
        let fields = form(&[
            ("name_0", " Ann "),
            ("wrong_1", "on"),
            ("name_1", "Bob"),
        ]);

        let report = commit_upload(
            &pending,
            &fields,
            &store,
            &history,
            &Annotator::without_labels(),
            &MatchPolicy::default(),
        )
        .unwrap();

        assert_eq!(report.labels, ["Ann", "Bob", "Unknown"]);
        let names: Vec<String> = store
            .load()
            .unwrap()
            .records()
            .iter()
            .map(|r| r.name.clone())
            .collect();
        assert_eq!(names, ["Ann", "Bob"]);
        assert_eq!(history.list().unwrap().len(), 1);

        let notices = upload_notices(&report);
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.level == NoticeLevel::Success));
        assert_eq!(notices[0].text, "✅ Added 'Ann' to Memory Book.");
    }

    #[test]
    fn test_commit_upload_reports_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = jane_store(&dir);
        let history = HistoryDir::open(dir.path().join("history_photos")).unwrap();
        let pending = PendingUpload {
            image: image::RgbImage::new(100, 100),
            settings: IngestSettings::default(),
            faces: vec![pending_face(known_jane(), vec![0.3, 0.0])],
        };
        let fields = form(&[("wrong_0", "on"), ("name_0", "Ann")]);

        let report = commit_upload(
            &pending,
            &fields,
            &store,
            &history,
            &Annotator::without_labels(),
            &MatchPolicy::default(),
        )
        .unwrap();

        assert_eq!(report.duplicates, ["Ann"]);
        assert_eq!(store.load().unwrap().len(), 1);
        let notices = upload_notices(&report);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert_eq!(notices[0].text, "⚠️ 'Ann' already exists in Memory Book.");
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("abc.jpg"), "image/jpeg");
        assert_eq!(content_type("abc.JPEG"), "image/jpeg");
        assert_eq!(content_type("abc.png"), "image/png");
        assert_eq!(content_type("abc"), "application/octet-stream");
    }
}
