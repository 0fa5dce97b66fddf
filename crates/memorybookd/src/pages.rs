//! HTML rendering for the three views.
//!
//! Every page is rebuilt from the current book and session on each request.

use crate::session::{Notice, Page, SessionSettings, UploadSummary};
use memorybook_core::{DetectionModel, MemoryBook, PendingUpload};
use std::path::Path;

/// Read the stylesheet for the active theme.
pub fn load_css(theme_dir: &Path, dark_mode: bool) -> Result<String, String> {
    let file = if dark_mode { "dark.css" } else { "light.css" };
    std::fs::read_to_string(theme_dir.join(file))
        .map_err(|e| format!("Failed to load CSS file: {e}"))
}

/// Escape text for HTML element content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap a page body with the sidebar, theme and notices.
pub fn layout(
    settings: &SessionSettings,
    css: &Result<String, String>,
    notices: &[Notice],
    body: &str,
) -> String {
    let style = css.as_deref().unwrap_or("");
    let mut html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Memory Book</title>
<style>{style}</style>
</head>
<body class="{theme}">
{sidebar}
<main>
<h1 style="margin-bottom: 0;">AI Memory Book</h1>
<h6 style="margin-top: 0; font-weight: normal; color: gray;">
Memory Book for Alzheimer's Patients</h6>
"#,
        theme = if settings.dark_mode { "dark" } else { "light" },
        sidebar = sidebar(settings),
    );

    if let Err(err) = css {
        html.push_str(&format!(
            "<div class=\"notice error\">{}</div>\n",
            escape(err)
        ));
    }
    for notice in notices {
        html.push_str(&format!(
            "<div class=\"{}\">{}</div>\n",
            notice.level.css_class(),
            escape(&notice.text)
        ));
    }

    html.push_str(body);
    html.push_str("\n</main>\n</body>\n</html>\n");
    html
}

fn sidebar(settings: &SessionSettings) -> String {
    let checked = |on: bool| if on { " checked" } else { "" };
    let mode_text = if settings.dark_mode { "🌙 Dark Mode" } else { "☀️ Light Mode" };
    let model = settings.model.to_string();

    let nav: String = [Page::Home, Page::MemoryBook, Page::History]
        .into_iter()
        .map(|page| {
            let class = if page == settings.page {
                r#" class="active""#
            } else {
                ""
            };
            format!(
                "<li><a href=\"{}\"{class}>{}</a></li>\n",
                page.path(),
                page.title()
            )
        })
        .collect();

    format!(
        r#"<aside class="sidebar">
<form method="post" action="/settings">
<input type="hidden" name="return_to" value="{return_to}">
<label><input type="checkbox" name="dark_mode"{dark}> 🌗 Dark Mode</label>
<p><strong>Current Theme:</strong> {mode_text}</p>
<h3>⚙️ Detection Settings</h3>
<p>Face Detection Model:</p>
<label><input type="radio" name="model" value="fast"{fast}> Fast</label>
<label><input type="radio" name="model" value="accurate"{accurate}> Accurate</label>
<label>Resize image for processing
<input type="range" name="resize_factor" min="0.25" max="1.0" step="0.05"
 value="{resize:.2}"></label>
<button type="submit">Apply</button>
</form>
<nav>
<p>Navigate:</p>
<ul>
{nav}</ul>
</nav>
</aside>"#,
        return_to = settings.page.path(),
        dark = checked(settings.dark_mode),
        fast = checked(model == "fast"),
        accurate = checked(model == "accurate"),
        resize = settings.resize_factor,
    )
}

/// Upload view: review form while an upload is pending, otherwise the
/// uploader plus the last annotated photo.
pub fn home(pending: Option<&PendingUpload>, last: Option<&UploadSummary>) -> String {
    let mut html = String::new();

    if let Some(pending) = pending {
        html.push_str(&detected_line(pending.faces.len(), pending.settings.model));
        html.push_str(r#"<form method="post" action="/upload/confirm">"#);
        html.push('\n');
        for (i, face) in pending.faces.iter().enumerate() {
            html.push_str(&format!(
                r#"<div class="face-row">
<p>👤 Detected Name: <strong>{name}</strong></p>
<label><input type="checkbox" name="wrong_{i}"> Is this incorrect?</label>
<label>✏️ Enter correct name: <input type="text" name="name_{i}"></label>
</div>
"#,
                name = escape(&face.identification.name),
            ));
        }
        html.push_str(
            r#"<p class="hint">A name is used when the face is marked incorrect or unknown.</p>"#,
        );
        html.push_str("\n<button type=\"submit\">Save</button>\n</form>\n");
        return html;
    }

    html.push_str(
        r#"<form method="post" action="/upload" enctype="multipart/form-data">
<label>📷 Upload a Family Photo
<input type="file" name="photo" accept=".jpg,.jpeg,.png,image/jpeg,image/png"></label>
<button type="submit">Upload</button>
</form>
"#,
    );

    if let Some(last) = last {
        html.push_str(&detected_line(last.labels.len(), last.model));
        html.push_str(
            r#"<figure>
<img src="/upload/annotated.jpg" alt="Annotated Image">
<figcaption>📸 Annotated Image</figcaption>
</figure>
"#,
        );
    }
    html
}

fn detected_line(count: usize, model: DetectionModel) -> String {
    format!("<p>✅ Detected {count} face(s) using <strong>{model}</strong> model.</p>\n")
}

/// Book view: every record with rename and delete controls.
pub fn memory_book(book: &MemoryBook) -> String {
    let mut html = String::from("<h2>📖 View and Edit Memory Book</h2>\n");

    if book.is_empty() {
        html.push_str(r#"<div class="notice info">Memory Book is empty.</div>"#);
        html.push('\n');
        return html;
    }

    for (idx, record) in book.records().iter().enumerate() {
        let name = escape(&record.name);
        html.push_str(&format!(
            r#"<div class="book-row">
<div><p>👤 Name: <strong>{name}</strong></p><small>🕓 Added on: {timestamp}</small></div>
<form method="post" action="/book/{idx}/rename">
<label>Update name: <input type="text" name="name" value="{name}"></label>
<button type="submit">Update</button>
</form>
<form method="post" action="/book/{idx}/delete"><button type="submit">🗑️ Delete</button></form>
</div>
"#,
            timestamp = escape(&record.timestamp),
        ));
    }
    html
}

/// History view: every stored photo, newest name first.
pub fn history(names: &[String]) -> String {
    let mut html = String::from("<h2>🖼️ Historical Annotated Photos</h2>\n");

    if names.is_empty() {
        html.push_str(r#"<div class="notice info">No historical photos yet.</div>"#);
        html.push('\n');
        return html;
    }

    for name in names {
        html.push_str(&format!(
            "<img class=\"history-photo\" src=\"/history/{0}\" alt=\"{0}\">\n",
            escape(name)
        ));
    }
    html
}

/// Generic failure page.
pub fn failure() -> String {
    r#"<!DOCTYPE html>
<html lang="en"><head><meta charset="utf-8"><title>Memory Book</title></head>
<body>
<h1>Something went wrong</h1>
<p>The request could not be completed. <a href="/">Back to Memory Book</a></p>
</body>
</html>
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::NoticeLevel;
    use memorybook_core::ingest::{IngestSettings, PendingFace};
    use memorybook_core::{
        BoundingBox, DetectedFace, Encoding, FaceLocation, FaceRecord, Identification,
    };

    fn settings() -> SessionSettings {
        SessionSettings {
            dark_mode: false,
            model: DetectionModel::Accurate,
            resize_factor: 0.5,
            page: Page::History,
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_layout_reports_css_failure() {
        let css = Err("Failed to load CSS file: missing".to_string());
        let html = layout(&settings(), &css, &[], "<p>body</p>");
        assert!(html.contains(
            r#"<div class="notice error">Failed to load CSS file: missing</div>"#
        ));
        assert!(html.contains("<p>body</p>"));
    }

    #[test]
    fn test_layout_sidebar_reflects_settings() {
        let notices = [Notice {
            level: NoticeLevel::Success,
            text: "Added 'Jane'".into(),
        }];
        let html = layout(&settings(), &Ok("body{}".into()), &notices, "");
        assert!(html.contains("<style>body{}</style>"));
        assert!(html.contains(r#"value="accurate" checked"#));
        assert!(html.contains(r#"value="0.50""#));
        assert!(html.contains(r#"<a href="/history" class="active">"#));
        assert!(html.contains("☀️ Light Mode"));
        assert!(html.contains("Added &#39;Jane&#39;"));
    }

    #[test]
    fn test_load_css_missing_dir() {
        let err = load_css(Path::new("/nonexistent/themes"), true).unwrap_err();
        assert!(err.starts_with("Failed to load CSS file"));
    }

    #[test]
    fn test_home_review_form() {
        let face = PendingFace {
            detected: DetectedFace {
                location: FaceLocation::new(0, 10, 10, 0),
                bbox: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                    confidence: 0.9,
                    landmarks: None,
                },
                encoding: Encoding::new(vec![0.0]),
            },
            identification: Identification::unknown(None),
        };
        let pending = PendingUpload {
            image: image::RgbImage::new(20, 20),
            settings: IngestSettings::default(),
            faces: vec![face.clone(), face],
        };
        let html = home(Some(&pending), None);
        assert!(html.contains("Detected 2 face(s) using <strong>fast</strong> model."));
        assert!(html.contains(r#"name="wrong_1""#));
        assert!(html.contains(r#"name="name_0""#));
        assert!(html.contains("<strong>Unknown</strong>"));
    }

    #[test]
    fn test_home_uploader() {
        let html = home(None, None);
        assert!(html.contains(r#"enctype="multipart/form-data""#));
        assert!(!html.contains("annotated.jpg"));
    }

    #[test]
    fn test_memory_book_rows() {
        assert!(memory_book(&MemoryBook::default()).contains("Memory Book is empty."));

        let book = MemoryBook::new(vec![FaceRecord {
            encoding: Encoding::new(vec![0.1]),
            name: "Jane <3".into(),
            timestamp: "2024-02-03 04:05:06".into(),
        }]);
        let html = memory_book(&book);
        assert!(html.contains(r#"action="/book/0/rename""#));
        assert!(html.contains(r#"action="/book/0/delete""#));
        assert!(html.contains("Jane &lt;3"));
        assert!(html.contains("Added on: 2024-02-03 04:05:06"));
    }

    #[test]
    fn test_history_listing() {
        assert!(history(&[]).contains("No historical photos yet."));
        let html = history(&["b.jpg".into(), "a.jpg".into()]);
        let b = html.find("/history/b.jpg").unwrap();
        let a = html.find("/history/a.jpg").unwrap();
        assert!(b < a);
    }
}
