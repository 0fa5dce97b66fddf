//! Directory of annotated photos, one JPEG per completed upload.

use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const PHOTO_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("failed to create history directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("history I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid history photo name: {0}")]
    InvalidName(String),
}

#[derive(Debug, Clone)]
pub struct HistoryDir {
    dir: PathBuf,
}

impl HistoryDir {
    /// Open the history directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| HistoryError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Write JPEG bytes under a fresh random name and return the full path.
    pub fn save_jpeg(&self, jpeg: &[u8]) -> Result<PathBuf, HistoryError> {
        let name = format!("{}.{PHOTO_EXTENSION}", Uuid::new_v4().simple());
        let path = self.dir.join(name);
        std::fs::write(&path, jpeg).map_err(|source| HistoryError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), bytes = jpeg.len(), "history photo saved");
        Ok(path)
    }

    /// File names in reverse lexicographic order.
    ///
    /// Names are random, so this is not a chronological ordering.
    pub fn list(&self) -> Result<Vec<String>, HistoryError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| self.io_error(source))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| self.io_error(source))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Read one photo by file name.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, HistoryError> {
        if !is_plain_file_name(name) {
            return Err(HistoryError::InvalidName(name.to_string()));
        }
        let path = self.dir.join(name);
        std::fs::read(&path).map_err(|source| HistoryError::Io { path, source })
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.dir.clone(),
            source,
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryDir::open(dir.path().join("history_photos")).unwrap();
        assert!(history.path().is_dir());
        assert!(history.list().unwrap().is_empty());
    }

    #[test]
    fn test_save_uses_random_hex_name() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryDir::open(dir.path()).unwrap();
        let path = history.save_jpeg(b"jpeg").unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        let (stem, ext) = name.split_once('.').unwrap();
        assert_eq!(ext, "jpg");
        assert_eq!(stem.len(), 32);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(history.read(name).unwrap(), b"jpeg");
    }

    #[test]
    fn test_list_reverse_lexicographic() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryDir::open(dir.path()).unwrap();
        for name in ["b.jpg", "a.jpg", "c.jpg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("z_subdir")).unwrap();
        assert_eq!(history.list().unwrap(), ["c.jpg", "b.jpg", "a.jpg"]);
    }

    #[test]
    fn test_read_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryDir::open(dir.path()).unwrap();
        for name in ["../secret", "..", "", "a/b.jpg"] {
            assert!(matches!(history.read(name), Err(HistoryError::InvalidName(_))));
        }
    }
}
