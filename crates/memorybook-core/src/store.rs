//! Memory book persistence.
//!
//! The whole book is a single JSON array, read in full on load and rewritten
//! in full on every save. Saves go through a sibling temp file and a rename.

use crate::types::FaceRecord;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const TEMP_SUFFIX: &str = "tmp";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corrupt memory book {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize memory book: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BookError {
    #[error("no entry at position {index} (book has {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Ordered face records. Insertion order is display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryBook {
    records: Vec<FaceRecord>,
}

impl MemoryBook {
    pub fn new(records: Vec<FaceRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[FaceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: FaceRecord) {
        self.records.push(record);
    }

    pub fn get(&self, index: usize) -> Option<&FaceRecord> {
        self.records.get(index)
    }

    /// Replace the name of the record at `index`. Returns whether it changed.
    pub fn rename(&mut self, index: usize, name: &str) -> Result<bool, BookError> {
        let len = self.records.len();
        let record = self
            .records
            .get_mut(index)
            .ok_or(BookError::IndexOutOfRange { index, len })?;
        if record.name == name {
            return Ok(false);
        }
        record.name = name.to_string();
        Ok(true)
    }

    /// Remove the record at `index`, keeping the order of the rest.
    pub fn remove(&mut self, index: usize) -> Result<FaceRecord, BookError> {
        if index >= self.records.len() {
            return Err(BookError::IndexOutOfRange {
                index,
                len: self.records.len(),
            });
        }
        Ok(self.records.remove(index))
    }
}

/// File-backed store for a [`MemoryBook`].
#[derive(Debug, Clone)]
pub struct BookStore {
    path: PathBuf,
}

impl BookStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the book. A missing file is an empty book.
    pub fn load(&self) -> Result<MemoryBook, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no memory book yet, starting empty");
                return Ok(MemoryBook::default());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Overwrite the store with `book`.
    pub fn save(&self, book: &MemoryBook) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(book)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.write_error(source))?;
        }

        let tmp = self.path.with_extension(TEMP_SUFFIX);
        let write_tmp = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()
        };
        write_tmp().map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| self.write_error(source))?;

        tracing::debug!(path = %self.path.display(), records = book.len(), "memory book saved");
        Ok(())
    }

    fn write_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Encoding;

    fn record(name: &str, seed: f32) -> FaceRecord {
        FaceRecord {
            encoding: Encoding::new(vec![seed, seed / 3.0, -seed]),
            name: name.into(),
            timestamp: "2024-05-01 10:30:00".into(),
        }
    }

    fn sample_book() -> MemoryBook {
        MemoryBook::new(vec![record("Jane", 0.1), record("Tom", 0.7), record("Ann", 0.33)])
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = BookStore::new(dir.path().join("memory_book.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory_book.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = BookStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = BookStore::new(dir.path().join("nested/memory_book.json"));
        let book = sample_book();
        store.save(&book).unwrap();
        assert_eq!(store.load().unwrap(), book);
        assert!(!dir.path().join("nested/memory_book.tmp").exists());
    }

    #[test]
    fn test_resave_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = BookStore::new(dir.path().join("memory_book.json"));
        store.save(&sample_book()).unwrap();
        let first = std::fs::read(store.path()).unwrap();

        let loaded = store.load().unwrap();
        store.save(&loaded).unwrap();
        let second = std::fs::read(store.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut book = sample_book();
        let removed = book.remove(1).unwrap();
        assert_eq!(removed.name, "Tom");
        let names: Vec<_> = book.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Jane", "Ann"]);
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut book = sample_book();
        assert_eq!(
            book.remove(3).unwrap_err(),
            BookError::IndexOutOfRange { index: 3, len: 3 }
        );
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn test_rename_touches_only_name() {
        let mut book = sample_book();
        let before = book.get(0).unwrap().clone();
        assert!(book.rename(0, "Janet").unwrap());
        let after = book.get(0).unwrap();
        assert_eq!(after.name, "Janet");
        assert_eq!(after.encoding, before.encoding);
        assert_eq!(after.timestamp, before.timestamp);
        assert!(!book.rename(0, "Janet").unwrap());
    }

    #[test]
    fn test_delete_then_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = BookStore::new(dir.path().join("memory_book.json"));
        store.save(&sample_book()).unwrap();

        let mut book = store.load().unwrap();
        book.remove(0).unwrap();
        store.save(&book).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(0).unwrap().name, "Tom");
    }
}
