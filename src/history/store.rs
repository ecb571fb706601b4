//! File-backed, capped request history.
//!
//! The file is the only copy of the history: every operation re-reads it
//! under one mutex, so appends and reads are totally ordered. Writes go to a
//! `.tmp` sibling that is renamed over the log, so readers never see a
//! half-written array.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::snapshot::RequestSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("history file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("history file {path} is not a snapshot array: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode history: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("history task failed: {0}")]
    Task(String),
}

#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    capacity: usize,
    lock: Mutex<()>,
}

impl HistoryStore {
    /// Open the history file, creating it (and its directory) as `[]`
    /// when absent or empty. Existing content is left untouched.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, StoreError> {
        let path = path.into();
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        let mut content = Vec::new();
        file.read_to_end(&mut content).map_err(io_err)?;
        if content.iter().all(u8::is_ascii_whitespace) {
            file.write_all(b"[]").map_err(io_err)?;
            tracing::info!(path = %path.display(), "Initialized empty history file");
        }

        Ok(Self {
            path,
            capacity,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prepend `snapshot`, keeping at most `capacity` entries. Returns the
    /// number of entries now stored.
    ///
    /// A file that cannot be read or parsed is treated as empty and is
    /// overwritten.
    pub fn append(&self, snapshot: RequestSnapshot) -> Result<usize, StoreError> {
        let _guard = self.acquire();

        let mut entries = self.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "History unreadable, starting a new one");
            Vec::new()
        });
        entries.insert(0, snapshot);
        entries.truncate(self.capacity);

        self.write(&entries)?;
        Ok(entries.len())
    }

    /// Every stored snapshot, newest first.
    pub fn read_all(&self) -> Result<Vec<RequestSnapshot>, StoreError> {
        let _guard = self.acquire();
        self.load()
    }

    // The guarded data is `()`, so a poisoned lock carries no broken state.
    fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self) -> Result<Vec<RequestSnapshot>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, entries: &[RequestSnapshot]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(entries).map_err(StoreError::Encode)?;

        let tmp = self.tmp_path();
        fs::write(&tmp, &json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{FormFields, HeaderFields};
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn snapshot(n: usize) -> RequestSnapshot {
        RequestSnapshot::new(
            "127.0.0.1".into(),
            format!("/req/{}", n),
            "GET".into(),
            json!({ "n": n }),
            None,
            HeaderFields::new(),
        )
    }

    #[test]
    fn open_creates_empty_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/history.json");

        let store = HistoryStore::open(&path, 50).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn open_fills_empty_file_but_keeps_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");

        fs::write(&path, "").unwrap();
        HistoryStore::open(&path, 50).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");

        let store = HistoryStore::open(&path, 50).unwrap();
        store.append(snapshot(1)).unwrap();
        let before = fs::read_to_string(&path).unwrap();
        HistoryStore::open(&path, 50).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn open_fails_when_path_is_unusable() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened as the history file.
        assert!(matches!(
            HistoryStore::open(dir.path(), 50),
            Err(StoreError::Io { .. })
        ));
    }

    #[test]
    fn sixty_appends_keep_fifty_newest() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("h.json"), 50).unwrap();

        for n in 0..60 {
            store.append(snapshot(n)).unwrap();
        }

        let entries = store.read_all().unwrap();
        assert_eq!(entries.len(), 50);
        let uris: Vec<_> = entries.iter().map(|s| s.uri().to_string()).collect();
        let expected: Vec<_> = (10..60).rev().map(|n| format!("/req/{}", n)).collect();
        assert_eq!(uris, expected);
    }

    #[test]
    fn history_round_trips_unchanged() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("h.json"), 50).unwrap();

        let mut form = FormFields::new();
        form.add("a", "1");
        form.add("a", "2");
        let with_form = RequestSnapshot::new(
            "10.1.1.1".into(),
            "/form".into(),
            "POST".into(),
            Value::Null,
            Some(form),
            HeaderFields::from([("x-a".to_string(), vec!["1".to_string(), "2".to_string()])]),
        );

        let mut appended = vec![snapshot(0), with_form, snapshot(2)];
        for s in &appended {
            store.append(s.clone()).unwrap();
        }
        appended.reverse();

        assert_eq!(store.read_all().unwrap(), appended);
    }

    #[test]
    fn file_is_pretty_printed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h.json");
        let store = HistoryStore::open(&path, 50).unwrap();
        store.append(snapshot(7)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[\n  {\n    \"ip\": \"127.0.0.1\""));
        assert!(!dir.path().join("h.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_reads_as_error_and_is_replaced_on_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h.json");
        let store = HistoryStore::open(&path, 50).unwrap();
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(store.read_all(), Err(StoreError::Corrupt { .. })));

        assert_eq!(store.append(snapshot(1)).unwrap(), 1);
        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_appends_are_serialized() {
        let dir = tempdir().unwrap();
        let store = Arc::new(HistoryStore::open(dir.path().join("h.json"), 50).unwrap());

        std::thread::scope(|scope| {
            for t in 0..8 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for i in 0..20 {
                        store.append(snapshot(t * 100 + i)).unwrap();
                    }
                });
            }
        });

        let entries = store.read_all().unwrap();
        assert_eq!(entries.len(), 50);
        let unique: HashSet<_> = entries.iter().map(|s| s.uri().to_string()).collect();
        assert_eq!(unique.len(), 50);
    }
}
