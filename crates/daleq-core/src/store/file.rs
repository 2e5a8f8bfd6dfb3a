// ── JSON file store ──
//
// The whole store is one JSON document, `{device_path: {property: value}}`,
// loaded on open and rewritten after every accepted write.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, warn};

use super::{Store, device_path};
use crate::error::CoreError;

type Document = BTreeMap<String, BTreeMap<String, Value>>;

/// Durable [`Store`] backed by a JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    document: Mutex<Document>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let document = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| CoreError::Store {
                message: format!("{}: {e}", path.display()),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::new(),
            Err(e) => return Err(CoreError::Io(e)),
        };

        debug!(path = %path.display(), devices = document.len(), "opened file store");
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, document: &Document) -> Result<(), CoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let text = serde_json::to_string_pretty(document).map_err(|e| CoreError::Store {
            message: e.to_string(),
        })?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

impl Store for FileStore {
    fn get(&self, fqid: &[String], key: &str) -> Option<Value> {
        let document = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        document.get(&device_path(fqid))?.get(key).cloned()
    }

    fn set(&self, fqid: &[String], key: &str, value: Value) -> bool {
        let mut document = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        let path = device_path(fqid);
        let previous = document
            .entry(path.clone())
            .or_default()
            .insert(key.to_string(), value);

        match self.persist(&document) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    store = %self.path.display(),
                    device = %path,
                    key,
                    error = %e,
                    "failed to write store, change discarded"
                );
                let entries = document.entry(path).or_default();
                match previous {
                    Some(previous) => {
                        entries.insert(key.to_string(), previous);
                    }
                    None => {
                        entries.remove(key);
                    }
                }
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fqid(path: &[&str]) -> Vec<String> {
        path.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();
        assert_eq!(store.get(&fqid(&["d1"]), "enabled"), None);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = FileStore::open(&path).unwrap();
        assert!(store.set(&fqid(&["fractal", "bus1", "d3"]), "state", json!(true)));
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(&fqid(&["fractal", "bus1", "d3"]), "state"),
            Some(json!(true))
        );
        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"fractal/bus1/d3": {"state": true}}));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, CoreError::Store { .. }));
    }

    #[test]
    fn failed_write_reports_false_and_keeps_old_value() {
        let dir = tempfile::tempdir().unwrap();
        // The store path is a directory, so every write fails.
        let store = FileStore {
            path: dir.path().to_path_buf(),
            document: Mutex::new(Document::new()),
        };
        assert!(!store.set(&fqid(&["d1"]), "enabled", json!(false)));
        assert_eq!(store.get(&fqid(&["d1"]), "enabled"), None);
    }
}
