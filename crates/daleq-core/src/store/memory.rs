// ── In-memory store ──
//
// Lock-free map from (device path, property) to value. Nothing survives
// the process.

use dashmap::DashMap;
use serde_json::Value;

use super::{Store, device_path};

/// Volatile [`Store`] backed by a `DashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<(String, String), Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, fqid: &[String], key: &str) -> Option<Value> {
        self.entries
            .get(&(device_path(fqid), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    fn set(&self, fqid: &[String], key: &str, value: Value) -> bool {
        self.entries.insert((device_path(fqid), key.to_string()), value);
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fqid(path: &[&str]) -> Vec<String> {
        path.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn miss_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get(&fqid(&["fractal", "d1"]), "enabled"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn entries_are_scoped_by_device() {
        let store = MemoryStore::new();
        assert!(store.set(&fqid(&["fractal", "d1"]), "enabled", json!(false)));
        assert!(store.set(&fqid(&["fractal", "bus1", "d1"]), "enabled", json!(true)));

        assert_eq!(store.get(&fqid(&["fractal", "d1"]), "enabled"), Some(json!(false)));
        assert_eq!(store.get(&fqid(&["fractal", "bus1", "d1"]), "enabled"), Some(json!(true)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn set_overwrites() {
        let store = MemoryStore::new();
        let d1 = fqid(&["d1"]);
        store.set(&d1, "state", json!("on"));
        store.set(&d1, "state", json!("off"));
        assert_eq!(store.get(&d1, "state"), Some(json!("off")));
        assert_eq!(store.len(), 1);
    }
}
