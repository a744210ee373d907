use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::Store;
use crate::common::StoreError;

/// An in-process [`Store`] backed by an ordered map.
///
/// Used by tests and single-process deployments. The write lock makes every
/// primitive atomic with respect to concurrent callers, which is the same
/// per-operation contract a networked store provides. The ordered map makes
/// scans deterministic.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Removes every stored key.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no keys at all.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn incr_by(&self, key: &str, delta: f64) -> Result<f64, StoreError> {
        let mut entries = self.entries.write();
        let current =
            entries.get(key).and_then(|raw| raw.parse::<f64>().ok()).unwrap_or_default();
        let updated = current + delta;
        entries.insert(key.to_string(), updated.to_string());
        Ok(updated)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryStore, Store};

    #[test]
    fn incr_treats_missing_key_as_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_by("k", 2.5).unwrap(), 2.5);
        assert_eq!(store.incr_by("k", -1.0).unwrap(), 1.5);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("1.5"));
    }

    #[test]
    fn set_overwrites() {
        let store = MemoryStore::new();
        store.set("k", "123").unwrap();
        store.set("k", "5").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("5"));
    }

    #[test]
    fn scan_is_bounded_by_prefix() {
        let store = MemoryStore::new();
        store.set("a:1", "1").unwrap();
        store.set("a:2", "2").unwrap();
        store.set("ab", "3").unwrap();
        store.set("b:1", "4").unwrap();

        let hits = store.scan_prefix("a:").unwrap();
        assert_eq!(
            hits,
            vec![
                ("a:1".to_string(), "1".to_string()),
                ("a:2".to_string(), "2".to_string()),
            ]
        );
        assert!(store.scan_prefix("c").unwrap().is_empty());
    }

    #[test]
    fn clear_empties_the_store() {
        let store = MemoryStore::new();
        store.set("k", "1").unwrap();
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }
}
