//! In-memory key-value store

use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::KeyValueStore;
use crate::error::Result;

/// Process-local store that keeps nothing after exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_scan_is_ordered() {
        let store = MemoryStore::new();
        store.set("p:b", "2").unwrap();
        store.set("p:a", "1").unwrap();
        store.set("q:a", "3").unwrap();

        assert_eq!(store.keys_with_prefix("p:").unwrap(), vec!["p:a", "p:b"]);
        assert_eq!(store.keys_with_prefix("").unwrap().len(), 3);
    }
}
