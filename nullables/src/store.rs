//! Nullable store: thread-safe in-memory ordered key-value storage for testing.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use trustgate_store::{KvPair, KvStore, StoreError};

/// An in-memory [`KvStore`] backed by a `BTreeMap`.
#[derive(Default)]
pub struct NullKvStore {
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl NullKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("null store mutex poisoned".into()))
    }
}

impl KvStore for NullKvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.entries()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.entries()?.remove(key);
        Ok(())
    }

    fn range(&self, start: &[u8], end: &[u8]) -> Result<Vec<KvPair>, StoreError> {
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end)
        };
        if !end.is_empty() && start >= end {
            return Ok(Vec::new());
        }
        Ok(self
            .entries()?
            .range::<[u8], _>((Bound::Included(start), upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_half_open_and_ordered() {
        let store = NullKvStore::new();
        for key in [b"a/2".as_slice(), b"a/1", b"b/1", b"a/3"] {
            store.put(key, b"v").unwrap();
        }
        let keys: Vec<Vec<u8>> = store
            .range(b"a/1", b"a/3")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"a/1".to_vec(), b"a/2".to_vec()]);
        assert_eq!(store.scan_prefix(b"a/").unwrap().len(), 3);
        assert_eq!(store.range(b"b", b"").unwrap().len(), 1);
    }

    #[test]
    fn delete_absent_key_is_ok() {
        let store = NullKvStore::new();
        store.delete(b"missing").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn inverted_range_is_empty() {
        let store = NullKvStore::new();
        store.put(b"k", b"v").unwrap();
        assert!(store.range(b"z", b"a").unwrap().is_empty());
    }
}
