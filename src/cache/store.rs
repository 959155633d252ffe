//! Cache storage boundary.
//!
//! The cache layer is a plain key-value collaborator: get/set/delete with no
//! transactions and no independent lifecycle. Presence or absence of a key
//! is the staleness signal, so an entry holding an empty list is distinct
//! from a missing entry.

use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("cache backend unavailable: {0}")]
    Backend(String),
}

/// Typed values held by the cache layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    /// Ordered list of strings: a header list or an item window.
    Items(Vec<String>),
    /// Full-availability flag.
    Flag(bool),
}

impl CacheValue {
    pub fn as_items(&self) -> Option<&[String]> {
        match self {
            CacheValue::Items(items) => Some(items),
            CacheValue::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            CacheValue::Flag(flag) => Some(*flag),
            CacheValue::Items(_) => None,
        }
    }
}

/// Key-value store the sync engine writes derived entries into.
///
/// Failures here are never authoritative: callers fall back to the
/// persistent store rather than failing the request.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheStoreError>;

    fn set(&self, key: &str, value: CacheValue) -> Result<(), CacheStoreError>;

    fn delete(&self, key: &str) -> Result<(), CacheStoreError>;

    /// Remove every key starting with `prefix`. Used to purge a user's
    /// entries on logout.
    fn delete_prefix(&self, prefix: &str) -> Result<(), CacheStoreError>;
}

/// In-process cache backend. The default deployment keeps cache entries
/// process-local, mirroring the store this design replaced; a networked
/// backend slots in at the [`CacheStore`] trait.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheValue>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheStoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: CacheValue) -> Result<(), CacheStoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheStoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<(), CacheStoreError> {
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_is_none_not_empty() {
        let store = MemoryCacheStore::new();
        assert!(store.get("b3x9-Names").unwrap().is_none());

        store
            .set("b3x9-Names", CacheValue::Items(Vec::new()))
            .unwrap();

        // An empty cached list is present, which is a different state from
        // the key being absent.
        let value = store.get("b3x9-Names").unwrap().expect("present");
        assert_eq!(value.as_items().unwrap().len(), 0);
    }

    #[test]
    fn delete_prefix_only_touches_matching_user() {
        let store = MemoryCacheStore::new();
        store
            .set("b3x9-Names", CacheValue::Items(vec!["one".into()]))
            .unwrap();
        store
            .set("b3x9-Names-full_available", CacheValue::Flag(true))
            .unwrap();
        store
            .set("zz00-Names", CacheValue::Items(vec!["two".into()]))
            .unwrap();

        store.delete_prefix("b3x9-").unwrap();

        assert!(store.get("b3x9-Names").unwrap().is_none());
        assert!(store.get("b3x9-Names-full_available").unwrap().is_none());
        assert!(store.get("zz00-Names").unwrap().is_some());
    }

    #[test]
    fn set_overwrites_previous_value() {
        let store = MemoryCacheStore::new();
        store.set("k", CacheValue::Flag(false)).unwrap();
        store.set("k", CacheValue::Flag(true)).unwrap();
        assert_eq!(store.get("k").unwrap().unwrap().as_flag(), Some(true));
    }
}
