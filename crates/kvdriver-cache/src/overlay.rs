//! Key index kept beside the cache.
//!
//! The cache engine only supports point lookups, so the adapter records the
//! keys it has written. A key is present here while the adapter believes the
//! cache holds (or is about to hold) a value for it. Evictions made by the
//! cache's own policy are not observed, so entries can outlive their values.

use std::collections::BTreeSet;
use std::sync::Mutex;

use kvdriver_core::{Error, Result};

/// Mutex-guarded set of known keys, owned by one cache store.
#[derive(Debug, Default)]
pub struct KeyIndex {
    keys: Mutex<BTreeSet<Vec<u8>>>,
}

impl KeyIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`
    pub fn insert(&self, key: &[u8]) -> Result<()> {
        let mut keys = self.keys.lock().map_err(|_| Error::LockPoisoned)?;
        keys.insert(key.to_vec());
        Ok(())
    }

    /// Forget `key`
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        let mut keys = self.keys.lock().map_err(|_| Error::LockPoisoned)?;
        keys.remove(key);
        Ok(())
    }

    /// Whether `key` is recorded
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        let keys = self.keys.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(keys.contains(key))
    }

    /// Copy of the recorded keys, in key order.
    ///
    /// The lock is released before returning; later mutations do not affect
    /// the copy.
    pub fn snapshot(&self) -> Result<Vec<Vec<u8>>> {
        let keys = self.keys.lock().map_err(|_| Error::LockPoisoned)?;
        Ok(keys.iter().cloned().collect())
    }

    /// Number of recorded keys
    pub fn len(&self) -> usize {
        self.keys.lock().map(|keys| keys.len()).unwrap_or(0)
    }

    /// Whether no key is recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every key
    pub fn clear(&self) -> Result<()> {
        let mut keys = self.keys.lock().map_err(|_| Error::LockPoisoned)?;
        keys.clear();
        Ok(())
    }
}
