//! # kvdriver
//!
//! One key-value interface over three embedded engines. The engine is picked
//! when the store is opened; call sites stay the same.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kvdriver::{Database, EngineType, Options};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let opts = Options::new().with_bucket("blocks");
//!     let db = Database::open(EngineType::PageTree, "./blocks.db", &opts)?;
//!
//!     db.upsert(b"block:1", b"genesis")?;
//!     assert_eq!(db.get(b"block:1")?, b"genesis");
//!
//!     db.update(|bucket| {
//!         bucket.put(b"block:2", b"second")?;
//!         bucket.delete(b"block:1")
//!     })?;
//!
//!     db.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Engines
//!
//! | engine | partitions | `update` | `size` / `length` |
//! |---|---|---|---|
//! | [`EngineType::PageTree`] | named, one active | atomic | file size / key count |
//! | [`EngineType::LogStructured`] | ignored (flat) | atomic | always 0 |
//! | [`EngineType::MemoryCache`] | ignored (flat) | best effort, no rollback | 0 / overlay count |
//!
//! Query [`Database::guarantee`] instead of assuming `update` is atomic.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

pub mod logging;

// Re-export core types
pub use kvdriver_core::{
    Bucket, BoxError, EngineType, Error, ErrorKind, Execute, FnBucket, KeyValueStore, Options,
    Result, TxGuarantee, Visitor, DEFAULT_PARTITION, DEFAULT_TIMEOUT,
};

// Adapters
pub use kvdriver_cache::{CacheStore, KeyIndex, VisibilityWaiter};
pub use kvdriver_lsm::LogStore;
pub use kvdriver_pagetree::PageTreeStore;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Adapter behind a [`Database`].
enum StorageBackend {
    /// redb file with named partitions
    PageTree(PageTreeStore),
    /// fjall keyspace, flat namespace
    LogStructured(LogStore),
    /// stretto cache with key overlay
    Cache(CacheStore),
}

impl StorageBackend {
    fn store(&self) -> &dyn KeyValueStore {
        match self {
            StorageBackend::PageTree(store) => store,
            StorageBackend::LogStructured(store) => store,
            StorageBackend::Cache(store) => store,
        }
    }
}

/// Engine, location and options of a store, as found in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Engine to open
    pub engine: EngineType,
    /// Filesystem path, or the cache name
    pub path: String,
    /// Engine options
    #[serde(flatten)]
    pub options: Options,
}

/// The main database handle.
///
/// Thread-safe and cheap to clone; clones share the same underlying store.
#[derive(Clone)]
pub struct Database {
    inner: Arc<StorageBackend>,
}

impl Database {
    /// Opens a store with the given engine.
    ///
    /// `path` is the database file (page-tree), the keyspace directory
    /// (log-structured) or a logical name (cache).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use kvdriver::{Database, EngineType, Options};
    ///
    /// let cache = Database::open(EngineType::MemoryCache, "sessions", &Options::new())?;
    /// cache.upsert(b"token", b"abc")?;
    /// assert_eq!(cache.get(b"token")?, b"abc");
    /// # Ok::<(), kvdriver::Error>(())
    /// ```
    pub fn open<P: AsRef<Path>>(engine: EngineType, path: P, options: &Options) -> Result<Self> {
        let path = path.as_ref();
        info!(%engine, path = %path.display(), "Opening kvdriver store");

        let backend = match engine {
            EngineType::PageTree => StorageBackend::PageTree(PageTreeStore::open(path, options)?),
            EngineType::LogStructured => {
                StorageBackend::LogStructured(LogStore::open(path, options)?)
            }
            EngineType::MemoryCache => {
                StorageBackend::Cache(CacheStore::open(&path.to_string_lossy(), options)?)
            }
        };
        Ok(Database {
            inner: Arc::new(backend),
        })
    }

    /// Opens a store from a numeric engine selector.
    ///
    /// Selectors outside the known range fail with [`Error::UnknownEngine`].
    pub fn open_selector<P: AsRef<Path>>(selector: i64, path: P, options: &Options) -> Result<Self> {
        Self::open(EngineType::try_from(selector)?, path, options)
    }

    /// Opens the store described by `config`.
    pub fn open_config(config: &StoreConfig) -> Result<Self> {
        Self::open(config.engine, &config.path, &config.options)
    }

    /// The store as a trait object.
    pub fn as_store(&self) -> &dyn KeyValueStore {
        self.inner.store()
    }

    /// Engine behind this handle.
    pub fn engine(&self) -> EngineType {
        self.as_store().engine()
    }

    /// Path or cache name given at open.
    pub fn path(&self) -> &str {
        self.as_store().path()
    }

    /// Returns `true` until [`close`](Database::close) is called.
    pub fn is_open(&self) -> bool {
        self.as_store().is_open()
    }

    /// Size in bytes; 0 when the engine does not report it.
    pub fn size(&self) -> Result<u64> {
        self.as_store().size()
    }

    /// Number of keys; 0 when the engine does not report it.
    pub fn length(&self) -> usize {
        self.as_store().length()
    }

    /// Retrieves the value under `key`.
    ///
    /// Fails with [`Error::KeyNotFound`] when the key is absent.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.as_store().get(key)
    }

    /// Inserts or updates a key-value pair.
    ///
    /// The value is readable by any thread once this returns, on every engine.
    pub fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.as_store().upsert(key, value)
    }

    /// Deletes a key-value pair.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.as_store().delete(key)
    }

    /// Calls `visit` with every value; the first error stops the traversal
    /// and is returned as-is.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use kvdriver::{Database, EngineType, Options};
    ///
    /// let db = Database::open(EngineType::MemoryCache, "scores", &Options::new())?;
    /// db.upsert(b"alice", b"3")?;
    /// db.upsert(b"bob", b"5")?;
    ///
    /// let mut values = Vec::new();
    /// db.for_each(|v| {
    ///     values.push(v.to_vec());
    ///     Ok(())
    /// })?;
    /// assert_eq!(values.len(), 2);
    /// # Ok::<(), kvdriver::Error>(())
    /// ```
    pub fn for_each<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        self.as_store().for_each(&mut visit)
    }

    /// Calls `visit` with every key; the first error stops the traversal and
    /// is returned as-is.
    pub fn key_iterator<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        self.as_store().key_iterator(&mut visit)
    }

    /// Runs `execute` with a write bucket.
    ///
    /// Atomic on the disk engines; on the cache engine each write is applied
    /// as it is made and nothing is rolled back. See [`guarantee`](Database::guarantee).
    pub fn update<F>(&self, mut execute: F) -> Result<()>
    where
        F: FnMut(&mut dyn Bucket) -> Result<()>,
    {
        self.as_store().update(&mut execute)
    }

    /// What [`update`](Database::update) promises on this engine.
    pub fn guarantee(&self) -> TxGuarantee {
        self.as_store().guarantee()
    }

    /// Creates partitions; the last non-empty name becomes active.
    pub fn create_partitions(&self, names: &[&str]) -> Result<()> {
        self.as_store().create_partitions(names)
    }

    /// Deletes partitions.
    pub fn delete_partitions(&self, names: &[&str]) -> Result<()> {
        self.as_store().delete_partitions(names)
    }

    /// Partition targeted by unqualified operations.
    pub fn active_partition(&self) -> Option<String> {
        self.as_store().active_partition()
    }

    /// Removes every entry reachable through unqualified operations.
    pub fn clean(&self) -> Result<()> {
        self.as_store().clean()
    }

    /// Closes the store for every clone of this handle.
    pub fn close(&self) -> Result<()> {
        self.as_store().close()
    }

    /// Returns whether the engine persists to disk.
    pub fn is_persistent(&self) -> bool {
        matches!(
            self.inner.as_ref(),
            StorageBackend::PageTree(_) | StorageBackend::LogStructured(_)
        )
    }
}

impl KeyValueStore for Database {
    fn engine(&self) -> EngineType {
        self.as_store().engine()
    }

    fn path(&self) -> &str {
        self.as_store().path()
    }

    fn is_open(&self) -> bool {
        self.as_store().is_open()
    }

    fn size(&self) -> Result<u64> {
        self.as_store().size()
    }

    fn length(&self) -> usize {
        self.as_store().length()
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.as_store().get(key)
    }

    fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.as_store().upsert(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.as_store().delete(key)
    }

    fn for_each(&self, visit: &mut Visitor<'_>) -> Result<()> {
        self.as_store().for_each(visit)
    }

    fn key_iterator(&self, visit: &mut Visitor<'_>) -> Result<()> {
        self.as_store().key_iterator(visit)
    }

    fn update(&self, execute: &mut Execute<'_>) -> Result<()> {
        self.as_store().update(execute)
    }

    fn guarantee(&self) -> TxGuarantee {
        self.as_store().guarantee()
    }

    fn create_partitions(&self, names: &[&str]) -> Result<()> {
        self.as_store().create_partitions(names)
    }

    fn delete_partitions(&self, names: &[&str]) -> Result<()> {
        self.as_store().delete_partitions(names)
    }

    fn active_partition(&self) -> Option<String> {
        self.as_store().active_partition()
    }

    fn clean(&self) -> Result<()> {
        self.as_store().clean()
    }

    fn close(&self) -> Result<()> {
        self.as_store().close()
    }
}

/// Opens a store; shorthand for [`Database::open`].
pub fn open<P: AsRef<Path>>(engine: EngineType, path: P, options: &Options) -> Result<Database> {
    Database::open(engine, path, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.3.0");
    }

    #[test]
    fn test_open_every_engine() {
        let dir = tempdir().unwrap();
        let opts = Options::new().with_bucket("tbucket");
        for engine in EngineType::ALL {
            let path = dir.path().join(format!("{}.db", engine));
            let db = Database::open(engine, &path, &opts).unwrap();
            assert_eq!(db.engine(), engine);
            assert!(db.is_open());
            assert_eq!(db.is_persistent(), engine.is_persistent());
            db.close().unwrap();
            assert!(!db.is_open());
        }
    }

    #[test]
    fn test_invalid_selector() {
        let dir = tempdir().unwrap();
        let result = Database::open_selector(99, dir.path().join("test.db"), &Options::default());
        assert!(matches!(result, Err(Error::UnknownEngine(99))));
    }

    #[test]
    fn test_selector_opens_matching_engine() {
        let db = Database::open_selector(2, "cache", &Options::default()).unwrap();
        assert_eq!(db.engine(), EngineType::MemoryCache);
        assert_eq!(db.path(), "cache");
        assert_eq!(db.guarantee(), TxGuarantee::BestEffortSequential);
    }

    #[test]
    fn test_open_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.db");
        let json = format!(
            r#"{{"engine":"pagetree","path":{:?},"bucket":"tbucket"}}"#,
            path.to_string_lossy()
        );
        let config: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.options.bucket, "tbucket");

        let db = Database::open_config(&config).unwrap();
        assert_eq!(db.active_partition().as_deref(), Some("tbucket"));
        assert_eq!(db.guarantee(), TxGuarantee::Atomic);
    }

    #[test]
    fn test_clones_share_state() {
        let db = Database::open(EngineType::MemoryCache, "shared", &Options::new()).unwrap();
        let clone = db.clone();
        db.upsert(b"k", b"v").unwrap();
        assert_eq!(clone.get(b"k").unwrap(), b"v");
        clone.close().unwrap();
        assert!(!db.is_open());
    }

    #[test]
    fn test_usable_as_trait_object() {
        let db = Database::open(EngineType::MemoryCache, "dyn", &Options::new()).unwrap();
        let store: Box<dyn KeyValueStore> = Box::new(db);
        store.upsert(b"k", b"v").unwrap();
        let mut count = 0;
        store
            .key_iterator(&mut |_: &[u8]| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
