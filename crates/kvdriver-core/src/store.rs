//! The capability contract shared by every storage adapter.

use crate::engine::EngineType;
use crate::transaction::{Execute, TxGuarantee};
use crate::Result;

/// Callback invoked once per key or value during a traversal.
///
/// Returning an error stops the traversal; the error is handed back to the
/// caller unchanged.
pub type Visitor<'a> = dyn FnMut(&[u8]) -> Result<()> + 'a;

/// Uniform key-value interface over the supported engines.
///
/// All methods take `&self`; adapters are shared across threads and do their
/// own locking. Once [`close`](KeyValueStore::close) has been called, data and
/// partition operations fail with [`Error::Closed`](crate::Error::Closed).
pub trait KeyValueStore: Send + Sync {
    /// Engine behind this store
    fn engine(&self) -> EngineType;

    /// Path the store was opened with (a logical name for the cache engine)
    fn path(&self) -> &str;

    /// Returns `true` until the store is closed
    fn is_open(&self) -> bool;

    /// Size of the store in bytes; 0 when the engine cannot report it cheaply
    fn size(&self) -> Result<u64>;

    /// Number of keys; 0 when the engine cannot report it cheaply
    fn length(&self) -> usize;

    /// Retrieve the value stored under `key`
    ///
    /// Fails with [`Error::KeyNotFound`](crate::Error::KeyNotFound) when absent.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Insert or update a key-value pair; the write is readable on return
    fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key-value pair; the key is unreadable on return
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Visit every value
    fn for_each(&self, visit: &mut Visitor<'_>) -> Result<()>;

    /// Visit every key
    fn key_iterator(&self, visit: &mut Visitor<'_>) -> Result<()>;

    /// Run `execute` with a write bucket; see [`guarantee`](KeyValueStore::guarantee)
    fn update(&self, execute: &mut Execute<'_>) -> Result<()>;

    /// Guarantee offered by [`update`](KeyValueStore::update)
    fn guarantee(&self) -> TxGuarantee;

    /// Create partitions; a no-op on engines without them
    fn create_partitions(&self, names: &[&str]) -> Result<()>;

    /// Delete partitions; a no-op on engines without them
    fn delete_partitions(&self, names: &[&str]) -> Result<()>;

    /// Partition targeted by unqualified operations, if the engine has any
    fn active_partition(&self) -> Option<String> {
        None
    }

    /// Remove every entry reachable through unqualified operations
    fn clean(&self) -> Result<()>;

    /// Close the store and release the engine
    fn close(&self) -> Result<()>;
}
