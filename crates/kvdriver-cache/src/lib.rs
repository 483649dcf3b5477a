//! # kvdriver Cache Adapter
//!
//! ## ⚠️ Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of kvdriver.** Use the
//! main [`kvdriver`](https://docs.rs/kvdriver) crate instead.
//!
//! ---
//!
//! Wraps a [`stretto`] cache: TinyLFU admission, sampled LFU eviction, and
//! writes applied asynchronously by a background worker. Two pieces make it
//! behave like the disk engines:
//!
//! - a [`KeyIndex`] overlay, because the cache cannot enumerate its keys;
//! - a [`VisibilityWaiter`], because a write is only readable once the
//!   worker has applied it.
//!
//! ```text
//! Absent ──upsert──▶ Pending ──applied──▶ Visible ──delete──▶ PendingRemoval ──▶ Absent
//!                    (upsert returns here only after Visible)
//! ```
//!
//! Caveats callers must know about:
//!
//! - keys evicted by the cache policy stay in the overlay, so a traversal can
//!   fail with [`Error::KeyNotFound`] on a key it listed;
//! - traversals are not snapshots: each value is a separate point lookup;
//! - [`update`](KeyValueStore::update) applies each write immediately and
//!   rolls nothing back ([`TxGuarantee::BestEffortSequential`]).

use std::sync::{Arc, RwLock};

use kvdriver_core::{
    EngineType, Error, Execute, FnBucket, KeyValueStore, Options, Result, TxGuarantee, Visitor,
};
use stretto::Cache;
use tracing::{debug, info, warn};

pub mod overlay;
pub mod wait;

pub use overlay::KeyIndex;
pub use wait::{VisibilityWaiter, POLL_INTERVAL};

/// Maximum total cost when [`Options::size`] is zero.
pub const DEFAULT_MAX_COST: u64 = 1_000_000;

/// Largest total cost [`Options::size`] may ask for.
pub const MAX_COST: u64 = i64::MAX as u64 / COUNTERS_PER_COST;

/// Admission counters kept per unit of maximum cost.
const COUNTERS_PER_COST: u64 = 10;

/// Upper bound on admission counters, whatever the maximum cost.
const MAX_COUNTERS: u64 = 1 << 24;

type Engine = Cache<Vec<u8>, Vec<u8>>;

fn storage<E: std::fmt::Display>(err: E) -> Error {
    Error::Storage(err.to_string())
}

/// Key-value store held in an in-memory admission cache.
pub struct CacheStore {
    name: String,
    cache: RwLock<Option<Arc<Engine>>>,
    keys: KeyIndex,
    waiter: VisibilityWaiter,
}

impl CacheStore {
    /// Create a cache named `name`.
    ///
    /// `options.size` bounds the total cost (value bytes) the cache admits;
    /// `options.timeout` bounds each visibility wait.
    pub fn open(name: &str, options: &Options) -> Result<Self> {
        let max_cost = if options.size == 0 {
            DEFAULT_MAX_COST
        } else {
            options.size
        };
        if max_cost > MAX_COST {
            return Err(Error::InvalidOperation(format!(
                "cache size too large: {} (max {})",
                max_cost, MAX_COST
            )));
        }
        let counters = usize::try_from((max_cost * COUNTERS_PER_COST).min(MAX_COUNTERS))
            .map_err(|_| Error::InvalidOperation(format!("cache size too large: {}", max_cost)))?;
        let max_cost = i64::try_from(max_cost)
            .map_err(|_| Error::InvalidOperation(format!("cache size too large: {}", max_cost)))?;

        let cache = Engine::new(counters, max_cost)
            .map_err(|e| Error::open(EngineType::MemoryCache, e))?;

        let store = Self {
            name: name.to_string(),
            cache: RwLock::new(Some(Arc::new(cache))),
            keys: KeyIndex::new(),
            waiter: VisibilityWaiter::new(options.visibility_timeout()),
        };
        info!(name = %store.name, max_cost, "Opened cache store");
        Ok(store)
    }

    /// The overlay of keys written through this store.
    pub fn keys(&self) -> &KeyIndex {
        &self.keys
    }

    fn engine_handle(&self) -> Result<Arc<Engine>> {
        self.cache
            .read()
            .map_err(|_| Error::LockPoisoned)?
            .clone()
            .ok_or(Error::Closed)
    }

    fn is_present(cache: &Engine, key: &[u8]) -> bool {
        cache.get(&key.to_vec()).is_some()
    }

    /// Blocks until the presence of `key` in the cache equals `present`.
    fn await_presence(&self, cache: &Engine, key: &[u8], present: bool) -> Result<()> {
        if Self::is_present(cache, key) == present {
            return Ok(());
        }
        // Drain the insert buffer once before falling back to polling.
        cache.wait().map_err(storage)?;
        self.waiter
            .wait_until(|| Self::is_present(cache, key) == present)
    }
}

impl KeyValueStore for CacheStore {
    fn engine(&self) -> EngineType {
        EngineType::MemoryCache
    }

    fn path(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.cache.read().map(|c| c.is_some()).unwrap_or(false)
    }

    fn size(&self) -> Result<u64> {
        Ok(0)
    }

    fn length(&self) -> usize {
        if !self.is_open() {
            return 0;
        }
        self.keys.len()
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let cache = self.engine_handle()?;
        let value = cache.get(&key.to_vec()).map(|v| v.value().clone());
        value.ok_or(Error::KeyNotFound)
    }

    fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let cache = self.engine_handle()?;
        let cost = i64::try_from(value.len()).unwrap_or(i64::MAX);
        if !cache.insert(key.to_vec(), value.to_vec(), cost) {
            warn!(name = %self.name, cost, "Cache rejected write");
            return Err(Error::AdmissionRejected);
        }
        self.keys.insert(key)?;

        if let Err(e) = self.await_presence(&cache, key, true) {
            // Never applied; keep the overlay limited to keys the cache holds.
            self.keys.remove(key)?;
            warn!(name = %self.name, error = %e, "Cache write never became visible");
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let cache = self.engine_handle()?;
        self.keys.remove(key)?;
        cache.remove(&key.to_vec());
        self.await_presence(&cache, key, false).map_err(|e| {
            warn!(name = %self.name, error = %e, "Cache delete never became visible");
            e
        })
    }

    fn for_each(&self, visit: &mut Visitor<'_>) -> Result<()> {
        self.engine_handle()?;
        for key in self.keys.snapshot()? {
            let value = self.get(&key)?;
            visit(&value)?;
        }
        Ok(())
    }

    fn key_iterator(&self, visit: &mut Visitor<'_>) -> Result<()> {
        self.engine_handle()?;
        for key in self.keys.snapshot()? {
            visit(&key)?;
        }
        Ok(())
    }

    /// Runs `execute` against the ordinary write path.
    ///
    /// Every `put`/`delete` is applied, and waited on, as it is called. An
    /// error from `execute` leaves the earlier writes in place.
    fn update(&self, execute: &mut Execute<'_>) -> Result<()> {
        self.engine_handle()?;
        execute(&mut FnBucket::new(
            |key: &[u8], value: &[u8]| self.upsert(key, value),
            |key: &[u8]| self.delete(key),
        ))
    }

    fn guarantee(&self) -> TxGuarantee {
        TxGuarantee::BestEffortSequential
    }

    fn create_partitions(&self, _names: &[&str]) -> Result<()> {
        Ok(())
    }

    fn delete_partitions(&self, _names: &[&str]) -> Result<()> {
        Ok(())
    }

    fn clean(&self) -> Result<()> {
        let cache = self.engine_handle()?;
        cache.clear().map_err(storage)?;
        self.keys.clear()?;
        debug!(name = %self.name, "Cleaned cache store");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.cache.write().map_err(|_| Error::LockPoisoned)?;
        match guard.take() {
            Some(cache) => {
                cache.close().map_err(storage)?;
                self.keys.clear()?;
                info!(name = %self.name, "Closed cache store");
            }
            None => warn!(name = %self.name, "Cache store already closed"),
        }
        Ok(())
    }
}
