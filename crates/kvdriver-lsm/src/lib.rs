//! # kvdriver Log-Structured Adapter
//!
//! ## ⚠️ Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of kvdriver.** Use the
//! main [`kvdriver`](https://docs.rs/kvdriver) crate instead.
//!
//! ---
//!
//! Wraps a transactional [`fjall`] keyspace. Every key lives in one fixed
//! internal partition, so partition operations are accepted and ignored:
//! callers asking for isolation on this engine get a flat namespace.
//!
//! ```text
//! Writes → write transaction (single writer) → journal + memtable → segments
//! Reads  → read transaction snapshot
//! ```
//!
//! `size` and `length` are not tracked and always report 0; a zero here does
//! not mean the store is empty.

use std::cell::RefCell;
use std::path::Path;
use std::sync::RwLock;

use fjall::{Config, PartitionCreateOptions, PersistMode, TxKeyspace, TxPartitionHandle};
use kvdriver_core::{
    EngineType, Error, Execute, FnBucket, KeyValueStore, Options, Result, TxGuarantee, Visitor,
};
use tracing::{debug, info, warn};

/// Name of the single partition holding all keys.
const PARTITION: &str = "kv";

/// Longest key the engine stores.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

fn storage<E: std::fmt::Display>(err: E) -> Error {
    Error::Storage(err.to_string())
}

fn transaction<E: std::fmt::Display>(err: E) -> Error {
    Error::Transaction(err.to_string())
}

/// Rejects keys fjall cannot hold: empty or longer than [`MAX_KEY_LEN`].
fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(Error::InvalidKey(key.len()));
    }
    Ok(())
}

struct Handle {
    keyspace: TxKeyspace,
    partition: TxPartitionHandle,
}

/// Key-value store backed by an fjall keyspace directory.
pub struct LogStore {
    path: String,
    handle: RwLock<Option<Handle>>,
}

impl LogStore {
    /// Open or create the keyspace in the directory at `path`.
    ///
    /// A non-zero `options.size` sets the block cache size; the bucket and
    /// timeout options are ignored.
    pub fn open(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::EmptyPath);
        }

        let mut config = Config::new(path);
        if options.size > 0 {
            config = config.cache_size(options.size);
        }
        let keyspace = config
            .open_transactional()
            .map_err(|e| Error::open(EngineType::LogStructured, e))?;
        let partition = keyspace
            .open_partition(PARTITION, PartitionCreateOptions::default())
            .map_err(|e| Error::open(EngineType::LogStructured, e))?;

        let store = Self {
            path: path.to_string_lossy().into_owned(),
            handle: RwLock::new(Some(Handle {
                keyspace,
                partition,
            })),
        };
        info!(path = %store.path, "Opened log-structured store");
        Ok(store)
    }

    fn with_handle<T>(&self, f: impl FnOnce(&Handle) -> Result<T>) -> Result<T> {
        let guard = self.handle.read().map_err(|_| Error::LockPoisoned)?;
        let handle = guard.as_ref().ok_or(Error::Closed)?;
        f(handle)
    }

    /// Traverse a read-transaction snapshot of every key-value pair.
    fn traverse(&self, mut visit: impl FnMut(&[u8], &[u8]) -> Result<()>) -> Result<()> {
        self.with_handle(|handle| {
            let tx = handle.keyspace.read_tx();
            for entry in tx.iter(&handle.partition) {
                let (key, value) = entry.map_err(storage)?;
                visit(&key, &value)?;
            }
            Ok(())
        })
    }
}

impl KeyValueStore for LogStore {
    fn engine(&self) -> EngineType {
        EngineType::LogStructured
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.handle.read().map(|h| h.is_some()).unwrap_or(false)
    }

    fn size(&self) -> Result<u64> {
        Ok(0)
    }

    fn length(&self) -> usize {
        0
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.with_handle(|handle| {
            if check_key(key).is_err() {
                return Err(Error::KeyNotFound);
            }
            let tx = handle.keyspace.read_tx();
            match tx.get(&handle.partition, key).map_err(storage)? {
                Some(value) => Ok(value.to_vec()),
                None => Err(Error::KeyNotFound),
            }
        })
    }

    fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_handle(|handle| {
            check_key(key)?;
            let mut tx = handle.keyspace.write_tx();
            tx.insert(&handle.partition, key, value);
            tx.commit().map_err(transaction)
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.with_handle(|handle| {
            check_key(key)?;
            let mut tx = handle.keyspace.write_tx();
            tx.remove(&handle.partition, key);
            tx.commit().map_err(transaction)
        })
    }

    fn for_each(&self, visit: &mut Visitor<'_>) -> Result<()> {
        self.traverse(|_, value| visit(value))
    }

    fn key_iterator(&self, visit: &mut Visitor<'_>) -> Result<()> {
        self.traverse(|key, _| visit(key))
    }

    fn update(&self, execute: &mut Execute<'_>) -> Result<()> {
        self.with_handle(|handle| {
            let partition = &handle.partition;
            let tx = RefCell::new(handle.keyspace.write_tx());
            let outcome = execute(&mut FnBucket::new(
                |key: &[u8], value: &[u8]| {
                    check_key(key)?;
                    tx.borrow_mut().insert(partition, key, value);
                    Ok(())
                },
                |key: &[u8]| {
                    check_key(key)?;
                    tx.borrow_mut().remove(partition, key);
                    Ok(())
                },
            ));

            let tx = tx.into_inner();
            match outcome {
                Ok(()) => tx.commit().map_err(transaction),
                Err(e) => {
                    debug!(path = %self.path, error = %e, "Rolling back log-structured transaction");
                    tx.rollback();
                    Err(e)
                }
            }
        })
    }

    fn guarantee(&self) -> TxGuarantee {
        TxGuarantee::Atomic
    }

    fn create_partitions(&self, _names: &[&str]) -> Result<()> {
        Ok(())
    }

    fn delete_partitions(&self, _names: &[&str]) -> Result<()> {
        Ok(())
    }

    fn clean(&self) -> Result<()> {
        self.with_handle(|handle| {
            // Holding the write transaction first keeps the snapshot below current.
            let mut tx = handle.keyspace.write_tx();
            let keys = handle
                .keyspace
                .read_tx()
                .iter(&handle.partition)
                .map(|entry| entry.map(|(key, _)| key))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(storage)?;
            for key in keys {
                tx.remove(&handle.partition, key);
            }
            tx.commit().map_err(transaction)
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.handle.write().map_err(|_| Error::LockPoisoned)?;
        match guard.take() {
            Some(handle) => {
                handle
                    .keyspace
                    .persist(PersistMode::SyncAll)
                    .map_err(storage)?;
                drop(handle);
                info!(path = %self.path, "Closed log-structured store");
            }
            None => warn!(path = %self.path, "Log-structured store already closed"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvdriver_core::Bucket;
    use tempfile::tempdir;

    const KEY: &[u8] = b"key";
    const VALUE: &[u8] = b"value";

    fn with_store(handler: impl FnOnce(&LogStore)) {
        let dir = tempdir().unwrap();
        let store = LogStore::open(dir.path().join("test.db"), &Options::default()).unwrap();
        handler(&store);
        store.close().unwrap();
    }

    #[test]
    fn test_empty_path() {
        assert!(matches!(
            LogStore::open("", &Options::default()),
            Err(Error::EmptyPath)
        ));
    }

    #[test]
    fn test_upsert_get_delete() {
        with_store(|store| {
            store.upsert(KEY, VALUE).unwrap();
            assert_eq!(store.get(KEY).unwrap(), VALUE);

            store.delete(KEY).unwrap();
            assert!(matches!(store.get(KEY), Err(Error::KeyNotFound)));
        });
    }

    #[test]
    fn test_rejects_unstorable_keys() {
        with_store(|store| {
            let long = vec![7u8; MAX_KEY_LEN + 1];
            assert!(matches!(store.upsert(b"", VALUE), Err(Error::InvalidKey(0))));
            assert!(matches!(store.upsert(&long, VALUE), Err(Error::InvalidKey(_))));
            assert!(matches!(store.delete(b""), Err(Error::InvalidKey(0))));
            assert!(matches!(store.delete(&long), Err(Error::InvalidKey(_))));
            assert!(matches!(store.get(b""), Err(Error::KeyNotFound)));
            assert!(matches!(store.get(&long), Err(Error::KeyNotFound)));

            let longest = vec![7u8; MAX_KEY_LEN];
            store.upsert(&longest, VALUE).unwrap();
            assert_eq!(store.get(&longest).unwrap(), VALUE);
        });
    }

    #[test]
    fn test_update_rejects_unstorable_keys() {
        with_store(|store| {
            let result = store.update(&mut |bucket: &mut dyn Bucket| {
                bucket.put(b"a", b"1")?;
                bucket.put(b"", b"2")
            });
            assert!(matches!(result, Err(Error::InvalidKey(0))));
            assert!(store.get(b"a").unwrap_err().is_not_found());

            let result = store.update(&mut |bucket: &mut dyn Bucket| bucket.delete(b""));
            assert!(matches!(result, Err(Error::InvalidKey(0))));
        });
    }

    #[test]
    fn test_size_and_length_are_placeholders() {
        with_store(|store| {
            store.upsert(KEY, VALUE).unwrap();
            assert_eq!(store.size().unwrap(), 0);
            assert_eq!(store.length(), 0);
        });
    }

    #[test]
    fn test_partitions_are_no_ops() {
        with_store(|store| {
            store.upsert(KEY, VALUE).unwrap();
            store.create_partitions(&["a", "b"]).unwrap();
            store.delete_partitions(&["never-created"]).unwrap();
            assert_eq!(store.active_partition(), None);
            assert_eq!(store.get(KEY).unwrap(), VALUE);
        });
    }

    #[test]
    fn test_iterators() {
        with_store(|store| {
            store.upsert(b"k1", b"v1").unwrap();
            store.upsert(b"k2", b"v2").unwrap();

            let mut keys = Vec::new();
            store
                .key_iterator(&mut |k: &[u8]| {
                    keys.push(k.to_vec());
                    Ok(())
                })
                .unwrap();
            assert_eq!(keys, vec![b"k1".to_vec(), b"k2".to_vec()]);

            let mut values = Vec::new();
            store
                .for_each(&mut |v: &[u8]| {
                    values.push(v.to_vec());
                    Ok(())
                })
                .unwrap();
            assert_eq!(values, vec![b"v1".to_vec(), b"v2".to_vec()]);
        });
    }

    #[test]
    fn test_key_iterator_stops_on_first_error() {
        with_store(|store| {
            store.upsert(b"k1", VALUE).unwrap();
            store.upsert(b"k2", VALUE).unwrap();

            let mut seen = 0;
            let result = store.key_iterator(&mut |_: &[u8]| {
                seen += 1;
                Err(Error::aborted("stop"))
            });
            assert!(matches!(result, Err(Error::VisitorAborted(_))));
            assert_eq!(seen, 1);
        });
    }

    #[test]
    fn test_update_is_atomic() {
        with_store(|store| {
            store.upsert(b"keep", VALUE).unwrap();

            let result = store.update(&mut |bucket: &mut dyn Bucket| {
                bucket.put(b"a", b"1")?;
                bucket.delete(b"keep")?;
                Err(Error::aborted("fail"))
            });
            assert!(result.is_err());
            assert!(store.get(b"a").unwrap_err().is_not_found());
            assert_eq!(store.get(b"keep").unwrap(), VALUE);

            store
                .update(&mut |bucket: &mut dyn Bucket| {
                    bucket.put(b"a", b"1")?;
                    bucket.delete(b"keep")
                })
                .unwrap();
            assert_eq!(store.get(b"a").unwrap(), b"1");
            assert!(store.get(b"keep").unwrap_err().is_not_found());
        });
    }

    #[test]
    fn test_clean() {
        with_store(|store| {
            store.upsert(b"a", VALUE).unwrap();
            store.upsert(b"b", VALUE).unwrap();
            store.clean().unwrap();

            let mut count = 0;
            store
                .key_iterator(&mut |_: &[u8]| {
                    count += 1;
                    Ok(())
                })
                .unwrap();
            assert_eq!(count, 0);
        });
    }

    #[test]
    fn test_closed_store() {
        let dir = tempdir().unwrap();
        let store = LogStore::open(dir.path().join("test.db"), &Options::default()).unwrap();
        store.close().unwrap();
        assert!(!store.is_open());
        assert!(matches!(store.get(KEY), Err(Error::Closed)));
        assert!(matches!(store.delete(KEY), Err(Error::Closed)));
        store.close().unwrap();
    }
}
