//! # kvdriver Page-Tree Adapter
//!
//! ## ⚠️ Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of kvdriver.** Use the
//! main [`kvdriver`](https://docs.rs/kvdriver) crate instead.
//!
//! ---
//!
//! Wraps [`redb`], an ordered copy-on-write B-tree stored in a single file.
//! Partitions map to redb tables. One partition at a time is *active*; every
//! unqualified read, write and traversal targets it.
//!
//! ```text
//! create_partitions(["a", "", "b"])  →  tables a, b exist; active = b
//! upsert(k, v)                       →  b[k] = v
//! ```
//!
//! Traversals run inside one read transaction, so they see the snapshot taken
//! when they started even while writers commit.

use std::path::Path;
use std::sync::RwLock;

use kvdriver_core::{
    Bucket, EngineType, Error, Execute, KeyValueStore, Options, Result, TxGuarantee, Visitor,
};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, TableError};
use tracing::{debug, info, warn};

type Definition<'a> = TableDefinition<'a, &'static [u8], &'static [u8]>;

fn definition(name: &str) -> Definition<'_> {
    TableDefinition::new(name)
}

fn storage<E: std::fmt::Display>(err: E) -> Error {
    Error::Storage(err.to_string())
}

fn transaction<E: std::fmt::Display>(err: E) -> Error {
    Error::Transaction(err.to_string())
}

fn table_error(err: TableError, partition: &str) -> Error {
    match err {
        TableError::TableDoesNotExist(_) => Error::PartitionNotFound(partition.to_string()),
        other => storage(other),
    }
}

/// Bucket over a table of the write transaction driving an `update` call.
struct TableBucket<'txn> {
    table: redb::Table<'txn, &'static [u8], &'static [u8]>,
}

impl Bucket for TableBucket<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.table.insert(key, value).map_err(storage)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.table.remove(key).map_err(storage)?;
        Ok(())
    }
}

/// Key-value store backed by a redb file.
pub struct PageTreeStore {
    path: String,
    db: RwLock<Option<Database>>,
    active: RwLock<Option<String>>,
}

impl PageTreeStore {
    /// Open or create the database file at `path`.
    ///
    /// A non-empty `options.bucket` is created if needed and becomes the
    /// active partition. A non-zero `options.size` sets the page cache size.
    pub fn open(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        let path = path.as_ref();
        let mut builder = Database::builder();
        if options.size > 0 {
            builder.set_cache_size(usize::try_from(options.size).unwrap_or(usize::MAX));
        }
        let db = builder
            .create(path)
            .map_err(|e| Error::open(EngineType::PageTree, e))?;

        let store = Self {
            path: path.to_string_lossy().into_owned(),
            db: RwLock::new(Some(db)),
            active: RwLock::new(None),
        };
        store.create_partitions(&[options.bucket.as_str()])?;
        info!(path = %store.path, bucket = %options.bucket, "Opened page-tree store");
        Ok(store)
    }

    /// Runs `f` against the open database and the active partition.
    fn with_partition<T>(&self, f: impl FnOnce(&Database, &str) -> Result<T>) -> Result<T> {
        let guard = self.db.read().map_err(|_| Error::LockPoisoned)?;
        let db = guard.as_ref().ok_or(Error::Closed)?;
        let partition = self
            .active
            .read()
            .map_err(|_| Error::LockPoisoned)?
            .clone()
            .ok_or(Error::NoActivePartition)?;
        f(db, &partition)
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let guard = self.db.read().map_err(|_| Error::LockPoisoned)?;
        let db = guard.as_ref().ok_or(Error::Closed)?;
        f(db)
    }

    fn set_active(&self, partition: Option<String>) -> Result<()> {
        *self.active.write().map_err(|_| Error::LockPoisoned)? = partition;
        Ok(())
    }

    /// Traverse the active partition inside a single read transaction.
    fn traverse(&self, mut visit: impl FnMut(&[u8], &[u8]) -> Result<()>) -> Result<()> {
        self.with_partition(|db, partition| {
            let txn = db.begin_read().map_err(storage)?;
            let table = txn
                .open_table(definition(partition))
                .map_err(|e| table_error(e, partition))?;
            for entry in table.iter().map_err(storage)? {
                let (key, value) = entry.map_err(storage)?;
                visit(key.value(), value.value())?;
            }
            Ok(())
        })
    }

    fn count(&self) -> Result<usize> {
        self.with_partition(|db, partition| {
            let txn = db.begin_read().map_err(storage)?;
            let table = txn
                .open_table(definition(partition))
                .map_err(|e| table_error(e, partition))?;
            let len = table.len().map_err(storage)?;
            Ok(usize::try_from(len).unwrap_or(usize::MAX))
        })
    }
}

impl KeyValueStore for PageTreeStore {
    fn engine(&self) -> EngineType {
        EngineType::PageTree
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.db.read().map(|db| db.is_some()).unwrap_or(false)
    }

    fn size(&self) -> Result<u64> {
        self.with_db(|_| Ok(std::fs::metadata(&self.path)?.len()))
    }

    fn length(&self) -> usize {
        self.count().unwrap_or_else(|e| {
            debug!(path = %self.path, error = %e, "Page-tree length unavailable");
            0
        })
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.with_partition(|db, partition| {
            let txn = db.begin_read().map_err(storage)?;
            let table = txn
                .open_table(definition(partition))
                .map_err(|e| table_error(e, partition))?;
            match table.get(key).map_err(storage)? {
                Some(value) => Ok(value.value().to_vec()),
                None => Err(Error::KeyNotFound),
            }
        })
    }

    fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.update(&mut |bucket: &mut dyn Bucket| bucket.put(key, value))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.update(&mut |bucket: &mut dyn Bucket| bucket.delete(key))
    }

    fn for_each(&self, visit: &mut Visitor<'_>) -> Result<()> {
        self.traverse(|_, value| visit(value))
    }

    fn key_iterator(&self, visit: &mut Visitor<'_>) -> Result<()> {
        self.traverse(|key, _| visit(key))
    }

    fn update(&self, execute: &mut Execute<'_>) -> Result<()> {
        self.with_partition(|db, partition| {
            let txn = db.begin_write().map_err(storage)?;
            let outcome = {
                let table = txn
                    .open_table(definition(partition))
                    .map_err(|e| table_error(e, partition))?;
                let mut bucket = TableBucket { table };
                execute(&mut bucket)
            };
            match outcome {
                Ok(()) => txn.commit().map_err(transaction),
                Err(e) => {
                    debug!(partition, error = %e, "Rolling back page-tree transaction");
                    if let Err(abort) = txn.abort() {
                        warn!(partition, error = %abort, "Page-tree abort failed");
                    }
                    Err(e)
                }
            }
        })
    }

    fn guarantee(&self) -> TxGuarantee {
        TxGuarantee::Atomic
    }

    fn create_partitions(&self, names: &[&str]) -> Result<()> {
        self.with_db(|db| {
            for name in names.iter().filter(|name| !name.is_empty()) {
                let txn = db.begin_write().map_err(storage)?;
                txn.open_table(definition(name)).map_err(storage)?;
                txn.commit().map_err(transaction)?;
                self.set_active(Some(name.to_string()))?;
                debug!(partition = %name, "Created page-tree partition");
            }
            Ok(())
        })
    }

    fn delete_partitions(&self, names: &[&str]) -> Result<()> {
        self.with_db(|db| {
            for name in names {
                // redb has no table without a name.
                if name.is_empty() {
                    return Err(Error::PartitionNotFound(String::new()));
                }
                let txn = db.begin_write().map_err(storage)?;
                let existed = txn.delete_table(definition(name)).map_err(storage)?;
                if !existed {
                    txn.abort().map_err(transaction)?;
                    return Err(Error::PartitionNotFound(name.to_string()));
                }
                txn.commit().map_err(transaction)?;

                let mut active = self.active.write().map_err(|_| Error::LockPoisoned)?;
                if active.as_deref() == Some(*name) {
                    *active = None;
                }
                debug!(partition = %name, "Deleted page-tree partition");
            }
            Ok(())
        })
    }

    fn active_partition(&self) -> Option<String> {
        self.active.read().ok().and_then(|active| active.clone())
    }

    fn clean(&self) -> Result<()> {
        self.with_partition(|db, partition| {
            let txn = db.begin_write().map_err(storage)?;
            txn.delete_table(definition(partition)).map_err(storage)?;
            txn.open_table(definition(partition)).map_err(storage)?;
            txn.commit().map_err(transaction)
        })
    }

    fn close(&self) -> Result<()> {
        let mut db = self.db.write().map_err(|_| Error::LockPoisoned)?;
        if let Some(db) = db.take() {
            drop(db);
            info!(path = %self.path, "Closed page-tree store");
        } else {
            warn!(path = %self.path, "Page-tree store already closed");
        }
        Ok(())
    }
}
