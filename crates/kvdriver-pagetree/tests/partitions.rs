// Integration tests for page-tree partition lifecycle

use kvdriver_core::{Error, KeyValueStore, Options};
use kvdriver_pagetree::PageTreeStore;
use tempfile::TempDir;

fn open_store(bucket: &str) -> (TempDir, PageTreeStore) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let opts = Options::new().with_bucket(bucket);
    let store = PageTreeStore::open(dir.path().join("test.db"), &opts).expect("Failed to open");
    (dir, store)
}

#[test]
fn test_create_and_delete_partitions() {
    let (_dir, store) = open_store("tbucket");

    store.create_partitions(&["newbucket1", "newbucket2"]).unwrap();
    store.delete_partitions(&["newbucket1", "newbucket2"]).unwrap();

    let err = store.delete_partitions(&["newbucket1"]).unwrap_err();
    assert!(matches!(err, Error::PartitionNotFound(ref name) if name == "newbucket1"));
}

#[test]
fn test_delete_unknown_partition() {
    let (_dir, store) = open_store("tbucket");
    assert!(matches!(
        store.delete_partitions(&["never-created"]),
        Err(Error::PartitionNotFound(_))
    ));
}

#[test]
fn test_last_created_partition_becomes_active() {
    let (_dir, store) = open_store("tbucket");
    assert_eq!(store.active_partition().as_deref(), Some("tbucket"));

    store.create_partitions(&["first", "", "second", ""]).unwrap();
    assert_eq!(store.active_partition().as_deref(), Some("second"));
}

#[test]
fn test_empty_name_is_ignored() {
    let (_dir, store) = open_store("tbucket");
    store.create_partitions(&[""]).unwrap();
    assert_eq!(store.active_partition().as_deref(), Some("tbucket"));
}

#[test]
fn test_partitions_are_isolated() {
    let (_dir, store) = open_store("left");
    store.upsert(b"key", b"left-value").unwrap();

    store.create_partitions(&["right"]).unwrap();
    assert!(store.get(b"key").unwrap_err().is_not_found());
    assert_eq!(store.length(), 0);
    store.upsert(b"key", b"right-value").unwrap();

    store.create_partitions(&["left"]).unwrap();
    assert_eq!(store.get(b"key").unwrap(), b"left-value");
}

#[test]
fn test_deleting_active_partition_clears_it() {
    let (_dir, store) = open_store("tbucket");
    store.upsert(b"key", b"value").unwrap();
    store.delete_partitions(&["tbucket"]).unwrap();

    assert_eq!(store.active_partition(), None);
    assert!(matches!(store.get(b"key"), Err(Error::NoActivePartition)));
    assert!(matches!(store.upsert(b"key", b"value"), Err(Error::NoActivePartition)));
}

#[test]
fn test_open_without_bucket() {
    let (_dir, store) = open_store("");
    assert_eq!(store.active_partition(), None);
    assert_eq!(store.length(), 0);
    assert!(matches!(store.get(b"key"), Err(Error::NoActivePartition)));

    store.create_partitions(&["late"]).unwrap();
    store.upsert(b"key", b"value").unwrap();
    assert_eq!(store.length(), 1);
}

#[test]
fn test_delete_empty_partition_name() {
    let (_dir, store) = open_store("tbucket");
    let err = store.delete_partitions(&[""]).unwrap_err();
    assert!(matches!(err, Error::PartitionNotFound(ref name) if name.is_empty()));

    // Names before the empty one are still deleted.
    store.create_partitions(&["doomed", "tbucket"]).unwrap();
    assert!(store.delete_partitions(&["doomed", ""]).is_err());
    assert!(matches!(
        store.delete_partitions(&["doomed"]),
        Err(Error::PartitionNotFound(_))
    ));
    assert_eq!(store.active_partition().as_deref(), Some("tbucket"));
}
