#![no_main]

use arbitrary::Arbitrary;
use kvdriver::{Bucket, Database, EngineType, Error, ErrorKind, Options};
use libfuzzer_sys::fuzz_target;
use std::collections::BTreeMap;

#[derive(Arbitrary, Debug)]
enum DriverOp {
    Upsert { key: Vec<u8>, value: Vec<u8> },
    Get { key: Vec<u8> },
    Delete { key: Vec<u8> },
    Update { puts: Vec<(Vec<u8>, Vec<u8>)>, fail: bool },
}

#[derive(Arbitrary, Debug)]
struct Input {
    log_structured: bool,
    ops: Vec<DriverOp>,
}

fn usable(key: &[u8], value: &[u8]) -> bool {
    key.len() <= 1024 && value.len() <= 1024
}

/// Writes either apply or are refused as an invalid key; nothing else.
fn applied(result: Result<(), Error>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            assert_eq!(e.kind(), ErrorKind::InvalidKey, "{}", e);
            false
        }
    }
}

fuzz_target!(|input: Input| {
    let Ok(dir) = tempfile::tempdir() else {
        return;
    };
    let engine = if input.log_structured {
        EngineType::LogStructured
    } else {
        EngineType::PageTree
    };
    let opts = Options::new().with_bucket("fuzz");
    let Ok(db) = Database::open(engine, dir.path().join("fuzz.db"), &opts) else {
        return;
    };

    // Both disk engines commit atomically, so a plain map is an exact model.
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    for op in input.ops.iter().take(64) { // Limit operations to prevent timeout
        match op {
            DriverOp::Upsert { key, value } => {
                if usable(key, value) && applied(db.upsert(key, value)) {
                    model.insert(key.clone(), value.clone());
                }
            }
            DriverOp::Get { key } => {
                if usable(key, &[]) {
                    assert_eq!(db.get(key).ok(), model.get(key).cloned());
                }
            }
            DriverOp::Delete { key } => {
                if usable(key, &[]) && applied(db.delete(key)) {
                    model.remove(key);
                }
            }
            DriverOp::Update { puts, fail } => {
                let puts: Vec<_> = puts.iter().filter(|(k, v)| usable(k, v)).take(16).collect();
                let result = db.update(|bucket: &mut dyn Bucket| {
                    for (k, v) in &puts {
                        bucket.put(k, v)?;
                    }
                    if *fail {
                        return Err(Error::aborted("fuzz"));
                    }
                    Ok(())
                });
                if *fail {
                    assert!(result.is_err());
                } else if applied(result) {
                    for (k, v) in puts {
                        model.insert(k.clone(), v.clone());
                    }
                }
            }
        }
    }

    let mut keys = Vec::new();
    db.key_iterator(|k| {
        keys.push(k.to_vec());
        Ok(())
    })
    .unwrap();
    assert_eq!(keys, model.keys().cloned().collect::<Vec<_>>());
    let _ = db.close();
});
