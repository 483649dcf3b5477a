// Common test utilities for kvdriver integration tests

use kvdriver::{Database, EngineType, Options};
use tempfile::TempDir;

pub const TEST_BUCKET: &str = "tbucket";

/// Test fixture that opens a store inside a temporary directory
pub struct StoreFixture {
    #[allow(dead_code)]
    pub temp_dir: TempDir,
    pub db: Database,
}

impl StoreFixture {
    pub fn open(engine: EngineType) -> Self {
        Self::open_with(engine, Options::new().with_bucket(TEST_BUCKET))
    }

    pub fn open_with(engine: EngineType, options: Options) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("test.db");
        let db = Database::open(engine, &path, &options).expect("Failed to open store");
        Self { temp_dir, db }
    }

    pub fn keys(&self) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        self.db
            .key_iterator(|k| {
                keys.push(k.to_vec());
                Ok(())
            })
            .expect("Failed to iterate keys");
        keys
    }
}

/// Runs `check` once per engine, closing each store afterwards
#[allow(dead_code)]
pub fn for_every_engine(check: impl Fn(EngineType, &StoreFixture)) {
    for engine in EngineType::ALL {
        let fixture = StoreFixture::open(engine);
        check(engine, &fixture);
        fixture.db.close().expect("Failed to close store");
    }
}
