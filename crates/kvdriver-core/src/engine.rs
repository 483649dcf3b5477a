//! Engine selection and open options.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Partition used by [`Options::default`].
pub const DEFAULT_PARTITION: &str = "rhz";

/// Visibility-wait bound used when [`Options::timeout`] is zero.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The storage engines a store can be opened with.
///
/// The set is closed; numeric selectors outside it are rejected with
/// [`Error::UnknownEngine`] rather than clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// Ordered disk engine organized as a page tree with named partitions
    PageTree = 0,
    /// Log-structured disk engine without partitions
    #[serde(rename = "lsm")]
    LogStructured = 1,
    /// In-memory cache with probabilistic admission and eviction
    #[serde(rename = "cache")]
    MemoryCache = 2,
}

impl EngineType {
    /// Every engine, in selector order.
    pub const ALL: [EngineType; 3] = [
        EngineType::PageTree,
        EngineType::LogStructured,
        EngineType::MemoryCache,
    ];

    /// Numeric selector of this engine.
    pub fn index(self) -> i64 {
        self as i64
    }

    /// Short lowercase name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            EngineType::PageTree => "pagetree",
            EngineType::LogStructured => "lsm",
            EngineType::MemoryCache => "cache",
        }
    }

    /// Whether the engine persists data to the filesystem.
    pub fn is_persistent(self) -> bool {
        !matches!(self, EngineType::MemoryCache)
    }
}

impl TryFrom<i64> for EngineType {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(EngineType::PageTree),
            1 => Ok(EngineType::LogStructured),
            2 => Ok(EngineType::MemoryCache),
            other => Err(Error::UnknownEngine(other)),
        }
    }
}

impl FromStr for EngineType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pagetree" | "btree" => Ok(EngineType::PageTree),
            "lsm" | "logstructured" => Ok(EngineType::LogStructured),
            "cache" | "memory" => Ok(EngineType::MemoryCache),
            other => other
                .parse::<i64>()
                .map_err(|_| Error::InvalidOperation(format!("unknown engine name: {}", s)))
                .and_then(EngineType::try_from),
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options recognized when opening a store.
///
/// Adapters ignore the fields they have no use for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Initial partition (page-tree engine only)
    pub bucket: String,
    /// Soft capacity hint in bytes; 0 keeps the engine default
    pub size: u64,
    /// Cache visibility-wait bound in milliseconds; 0 uses [`DEFAULT_TIMEOUT`]
    pub timeout: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_PARTITION.to_string(),
            size: 0,
            timeout: 0,
        }
    }
}

impl Options {
    /// Options with no initial partition and engine defaults everywhere.
    pub fn new() -> Self {
        Self {
            bucket: String::new(),
            size: 0,
            timeout: 0,
        }
    }

    /// Set the initial partition
    pub fn with_bucket<S: Into<String>>(mut self, bucket: S) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Set the capacity hint in bytes
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the visibility-wait bound
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Visibility-wait bound with the default applied.
    pub fn visibility_timeout(&self) -> Duration {
        if self.timeout == 0 {
            DEFAULT_TIMEOUT
        } else {
            Duration::from_millis(self.timeout)
        }
    }
}
