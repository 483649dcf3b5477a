//! # kvdriver Core
//!
//! Core types shared by the kvdriver storage adapters: the
//! [`KeyValueStore`] contract, the transaction bridge, engine selection and
//! the error taxonomy.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod store;
pub mod transaction;

pub use engine::{EngineType, Options, DEFAULT_PARTITION, DEFAULT_TIMEOUT};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use store::{KeyValueStore, Visitor};
pub use transaction::{Bucket, Execute, FnBucket, TxGuarantee};
