//! Error types for kvdriver.

use std::fmt;
use std::time::Duration;

use crate::engine::EngineType;

/// Boxed error carried through from engines and visitor callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for kvdriver operations.
#[derive(Debug)]
pub enum Error {
    /// The engine requires a path and none was given
    EmptyPath,

    /// Engine selector outside the known range
    UnknownEngine(i64),

    /// The underlying engine failed to initialize
    Open {
        /// Engine that failed to open
        engine: EngineType,
        /// Cause reported by the engine
        source: BoxError,
    },

    /// `get` on an absent key
    KeyNotFound,

    /// The engine cannot store a key of this length; carries the length
    InvalidKey(usize),

    /// Deletion of a partition that does not exist
    PartitionNotFound(String),

    /// Partitioned engine with no active partition selected
    NoActivePartition,

    /// The cache admission policy declined the write
    AdmissionRejected,

    /// A cache write or delete did not become observable in time
    VisibilityTimeout {
        /// How long the adapter polled before giving up
        waited: Duration,
    },

    /// A traversal or transaction callback failed; the cause is returned as-is
    VisitorAborted(BoxError),

    /// The handle has been closed
    Closed,

    /// A lock was poisoned (internal error)
    LockPoisoned,

    /// I/O error
    Io(std::io::Error),

    /// Storage engine error
    Storage(String),

    /// The engine failed to commit or roll back a write transaction
    Transaction(String),

    /// Invalid operation
    InvalidOperation(String),
}

/// Fieldless view of [`Error`] for matching on the failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::EmptyPath`]
    EmptyPath,
    /// See [`Error::UnknownEngine`]
    UnknownEngine,
    /// See [`Error::Open`]
    OpenFailure,
    /// See [`Error::KeyNotFound`]
    KeyNotFound,
    /// See [`Error::InvalidKey`]
    InvalidKey,
    /// See [`Error::PartitionNotFound`]
    PartitionNotFound,
    /// See [`Error::NoActivePartition`]
    NoActivePartition,
    /// See [`Error::AdmissionRejected`]
    AdmissionRejected,
    /// See [`Error::VisibilityTimeout`]
    VisibilityTimeout,
    /// See [`Error::VisitorAborted`]
    VisitorAborted,
    /// See [`Error::Closed`]
    Closed,
    /// Lock, I/O, storage, transaction and invalid-operation failures
    Internal,
}

impl Error {
    /// Wraps an engine initialization failure.
    pub fn open<E>(engine: EngineType, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Open {
            engine,
            source: source.into(),
        }
    }

    /// Wraps a caller error so it can be returned from a visitor or a
    /// transaction function.
    pub fn aborted<E>(cause: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::VisitorAborted(cause.into())
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyPath => ErrorKind::EmptyPath,
            Error::UnknownEngine(_) => ErrorKind::UnknownEngine,
            Error::Open { .. } => ErrorKind::OpenFailure,
            Error::KeyNotFound => ErrorKind::KeyNotFound,
            Error::InvalidKey(_) => ErrorKind::InvalidKey,
            Error::PartitionNotFound(_) => ErrorKind::PartitionNotFound,
            Error::NoActivePartition => ErrorKind::NoActivePartition,
            Error::AdmissionRejected => ErrorKind::AdmissionRejected,
            Error::VisibilityTimeout { .. } => ErrorKind::VisibilityTimeout,
            Error::VisitorAborted(_) => ErrorKind::VisitorAborted,
            Error::Closed => ErrorKind::Closed,
            Error::LockPoisoned
            | Error::Io(_)
            | Error::Storage(_)
            | Error::Transaction(_)
            | Error::InvalidOperation(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` for [`Error::KeyNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyPath => write!(f, "Empty path"),
            Error::UnknownEngine(value) => write!(f, "Unknown engine type: {}", value),
            Error::Open { engine, source } => write!(f, "Failed to open {}: {}", engine, source),
            Error::KeyNotFound => write!(f, "Key not found"),
            Error::InvalidKey(len) => write!(f, "Invalid key length: {}", len),
            Error::PartitionNotFound(name) => write!(f, "Partition not found: {}", name),
            Error::NoActivePartition => write!(f, "No active partition"),
            Error::AdmissionRejected => write!(f, "Write rejected by cache admission policy"),
            Error::VisibilityTimeout { waited } => {
                write!(f, "Write not visible after {:?}", waited)
            }
            Error::VisitorAborted(cause) => write!(f, "Aborted: {}", cause),
            Error::Closed => write!(f, "Database is closed"),
            Error::LockPoisoned => write!(f, "Lock poisoned"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Transaction(msg) => write!(f, "Transaction error: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Open { source, .. } => Some(source.as_ref()),
            Error::VisitorAborted(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// A specialized `Result` type for kvdriver operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::KeyNotFound.kind(), ErrorKind::KeyNotFound);
        assert_eq!(Error::UnknownEngine(7).kind(), ErrorKind::UnknownEngine);
        assert_eq!(
            Error::PartitionNotFound("b".into()).kind(),
            ErrorKind::PartitionNotFound
        );
        assert_eq!(Error::Storage("x".into()).kind(), ErrorKind::Internal);
        assert_eq!(Error::Transaction("x".into()).kind(), ErrorKind::Internal);
        assert_eq!(Error::InvalidKey(0).kind(), ErrorKind::InvalidKey);
        assert_eq!(Error::InvalidKey(0).to_string(), "Invalid key length: 0");
        assert!(Error::KeyNotFound.is_not_found());
        assert!(!Error::Closed.is_not_found());
    }

    #[test]
    fn test_aborted_keeps_cause() {
        let err = Error::aborted("stop here");
        assert_eq!(err.kind(), ErrorKind::VisitorAborted);
        assert_eq!(err.source().map(|s| s.to_string()), Some("stop here".to_string()));
        assert_eq!(err.to_string(), "Aborted: stop here");
    }

    #[test]
    fn test_open_display_names_engine() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::open(EngineType::PageTree, io);
        assert_eq!(err.kind(), ErrorKind::OpenFailure);
        assert!(err.to_string().contains("pagetree"));
        assert!(err.source().is_some());
    }
}
