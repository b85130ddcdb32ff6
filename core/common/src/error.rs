//! Common error types for storebridge.

use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::Operation;

/// Top-level error type for storebridge operations.
///
/// Variants are split into transient conditions, which a retry may fix, and
/// permanent ones, which it cannot. [`Error::is_transient`] is the only place
/// that classification is made.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured protocol is not in the registry.
    #[error("Invalid protocol '{protocol}': must be one of [{}]", supported.join(", "))]
    InvalidProtocol {
        protocol: String,
        supported: Vec<String>,
    },

    /// The backend rejected the protocol/options combination.
    #[error("Failed to initialize '{protocol}' backend: {reason}")]
    BackendInit { protocol: String, reason: String },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Access to the resource was refused.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The backend does not provide this capability.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A condition that is likely to clear up on retry (timeouts, resets,
    /// rate limiting, server-side failures).
    #[error("Transient error: {0}")]
    Transient(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// All retry attempts were used up. `source` is the last error seen.
    #[error("{operation} of '{query}' failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: Operation,
        query: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Preparing or clearing the local cache location failed.
    #[error("{operation} '{query}': local filesystem error at {}: {source}", path.display())]
    LocalFilesystem {
        operation: Operation,
        query: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether retrying the failed call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient(_) => true,
            Error::Io(err) => matches!(
                err.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// Whether this error reports an absent object, looking through retry
    /// exhaustion.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Io(err) => err.kind() == ErrorKind::NotFound,
            Error::Exhausted { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Whether this error marks a used-up retry budget.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Error::Exhausted { .. })
    }

    /// Number of attempts made, if the error came out of a retry loop.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Error::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Prefix the message with the operation and query it came from.
    ///
    /// The variant is preserved so callers can still match on the error
    /// class. Errors that already carry their own context pass through.
    pub fn in_operation(self, operation: Operation, query: &str) -> Self {
        let context = |msg: String| format!("{} '{}': {}", operation, query, msg);
        match self {
            Error::BackendInit { protocol, reason } => Error::BackendInit {
                protocol,
                reason: context(reason),
            },
            Error::NotFound(msg) => Error::NotFound(context(msg)),
            Error::PermissionDenied(msg) => Error::PermissionDenied(context(msg)),
            Error::InvalidInput(msg) => Error::InvalidInput(context(msg)),
            Error::NotSupported(msg) => Error::NotSupported(context(msg)),
            Error::AlreadyExists(msg) => Error::AlreadyExists(context(msg)),
            Error::Transient(msg) => Error::Transient(context(msg)),
            Error::Io(err) => Error::Io(std::io::Error::new(err.kind(), context(err.to_string()))),
            other => other,
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
