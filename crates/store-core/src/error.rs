//! Error types for the remote bucket store

use std::fmt;

use thiserror::Error;

/// Result type alias using the store Error
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for raw session primitives
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Classification of a failed session primitive
///
/// Transports must map their native error codes onto these kinds. Anything
/// that is not one of the first three is `Other` and is never recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    NotFound,
    AlreadyExists,
    NotEmpty,
    Other,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteErrorKind::NotFound => "not found",
            RemoteErrorKind::AlreadyExists => "already exists",
            RemoteErrorKind::NotEmpty => "directory not empty",
            RemoteErrorKind::Other => "remote failure",
        };
        f.write_str(s)
    }
}

/// Error reported by a session primitive for a single path
#[derive(Error, Debug, Clone)]
#[error("{kind} at {path}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub path: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Classify a local I/O error raised while operating on `path`
    pub fn from_io(path: impl Into<String>, err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::NotFound => RemoteErrorKind::NotFound,
            ErrorKind::AlreadyExists => RemoteErrorKind::AlreadyExists,
            ErrorKind::DirectoryNotEmpty => RemoteErrorKind::NotEmpty,
            _ => RemoteErrorKind::Other,
        };
        Self::new(kind, path, err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }
}

/// Core error type for the remote bucket store
#[derive(Error, Debug)]
pub enum Error {
    // Object errors
    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    #[error("Corrupt metadata for {key}: {reason}")]
    CorruptMetadata { key: String, reason: String },

    // Namespace errors
    #[error("Bucket not found: {bucket}")]
    BucketNotFound { bucket: String },

    #[error("Entry already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Directory not empty: {path}")]
    NotEmpty { path: String },

    // Session errors
    #[error("Transport error: {0}")]
    Transport(#[from] RemoteError),

    #[error("Connection is closed")]
    Disconnected,

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if this error is retryable
    ///
    /// Only transport-level failures qualify; the store itself never retries
    /// them, this is a hint for callers that carry their own retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(RemoteError {
                kind: RemoteErrorKind::Other,
                ..
            }) | Error::Disconnected
        )
    }

    /// Returns true if this error reports a missing key or bucket
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::KeyNotFound { .. } | Error::BucketNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
