//! Error types for storage operations

use std::path::PathBuf;

use crate::merge::MergeError;
use crate::retry::Retryable;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database connection failed
    #[error("failed to connect to storage backend: {0}")]
    ConnectionFailed(String),

    /// The database was busy or locked; the operation may succeed on retry
    #[error("storage backend busy: {0}")]
    Busy(String),

    /// Database query failed
    #[error("storage query failed: {0}")]
    QueryFailed(String),

    /// The backend was closed; later updates are refused
    #[error("storage backend is closed")]
    Closed,

    /// Invalid configuration
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    /// The update conflicts with the stored state of the metric
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Snapshot file exists but cannot be parsed
    #[error("snapshot file {path} is corrupt: {source}")]
    CorruptSnapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Metric serialization error
    #[error("metric serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O error (file access, etc.)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    /// Whether the error was caused by the request itself rather than the backend.
    pub fn is_client_error(&self) -> bool {
        matches!(self, StorageError::Merge(_))
    }
}

impl Retryable for StorageError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::ConnectionFailed(_) | StorageError::Busy(_)
        )
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::ConnectionFailed(io_err.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::ConnectionFailed(err.to_string())
            }
            // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes
            sqlx::Error::Database(ref db_err)
                if db_err
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .is_some_and(|code| matches!(code & 0xff, 5 | 6)) =>
            {
                StorageError::Busy(db_err.message().to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}
