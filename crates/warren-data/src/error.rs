//! Error types for the data access layer.

use thiserror::Error;

/// Result alias for data layer operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors raised by the data access layer.
#[derive(Debug, Error)]
pub enum DataError {
    /// A database operation failed.
    #[error("database operation failed")]
    Storage {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying SQL error.
        #[source]
        source: sqlx::Error,
    },
    /// A capped stream name was not registered.
    #[error("unknown capped stream '{stream}'")]
    UnknownStream {
        /// Name of the missing stream.
        stream: String,
    },
}

impl DataError {
    pub(crate) fn storage(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Storage { operation, source }
    }
}
