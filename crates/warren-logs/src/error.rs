//! Error types for log storage and viewing.

use std::io;

use thiserror::Error;
use warren_data::DataError;

/// Result alias for log operations.
pub type LogResult<T> = std::result::Result<T, LogError>;

/// Primary error type for log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// Data layer operation failed.
    #[error("log storage operation failed")]
    Storage {
        /// Operation identifier.
        operation: &'static str,
        /// Source data-layer error.
        #[source]
        source: DataError,
    },
    /// Writing an archive file failed.
    #[error("log archive write failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
}

impl LogError {
    pub(crate) fn storage(operation: &'static str) -> impl FnOnce(DataError) -> Self {
        move |source| Self::Storage { operation, source }
    }

    pub(crate) fn io(operation: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { operation, source }
    }
}
