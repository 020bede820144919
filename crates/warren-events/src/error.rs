//! Error types for event and messenger operations.

use thiserror::Error;
use warren_data::DataError;

/// Result alias for event operations.
pub type EventResult<T> = std::result::Result<T, EventError>;

/// Errors raised by the event store and messenger.
#[derive(Debug, Error)]
pub enum EventError {
    /// Data layer operation failed.
    #[error("data access failed")]
    DataAccess {
        /// Operation identifier.
        operation: &'static str,
        /// Source data-layer error.
        #[source]
        source: DataError,
    },
    /// Underlying database operation failed.
    #[error("database operation failed")]
    Database {
        /// Operation identifier.
        operation: &'static str,
        /// Source database error.
        #[source]
        source: sqlx::Error,
    },
}

impl EventError {
    pub(crate) fn data(operation: &'static str) -> impl FnOnce(DataError) -> Self {
        move |source| Self::DataAccess { operation, source }
    }

    pub(crate) fn database(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Database { operation, source }
    }
}
