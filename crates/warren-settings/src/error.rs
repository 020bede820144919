//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use warren_data::DataError;
use warren_events::EventError;

use crate::value::ValueKind;

/// Result alias for configuration operations.
pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Group or field name was not recognized.
    #[error("unknown configuration group or field")]
    NotFound {
        /// Group that was addressed.
        group: String,
        /// Field that was addressed, when the group itself resolved.
        field: Option<String>,
    },
    /// Value type conflicts with the field's established type.
    #[error("value type {provided} conflicts with established type {expected}")]
    TypeMismatch {
        /// Group containing the field.
        group: String,
        /// Field that rejected the value.
        field: String,
        /// Type established by the stored value or default.
        expected: ValueKind,
        /// Type of the rejected value.
        provided: ValueKind,
    },
    /// Address did not split into exactly two non-empty components.
    #[error("invalid configuration address '{address}'")]
    InvalidAddress {
        /// The malformed address string.
        address: String,
    },
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
    /// Event or messenger propagation failed.
    #[error("change propagation failed")]
    Propagation {
        /// Operation identifier.
        operation: &'static str,
        /// Source event-layer error.
        #[source]
        source: EventError,
    },
    /// Bootstrap file contained invalid JSON.
    #[error("bootstrap file is not a valid JSON document")]
    BootstrapParse {
        /// Path of the offending file.
        path: PathBuf,
        /// Parse error detail.
        #[source]
        source: serde_json::Error,
    },
    /// File system operation failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
}

impl SettingsError {
    pub(crate) fn not_found(group: impl Into<String>, field: Option<&str>) -> Self {
        Self::NotFound {
            group: group.into(),
            field: field.map(str::to_string),
        }
    }

    pub(crate) fn data(operation: &'static str) -> impl FnOnce(DataError) -> Self {
        move |source| Self::DataAccess { operation, source }
    }

    pub(crate) fn database(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Database { operation, source }
    }

    pub(crate) fn propagation(operation: &'static str) -> impl FnOnce(EventError) -> Self {
        move |source| Self::Propagation { operation, source }
    }

    pub(crate) fn io(operation: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { operation, source }
    }
}
