//! Append and lifecycle operations on the capped log streams.

use chrono::Utc;
use tracing::info;
use warren_data::{CappedStore, StreamBounds};

use crate::entry::{LogEntry, LogLevel};
use crate::error::{LogError, LogResult};

/// Stream holding coarse, operator-facing log lines.
pub const LOGS_STREAM: &str = "logs";
/// Stream holding high-volume per-connection detail.
pub const LOG_ENTRIES_STREAM: &str = "log_entries";

/// Writer over the two capped log streams.
#[derive(Debug, Clone)]
pub struct LogStore {
    capped: CappedStore,
}

impl LogStore {
    /// Wrap a capped store.
    #[must_use]
    pub const fn new(capped: CappedStore) -> Self {
        Self { capped }
    }

    /// The underlying capped store.
    #[must_use]
    pub const fn capped(&self) -> &CappedStore {
        &self.capped
    }

    /// Append a line to the coarse `logs` stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the append fails.
    pub async fn append(&self, level: LogLevel, message: &str) -> LogResult<i64> {
        self.capped
            .append(LOGS_STREAM, Utc::now(), &LogEntry::payload(level, message))
            .await
            .map_err(LogError::storage("logs.append"))
    }

    /// Append a record to the high-volume `log_entries` stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the append fails.
    pub async fn append_entry(&self, level: LogLevel, message: &str) -> LogResult<i64> {
        self.capped
            .append(
                LOG_ENTRIES_STREAM,
                Utc::now(),
                &LogEntry::payload(level, message),
            )
            .await
            .map_err(LogError::storage("logs.append_entry"))
    }

    /// Drop both log streams and recreate them sized from the given entry
    /// caps, discarding all stored records.
    ///
    /// Byte bounds are derived from the caps with a fixed per-entry budget,
    /// coarser for `logs` than for `log_entries`.
    ///
    /// # Errors
    ///
    /// Returns an error if either stream cannot be recreated.
    pub async fn recreate_streams(
        &self,
        log_limit: i64,
        log_entry_limit: i64,
    ) -> LogResult<()> {
        self.capped
            .recreate(
                LOGS_STREAM,
                StreamBounds {
                    max_bytes: log_limit * warren_data::LOG_BYTES_PER_ENTRY,
                    max_count: log_limit,
                },
            )
            .await
            .map_err(LogError::storage("logs.recreate"))?;
        self.capped
            .recreate(
                LOG_ENTRIES_STREAM,
                StreamBounds {
                    max_bytes: log_entry_limit * warren_data::LOG_ENTRY_BYTES_PER_ENTRY,
                    max_count: log_entry_limit,
                },
            )
            .await
            .map_err(LogError::storage("logs.recreate_entries"))?;
        info!(log_limit, log_entry_limit, "log streams recreated");
        Ok(())
    }
}
