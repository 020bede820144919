#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Persistence layer for the Warren control plane.
//!
//! All cluster-shared state lives in one `PostgreSQL` database: one document
//! row per configuration group, bounded ring-buffer tables for log and audit
//! streams, and the auth limiter record set. Consistency across nodes relies
//! on per-row atomic updates; there is no client-side locking here.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod capped;
pub mod error;
pub mod limiter;

pub use capped::{CappedRow, CappedStore, StreamBounds};
pub use error::{DataError, Result};
pub use limiter::AuthLimiterStore;

/// Default entry cap for the coarse `logs` stream.
pub const DEFAULT_LOG_LIMIT: i64 = 1_000;
/// Default entry cap for the high-volume `log_entries` stream.
pub const DEFAULT_LOG_ENTRY_LIMIT: i64 = 5_000;
/// Bytes budgeted per entry when sizing the `logs` stream.
pub const LOG_BYTES_PER_ENTRY: i64 = 1_024;
/// Bytes budgeted per entry when sizing the `log_entries` stream.
pub const LOG_ENTRY_BYTES_PER_ENTRY: i64 = 512;
/// Default entry cap for the audit `events` stream.
pub const DEFAULT_EVENT_LIMIT: i64 = 1_024;
/// Default byte cap for the audit `events` stream.
pub const DEFAULT_EVENT_BYTES: i64 = 1_048_576;

/// Establish a connection pool against the shared cluster database.
///
/// # Errors
///
/// Returns an error if the `PostgreSQL` connection cannot be established.
pub async fn connect(database_uri: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_uri)
        .await
        .map_err(DataError::storage("data.connect"))
}

/// Collection names with an optional multi-tenant prefix.
///
/// The prefix is restricted to lowercase alphanumerics and underscores so the
/// names stay valid SQL identifiers when spliced into DDL.
#[derive(Debug, Clone, Default)]
pub struct Collections {
    prefix: String,
}

impl Collections {
    /// Build a name set with the given prefix (`None` means no prefix).
    #[must_use]
    pub fn new(prefix: Option<&str>) -> Self {
        let prefix = prefix.map(sanitize_ident).unwrap_or_default();
        Self { prefix }
    }

    /// The `settings` document table.
    #[must_use]
    pub fn settings(&self) -> String {
        format!("{}settings", self.prefix)
    }

    /// The `auth_limiter` record table.
    #[must_use]
    pub fn auth_limiter(&self) -> String {
        format!("{}auth_limiter", self.prefix)
    }

    /// The capped-stream bounds registry.
    #[must_use]
    pub fn capped_streams(&self) -> String {
        format!("{}capped_streams", self.prefix)
    }

    /// Backing table for a capped stream.
    #[must_use]
    pub fn stream_table(&self, stream: &str) -> String {
        format!("{}{}", self.prefix, sanitize_ident(stream))
    }

    /// LISTEN/NOTIFY channel associated with a capped stream.
    #[must_use]
    pub fn stream_channel(&self, stream: &str) -> String {
        format!("{}warren_stream_{}", self.prefix, sanitize_ident(stream))
    }

    /// LISTEN/NOTIFY channel for cluster messenger traffic.
    #[must_use]
    pub fn message_channel(&self, channel: &str) -> String {
        format!("{}warren_msg_{}", self.prefix, sanitize_ident(channel))
    }
}

fn sanitize_ident(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Create the shared tables and default capped streams when absent.
///
/// Stream bounds recorded here are the process defaults; `clear-logs`
/// recreates the log streams from the committed `app` settings.
///
/// # Errors
///
/// Returns an error if any DDL statement fails.
pub async fn ensure_schema(pool: &PgPool, names: &Collections) -> Result<()> {
    let settings = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            name TEXT PRIMARY KEY,
            doc JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        names.settings()
    );
    sqlx::query(&settings)
        .execute(pool)
        .await
        .map_err(DataError::storage("schema.settings"))?;

    let limiter = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            key TEXT PRIMARY KEY,
            attempt_count BIGINT NOT NULL DEFAULT 0,
            first_attempt_time TIMESTAMPTZ NOT NULL DEFAULT now(),
            last_attempt_time TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        names.auth_limiter()
    );
    sqlx::query(&limiter)
        .execute(pool)
        .await
        .map_err(DataError::storage("schema.auth_limiter"))?;

    let streams = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            stream TEXT PRIMARY KEY,
            max_bytes BIGINT NOT NULL,
            max_count BIGINT NOT NULL
        )",
        names.capped_streams()
    );
    sqlx::query(&streams)
        .execute(pool)
        .await
        .map_err(DataError::storage("schema.capped_streams"))?;

    let capped = CappedStore::new(pool.clone(), names.clone());
    capped
        .ensure(
            "logs",
            StreamBounds {
                max_bytes: DEFAULT_LOG_LIMIT * LOG_BYTES_PER_ENTRY,
                max_count: DEFAULT_LOG_LIMIT,
            },
        )
        .await?;
    capped
        .ensure(
            "log_entries",
            StreamBounds {
                max_bytes: DEFAULT_LOG_ENTRY_LIMIT * LOG_ENTRY_BYTES_PER_ENTRY,
                max_count: DEFAULT_LOG_ENTRY_LIMIT,
            },
        )
        .await?;
    capped
        .ensure(
            "events",
            StreamBounds {
                max_bytes: DEFAULT_EVENT_BYTES,
                max_count: DEFAULT_EVENT_LIMIT,
            },
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_sanitized() {
        let names = Collections::new(Some("tenant1;drop "));
        assert_eq!(names.settings(), "tenant1dropsettings");
        assert_eq!(names.stream_table("logs"), "tenant1droplogs");
    }

    #[test]
    fn unprefixed_names_are_bare() {
        let names = Collections::new(None);
        assert_eq!(names.settings(), "settings");
        assert_eq!(names.auth_limiter(), "auth_limiter");
        assert_eq!(names.stream_channel("logs"), "warren_stream_logs");
        assert_eq!(names.message_channel("hosts"), "warren_msg_hosts");
    }
}
