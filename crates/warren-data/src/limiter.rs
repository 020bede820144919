//! Failed-authentication limiter records.
//!
//! Records are written by the authentication component; this layer exposes
//! the interface boundary it calls plus the administrative bulk clear.

use sqlx::PgPool;

use crate::error::{DataError, Result};
use crate::Collections;

/// Store for failed authentication attempt records.
#[derive(Debug, Clone)]
pub struct AuthLimiterStore {
    pool: PgPool,
    names: Collections,
}

impl AuthLimiterStore {
    /// Wrap a pool and name set.
    #[must_use]
    pub const fn new(pool: PgPool, names: Collections) -> Self {
        Self { pool, names }
    }

    /// Record one failed attempt for `key`, creating the record when absent.
    ///
    /// Called by the authentication component; the limiter policy itself
    /// lives there, not here.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn record_attempt(&self, key: &str) -> Result<i64> {
        let sql = format!(
            "INSERT INTO {} (key, attempt_count) VALUES ($1, 1)
             ON CONFLICT (key) DO UPDATE SET
                attempt_count = {0}.attempt_count + 1,
                last_attempt_time = now()
             RETURNING attempt_count",
            self.names.auth_limiter()
        );
        sqlx::query_scalar(&sql)
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::storage("limiter.record_attempt"))
    }

    /// Delete every limiter record unconditionally. Idempotent; a no-op on
    /// an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn clear_all(&self) -> Result<u64> {
        let sql = format!("DELETE FROM {}", self.names.auth_limiter());
        let result = sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(DataError::storage("limiter.clear_all"))?;
        Ok(result.rows_affected())
    }

    /// Number of limiter records currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.names.auth_limiter());
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::storage("limiter.count"))
    }
}
