//! Bounded ring-buffer streams over plain `PostgreSQL` tables.
//!
//! `PostgreSQL` has no native capped collections, so each stream is a table
//! keyed by an insertion sequence plus a registry row recording its bounds.
//! Every append runs an index-based eviction pass that deletes the oldest
//! rows while either the entry count or the byte total exceeds the bound.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::error::{DataError, Result};
use crate::Collections;

/// Size and count bounds for one capped stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamBounds {
    /// Maximum total payload bytes retained.
    pub max_bytes: i64,
    /// Maximum number of entries retained.
    pub max_count: i64,
}

/// One stored entry of a capped stream.
#[derive(Debug, Clone)]
pub struct CappedRow {
    /// Store-assigned insertion sequence; monotonically increasing.
    pub id: i64,
    /// Entry timestamp.
    pub created_at: DateTime<Utc>,
    /// Entry payload document.
    pub payload: Value,
}

/// Access to all capped streams of one database.
#[derive(Debug, Clone)]
pub struct CappedStore {
    pool: PgPool,
    names: Collections,
}

impl CappedStore {
    /// Wrap a pool and name set.
    #[must_use]
    pub const fn new(pool: PgPool, names: Collections) -> Self {
        Self { pool, names }
    }

    /// The collection name set backing this store.
    #[must_use]
    pub const fn names(&self) -> &Collections {
        &self.names
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the stream when absent, leaving an existing stream untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if table creation or registry insert fails.
    pub async fn ensure(&self, stream: &str, bounds: StreamBounds) -> Result<()> {
        self.create_table(stream).await?;
        let sql = format!(
            "INSERT INTO {} (stream, max_bytes, max_count) VALUES ($1, $2, $3)
             ON CONFLICT (stream) DO NOTHING",
            self.names.capped_streams()
        );
        sqlx::query(&sql)
            .bind(stream)
            .bind(bounds.max_bytes)
            .bind(bounds.max_count)
            .execute(&self.pool)
            .await
            .map_err(DataError::storage("capped.ensure"))?;
        Ok(())
    }

    /// Drop and recreate the stream with new bounds, discarding its history.
    ///
    /// There is a brief window with zero capacity between drop and create;
    /// acceptable for an administrative, low-frequency operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the drop, create, or registry update fails.
    pub async fn recreate(&self, stream: &str, bounds: StreamBounds) -> Result<()> {
        let drop_sql = format!("DROP TABLE IF EXISTS {}", self.names.stream_table(stream));
        sqlx::query(&drop_sql)
            .execute(&self.pool)
            .await
            .map_err(DataError::storage("capped.recreate.drop"))?;
        self.create_table(stream).await?;

        let sql = format!(
            "INSERT INTO {} (stream, max_bytes, max_count) VALUES ($1, $2, $3)
             ON CONFLICT (stream) DO UPDATE SET max_bytes = $2, max_count = $3",
            self.names.capped_streams()
        );
        sqlx::query(&sql)
            .bind(stream)
            .bind(bounds.max_bytes)
            .bind(bounds.max_count)
            .execute(&self.pool)
            .await
            .map_err(DataError::storage("capped.recreate.bounds"))?;

        debug!(
            stream,
            max_bytes = bounds.max_bytes,
            max_count = bounds.max_count,
            "capped stream recreated"
        );
        Ok(())
    }

    /// Registered bounds for a stream.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::UnknownStream`] when the stream is not registered.
    pub async fn bounds(&self, stream: &str) -> Result<StreamBounds> {
        let sql = format!(
            "SELECT max_bytes, max_count FROM {} WHERE stream = $1",
            self.names.capped_streams()
        );
        let row = sqlx::query(&sql)
            .bind(stream)
            .fetch_optional(&self.pool)
            .await
            .map_err(DataError::storage("capped.bounds"))?;
        let row = row.ok_or_else(|| DataError::UnknownStream {
            stream: stream.to_string(),
        })?;
        Ok(StreamBounds {
            max_bytes: row.try_get("max_bytes").map_err(DataError::storage("capped.bounds"))?,
            max_count: row.try_get("max_count").map_err(DataError::storage("capped.bounds"))?,
        })
    }

    /// Append a payload, evict past either bound, and notify tailers.
    ///
    /// Returns the assigned insertion sequence.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::UnknownStream`] for unregistered streams, or a
    /// storage error if the insert or eviction pass fails.
    pub async fn append(
        &self,
        stream: &str,
        timestamp: DateTime<Utc>,
        payload: &Value,
    ) -> Result<i64> {
        let bounds = self.bounds(stream).await?;
        let table = self.names.stream_table(stream);

        let insert = format!(
            "INSERT INTO {table} (created_at, payload, payload_bytes)
             VALUES ($1, $2, octet_length($2::text)) RETURNING id"
        );
        let id: i64 = sqlx::query_scalar(&insert)
            .bind(timestamp)
            .bind(payload)
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::storage("capped.append"))?;

        self.evict(stream, bounds).await?;

        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(self.names.stream_channel(stream))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(DataError::storage("capped.append.notify"))?;

        Ok(id)
    }

    /// Read stored rows in natural (insertion) or reverse order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn rows(
        &self,
        stream: &str,
        natural: bool,
        limit: Option<i64>,
    ) -> Result<Vec<CappedRow>> {
        let direction = if natural { "ASC" } else { "DESC" };
        let sql = format!(
            "SELECT id, created_at, payload FROM {}
             ORDER BY created_at {direction}, id {direction} LIMIT $1",
            self.names.stream_table(stream)
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::storage("capped.rows"))?;
        rows.into_iter().map(map_row).collect()
    }

    /// Read rows appended after the given insertion sequence, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn rows_after(&self, stream: &str, cursor: i64) -> Result<Vec<CappedRow>> {
        let sql = format!(
            "SELECT id, created_at, payload FROM {}
             WHERE id > $1 ORDER BY id ASC",
            self.names.stream_table(stream)
        );
        let rows = sqlx::query(&sql)
            .bind(cursor)
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::storage("capped.rows_after"))?;
        rows.into_iter().map(map_row).collect()
    }

    /// Highest insertion sequence currently stored, or zero when empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn latest_id(&self, stream: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COALESCE(MAX(id), 0) FROM {}",
            self.names.stream_table(stream)
        );
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::storage("capped.latest_id"))
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn len(&self, stream: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.names.stream_table(stream));
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::storage("capped.len"))
    }

    /// Total payload bytes currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn total_bytes(&self, stream: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COALESCE(SUM(payload_bytes), 0)::bigint FROM {}",
            self.names.stream_table(stream)
        );
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::storage("capped.total_bytes"))
    }

    async fn create_table(&self, stream: &str) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                payload JSONB NOT NULL,
                payload_bytes BIGINT NOT NULL
            )",
            self.names.stream_table(stream)
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(DataError::storage("capped.create_table"))?;
        Ok(())
    }

    /// Delete the oldest rows while either bound is exceeded. The newest row
    /// is never evicted, even when it alone exceeds the byte bound.
    async fn evict(&self, stream: &str, bounds: StreamBounds) -> Result<()> {
        let table = self.names.stream_table(stream);

        let count_sql = format!(
            "DELETE FROM {table} WHERE id <= COALESCE(
                (SELECT id FROM {table} ORDER BY id DESC OFFSET $1 LIMIT 1), 0)"
        );
        sqlx::query(&count_sql)
            .bind(bounds.max_count)
            .execute(&self.pool)
            .await
            .map_err(DataError::storage("capped.evict.count"))?;

        let cutoff_sql = format!(
            "SELECT COALESCE(MIN(id), 0) FROM (
                SELECT id, SUM(payload_bytes) OVER (ORDER BY id DESC) AS running
                FROM {table}
            ) totals WHERE running <= $1"
        );
        let mut cutoff: i64 = sqlx::query_scalar(&cutoff_sql)
            .bind(bounds.max_bytes)
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::storage("capped.evict.cutoff"))?;
        if cutoff == 0 {
            cutoff = self.latest_id(stream).await?;
        }

        let bytes_sql = format!("DELETE FROM {table} WHERE id < $1");
        sqlx::query(&bytes_sql)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(DataError::storage("capped.evict.bytes"))?;

        Ok(())
    }
}

fn map_row(row: sqlx::postgres::PgRow) -> Result<CappedRow> {
    Ok(CappedRow {
        id: row.try_get("id").map_err(DataError::storage("capped.map_row"))?,
        created_at: row
            .try_get("created_at")
            .map_err(DataError::storage("capped.map_row"))?,
        payload: row
            .try_get("payload")
            .map_err(DataError::storage("capped.map_row"))?,
    })
}
