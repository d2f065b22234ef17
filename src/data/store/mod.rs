//! Embedded SQLite store for spans and derived metrics
//!
//! Single-writer, multi-reader storage over one database file:
//! - WAL mode so readers proceed alongside the writer
//! - JSON span blobs with virtual generated columns for indexing
//! - batch writes are atomic (spans + metrics in one transaction)
//!
//! SQLite already serialises writers at the file level; the in-process
//! `RwLock` on top gives clean cancellation semantics and avoids
//! busy-retry loops inside the driver.

pub mod error;
mod metrics;
pub mod schema;
mod spans;

pub use error::StoreError;
pub use metrics::{MetricQueryOptions, MetricRecord};
pub use spans::{SpanQueryOptions, TraceSearchOptions, TraceSummary};

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use tokio::sync::RwLock;

use crate::core::constants::{
    SQLITE_BUSY_TIMEOUT_SECS, SQLITE_CACHE_SIZE, SQLITE_MAX_CONNECTIONS,
};

/// SQLite-backed storage for spans and metrics
pub struct Store {
    pool: SqlitePool,
    lock: RwLock<()>,
}

/// Storage statistics reported by `/api/status`
#[derive(Debug, Default, Clone, Serialize)]
pub struct StorageStats {
    pub span_count: i64,
    pub metric_count: i64,
    pub trace_count: i64,
    pub service_count: i64,
}

impl Store {
    /// Open (or create) the database file and initialise the schema.
    ///
    /// Idempotent: opening the same path twice succeeds and loses no data.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(SQLITE_BUSY_TIMEOUT_SECS))
            .pragma("cache_size", SQLITE_CACHE_SIZE);

        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(schema::SPANS_SCHEMA).execute(&pool).await?;
        sqlx::raw_sql(schema::METRICS_SCHEMA).execute(&pool).await?;

        tracing::debug!(path = %path.display(), "Store opened");
        Ok(Self {
            pool,
            lock: RwLock::new(()),
        })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, ()> {
        self.lock.read().await
    }

    /// Insert spans and metrics in a single transaction.
    ///
    /// Either every row from the batch becomes visible or none does; a
    /// reader can never observe a partially applied batch.
    pub async fn insert_batch(
        &self,
        spans: &[String],
        metrics: &[MetricRecord],
    ) -> Result<(), StoreError> {
        if spans.is_empty() && metrics.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.write().await;
        let mut tx = self.pool.begin().await?;

        for data in spans {
            sqlx::query("INSERT INTO spans (data) VALUES (?)")
                .bind(data)
                .execute(&mut *tx)
                .await?;
        }

        for m in metrics {
            sqlx::query("INSERT INTO metrics (name, value, timestamp, tags) VALUES (?, ?, ?, ?)")
                .bind(&m.name)
                .bind(m.value)
                .bind(m.timestamp)
                .bind(&m.tags)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete spans and metrics older than the retention duration.
    ///
    /// Returns the total number of deleted rows.
    pub async fn cleanup(&self, retention: Duration) -> Result<u64, StoreError> {
        let _guard = self.lock.write().await;

        let cutoff = chrono::Utc::now().timestamp() - retention.as_secs() as i64;

        let spans_deleted = sqlx::query("DELETE FROM spans WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let metrics_deleted = sqlx::query("DELETE FROM metrics WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(spans_deleted + metrics_deleted)
    }

    /// Storage statistics: row counts plus distinct trace/service counts
    pub async fn stats(&self) -> Result<StorageStats, StoreError> {
        let _guard = self.lock.read().await;

        let row = sqlx::query(
            "SELECT COUNT(*), COUNT(DISTINCT trace_id), COUNT(DISTINCT service_name) FROM spans",
        )
        .fetch_one(&self.pool)
        .await?;

        let metric_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metrics")
            .fetch_one(&self.pool)
            .await?;

        Ok(StorageStats {
            span_count: row.get(0),
            trace_count: row.get(1),
            service_count: row.get(2),
            metric_count,
        })
    }

    /// Force a WAL truncation checkpoint; called on shutdown
    pub async fn checkpoint(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        tracing::debug!("WAL checkpoint completed");
        Ok(())
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Store closed");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    pub async fn open_temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Store::open(dir.path().join("test.db"))
            .await
            .expect("Failed to open store");
        (dir, store)
    }

    pub fn span_json(
        trace_id: &str,
        span_id: &str,
        parent: &str,
        service: &str,
        name: &str,
        start: i64,
        end: i64,
        status: i64,
    ) -> String {
        serde_json::json!({
            "trace_id": trace_id,
            "span_id": span_id,
            "parent_span_id": parent,
            "service_name": service,
            "span_name": name,
            "kind": "internal",
            "start_time_unix_nano": start,
            "end_time_unix_nano": end,
            "duration_ms": (end - start).max(0) / 1_000_000,
            "status": {"code": status, "message": ""}
        })
        .to_string()
    }
}
