//! Metric point storage and pattern queries

use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::{Store, StoreError};

/// A stored metric data point
#[derive(Debug, Clone, FromRow)]
pub struct MetricRecord {
    pub id: i64,
    pub name: String,
    pub value: f64,
    pub timestamp: i64,
    /// JSON object of tags; `service` and `span` are surfaced as indexed
    /// virtual columns with the raw, unsanitised values preserved
    pub tags: String,
}

impl MetricRecord {
    pub fn new(name: impl Into<String>, value: f64, timestamp: i64, tags: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            value,
            timestamp,
            tags: tags.into(),
        }
    }
}

/// Filters for metric queries
#[derive(Debug, Default, Clone)]
pub struct MetricQueryOptions {
    pub name: String,
    /// When true, `name` is a SQL LIKE pattern (with `ESCAPE '\'`)
    pub name_pattern: bool,
    pub min_time: i64,
    pub max_time: i64,
    pub limit: i64,
}

impl Store {
    /// Metrics matching the given name or LIKE pattern, ordered by
    /// timestamp ascending
    pub async fn query_metrics(
        &self,
        opts: &MetricQueryOptions,
    ) -> Result<Vec<MetricRecord>, StoreError> {
        let _guard = self.read().await;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, value, timestamp, tags FROM metrics WHERE 1=1",
        );

        if !opts.name.is_empty() {
            if opts.name_pattern {
                qb.push(" AND name LIKE ")
                    .push_bind(&opts.name)
                    .push(" ESCAPE '\\'");
            } else {
                qb.push(" AND name = ").push_bind(&opts.name);
            }
        }
        if opts.min_time > 0 {
            qb.push(" AND timestamp >= ").push_bind(opts.min_time);
        }
        if opts.max_time > 0 {
            qb.push(" AND timestamp <= ").push_bind(opts.max_time);
        }

        qb.push(" ORDER BY timestamp");

        if opts.limit > 0 {
            qb.push(" LIMIT ").push_bind(opts.limit);
        }

        let rows = qb
            .build_query_as::<MetricRecord>()
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }
}
