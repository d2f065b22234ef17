//! Span queries: trace reconstruction, filtered search, trace summaries

use sqlx::{QueryBuilder, Row, Sqlite};

use super::{Store, StoreError};

/// Filters for span queries.
///
/// Zero/None fields are not applied. Durations are milliseconds and are
/// compared against `end - start` in the blob.
#[derive(Debug, Default, Clone)]
pub struct SpanQueryOptions {
    pub service_name: Option<String>,
    pub span_name: Option<String>,
    pub min_start_time: i64,
    pub max_start_time: i64,
    pub status_code: Option<i64>,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

/// Filters for trace search.
///
/// Intentionally small: the subset of Tempo search parameters Grafana
/// actually issues.
#[derive(Debug, Default, Clone)]
pub struct TraceSearchOptions {
    pub service_name: Option<String>,
    pub span_name: Option<String>,
    pub min_start_time: i64,
    pub max_start_time: i64,
    pub limit: i64,
}

/// Lightweight description of a trace, suitable for search results
#[derive(Debug, Clone)]
pub struct TraceSummary {
    pub trace_id: String,
    pub root_service_name: String,
    pub root_trace_name: String,
    pub start_time_unix_nano: i64,
    pub duration_ms: i64,
    pub span_count: i64,
    pub status_code: i64,
}

impl Store {
    /// All spans for a trace, ordered by start time ascending
    pub async fn query_trace_by_id(&self, trace_id: &str) -> Result<Vec<String>, StoreError> {
        let _guard = self.read().await;

        let rows = sqlx::query_scalar::<_, String>(
            "SELECT data FROM spans WHERE trace_id = ? ORDER BY start_time_unix_nano",
        )
        .bind(trace_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Filtered span query, ordered by start time descending
    pub async fn query_spans(&self, opts: &SpanQueryOptions) -> Result<Vec<String>, StoreError> {
        let _guard = self.read().await;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT data FROM spans WHERE 1=1");

        if let Some(ref service) = opts.service_name {
            qb.push(" AND service_name = ").push_bind(service);
        }
        if let Some(ref name) = opts.span_name {
            qb.push(" AND span_name = ").push_bind(name);
        }
        if opts.min_start_time > 0 {
            qb.push(" AND start_time_unix_nano >= ")
                .push_bind(opts.min_start_time);
        }
        if opts.max_start_time > 0 {
            qb.push(" AND start_time_unix_nano <= ")
                .push_bind(opts.max_start_time);
        }
        if let Some(code) = opts.status_code {
            qb.push(" AND status_code = ").push_bind(code);
        }
        if let Some(min_ms) = opts.min_duration_ms {
            qb.push(" AND (end_time_unix_nano - start_time_unix_nano) >= ")
                .push_bind(min_ms * 1_000_000);
        }
        if let Some(max_ms) = opts.max_duration_ms {
            qb.push(" AND (end_time_unix_nano - start_time_unix_nano) <= ")
                .push_bind(max_ms * 1_000_000);
        }

        qb.push(" ORDER BY start_time_unix_nano DESC");

        if opts.limit > 0 {
            qb.push(" LIMIT ").push_bind(opts.limit);
        }
        if opts.offset > 0 {
            qb.push(" OFFSET ").push_bind(opts.offset);
        }

        let rows = qb
            .build_query_scalar::<String>()
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    /// Trace summaries grouped by trace id.
    ///
    /// For each candidate trace the root representative is chosen with a
    /// window ordered by (is-root, start time), so a true root wins and
    /// the earliest span wins otherwise. Per-trace aggregates are
    /// min(start), max(end), count and max(status).
    pub async fn search_traces(
        &self,
        opts: &TraceSearchOptions,
    ) -> Result<Vec<TraceSummary>, StoreError> {
        let _guard = self.read().await;

        let mut qb = QueryBuilder::<Sqlite>::new(
            "WITH filtered AS (
                SELECT
                    trace_id,
                    service_name,
                    span_name,
                    parent_span_id,
                    start_time_unix_nano,
                    end_time_unix_nano,
                    status_code
                FROM spans
                WHERE trace_id IS NOT NULL",
        );

        if let Some(ref service) = opts.service_name {
            qb.push(" AND trace_id IN (SELECT trace_id FROM spans WHERE service_name = ")
                .push_bind(service)
                .push(")");
        }
        if let Some(ref name) = opts.span_name {
            qb.push(" AND trace_id IN (SELECT trace_id FROM spans WHERE span_name = ")
                .push_bind(name)
                .push(")");
        }
        if opts.min_start_time > 0 && opts.max_start_time > 0 {
            qb.push(" AND trace_id IN (SELECT trace_id FROM spans WHERE start_time_unix_nano >= ")
                .push_bind(opts.min_start_time)
                .push(" AND start_time_unix_nano <= ")
                .push_bind(opts.max_start_time)
                .push(")");
        } else {
            if opts.min_start_time > 0 {
                qb.push(
                    " AND trace_id IN (SELECT trace_id FROM spans WHERE start_time_unix_nano >= ",
                )
                .push_bind(opts.min_start_time)
                .push(")");
            }
            if opts.max_start_time > 0 {
                qb.push(
                    " AND trace_id IN (SELECT trace_id FROM spans WHERE start_time_unix_nano <= ",
                )
                .push_bind(opts.max_start_time)
                .push(")");
            }
        }

        qb.push(
            "
            ), roots AS (
                SELECT
                    trace_id,
                    FIRST_VALUE(service_name) OVER w AS root_service,
                    FIRST_VALUE(span_name) OVER w AS root_name,
                    start_time_unix_nano,
                    end_time_unix_nano,
                    status_code
                FROM filtered
                WINDOW w AS (
                    PARTITION BY trace_id
                    ORDER BY
                        CASE
                            WHEN parent_span_id IS NULL OR parent_span_id = '' OR parent_span_id = '0000000000000000' THEN 0
                            ELSE 1
                        END,
                        start_time_unix_nano
                )
            )
            SELECT
                trace_id,
                MIN(start_time_unix_nano) AS start_ns,
                MAX(end_time_unix_nano) AS end_ns,
                COUNT(*) AS span_count,
                MAX(status_code) AS max_status,
                MAX(root_service) AS root_service,
                MAX(root_name) AS root_name
            FROM roots
            WHERE trace_id IS NOT NULL
            GROUP BY trace_id ORDER BY start_ns DESC",
        );

        if opts.limit > 0 {
            qb.push(" LIMIT ").push_bind(opts.limit);
        }

        let rows = qb.build().fetch_all(self.pool()).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let start_ns: i64 = row.get("start_ns");
            let end_ns: i64 = row.get("end_ns");
            let duration_ms = if end_ns > start_ns {
                (end_ns - start_ns) / 1_000_000
            } else {
                0
            };

            out.push(TraceSummary {
                trace_id: row.get("trace_id"),
                root_service_name: row
                    .get::<Option<String>, _>("root_service")
                    .unwrap_or_default(),
                root_trace_name: row.get::<Option<String>, _>("root_name").unwrap_or_default(),
                start_time_unix_nano: start_ns,
                duration_ms,
                span_count: row.get("span_count"),
                status_code: row.get::<Option<i64>, _>("max_status").unwrap_or(0),
            });
        }
        Ok(out)
    }

    /// Distinct service names, sorted ascending
    pub async fn list_services(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.read().await;

        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT service_name FROM spans WHERE service_name IS NOT NULL ORDER BY service_name",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Distinct span names for a service, sorted ascending
    pub async fn list_operations(&self, service_name: &str) -> Result<Vec<String>, StoreError> {
        let _guard = self.read().await;

        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT span_name FROM spans WHERE service_name = ? ORDER BY span_name",
        )
        .bind(service_name)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
