//! Store schema
//!
//! Spans are persisted as raw JSON blobs; every queryable field is a
//! virtual generated column projected out of the blob with
//! `json_extract`, so new indexed fields can be added by declaring a new
//! column without rewriting rows. All statements are `IF NOT EXISTS` —
//! opening the same file twice is a no-op.

/// Spans table: raw JSON with virtual indexed columns
pub const SPANS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS spans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data TEXT NOT NULL,
    created_at INTEGER DEFAULT (strftime('%s', 'now')),

    trace_id TEXT GENERATED ALWAYS AS (json_extract(data, '$.trace_id')) VIRTUAL,
    span_id TEXT GENERATED ALWAYS AS (json_extract(data, '$.span_id')) VIRTUAL,
    parent_span_id TEXT GENERATED ALWAYS AS (json_extract(data, '$.parent_span_id')) VIRTUAL,
    service_name TEXT GENERATED ALWAYS AS (json_extract(data, '$.service_name')) VIRTUAL,
    span_name TEXT GENERATED ALWAYS AS (json_extract(data, '$.span_name')) VIRTUAL,
    start_time_unix_nano INTEGER GENERATED ALWAYS AS (json_extract(data, '$.start_time_unix_nano')) VIRTUAL,
    end_time_unix_nano INTEGER GENERATED ALWAYS AS (json_extract(data, '$.end_time_unix_nano')) VIRTUAL,
    duration_ns INTEGER GENERATED ALWAYS AS (json_extract(data, '$.end_time_unix_nano') - json_extract(data, '$.start_time_unix_nano')) VIRTUAL,
    status_code INTEGER GENERATED ALWAYS AS (json_extract(data, '$.status.code')) VIRTUAL,

    service_version TEXT GENERATED ALWAYS AS (json_extract(data, '$.resource."service.version"')) VIRTUAL,
    deployment_environment TEXT GENERATED ALWAYS AS (json_extract(data, '$.resource."deployment.environment"')) VIRTUAL,

    scope_name TEXT GENERATED ALWAYS AS (json_extract(data, '$.scope.name')) VIRTUAL
);

CREATE INDEX IF NOT EXISTS idx_spans_trace_id ON spans(trace_id);
CREATE INDEX IF NOT EXISTS idx_spans_service_name ON spans(service_name);
CREATE INDEX IF NOT EXISTS idx_spans_span_name ON spans(span_name);
CREATE INDEX IF NOT EXISTS idx_spans_start_time ON spans(start_time_unix_nano);
CREATE INDEX IF NOT EXISTS idx_spans_status_code ON spans(status_code);
CREATE INDEX IF NOT EXISTS idx_spans_service_span ON spans(service_name, span_name);
CREATE INDEX IF NOT EXISTS idx_spans_created_at ON spans(created_at);
CREATE INDEX IF NOT EXISTS idx_spans_service_version ON spans(service_version);
CREATE INDEX IF NOT EXISTS idx_spans_deployment_env ON spans(deployment_environment);
CREATE INDEX IF NOT EXISTS idx_spans_scope_name ON spans(scope_name);
"#;

/// Metrics table: time-series points with tag extractions
pub const METRICS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    value REAL NOT NULL,
    timestamp INTEGER NOT NULL,
    tags TEXT DEFAULT '{}',

    service TEXT GENERATED ALWAYS AS (json_extract(tags, '$.service')) VIRTUAL,
    span TEXT GENERATED ALWAYS AS (json_extract(tags, '$.span')) VIRTUAL
);

CREATE INDEX IF NOT EXISTS idx_metrics_name ON metrics(name);
CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp);
CREATE INDEX IF NOT EXISTS idx_metrics_name_timestamp ON metrics(name, timestamp);
CREATE INDEX IF NOT EXISTS idx_metrics_service ON metrics(service);
"#;
