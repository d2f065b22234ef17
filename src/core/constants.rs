// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "gotel";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "gotel.json";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "GOTEL_LOG";

/// Environment variable overriding the database path
pub const ENV_DB_PATH: &str = "GOTEL_DB_PATH";

/// Environment variable overriding the retention duration (Go-style, e.g. "168h")
pub const ENV_RETENTION: &str = "GOTEL_RETENTION";

// =============================================================================
// Defaults
// =============================================================================

/// Default database file path
pub const DEFAULT_DB_PATH: &str = "gotel.db";

/// Default metric name prefix
pub const DEFAULT_PREFIX: &str = "otel";

/// Default retention in seconds (168h / 7 days)
pub const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

/// Default cleanup interval in seconds (1 hour)
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60 * 60;

/// Default HTTP query API port (Tempo's default); 0 disables the gateway
pub const DEFAULT_QUERY_PORT: u16 = 3200;

/// Default OTLP/HTTP receiver port (standard OTLP HTTP port); 0 disables
pub const DEFAULT_OTLP_PORT: u16 = 4318;

// =============================================================================
// SQLite
// =============================================================================

/// SQLite connection pool size: a handful of read slots, one writer at a
/// time enforced by the in-process lock
pub const SQLITE_MAX_CONNECTIONS: u32 = 4;

/// SQLite busy timeout in seconds
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 5;

/// SQLite page cache size (negative = KiB, so -64000 = 64 MiB)
pub const SQLITE_CACHE_SIZE: &str = "-64000";

// =============================================================================
// Query Limits
// =============================================================================

/// Maximum number of results returned by any list endpoint
pub const MAX_QUERY_LIMIT: i64 = 10_000;

/// Default limit for trace search
pub const SEARCH_DEFAULT_LIMIT: i64 = 20;

/// Default (and cap) for UI-oriented list endpoints
pub const LIST_DEFAULT_LIMIT: i64 = 1000;

/// Row scan limit when resolving metric-find nodes
pub const FIND_SCAN_LIMIT: i64 = 2000;

// =============================================================================
// HTTP Gateway
// =============================================================================

/// Body limit for query API requests (1 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Body limit for OTLP ingestion (64 MiB)
pub const OTLP_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Per-request handling timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Cap on request body bytes captured for debug logging
pub const MAX_LOGGED_BODY_BYTES: usize = 64 * 1024;

// =============================================================================
// Graphite Functions
// =============================================================================

/// Maximum length of a user-supplied aliasSub regex (ReDoS guard)
pub const ALIAS_SUB_MAX_LEN: usize = 512;

// =============================================================================
// Shutdown
// =============================================================================

/// Graceful shutdown timeout in seconds
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
