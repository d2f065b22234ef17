//! Application configuration
//!
//! Layered: defaults → optional JSON config file (`gotel.json` in the
//! working directory, or `--config`) → CLI flags with env-var
//! fallbacks. The `GOTEL_DB_PATH` and `GOTEL_RETENTION` environment
//! overrides are applied exactly once at load time; a malformed
//! retention value is fatal.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::cli::CliConfig;
use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_DB_PATH, DEFAULT_OTLP_PORT,
    DEFAULT_PREFIX, DEFAULT_QUERY_PORT, DEFAULT_RETENTION_SECS, ENV_DB_PATH, ENV_RETENTION,
};

/// File-based configuration (JSON); every field optional
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub db_path: Option<PathBuf>,
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub send_metrics: Option<bool>,
    pub store_traces: Option<bool>,
    pub tag_support: Option<bool>,
    /// Go-style duration string, e.g. "168h"
    pub retention: Option<String>,
    /// Go-style duration string, e.g. "1h"
    pub cleanup_interval: Option<String>,
    pub query_port: Option<u16>,
    pub otlp_port: Option<u16>,
    pub cors_allowed_origins: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.warn_unknown_fields();
        Ok(config)
    }

    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra {
            if !map.is_empty() {
                let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
                tracing::warn!(
                    fields = %keys.join(", "),
                    "Unknown fields in config file (possible typos)"
                );
            }
        }
    }
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct GotelConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// Metric-name root
    pub prefix: String,
    /// Optional infix between prefix and service
    pub namespace: Option<String>,
    /// Emit derived per-(service, operation) metrics
    pub send_metrics: bool,
    /// Persist raw span blobs
    pub store_traces: bool,
    /// Reserved; only affects a legacy formatting path
    pub tag_support: bool,
    /// Age after which rows are deleted
    pub retention: Duration,
    /// How often the retention loop runs
    pub cleanup_interval: Duration,
    /// HTTP query API port; 0 disables the gateway
    pub query_port: u16,
    /// OTLP/HTTP receiver port; 0 disables ingestion over HTTP
    pub otlp_port: u16,
    /// CORS allowlist; empty means wildcard
    pub cors_allowed_origins: Vec<String>,
}

impl Default for GotelConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            prefix: DEFAULT_PREFIX.to_string(),
            namespace: None,
            send_metrics: true,
            store_traces: true,
            tag_support: false,
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            query_port: DEFAULT_QUERY_PORT,
            otlp_port: DEFAULT_OTLP_PORT,
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl GotelConfig {
    /// Load configuration from all sources.
    ///
    /// Priority (lowest to highest): defaults, config file, CLI flags
    /// (which carry env-var fallbacks via clap), then the well-known
    /// `GOTEL_*` overrides.
    pub fn load(cli: &CliConfig) -> Result<Self> {
        let mut file_config = FileConfig::default();

        let config_path = if let Some(ref path) = cli.config {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            local.exists().then_some(local)
        };

        if let Some(path) = config_path {
            file_config = FileConfig::load_from_file(&path)?;
        }

        let retention = match cli.retention.as_deref().or(file_config.retention.as_deref()) {
            Some(s) => parse_duration(s)
                .with_context(|| format!("invalid retention duration {s:?}"))?,
            None => Duration::from_secs(DEFAULT_RETENTION_SECS),
        };

        let cleanup_interval = match cli
            .cleanup_interval
            .as_deref()
            .or(file_config.cleanup_interval.as_deref())
        {
            Some(s) => parse_duration(s)
                .with_context(|| format!("invalid cleanup interval {s:?}"))?,
            None => Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        };

        let namespace = cli
            .namespace
            .clone()
            .or(file_config.namespace)
            .filter(|s| !s.is_empty());

        let mut config = Self {
            db_path: cli
                .db_path
                .clone()
                .or(file_config.db_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            prefix: cli
                .prefix
                .clone()
                .or(file_config.prefix)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            namespace,
            send_metrics: cli.send_metrics.or(file_config.send_metrics).unwrap_or(true),
            store_traces: cli.store_traces.or(file_config.store_traces).unwrap_or(true),
            tag_support: file_config.tag_support.unwrap_or(false),
            retention,
            cleanup_interval,
            query_port: cli
                .query_port
                .or(file_config.query_port)
                .unwrap_or(DEFAULT_QUERY_PORT),
            otlp_port: cli
                .otlp_port
                .or(file_config.otlp_port)
                .unwrap_or(DEFAULT_OTLP_PORT),
            cors_allowed_origins: file_config.cors_allowed_origins.unwrap_or_default(),
        };

        config.apply_environment_overrides()?;

        tracing::debug!(
            db_path = %config.db_path.display(),
            prefix = %config.prefix,
            namespace = ?config.namespace,
            send_metrics = config.send_metrics,
            store_traces = config.store_traces,
            retention_secs = config.retention.as_secs(),
            cleanup_interval_secs = config.cleanup_interval.as_secs(),
            query_port = config.query_port,
            otlp_port = config.otlp_port,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Apply well-known environment overrides.
    ///
    /// Separated from `load` layering so the overrides are applied
    /// exactly once during construction.
    fn apply_environment_overrides(&mut self) -> Result<()> {
        if let Ok(db_path) = std::env::var(ENV_DB_PATH) {
            let db_path = db_path.trim();
            if !db_path.is_empty() {
                self.db_path = PathBuf::from(db_path);
            }
        }
        if let Ok(retention) = std::env::var(ENV_RETENTION) {
            let retention = retention.trim();
            if !retention.is_empty() {
                self.retention = parse_duration(retention)
                    .with_context(|| format!("invalid {ENV_RETENTION} {retention:?}"))?;
            }
        }
        Ok(())
    }
}

/// Parse a Go-style duration string: one or more `<number><unit>`
/// segments with units `ms`, `s`, `m`, `h` (e.g. "168h", "1h30m",
/// "500ms", "1.5h").
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("empty duration");
    }

    let mut total_secs = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| anyhow::anyhow!("missing unit in duration {s:?}"))?;
        if num_end == 0 {
            anyhow::bail!("invalid duration {s:?}");
        }
        let value: f64 = rest[..num_end]
            .parse()
            .with_context(|| format!("invalid number in duration {s:?}"))?;

        let unit_end = rest[num_end..]
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .map(|i| num_end + i)
            .unwrap_or(rest.len());
        let factor = match &rest[num_end..unit_end] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            unit => anyhow::bail!("unknown duration unit {unit:?} in {s:?}"),
        };

        total_secs += value * factor;
        rest = &rest[unit_end..];
    }

    if !total_secs.is_finite() || total_secs < 0.0 {
        anyhow::bail!("invalid duration {s:?}");
    }
    Ok(Duration::from_secs_f64(total_secs))
}
