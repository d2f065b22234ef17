//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Self-contained OTLP trace ingestion and query appliance
#[derive(Debug, Parser)]
#[command(name = "gotel", version, about)]
pub struct CliConfig {
    /// Path to a JSON config file (default: ./gotel.json if present)
    #[arg(long, env = "GOTEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Metric name prefix
    #[arg(long, env = "GOTEL_PREFIX")]
    pub prefix: Option<String>,

    /// Optional namespace inserted between prefix and service
    #[arg(long, env = "GOTEL_NAMESPACE")]
    pub namespace: Option<String>,

    /// Emit derived metrics from spans
    #[arg(long, env = "GOTEL_SEND_METRICS")]
    pub send_metrics: Option<bool>,

    /// Persist raw span blobs
    #[arg(long, env = "GOTEL_STORE_TRACES")]
    pub store_traces: Option<bool>,

    /// Data retention as a Go-style duration (e.g. 168h)
    #[arg(long)]
    pub retention: Option<String>,

    /// Cleanup interval as a Go-style duration (e.g. 1h)
    #[arg(long, env = "GOTEL_CLEANUP_INTERVAL")]
    pub cleanup_interval: Option<String>,

    /// HTTP query API port (0 disables)
    #[arg(long, env = "GOTEL_QUERY_PORT")]
    pub query_port: Option<u16>,

    /// OTLP/HTTP receiver port (0 disables)
    #[arg(long, env = "GOTEL_OTLP_PORT")]
    pub otlp_port: Option<u16>,
}

pub fn parse() -> CliConfig {
    CliConfig::parse()
}
