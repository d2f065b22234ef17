//! Domain logic: ingestion, retention, and query-shape conversion

pub mod graphite;
pub mod ingest;
pub mod retention;
pub mod tempo;

pub use ingest::Ingestor;
