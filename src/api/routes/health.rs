//! Health and status endpoints

use axum::extract::State;
use axum::Json;

use super::QueryState;
use crate::api::types::ApiError;
use crate::data::store::StorageStats;

/// Readiness probe: the sole signal consumers use to know the core is
/// reachable
pub async fn ready() -> &'static str {
    "ready"
}

/// Tempo-compatible echo endpoint
pub async fn echo() -> &'static str {
    "echo"
}

/// Storage statistics
pub async fn status(State(state): State<QueryState>) -> Result<Json<StorageStats>, ApiError> {
    let stats = state
        .store
        .stats()
        .await
        .map_err(|e| ApiError::from_store("Failed to load stats", e))?;
    Ok(Json(stats))
}
