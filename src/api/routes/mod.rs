//! Query API route handlers

pub mod graphite;
pub mod health;
pub mod otlp;
pub mod tempo;

use std::sync::Arc;

use crate::data::store::Store;

/// Shared state for query API endpoints
#[derive(Clone)]
pub struct QueryState {
    pub store: Arc<Store>,
}
