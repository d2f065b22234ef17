//! Shared API types: error mapping and limit clamping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::core::constants::MAX_QUERY_LIMIT;
use crate::data::store::StoreError;

/// API error carrying a short human-readable body.
///
/// The Tempo/Graphite surface answers errors with plain text, so this
/// maps straight to `(status, message)`. Translation from store errors
/// happens exactly once, at the handler boundary.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!(message = %message, "Bad request");
        Self::BadRequest(message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!(message = %message, "Not found");
        Self::NotFound(message)
    }

    /// Wrap a store failure; the underlying cause is logged, the client
    /// sees only the short context string
    pub fn from_store(context: &str, e: StoreError) -> Self {
        tracing::error!(error = %e, "{context}");
        Self::Internal(context.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, message).into_response()
    }
}

/// Clamp a requested limit to `[1, MAX_QUERY_LIMIT]`, substituting the
/// default when the request carries none (or a non-positive value)
pub fn clamp_limit(limit: i64, default_limit: i64) -> i64 {
    if limit <= 0 {
        default_limit
    } else {
        limit.min(MAX_QUERY_LIMIT)
    }
}

/// Parse an optional integer query parameter, ignoring malformed values
pub fn parse_i64_param(params: &std::collections::HashMap<String, String>, key: &str) -> i64 {
    params
        .get(key)
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0)
}
