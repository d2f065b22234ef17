//! HTTP middleware: request logging and CORS
//!
//! The CORS behaviour matches what Grafana's Tempo/Graphite datasources
//! expect: wildcard origin by default (dev/internal use), or
//! echo-if-allowlisted when origins are configured; preflight OPTIONS
//! answers 204 with only the CORS headers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::core::constants::{DEFAULT_BODY_LIMIT, MAX_LOGGED_BODY_BYTES};

/// Allowed CORS origins; empty means wildcard
#[derive(Debug, Clone, Default)]
pub struct AllowedOrigins {
    origins: Arc<Vec<String>>,
}

impl AllowedOrigins {
    pub fn new(origins: &[String]) -> Self {
        Self {
            origins: Arc::new(origins.to_vec()),
        }
    }

    /// The Access-Control-Allow-Origin value for a request origin, if any
    fn allow_origin(&self, request_origin: Option<&HeaderValue>) -> Option<HeaderValue> {
        if self.origins.is_empty() {
            return Some(HeaderValue::from_static("*"));
        }
        let origin = request_origin?.to_str().ok()?;
        if self.origins.iter().any(|o| o == origin) {
            request_origin.cloned()
        } else {
            None
        }
    }
}

/// CORS middleware: sets the allow headers on every response and
/// short-circuits preflight OPTIONS with 204
pub async fn cors(
    State(allowed): State<AllowedOrigins>,
    req: Request,
    next: Next,
) -> Response {
    let allow_origin = allowed.allow_origin(req.headers().get(header::ORIGIN));

    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    if let Some(origin) = allow_origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );

    response
}

/// Request logging middleware.
///
/// Logs method, path, query, status, duration and remote address at
/// info. POST/PUT bodies are captured (up to 64 KiB, truncated beyond)
/// only when debug logging is enabled, and the body is re-wrapped so
/// downstream handlers still see it.
pub async fn log_requests(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let capture_body = tracing::enabled!(tracing::Level::DEBUG)
        && matches!(*req.method(), Method::POST | Method::PUT);

    let (req, body_log) = if capture_body {
        let (parts, body) = req.into_parts();
        match axum::body::to_bytes(body, DEFAULT_BODY_LIMIT).await {
            Ok(bytes) => {
                let log = logged_body(&bytes);
                (
                    Request::from_parts(parts, Body::from(bytes)),
                    log,
                )
            }
            Err(_) => {
                return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
                    .into_response();
            }
        }
    } else {
        (req, None)
    };

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %uri.path(),
        query = uri.query().unwrap_or(""),
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        remote_addr = %addr,
        "HTTP request"
    );
    if let Some(body) = body_log {
        tracing::debug!(path = %uri.path(), body = %body, "HTTP request body");
    }

    response
}

fn logged_body(bytes: &Bytes) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let truncated = bytes.len() > MAX_LOGGED_BODY_BYTES;
    let slice = &bytes[..bytes.len().min(MAX_LOGGED_BODY_BYTES)];
    let mut s = String::from_utf8_lossy(slice).into_owned();
    if truncated {
        s.push_str("... (truncated)");
    }
    Some(s)
}
