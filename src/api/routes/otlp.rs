//! OTLP/HTTP trace receiver
//!
//! Thin ingress shim in front of the core `push(batch)` contract:
//! decodes protobuf or JSON `ExportTraceServiceRequest` bodies and
//! hands them to the ingestor. Store failures surface as 500 so the
//! exporting SDK applies its own retry policy.

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use prost::Message;

use crate::domain::Ingestor;

/// Shared state for the OTLP receiver
#[derive(Clone)]
pub struct OtlpState {
    pub ingestor: Arc<Ingestor>,
}

/// Content type for OTLP requests/responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OtlpContentType {
    Protobuf,
    Json,
}

impl OtlpContentType {
    /// Defaults to protobuf when the content type is missing or
    /// unrecognised, per the OTLP/HTTP spec
    fn from_headers(headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if content_type.starts_with("application/json") {
            OtlpContentType::Json
        } else {
            OtlpContentType::Protobuf
        }
    }

    fn as_header_value(self) -> &'static str {
        match self {
            OtlpContentType::Protobuf => "application/x-protobuf",
            OtlpContentType::Json => "application/json",
        }
    }
}

/// POST /v1/traces
pub async fn export_traces(
    State(state): State<OtlpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = OtlpContentType::from_headers(&headers);

    let request: ExportTraceServiceRequest = match content_type {
        OtlpContentType::Protobuf => match ExportTraceServiceRequest::decode(body.as_ref()) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode protobuf request");
                return (StatusCode::BAD_REQUEST, "Failed to decode protobuf request")
                    .into_response();
            }
        },
        OtlpContentType::Json => match serde_json::from_slice(body.as_ref()) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode JSON request");
                return (StatusCode::BAD_REQUEST, "Failed to decode JSON request")
                    .into_response();
            }
        },
    };

    if let Err(e) = state.ingestor.push(&request).await {
        tracing::error!(error = %e, "Failed to store traces");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to store traces").into_response();
    }

    let response = ExportTraceServiceResponse {
        partial_success: None,
    };
    let (content_type_value, bytes) = match content_type {
        OtlpContentType::Protobuf => (
            content_type.as_header_value(),
            response.encode_to_vec(),
        ),
        OtlpContentType::Json => match serde_json::to_vec(&response) {
            Ok(b) => (content_type.as_header_value(), b),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode OTLP response");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                    .into_response();
            }
        },
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type_value)],
        bytes,
    )
        .into_response()
}
