//! Tempo-compatible trace endpoints
//!
//! The subset of the Tempo HTTP API that Grafana's datasource actually
//! issues, plus the UI-oriented trace/span/exception listings.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{json, Map, Value};

use super::QueryState;
use crate::api::types::{clamp_limit, parse_i64_param, ApiError};
use crate::core::constants::{LIST_DEFAULT_LIMIT, SEARCH_DEFAULT_LIMIT};
use crate::data::store::{SpanQueryOptions, TraceSearchOptions};
use crate::domain::graphite::{extract_service_from_tags, extract_service_from_traceql};
use crate::domain::tempo::group_spans_as_resource_spans;

/// Single trace in the Tempo OTLP-JSON shape
pub async fn get_trace(
    State(state): State<QueryState>,
    Path(trace_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    build_trace_response(&state, &trace_id, false).await
}

/// Same, wrapped under a `trace` key (the v2 API shape)
pub async fn get_trace_v2(
    State(state): State<QueryState>,
    Path(trace_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    build_trace_response(&state, &trace_id, true).await
}

async fn build_trace_response(
    state: &QueryState,
    trace_id: &str,
    v2: bool,
) -> Result<Json<Value>, ApiError> {
    if trace_id.is_empty() {
        return Err(ApiError::bad_request("trace_id required"));
    }

    let spans = state
        .store
        .query_trace_by_id(trace_id)
        .await
        .map_err(|e| ApiError::from_store("Failed to load trace", e))?;

    let resource_spans = group_spans_as_resource_spans(&spans);

    // Tempo serves OTLP JSON by default; some clients/plugins
    // historically expected the "batches" key as well.
    let mut resp = Map::new();
    resp.insert("resourceSpans".to_string(), json!(resource_spans));
    resp.insert("batches".to_string(), json!(resource_spans));
    if v2 {
        resp.insert(
            "trace".to_string(),
            json!({
                "resourceSpans": resource_spans,
                "batches": resource_spans,
            }),
        );
    }
    Ok(Json(Value::Object(resp)))
}

/// Trace search
pub async fn search_traces(
    State(state): State<QueryState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let limit = clamp_limit(parse_i64_param(&params, "limit"), SEARCH_DEFAULT_LIMIT);

    let mut service_name = params
        .get("service")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let mut span_name = params
        .get("operation")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    // Grafana's Tempo UI sends '*' (occasionally '.*') for "All";
    // treat both as no filter.
    if service_name == "*" || service_name == ".*" {
        service_name.clear();
    }
    if span_name == "*" || span_name == ".*" {
        span_name.clear();
    }

    // Tempo tag search uses logfmt encoding.
    if service_name.is_empty() {
        if let Some(tags) = params.get("tags") {
            if let Some(s) = extract_service_from_tags(tags) {
                service_name = s;
            }
        }
    }

    // TraceQL search uses the q parameter; only the common
    // service.name matcher is recognised.
    if service_name.is_empty() {
        if let Some(traceql) = params.get("q") {
            if let Some(s) = extract_service_from_traceql(traceql) {
                service_name = s;
            }
        }
    }

    // Tempo search start/end are unix epoch seconds.
    let min_start_ns = parse_i64_param(&params, "start").max(0) * 1_000_000_000;
    let max_start_ns = parse_i64_param(&params, "end").max(0) * 1_000_000_000;

    let traces = state
        .store
        .search_traces(&TraceSearchOptions {
            service_name: (!service_name.is_empty()).then_some(service_name),
            span_name: (!span_name.is_empty()).then_some(span_name),
            min_start_time: min_start_ns,
            max_start_time: max_start_ns,
            limit,
        })
        .await
        .map_err(|e| ApiError::from_store("Failed to search traces", e))?;

    let results: Vec<Value> = traces
        .iter()
        .map(|t| {
            json!({
                "traceID": t.trace_id,
                "rootServiceName": t.root_service_name,
                "rootTraceName": t.root_trace_name,
                "startTimeUnixNano": t.start_time_unix_nano.to_string(),
                "durationMs": t.duration_ms,
            })
        })
        .collect();

    Ok(Json(json!({"traces": results, "metrics": {}})))
}

/// Tag schema advertisement (the minimal set Grafana asks for)
pub async fn search_tags() -> Json<Value> {
    Json(json!({
        "tagNames": ["service.name", "span.name", "status"],
        "metrics": {},
    }))
}

pub async fn search_tags_v2() -> Json<Value> {
    Json(json!({
        "scopes": [
            {"name": "resource", "tags": ["service.name"]},
            {"name": "span", "tags": ["name"]},
            {"name": "intrinsic", "tags": ["duration", "status"]},
        ],
        "metrics": {},
    }))
}

/// Tag values; only the service-name tags are recognised
pub async fn search_tag_values(
    State(state): State<QueryState>,
    Path(tag): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let services = tag_values_services(&state, &tag).await?;
    Ok(Json(json!({"tagValues": services, "metrics": {}})))
}

pub async fn search_tag_values_v2(
    State(state): State<QueryState>,
    Path(tag): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let services = tag_values_services(&state, &tag).await?;
    let values: Vec<Value> = services
        .into_iter()
        .map(|s| json!({"type": "string", "value": s}))
        .collect();
    Ok(Json(json!({"tagValues": values, "metrics": {}})))
}

async fn tag_values_services(state: &QueryState, tag: &str) -> Result<Vec<String>, ApiError> {
    let tag = tag.trim_start_matches('.');
    if tag != "service.name" && tag != "resource.service.name" {
        return Err(ApiError::not_found("unsupported tag"));
    }
    state
        .store
        .list_services()
        .await
        .map_err(|e| ApiError::from_store("Failed to list services", e))
}

/// Service list (kept for backwards compatibility with earlier
/// experiments)
pub async fn list_services(
    State(state): State<QueryState>,
) -> Result<Json<Vec<String>>, ApiError> {
    let services = state
        .store
        .list_services()
        .await
        .map_err(|e| ApiError::from_store("Failed to list services", e))?;
    Ok(Json(services))
}

/// UI-oriented trace summaries
pub async fn list_traces(State(state): State<QueryState>) -> Result<Json<Vec<Value>>, ApiError> {
    let traces = state
        .store
        .search_traces(&TraceSearchOptions {
            limit: clamp_limit(0, LIST_DEFAULT_LIMIT),
            ..Default::default()
        })
        .await
        .map_err(|e| ApiError::from_store("Failed to query traces", e))?;

    let list: Vec<Value> = traces
        .iter()
        .map(|t| {
            json!({
                "trace_id": t.trace_id,
                "span_name": t.root_trace_name,
                "service_name": t.root_service_name,
                "duration_ms": t.duration_ms,
                "status_code": t.status_code,
                "span_count": t.span_count,
                "start_time": t.start_time_unix_nano,
            })
        })
        .collect();

    Ok(Json(list))
}

/// Raw span blobs, filterable by service
pub async fn list_spans(
    State(state): State<QueryState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let limit = clamp_limit(parse_i64_param(&params, "limit"), LIST_DEFAULT_LIMIT);
    let service_name = params
        .get("service")
        .filter(|s| !s.is_empty())
        .cloned();

    let spans = state
        .store
        .query_spans(&SpanQueryOptions {
            service_name,
            limit,
            ..Default::default()
        })
        .await
        .map_err(|e| ApiError::from_store("Failed to query spans", e))?;

    let parsed: Vec<Value> = spans
        .iter()
        .filter_map(|raw| serde_json::from_str(raw).ok())
        .collect();

    Ok(Json(parsed))
}

/// Exception records extracted from error spans.
///
/// One record per event whose name contains "exception"
/// (case-insensitively); error spans without such an event yield a
/// single fallback record built from the span itself.
pub async fn list_exceptions(
    State(state): State<QueryState>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let error_spans = state
        .store
        .query_spans(&SpanQueryOptions {
            status_code: Some(2),
            limit: clamp_limit(0, LIST_DEFAULT_LIMIT),
            ..Default::default()
        })
        .await
        .map_err(|e| ApiError::from_store("Failed to query error spans", e))?;

    let mut exceptions = Vec::new();
    for raw in &error_spans {
        let Ok(span) = serde_json::from_str::<Value>(raw) else {
            continue;
        };
        collect_span_exceptions(&span, &mut exceptions);
    }

    Ok(Json(exceptions))
}

fn collect_span_exceptions(span: &Value, out: &mut Vec<Value>) {
    let status_code = span
        .pointer("/status/code")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if status_code != 2 {
        return;
    }

    let start_ns = span
        .get("start_time_unix_nano")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let base = |timestamp_ms: i64| {
        json!({
            "trace_id": span.get("trace_id").cloned().unwrap_or_default(),
            "span_id": span.get("span_id").cloned().unwrap_or_default(),
            "service_name": span.get("service_name").cloned().unwrap_or_default(),
            "span_name": span.get("span_name").cloned().unwrap_or_default(),
            "timestamp": timestamp_ms,
            "severity": "critical",
        })
    };

    let mut emitted = 0usize;
    if let Some(events) = span.get("events").and_then(Value::as_array) {
        for event in events {
            let name = event.get("name").and_then(Value::as_str).unwrap_or("");
            if !name.to_lowercase().contains("exception") {
                continue;
            }

            let mut timestamp_ms = event
                .get("timestamp")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                / 1_000_000;
            if timestamp_ms == 0 {
                timestamp_ms = start_ns / 1_000_000;
            }

            let mut exception = base(timestamp_ms);
            if let Some(attrs) = event.get("attributes").and_then(Value::as_object) {
                if let Some(t) = attrs.get("exception.type").and_then(Value::as_str) {
                    exception["exception_type"] = json!(t);
                }
                if let Some(m) = attrs.get("exception.message").and_then(Value::as_str) {
                    exception["message"] = json!(m);
                }
                if let Some(s) = attrs.get("exception.stacktrace").and_then(Value::as_str) {
                    exception["stack_trace"] = json!(s);
                }
            }
            out.push(exception);
            emitted += 1;
        }
    }

    // No exception events: fall back to one record from the span.
    if emitted == 0 {
        let mut exception = base(start_ns / 1_000_000);
        if let Some(msg) = span.pointer("/status/message").and_then(Value::as_str) {
            if !msg.is_empty() {
                exception["message"] = json!(msg);
            }
        }
        out.push(exception);
    }
}
