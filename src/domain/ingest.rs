//! Trace ingestion
//!
//! Converts an OTLP span batch into durable rows: one JSON blob per
//! span plus per-(service, operation) aggregated metric points, handed
//! to the store in a single atomic write. The upstream receiver owns
//! retry/backpressure, so store failures propagate to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::trace::v1::Span;
use serde_json::{json, Map, Value};

use crate::core::config::GotelConfig;
use crate::data::store::{MetricRecord, Store, StoreError};
use crate::domain::graphite::sanitize_metric_name;
use crate::utils::otlp::{attributes_to_json, get_string_attribute, hex_id, keys};

/// Per-(scope, sanitised span name) metric accumulator
#[derive(Debug, Default)]
struct SpanAggregation {
    raw_span_name: String,
    count: i64,
    total_duration_ms: f64,
    error_count: i64,
}

/// Converts span batches into store rows
pub struct Ingestor {
    store: Arc<Store>,
    prefix: String,
    namespace: Option<String>,
    store_traces: bool,
    send_metrics: bool,
}

impl Ingestor {
    pub fn new(store: Arc<Store>, config: &GotelConfig) -> Self {
        Self {
            store,
            prefix: config.prefix.clone(),
            namespace: config.namespace.clone(),
            store_traces: config.store_traces,
            send_metrics: config.send_metrics,
        }
    }

    /// Ingest one OTLP batch.
    ///
    /// Everything derived from the batch commits atomically; a reader
    /// never observes a partial batch.
    pub async fn push(&self, request: &ExportTraceServiceRequest) -> Result<(), StoreError> {
        let mut span_blobs: Vec<String> = Vec::new();
        let mut metrics: Vec<MetricRecord> = Vec::new();
        let timestamp = chrono::Utc::now().timestamp();

        for rs in &request.resource_spans {
            let resource_attrs = rs
                .resource
                .as_ref()
                .map(|r| attributes_to_json(&r.attributes))
                .unwrap_or_default();

            let service_name_raw = rs
                .resource
                .as_ref()
                .and_then(|r| get_string_attribute(&r.attributes, keys::SERVICE_NAME))
                .unwrap_or_else(|| "unknown".to_string());
            let service_name_metric = sanitize_metric_name(&service_name_raw);

            for ss in &rs.scope_spans {
                let mut span_aggs: HashMap<String, SpanAggregation> = HashMap::new();

                for span in &ss.spans {
                    let span_name_metric = sanitize_metric_name(&span.name);

                    if self.store_traces {
                        let blob = span_to_json(
                            span,
                            &service_name_raw,
                            &resource_attrs,
                            ss.scope.as_ref(),
                        );
                        match serde_json::to_string(&blob) {
                            Ok(s) => span_blobs.push(s),
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    span_name = %span.name,
                                    "Failed to marshal span, skipping"
                                );
                            }
                        }
                    }

                    if self.send_metrics {
                        let agg = span_aggs
                            .entry(span_name_metric)
                            .or_insert_with(|| SpanAggregation {
                                raw_span_name: span.name.clone(),
                                ..Default::default()
                            });
                        agg.count += 1;
                        agg.total_duration_ms = agg.total_duration_ms
                            + span.end_time_unix_nano.saturating_sub(span.start_time_unix_nano)
                                as f64
                                / 1e6;
                        if span.status.as_ref().map(|s| s.code) == Some(2) {
                            agg.error_count += 1;
                        }
                    }
                }

                if self.send_metrics {
                    for (span_name_metric, agg) in &span_aggs {
                        let prefix = self.build_prefix(&service_name_metric, span_name_metric);

                        let mut tags = Map::new();
                        tags.insert("service".to_string(), Value::from(service_name_raw.clone()));
                        tags.insert("span".to_string(), Value::from(agg.raw_span_name.clone()));
                        let tags_json = match serde_json::to_string(&tags) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    span_name = %agg.raw_span_name,
                                    "Failed to marshal metric tags, skipping"
                                );
                                continue;
                            }
                        };

                        metrics.push(MetricRecord::new(
                            format!("{prefix}.span_count"),
                            agg.count as f64,
                            timestamp,
                            tags_json.clone(),
                        ));

                        if agg.count > 0 {
                            metrics.push(MetricRecord::new(
                                format!("{prefix}.duration_ms"),
                                agg.total_duration_ms / agg.count as f64,
                                timestamp,
                                tags_json.clone(),
                            ));
                        }

                        if agg.error_count > 0 {
                            metrics.push(MetricRecord::new(
                                format!("{prefix}.error_count"),
                                agg.error_count as f64,
                                timestamp,
                                tags_json,
                            ));
                        }
                    }
                }
            }
        }

        if span_blobs.is_empty() && metrics.is_empty() {
            return Ok(());
        }

        self.store.insert_batch(&span_blobs, &metrics).await?;

        tracing::debug!(
            spans = span_blobs.len(),
            metrics = metrics.len(),
            "Stored traces"
        );
        Ok(())
    }

    fn build_prefix(&self, service_name: &str, span_name: &str) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => {
                format!("{}.{}.{}.{}", self.prefix, ns, service_name, span_name)
            }
            _ => format!("{}.{}.{}", self.prefix, service_name, span_name),
        }
    }
}

/// Span kind as a lowercase string for the blob
fn kind_str(kind: i32) -> &'static str {
    match kind {
        1 => "internal",
        2 => "server",
        3 => "client",
        4 => "producer",
        5 => "consumer",
        _ => "unspecified",
    }
}

/// Build the canonical JSON blob for one span
fn span_to_json(
    span: &Span,
    service_name: &str,
    resource_attrs: &Map<String, Value>,
    scope: Option<&InstrumentationScope>,
) -> Value {
    let start = span.start_time_unix_nano as i64;
    let end = span.end_time_unix_nano as i64;
    let duration_ms = (end - start).max(0) / 1_000_000;

    let (status_code, status_message) = span
        .status
        .as_ref()
        .map(|s| (s.code, s.message.clone()))
        .unwrap_or((0, String::new()));

    let mut data = Map::new();
    data.insert("trace_id".to_string(), Value::from(hex_id(&span.trace_id)));
    data.insert("span_id".to_string(), Value::from(hex_id(&span.span_id)));
    data.insert(
        "parent_span_id".to_string(),
        Value::from(hex_id(&span.parent_span_id)),
    );
    data.insert("service_name".to_string(), Value::from(service_name));
    data.insert("span_name".to_string(), Value::from(span.name.clone()));
    data.insert("kind".to_string(), Value::from(kind_str(span.kind)));
    data.insert("start_time_unix_nano".to_string(), Value::from(start));
    data.insert("end_time_unix_nano".to_string(), Value::from(end));
    data.insert("duration_ms".to_string(), Value::from(duration_ms));
    data.insert(
        "status".to_string(),
        json!({"code": status_code, "message": status_message}),
    );

    if !span.trace_state.is_empty() {
        data.insert(
            "trace_state".to_string(),
            Value::from(span.trace_state.clone()),
        );
    }

    if !resource_attrs.is_empty() {
        data.insert(
            "resource".to_string(),
            Value::Object(resource_attrs.clone()),
        );
    }

    if let Some(scope) = scope {
        if !scope.name.is_empty() {
            let mut scope_data = Map::new();
            scope_data.insert("name".to_string(), Value::from(scope.name.clone()));
            if !scope.version.is_empty() {
                scope_data.insert("version".to_string(), Value::from(scope.version.clone()));
            }
            data.insert("scope".to_string(), Value::Object(scope_data));
        }
    }

    if !span.attributes.is_empty() {
        data.insert(
            "attributes".to_string(),
            Value::Object(attributes_to_json(&span.attributes)),
        );
    }

    if !span.links.is_empty() {
        let links: Vec<Value> = span
            .links
            .iter()
            .map(|link| {
                let mut l = Map::new();
                l.insert("trace_id".to_string(), Value::from(hex_id(&link.trace_id)));
                l.insert("span_id".to_string(), Value::from(hex_id(&link.span_id)));
                if !link.trace_state.is_empty() {
                    l.insert(
                        "trace_state".to_string(),
                        Value::from(link.trace_state.clone()),
                    );
                }
                if !link.attributes.is_empty() {
                    l.insert(
                        "attributes".to_string(),
                        Value::Object(attributes_to_json(&link.attributes)),
                    );
                }
                Value::Object(l)
            })
            .collect();
        data.insert("links".to_string(), Value::Array(links));
    }

    if !span.events.is_empty() {
        let events: Vec<Value> = span
            .events
            .iter()
            .map(|ev| {
                let mut e = Map::new();
                e.insert("name".to_string(), Value::from(ev.name.clone()));
                e.insert(
                    "timestamp".to_string(),
                    Value::from(ev.time_unix_nano as i64),
                );
                if !ev.attributes.is_empty() {
                    e.insert(
                        "attributes".to_string(),
                        Value::Object(attributes_to_json(&ev.attributes)),
                    );
                }
                Value::Object(e)
            })
            .collect();
        data.insert("events".to_string(), Value::Array(events));
    }

    Value::Object(data)
}

#[cfg(test)]
pub(crate) mod test_support {
    use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
    use opentelemetry_proto::tonic::resource::v1::Resource;
    use opentelemetry_proto::tonic::trace::v1::span::Event;
    use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, Status};

    pub fn string_attr(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue {
                value: Some(any_value::Value::StringValue(value.to_string())),
            }),
        }
    }

    pub fn make_span(
        trace_id: [u8; 16],
        span_id: [u8; 8],
        name: &str,
        start: u64,
        end: u64,
        status_code: i32,
    ) -> Span {
        Span {
            trace_id: trace_id.to_vec(),
            span_id: span_id.to_vec(),
            trace_state: String::new(),
            parent_span_id: vec![],
            flags: 0,
            name: name.to_string(),
            kind: 2,
            start_time_unix_nano: start,
            end_time_unix_nano: end,
            attributes: vec![],
            dropped_attributes_count: 0,
            events: vec![],
            dropped_events_count: 0,
            links: vec![],
            dropped_links_count: 0,
            status: Some(Status {
                message: String::new(),
                code: status_code,
            }),
        }
    }

    pub fn make_request(service: &str, spans: Vec<Span>) -> ExportTraceServiceRequest {
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: Some(Resource {
                    attributes: vec![string_attr("service.name", service)],
                    dropped_attributes_count: 0,
                }),
                scope_spans: vec![ScopeSpans {
                    scope: None,
                    spans,
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        }
    }

    pub fn exception_event(ts: u64) -> Event {
        Event {
            time_unix_nano: ts,
            name: "exception".to_string(),
            attributes: vec![
                string_attr("exception.type", "RuntimeError"),
                string_attr("exception.message", "x"),
                string_attr("exception.stacktrace", "stack..."),
            ],
            dropped_attributes_count: 0,
        }
    }
}
