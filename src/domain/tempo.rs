//! Tempo-shaped trace envelopes
//!
//! Regroups stored span blobs into the OTLP-JSON shape Tempo serves by
//! default: a list of `resourceSpans`, each with a resource attribute
//! block and `scopeSpans` carrying converted spans. Only fields the
//! store persists are rendered.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

/// Group raw span blobs by resource service and scope name into a
/// `resourceSpans` list.
///
/// Blobs that fail to parse are skipped.
pub fn group_spans_as_resource_spans(spans: &[String]) -> Vec<Value> {
    // service -> scope name -> spans
    let mut resources: BTreeMap<String, BTreeMap<String, Vec<Value>>> = BTreeMap::new();
    let mut resource_attrs: BTreeMap<String, Value> = BTreeMap::new();
    let mut scope_attrs: BTreeMap<(String, String), Value> = BTreeMap::new();

    for raw in spans {
        let Ok(m) = serde_json::from_str::<Value>(raw) else {
            continue;
        };

        let mut service = String::new();
        if let Some(res) = m.get("resource").and_then(Value::as_object) {
            if let Some(v) = res.get("service.name").and_then(Value::as_str) {
                service = v.to_string();
            }
            if !service.is_empty() {
                resource_attrs
                    .entry(service.clone())
                    .or_insert_with(|| Value::Array(map_to_otlp_attributes(res)));
            }
        }
        if service.is_empty() {
            if let Some(v) = m.get("service_name").and_then(Value::as_str) {
                service = v.to_string();
            }
        }
        if service.is_empty() {
            service = "unknown".to_string();
        }

        let mut scope_name = String::new();
        if let Some(scope) = m.get("scope").and_then(Value::as_object) {
            if let Some(v) = scope.get("name").and_then(Value::as_str) {
                scope_name = v.to_string();
            }
            scope_attrs
                .entry((service.clone(), scope_name.clone()))
                .or_insert_with(|| json!({"name": scope_name}));
        }

        resources
            .entry(service.clone())
            .or_default()
            .entry(scope_name)
            .or_default()
            .push(to_tempo_span(&m));
    }

    let mut out = Vec::with_capacity(resources.len());
    for (service, scopes) in resources {
        let scope_spans: Vec<Value> = scopes
            .into_iter()
            .map(|(scope_name, span_list)| {
                let scope = scope_attrs
                    .get(&(service.clone(), scope_name.clone()))
                    .cloned()
                    .unwrap_or_else(|| json!({"name": scope_name}));
                json!({"scope": scope, "spans": span_list})
            })
            .collect();

        let attrs = resource_attrs
            .get(&service)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        out.push(json!({
            "resource": {"attributes": attrs},
            "scopeSpans": scope_spans,
        }));
    }

    out
}

/// Convert a stored span blob into the Tempo span shape
pub fn to_tempo_span(m: &Value) -> Value {
    let get_str = |key: &str| m.get(key).and_then(Value::as_str).unwrap_or("");

    let attrs = m
        .get("attributes")
        .and_then(Value::as_object)
        .map(map_to_otlp_attributes)
        .unwrap_or_default();

    let mut status = Map::new();
    if let Some(st) = m.get("status").and_then(Value::as_object) {
        let code = match st.get("code").and_then(Value::as_i64) {
            Some(1) => "STATUS_CODE_OK",
            Some(2) => "STATUS_CODE_ERROR",
            _ => "STATUS_CODE_UNSET",
        };
        status.insert("code".to_string(), Value::from(code));
        if let Some(msg) = st.get("message").and_then(Value::as_str) {
            if !msg.is_empty() {
                status.insert("message".to_string(), Value::from(msg));
            }
        }
    }

    let kind = match get_str("kind").to_ascii_lowercase().as_str() {
        "internal" => "SPAN_KIND_INTERNAL",
        "server" => "SPAN_KIND_SERVER",
        "client" => "SPAN_KIND_CLIENT",
        "producer" => "SPAN_KIND_PRODUCER",
        "consumer" => "SPAN_KIND_CONSUMER",
        _ => "SPAN_KIND_UNSPECIFIED",
    };

    // Timestamps render as decimal strings, the OTLP-JSON convention
    // for 64-bit integers.
    let start = m
        .get("start_time_unix_nano")
        .map(json_number_string)
        .unwrap_or_default();
    let end = m
        .get("end_time_unix_nano")
        .map(json_number_string)
        .unwrap_or_default();

    let mut out = Map::new();
    out.insert("traceId".to_string(), Value::from(get_str("trace_id")));
    out.insert("spanId".to_string(), Value::from(get_str("span_id")));
    out.insert("name".to_string(), Value::from(get_str("span_name")));
    out.insert("kind".to_string(), Value::from(kind));
    out.insert("startTimeUnixNano".to_string(), Value::from(start));
    out.insert("endTimeUnixNano".to_string(), Value::from(end));
    out.insert("attributes".to_string(), Value::Array(attrs));
    out.insert("status".to_string(), Value::Object(status));

    let parent = get_str("parent_span_id");
    if !parent.is_empty() && parent != "0000000000000000" {
        out.insert("parentSpanId".to_string(), Value::from(parent));
    }

    if let Some(events) = m.get("events").and_then(Value::as_array) {
        let converted: Vec<Value> = events
            .iter()
            .filter_map(Value::as_object)
            .map(|em| {
                let mut ce = Map::new();
                if let Some(n) = em.get("name").and_then(Value::as_str) {
                    ce.insert("name".to_string(), Value::from(n));
                }
                if let Some(ts) = em.get("timestamp").and_then(Value::as_i64) {
                    ce.insert("timeUnixNano".to_string(), Value::from(ts.to_string()));
                }
                if let Some(at) = em.get("attributes").and_then(Value::as_object) {
                    ce.insert(
                        "attributes".to_string(),
                        Value::Array(map_to_otlp_attributes(at)),
                    );
                }
                Value::Object(ce)
            })
            .collect();
        if !converted.is_empty() {
            out.insert("events".to_string(), Value::Array(converted));
        }
    }

    Value::Object(out)
}

/// Convert a JSON attribute map to a key-sorted OTLP attribute list
pub fn map_to_otlp_attributes(m: &Map<String, Value>) -> Vec<Value> {
    let mut attrs: Vec<(&String, &Value)> = m.iter().collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    attrs
        .into_iter()
        .map(|(k, v)| json!({"key": k, "value": to_otlp_any_value(v)}))
        .collect()
}

/// Render a decoded JSON value in the Tempo any-value form.
///
/// Strings, bools and numbers map to their tagged variants; integers
/// and whole-valued doubles render as decimal strings under `intValue`;
/// everything else falls back to `stringValue` of its printed form.
pub fn to_otlp_any_value(v: &Value) -> Value {
    match v {
        Value::String(s) => json!({"stringValue": s}),
        Value::Bool(b) => json!({"boolValue": b}),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({"intValue": i.to_string()})
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    json!({"intValue": format!("{}", f as i64)})
                } else {
                    json!({"doubleValue": f})
                }
            } else {
                json!({"stringValue": n.to_string()})
            }
        }
        Value::Null => json!({"stringValue": "null"}),
        other => json!({"stringValue": other.to_string()}),
    }
}

fn json_number_string(v: &Value) -> String {
    match v {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
