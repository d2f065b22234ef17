//! OTLP protobuf helpers
//!
//! Conversion from OTLP `AnyValue` trees to JSON, attribute-map
//! extraction, and identifier hex encoding. Blobs preserve runtime types
//! (string/bool/int/double) so the query layer can render the Tempo
//! any-value forms faithfully.

use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
use serde_json::{Map, Value};

/// Well-known attribute keys
pub mod keys {
    pub const SERVICE_NAME: &str = "service.name";
}

/// Hex-encode a trace/span identifier; empty or all-zero ids become ""
pub fn hex_id(bytes: &[u8]) -> String {
    if bytes.iter().all(|b| *b == 0) {
        String::new()
    } else {
        hex::encode(bytes)
    }
}

/// Convert an OTLP AnyValue to a JSON value.
///
/// Bytes become hex strings; nested arrays and kvlists convert
/// recursively; an unset value becomes null.
pub fn any_value_to_json(value: &AnyValue) -> Value {
    match &value.value {
        Some(any_value::Value::StringValue(s)) => Value::String(s.clone()),
        Some(any_value::Value::BoolValue(b)) => Value::Bool(*b),
        Some(any_value::Value::IntValue(i)) => Value::from(*i),
        Some(any_value::Value::DoubleValue(d)) => {
            serde_json::Number::from_f64(*d).map_or(Value::Null, Value::Number)
        }
        Some(any_value::Value::ArrayValue(arr)) => {
            Value::Array(arr.values.iter().map(any_value_to_json).collect())
        }
        Some(any_value::Value::KvlistValue(kvlist)) => {
            Value::Object(attributes_to_json(&kvlist.values))
        }
        Some(any_value::Value::BytesValue(b)) => Value::String(hex::encode(b)),
        None => Value::Null,
    }
}

/// Convert an OTLP attribute list to a JSON object
pub fn attributes_to_json(attrs: &[KeyValue]) -> Map<String, Value> {
    attrs
        .iter()
        .map(|kv| {
            let value = kv
                .value
                .as_ref()
                .map(any_value_to_json)
                .unwrap_or(Value::Null);
            (kv.key.clone(), value)
        })
        .collect()
}

/// Extract a string attribute by key
pub fn get_string_attribute(attrs: &[KeyValue], key: &str) -> Option<String> {
    attrs.iter().find(|kv| kv.key == key).and_then(|kv| {
        match kv.value.as_ref().and_then(|v| v.value.as_ref()) {
            Some(any_value::Value::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    })
}
