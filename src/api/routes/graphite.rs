//! Graphite-compatible metric endpoints: `/render` and `/metrics/find`
//!
//! Both accept repeatable query parameters and form-encoded POST/PUT
//! bodies (Grafana uses both). Function expressions that fail to parse
//! are not errors: the string falls back to being a literal wildcard
//! pattern.

use std::collections::{BTreeMap, BTreeSet};

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::Method;
use axum::Json;
use serde_json::{json, Value};

use super::QueryState;
use crate::api::types::ApiError;
use crate::core::constants::FIND_SCAN_LIMIT;
use crate::data::store::{MetricQueryOptions, Store};
use crate::domain::graphite::{
    alias_by_node, alias_sub, graphite_to_like_pattern, parse_alias_by_node, parse_alias_sub,
};

/// Render metric series as `{target, datapoints}` objects
pub async fn render(
    State(state): State<QueryState>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Json<Vec<Value>>, ApiError> {
    let targets = collect_params(query.as_deref(), &method, &body, &["target"])?;

    let mut all_results: Vec<Value> = Vec::new();

    for target in targets {
        let target = target.trim();
        if target.is_empty() {
            continue;
        }

        // aliasSub first (outer function); its inner part may itself be
        // an aliasByNode call, in which case both transforms compose.
        if let Some((inner, search, replace)) = parse_alias_sub(target) {
            let series = if let Some((pattern, idxs)) = parse_alias_by_node(&inner) {
                query_metric_series(&state.store, &pattern)
                    .await?
                    .into_iter()
                    .map(|(name, dps)| {
                        (alias_sub(&alias_by_node(&name, &idxs), &search, &replace), dps)
                    })
                    .collect::<Vec<_>>()
            } else {
                query_metric_series(&state.store, &inner)
                    .await?
                    .into_iter()
                    .map(|(name, dps)| (alias_sub(&name, &search, &replace), dps))
                    .collect()
            };
            for (name, datapoints) in series {
                all_results.push(json!({"target": name, "datapoints": datapoints}));
            }
            continue;
        }

        if let Some((pattern, idxs)) = parse_alias_by_node(target) {
            for (name, datapoints) in query_metric_series(&state.store, &pattern).await? {
                all_results.push(json!({
                    "target": alias_by_node(&name, &idxs),
                    "datapoints": datapoints,
                }));
            }
            continue;
        }

        for (name, datapoints) in query_metric_series(&state.store, target).await? {
            all_results.push(json!({"target": name, "datapoints": datapoints}));
        }
    }

    Ok(Json(all_results))
}

/// Discover metric names as Graphite find nodes
pub async fn find(
    State(state): State<QueryState>,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Json<Vec<Value>>, ApiError> {
    let mut queries = collect_params(query.as_deref(), &method, &body, &["query"])?;
    if !queries.iter().any(|q| !q.trim().is_empty()) {
        queries = collect_params(query.as_deref(), &method, &body, &["q"])?;
    }
    let query = queries.into_iter().find(|q| !q.trim().is_empty());

    // Grafana probes /metrics/find with an empty query during dashboard
    // initialization; Graphite-compatible behaviour is an empty list,
    // not an error.
    let Some(query) = query else {
        return Ok(Json(Vec::new()));
    };
    let query = query.trim();

    let names = if let Some((inner, search, replace)) = parse_alias_sub(query) {
        if let Some((pattern, idxs)) = parse_alias_by_node(&inner) {
            find_metric_nodes(&state.store, &pattern)
                .await?
                .into_iter()
                .map(|n| alias_sub(&alias_by_node(&n, &idxs), &search, &replace))
                .collect::<Vec<_>>()
        } else {
            find_metric_nodes(&state.store, &inner)
                .await?
                .into_iter()
                .map(|n| alias_sub(&n, &search, &replace))
                .collect()
        }
    } else if let Some((pattern, idxs)) = parse_alias_by_node(query) {
        find_metric_nodes(&state.store, &pattern)
            .await?
            .into_iter()
            .map(|n| alias_by_node(&n, &idxs))
            .collect()
    } else {
        find_metric_nodes(&state.store, query).await?
    };

    let result: Vec<Value> = names
        .into_iter()
        .map(|name| {
            json!({
                "text": name.clone(),
                "id": name,
                "expandable": false,
                "allowChildren": false,
            })
        })
        .collect();

    Ok(Json(result))
}

/// Gather values for the given keys from the query string, falling back
/// to a form-encoded body on POST/PUT
fn collect_params(
    query: Option<&str>,
    method: &Method,
    body: &[u8],
    keys: &[&str],
) -> Result<Vec<String>, ApiError> {
    let mut out: Vec<String> = Vec::new();

    if let Some(query) = query {
        if let Ok(pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
            out.extend(
                pairs
                    .into_iter()
                    .filter(|(k, _)| keys.contains(&k.as_str()))
                    .map(|(_, v)| v),
            );
        }
    }

    if out.is_empty() && matches!(*method, Method::POST | Method::PUT) && !body.is_empty() {
        let pairs = serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
            .map_err(|_| ApiError::bad_request("invalid form data"))?;
        out.extend(
            pairs
                .into_iter()
                .filter(|(k, _)| keys.contains(&k.as_str()))
                .map(|(_, v)| v),
        );
    }

    Ok(out)
}

/// Query points for a target and group them into series by metric name.
///
/// Wildcard targets only keep metrics whose segment count is at least
/// the pattern's. This intentionally loosens strict Graphite semantics
/// (where `*` matches a single segment) because operation names may
/// themselves contain dots (e.g. "azure_openai.completions") and would
/// otherwise never match.
async fn query_metric_series(
    store: &Store,
    target: &str,
) -> Result<BTreeMap<String, Vec<Value>>, ApiError> {
    let name_pattern = target.contains('*') || target.contains('?');
    let expected_segments = target.split('.').count();

    let name = if name_pattern {
        graphite_to_like_pattern(target)
    } else {
        target.to_string()
    };

    let metrics = store
        .query_metrics(&MetricQueryOptions {
            name,
            name_pattern,
            ..Default::default()
        })
        .await
        .map_err(|e| ApiError::from_store("Failed to query metrics", e))?;

    let mut grouped: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for m in metrics {
        if name_pattern && m.name.split('.').count() < expected_segments {
            continue;
        }
        grouped
            .entry(m.name.clone())
            .or_default()
            .push(json!([m.value, m.timestamp]));
    }
    Ok(grouped)
}

/// Approximate Graphite find semantics: unique nodes at the query depth
async fn find_metric_nodes(store: &Store, query: &str) -> Result<Vec<String>, ApiError> {
    let pattern = graphite_to_like_pattern(query);
    let metrics = store
        .query_metrics(&MetricQueryOptions {
            name: pattern,
            name_pattern: true,
            limit: FIND_SCAN_LIMIT,
            ..Default::default()
        })
        .await
        .map_err(|e| ApiError::from_store("Failed to find metrics", e))?;

    let depth = query.split('.').count();
    let mut nodes = BTreeSet::new();
    for m in metrics {
        let parts: Vec<&str> = m.name.split('.').collect();
        if parts.len() < depth {
            continue;
        }
        nodes.insert(parts[..depth].join("."));
    }

    Ok(nodes.into_iter().collect())
}
