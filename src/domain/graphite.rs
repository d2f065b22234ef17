//! Graphite query helpers
//!
//! A purpose-built micro-parser for the function subset dashboards
//! actually issue (`aliasByNode`, `aliasSub`, one level of nesting),
//! plus wildcard-to-LIKE conversion, metric-name sanitisation, and the
//! service extractors used by Tempo search (logfmt tags and the single
//! TraceQL matcher).

use std::sync::LazyLock;

use regex::Regex;

use crate::core::constants::ALIAS_SUB_MAX_LEN;

/// Parse an `aliasByNode(inner, i1, i2, ...)` expression.
///
/// Returns the inner pattern and the node indices, or None when the
/// expression is not an aliasByNode call (the caller then treats it as a
/// literal wildcard pattern).
pub fn parse_alias_by_node(expr: &str) -> Option<(String, Vec<i64>)> {
    let expr = expr.trim();
    let inner = expr.strip_prefix("aliasByNode(")?.strip_suffix(")")?;
    let args = split_top_level_csv(inner);
    if args.len() < 2 {
        return None;
    }

    let pattern = args[0].trim().trim_matches(['"', '\'']).to_string();

    let mut idxs = Vec::with_capacity(args.len() - 1);
    for a in &args[1..] {
        let a = a.trim();
        if a.is_empty() {
            continue;
        }
        idxs.push(a.parse::<i64>().ok()?);
    }
    if idxs.is_empty() {
        return None;
    }
    Some((pattern, idxs))
}

/// Parse an `aliasSub(inner, "search", "replace")` expression
pub fn parse_alias_sub(expr: &str) -> Option<(String, String, String)> {
    let expr = expr.trim();
    let inner = expr.strip_prefix("aliasSub(")?.strip_suffix(")")?;
    let args = split_top_level_csv(inner);
    if args.len() != 3 {
        return None;
    }

    let metric = args[0].trim().trim_matches(['\'', '"']).to_string();
    let search = args[1].trim().trim_matches(['\'', '"']).to_string();
    let replace = args[2].trim().trim_matches(['\'', '"']).to_string();

    Some((metric, search, replace))
}

/// Split on top-level commas, respecting parenthesis depth so nested
/// function calls survive intact
pub fn split_top_level_csv(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

/// Select dot-separated segments of a metric name by index.
///
/// Negative indices count from the end; out-of-range indices are
/// skipped; an empty selection returns the original name.
pub fn alias_by_node(metric: &str, idxs: &[i64]) -> String {
    let parts: Vec<&str> = metric.split('.').collect();
    if parts.is_empty() {
        return metric.to_string();
    }

    let mut selected = Vec::with_capacity(idxs.len());
    for &idx in idxs {
        let p = if idx < 0 { parts.len() as i64 + idx } else { idx };
        if p < 0 || p >= parts.len() as i64 {
            continue;
        }
        selected.push(parts[p as usize]);
    }
    if selected.is_empty() {
        return metric.to_string();
    }
    selected.join(".")
}

/// Regex substitution on a metric name.
///
/// Patterns longer than `ALIAS_SUB_MAX_LEN` and patterns that fail to
/// compile return the metric unchanged. Replacement uses the engine's
/// `$n` back-reference convention.
pub fn alias_sub(metric: &str, search_regex: &str, replace: &str) -> String {
    if search_regex.len() > ALIAS_SUB_MAX_LEN {
        return metric.to_string();
    }
    match Regex::new(search_regex) {
        Ok(re) => re.replace_all(metric, replace).into_owned(),
        Err(_) => metric.to_string(),
    }
}

/// Convert a Graphite wildcard query into a SQL LIKE pattern.
///
/// `*` → `%`, `?` → `_`; pre-existing `%` and `_` are escaped so names
/// that already contain underscores keep matching literally. Queries
/// built from this must carry `ESCAPE '\'`.
pub fn graphite_to_like_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.chars() {
        match c {
            '%' | '_' => {
                out.push('\\');
                out.push(c);
            }
            '*' => out.push('%'),
            '?' => out.push('_'),
            _ => out.push(c),
        }
    }
    out
}

/// Replace characters that break dot-delimited metric paths with `_`.
///
/// Applied to service and span names in metric paths only; tags keep
/// the raw values.
pub fn sanitize_metric_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' | '=' | ';' | '(' | ')' | '[' | ']' | '{' | '}' => '_',
            _ => c,
        })
        .collect()
}

/// Extract a service name from a logfmt-ish tag string
/// (`key=value key2="value"`), recognising `service.name` and
/// `resource.service.name`.
pub fn extract_service_from_tags(tags: &str) -> Option<String> {
    for field in tags.split_whitespace() {
        let Some((key, val)) = field.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim().trim_matches('"');
        if key == "service.name" || key == "resource.service.name" {
            return Some(val.to_string());
        }
    }
    None
}

/// Matches the common service matcher in TraceQL fragments:
/// `{resource.service.name="foo"}` or `{service.name="foo"}`
static TRACEQL_SERVICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:resource\.)?service\.name\s*=\s*"([^"]+)""#).unwrap());

/// Extract a service name from a TraceQL fragment
pub fn extract_service_from_traceql(q: &str) -> Option<String> {
    TRACEQL_SERVICE_RE
        .captures(q)
        .map(|m| m[1].to_string())
}
