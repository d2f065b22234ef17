//! HTTP server assembly
//!
//! Two surfaces: the query gateway (Tempo + Graphite + status) and the
//! OTLP/HTTP receiver. Middleware chain on the gateway is
//! logging → CORS → router, with a per-request timeout standing in for
//! a read-header timeout and compression for the JSON payloads.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;

use super::middleware::{cors, log_requests, AllowedOrigins};
use super::routes::otlp::{export_traces, OtlpState};
use super::routes::{graphite, health, tempo, QueryState};
use crate::core::constants::{DEFAULT_BODY_LIMIT, OTLP_BODY_LIMIT, REQUEST_TIMEOUT_SECS};
use crate::data::store::Store;
use crate::domain::Ingestor;

/// Query API routes without middleware (also used by router tests)
pub fn query_routes(store: Arc<Store>) -> Router {
    let state = QueryState { store };

    Router::new()
        // Tempo-compatible endpoints (subset used by Grafana)
        .route("/api/echo", get(health::echo))
        .route("/api/traces/{trace_id}", get(tempo::get_trace))
        .route("/api/v2/traces/{trace_id}", get(tempo::get_trace_v2))
        .route("/api/search", get(tempo::search_traces))
        .route("/api/v2/search", get(tempo::search_traces))
        .route("/api/search/tags", get(tempo::search_tags))
        .route("/api/v2/search/tags", get(tempo::search_tags_v2))
        .route("/api/search/tag/{tag}/values", get(tempo::search_tag_values))
        .route(
            "/api/v2/search/tag/{tag}/values",
            get(tempo::search_tag_values_v2),
        )
        // Kept for backwards compatibility with earlier experiments
        .route("/api/services", get(tempo::list_services))
        // Endpoints for the web UI
        .route("/api/traces", get(tempo::list_traces))
        .route("/api/spans", get(tempo::list_spans))
        .route("/api/exceptions", get(tempo::list_exceptions))
        // Graphite-compatible endpoints
        .route(
            "/render",
            get(graphite::render)
                .post(graphite::render)
                .put(graphite::render),
        )
        .route(
            "/metrics/find",
            get(graphite::find).post(graphite::find).put(graphite::find),
        )
        // Status endpoints
        .route("/api/status", get(health::status))
        .route("/ready", get(health::ready))
        .with_state(state)
}

/// Query gateway with the full middleware chain
pub fn query_router(store: Arc<Store>, origins: AllowedOrigins) -> Router {
    query_routes(store)
        .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(axum::middleware::from_fn_with_state(origins, cors))
        .layer(axum::middleware::from_fn(log_requests))
}

/// OTLP/HTTP receiver router
pub fn otlp_router(ingestor: Arc<Ingestor>) -> Router {
    let state = OtlpState { ingestor };

    Router::new()
        .route("/v1/traces", axum::routing::post(export_traces))
        .with_state(state)
        .layer(DefaultBodyLimit::max(OTLP_BODY_LIMIT))
}

/// Bind and serve a router until the shutdown future resolves
pub async fn serve(
    port: u16,
    router: Router,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(port, "Server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::Response;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::core::config::GotelConfig;
    use crate::data::store::test_support::open_temp_store;
    use crate::data::store::MetricRecord;
    use crate::domain::ingest::test_support::{exception_event, make_request, make_span};

    const T: u64 = 1_700_000_000_000_000_000;

    struct TestApp {
        _dir: tempfile::TempDir,
        store: Arc<Store>,
        ingestor: Ingestor,
        router: Router,
    }

    async fn test_app() -> TestApp {
        let (dir, store) = open_temp_store().await;
        let store = Arc::new(store);
        let ingestor = Ingestor::new(store.clone(), &GotelConfig::default());
        let router = query_routes(store.clone());
        TestApp {
            _dir: dir,
            store,
            ingestor,
            router,
        }
    }

    async fn get(router: &Router, uri: &str) -> Response {
        router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn get_json(router: &Router, uri: &str) -> Value {
        let response = get(router, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
        body_json(response).await
    }

    // ========================================================================
    // Health / status
    // ========================================================================

    #[tokio::test]
    async fn test_ready_and_echo() {
        let app = test_app().await;

        let response = get(&app.router, "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ready");

        let response = get(&app.router, "/api/echo").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "echo");
    }

    #[tokio::test]
    async fn test_status_reports_stats() {
        let app = test_app().await;
        let request = make_request(
            "svc",
            vec![make_span([1; 16], [1; 8], "op", T, T + 1_000_000, 0)],
        );
        app.ingestor.push(&request).await.unwrap();

        let stats = get_json(&app.router, "/api/status").await;
        assert_eq!(stats["span_count"], 1);
        assert_eq!(stats["metric_count"], 2);
        assert_eq!(stats["trace_count"], 1);
        assert_eq!(stats["service_count"], 1);
    }

    // ========================================================================
    // Trace endpoints
    // ========================================================================

    #[tokio::test]
    async fn test_get_trace_round_trip() {
        let app = test_app().await;
        let trace_id = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
            0x0f, 0x10,
        ];
        let request = make_request(
            "checkout API/v1",
            vec![make_span(
                trace_id,
                [1, 2, 3, 4, 5, 6, 7, 8],
                "GET /cart/items",
                T,
                T + 100_000_000,
                1,
            )],
        );
        app.ingestor.push(&request).await.unwrap();

        let body = get_json(
            &app.router,
            "/api/traces/0102030405060708090a0b0c0d0e0f10",
        )
        .await;

        let resource_spans = body["resourceSpans"].as_array().unwrap();
        assert_eq!(resource_spans.len(), 1);
        // Back-compat key mirrors the envelope
        assert_eq!(body["batches"], body["resourceSpans"]);
        assert!(body.get("trace").is_none());

        let span = &resource_spans[0]["scopeSpans"][0]["spans"][0];
        assert_eq!(span["name"], "GET /cart/items");
        assert_eq!(span["status"]["code"], "STATUS_CODE_OK");
    }

    #[tokio::test]
    async fn test_get_trace_v2_wraps_under_trace_key() {
        let app = test_app().await;
        let request = make_request(
            "svc",
            vec![make_span([3; 16], [3; 8], "op", T, T + 1_000_000, 0)],
        );
        app.ingestor.push(&request).await.unwrap();

        let trace_id = hex::encode([3u8; 16]);
        let body = get_json(&app.router, &format!("/api/v2/traces/{trace_id}")).await;
        assert!(body["trace"]["resourceSpans"].is_array());
        assert_eq!(body["trace"]["batches"], body["trace"]["resourceSpans"]);
    }

    #[tokio::test]
    async fn test_get_trace_unknown_id_returns_empty_envelope() {
        let app = test_app().await;
        let body = get_json(&app.router, "/api/traces/deadbeef").await;
        assert!(body["resourceSpans"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_wildcard_service_matches_all() {
        let app = test_app().await;
        let request = make_request(
            "search-service",
            vec![
                make_span([1; 16], [1; 8], "search-operation", T, T + 1_000_000, 0),
                make_span([2; 16], [2; 8], "search-operation", T + 10, T + 1_000_000, 0),
                make_span([4; 16], [4; 8], "search-operation", T + 20, T + 1_000_000, 0),
            ],
        );
        app.ingestor.push(&request).await.unwrap();

        for uri in [
            "/api/search?service=*",
            "/api/search?service=.*",
            "/api/search?service=search-service&operation=search-operation",
            "/api/search",
            "/api/v2/search",
        ] {
            let body = get_json(&app.router, uri).await;
            assert_eq!(body["traces"].as_array().unwrap().len(), 3, "{uri}");
        }

        let body = get_json(&app.router, "/api/search?service=other").await;
        assert!(body["traces"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_service_from_tags_and_traceql() {
        let app = test_app().await;
        let request = make_request(
            "tagged",
            vec![make_span([1; 16], [1; 8], "op", T, T + 1_000_000, 0)],
        );
        app.ingestor.push(&request).await.unwrap();

        let body = get_json(&app.router, "/api/search?tags=service.name%3Dtagged").await;
        assert_eq!(body["traces"].as_array().unwrap().len(), 1);

        // TraceQL fragment: {resource.service.name="tagged"}
        let body = get_json(
            &app.router,
            "/api/search?q=%7Bresource.service.name%3D%22tagged%22%7D",
        )
        .await;
        assert_eq!(body["traces"].as_array().unwrap().len(), 1);

        let body = get_json(
            &app.router,
            "/api/search?q=%7Bservice.name%3D%22missing%22%7D",
        )
        .await;
        assert!(body["traces"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_summary_shape() {
        let app = test_app().await;
        let request = make_request(
            "svc",
            vec![make_span([1; 16], [1; 8], "op", T, T + 250_000_000, 0)],
        );
        app.ingestor.push(&request).await.unwrap();

        let body = get_json(&app.router, "/api/search").await;
        let summary = &body["traces"][0];
        assert_eq!(summary["traceID"], hex::encode([1u8; 16]));
        assert_eq!(summary["rootServiceName"], "svc");
        assert_eq!(summary["rootTraceName"], "op");
        // Nanosecond timestamps serialize as decimal strings
        assert_eq!(summary["startTimeUnixNano"], T.to_string());
        assert_eq!(summary["durationMs"], 250);
        assert_eq!(body["metrics"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_search_tags_shapes() {
        let app = test_app().await;

        let body = get_json(&app.router, "/api/search/tags").await;
        assert_eq!(
            body["tagNames"],
            serde_json::json!(["service.name", "span.name", "status"])
        );

        let body = get_json(&app.router, "/api/v2/search/tags").await;
        let scopes = body["scopes"].as_array().unwrap();
        assert_eq!(scopes.len(), 3);
        assert_eq!(scopes[0]["name"], "resource");
    }

    #[tokio::test]
    async fn test_tag_values_only_service_name_supported() {
        let app = test_app().await;
        let request = make_request(
            "svc-a",
            vec![make_span([1; 16], [1; 8], "op", T, T + 1_000_000, 0)],
        );
        app.ingestor.push(&request).await.unwrap();

        let body = get_json(&app.router, "/api/search/tag/service.name/values").await;
        assert_eq!(body["tagValues"], serde_json::json!(["svc-a"]));

        let body = get_json(&app.router, "/api/search/tag/resource.service.name/values").await;
        assert_eq!(body["tagValues"], serde_json::json!(["svc-a"]));

        // v2 wraps each value
        let body = get_json(&app.router, "/api/v2/search/tag/service.name/values").await;
        assert_eq!(
            body["tagValues"],
            serde_json::json!([{"type": "string", "value": "svc-a"}])
        );

        let response = get(&app.router, "/api/search/tag/http.method/values").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "unsupported tag");

        let response = get(&app.router, "/api/v2/search/tag/http.method/values").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_services() {
        let app = test_app().await;
        app.ingestor
            .push(&make_request(
                "svc-b",
                vec![make_span([1; 16], [1; 8], "op", T, T + 1, 0)],
            ))
            .await
            .unwrap();
        app.ingestor
            .push(&make_request(
                "svc-a",
                vec![make_span([2; 16], [2; 8], "op", T, T + 1, 0)],
            ))
            .await
            .unwrap();

        let body = get_json(&app.router, "/api/services").await;
        assert_eq!(body, serde_json::json!(["svc-a", "svc-b"]));
    }

    #[tokio::test]
    async fn test_list_traces_root_and_span_count() {
        let app = test_app().await;

        let mut root = make_span([1; 16], [1; 8], "root-operation", T, T + 400_000_000, 0);
        root.parent_span_id = vec![];
        let mut children = Vec::new();
        for i in 2u8..5 {
            let mut child = make_span(
                [1; 16],
                [i; 8],
                "child-operation",
                T + 50_000_000,
                T + 300_000_000,
                0,
            );
            child.parent_span_id = vec![1; 8];
            children.push(child);
        }
        let mut spans = vec![root];
        spans.extend(children);
        app.ingestor.push(&make_request("svc", spans)).await.unwrap();

        let body = get_json(&app.router, "/api/traces").await;
        let traces = body.as_array().unwrap();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0]["span_count"], 4);
        assert_eq!(traces[0]["span_name"], "root-operation");
        assert!(traces[0]["duration_ms"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_list_spans_filter_and_raw_shape() {
        let app = test_app().await;
        app.ingestor
            .push(&make_request(
                "svc-a",
                vec![make_span([1; 16], [1; 8], "op-a", T, T + 1_000_000, 0)],
            ))
            .await
            .unwrap();
        app.ingestor
            .push(&make_request(
                "svc-b",
                vec![make_span([2; 16], [2; 8], "op-b", T, T + 1_000_000, 0)],
            ))
            .await
            .unwrap();

        let body = get_json(&app.router, "/api/spans").await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let body = get_json(&app.router, "/api/spans?service=svc-a").await;
        let spans = body.as_array().unwrap();
        assert_eq!(spans.len(), 1);
        // Raw blob shape, not the Tempo shape
        assert_eq!(spans[0]["span_name"], "op-a");
        assert_eq!(spans[0]["service_name"], "svc-a");

        let body = get_json(&app.router, "/api/spans?limit=1").await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exceptions_from_exception_event() {
        let app = test_app().await;

        let mut span = make_span([1; 16], [1; 8], "op", T, T + 1_000_000, 2);
        span.events.push(exception_event(T + 500_000));
        app.ingestor
            .push(&make_request("svc", vec![span]))
            .await
            .unwrap();

        let body = get_json(&app.router, "/api/exceptions").await;
        let exceptions = body.as_array().unwrap();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0]["exception_type"], "RuntimeError");
        assert_eq!(exceptions[0]["message"], "x");
        assert_eq!(exceptions[0]["stack_trace"], "stack...");
        assert_eq!(exceptions[0]["severity"], "critical");
        assert_eq!(
            exceptions[0]["timestamp"].as_i64().unwrap(),
            ((T + 500_000) / 1_000_000) as i64
        );
    }

    #[tokio::test]
    async fn test_exceptions_fallback_without_event() {
        let app = test_app().await;

        let mut span = make_span([1; 16], [1; 8], "op", T, T + 1_000_000, 2);
        if let Some(status) = span.status.as_mut() {
            status.message = "request failed".to_string();
        }
        app.ingestor
            .push(&make_request("svc", vec![span]))
            .await
            .unwrap();

        let body = get_json(&app.router, "/api/exceptions").await;
        let exceptions = body.as_array().unwrap();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0]["message"], "request failed");
        assert_eq!(exceptions[0]["severity"], "critical");
        assert!(exceptions[0].get("exception_type").is_none());
    }

    #[tokio::test]
    async fn test_exceptions_ok_spans_excluded() {
        let app = test_app().await;
        app.ingestor
            .push(&make_request(
                "svc",
                vec![make_span([1; 16], [1; 8], "op", T, T + 1_000_000, 1)],
            ))
            .await
            .unwrap();

        let body = get_json(&app.router, "/api/exceptions").await;
        assert!(body.as_array().unwrap().is_empty());
    }

    // ========================================================================
    // Graphite endpoints
    // ========================================================================

    async fn seed_metrics(store: &Store, names: &[(&str, f64, i64)]) {
        let metrics: Vec<MetricRecord> = names
            .iter()
            .map(|(n, v, ts)| MetricRecord::new(*n, *v, *ts, "{}"))
            .collect();
        store.insert_batch(&[], &metrics).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_empty_query_returns_empty_list() {
        let app = test_app().await;
        let body = get_json(&app.router, "/metrics/find").await;
        assert_eq!(body, serde_json::json!([]));

        let body = get_json(&app.router, "/metrics/find?query=").await;
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_find_nodes_at_query_depth() {
        let app = test_app().await;
        seed_metrics(
            &app.store,
            &[
                ("otel.svc-a.op.span_count", 1.0, 100),
                ("otel.svc-b.op.span_count", 1.0, 100),
            ],
        )
        .await;

        // Depth-2 query returns unique 2-segment nodes
        let body = get_json(&app.router, "/metrics/find?query=otel.*").await;
        let nodes = body.as_array().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["text"], "otel.svc-a");
        assert_eq!(nodes[0]["id"], "otel.svc-a");
        assert_eq!(nodes[0]["expandable"], false);
        assert_eq!(nodes[0]["allowChildren"], false);
        assert_eq!(nodes[1]["text"], "otel.svc-b");
    }

    #[tokio::test]
    async fn test_find_escaping() {
        let app = test_app().await;
        seed_metrics(
            &app.store,
            &[
                ("otel.foo_bar.metric", 1.0, 100),
                ("otel.foXbar.metric", 1.0, 100),
            ],
        )
        .await;

        let body = get_json(&app.router, "/metrics/find?query=otel.foo_bar.*").await;
        let nodes = body.as_array().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0]["text"], "otel.foo_bar.metric");
    }

    #[tokio::test]
    async fn test_find_accepts_q_parameter_and_alias() {
        let app = test_app().await;
        seed_metrics(&app.store, &[("otel.svc.op.span_count", 1.0, 100)]).await;

        let body = get_json(&app.router, "/metrics/find?q=otel.*.*.span_count").await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let body = get_json(
            &app.router,
            "/metrics/find?query=aliasByNode(otel.*.*.span_count,1)",
        )
        .await;
        let nodes = body.as_array().unwrap();
        assert_eq!(nodes[0]["text"], "svc");
    }

    #[tokio::test]
    async fn test_render_series_with_datapoints() {
        let app = test_app().await;
        seed_metrics(
            &app.store,
            &[
                ("otel.svc.op.duration_ms", 12.5, 100),
                ("otel.svc.op.duration_ms", 17.5, 200),
            ],
        )
        .await;

        let body = get_json(&app.router, "/render?target=otel.svc.op.duration_ms").await;
        let series = body.as_array().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0]["target"], "otel.svc.op.duration_ms");
        assert_eq!(
            series[0]["datapoints"],
            serde_json::json!([[12.5, 100], [17.5, 200]])
        );
    }

    #[tokio::test]
    async fn test_render_multiple_targets() {
        let app = test_app().await;
        seed_metrics(
            &app.store,
            &[("a.one.x", 1.0, 100), ("b.two.y", 2.0, 100)],
        )
        .await;

        let body = get_json(&app.router, "/render?target=a.one.x&target=b.two.y").await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_render_wildcard_segment_tolerance() {
        let app = test_app().await;
        // Operation name itself contains a dot (extra segment)
        seed_metrics(
            &app.store,
            &[
                ("otel.svc.op.sub.span_count", 1.0, 100),
                ("otel.svc.op.span_count", 1.0, 100),
                ("otel.x", 1.0, 100),
            ],
        )
        .await;

        let body = get_json(&app.router, "/render?target=otel.*.*.span_count").await;
        let targets: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["target"].as_str().unwrap())
            .collect();
        assert!(targets.contains(&"otel.svc.op.span_count"));
        assert!(targets.contains(&"otel.svc.op.sub.span_count"));
        assert!(!targets.contains(&"otel.x"));
    }

    #[tokio::test]
    async fn test_render_alias_by_node() {
        let app = test_app().await;
        seed_metrics(&app.store, &[("otel.svc.op.span_count", 1.0, 100)]).await;

        let body = get_json(
            &app.router,
            "/render?target=aliasByNode(otel.*.*.span_count,1,2)",
        )
        .await;
        assert_eq!(body[0]["target"], "svc.op");
    }

    #[tokio::test]
    async fn test_render_nested_alias_composition() {
        let app = test_app().await;
        seed_metrics(&app.store, &[("otel.svc.op.span_count", 2.0, 100)]).await;

        // aliasSub(aliasByNode(X,1), "svc", "service") composes both
        let body = get_json(
            &app.router,
            "/render?target=aliasSub(aliasByNode(otel.*.*.span_count,1),%22svc%22,%22service%22)",
        )
        .await;
        assert_eq!(body[0]["target"], "service");
        assert_eq!(body[0]["datapoints"], serde_json::json!([[2.0, 100]]));

        // Equivalent to applying aliasByNode then aliasSub on the plain render
        let plain = get_json(&app.router, "/render?target=otel.*.*.span_count").await;
        let name = plain[0]["target"].as_str().unwrap();
        let composed = crate::domain::graphite::alias_sub(
            &crate::domain::graphite::alias_by_node(name, &[1]),
            "svc",
            "service",
        );
        assert_eq!(body[0]["target"].as_str().unwrap(), composed);
    }

    #[tokio::test]
    async fn test_render_form_encoded_post() {
        let app = test_app().await;
        seed_metrics(&app.store, &[("otel.svc.op.span_count", 1.0, 100)]).await;

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/render")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("target=otel.svc.op.span_count"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_render_malformed_function_falls_back_to_pattern() {
        let app = test_app().await;
        seed_metrics(&app.store, &[("aliasByNode", 1.0, 100)]).await;

        // Not a parsable function call: treated as a literal name
        let body = get_json(&app.router, "/render?target=aliasByNode").await;
        assert_eq!(body[0]["target"], "aliasByNode");
    }

    #[tokio::test]
    async fn test_render_no_targets_returns_empty() {
        let app = test_app().await;
        let body = get_json(&app.router, "/render").await;
        assert_eq!(body, serde_json::json!([]));
    }

    // ========================================================================
    // Middleware
    // ========================================================================

    #[tokio::test]
    async fn test_cors_preflight_returns_204() {
        let app = test_app().await;
        let router = app
            .router
            .clone()
            .layer(axum::middleware::from_fn_with_state(
                AllowedOrigins::new(&[]),
                crate::api::middleware::cors,
            ));

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/search")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }

    #[tokio::test]
    async fn test_cors_headers_on_normal_response() {
        let app = test_app().await;
        let router = app
            .router
            .clone()
            .layer(axum::middleware::from_fn_with_state(
                AllowedOrigins::new(&[]),
                crate::api::middleware::cors,
            ));

        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }

    // ========================================================================
    // Limit clamping
    // ========================================================================

    #[tokio::test]
    async fn test_search_limit_clamped() {
        let app = test_app().await;
        for i in 0..5u8 {
            app.ingestor
                .push(&make_request(
                    "svc",
                    vec![make_span(
                        [i + 1; 16],
                        [i + 1; 8],
                        "op",
                        T + i as u64,
                        T + 1_000_000,
                        0,
                    )],
                ))
                .await
                .unwrap();
        }

        let body = get_json(&app.router, "/api/search?limit=2").await;
        assert_eq!(body["traces"].as_array().unwrap().len(), 2);

        // A ridiculous limit is clamped rather than rejected
        let body = get_json(&app.router, "/api/search?limit=99999999").await;
        assert_eq!(body["traces"].as_array().unwrap().len(), 5);

        // Malformed limit falls back to the default
        let body = get_json(&app.router, "/api/search?limit=abc").await;
        assert_eq!(body["traces"].as_array().unwrap().len(), 5);
    }

    // ========================================================================
    // OTLP receiver
    // ========================================================================

    #[tokio::test]
    async fn test_otlp_receiver_protobuf_round_trip() {
        let app = test_app().await;
        let ingestor = Arc::new(Ingestor::new(
            app.store.clone(),
            &GotelConfig::default(),
        ));
        let otlp = otlp_router(ingestor);

        let request = make_request(
            "svc",
            vec![make_span([1; 16], [1; 8], "op", T, T + 1_000_000, 0)],
        );
        let body = prost::Message::encode_to_vec(&request);

        let response = otlp
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/traces")
                    .header(header::CONTENT_TYPE, "application/x-protobuf")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/x-protobuf"
        );

        let stats = app.store.stats().await.unwrap();
        assert_eq!(stats.span_count, 1);
    }

    #[tokio::test]
    async fn test_otlp_receiver_rejects_bad_payload() {
        let app = test_app().await;
        let ingestor = Arc::new(Ingestor::new(
            app.store.clone(),
            &GotelConfig::default(),
        ));
        let otlp = otlp_router(ingestor);

        let response = otlp
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/traces")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
