//! Prometheus metrics for Polystore.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants for the HTTP surface and the cluster layer,
//! provides the HTTP RED middleware, and serves `/metrics`.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "polystore_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "polystore_http_request_duration_seconds";

/// Heartbeat probes sent (counter). Labels: result (ok, error).
pub const CLUSTER_PROBE_TOTAL: &str = "polystore_cluster_probe_total";

/// Completed gossip rounds (counter).
pub const CLUSTER_GOSSIP_ROUNDS_TOTAL: &str = "polystore_cluster_gossip_rounds_total";

/// Registry records changed by gossip merges (counter).
pub const CLUSTER_GOSSIP_MERGED_TOTAL: &str = "polystore_cluster_gossip_merged_total";

/// Replica pushes (counter). Labels: result (ok, error).
pub const CLUSTER_REPLICATION_PUSH_TOTAL: &str = "polystore_cluster_replication_push_total";

/// Active cluster members, self included (gauge).
pub const CLUSTER_ACTIVE_NODES: &str = "polystore_cluster_active_nodes";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(CLUSTER_PROBE_TOTAL, "Heartbeat probes by result");
    describe_counter!(CLUSTER_GOSSIP_ROUNDS_TOTAL, "Gossip rounds completed");
    describe_counter!(
        CLUSTER_GOSSIP_MERGED_TOTAL,
        "Membership records changed by gossip"
    );
    describe_counter!(
        CLUSTER_REPLICATION_PUSH_TOTAL,
        "Replica pushes by result"
    );
    describe_gauge!(CLUSTER_ACTIVE_NODES, "Active cluster members");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Map a request path to its route template so user-chosen keys and ids
/// do not become label values.
///
/// Examples:
/// - `/kv/user:42` -> `/kv/{key}`
/// - `/docs/users/u1` -> `/docs/{collection}/{id}`
/// - `/cluster/nodes/node-1` -> `/cluster/nodes/{id}`
/// - anything unrouted -> `other`
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let template = match segments.as_slice() {
        [] => "/",
        ["health"] => "/health",
        ["metrics"] => "/metrics",
        ["openapi.json"] => "/openapi.json",
        ["docs", _] => "/docs/{collection}",
        ["docs", _, _] => "/docs/{collection}/{id}",
        ["kv", _] => "/kv/{key}",
        ["columns", _, _, _] => "/columns/{family}/{row}/{column}",
        ["graph", "nodes"] => "/graph/nodes",
        ["graph", "nodes", _] => "/graph/nodes/{id}",
        ["graph", "edges"] => "/graph/edges",
        ["graph", "edges", _] => "/graph/edges/{id}",
        ["cluster", "status"] => "/cluster/status",
        ["cluster", "nodes"] => "/cluster/nodes",
        ["cluster", "nodes", _] => "/cluster/nodes/{id}",
        ["cluster", "join"] => "/cluster/join",
        ["cluster", "gossip"] => "/cluster/gossip",
        ["data", "replicate"] => "/data/replicate",
        _ => "other",
    };
    template.to_string()
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics are disabled").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_fixed_routes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/openapi.json"), "/openapi.json");
        assert_eq!(normalize_path("/cluster/status"), "/cluster/status");
        assert_eq!(normalize_path("/graph/nodes"), "/graph/nodes");
    }

    #[test]
    fn test_normalize_path_parameterised() {
        assert_eq!(normalize_path("/kv/user:42"), "/kv/{key}");
        assert_eq!(normalize_path("/docs/users"), "/docs/{collection}");
        assert_eq!(normalize_path("/docs/users/u1"), "/docs/{collection}/{id}");
        assert_eq!(
            normalize_path("/columns/cf/row-1/email"),
            "/columns/{family}/{row}/{column}"
        );
        assert_eq!(normalize_path("/graph/edges/e9"), "/graph/edges/{id}");
        assert_eq!(normalize_path("/cluster/nodes/node-1"), "/cluster/nodes/{id}");
    }

    #[test]
    fn test_normalize_path_unknown_collapses() {
        assert_eq!(normalize_path("/nope/a/b/c/d"), "other");
        assert_eq!(normalize_path("/random-probe"), "other");
    }
}
