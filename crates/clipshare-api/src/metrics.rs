//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "clipshare_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "clipshare_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "clipshare_http_requests_in_flight";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "clipshare_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

static ID_SEGMENTS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"/workspaces/[^/]+", "/workspaces/:workspace_id"),
        (r"/jobs/[^/]+", "/jobs/:job_id"),
        (r"/bookmarks/[^/]+", "/bookmarks/:bookmark_id"),
        (r"/clips/[^/]+", "/clips/:bookmark_id"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (Regex::new(pattern).expect("valid metrics path pattern"), replacement)
    })
    .collect()
});

/// Replace id segments so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    ID_SEGMENTS
        .iter()
        .fold(path.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/workspaces/ws-1/bookmarks/bm_9/export"),
            "/api/workspaces/:workspace_id/bookmarks/:bookmark_id/export"
        );
        assert_eq!(
            sanitize_path("/api/jobs/0b8f6a3e-4c1d-4b7a-9f0e-123456789abc"),
            "/api/jobs/:job_id"
        );
        assert_eq!(
            sanitize_path("/api/workspaces/abc/clips/bm1"),
            "/api/workspaces/:workspace_id/clips/:bookmark_id"
        );
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
