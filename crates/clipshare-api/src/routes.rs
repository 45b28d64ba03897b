//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::error::redact_internal_errors;
use crate::handlers::{
    download_clip, export_bookmark, get_job, health, list_shot_cuts, list_workspace_jobs, ready,
    start_shot_cut_detection,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs/:job_id", get(get_job))
        .route("/workspaces/:workspace_id/jobs", get(list_workspace_jobs));

    let shot_cut_routes = Router::new()
        .route(
            "/workspaces/:workspace_id/shot-cuts/detect",
            post(start_shot_cut_detection),
        )
        .route("/workspaces/:workspace_id/shot-cuts", get(list_shot_cuts));

    let export_routes = Router::new()
        .route(
            "/workspaces/:workspace_id/bookmarks/:bookmark_id/export",
            post(export_bookmark),
        )
        .route(
            "/workspaces/:workspace_id/clips/:bookmark_id",
            get(download_clip),
        );

    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    let api_routes = Router::new()
        .merge(job_routes)
        .merge(shot_cut_routes)
        .merge(export_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn_with_state(
            state.config.is_production(),
            redact_internal_errors,
        ))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
