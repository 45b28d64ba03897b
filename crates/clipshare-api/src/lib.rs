//! Axum HTTP API for the Clipshare job subsystem.
//!
//! This crate provides:
//! - Job polling, shot-cut detection and clip export endpoints
//! - Health and readiness probes (health also triggers startup recovery)
//! - Per-IP rate limiting and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
