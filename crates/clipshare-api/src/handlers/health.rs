//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::error;

use clipshare_media::{check_ffmpeg, check_ffprobe};
use clipshare_models::RecoveryReport;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    /// Report of the once-per-process recovery sweep
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryReport>,
}

/// Liveness probe. The first hit runs the recovery sweep if startup has not.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let recovery = match state.recovery.ensure_ran().await {
        Ok(report) => Some(report),
        Err(e) => {
            error!("Recovery sweep failed: {}", e);
            None
        }
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        recovery,
    })
}

/// Readiness check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
    pub pending_exports: usize,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub database: CheckStatus,
    pub ffmpeg: CheckStatus,
    pub ffprobe: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn from_result<T, E: std::fmt::Display>(result: Result<T, E>, start: Instant) -> Self {
        match result {
            Ok(_) => Self::ok(start.elapsed().as_millis() as u64),
            Err(e) => Self::error(e.to_string()),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Readiness probe: database round-trip plus ffmpeg and ffprobe on PATH.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let start = Instant::now();
    let database = CheckStatus::from_result(state.db.ping(), start);

    let start = Instant::now();
    let ffmpeg = CheckStatus::from_result(check_ffmpeg(&state.toolchain.ffmpeg), start);

    let start = Instant::now();
    let ffprobe = CheckStatus::from_result(check_ffprobe(&state.toolchain.ffprobe), start);

    let all_ok = database.is_ok() && ffmpeg.is_ok() && ffprobe.is_ok();

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            database,
            ffmpeg,
            ffprobe,
        },
        pending_exports: state.exports.pending_exports(),
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
