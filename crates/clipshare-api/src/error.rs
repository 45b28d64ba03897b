//! API error types.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use clipshare_store::StoreError;
use clipshare_worker::WorkerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::WorkspaceNotFound(_) => ApiError::not_found(err.to_string()),
            WorkerError::WorkspaceNotReady { .. } | WorkerError::DetectionInProgress(_) => {
                ApiError::conflict(err.to_string())
            }
            WorkerError::InvalidId(_) => ApiError::bad_request(err.to_string()),
            WorkerError::Store(e) => ApiError::Store(e),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

const INTERNAL_DETAIL: &str = "An internal error occurred";

/// Marks a response built from an internal error.
#[derive(Debug, Clone, Copy)]
struct InternalErrorMarker;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let internal = matches!(self, ApiError::Internal(_) | ApiError::Store(_));
        if internal {
            tracing::error!("Request failed: {}", self);
        }

        let mut response = (status, Json(ErrorResponse { detail: self.to_string() })).into_response();
        if internal {
            response.extensions_mut().insert(InternalErrorMarker);
        }
        response
    }
}

/// Replace internal error details with a generic message when `hide` is set
/// (production).
pub async fn redact_internal_errors(
    State(hide): State<bool>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !hide || response.extensions().get::<InternalErrorMarker>().is_none() {
        return response;
    }

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let body = Json(ErrorResponse {
        detail: INTERNAL_DETAIL.to_string(),
    })
    .into_response()
    .into_body();
    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::middleware;
    use axum::routing::get;
    use axum::Router;
    use clipshare_models::{ProcessingStatus, WorkspaceId};
    use tower::ServiceExt;

    async fn failing() -> ApiResult<()> {
        Err(ApiError::internal("disk /srv/data is full"))
    }

    async fn missing() -> ApiResult<()> {
        Err(ApiError::not_found("Job j-1 not found"))
    }

    async fn detail_of(hide: bool, uri: &str) -> (StatusCode, String) {
        let router = Router::new()
            .route("/fail", get(failing))
            .route("/missing", get(missing))
            .layer(middleware::from_fn_with_state(hide, redact_internal_errors));
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        (status, body["detail"].as_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_internal_detail_hidden_only_when_requested() {
        let (status, detail) = detail_of(true, "/fail").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(detail, INTERNAL_DETAIL);

        let (_, detail) = detail_of(false, "/fail").await;
        assert!(detail.contains("/srv/data"));

        let (status, detail) = detail_of(true, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(detail.contains("j-1"));
    }

    #[test]
    fn test_worker_errors_map_to_status() {
        let ws = WorkspaceId::from("ws");
        assert_eq!(
            ApiError::from(WorkerError::WorkspaceNotFound(ws.clone())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(WorkerError::DetectionInProgress(ws.clone())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(WorkerError::WorkspaceNotReady {
                id: ws,
                status: ProcessingStatus::Processing,
            })
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(WorkerError::InvalidId("a/b".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(WorkerError::job_failed("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
