//! Clip export and download handlers.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use validator::Validate;

use clipshare_models::{BookmarkEdit, BookmarkId, BookmarkRange, ProcessingJob, WorkspaceId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /api/workspaces/:workspace_id/bookmarks/:bookmark_id/export`
///
/// Called on every bookmark edit. Returns the new pending job; earlier
/// pending exports of the same bookmark are cancelled.
pub async fn export_bookmark(
    State(state): State<AppState>,
    Path((workspace_id, bookmark_id)): Path<(String, String)>,
    Json(range): Json<BookmarkRange>,
) -> ApiResult<(StatusCode, Json<ProcessingJob>)> {
    range.validate()?;

    let edit = BookmarkEdit::new(
        WorkspaceId::from_string(workspace_id),
        BookmarkId::from_string(bookmark_id),
        range,
    );
    let job = state.exports.request_export(edit)?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// `GET /api/workspaces/:workspace_id/clips/:bookmark_id`
pub async fn download_clip(
    State(state): State<AppState>,
    Path((workspace_id, bookmark_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let workspace_id = WorkspaceId::from_string(workspace_id);
    let bookmark_id = BookmarkId::from_string(bookmark_id);
    let path = state.exports.clip_path(&workspace_id, &bookmark_id)?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!(
                "Clip for bookmark {} has not been exported",
                bookmark_id
            )));
        }
        Err(e) => return Err(ApiError::internal(format!("Failed to read clip: {}", e))),
    };

    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.mp4\"", bookmark_id),
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}
