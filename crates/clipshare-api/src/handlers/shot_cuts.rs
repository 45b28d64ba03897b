//! Shot-cut detection handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

use clipshare_models::{ProcessingJob, ShotCut, WorkspaceId};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotCutListResponse {
    pub workspace_id: WorkspaceId,
    pub count: usize,
    pub shot_cuts: Vec<ShotCut>,
}

/// `POST /api/workspaces/:workspace_id/shot-cuts/detect`
pub async fn start_shot_cut_detection(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
) -> ApiResult<(StatusCode, Json<ProcessingJob>)> {
    let workspace_id = WorkspaceId::from_string(workspace_id);
    let job = state.shot_cuts.start_detection(&workspace_id)?;

    info!(job_id = %job.id, workspace_id = %workspace_id, "Shot-cut detection requested");
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// `GET /api/workspaces/:workspace_id/shot-cuts`
pub async fn list_shot_cuts(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
) -> ApiResult<Json<ShotCutListResponse>> {
    let workspace_id = WorkspaceId::from_string(workspace_id);
    let shot_cuts = state.shot_cuts.list_shot_cuts(&workspace_id)?;

    Ok(Json(ShotCutListResponse {
        workspace_id,
        count: shot_cuts.len(),
        shot_cuts,
    }))
}
