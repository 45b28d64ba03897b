//! Job polling handlers.
//!
//! Clients poll these every couple of seconds while a detection or export
//! is running.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use clipshare_models::{JobId, JobStatus, JobType, ProcessingJob, WorkspaceId};
use clipshare_store::{job_repo, workspace_repo, JobFilter};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Query parameters for the workspace job list.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

impl JobListQuery {
    fn to_filter(&self) -> ApiResult<JobFilter> {
        let job_type = self
            .job_type
            .as_deref()
            .map(str::parse::<JobType>)
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let status = self
            .status
            .as_deref()
            .map(str::parse::<JobStatus>)
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        Ok(JobFilter {
            job_type,
            status,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<ProcessingJob>,
}

/// `GET /api/jobs/:job_id`
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ProcessingJob>> {
    let job_id = JobId::from_string(job_id);
    job_repo::find_by_id(&state.db, &job_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Job {} not found", job_id)))
}

/// `GET /api/workspaces/:workspace_id/jobs`
pub async fn list_workspace_jobs(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
    Query(query): Query<JobListQuery>,
) -> ApiResult<Json<JobListResponse>> {
    let workspace_id = WorkspaceId::from_string(workspace_id);
    let filter = query.to_filter()?;

    if workspace_repo::find_by_id(&state.db, &workspace_id)?.is_none() {
        return Err(ApiError::not_found(format!(
            "Workspace {} not found",
            workspace_id
        )));
    }

    let jobs = job_repo::list_for_workspace(&state.db, &workspace_id, &filter)?;
    Ok(Json(JobListResponse { jobs }))
}
