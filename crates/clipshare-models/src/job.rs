//! Processing job records.
//!
//! Every background subsystem (shot-cut detection, clip export, workspace
//! processing) reports through a `ProcessingJob` row. Rows are append-only
//! history per workspace: they are created by a handler or service, mutated only
//! by the owning service and never deleted.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseEnumError;
use crate::ids::{BookmarkId, JobId, WorkspaceId};
use crate::shot_cut::DetectionMethod;

/// Error text recorded on an export job replaced by a later bookmark edit.
pub const SUPERSEDED_REASON: &str = "Superseded by newer edit";

/// Type of job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Download and normalise the workspace's Plex content
    WorkspaceProcessing,
    /// Scene-change detection over the processed video
    ShotCutDetection,
    /// Cut a bookmark's range into a clip file
    ExportClip,
    /// Package clips for OBS
    ObsExport,
    /// Prepare a clip for download
    DownloadClip,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::WorkspaceProcessing => "workspace_processing",
            JobType::ShotCutDetection => "shot_cut_detection",
            JobType::ExportClip => "export_clip",
            JobType::ObsExport => "obs_export",
            JobType::DownloadClip => "download_clip",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "workspace_processing" => Ok(JobType::WorkspaceProcessing),
            "shot_cut_detection" => Ok(JobType::ShotCutDetection),
            "export_clip" => Ok(JobType::ExportClip),
            "obs_export" => Ok(JobType::ObsExport),
            "download_clip" => Ok(JobType::DownloadClip),
            other => Err(ParseEnumError::new("job type", other)),
        }
    }
}

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not started yet (may be waiting on a debounce timer)
    #[default]
    Pending,
    /// Owned by a running service
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with an error, never retried automatically
    Failed,
    /// Superseded or abandoned
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Statuses that still count towards "one active job" invariants.
    pub fn active() -> [JobStatus; 2] {
        [JobStatus::Pending, JobStatus::Processing]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(ParseEnumError::new("job status", other)),
        }
    }
}

/// A processing job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    /// Unique job ID
    pub id: JobId,

    /// Owning workspace
    pub workspace_id: WorkspaceId,

    /// Job type
    #[serde(rename = "type")]
    pub job_type: JobType,

    /// Current status
    pub status: JobStatus,

    /// Progress (0-100)
    pub progress_percent: u8,

    /// Bookmark this job exports (export jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark_id: Option<BookmarkId>,

    /// Opaque per-type payload
    pub payload: serde_json::Value,

    /// Error message (failed or cancelled jobs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    /// Create a new pending job.
    pub fn new(workspace_id: WorkspaceId, job_type: JobType, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            workspace_id,
            job_type,
            status: JobStatus::Pending,
            progress_percent: 0,
            bookmark_id: None,
            payload,
            error_text: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a pending shot-cut detection job.
    pub fn new_shot_cut_detection(workspace_id: WorkspaceId) -> Self {
        Self::new(
            workspace_id,
            JobType::ShotCutDetection,
            serde_json::json!({}),
        )
    }

    /// Create a pending clip export job for a bookmark edit.
    pub fn new_export_clip(workspace_id: WorkspaceId, payload: &ExportClipPayload) -> Self {
        let mut job = Self::new(
            workspace_id,
            JobType::ExportClip,
            serde_json::to_value(payload).unwrap_or_default(),
        );
        job.bookmark_id = Some(payload.bookmark_id.clone());
        job
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Decode the payload of an export job.
    pub fn export_payload(&self) -> Option<ExportClipPayload> {
        if self.job_type != JobType::ExportClip {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Payload of an `export_clip` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportClipPayload {
    pub bookmark_id: BookmarkId,
    pub start_ms: i64,
    pub end_ms: i64,
    /// Set once the clip file has been written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

/// Result payload of a completed `shot_cut_detection` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShotCutDetectionResult {
    pub cuts_detected: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_method: Option<DetectionMethod>,
}
