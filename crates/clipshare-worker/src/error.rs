//! Worker error types.

use std::path::PathBuf;
use thiserror::Error;

use clipshare_models::{ProcessingStatus, WorkspaceId};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(WorkspaceId),

    #[error("Workspace {id} is not ready (processing status: {status})")]
    WorkspaceNotReady {
        id: WorkspaceId,
        status: ProcessingStatus,
    },

    #[error("Shot-cut detection already running for workspace {0}")]
    DetectionInProgress(WorkspaceId),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Processed video not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Shot-cut detection failed: {0}")]
    DetectionFailed(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Media error: {0}")]
    Media(#[from] clipshare_media::MediaError),

    #[error("Store error: {0}")]
    Store(#[from] clipshare_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn detection_failed(msg: impl Into<String>) -> Self {
        Self::DetectionFailed(msg.into())
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Precondition failures are reported before any job row exists.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            WorkerError::WorkspaceNotFound(_)
                | WorkerError::WorkspaceNotReady { .. }
                | WorkerError::DetectionInProgress(_)
                | WorkerError::InvalidId(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Media(e) if e.is_cancelled())
    }
}
