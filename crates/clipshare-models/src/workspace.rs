//! Workspace and video processing state.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseEnumError;
use crate::ids::{VideoId, WorkspaceId};

/// Processing state shared by workspaces and videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(ParseEnumError::new("processing status", other)),
        }
    }
}

/// A shared workspace built around one piece of Plex content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub processing_status: ProcessingStatus,
    pub processing_progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkspaceId::new(),
            name: name.into(),
            processing_status: ProcessingStatus::Pending,
            processing_progress: 0,
            processing_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the processing status.
    pub fn with_status(mut self, status: ProcessingStatus) -> Self {
        self.processing_status = status;
        if status == ProcessingStatus::Completed {
            self.processing_progress = 100;
        }
        self
    }

    /// Shot-cut detection needs the processed file to exist.
    pub fn is_ready_for_detection(&self) -> bool {
        self.processing_status == ProcessingStatus::Completed
    }
}

/// A video file attached to a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: VideoId,
    pub workspace_id: WorkspaceId,
    pub status: ProcessingStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    pub fn new(workspace_id: WorkspaceId) -> Self {
        let now = Utc::now();
        Self {
            id: VideoId::new(),
            workspace_id,
            status: ProcessingStatus::Pending,
            progress: 0,
            error_text: None,
            file_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ProcessingStatus) -> Self {
        self.status = status;
        self
    }
}
