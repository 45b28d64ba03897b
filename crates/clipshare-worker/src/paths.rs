//! On-disk layout of processed files.
//!
//! ```text
//! <data-dir>/processed-files/<workspace>/processed.mp4
//! <data-dir>/processed-files/<workspace>/clips/<bookmark>.mp4
//! ```

use std::path::PathBuf;

use clipshare_models::{is_safe_path_segment, BookmarkId, JobId, WorkspaceId};

use crate::error::{WorkerError, WorkerResult};

const PROCESSED_DIR: &str = "processed-files";
const PROCESSED_FILE: &str = "processed.mp4";
const CLIPS_DIR: &str = "clips";

#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

fn segment(id: &str) -> WorkerResult<&str> {
    if is_safe_path_segment(id) {
        Ok(id)
    } else {
        Err(WorkerError::InvalidId(id.to_string()))
    }
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn workspace_dir(&self, workspace_id: &WorkspaceId) -> WorkerResult<PathBuf> {
        Ok(self
            .root
            .join(PROCESSED_DIR)
            .join(segment(workspace_id.as_str())?))
    }

    pub fn processed_video(&self, workspace_id: &WorkspaceId) -> WorkerResult<PathBuf> {
        Ok(self.workspace_dir(workspace_id)?.join(PROCESSED_FILE))
    }

    pub fn clips_dir(&self, workspace_id: &WorkspaceId) -> WorkerResult<PathBuf> {
        Ok(self.workspace_dir(workspace_id)?.join(CLIPS_DIR))
    }

    pub fn clip_path(
        &self,
        workspace_id: &WorkspaceId,
        bookmark_id: &BookmarkId,
    ) -> WorkerResult<PathBuf> {
        Ok(self
            .clips_dir(workspace_id)?
            .join(format!("{}.mp4", segment(bookmark_id.as_str())?)))
    }

    /// Scratch output for one export job, renamed over `clip_path` on success.
    pub fn partial_clip_path(
        &self,
        workspace_id: &WorkspaceId,
        bookmark_id: &BookmarkId,
        job_id: &JobId,
    ) -> WorkerResult<PathBuf> {
        Ok(self.clips_dir(workspace_id)?.join(format!(
            ".{}.{}.part.mp4",
            segment(bookmark_id.as_str())?,
            segment(job_id.as_str())?
        )))
    }
}
