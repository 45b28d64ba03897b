//! Structured job logging.
//!
//! Every background job logs through a `JobLogger` so start, progress,
//! warning, error and completion lines carry the same fields.

use tracing::{error, info, warn, Span};

use clipshare_models::{JobId, JobType, WorkspaceId};

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    workspace_id: String,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, workspace_id: &WorkspaceId, job_type: JobType) -> Self {
        Self {
            job_id: job_id.to_string(),
            workspace_id: workspace_id.to_string(),
            operation: job_type.as_str(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            workspace_id = %self.workspace_id,
            operation = self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            workspace_id = %self.workspace_id,
            operation = self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            workspace_id = %self.workspace_id,
            operation = self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            workspace_id = %self.workspace_id,
            operation = self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            workspace_id = %self.workspace_id,
            operation = self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Span carrying the job fields, for instrumenting the whole run.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            workspace_id = %self.workspace_id,
            operation = self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_fields() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, &WorkspaceId::from("ws"), JobType::ExportClip);

        assert_eq!(logger.job_id(), job_id.as_str());
        assert_eq!(logger.operation(), "export_clip");
    }
}
