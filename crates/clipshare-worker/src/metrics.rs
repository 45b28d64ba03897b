//! Job metrics.

use metrics::{counter, gauge, histogram};

use clipshare_models::JobType;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_CREATED_TOTAL: &str = "clipshare_jobs_created_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "clipshare_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "clipshare_jobs_failed_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "clipshare_jobs_cancelled_total";
    pub const JOB_DURATION_SECONDS: &str = "clipshare_job_duration_seconds";

    pub const DETECTION_STRATEGY_TOTAL: &str = "clipshare_detection_strategy_total";
    pub const SHOT_CUTS_DETECTED: &str = "clipshare_shot_cuts_detected";

    pub const EXPORTS_PENDING: &str = "clipshare_exports_pending";
    pub const EXPORT_ENCODING_TOTAL: &str = "clipshare_export_encoding_total";

    pub const RECOVERY_ROWS_TOTAL: &str = "clipshare_recovery_rows_total";
}

pub fn record_job_created(job_type: JobType) {
    counter!(names::JOBS_CREATED_TOTAL, "type" => job_type.as_str()).increment(1);
}

pub fn record_job_completed(job_type: JobType, duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL, "type" => job_type.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "type" => job_type.as_str()).record(duration_secs);
}

pub fn record_job_failed(job_type: JobType) {
    counter!(names::JOBS_FAILED_TOTAL, "type" => job_type.as_str()).increment(1);
}

pub fn record_jobs_cancelled(job_type: JobType, count: usize) {
    if count > 0 {
        counter!(names::JOBS_CANCELLED_TOTAL, "type" => job_type.as_str()).increment(count as u64);
    }
}

/// Outcome of one strategy attempt: `cuts`, `empty` or `error`.
pub fn record_strategy_outcome(strategy: &'static str, outcome: &'static str) {
    counter!(names::DETECTION_STRATEGY_TOTAL, "strategy" => strategy, "outcome" => outcome)
        .increment(1);
}

pub fn record_shot_cuts(count: usize) {
    histogram!(names::SHOT_CUTS_DETECTED).record(count as f64);
}

pub fn set_exports_pending(count: usize) {
    gauge!(names::EXPORTS_PENDING).set(count as f64);
}

pub fn record_export_encoding(encoding: &'static str) {
    counter!(names::EXPORT_ENCODING_TOTAL, "encoding" => encoding).increment(1);
}

pub fn record_recovered(entity: &'static str, count: usize) {
    if count > 0 {
        counter!(names::RECOVERY_ROWS_TOTAL, "entity" => entity).increment(count as u64);
    }
}
