//! Processing job repository.
//!
//! Terminal transitions are compare-and-swap: they only apply while the row is
//! still `pending` or `processing`, and report whether they did. A job that was
//! cancelled by a newer edit therefore cannot be completed by a late result.

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};

use clipshare_models::{
    BookmarkId, JobId, JobStatus, JobType, ProcessingJob, SweepCount, WorkspaceId,
};

use crate::columns::{format_ts, json_column, now_ts, parse_column};
use crate::{Database, StoreResult};

/// Default page size for workspace job listings.
pub const DEFAULT_LIST_LIMIT: u32 = 50;
/// Largest page a caller may request.
pub const MAX_LIST_LIMIT: u32 = 500;

fn from_row(row: &Row<'_>) -> rusqlite::Result<ProcessingJob> {
    Ok(ProcessingJob {
        id: JobId::from_string(row.get::<_, String>("id")?),
        workspace_id: WorkspaceId::from_string(row.get::<_, String>("workspace_id")?),
        job_type: parse_column(row, "type")?,
        status: parse_column(row, "status")?,
        progress_percent: row.get("progress_percent")?,
        bookmark_id: row
            .get::<_, Option<String>>("bookmark_id")?
            .map(BookmarkId::from_string),
        payload: json_column(row, "payload_json")?,
        error_text: row.get("error_text")?,
        created_at: parse_column(row, "created_at")?,
        updated_at: parse_column(row, "updated_at")?,
    })
}

/// Filter for workspace job listings.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub job_type: Option<JobType>,
    pub status: Option<JobStatus>,
    pub limit: Option<u32>,
}

fn insert_with(conn: &Connection, job: &ProcessingJob) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO processing_jobs (id, workspace_id, type, status, progress_percent,
         bookmark_id, payload_json, error_text, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            job.id.as_str(),
            job.workspace_id.as_str(),
            job.job_type.as_str(),
            job.status.as_str(),
            job.progress_percent.min(100),
            job.bookmark_id.as_ref().map(|b| b.as_str()),
            serde_json::to_string(&job.payload)?,
            job.error_text,
            format_ts(&job.created_at),
            format_ts(&job.updated_at),
        ],
    )?;
    Ok(())
}

pub fn insert(db: &Database, job: &ProcessingJob) -> StoreResult<()> {
    db.with_conn(|conn| insert_with(conn, job))
}

pub fn find_by_id(db: &Database, id: &JobId) -> StoreResult<Option<ProcessingJob>> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM processing_jobs WHERE id = ?1",
                params![id.as_str()],
                from_row,
            )
            .optional()?)
    })
}

/// Jobs of one workspace, newest first.
pub fn list_for_workspace(
    db: &Database,
    workspace_id: &WorkspaceId,
    filter: &JobFilter,
) -> StoreResult<Vec<ProcessingJob>> {
    db.with_conn(|conn| {
        let mut conditions = vec!["workspace_id = ?1".to_string()];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(workspace_id.as_str().to_string())];

        if let Some(job_type) = filter.job_type {
            values.push(Box::new(job_type.as_str()));
            conditions.push(format!("type = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(Box::new(status.as_str()));
            conditions.push(format!("status = ?{}", values.len()));
        }

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        values.push(Box::new(limit));

        let sql = format!(
            "SELECT * FROM processing_jobs WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT ?{}",
            conditions.join(" AND "),
            values.len()
        );

        let params_ref: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params_ref.as_slice(), from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    })
}

/// Cancel every live export of the new job's bookmark and insert the new job,
/// atomically. Returns the ids of the cancelled jobs.
pub fn supersede_and_create(
    db: &Database,
    job: &ProcessingJob,
    reason: &str,
) -> StoreResult<Vec<JobId>> {
    db.with_tx(|tx| {
        let mut cancelled = Vec::new();
        if let Some(bookmark_id) = &job.bookmark_id {
            let mut stmt = tx.prepare(
                "SELECT id FROM processing_jobs
                 WHERE workspace_id = ?1 AND bookmark_id = ?2 AND type = ?3
                 AND status IN ('pending', 'processing')",
            )?;
            cancelled = stmt
                .query_map(
                    params![
                        job.workspace_id.as_str(),
                        bookmark_id.as_str(),
                        job.job_type.as_str()
                    ],
                    |r| r.get::<_, String>(0).map(JobId::from_string),
                )?
                .collect::<Result<Vec<_>, _>>()?;

            tx.execute(
                "UPDATE processing_jobs SET status = 'cancelled', error_text = ?4, updated_at = ?5
                 WHERE workspace_id = ?1 AND bookmark_id = ?2 AND type = ?3
                 AND status IN ('pending', 'processing')",
                params![
                    job.workspace_id.as_str(),
                    bookmark_id.as_str(),
                    job.job_type.as_str(),
                    reason,
                    now_ts()
                ],
            )?;
        }
        insert_with(tx, job)?;
        Ok(cancelled)
    })
}

/// Move a live job to `processing` at `progress`.
pub fn mark_processing(db: &Database, id: &JobId, progress: u8) -> StoreResult<bool> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE processing_jobs SET status = 'processing', progress_percent = ?2, updated_at = ?3
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![id.as_str(), progress.min(100), now_ts()],
        )?;
        Ok(changed > 0)
    })
}

/// Record progress on a job that is still `processing`.
pub fn update_progress(db: &Database, id: &JobId, progress: u8) -> StoreResult<bool> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE processing_jobs SET progress_percent = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![id.as_str(), progress.min(100), now_ts()],
        )?;
        Ok(changed > 0)
    })
}

/// Complete a live job, optionally replacing its payload.
pub fn complete(
    db: &Database,
    id: &JobId,
    payload: Option<&serde_json::Value>,
) -> StoreResult<bool> {
    let payload_json = payload.map(serde_json::to_string).transpose()?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE processing_jobs SET status = 'completed', progress_percent = 100,
             payload_json = COALESCE(?2, payload_json), error_text = NULL, updated_at = ?3
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![id.as_str(), payload_json, now_ts()],
        )?;
        Ok(changed > 0)
    })
}

/// Fail a live job with `error`.
pub fn fail(db: &Database, id: &JobId, error: &str) -> StoreResult<bool> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE processing_jobs SET status = 'failed', error_text = ?2, updated_at = ?3
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![id.as_str(), error, now_ts()],
        )?;
        Ok(changed > 0)
    })
}

/// Fail every job stuck in `processing` and reset its progress.
pub fn fail_all_processing(db: &Database, message: &str) -> StoreResult<SweepCount> {
    db.with_tx(|tx| {
        let found: usize = tx.query_row(
            "SELECT COUNT(*) FROM processing_jobs WHERE status = 'processing'",
            [],
            |r| r.get(0),
        )?;
        let updated = tx.execute(
            "UPDATE processing_jobs SET status = 'failed', progress_percent = 0,
             error_text = ?1, updated_at = ?2 WHERE status = 'processing'",
            params![message, now_ts()],
        )?;
        Ok(SweepCount { found, updated })
    })
}

pub fn count_by_status(db: &Database, status: JobStatus) -> StoreResult<u64> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM processing_jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
