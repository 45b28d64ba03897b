//! Workspace repository.
//!
//! Workspaces are created by the CRUD layer; this service reads them and
//! mutates only their processing state.

use rusqlite::{params, OptionalExtension, Row};

use clipshare_models::{ProcessingStatus, SweepCount, Workspace, WorkspaceId};

use crate::columns::{format_ts, now_ts, parse_column};
use crate::{Database, StoreResult};

fn from_row(row: &Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: WorkspaceId::from_string(row.get::<_, String>("id")?),
        name: row.get("name")?,
        processing_status: parse_column(row, "processing_status")?,
        processing_progress: row.get("processing_progress")?,
        processing_error: row.get("processing_error")?,
        created_at: parse_column(row, "created_at")?,
        updated_at: parse_column(row, "updated_at")?,
    })
}

pub fn insert(db: &Database, workspace: &Workspace) -> StoreResult<()> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO workspaces (id, name, processing_status, processing_progress,
             processing_error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                workspace.id.as_str(),
                workspace.name,
                workspace.processing_status.as_str(),
                workspace.processing_progress.min(100),
                workspace.processing_error,
                format_ts(&workspace.created_at),
                format_ts(&workspace.updated_at),
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &WorkspaceId) -> StoreResult<Option<Workspace>> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row(
                "SELECT * FROM workspaces WHERE id = ?1",
                params![id.as_str()],
                from_row,
            )
            .optional()?)
    })
}

/// Mirror workspace-processing progress onto the workspace row.
pub fn update_processing(
    db: &Database,
    id: &WorkspaceId,
    status: ProcessingStatus,
    progress: u8,
    error: Option<&str>,
) -> StoreResult<bool> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE workspaces SET processing_status = ?2, processing_progress = ?3,
             processing_error = ?4, updated_at = ?5 WHERE id = ?1",
            params![id.as_str(), status.as_str(), progress.min(100), error, now_ts()],
        )?;
        Ok(changed > 0)
    })
}

/// Fail every workspace stuck in `processing`.
pub fn fail_all_processing(db: &Database, message: &str) -> StoreResult<SweepCount> {
    db.with_tx(|tx| {
        let found: usize = tx.query_row(
            "SELECT COUNT(*) FROM workspaces WHERE processing_status = 'processing'",
            [],
            |r| r.get(0),
        )?;
        let updated = tx.execute(
            "UPDATE workspaces SET processing_status = 'failed', processing_progress = 0,
             processing_error = ?1, updated_at = ?2 WHERE processing_status = 'processing'",
            params![message, now_ts()],
        )?;
        Ok(SweepCount { found, updated })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_find() {
        let db = Database::open_in_memory().unwrap();
        let ws = Workspace::new("Finals").with_status(ProcessingStatus::Completed);
        insert(&db, &ws).unwrap();

        let found = find_by_id(&db, &ws.id).unwrap().unwrap();
        assert_eq!(found.name, "Finals");
        assert_eq!(found.processing_status, ProcessingStatus::Completed);
        assert_eq!(found.processing_progress, 100);
        assert_eq!(found.created_at.timestamp_micros(), ws.created_at.timestamp_micros());
    }

    #[test]
    fn test_find_nonexistent() {
        let db = Database::open_in_memory().unwrap();
        assert!(find_by_id(&db, &WorkspaceId::from("missing")).unwrap().is_none());
    }

    #[test]
    fn test_fail_all_processing() {
        let db = Database::open_in_memory().unwrap();
        let stuck = Workspace::new("stuck").with_status(ProcessingStatus::Processing);
        let done = Workspace::new("done").with_status(ProcessingStatus::Completed);
        insert(&db, &stuck).unwrap();
        insert(&db, &done).unwrap();
        update_processing(&db, &stuck.id, ProcessingStatus::Processing, 40, None).unwrap();

        let count = fail_all_processing(&db, "interrupted").unwrap();
        assert_eq!(count, SweepCount { found: 1, updated: 1 });

        let stuck = find_by_id(&db, &stuck.id).unwrap().unwrap();
        assert_eq!(stuck.processing_status, ProcessingStatus::Failed);
        assert_eq!(stuck.processing_progress, 0);
        assert_eq!(stuck.processing_error.as_deref(), Some("interrupted"));

        let done = find_by_id(&db, &done.id).unwrap().unwrap();
        assert_eq!(done.processing_status, ProcessingStatus::Completed);

        assert_eq!(fail_all_processing(&db, "interrupted").unwrap().updated, 0);
    }
}
