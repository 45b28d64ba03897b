//! Video repository.

use rusqlite::{params, OptionalExtension, Row};

use clipshare_models::{SweepCount, Video, VideoId, WorkspaceId};

use crate::columns::{format_ts, now_ts, parse_column};
use crate::{Database, StoreResult};

fn from_row(row: &Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        id: VideoId::from_string(row.get::<_, String>("id")?),
        workspace_id: WorkspaceId::from_string(row.get::<_, String>("workspace_id")?),
        status: parse_column(row, "status")?,
        progress: row.get("progress")?,
        error_text: row.get("error_text")?,
        file_path: row.get("file_path")?,
        created_at: parse_column(row, "created_at")?,
        updated_at: parse_column(row, "updated_at")?,
    })
}

pub fn insert(db: &Database, video: &Video) -> StoreResult<()> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO videos (id, workspace_id, status, progress, error_text, file_path,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                video.id.as_str(),
                video.workspace_id.as_str(),
                video.status.as_str(),
                video.progress.min(100),
                video.error_text,
                video.file_path,
                format_ts(&video.created_at),
                format_ts(&video.updated_at),
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &VideoId) -> StoreResult<Option<Video>> {
    db.with_conn(|conn| {
        Ok(conn
            .query_row("SELECT * FROM videos WHERE id = ?1", params![id.as_str()], from_row)
            .optional()?)
    })
}

/// Fail every video stuck in `processing`.
pub fn fail_all_processing(db: &Database, message: &str) -> StoreResult<SweepCount> {
    db.with_tx(|tx| {
        let found: usize = tx.query_row(
            "SELECT COUNT(*) FROM videos WHERE status = 'processing'",
            [],
            |r| r.get(0),
        )?;
        let updated = tx.execute(
            "UPDATE videos SET status = 'failed', progress = 0, error_text = ?1, updated_at = ?2
             WHERE status = 'processing'",
            params![message, now_ts()],
        )?;
        Ok(SweepCount { found, updated })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipshare_models::{ProcessingStatus, Workspace};

    #[test]
    fn test_fail_all_processing() {
        let db = Database::open_in_memory().unwrap();
        let ws = Workspace::new("ws");
        crate::workspace_repo::insert(&db, &ws).unwrap();

        let mut stuck = Video::new(ws.id.clone()).with_status(ProcessingStatus::Processing);
        stuck.progress = 70;
        let pending = Video::new(ws.id.clone());
        insert(&db, &stuck).unwrap();
        insert(&db, &pending).unwrap();

        let count = fail_all_processing(&db, "interrupted").unwrap();
        assert_eq!(count, SweepCount { found: 1, updated: 1 });

        let stuck = find_by_id(&db, &stuck.id).unwrap().unwrap();
        assert_eq!(stuck.status, ProcessingStatus::Failed);
        assert_eq!(stuck.progress, 0);
        assert_eq!(stuck.error_text.as_deref(), Some("interrupted"));

        let pending = find_by_id(&db, &pending.id).unwrap().unwrap();
        assert_eq!(pending.status, ProcessingStatus::Pending);
    }
}
