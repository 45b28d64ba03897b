//! Shot-cut repository.
//!
//! Cuts are never updated in place: a detection run clears them when it starts
//! and replaces the whole set when it succeeds.

use rusqlite::{params, Row};

use clipshare_models::{DetectedCut, ShotCut, WorkspaceId};

use crate::columns::{now_ts, parse_column};
use crate::{Database, StoreResult};

fn from_row(row: &Row<'_>) -> rusqlite::Result<ShotCut> {
    Ok(ShotCut {
        id: row.get("id")?,
        workspace_id: WorkspaceId::from_string(row.get::<_, String>("workspace_id")?),
        timestamp_ms: row.get("timestamp_ms")?,
        confidence: row.get("confidence")?,
        detection_method: parse_column(row, "detection_method")?,
        created_at: parse_column(row, "created_at")?,
    })
}

/// Delete every cut of a workspace.
pub fn clear_for_workspace(db: &Database, workspace_id: &WorkspaceId) -> StoreResult<usize> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "DELETE FROM shot_cuts WHERE workspace_id = ?1",
            params![workspace_id.as_str()],
        )?)
    })
}

/// Replace a workspace's cuts with `cuts` in one transaction.
pub fn replace_for_workspace(
    db: &Database,
    workspace_id: &WorkspaceId,
    cuts: &[DetectedCut],
) -> StoreResult<usize> {
    db.with_tx(|tx| {
        tx.execute(
            "DELETE FROM shot_cuts WHERE workspace_id = ?1",
            params![workspace_id.as_str()],
        )?;

        let created_at = now_ts();
        let mut stmt = tx.prepare(
            "INSERT INTO shot_cuts (workspace_id, timestamp_ms, confidence, detection_method, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for cut in cuts {
            stmt.execute(params![
                workspace_id.as_str(),
                cut.timestamp_ms,
                cut.confidence,
                cut.method.as_str(),
                created_at,
            ])?;
        }
        Ok(cuts.len())
    })
}

/// Cuts of a workspace ordered by timestamp.
pub fn list_for_workspace(db: &Database, workspace_id: &WorkspaceId) -> StoreResult<Vec<ShotCut>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM shot_cuts WHERE workspace_id = ?1 ORDER BY timestamp_ms ASC, id ASC",
        )?;
        let cuts = stmt
            .query_map(params![workspace_id.as_str()], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cuts)
    })
}

pub fn count_for_workspace(db: &Database, workspace_id: &WorkspaceId) -> StoreResult<usize> {
    db.with_conn(|conn| {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM shot_cuts WHERE workspace_id = ?1",
            params![workspace_id.as_str()],
            |r| r.get(0),
        )?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipshare_models::{DetectionMethod, Workspace};

    fn cut(ms: i64, method: DetectionMethod) -> DetectedCut {
        DetectedCut {
            timestamp_ms: ms,
            confidence: 0.5,
            method,
        }
    }

    #[test]
    fn test_replace_keeps_only_latest_run() {
        let db = Database::open_in_memory().unwrap();
        let ws = Workspace::new("ws");
        let other = Workspace::new("other");
        crate::workspace_repo::insert(&db, &ws).unwrap();
        crate::workspace_repo::insert(&db, &other).unwrap();

        replace_for_workspace(
            &db,
            &ws.id,
            &[cut(9_000, DetectionMethod::FfprobeScene), cut(1_000, DetectionMethod::FfprobeScene)],
        )
        .unwrap();
        replace_for_workspace(&db, &other.id, &[cut(5_000, DetectionMethod::FfmpegScene)]).unwrap();

        let first = list_for_workspace(&db, &ws.id).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].timestamp_ms, 1_000);

        replace_for_workspace(&db, &ws.id, &[cut(4_000, DetectionMethod::FrameHistogram)]).unwrap();
        let second = list_for_workspace(&db, &ws.id).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].detection_method, DetectionMethod::FrameHistogram);

        assert_eq!(count_for_workspace(&db, &other.id).unwrap(), 1);
    }

    #[test]
    fn test_clear() {
        let db = Database::open_in_memory().unwrap();
        let ws = Workspace::new("ws");
        crate::workspace_repo::insert(&db, &ws).unwrap();
        replace_for_workspace(&db, &ws.id, &[cut(1_000, DetectionMethod::FfmpegScene)]).unwrap();

        assert_eq!(clear_for_workspace(&db, &ws.id).unwrap(), 1);
        assert!(list_for_workspace(&db, &ws.id).unwrap().is_empty());
    }
}
