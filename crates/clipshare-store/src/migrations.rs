//! Versioned schema migrations.
//!
//! Applied versions are recorded in `_migrations`; each migration runs at most
//! once, in order.

use rusqlite::Connection;
use tracing::info;

use crate::error::{StoreError, StoreResult};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_workspaces_and_videos",
        sql: include_str!("sql/001_create_workspaces.sql"),
    },
    Migration {
        version: 2,
        description: "create_processing_jobs",
        sql: include_str!("sql/002_create_processing_jobs.sql"),
    },
    Migration {
        version: 3,
        description: "create_shot_cuts",
        sql: include_str!("sql/003_create_shot_cuts.sql"),
    },
    Migration {
        version: 4,
        description: "create_leases",
        sql: include_str!("sql/004_create_leases.sql"),
    },
];

/// Run all pending migrations on `conn`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        info!(
            "Running migration v{}: {}",
            migration.version, migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

/// Highest migration version known to this build.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}
