//! SQLite persistence for the Clipshare job subsystem.
//!
//! One rusqlite connection behind a mutex, shared by every repository. Each
//! repository module is a set of free functions taking `&Database`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Transaction};
use tracing::info;

mod columns;
pub mod error;
pub mod job_repo;
pub mod lease_repo;
pub mod migrations;
pub mod shot_cut_repo;
pub mod video_repo;
pub mod workspace_repo;

pub use error::{StoreError, StoreResult};
pub use job_repo::JobFilter;
pub use lease_repo::Lease;

/// Thread-safe database handle. Cloning shares the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and run pending migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )?;
        migrations::run_all(&conn)?;

        info!(path = %path.display(), "Database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database with migrations applied.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Locked access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    /// Run `f` inside a transaction, committed only if `f` succeeds.
    pub fn with_tx<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> StoreResult<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Cheap round-trip used by readiness checks.
    pub fn ping(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.ping().unwrap();
        let count: u32 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?))
            .unwrap();
        assert!(count > 0);
    }

    #[test]
    fn test_open_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clipshare.db");
        let db = Database::open(&path).unwrap();
        db.ping().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let result: StoreResult<()> = db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO leases (key, owner, expires_at_ms) VALUES ('k', 'o', 0)",
                [],
            )?;
            Err(StoreError::LockPoisoned)
        });
        assert!(result.is_err());

        let count: u32 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM leases", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }
}
