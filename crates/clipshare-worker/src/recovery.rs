//! Recovery of work orphaned by a restart.
//!
//! Background tasks die with the process, so any workspace, job or video row
//! still `processing` at startup can never finish. The sweep fails them with a
//! fixed message and drops the detection leases the dead process still held.
//! No automatic retry.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use clipshare_models::{RecoveryReport, INTERRUPTED_MESSAGE};
use clipshare_store::{job_repo, lease_repo, video_repo, workspace_repo, Database};

use crate::error::WorkerResult;
use crate::metrics;
use crate::shot_cut::LEASE_PREFIX;

/// Fails every row stuck in `processing` and clears orphaned leases.
#[derive(Clone)]
pub struct RecoverySweep {
    db: Database,
    live_lease_owner: String,
}

impl RecoverySweep {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            live_lease_owner: String::new(),
        }
    }

    /// Keep leases written by `owner`, the detection service of this process.
    pub fn sparing_lease_owner(mut self, owner: impl Into<String>) -> Self {
        self.live_lease_owner = owner.into();
        self
    }

    /// Idempotent: a second run with nothing new stuck updates zero rows.
    pub fn run(&self) -> WorkerResult<RecoveryReport> {
        let workspaces = workspace_repo::fail_all_processing(&self.db, INTERRUPTED_MESSAGE)?;
        let jobs = job_repo::fail_all_processing(&self.db, INTERRUPTED_MESSAGE)?;
        let videos = video_repo::fail_all_processing(&self.db, INTERRUPTED_MESSAGE)?;
        let leases = lease_repo::release_stale(&self.db, LEASE_PREFIX, &self.live_lease_owner)?;

        metrics::record_recovered("workspace", workspaces.updated);
        metrics::record_recovered("job", jobs.updated);
        metrics::record_recovered("video", videos.updated);
        metrics::record_recovered("lease", leases.updated);

        let report = RecoveryReport {
            workspaces,
            jobs,
            videos,
            leases,
            ran_at: Utc::now(),
        };

        if report.total_updated() > 0 {
            warn!(
                workspaces = report.workspaces.updated,
                jobs = report.jobs.updated,
                videos = report.videos.updated,
                leases = report.leases.updated,
                "Recovered work interrupted by a restart"
            );
        } else {
            info!("Recovery sweep found nothing to recover");
        }

        Ok(report)
    }
}

/// Runs the sweep at most once per process and caches its report.
#[derive(Clone)]
pub struct StartupRecovery {
    sweep: RecoverySweep,
    report: Arc<OnceCell<RecoveryReport>>,
}

impl StartupRecovery {
    pub fn new(sweep: RecoverySweep) -> Self {
        Self {
            sweep,
            report: Arc::new(OnceCell::new()),
        }
    }

    /// Run the sweep if no caller has yet; every caller gets the same report.
    /// A failed sweep is not cached, so the next caller retries it.
    pub async fn ensure_ran(&self) -> WorkerResult<RecoveryReport> {
        let sweep = self.sweep.clone();
        self.report
            .get_or_try_init(|| async move { sweep.run() })
            .await
            .cloned()
    }

    /// The cached report, if the sweep has run.
    pub fn report(&self) -> Option<&RecoveryReport> {
        self.report.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::shot_cut::ShotCutService;
    use crate::WorkerError;
    use clipshare_models::{
        JobStatus, ProcessingJob, ProcessingStatus, SweepCount, Video, Workspace,
    };
    use tempfile::TempDir;

    fn seeded() -> (Database, Workspace, ProcessingJob) {
        let db = Database::open_in_memory().unwrap();
        let stuck = Workspace::new("stuck").with_status(ProcessingStatus::Processing);
        workspace_repo::insert(&db, &stuck).unwrap();
        workspace_repo::insert(&db, &Workspace::new("done").with_status(ProcessingStatus::Completed))
            .unwrap();

        let job = ProcessingJob::new_shot_cut_detection(stuck.id.clone());
        job_repo::insert(&db, &job).unwrap();
        job_repo::mark_processing(&db, &job.id, 40).unwrap();
        job_repo::insert(&db, &ProcessingJob::new_shot_cut_detection(stuck.id.clone())).unwrap();

        video_repo::insert(
            &db,
            &Video::new(stuck.id.clone()).with_status(ProcessingStatus::Processing),
        )
        .unwrap();

        (db, stuck, job)
    }

    #[test]
    fn test_sweep_fails_stuck_rows() {
        let (db, stuck, job) = seeded();

        let report = RecoverySweep::new(db.clone()).run().unwrap();
        assert_eq!(report.workspaces, SweepCount { found: 1, updated: 1 });
        assert_eq!(report.jobs, SweepCount { found: 1, updated: 1 });
        assert_eq!(report.videos, SweepCount { found: 1, updated: 1 });

        let ws = workspace_repo::find_by_id(&db, &stuck.id).unwrap().unwrap();
        assert_eq!(ws.processing_status, ProcessingStatus::Failed);
        assert_eq!(ws.processing_error.as_deref(), Some(INTERRUPTED_MESSAGE));

        let job = job_repo::find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress_percent, 0);

        // Pending jobs are untouched.
        assert_eq!(job_repo::count_by_status(&db, JobStatus::Pending).unwrap(), 1);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let (db, _, _) = seeded();
        let sweep = RecoverySweep::new(db);

        assert_eq!(sweep.run().unwrap().total_updated(), 3);
        assert_eq!(sweep.run().unwrap().total_updated(), 0);
    }

    #[tokio::test]
    async fn test_startup_recovery_runs_once() {
        let (db, _, _) = seeded();
        let recovery = StartupRecovery::new(RecoverySweep::new(db.clone()));
        assert!(recovery.report().is_none());

        let first = recovery.ensure_ran().await.unwrap();
        assert_eq!(first.total_updated(), 3);

        // New stuck work after the first sweep is left alone.
        let late = Workspace::new("late").with_status(ProcessingStatus::Processing);
        workspace_repo::insert(&db, &late).unwrap();

        let second = recovery.clone().ensure_ran().await.unwrap();
        assert_eq!(second, first);
        let late = workspace_repo::find_by_id(&db, &late.id).unwrap().unwrap();
        assert_eq!(late.processing_status, ProcessingStatus::Processing);
    }

    #[tokio::test]
    async fn test_sweep_clears_leases_of_dead_process() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let ws = Workspace::new("cut me").with_status(ProcessingStatus::Completed);
        workspace_repo::insert(&db, &ws).unwrap();

        let orphan = ProcessingJob::new_shot_cut_detection(ws.id.clone());
        job_repo::insert(&db, &orphan).unwrap();
        job_repo::mark_processing(&db, &orphan.id, 30).unwrap();
        let key = format!("{}{}", LEASE_PREFIX, ws.id);
        lease_repo::try_acquire(&db, &key, "dead-process", chrono::Duration::seconds(120)).unwrap();

        let config = WorkerConfig {
            data_dir: dir.path().to_path_buf(),
            ..WorkerConfig::default()
        };
        let service = ShotCutService::new(db.clone(), &config);
        assert!(matches!(
            service.start_detection(&ws.id),
            Err(WorkerError::DetectionInProgress(_))
        ));

        let report = RecoverySweep::new(db.clone())
            .sparing_lease_owner(service.lease_owner())
            .run()
            .unwrap();
        assert_eq!(report.jobs.updated, 1);
        assert_eq!(report.leases, SweepCount { found: 1, updated: 1 });
        assert!(lease_repo::find(&db, &key).unwrap().is_none());

        let job = service.start_detection(&ws.id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }
}
