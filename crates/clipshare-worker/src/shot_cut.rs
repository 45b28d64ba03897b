//! Shot-cut detection service.
//!
//! A run locates the workspace's processed video, clears its previous cuts,
//! tries each strategy in order and persists the cuts of the first one that
//! produces an answer. Only one run per workspace at a time: an in-process set
//! guards this process and a durable lease (`shot_cut:<workspace>`) guards
//! against other processes and restarts.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use clipshare_media::{default_strategies, ShotCutStrategy};
use clipshare_models::{
    DetectedCut, DetectionMethod, JobId, JobType, ProcessingJob, ShotCut, ShotCutDetectionResult,
    WorkspaceId,
};
use clipshare_store::{job_repo, lease_repo, shot_cut_repo, workspace_repo, Database};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::paths::DataLayout;

const PROGRESS_STARTED: u8 = 10;
const PROGRESS_FIRST_STRATEGY: u8 = 30;
const PROGRESS_STRATEGY_STEP: u8 = 20;
const PROGRESS_PERSISTING: u8 = 90;

/// Result of a completed detection run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionOutcome {
    pub job_id: JobId,
    pub workspace_id: WorkspaceId,
    pub cuts_detected: usize,
    pub detection_method: Option<DetectionMethod>,
    /// Name of the strategy whose result was kept
    pub strategy: &'static str,
}

struct Inner {
    db: Database,
    layout: DataLayout,
    strategies: Vec<Box<dyn ShotCutStrategy>>,
    running: Mutex<HashSet<WorkspaceId>>,
    lease_owner: String,
    lease_ttl: Duration,
}

/// Shot-cut detection. Cloning shares the running set and strategies.
#[derive(Clone)]
pub struct ShotCutService {
    inner: Arc<Inner>,
}

fn lock_running(inner: &Inner) -> MutexGuard<'_, HashSet<WorkspaceId>> {
    inner
        .running
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Key prefix of detection leases.
pub const LEASE_PREFIX: &str = "shot_cut:";

fn lease_key(workspace_id: &WorkspaceId) -> String {
    format!("{}{}", LEASE_PREFIX, workspace_id)
}

fn chrono_ttl(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(120))
}

/// Holds the in-process slot and the durable lease for one workspace.
/// Dropping it releases both and stops the heartbeat.
struct DetectionGuard {
    inner: Arc<Inner>,
    workspace_id: WorkspaceId,
    heartbeat: Option<JoinHandle<()>>,
}

impl Drop for DetectionGuard {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        let key = lease_key(&self.workspace_id);
        if let Err(e) = lease_repo::release(&self.inner.db, &key, &self.inner.lease_owner) {
            warn!(workspace_id = %self.workspace_id, "Failed to release detection lease: {}", e);
        }
        lock_running(&self.inner).remove(&self.workspace_id);
    }
}

impl ShotCutService {
    pub fn new(db: Database, config: &WorkerConfig) -> Self {
        Self::with_strategies(
            db,
            DataLayout::new(&config.data_dir),
            default_strategies(&config.toolchain(), config.detection_config()),
            config.detection_lease,
        )
    }

    pub fn with_strategies(
        db: Database,
        layout: DataLayout,
        strategies: Vec<Box<dyn ShotCutStrategy>>,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                layout,
                strategies,
                running: Mutex::new(HashSet::new()),
                lease_owner: uuid::Uuid::new_v4().to_string(),
                lease_ttl,
            }),
        }
    }

    /// Owner id this process writes into detection leases.
    pub fn lease_owner(&self) -> &str {
        &self.inner.lease_owner
    }

    /// Whether this process is running a detection for the workspace.
    pub fn is_running(&self, workspace_id: &WorkspaceId) -> bool {
        lock_running(&self.inner).contains(workspace_id)
    }

    /// Check preconditions, create a pending job and run detection in the
    /// background. Precondition errors are returned before any job exists.
    pub fn start_detection(&self, workspace_id: &WorkspaceId) -> WorkerResult<ProcessingJob> {
        let workspace = workspace_repo::find_by_id(&self.inner.db, workspace_id)?
            .ok_or_else(|| WorkerError::WorkspaceNotFound(workspace_id.clone()))?;
        if !workspace.is_ready_for_detection() {
            return Err(WorkerError::WorkspaceNotReady {
                id: workspace.id,
                status: workspace.processing_status,
            });
        }

        let guard = self.claim(workspace_id)?;

        let job = ProcessingJob::new_shot_cut_detection(workspace_id.clone());
        job_repo::insert(&self.inner.db, &job)?;
        metrics::record_job_created(JobType::ShotCutDetection);

        info!(
            job_id = %job.id,
            workspace_id = %workspace_id,
            "Shot-cut detection queued"
        );

        let service = self.clone();
        let workspace_id = workspace_id.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            let _guard = guard;
            // Errors are recorded on the job row.
            let _ = service.run(&workspace_id, &job_id).await;
        });

        Ok(job)
    }

    /// Run detection for an existing job row and wait for it.
    pub async fn detect_shot_cuts(
        &self,
        workspace_id: &WorkspaceId,
        job_id: &JobId,
    ) -> WorkerResult<DetectionOutcome> {
        let _guard = self.claim(workspace_id)?;
        self.run(workspace_id, job_id).await
    }

    /// Persisted cuts of a workspace, ordered by timestamp.
    pub fn list_shot_cuts(&self, workspace_id: &WorkspaceId) -> WorkerResult<Vec<ShotCut>> {
        if workspace_repo::find_by_id(&self.inner.db, workspace_id)?.is_none() {
            return Err(WorkerError::WorkspaceNotFound(workspace_id.clone()));
        }
        Ok(shot_cut_repo::list_for_workspace(&self.inner.db, workspace_id)?)
    }

    fn claim(&self, workspace_id: &WorkspaceId) -> WorkerResult<DetectionGuard> {
        if !lock_running(&self.inner).insert(workspace_id.clone()) {
            return Err(WorkerError::DetectionInProgress(workspace_id.clone()));
        }

        let mut guard = DetectionGuard {
            inner: Arc::clone(&self.inner),
            workspace_id: workspace_id.clone(),
            heartbeat: None,
        };

        let key = lease_key(workspace_id);
        let ttl = chrono_ttl(self.inner.lease_ttl);
        if !lease_repo::try_acquire(&self.inner.db, &key, &self.inner.lease_owner, ttl)? {
            return Err(WorkerError::DetectionInProgress(workspace_id.clone()));
        }

        guard.heartbeat = Some(self.spawn_heartbeat(key));
        Ok(guard)
    }

    fn spawn_heartbeat(&self, key: String) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let period = (inner.lease_ttl / 3).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match lease_repo::renew(&inner.db, &key, &inner.lease_owner, chrono_ttl(inner.lease_ttl)) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(lease = %key, "Detection lease lost");
                        break;
                    }
                    Err(e) => warn!(lease = %key, "Failed to renew detection lease: {}", e),
                }
            }
        })
    }

    async fn run(&self, workspace_id: &WorkspaceId, job_id: &JobId) -> WorkerResult<DetectionOutcome> {
        let logger = JobLogger::new(job_id, workspace_id, JobType::ShotCutDetection);
        let started = Instant::now();

        let result = self
            .execute(workspace_id, job_id, &logger)
            .instrument(logger.span())
            .await;

        match &result {
            Ok(outcome) => {
                logger.log_completion(&format!(
                    "{} cuts via {}",
                    outcome.cuts_detected, outcome.strategy
                ));
                metrics::record_job_completed(
                    JobType::ShotCutDetection,
                    started.elapsed().as_secs_f64(),
                );
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                if let Err(store_err) = job_repo::fail(&self.inner.db, job_id, &e.to_string()) {
                    logger.log_error(&format!("Could not record failure: {}", store_err));
                }
                metrics::record_job_failed(JobType::ShotCutDetection);
            }
        }
        result
    }

    async fn execute(
        &self,
        workspace_id: &WorkspaceId,
        job_id: &JobId,
        logger: &JobLogger,
    ) -> WorkerResult<DetectionOutcome> {
        let db = &self.inner.db;

        if !job_repo::mark_processing(db, job_id, PROGRESS_STARTED)? {
            return Err(WorkerError::job_failed(format!("Job {} is no longer live", job_id)));
        }

        let input = self.inner.layout.processed_video(workspace_id)?;
        if !input.exists() {
            return Err(WorkerError::SourceMissing(input));
        }
        logger.log_start(&input.display().to_string());

        shot_cut_repo::clear_for_workspace(db, workspace_id)?;

        let mut last_error = None;
        let mut winner: Option<(&'static str, Vec<DetectedCut>)> = None;

        for (i, strategy) in self.inner.strategies.iter().enumerate() {
            let progress = PROGRESS_FIRST_STRATEGY
                .saturating_add(PROGRESS_STRATEGY_STEP.saturating_mul(i as u8))
                .min(PROGRESS_PERSISTING - 1);
            job_repo::update_progress(db, job_id, progress)?;

            match strategy.detect(&input).await {
                Ok(cuts) if !cuts.is_empty() => {
                    metrics::record_strategy_outcome(strategy.name(), "cuts");
                    winner = Some((strategy.name(), cuts));
                    break;
                }
                Ok(cuts) if strategy.trusts_empty_result() => {
                    metrics::record_strategy_outcome(strategy.name(), "empty");
                    logger.log_progress(&format!("{} found no cuts, single shot", strategy.name()));
                    winner = Some((strategy.name(), cuts));
                    break;
                }
                Ok(_) => {
                    metrics::record_strategy_outcome(strategy.name(), "empty");
                    logger.log_warning(&format!("{} found no cuts, trying next", strategy.name()));
                }
                Err(e) => {
                    metrics::record_strategy_outcome(strategy.name(), "error");
                    logger.log_warning(&format!("{} failed: {}", strategy.name(), e));
                    last_error = Some(e);
                }
            }
        }

        let (strategy, mut cuts) = winner.ok_or_else(|| match last_error {
            Some(e) => WorkerError::detection_failed(format!("All strategies failed: {}", e)),
            None => WorkerError::detection_failed("No detection strategy produced a result"),
        })?;

        job_repo::update_progress(db, job_id, PROGRESS_PERSISTING)?;

        cuts.sort_by_key(|c| c.timestamp_ms);
        cuts.dedup_by_key(|c| c.timestamp_ms);
        let cuts_detected = shot_cut_repo::replace_for_workspace(db, workspace_id, &cuts)?;
        let detection_method = cuts.first().map(|c| c.method);
        metrics::record_shot_cuts(cuts_detected);

        let result = serde_json::to_value(ShotCutDetectionResult {
            cuts_detected,
            detection_method,
        })?;
        if !job_repo::complete(db, job_id, Some(&result))? {
            logger.log_warning("Job was finished elsewhere before completion was recorded");
        }

        Ok(DetectionOutcome {
            job_id: job_id.clone(),
            workspace_id: workspace_id.clone(),
            cuts_detected,
            detection_method,
            strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clipshare_media::{MediaError, MediaResult};
    use clipshare_models::{JobStatus, ProcessingStatus, Workspace};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FakeStrategy {
        name: &'static str,
        result: Result<Vec<DetectedCut>, &'static str>,
        trusts_empty: bool,
        calls: Arc<AtomicUsize>,
    }

    impl FakeStrategy {
        fn boxed(
            name: &'static str,
            result: Result<Vec<DetectedCut>, &'static str>,
        ) -> Box<dyn ShotCutStrategy> {
            Box::new(Self {
                name,
                result,
                trusts_empty: false,
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[async_trait]
    impl ShotCutStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn trusts_empty_result(&self) -> bool {
            self.trusts_empty
        }

        async fn detect(&self, _input: &Path) -> MediaResult<Vec<DetectedCut>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(MediaError::detection_failed)
        }
    }

    fn cut(secs: f64, method: DetectionMethod) -> DetectedCut {
        DetectedCut::from_scene_score(secs, 0.5, method)
    }

    struct Fixture {
        _dir: TempDir,
        db: Database,
        layout: DataLayout,
        workspace_id: WorkspaceId,
    }

    fn fixture(with_video: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let ws = Workspace::new("demo").with_status(ProcessingStatus::Completed);
        workspace_repo::insert(&db, &ws).unwrap();

        let layout = DataLayout::new(dir.path());
        if with_video {
            let video = layout.processed_video(&ws.id).unwrap();
            std::fs::create_dir_all(video.parent().unwrap()).unwrap();
            std::fs::write(&video, b"not really an mp4").unwrap();
        }

        Fixture {
            _dir: dir,
            db,
            layout,
            workspace_id: ws.id,
        }
    }

    fn service(fx: &Fixture, strategies: Vec<Box<dyn ShotCutStrategy>>) -> ShotCutService {
        ShotCutService::with_strategies(
            fx.db.clone(),
            fx.layout.clone(),
            strategies,
            Duration::from_secs(60),
        )
    }

    fn pending_job(fx: &Fixture) -> JobId {
        let job = ProcessingJob::new_shot_cut_detection(fx.workspace_id.clone());
        job_repo::insert(&fx.db, &job).unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_falls_through_to_later_strategy() {
        let fx = fixture(true);
        let svc = service(
            &fx,
            vec![
                FakeStrategy::boxed("probe", Err("ffprobe exited with 1")),
                FakeStrategy::boxed("filter", Ok(vec![])),
                FakeStrategy::boxed(
                    "frames",
                    Ok(vec![
                        cut(6.0, DetectionMethod::FrameHistogram),
                        cut(2.0, DetectionMethod::FrameHistogram),
                    ]),
                ),
            ],
        );
        let job_id = pending_job(&fx);

        let outcome = svc.detect_shot_cuts(&fx.workspace_id, &job_id).await.unwrap();
        assert_eq!(outcome.strategy, "frames");
        assert_eq!(outcome.cuts_detected, 2);
        assert_eq!(outcome.detection_method, Some(DetectionMethod::FrameHistogram));

        let stored = svc.list_shot_cuts(&fx.workspace_id).unwrap();
        assert_eq!(
            stored.iter().map(|c| c.timestamp_ms).collect::<Vec<_>>(),
            vec![2000, 6000]
        );

        let job = job_repo::find_by_id(&fx.db, &job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_percent, 100);
        assert_eq!(job.payload["cutsDetected"], 2);
        assert!(!svc.is_running(&fx.workspace_id));
    }

    #[tokio::test]
    async fn test_all_strategies_failing_fails_job() {
        let fx = fixture(true);
        let svc = service(
            &fx,
            vec![
                FakeStrategy::boxed("probe", Err("boom")),
                FakeStrategy::boxed("filter", Err("still broken")),
            ],
        );
        let job_id = pending_job(&fx);

        let err = svc.detect_shot_cuts(&fx.workspace_id, &job_id).await.unwrap_err();
        assert!(matches!(err, WorkerError::DetectionFailed(_)));

        let job = job_repo::find_by_id(&fx.db, &job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_text.unwrap().contains("still broken"));
        assert_eq!(shot_cut_repo::count_for_workspace(&fx.db, &fx.workspace_id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_trusted_empty_result_completes_with_zero_cuts() {
        let fx = fixture(true);
        let frames = Box::new(FakeStrategy {
            name: "frames",
            result: Ok(vec![]),
            trusts_empty: true,
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let svc = service(&fx, vec![FakeStrategy::boxed("probe", Ok(vec![])), frames]);
        let job_id = pending_job(&fx);

        let outcome = svc.detect_shot_cuts(&fx.workspace_id, &job_id).await.unwrap();
        assert_eq!(outcome.cuts_detected, 0);
        assert_eq!(outcome.detection_method, None);

        let job = job_repo::find_by_id(&fx.db, &job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.payload["cutsDetected"], 0);
    }

    #[tokio::test]
    async fn test_empty_scene_filter_result_skips_frame_diff() {
        let fx = fixture(true);
        let frame_calls = Arc::new(AtomicUsize::new(0));
        let filter = Box::new(FakeStrategy {
            name: "filter",
            result: Ok(vec![]),
            trusts_empty: true,
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let frames = Box::new(FakeStrategy {
            name: "frames",
            result: Ok(vec![cut(3.0, DetectionMethod::FrameHistogram)]),
            trusts_empty: true,
            calls: Arc::clone(&frame_calls),
        });
        let svc = service(&fx, vec![FakeStrategy::boxed("probe", Ok(vec![])), filter, frames]);
        let job_id = pending_job(&fx);

        let outcome = svc.detect_shot_cuts(&fx.workspace_id, &job_id).await.unwrap();
        assert_eq!(outcome.strategy, "filter");
        assert_eq!(outcome.cuts_detected, 0);
        assert_eq!(frame_calls.load(Ordering::SeqCst), 0);

        let job = job_repo::find_by_id(&fx.db, &job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.payload["cutsDetected"], 0);
        assert_eq!(shot_cut_repo::count_for_workspace(&fx.db, &fx.workspace_id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rerun_keeps_only_latest_cuts() {
        let fx = fixture(true);
        let first = service(
            &fx,
            vec![FakeStrategy::boxed(
                "probe",
                Ok(vec![
                    cut(1.0, DetectionMethod::FfprobeScene),
                    cut(2.0, DetectionMethod::FfprobeScene),
                    cut(3.0, DetectionMethod::FfprobeScene),
                ]),
            )],
        );
        first
            .detect_shot_cuts(&fx.workspace_id, &pending_job(&fx))
            .await
            .unwrap();

        let second = service(
            &fx,
            vec![FakeStrategy::boxed("filter", Ok(vec![cut(9.5, DetectionMethod::FfmpegScene)]))],
        );
        second
            .detect_shot_cuts(&fx.workspace_id, &pending_job(&fx))
            .await
            .unwrap();

        let stored = second.list_shot_cuts(&fx.workspace_id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].timestamp_ms, 9500);
        assert_eq!(stored[0].detection_method, DetectionMethod::FfmpegScene);
    }

    #[tokio::test]
    async fn test_missing_source_fails_job() {
        let fx = fixture(false);
        let svc = service(&fx, vec![FakeStrategy::boxed("probe", Ok(vec![]))]);
        let job_id = pending_job(&fx);

        let err = svc.detect_shot_cuts(&fx.workspace_id, &job_id).await.unwrap_err();
        assert!(matches!(err, WorkerError::SourceMissing(_)));

        let job = job_repo::find_by_id(&fx.db, &job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_start_detection_preconditions() {
        let fx = fixture(true);
        let svc = service(&fx, vec![FakeStrategy::boxed("probe", Ok(vec![]))]);

        let err = svc.start_detection(&WorkspaceId::from("missing")).unwrap_err();
        assert!(matches!(err, WorkerError::WorkspaceNotFound(_)));

        let pending = Workspace::new("still processing").with_status(ProcessingStatus::Processing);
        workspace_repo::insert(&fx.db, &pending).unwrap();
        let err = svc.start_detection(&pending.id).unwrap_err();
        assert!(matches!(err, WorkerError::WorkspaceNotReady { .. }));

        assert_eq!(job_repo::count_by_status(&fx.db, JobStatus::Pending).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_detection_rejected() {
        let fx = fixture(true);
        let svc = service(&fx, vec![FakeStrategy::boxed("probe", Ok(vec![]))]);

        let _guard = svc.claim(&fx.workspace_id).unwrap();
        assert!(svc.is_running(&fx.workspace_id));

        let err = svc.start_detection(&fx.workspace_id).unwrap_err();
        assert!(matches!(err, WorkerError::DetectionInProgress(_)));
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn test_lease_held_by_other_process_rejects() {
        let fx = fixture(true);
        let other = service(&fx, vec![]);
        let svc = service(&fx, vec![FakeStrategy::boxed("probe", Ok(vec![]))]);

        let _held = other.claim(&fx.workspace_id).unwrap();
        let err = svc.start_detection(&fx.workspace_id).unwrap_err();
        assert!(matches!(err, WorkerError::DetectionInProgress(_)));
    }

    #[tokio::test]
    async fn test_guard_drop_releases_lease() {
        let fx = fixture(true);
        let svc = service(&fx, vec![]);

        drop(svc.claim(&fx.workspace_id).unwrap());
        assert!(!svc.is_running(&fx.workspace_id));
        assert!(lease_repo::find(&fx.db, &lease_key(&fx.workspace_id))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_start_detection_runs_in_background() {
        let fx = fixture(true);
        let svc = service(
            &fx,
            vec![FakeStrategy::boxed("probe", Ok(vec![cut(4.0, DetectionMethod::FfprobeScene)]))],
        );

        let job = svc.start_detection(&fx.workspace_id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let mut status = JobStatus::Pending;
        for _ in 0..100 {
            status = job_repo::find_by_id(&fx.db, &job.id).unwrap().unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, JobStatus::Completed);
        assert_eq!(shot_cut_repo::count_for_workspace(&fx.db, &fx.workspace_id).unwrap(), 1);
    }
}
