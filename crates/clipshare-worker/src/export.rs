//! Debounced clip export.
//!
//! Every bookmark edit supersedes the live export of the same bookmark and
//! schedules a new one behind a debounce timer keyed by `workspace:bookmark`.
//! Each schedule owns a cancellation signal. A newer edit fires it, which
//! aborts the timer or kills the running ffmpeg child, and the stale run's
//! result is thrown away.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, warn, Instrument};

use clipshare_media::{
    wait_cancelled, ClipCutter, CutOutcome, CutRequest, FfmpegClipCutter, PercentCallback,
};
use clipshare_models::{
    BookmarkEdit, BookmarkId, EncodingMode, JobId, JobType, ProcessingJob, WorkspaceId,
    SUPERSEDED_REASON,
};
use clipshare_store::{job_repo, workspace_repo, Database};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::paths::DataLayout;

/// Minimum progress step mirrored onto the job row.
const PROGRESS_STEP: u8 = 5;

struct ScheduledExport {
    job_id: JobId,
    cancel_tx: watch::Sender<bool>,
}

struct Inner {
    db: Database,
    layout: DataLayout,
    cutter: Arc<dyn ClipCutter>,
    debounce: Duration,
    scheduled: Mutex<HashMap<String, ScheduledExport>>,
}

/// Clip export scheduler. Cloning shares the debounce map.
#[derive(Clone)]
pub struct ClipExportService {
    inner: Arc<Inner>,
}

fn lock_scheduled(inner: &Inner) -> MutexGuard<'_, HashMap<String, ScheduledExport>> {
    inner
        .scheduled
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn encoding_label(mode: EncodingMode) -> &'static str {
    match mode {
        EncodingMode::StreamCopy => "stream_copy",
        EncodingMode::Reencode => "reencode",
    }
}

impl ClipExportService {
    pub fn new(db: Database, config: &WorkerConfig) -> Self {
        Self::with_cutter(
            db,
            DataLayout::new(&config.data_dir),
            Arc::new(FfmpegClipCutter::new(config.toolchain())),
            config.export_debounce,
        )
    }

    pub fn with_cutter(
        db: Database,
        layout: DataLayout,
        cutter: Arc<dyn ClipCutter>,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                layout,
                cutter,
                debounce,
                scheduled: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Scheduled or in-flight exports.
    pub fn pending_exports(&self) -> usize {
        lock_scheduled(&self.inner).len()
    }

    /// Where the clip of a bookmark is (or will be) written.
    pub fn clip_path(
        &self,
        workspace_id: &WorkspaceId,
        bookmark_id: &BookmarkId,
    ) -> WorkerResult<PathBuf> {
        self.inner.layout.clip_path(workspace_id, bookmark_id)
    }

    /// Supersede the bookmark's live export and schedule a new one.
    pub fn request_export(&self, edit: BookmarkEdit) -> WorkerResult<ProcessingJob> {
        self.inner
            .layout
            .clip_path(&edit.workspace_id, &edit.bookmark_id)?;
        if workspace_repo::find_by_id(&self.inner.db, &edit.workspace_id)?.is_none() {
            return Err(WorkerError::WorkspaceNotFound(edit.workspace_id.clone()));
        }

        let job = ProcessingJob::new_export_clip(edit.workspace_id.clone(), &edit.to_payload());
        let key = edit.debounce_key();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        {
            let mut scheduled = lock_scheduled(&self.inner);
            let superseded =
                job_repo::supersede_and_create(&self.inner.db, &job, SUPERSEDED_REASON)?;
            let previous = scheduled.insert(
                key.clone(),
                ScheduledExport {
                    job_id: job.id.clone(),
                    cancel_tx,
                },
            );
            if let Some(previous) = previous {
                debug!(job_id = %previous.job_id, "Signalling superseded export");
                let _ = previous.cancel_tx.send(true);
            }
            metrics::record_jobs_cancelled(JobType::ExportClip, superseded.len());
            metrics::set_exports_pending(scheduled.len());
        }
        metrics::record_job_created(JobType::ExportClip);

        let service = self.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            service.run_scheduled(key, edit, job_id, cancel_rx).await;
        });

        Ok(job)
    }

    async fn run_scheduled(
        &self,
        key: String,
        edit: BookmarkEdit,
        job_id: JobId,
        cancel_rx: watch::Receiver<bool>,
    ) {
        let logger = JobLogger::new(&job_id, &edit.workspace_id, JobType::ExportClip);

        tokio::select! {
            _ = tokio::time::sleep(self.inner.debounce) => {}
            _ = wait_cancelled(Some(cancel_rx.clone())) => {
                logger.log_progress("superseded before the debounce elapsed");
                self.forget(&key, &job_id);
                return;
            }
        }

        let started = Instant::now();
        let result = self
            .execute(&edit, &job_id, cancel_rx, &logger)
            .instrument(logger.span())
            .await;

        match result {
            Ok(Some(outcome)) => {
                logger.log_completion(&format!(
                    "{} ({} bytes, {})",
                    outcome.output.display(),
                    outcome.size_bytes,
                    encoding_label(outcome.encoding)
                ));
                metrics::record_export_encoding(encoding_label(outcome.encoding));
                metrics::record_job_completed(JobType::ExportClip, started.elapsed().as_secs_f64());
            }
            Ok(None) => logger.log_progress("superseded, result discarded"),
            Err(e) if e.is_cancelled() => logger.log_progress("cancelled by a newer edit"),
            Err(e) => {
                logger.log_error(&e.to_string());
                if let Err(store_err) = job_repo::fail(&self.inner.db, &job_id, &e.to_string()) {
                    logger.log_error(&format!("Could not record failure: {}", store_err));
                }
                metrics::record_job_failed(JobType::ExportClip);
            }
        }

        self.forget(&key, &job_id);
    }

    /// Returns `None` when the job was superseded along the way.
    async fn execute(
        &self,
        edit: &BookmarkEdit,
        job_id: &JobId,
        cancel_rx: watch::Receiver<bool>,
        logger: &JobLogger,
    ) -> WorkerResult<Option<CutOutcome>> {
        let db = &self.inner.db;
        let layout = &self.inner.layout;

        if !job_repo::mark_processing(db, job_id, 0)? {
            return Ok(None);
        }

        let input = layout.processed_video(&edit.workspace_id)?;
        if !input.exists() {
            return Err(WorkerError::SourceMissing(input));
        }
        let output = layout.clip_path(&edit.workspace_id, &edit.bookmark_id)?;
        let partial = layout.partial_clip_path(&edit.workspace_id, &edit.bookmark_id, job_id)?;

        let duration = self.inner.cutter.source_duration(&input).await;
        let window = edit.window(duration);
        logger.log_start(&format!(
            "{:.3}s..{:.3}s -> {}",
            window.start_secs,
            window.end_secs,
            output.display()
        ));

        let request = CutRequest {
            input,
            output: partial.clone(),
            window,
        };
        let cut = self
            .inner
            .cutter
            .cut(&request, cancel_rx.clone(), self.progress_callback(job_id))
            .await;

        let outcome = match cut {
            Ok(outcome) => outcome,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e.into());
            }
        };

        if *cancel_rx.borrow() {
            let _ = tokio::fs::remove_file(&partial).await;
            return Ok(None);
        }

        tokio::fs::rename(&partial, &output).await?;

        let mut payload = edit.to_payload();
        payload.output_path = Some(output.display().to_string());
        if !job_repo::complete(db, job_id, Some(&serde_json::to_value(&payload)?))? {
            return Ok(None);
        }

        Ok(Some(CutOutcome { output, ..outcome }))
    }

    fn progress_callback(&self, job_id: &JobId) -> PercentCallback {
        let db = self.inner.db.clone();
        let job_id = job_id.clone();
        let last = AtomicU8::new(0);
        Arc::new(move |percent: u8| {
            let percent = percent.min(99);
            let previous = last.load(Ordering::Relaxed);
            if percent < previous.saturating_add(PROGRESS_STEP) {
                return;
            }
            last.store(percent, Ordering::Relaxed);
            if let Err(e) = job_repo::update_progress(&db, &job_id, percent) {
                warn!(job_id = %job_id, "Failed to update export progress: {}", e);
            }
        })
    }

    fn forget(&self, key: &str, job_id: &JobId) {
        let mut scheduled = lock_scheduled(&self.inner);
        if scheduled.get(key).is_some_and(|s| &s.job_id == job_id) {
            scheduled.remove(key);
        }
        metrics::set_exports_pending(scheduled.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clipshare_media::{MediaError, MediaResult};
    use clipshare_models::{BookmarkRange, ClipWindow, JobStatus, Workspace};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeCutter {
        delay: Duration,
        failure: Option<&'static str>,
        calls: AtomicUsize,
        windows: Mutex<Vec<ClipWindow>>,
    }

    #[async_trait]
    impl ClipCutter for FakeCutter {
        async fn source_duration(&self, _input: &Path) -> Option<f64> {
            Some(10.0)
        }

        async fn cut(
            &self,
            request: &CutRequest,
            cancel_rx: watch::Receiver<bool>,
            on_progress: PercentCallback,
        ) -> MediaResult<CutOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.windows.lock().unwrap().push(request.window);

            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = wait_cancelled(Some(cancel_rx)) => return Err(MediaError::Cancelled),
            }
            if let Some(message) = self.failure {
                return Err(MediaError::ffmpeg_failed(message, None, Some(1)));
            }

            on_progress(50);
            tokio::fs::create_dir_all(request.output.parent().unwrap()).await?;
            tokio::fs::write(&request.output, b"clip").await?;
            Ok(CutOutcome {
                output: request.output.clone(),
                encoding: EncodingMode::StreamCopy,
                size_bytes: 4,
            })
        }
    }

    struct Fixture {
        dir: TempDir,
        db: Database,
        workspace_id: WorkspaceId,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let ws = Workspace::new("demo");
        workspace_repo::insert(&db, &ws).unwrap();

        let video = DataLayout::new(dir.path()).processed_video(&ws.id).unwrap();
        std::fs::create_dir_all(video.parent().unwrap()).unwrap();
        std::fs::write(&video, b"source").unwrap();

        Fixture {
            dir,
            db,
            workspace_id: ws.id,
        }
    }

    fn service(fx: &Fixture, cutter: Arc<FakeCutter>, debounce_ms: u64) -> ClipExportService {
        ClipExportService::with_cutter(
            fx.db.clone(),
            DataLayout::new(fx.dir.path()),
            cutter,
            Duration::from_millis(debounce_ms),
        )
    }

    fn edit(fx: &Fixture, start_ms: i64, end_ms: i64) -> BookmarkEdit {
        BookmarkEdit::new(
            fx.workspace_id.clone(),
            BookmarkId::from("bm1"),
            BookmarkRange { start_ms, end_ms },
        )
    }

    async fn wait_for_status(db: &Database, job_id: &JobId, wanted: JobStatus) -> ProcessingJob {
        for _ in 0..200 {
            let job = job_repo::find_by_id(db, job_id).unwrap().unwrap();
            if job.status == wanted {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {}", job_id, wanted);
    }

    #[tokio::test]
    async fn test_rapid_edits_export_once() {
        let fx = fixture();
        let cutter = Arc::new(FakeCutter::default());
        let svc = service(&fx, cutter.clone(), 100);

        let first = svc.request_export(edit(&fx, 1_000, 3_000)).unwrap();
        let second = svc.request_export(edit(&fx, 1_500, 4_000)).unwrap();

        let done = wait_for_status(&fx.db, &second.id, JobStatus::Completed).await;
        let first = job_repo::find_by_id(&fx.db, &first.id).unwrap().unwrap();
        assert_eq!(first.status, JobStatus::Cancelled);
        assert_eq!(first.error_text.as_deref(), Some(SUPERSEDED_REASON));

        assert_eq!(cutter.calls.load(Ordering::SeqCst), 1);
        let windows = cutter.windows.lock().unwrap().clone();
        assert_eq!(windows, vec![ClipWindow::compute(1_500, 4_000, Some(10.0))]);

        let payload = done.export_payload().unwrap();
        let clip = svc.clip_path(&fx.workspace_id, &BookmarkId::from("bm1")).unwrap();
        assert_eq!(payload.output_path, Some(clip.display().to_string()));
        assert_eq!(std::fs::read(&clip).unwrap(), b"clip");
    }

    #[tokio::test]
    async fn test_newer_edit_cancels_running_cut() {
        let fx = fixture();
        let cutter = Arc::new(FakeCutter {
            delay: Duration::from_millis(300),
            ..Default::default()
        });
        let svc = service(&fx, cutter.clone(), 0);

        let first = svc.request_export(edit(&fx, 0, 2_000)).unwrap();
        wait_for_status(&fx.db, &first.id, JobStatus::Processing).await;

        let second = svc.request_export(edit(&fx, 0, 5_000)).unwrap();
        wait_for_status(&fx.db, &second.id, JobStatus::Completed).await;

        let first = job_repo::find_by_id(&fx.db, &first.id).unwrap().unwrap();
        assert_eq!(first.status, JobStatus::Cancelled);
        assert_eq!(cutter.calls.load(Ordering::SeqCst), 2);

        let terminal_live = job_repo::list_for_workspace(&fx.db, &fx.workspace_id, &Default::default())
            .unwrap()
            .into_iter()
            .filter(|j| j.status != JobStatus::Cancelled)
            .count();
        assert_eq!(terminal_live, 1);
    }

    #[tokio::test]
    async fn test_negative_start_is_clamped() {
        let fx = fixture();
        let cutter = Arc::new(FakeCutter::default());
        let svc = service(&fx, cutter.clone(), 0);

        let job = svc.request_export(edit(&fx, -2_000, 1_000)).unwrap();
        wait_for_status(&fx.db, &job.id, JobStatus::Completed).await;

        let window = cutter.windows.lock().unwrap()[0];
        assert_eq!(window.start_secs, 0.0);
        assert!((window.end_secs - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cut_failure_fails_job() {
        let fx = fixture();
        let cutter = Arc::new(FakeCutter {
            failure: Some("Invalid data found when processing input"),
            ..Default::default()
        });
        let svc = service(&fx, cutter, 0);

        let job = svc.request_export(edit(&fx, 0, 1_000)).unwrap();
        let failed = wait_for_status(&fx.db, &job.id, JobStatus::Failed).await;
        assert!(failed.error_text.unwrap().contains("Invalid data"));

        let clip = svc.clip_path(&fx.workspace_id, &BookmarkId::from("bm1")).unwrap();
        assert!(!clip.exists());
    }

    #[tokio::test]
    async fn test_unknown_workspace_creates_no_job() {
        let fx = fixture();
        let svc = service(&fx, Arc::new(FakeCutter::default()), 0);

        let mut bad = edit(&fx, 0, 1_000);
        bad.workspace_id = WorkspaceId::from("nope");
        let err = svc.request_export(bad).unwrap_err();
        assert!(matches!(err, WorkerError::WorkspaceNotFound(_)));
        assert_eq!(job_repo::count_by_status(&fx.db, JobStatus::Pending).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unsafe_bookmark_id_rejected() {
        let fx = fixture();
        let svc = service(&fx, Arc::new(FakeCutter::default()), 0);

        let mut bad = edit(&fx, 0, 1_000);
        bad.bookmark_id = BookmarkId::from("../../etc");
        assert!(matches!(
            svc.request_export(bad),
            Err(WorkerError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_exports_drains() {
        let fx = fixture();
        let svc = service(&fx, Arc::new(FakeCutter::default()), 20);

        let job = svc.request_export(edit(&fx, 0, 1_000)).unwrap();
        assert_eq!(svc.pending_exports(), 1);

        wait_for_status(&fx.db, &job.id, JobStatus::Completed).await;
        for _ in 0..50 {
            if svc.pending_exports() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(svc.pending_exports(), 0);
    }
}
