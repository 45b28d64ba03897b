//! Clip cutting.
//!
//! A clip is cut with a stream copy first. When that fails the same window is
//! re-encoded with a fast x264 preset. Cancellation aborts either attempt and
//! is never followed by a fallback.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{info, warn};

use clipshare_models::{ClipWindow, EncodingConfig, EncodingMode};

use crate::command::{FfmpegCommand, Toolchain};
use crate::error::{MediaError, MediaResult};
use crate::probe::get_duration;
use crate::progress::PercentCallback;

/// One clip to cut.
#[derive(Debug, Clone)]
pub struct CutRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub window: ClipWindow,
}

/// What a successful cut produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CutOutcome {
    pub output: PathBuf,
    pub encoding: EncodingMode,
    pub size_bytes: u64,
}

/// Cuts clips out of a source video.
#[async_trait]
pub trait ClipCutter: Send + Sync {
    /// Source duration in seconds, `None` when it cannot be determined.
    async fn source_duration(&self, input: &Path) -> Option<f64>;

    async fn cut(
        &self,
        request: &CutRequest,
        cancel_rx: watch::Receiver<bool>,
        on_progress: PercentCallback,
    ) -> MediaResult<CutOutcome>;
}

/// `ClipCutter` backed by the ffmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegClipCutter {
    tools: Toolchain,
}

impl FfmpegClipCutter {
    pub fn new(tools: Toolchain) -> Self {
        Self { tools }
    }

    async fn attempt(
        &self,
        request: &CutRequest,
        encoding: &EncodingConfig,
        cancel_rx: watch::Receiver<bool>,
        on_progress: PercentCallback,
    ) -> MediaResult<u64> {
        let cmd = build_cut_command(request, encoding);
        let total_ms = (request.window.duration_secs() * 1000.0).round() as i64;

        self.tools
            .ffmpeg_runner()
            .with_cancel(cancel_rx)
            .run_with_progress(&cmd, move |progress| {
                on_progress(progress.percent(total_ms));
            })
            .await?;

        let size = tokio::fs::metadata(&request.output).await?.len();
        if size == 0 {
            return Err(MediaError::ffmpeg_failed("ffmpeg produced an empty clip", None, None));
        }
        Ok(size)
    }
}

#[async_trait]
impl ClipCutter for FfmpegClipCutter {
    async fn source_duration(&self, input: &Path) -> Option<f64> {
        match get_duration(&self.tools, input).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!("Could not probe {}: {}", input.display(), e);
                None
            }
        }
    }

    async fn cut(
        &self,
        request: &CutRequest,
        cancel_rx: watch::Receiver<bool>,
        on_progress: PercentCallback,
    ) -> MediaResult<CutOutcome> {
        if !request.input.exists() {
            return Err(MediaError::FileNotFound(request.input.clone()));
        }
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(
            "Cutting clip: {} -> {} ({:.3}s..{:.3}s)",
            request.input.display(),
            request.output.display(),
            request.window.start_secs,
            request.window.end_secs
        );

        let copy = EncodingConfig::stream_copy();
        let copy_err = match self
            .attempt(request, &copy, cancel_rx.clone(), on_progress.clone())
            .await
        {
            Ok(size_bytes) => {
                return Ok(CutOutcome {
                    output: request.output.clone(),
                    encoding: EncodingMode::StreamCopy,
                    size_bytes,
                })
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => e,
        };

        warn!("Stream copy failed, re-encoding: {}", copy_err);
        let _ = tokio::fs::remove_file(&request.output).await;

        let size_bytes = self
            .attempt(request, &EncodingConfig::reencode(), cancel_rx, on_progress)
            .await?;
        Ok(CutOutcome {
            output: request.output.clone(),
            encoding: EncodingMode::Reencode,
            size_bytes,
        })
    }
}

/// ffmpeg invocation for one cut attempt.
pub fn build_cut_command(request: &CutRequest, encoding: &EncodingConfig) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(&request.input, &request.output)
        .seek(request.window.start_secs)
        .duration(request.window.duration_secs())
        .encoding(encoding);
    if !encoding.is_stream_copy() {
        cmd = cmd.output_args(["-movflags", "+faststart"]);
    }
    cmd
}
