//! FFmpeg command builder and process runner.
//!
//! Every external tool is invoked with an argument vector, never a shell
//! string. Children are spawned with `kill_on_drop`, raced against an optional
//! wall-clock timeout and an optional cancellation signal, and killed as soon as
//! either fires.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use clipshare_models::EncodingConfig;

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, parse_progress_line, FfmpegProgress};

/// Default wall-clock limit for a single ffmpeg/ffprobe child.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Number of stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Locations of the external binaries and the per-child timeout.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub timeout_secs: u64,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Toolchain {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            timeout_secs,
        }
    }

    /// Runner for ffmpeg with this toolchain's binary and timeout.
    pub fn ffmpeg_runner(&self) -> FfmpegRunner {
        FfmpegRunner::new()
            .with_binary(&self.ffmpeg)
            .with_timeout(self.timeout_secs)
    }

    /// Resolve both binaries.
    pub fn check(&self) -> MediaResult<()> {
        check_ffmpeg(&self.ffmpeg)?;
        check_ffprobe(&self.ffprobe)?;
        Ok(())
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path (`-` for stdout)
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (input side, fast seek).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds.max(0.0)))
    }

    /// Limit the amount of input read.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Copy all streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Apply an encoding configuration.
    pub fn encoding(self, config: &EncodingConfig) -> Self {
        self.output_args(config.to_ffmpeg_args())
    }

    /// Drop the audio stream.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Force the output container.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-nostdin".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Which external tool a process belongs to, for error mapping and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }

    fn not_found(&self, binary: &Path) -> MediaError {
        match self {
            Tool::Ffmpeg => MediaError::FfmpegNotFound(binary.to_path_buf()),
            Tool::Ffprobe => MediaError::FfprobeNotFound(binary.to_path_buf()),
        }
    }

    fn failed(&self, message: String, stderr: Option<String>, exit_code: Option<i32>) -> MediaError {
        match self {
            Tool::Ffmpeg => MediaError::ffmpeg_failed(message, stderr, exit_code),
            Tool::Ffprobe => MediaError::ffprobe_failed(message, stderr),
        }
    }
}

/// A fully described child process.
pub(crate) struct Invocation<'a> {
    pub tool: Tool,
    pub binary: &'a Path,
    pub args: &'a [String],
    pub cancel_rx: Option<watch::Receiver<bool>>,
    pub timeout_secs: Option<u64>,
}

/// Spawn a process, stream its stderr through `on_stderr_line`, and return its
/// stdout once it exits successfully.
pub(crate) async fn execute<F>(invocation: Invocation<'_>, mut on_stderr_line: F) -> MediaResult<Vec<u8>>
where
    F: FnMut(&str) + Send + 'static,
{
    let Invocation {
        tool,
        binary,
        args,
        cancel_rx,
        timeout_secs,
    } = invocation;

    which::which(binary).map_err(|_| tool.not_found(binary))?;
    debug!("Running {}: {} {}", tool.as_str(), binary.display(), args.join(" "));

    let started = Instant::now();
    let mut child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::internal("child stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::internal("child stderr not captured"))?;

    let stdout_handle = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf).await;
        buf
    });

    let stderr_handle = tokio::spawn(async move {
        let mut reader = BufReader::new(stderr).lines();
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        while let Ok(Some(line)) = reader.next_line().await {
            on_stderr_line(&line);
            if line.trim().is_empty() || is_progress_line(&line) {
                continue;
            }
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect::<Vec<_>>().join("\n")
    });

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = wait_timeout(timeout_secs) => {
            let secs = timeout_secs.unwrap_or_default();
            warn!("{} timed out after {} seconds, killing process", tool.as_str(), secs);
            let _ = child.kill().await;
            record_run(tool, "timeout", started);
            return Err(MediaError::Timeout(secs));
        }
        _ = wait_cancelled(cancel_rx) => {
            info!("{} cancelled, killing process", tool.as_str());
            let _ = child.kill().await;
            record_run(tool, "cancelled", started);
            return Err(MediaError::Cancelled);
        }
    };

    let stdout = stdout_handle.await.unwrap_or_default();
    let stderr_tail = stderr_handle.await.unwrap_or_default();

    if status.success() {
        record_run(tool, "success", started);
        return Ok(stdout);
    }

    record_run(tool, "failure", started);
    let last_line = stderr_tail.lines().last().unwrap_or("no output").to_string();
    let message = match status.code() {
        Some(code) => format!("{} exited with status {}: {}", tool.as_str(), code, last_line),
        None => format!("{} terminated by signal: {}", tool.as_str(), last_line),
    };
    let stderr = (!stderr_tail.is_empty()).then_some(stderr_tail);
    Err(tool.failed(message, stderr, status.code()))
}

async fn wait_timeout(timeout_secs: Option<u64>) {
    match timeout_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}

/// Resolves once the signal reads `true`. A dropped sender never cancels.
pub async fn wait_cancelled(cancel_rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = cancel_rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

fn record_run(tool: Tool, outcome: &'static str, started: Instant) {
    metrics::histogram!(
        "clipshare_media_process_duration_seconds",
        "tool" => tool.as_str(),
        "outcome" => outcome
    )
    .record(started.elapsed().as_secs_f64());
}

/// Runner for FFmpeg commands with progress tracking and cancellation.
pub struct FfmpegRunner {
    /// Binary to execute
    binary: PathBuf,
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner using `ffmpeg` from PATH.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    /// Use a specific ffmpeg binary.
    pub fn with_binary(mut self, binary: impl AsRef<Path>) -> Self {
        self.binary = binary.as_ref().to_path_buf();
        self
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        let mut current = FfmpegProgress::default();
        self.execute(cmd, move |line| {
            if let Some(progress) = parse_progress_line(line, &mut current) {
                progress_callback(progress);
            }
        })
        .await
        .map(|_| ())
    }

    /// Run an FFmpeg command that writes to `-` and return its stdout.
    pub async fn run_capture(&self, cmd: &FfmpegCommand) -> MediaResult<Vec<u8>> {
        self.execute(cmd, |_| {}).await
    }

    async fn execute<F>(&self, cmd: &FfmpegCommand, on_stderr_line: F) -> MediaResult<Vec<u8>>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let args = cmd.build_args();
        execute(
            Invocation {
                tool: Tool::Ffmpeg,
                binary: &self.binary,
                args: &args,
                cancel_rx: self.cancel_rx.clone(),
                timeout_secs: self.timeout_secs,
            },
            on_stderr_line,
        )
        .await
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg(binary: &Path) -> MediaResult<PathBuf> {
    which::which(binary).map_err(|_| MediaError::FfmpegNotFound(binary.to_path_buf()))
}

/// Check if FFprobe is available.
pub fn check_ffprobe(binary: &Path) -> MediaResult<PathBuf> {
    which::which(binary).map_err(|_| MediaError::FfprobeNotFound(binary.to_path_buf()))
}
