//! FFmpeg CLI wrapper for the Clipshare job subsystem.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Process execution with timeout, cancellation and `-progress pipe:2` parsing
//! - FFprobe video information
//! - Clip cutting (stream copy with re-encode fallback)
//! - Shot-cut detection strategies and their output parsers

pub mod clip;
pub mod command;
pub mod error;
pub mod histogram;
pub mod probe;
pub mod progress;
pub mod scene;

pub use clip::{ClipCutter, CutOutcome, CutRequest, FfmpegClipCutter};
pub use command::{check_ffmpeg, check_ffprobe, wait_cancelled, FfmpegCommand, FfmpegRunner, Toolchain};
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_video, VideoInfo};
pub use progress::{ignore_progress, FfmpegProgress, PercentCallback};
pub use scene::{
    default_strategies, FfmpegSceneStrategy, FfprobeSceneStrategy, FrameDiffStrategy,
    SceneDetectionConfig, ShotCutStrategy,
};
