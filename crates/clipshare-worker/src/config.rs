//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use clipshare_media::command::DEFAULT_TIMEOUT_SECS;
use clipshare_media::scene::{
    DEFAULT_FRAME_INTERVAL_SECS, DEFAULT_SCENE_THRESHOLD, DEFAULT_SIMILARITY_THRESHOLD,
};
use clipshare_media::{SceneDetectionConfig, Toolchain};

/// Background service configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root of `processed-files/`
    pub data_dir: PathBuf,
    /// Quiet period before a bookmark edit is exported
    pub export_debounce: Duration,
    /// Scene score threshold for the filter-based detectors
    pub scene_threshold: f64,
    /// Sampling interval for frame comparison
    pub frame_interval_secs: f64,
    /// Frame similarity below which a cut is flagged
    pub frame_similarity_threshold: f64,
    /// Wall-clock limit for each ffmpeg/ffprobe child
    pub ffmpeg_timeout: Duration,
    /// Lifetime of a detection lease between heartbeats
    pub detection_lease: Duration,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            export_debounce: Duration::from_millis(1200),
            scene_threshold: DEFAULT_SCENE_THRESHOLD,
            frame_interval_secs: DEFAULT_FRAME_INTERVAL_SECS,
            frame_similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            ffmpeg_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            detection_lease: Duration::from_secs(120),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("CLIPSHARE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            export_debounce: env_parse("EXPORT_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.export_debounce),
            scene_threshold: env_parse("SCENE_THRESHOLD")
                .filter(|t: &f64| *t > 0.0 && *t < 1.0)
                .unwrap_or(defaults.scene_threshold),
            frame_interval_secs: env_parse("FRAME_INTERVAL_SECS")
                .filter(|s: &f64| *s > 0.0)
                .unwrap_or(defaults.frame_interval_secs),
            frame_similarity_threshold: env_parse("FRAME_SIMILARITY_THRESHOLD")
                .filter(|t: &f64| *t > 0.0 && *t <= 1.0)
                .unwrap_or(defaults.frame_similarity_threshold),
            ffmpeg_timeout: env_parse("FFMPEG_TIMEOUT_SECS")
                .filter(|s: &u64| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            detection_lease: env_parse("DETECTION_LEASE_SECS")
                .filter(|s: &u64| *s >= 3)
                .map(Duration::from_secs)
                .unwrap_or(defaults.detection_lease),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: std::env::var("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffprobe_path),
        }
    }

    pub fn toolchain(&self) -> Toolchain {
        Toolchain::new(
            &self.ffmpeg_path,
            &self.ffprobe_path,
            self.ffmpeg_timeout.as_secs(),
        )
    }

    pub fn detection_config(&self) -> SceneDetectionConfig {
        SceneDetectionConfig {
            scene_threshold: self.scene_threshold,
            frame_interval_secs: self.frame_interval_secs,
            similarity_threshold: self.frame_similarity_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.export_debounce, Duration::from_millis(1200));
        assert_eq!(config.ffmpeg_timeout, Duration::from_secs(3600));
        assert_eq!(config.detection_config(), SceneDetectionConfig::default());
        assert_eq!(config.toolchain().timeout_secs, 3600);
    }
}
