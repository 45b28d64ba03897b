//! FFmpeg `-progress` output.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Progress snapshot reported by `ffmpeg -progress pipe:2`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (1.5 = 1.5x realtime)
    pub speed: f64,
    /// `progress=end` was seen
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Progress as a percentage of the expected output duration.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if self.is_complete {
            return 100.0;
        }
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms.max(0) as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }

    /// Whole-number percentage, suitable for a job row.
    pub fn percent(&self, total_duration_ms: i64) -> u8 {
        self.percentage(total_duration_ms).floor() as u8
    }
}

/// Parse one line of `-progress` output into `current`.
///
/// Returns a snapshot at the end of each block (`progress=continue|end`).
/// `out_time_ms` and `out_time_us` are both microseconds despite the name.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_ms" | "out_time_us" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }
    None
}

/// True for `key=value` lines emitted by `-progress`, so they can be kept out
/// of captured error output.
pub fn is_progress_line(line: &str) -> bool {
    match line.split_once('=') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        None => false,
    }
}

/// Callback receiving whole-number progress percentages.
pub type PercentCallback = Arc<dyn Fn(u8) + Send + Sync + 'static>;

/// Callback that drops every update.
pub fn ignore_progress() -> PercentCallback {
    Arc::new(|_| {})
}
