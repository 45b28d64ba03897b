//! Shot-cut (scene change) records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseEnumError;
use crate::ids::WorkspaceId;

/// Lower bound applied to scene-filter scores.
pub const MIN_SCENE_CONFIDENCE: f64 = 0.3;
/// Upper bound applied to scene-filter scores.
pub const MAX_SCENE_CONFIDENCE: f64 = 0.95;

/// Which strategy produced a cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// ffprobe `select=gt(scene,T)` CSV output
    FfprobeScene,
    /// ffmpeg `metadata=print` output
    FfmpegScene,
    /// Grey-level histogram intersection of sampled frames
    FrameHistogram,
    /// JPEG byte-size ratio of sampled frames
    FrameSizeRatio,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::FfprobeScene => "ffprobe_scene",
            DetectionMethod::FfmpegScene => "ffmpeg_scene",
            DetectionMethod::FrameHistogram => "frame_histogram",
            DetectionMethod::FrameSizeRatio => "frame_size_ratio",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ffprobe_scene" => Ok(DetectionMethod::FfprobeScene),
            "ffmpeg_scene" => Ok(DetectionMethod::FfmpegScene),
            "frame_histogram" => Ok(DetectionMethod::FrameHistogram),
            "frame_size_ratio" => Ok(DetectionMethod::FrameSizeRatio),
            other => Err(ParseEnumError::new("detection method", other)),
        }
    }
}

/// A cut found by a detection strategy, before it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetectedCut {
    pub timestamp_ms: i64,
    pub confidence: f64,
    pub method: DetectionMethod,
}

impl DetectedCut {
    /// Cut reported by a scene filter; the score is clamped into the scene range.
    pub fn from_scene_score(time_secs: f64, score: f64, method: DetectionMethod) -> Self {
        Self {
            timestamp_ms: secs_to_ms(time_secs),
            confidence: clamp_scene_confidence(score),
            method,
        }
    }

    /// Cut reported by frame comparison; confidence is `1 - similarity`.
    pub fn from_similarity(time_secs: f64, similarity: f64, method: DetectionMethod) -> Self {
        Self {
            timestamp_ms: secs_to_ms(time_secs),
            confidence: (1.0 - similarity).clamp(0.0, 1.0),
            method,
        }
    }
}

/// Clamp a scene score into `[0.3, 0.95]`.
pub fn clamp_scene_confidence(score: f64) -> f64 {
    if score.is_nan() {
        return MIN_SCENE_CONFIDENCE;
    }
    score.clamp(MIN_SCENE_CONFIDENCE, MAX_SCENE_CONFIDENCE)
}

fn secs_to_ms(secs: f64) -> i64 {
    (secs.max(0.0) * 1000.0).round() as i64
}

/// A persisted shot cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShotCut {
    pub id: i64,
    pub workspace_id: WorkspaceId,
    pub timestamp_ms: i64,
    /// 0..1
    pub confidence: f64,
    pub detection_method: DetectionMethod,
    pub created_at: DateTime<Utc>,
}
