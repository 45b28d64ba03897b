//! Clip encoding settings.
//!
//! A clip is first cut with a stream copy. If the container refuses the copy
//! (odd keyframe layout, unsupported codec in MP4), the cut is retried with a
//! fast software re-encode.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Video codec used by the re-encode fallback
pub const FALLBACK_VIDEO_CODEC: &str = "libx264";
/// Audio codec used by the re-encode fallback
pub const FALLBACK_AUDIO_CODEC: &str = "aac";
/// Preset used by the re-encode fallback
pub const FALLBACK_PRESET: &str = "ultrafast";
/// CRF used by the re-encode fallback
pub const FALLBACK_CRF: u8 = 18;

/// How ffmpeg should produce the clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMode {
    /// `-c copy`, no decode
    StreamCopy,
    /// Full decode and re-encode
    Reencode,
}

/// Clip encoding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    pub mode: EncodingMode,

    /// Video codec (re-encode only)
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (re-encode only)
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (re-encode only)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Audio codec (re-encode only)
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
}

fn default_video_codec() -> String {
    FALLBACK_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    FALLBACK_PRESET.to_string()
}
fn default_crf() -> u8 {
    FALLBACK_CRF
}
fn default_audio_codec() -> String {
    FALLBACK_AUDIO_CODEC.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self::stream_copy()
    }
}

impl EncodingConfig {
    /// Stream copy, the first attempt for every clip.
    pub fn stream_copy() -> Self {
        Self {
            mode: EncodingMode::StreamCopy,
            codec: default_video_codec(),
            preset: default_preset(),
            crf: FALLBACK_CRF,
            audio_codec: default_audio_codec(),
        }
    }

    /// Re-encode used when stream copy fails.
    pub fn reencode() -> Self {
        Self {
            mode: EncodingMode::Reencode,
            ..Self::stream_copy()
        }
    }

    pub fn is_stream_copy(&self) -> bool {
        self.mode == EncodingMode::StreamCopy
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        match self.mode {
            EncodingMode::StreamCopy => vec![
                "-c".to_string(),
                "copy".to_string(),
                "-avoid_negative_ts".to_string(),
                "make_zero".to_string(),
            ],
            EncodingMode::Reencode => vec![
                "-c:v".to_string(),
                self.codec.clone(),
                "-preset".to_string(),
                self.preset.clone(),
                "-crf".to_string(),
                self.crf.to_string(),
                "-c:a".to_string(),
                self.audio_codec.clone(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_copy_args() {
        let args = EncodingConfig::stream_copy().to_ffmpeg_args();
        assert_eq!(args, vec!["-c", "copy", "-avoid_negative_ts", "make_zero"]);
    }

    #[test]
    fn test_reencode_args() {
        let config = EncodingConfig::reencode();
        assert!(!config.is_stream_copy());

        let args = config.to_ffmpeg_args();
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"ultrafast".to_string()));
        assert!(args.contains(&"18".to_string()));
        assert!(args.contains(&"aac".to_string()));
        assert!(!args.contains(&"copy".to_string()));
    }
}
