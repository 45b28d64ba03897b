//! Shared data models for the Clipshare job subsystem.
//!
//! This crate provides Serde-serializable types for:
//! - Processing jobs and their payloads
//! - Shot cuts and detection methods
//! - Workspaces, videos and bookmark edits
//! - Clip encoding settings
//! - Recovery sweep reports

pub mod bookmark;
pub mod encoding;
pub mod error;
pub mod ids;
pub mod job;
pub mod recovery;
pub mod shot_cut;
pub mod workspace;

// Re-export common types
pub use bookmark::{BookmarkEdit, BookmarkRange, ClipWindow, MIN_CLIP_SECS};
pub use encoding::{EncodingConfig, EncodingMode};
pub use error::ParseEnumError;
pub use ids::{is_safe_path_segment, BookmarkId, JobId, VideoId, WorkspaceId};
pub use job::{
    ExportClipPayload, JobStatus, JobType, ProcessingJob, ShotCutDetectionResult,
    SUPERSEDED_REASON,
};
pub use recovery::{RecoveryReport, SweepCount, INTERRUPTED_MESSAGE};
pub use shot_cut::{clamp_scene_confidence, DetectedCut, DetectionMethod, ShotCut};
pub use workspace::{ProcessingStatus, Video, Workspace};
