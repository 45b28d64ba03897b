//! Bookmark edits and the clip window derived from them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ids::{BookmarkId, WorkspaceId};
use crate::job::ExportClipPayload;

/// Shortest clip ffmpeg is asked to produce, in seconds.
pub const MIN_CLIP_SECS: f64 = 0.1;

/// Upper bound for any bookmark offset (24 hours).
pub const MAX_BOOKMARK_MS: i64 = 86_400_000;

/// Range sent by a client when a bookmark is created or edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRange {
    /// Negative offsets are accepted and clamped to 0 when cutting.
    #[validate(range(min = -86_400_000, max = 86_400_000))]
    pub start_ms: i64,
    #[validate(range(min = 0, max = 86_400_000))]
    pub end_ms: i64,
}

/// A bookmark edit handed to the export pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkEdit {
    pub workspace_id: WorkspaceId,
    pub bookmark_id: BookmarkId,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl BookmarkEdit {
    pub fn new(workspace_id: WorkspaceId, bookmark_id: BookmarkId, range: BookmarkRange) -> Self {
        Self {
            workspace_id,
            bookmark_id,
            start_ms: range.start_ms,
            end_ms: range.end_ms,
        }
    }

    /// Key used to coalesce edits of the same bookmark.
    pub fn debounce_key(&self) -> String {
        format!("{}:{}", self.workspace_id, self.bookmark_id)
    }

    pub fn to_payload(&self) -> ExportClipPayload {
        ExportClipPayload {
            bookmark_id: self.bookmark_id.clone(),
            start_ms: self.start_ms,
            end_ms: self.end_ms,
            output_path: None,
        }
    }

    pub fn window(&self, source_duration_secs: Option<f64>) -> ClipWindow {
        ClipWindow::compute(self.start_ms, self.end_ms, source_duration_secs)
    }
}

/// Start/end of a clip in seconds, always non-negative and non-empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipWindow {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl ClipWindow {
    /// Derive the cut window from bookmark offsets.
    ///
    /// When the source duration is known, start is clamped into
    /// `[0, duration - MIN_CLIP_SECS]` and end to at most `duration`.
    pub fn compute(start_ms: i64, end_ms: i64, source_duration_secs: Option<f64>) -> Self {
        let mut start = (start_ms as f64 / 1000.0).max(0.0);
        let mut end = (end_ms as f64 / 1000.0).max(start + MIN_CLIP_SECS);

        if let Some(duration) = source_duration_secs.filter(|d| d.is_finite() && *d > 0.0) {
            start = start.min((duration - MIN_CLIP_SECS).max(0.0));
            end = end.min(duration).max(start + MIN_CLIP_SECS);
        }

        Self {
            start_secs: start,
            end_secs: end,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_negative_start_is_clamped_to_zero() {
        let window = ClipWindow::compute(-2_500, 3_000, None);
        assert_eq!(window.start_secs, 0.0);
        assert!(approx(window.end_secs, 3.0));
    }

    #[test]
    fn test_inverted_range_gets_minimum_length() {
        let window = ClipWindow::compute(5_000, 1_000, None);
        assert!(approx(window.start_secs, 5.0));
        assert!(approx(window.end_secs, 5.1));
    }

    #[test]
    fn test_window_clamped_to_source_duration() {
        let window = ClipWindow::compute(50_000, 90_000, Some(60.0));
        assert!(approx(window.start_secs, 50.0));
        assert!(approx(window.end_secs, 60.0));

        let past_end = ClipWindow::compute(70_000, 80_000, Some(60.0));
        assert!(approx(past_end.start_secs, 59.9));
        assert!(approx(past_end.end_secs, 60.0));
        assert!(past_end.duration_secs() >= MIN_CLIP_SECS - 1e-9);
    }

    #[test]
    fn test_unknown_duration_is_ignored() {
        let window = ClipWindow::compute(1_000, 2_000, Some(f64::NAN));
        assert!(approx(window.start_secs, 1.0));
        assert!(approx(window.end_secs, 2.0));
    }

    #[test]
    fn test_range_validation() {
        let ok = BookmarkRange {
            start_ms: -100,
            end_ms: 1_000,
        };
        assert!(ok.validate().is_ok());

        let bad = BookmarkRange {
            start_ms: 0,
            end_ms: MAX_BOOKMARK_MS + 1,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_debounce_key() {
        let edit = BookmarkEdit::new(
            WorkspaceId::from("ws"),
            BookmarkId::from("bm"),
            BookmarkRange {
                start_ms: 0,
                end_ms: 1,
            },
        );
        assert_eq!(edit.debounce_key(), "ws:bm");
        assert_eq!(edit.to_payload().bookmark_id.as_str(), "bm");
    }
}
