//! Shot-cut detection strategies.
//!
//! Three strategies, cheapest first:
//! 1. ffprobe with the `select=gt(scene,T)` lavfi graph, CSV output
//! 2. ffmpeg with the same filter and `metadata=print` to stdout
//! 3. frames sampled every few seconds, compared by grey-level histogram
//!    (or by JPEG size when the histogram pass fails)
//!
//! Callers try them in order. Every strategy falls through on error; only
//! the ffprobe pass also falls through when it finds nothing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use clipshare_models::{DetectedCut, DetectionMethod};

use crate::command::{execute, FfmpegCommand, Invocation, Tool, Toolchain};
use crate::error::{MediaError, MediaResult};
use crate::histogram::{grey_histogram, histogram_intersection, size_ratio};

/// Default scene score threshold.
pub const DEFAULT_SCENE_THRESHOLD: f64 = 0.3;
/// Default sampling interval for frame comparison.
pub const DEFAULT_FRAME_INTERVAL_SECS: f64 = 2.0;
/// Default similarity below which consecutive frames count as a cut.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Side of the square grey thumbnail used for histograms.
const HISTOGRAM_SIDE: usize = 64;

/// Tunables for the built-in strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneDetectionConfig {
    pub scene_threshold: f64,
    pub frame_interval_secs: f64,
    pub similarity_threshold: f64,
}

impl Default for SceneDetectionConfig {
    fn default() -> Self {
        Self {
            scene_threshold: DEFAULT_SCENE_THRESHOLD,
            frame_interval_secs: DEFAULT_FRAME_INTERVAL_SECS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// A way of finding shot cuts in a video file.
#[async_trait]
pub trait ShotCutStrategy: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Whether an empty result is a real answer (single-shot video) rather
    /// than a reason to try the next strategy.
    fn trusts_empty_result(&self) -> bool {
        false
    }

    async fn detect(&self, input: &Path) -> MediaResult<Vec<DetectedCut>>;
}

/// The built-in strategies in fallback order.
pub fn default_strategies(
    tools: &Toolchain,
    config: SceneDetectionConfig,
) -> Vec<Box<dyn ShotCutStrategy>> {
    vec![
        Box::new(FfprobeSceneStrategy::new(tools.clone(), config.scene_threshold)),
        Box::new(FfmpegSceneStrategy::new(tools.clone(), config.scene_threshold)),
        Box::new(FrameDiffStrategy::new(
            tools.clone(),
            config.frame_interval_secs,
            config.similarity_threshold,
        )),
    ]
}

/// Scene scores via `ffprobe -f lavfi movie=...`.
pub struct FfprobeSceneStrategy {
    tools: Toolchain,
    threshold: f64,
}

impl FfprobeSceneStrategy {
    pub fn new(tools: Toolchain, threshold: f64) -> Self {
        Self { tools, threshold }
    }

    fn build_args(&self, input: &Path) -> Vec<String> {
        let graph = format!(
            "movie={},select=gt(scene\\,{})",
            escape_filter_path(input),
            self.threshold
        );
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "lavfi".to_string(),
            graph,
            "-show_entries".to_string(),
            "frame=pts_time:frame_tags=lavfi.scene_score".to_string(),
            "-of".to_string(),
            "csv=p=0".to_string(),
        ]
    }
}

#[async_trait]
impl ShotCutStrategy for FfprobeSceneStrategy {
    fn name(&self) -> &'static str {
        "ffprobe_scene"
    }

    async fn detect(&self, input: &Path) -> MediaResult<Vec<DetectedCut>> {
        let args = self.build_args(input);
        let stdout = execute(
            Invocation {
                tool: Tool::Ffprobe,
                binary: &self.tools.ffprobe,
                args: &args,
                cancel_rx: None,
                timeout_secs: Some(self.tools.timeout_secs),
            },
            |_| {},
        )
        .await?;

        Ok(parse_ffprobe_scene_csv(&String::from_utf8_lossy(&stdout)))
    }
}

/// Scene scores via ffmpeg's `metadata=print` filter.
pub struct FfmpegSceneStrategy {
    tools: Toolchain,
    threshold: f64,
}

impl FfmpegSceneStrategy {
    pub fn new(tools: Toolchain, threshold: f64) -> Self {
        Self { tools, threshold }
    }

    fn build_command(&self, input: &Path) -> FfmpegCommand {
        FfmpegCommand::new(input, "-")
            .video_filter(format!(
                "select='gt(scene,{})',metadata=print:file=-",
                self.threshold
            ))
            .no_audio()
            .format("null")
    }
}

#[async_trait]
impl ShotCutStrategy for FfmpegSceneStrategy {
    fn name(&self) -> &'static str {
        "ffmpeg_scene"
    }

    fn trusts_empty_result(&self) -> bool {
        true
    }

    async fn detect(&self, input: &Path) -> MediaResult<Vec<DetectedCut>> {
        let stdout = self
            .tools
            .ffmpeg_runner()
            .run_capture(&self.build_command(input))
            .await?;
        Ok(parse_ffmpeg_metadata(&String::from_utf8_lossy(&stdout)))
    }
}

/// Sampled-frame comparison.
pub struct FrameDiffStrategy {
    tools: Toolchain,
    interval_secs: f64,
    similarity_threshold: f64,
}

impl FrameDiffStrategy {
    pub fn new(tools: Toolchain, interval_secs: f64, similarity_threshold: f64) -> Self {
        Self {
            tools,
            interval_secs: if interval_secs > 0.0 {
                interval_secs
            } else {
                DEFAULT_FRAME_INTERVAL_SECS
            },
            similarity_threshold,
        }
    }

    /// Write one JPEG per interval into `dir`, returning them in time order.
    async fn extract_frames(&self, input: &Path, dir: &Path) -> MediaResult<Vec<PathBuf>> {
        let pattern = dir.join("frame_%06d.jpg");
        let cmd = FfmpegCommand::new(input, &pattern)
            .video_filter(format!("fps=1/{}", self.interval_secs))
            .output_args(["-q:v", "5"])
            .no_audio();
        self.tools.ffmpeg_runner().run(&cmd).await?;

        let mut frames = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jpg") {
                frames.push(path);
            }
        }
        frames.sort();
        Ok(frames)
    }

    /// Decode every sampled frame to a small grey thumbnail in one pass.
    async fn grey_histograms(&self, dir: &Path, frame_count: usize) -> MediaResult<Vec<Vec<f32>>> {
        let cmd = FfmpegCommand::new(dir.join("frame_%06d.jpg"), "-")
            .video_filter(format!("scale={0}:{0},format=gray", HISTOGRAM_SIDE))
            .format("rawvideo");
        let raw = self.tools.ffmpeg_runner().run_capture(&cmd).await?;

        let frame_bytes = HISTOGRAM_SIDE * HISTOGRAM_SIDE;
        if raw.len() != frame_bytes * frame_count {
            return Err(MediaError::detection_failed(format!(
                "expected {} grey frames, got {} bytes",
                frame_count,
                raw.len()
            )));
        }
        Ok(raw.chunks_exact(frame_bytes).map(grey_histogram).collect())
    }

    async fn frame_sizes(&self, frames: &[PathBuf]) -> MediaResult<Vec<u64>> {
        let mut sizes = Vec::with_capacity(frames.len());
        for frame in frames {
            sizes.push(tokio::fs::metadata(frame).await?.len());
        }
        Ok(sizes)
    }
}

#[async_trait]
impl ShotCutStrategy for FrameDiffStrategy {
    fn name(&self) -> &'static str {
        "frame_diff"
    }

    fn trusts_empty_result(&self) -> bool {
        true
    }

    async fn detect(&self, input: &Path) -> MediaResult<Vec<DetectedCut>> {
        let scratch = tempfile::Builder::new()
            .prefix("clipshare-frames-")
            .tempdir()?;
        let frames = self.extract_frames(input, scratch.path()).await?;
        if frames.is_empty() {
            return Err(MediaError::detection_failed("no frames extracted"));
        }
        debug!(frames = frames.len(), "Sampled frames for comparison");

        let similarities = match self.grey_histograms(scratch.path(), frames.len()).await {
            Ok(histograms) => FrameSimilarities::Histogram(
                histograms
                    .windows(2)
                    .map(|pair| histogram_intersection(&pair[0], &pair[1]))
                    .collect(),
            ),
            Err(e) => {
                warn!("Histogram extraction failed, comparing frame sizes: {}", e);
                let sizes = self.frame_sizes(&frames).await?;
                FrameSimilarities::SizeRatio(
                    sizes.windows(2).map(|pair| size_ratio(pair[0], pair[1])).collect(),
                )
            }
        };

        Ok(cuts_from_similarities(
            &similarities,
            self.interval_secs,
            self.similarity_threshold,
        ))
    }
}

/// Similarity of each consecutive frame pair and how it was measured.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSimilarities {
    Histogram(Vec<f64>),
    SizeRatio(Vec<f64>),
}

/// Flag a cut wherever similarity drops below `threshold`, stamped at the later
/// frame of the pair.
pub fn cuts_from_similarities(
    similarities: &FrameSimilarities,
    interval_secs: f64,
    threshold: f64,
) -> Vec<DetectedCut> {
    let (values, method) = match similarities {
        FrameSimilarities::Histogram(v) => (v, DetectionMethod::FrameHistogram),
        FrameSimilarities::SizeRatio(v) => (v, DetectionMethod::FrameSizeRatio),
    };

    values
        .iter()
        .enumerate()
        .filter(|(_, similarity)| **similarity < threshold)
        .map(|(i, similarity)| {
            DetectedCut::from_similarity((i + 1) as f64 * interval_secs, *similarity, method)
        })
        .collect()
}

/// Parse `ffprobe ... -of csv=p=0` rows of `pts_time,scene_score`.
pub fn parse_ffprobe_scene_csv(output: &str) -> Vec<DetectedCut> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .collect();
            if fields.len() < 2 {
                return None;
            }
            let time: f64 = fields[0].parse().ok()?;
            let score: f64 = fields[fields.len() - 1].parse().ok()?;
            Some(DetectedCut::from_scene_score(
                time,
                score,
                DetectionMethod::FfprobeScene,
            ))
        })
        .collect()
}

/// Parse `metadata=print` output: a `frame:.. pts:.. pts_time:T` header
/// followed by `lavfi.scene_score=S`.
pub fn parse_ffmpeg_metadata(output: &str) -> Vec<DetectedCut> {
    let mut cuts = Vec::new();
    let mut current_time: Option<f64> = None;

    for line in output.lines() {
        let line = line.trim();
        if let Some(idx) = line.find("pts_time:") {
            current_time = line[idx + "pts_time:".len()..]
                .split_whitespace()
                .next()
                .and_then(|t| t.parse().ok());
        } else if let Some(score) = line.strip_prefix("lavfi.scene_score=") {
            if let (Some(time), Ok(score)) = (current_time.take(), score.trim().parse::<f64>()) {
                cuts.push(DetectedCut::from_scene_score(
                    time,
                    score,
                    DetectionMethod::FfmpegScene,
                ));
            }
        }
    }

    cuts
}

/// Escape a file path for use as the `movie=` source inside a lavfi graph.
///
/// Two levels apply: the filter option value, then the graph itself.
pub fn escape_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();

    let mut option = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option.push('\\');
        }
        option.push(c);
    }

    let mut graph = String::with_capacity(option.len());
    for c in option.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph.push('\\');
        }
        graph.push(c);
    }
    graph
}
