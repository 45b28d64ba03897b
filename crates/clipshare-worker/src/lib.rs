//! Background services of the Clipshare job subsystem.
//!
//! - `ShotCutService`: scene-change detection over a workspace's processed video
//! - `ClipExportService`: debounced, supersedable clip export per bookmark
//! - `RecoverySweep` / `StartupRecovery`: fail work orphaned by a restart
//!
//! Services report through `processing_jobs` rows and spawn their work on the
//! ambient tokio runtime.

pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod paths;
pub mod recovery;
pub mod shot_cut;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use export::ClipExportService;
pub use logging::JobLogger;
pub use paths::DataLayout;
pub use recovery::{RecoverySweep, StartupRecovery};
pub use shot_cut::{DetectionOutcome, ShotCutService};
