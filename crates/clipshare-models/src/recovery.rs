//! Recovery sweep report.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Error text written on every row failed by the recovery sweep.
pub const INTERRUPTED_MESSAGE: &str =
    "Processing was interrupted by a server restart. Please try again.";

/// Found/updated counts for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepCount {
    pub found: usize,
    pub updated: usize,
}

/// Outcome of one recovery sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub workspaces: SweepCount,
    pub jobs: SweepCount,
    pub videos: SweepCount,
    /// Detection leases left behind by the previous process
    pub leases: SweepCount,
    pub ran_at: DateTime<Utc>,
}

impl RecoveryReport {
    pub fn empty() -> Self {
        Self {
            workspaces: SweepCount::default(),
            jobs: SweepCount::default(),
            videos: SweepCount::default(),
            leases: SweepCount::default(),
            ran_at: Utc::now(),
        }
    }

    pub fn total_updated(&self) -> usize {
        self.workspaces.updated + self.jobs.updated + self.videos.updated + self.leases.updated
    }
}
