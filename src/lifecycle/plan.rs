//! Plan artifacts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::backend::{PlanMode, PlanSummary};

/// A backend plan bound to the overlay it was produced from.
///
/// Applied at most once, and only while it is the latest plan of its run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanArtifact {
    /// Unique plan identifier.
    pub id: Uuid,
    /// Run that produced the plan.
    pub run_id: Uuid,
    /// What the plan does.
    pub mode: PlanMode,
    /// Plan file written by the backend.
    pub path: PathBuf,
    /// Digest of the overlay file the plan was made from.
    pub overlay_digest: String,
    /// Resource counts.
    pub summary: PlanSummary,
    /// When the plan was produced.
    pub created_at: DateTime<Utc>,
}

impl PlanArtifact {
    /// Creates an artifact record for a freshly written plan.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        mode: PlanMode,
        path: PathBuf,
        overlay_digest: impl Into<String>,
        summary: PlanSummary,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            mode,
            path,
            overlay_digest: overlay_digest.into(),
            summary,
            created_at: Utc::now(),
        }
    }

    /// Plan file location for an environment and run.
    #[must_use]
    pub fn file_path(dir: &Path, environment: &str, run_id: Uuid) -> PathBuf {
        dir.join(format!("{environment}-{run_id}.tfplan"))
    }
}
