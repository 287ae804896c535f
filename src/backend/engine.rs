//! Backend engine trait definition.
//!
//! The declarative backend is a black box that turns an overlay into
//! provisioned infrastructure. The lifecycle executor only ever talks to it
//! through [`BackendEngine`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::overlay::OverlayArtifact;
use crate::state::StateBackendDescriptor;

/// Named outputs reported by the backend after apply.
pub type Outputs = BTreeMap<String, String>;

/// What a plan was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    /// Create or update infrastructure.
    Apply,
    /// Tear infrastructure down.
    Destroy,
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apply => f.write_str("apply"),
            Self::Destroy => f.write_str("destroy"),
        }
    }
}

/// Resource counts from a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    /// Whether the plan changes anything.
    pub has_changes: bool,
    /// Resources to add.
    pub add: u32,
    /// Resources to change in place.
    pub change: u32,
    /// Resources to destroy.
    pub destroy: u32,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_changes {
            write!(
                f,
                "{} to add, {} to change, {} to destroy",
                self.add, self.change, self.destroy
            )
        } else {
            f.write_str("no changes")
        }
    }
}

/// Operations the lifecycle executor drives.
///
/// Each call blocks until the backend finishes. The engine never retries.
#[async_trait]
pub trait BackendEngine: Send + Sync {
    /// Removes locally cached backend state so init starts clean.
    async fn clear_local_cache(&self) -> Result<()>;

    /// Initializes the backend against the remote state location.
    async fn init(&self, descriptor: &StateBackendDescriptor) -> Result<()>;

    /// Produces a plan for `overlay`, written to `out`.
    async fn plan(&self, overlay: &OverlayArtifact, mode: PlanMode, out: &Path)
        -> Result<PlanSummary>;

    /// Applies a saved plan and returns the backend's outputs.
    async fn apply(&self, plan_file: &Path, overlay: &OverlayArtifact) -> Result<Outputs>;

    /// Destroys everything managed under `overlay`.
    async fn destroy(&self, overlay: &OverlayArtifact) -> Result<()>;
}
