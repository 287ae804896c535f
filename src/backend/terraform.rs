//! Terraform backend engine.
//!
//! Drives the `terraform` binary inside the directory holding the resource
//! modules. Secret handles are dereferenced here and nowhere else: they reach
//! the child process as `TF_VAR_<name>` environment variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{BackendError, BackendOperation, DeployError, Result};
use crate::overlay::OverlayArtifact;
use crate::state::StateBackendDescriptor;

use super::command::{CommandOutput, CommandRunner, Invocation};
use super::engine::{BackendEngine, Outputs, PlanMode, PlanSummary};

/// Marker terraform prints when another process holds the state lock.
const STATE_LOCK_MARKER: &str = "Error acquiring the state lock";

/// Local cache directory terraform keeps next to the modules.
const CACHE_DIR: &str = ".terraform";

/// `-detailed-exitcode` status meaning "changes present".
const EXIT_CHANGES: i32 = 2;

/// [`BackendEngine`] backed by the terraform CLI.
#[derive(Clone)]
pub struct TerraformEngine {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    dir: PathBuf,
}

impl std::fmt::Debug for TerraformEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerraformEngine")
            .field("binary", &self.binary)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl TerraformEngine {
    /// Creates an engine running `terraform` in `dir`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: String::from("terraform"),
            dir: dir.into(),
        }
    }

    /// Uses a different terraform binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Directory the modules live in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Arguments for `terraform init`.
    #[must_use]
    pub fn init_args(descriptor: &StateBackendDescriptor) -> Vec<String> {
        let mut args = vec![
            String::from("init"),
            String::from("-input=false"),
            String::from("-reconfigure"),
        ];
        args.extend(
            descriptor
                .backend_config()
                .into_iter()
                .map(|(key, value)| format!("-backend-config={key}={value}")),
        );
        args
    }

    /// Arguments for `terraform plan`.
    #[must_use]
    pub fn plan_args(var_file: &Path, out: &Path, mode: PlanMode) -> Vec<String> {
        let mut args = vec![
            String::from("plan"),
            String::from("-input=false"),
            String::from("-detailed-exitcode"),
            format!("-var-file={}", var_file.display()),
            format!("-out={}", out.display()),
        ];
        if mode == PlanMode::Destroy {
            args.push(String::from("-destroy"));
        }
        args
    }

    /// Arguments for `terraform apply` of a saved plan.
    #[must_use]
    pub fn apply_args(plan_file: &Path) -> Vec<String> {
        vec![
            String::from("apply"),
            String::from("-input=false"),
            String::from("-auto-approve"),
            plan_file.display().to_string(),
        ]
    }

    /// Arguments for `terraform destroy`.
    #[must_use]
    pub fn destroy_args(var_file: &Path) -> Vec<String> {
        vec![
            String::from("destroy"),
            String::from("-input=false"),
            String::from("-auto-approve"),
            format!("-var-file={}", var_file.display()),
        ]
    }

    fn invocation(&self, args: Vec<String>, overlay: Option<&OverlayArtifact>) -> Invocation {
        let mut invocation = Invocation::new(self.binary.clone(), args)
            .in_dir(&self.dir)
            .with_env("TF_IN_AUTOMATION", "1");
        if let Some(artifact) = overlay {
            for secret in artifact.overlay.secrets() {
                invocation = invocation.with_env(format!("TF_VAR_{}", secret.name()), secret.expose());
            }
        }
        invocation
    }

    async fn run(
        &self,
        operation: BackendOperation,
        invocation: Invocation,
    ) -> Result<CommandOutput> {
        let output = self.runner.run(&invocation).await?;
        debug!(%operation, exit_code = ?output.exit_code, "terraform finished");
        Ok(output)
    }
}

/// Classifies a failed command as a backend error.
fn failure(operation: BackendOperation, output: &CommandOutput) -> DeployError {
    let message = output.diagnostic();
    if output.stderr.contains(STATE_LOCK_MARKER) || output.stdout.contains(STATE_LOCK_MARKER) {
        warn!("{operation}: remote state is locked by another process");
        BackendError::locked(operation, message).into()
    } else {
        BackendError::new(operation, message).into()
    }
}

/// Makes a path usable from the module directory.
fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// Parses the `Plan: X to add, Y to change, Z to destroy.` line.
///
/// # Errors
///
/// Returns an error if the summary regex cannot be compiled.
pub fn parse_plan_summary(output: &str) -> Result<PlanSummary> {
    let re = Regex::new(r"Plan: (\d+) to add, (\d+) to change, (\d+) to destroy")
        .map_err(|e| DeployError::internal(format!("failed to compile plan regex: {e}")))?;

    let Some(caps) = re.captures(output) else {
        return Ok(PlanSummary::default());
    };
    let count = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
    let summary = PlanSummary {
        has_changes: true,
        add: count(1),
        change: count(2),
        destroy: count(3),
    };
    Ok(summary)
}

#[derive(Debug, Deserialize)]
struct OutputEntry {
    #[serde(default)]
    sensitive: bool,
    value: serde_json::Value,
}

/// Parses `terraform output -json`, dropping sensitive outputs.
///
/// # Errors
///
/// Returns an error if the output is not the expected JSON object.
pub fn parse_outputs(json: &str) -> Result<Outputs> {
    if json.trim().is_empty() {
        return Ok(Outputs::new());
    }
    let entries: std::collections::BTreeMap<String, OutputEntry> = serde_json::from_str(json)
        .map_err(|e| BackendError::new(BackendOperation::Output, format!("invalid JSON: {e}")))?;

    Ok(entries
        .into_iter()
        .filter(|(name, entry)| {
            if entry.sensitive {
                debug!("Omitting sensitive output {name}");
            }
            !entry.sensitive
        })
        .map(|(name, entry)| {
            let value = match entry.value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect())
}

#[async_trait]
impl BackendEngine for TerraformEngine {
    async fn clear_local_cache(&self) -> Result<()> {
        let cache = self.dir.join(CACHE_DIR);
        if fs::try_exists(&cache).await? {
            info!("Clearing local backend cache {}", cache.display());
            fs::remove_dir_all(&cache).await?;
        }
        Ok(())
    }

    async fn init(&self, descriptor: &StateBackendDescriptor) -> Result<()> {
        info!("Initializing backend against {}/{}", descriptor.account, descriptor.key);
        let invocation = self.invocation(Self::init_args(descriptor), None);
        let output = self.run(BackendOperation::Init, invocation).await?;
        if !output.success() {
            return Err(failure(BackendOperation::Init, &output));
        }
        Ok(())
    }

    async fn plan(
        &self,
        overlay: &OverlayArtifact,
        mode: PlanMode,
        out: &Path,
    ) -> Result<PlanSummary> {
        let args = Self::plan_args(&absolute(&overlay.path)?, &absolute(out)?, mode);
        let output = self
            .run(BackendOperation::Plan, self.invocation(args, Some(overlay)))
            .await?;

        match output.exit_code {
            Some(0) => {
                info!("Plan ({mode}): no changes");
                Ok(PlanSummary::default())
            }
            Some(EXIT_CHANGES) => {
                let summary = parse_plan_summary(&output.stdout)?;
                info!("Plan ({mode}): {summary}");
                Ok(PlanSummary {
                    has_changes: true,
                    ..summary
                })
            }
            _ => Err(failure(BackendOperation::Plan, &output)),
        }
    }

    async fn apply(&self, plan_file: &Path, overlay: &OverlayArtifact) -> Result<Outputs> {
        let args = Self::apply_args(&absolute(plan_file)?);
        let output = self
            .run(BackendOperation::Apply, self.invocation(args, Some(overlay)))
            .await?;
        if !output.success() {
            return Err(failure(BackendOperation::Apply, &output));
        }

        let args = vec![String::from("output"), String::from("-json")];
        let output = self
            .run(BackendOperation::Output, self.invocation(args, None))
            .await?;
        if !output.success() {
            return Err(failure(BackendOperation::Output, &output));
        }
        parse_outputs(&output.stdout)
    }

    async fn destroy(&self, overlay: &OverlayArtifact) -> Result<()> {
        let args = Self::destroy_args(&absolute(&overlay.path)?);
        let output = self
            .run(BackendOperation::Destroy, self.invocation(args, Some(overlay)))
            .await?;
        if !output.success() {
            return Err(failure(BackendOperation::Destroy, &output));
        }
        info!("Destroyed environment {}", overlay.overlay.environment());
        Ok(())
    }
}
