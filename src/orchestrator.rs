//! End-to-end deployment run.
//!
//! The orchestrator walks the lifecycle executor through one invocation:
//! validate, bootstrap the state backend, initialize, write the overlay,
//! plan, then apply or destroy. It never retries; the first failure ends the
//! run and is reported in the [`DeploymentResult`].

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::backend::{BackendEngine, Outputs, PlanMode, PlanSummary};
use crate::config::{DeploymentRequest, Settings, Tier};
use crate::error::Result;
use crate::lifecycle::{FailureReport, LifecycleExecutor, Phase};
use crate::overlay::ConfigurationOverlay;
use crate::prerequisites::PrerequisiteValidator;
use crate::state::{StateBackendDescriptor, StateProvider};

/// Outcome of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentResult {
    /// Run identifier.
    pub run_id: Uuid,
    /// Environment deployed.
    pub environment: String,
    /// Tier deployed.
    pub tier: Tier,
    /// Phase the run ended in.
    pub phase: Phase,
    /// Whether the run stopped after planning by request.
    pub dry_run: bool,
    /// Whether the run ended in a success terminus.
    pub success: bool,
    /// Why the run aborted.
    pub failure: Option<FailureReport>,
    /// Remote state location, once resolved.
    pub descriptor: Option<StateBackendDescriptor>,
    /// Overlay file written for the run.
    pub overlay_path: Option<PathBuf>,
    /// Plan resource counts.
    pub plan: Option<PlanSummary>,
    /// Backend outputs after apply.
    pub outputs: Outputs,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl DeploymentResult {
    /// Process exit code: 0 on success, else the failure category's code.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.success {
            0
        } else {
            self.failure.as_ref().map_or(1, |f| f.kind.exit_code())
        }
    }

    /// Run duration in whole seconds.
    #[must_use]
    pub fn duration_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

#[derive(Debug, Default)]
struct Progress {
    overlay_path: Option<PathBuf>,
    plan: Option<PlanSummary>,
    outputs: Outputs,
}

/// Runs one deployment invocation.
pub struct Orchestrator<'a, E, P> {
    settings: &'a Settings,
    validator: PrerequisiteValidator,
    executor: LifecycleExecutor<E, P>,
}

impl<E, P> std::fmt::Debug for Orchestrator<'_, E, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl<'a, E: BackendEngine, P: StateProvider> Orchestrator<'a, E, P> {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        settings: &'a Settings,
        validator: PrerequisiteValidator,
        executor: LifecycleExecutor<E, P>,
    ) -> Self {
        Self {
            settings,
            validator,
            executor,
        }
    }

    /// The lifecycle executor.
    #[must_use]
    pub const fn executor(&self) -> &LifecycleExecutor<E, P> {
        &self.executor
    }

    /// Runs `request` with its pre-generated `overlay`.
    ///
    /// Never fails: every failure ends up in the result.
    pub async fn run(
        &mut self,
        request: &DeploymentRequest,
        overlay: &ConfigurationOverlay,
    ) -> DeploymentResult {
        let started_at = Utc::now();
        info!(
            "Run {} started: {} on tier {}",
            self.executor.run_id(),
            request.environment,
            request.tier
        );

        let mut progress = Progress::default();
        if let Err(e) = self.drive(request, overlay, &mut progress).await {
            let e = self.executor.abort(e);
            error!("Run {} failed: {e}", self.executor.run_id());
        }
        self.executor.discard_plan().await;

        let phase = self.executor.phase();
        let dry_run = request.flags.dry_run && phase == Phase::Planned;
        let success = matches!(phase, Phase::Applied | Phase::Destroyed) || dry_run;

        let result = DeploymentResult {
            run_id: self.executor.run_id(),
            environment: request.environment.clone(),
            tier: request.tier,
            phase,
            dry_run,
            success,
            failure: self.executor.failure().cloned(),
            descriptor: self.executor.descriptor().cloned(),
            overlay_path: progress.overlay_path,
            plan: progress.plan,
            outputs: progress.outputs,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            "Run {} finished in {} after {}s",
            result.run_id,
            result.phase,
            result.duration_secs()
        );
        result
    }

    async fn drive(
        &mut self,
        request: &DeploymentRequest,
        overlay: &ConfigurationOverlay,
        progress: &mut Progress,
    ) -> Result<()> {
        if request.flags.skip_validation {
            self.executor.skip_validation()?;
        } else {
            self.executor.validate(&self.validator).await?;
        }

        self.executor.ensure_backend(request).await?;
        self.executor.initialize().await?;

        let artifact = overlay.write_to(&self.settings.overlay_dir()).await?;
        progress.overlay_path = Some(artifact.path.clone());

        let mode = if request.flags.destroy {
            PlanMode::Destroy
        } else {
            PlanMode::Apply
        };
        let plan = self.executor.plan(&artifact, mode).await?;
        progress.plan = Some(plan.summary);

        if request.flags.dry_run {
            info!("Dry run: stopping after plan {}", plan.id);
            return Ok(());
        }

        match mode {
            PlanMode::Apply => {
                progress.outputs = self.executor.apply(&plan, &artifact).await?;
            }
            PlanMode::Destroy => {
                self.executor
                    .destroy(&plan, &artifact, request.flags.auto_approve)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockCommandRunner;
    use crate::config::{ConfigRegistry, FeatureFlags};
    use crate::error::{BackendOperation, FailureKind};
    use crate::lifecycle::FixedConfirmation;
    use crate::overlay::{OverlayGenerator, SecretGenerator};
    use crate::prerequisites::MockToolLocator;
    use crate::state::{DescriptorStore, StateBackendBootstrapper};
    use crate::testing::{request, FakeEngine, FakeProvider};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn settings(temp: &TempDir) -> Settings {
        Settings {
            work_dir: temp.path().join(".tiered"),
            terraform_dir: temp.path().join("infra"),
            ..Settings::default()
        }
    }

    fn plan_files(temp: &TempDir) -> usize {
        std::fs::read_dir(settings(temp).plan_dir()).map_or(0, Iterator::count)
    }

    async fn run_with(
        temp: &TempDir,
        engine: FakeEngine,
        flags: FeatureFlags,
        confirm: bool,
    ) -> (DeploymentResult, FakeEngine) {
        let settings = settings(temp);
        let bootstrapper = StateBackendBootstrapper::new(
            FakeProvider::new(),
            DescriptorStore::with_base_dir(settings.descriptor_dir()),
            settings.state.clone(),
        );
        let executor = LifecycleExecutor::new(
            engine.clone(),
            bootstrapper,
            Box::new(FixedConfirmation(confirm)),
            settings.plan_dir(),
        );
        let mut locator = MockToolLocator::new();
        locator.expect_locate().returning(|_| None);
        let validator = PrerequisiteValidator::new(Arc::new(MockCommandRunner::new()), Box::new(locator));

        let request = request(Tier::Large, "prod", flags);
        let registry = ConfigRegistry::new();
        let overlay = OverlayGenerator::new("tiered")
            .with_secret_generator(SecretGenerator::seeded(9))
            .generate(registry.get(request.tier), &request);

        let mut orchestrator = Orchestrator::new(&settings, validator, executor);
        (orchestrator.run(&request, &overlay).await, engine)
    }

    #[tokio::test]
    async fn test_apply_run() {
        let temp = TempDir::new().expect("temp dir");
        let (result, engine) =
            run_with(&temp, FakeEngine::new(temp.path().join("state")), FeatureFlags::default(), false)
                .await;

        assert!(result.success, "{:?}", result.failure);
        assert_eq!(result.phase, Phase::Applied);
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.descriptor.as_ref().unwrap().account, "sttfstateprod");
        assert!(result.overlay_path.as_ref().unwrap().ends_with("prod.tiered.tfvars.json"));
        assert!(result.outputs.contains_key("cluster_name"));
        assert_eq!(engine.calls(), ["clear", "init", "plan", "apply"]);
    }

    #[tokio::test]
    async fn test_dry_run_stops_at_planned() {
        let temp = TempDir::new().expect("temp dir");
        let flags = FeatureFlags {
            dry_run: true,
            ..FeatureFlags::default()
        };
        let (result, engine) =
            run_with(&temp, FakeEngine::new(temp.path().join("state")), flags, false).await;

        assert!(result.success);
        assert!(result.dry_run);
        assert_eq!(result.phase, Phase::Planned);
        assert_eq!(result.exit_code(), 0);
        assert!(!engine.calls().contains(&String::from("apply")));
    }

    #[tokio::test]
    async fn test_validation_runs_unless_skipped() {
        let temp = TempDir::new().expect("temp dir");
        let flags = FeatureFlags {
            skip_validation: false,
            ..FeatureFlags::default()
        };
        let (result, engine) = run_with(&temp, FakeEngine::new(temp.path().join("state")), flags, false).await;

        // The validator in these tests has no checks, so it passes.
        assert!(result.success);
        assert_eq!(engine.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_unconfirmed_destroy_exit_code() {
        let temp = TempDir::new().expect("temp dir");
        let flags = FeatureFlags {
            destroy: true,
            ..FeatureFlags::default()
        };
        let (result, engine) =
            run_with(&temp, FakeEngine::new(temp.path().join("state")), flags, false).await;

        assert!(!result.success);
        assert_eq!(result.phase, Phase::Aborted);
        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::DestroyNotConfirmed);
        assert_eq!(failure.phase, Phase::Planned);
        assert_eq!(result.exit_code(), FailureKind::DestroyNotConfirmed.exit_code());
        assert!(!engine.calls().contains(&String::from("destroy")));
    }

    #[tokio::test]
    async fn test_auto_approved_destroy() {
        let temp = TempDir::new().expect("temp dir");
        let flags = FeatureFlags {
            destroy: true,
            auto_approve: true,
            ..FeatureFlags::default()
        };
        let (result, _) = run_with(&temp, FakeEngine::new(temp.path().join("state")), flags, false).await;
        assert_eq!(result.phase, Phase::Destroyed);
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_apply_failure_is_reported_as_is() {
        let temp = TempDir::new().expect("temp dir");
        let engine = FakeEngine::new(temp.path().join("state")).failing(BackendOperation::Apply);
        let (result, engine) = run_with(&temp, engine, FeatureFlags::default(), false).await;

        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::ApplyFailure);
        assert_eq!(failure.phase, Phase::Planned);
        assert!(failure.message.contains("apply exploded"));
        assert!(!failure.retryable);
        assert!(result.descriptor.is_some());
        assert_eq!(result.exit_code(), FailureKind::ApplyFailure.exit_code());
        // No compensating destroy.
        assert_eq!(engine.calls().last().map(String::as_str), Some("apply"));
    }

    #[tokio::test]
    async fn test_dry_run_leaves_no_plan_file() {
        let temp = TempDir::new().expect("temp dir");
        let flags = FeatureFlags {
            dry_run: true,
            ..FeatureFlags::default()
        };
        let (result, _) = run_with(&temp, FakeEngine::new(temp.path().join("state")), flags, false).await;

        assert_eq!(result.phase, Phase::Planned);
        assert!(result.plan.is_some());
        assert_eq!(plan_files(&temp), 0);
    }

    #[tokio::test]
    async fn test_failed_apply_leaves_no_plan_file() {
        let temp = TempDir::new().expect("temp dir");
        let engine = FakeEngine::new(temp.path().join("state")).failing(BackendOperation::Apply);
        let (result, _) = run_with(&temp, engine, FeatureFlags::default(), false).await;

        assert_eq!(result.phase, Phase::Aborted);
        assert_eq!(plan_files(&temp), 0);
    }

    #[tokio::test]
    async fn test_unconfirmed_destroy_leaves_no_plan_file() {
        let temp = TempDir::new().expect("temp dir");
        let flags = FeatureFlags {
            destroy: true,
            ..FeatureFlags::default()
        };
        let (result, _) = run_with(&temp, FakeEngine::new(temp.path().join("state")), flags, false).await;

        assert_eq!(result.phase, Phase::Aborted);
        assert_eq!(plan_files(&temp), 0);
    }
}
