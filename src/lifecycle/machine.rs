//! The deployment lifecycle state machine.
//!
//! ```text
//! Idle -> Validated -> BackendReady -> Initialized -> Planned -> Applied
//!                                                            -> Destroyed
//! (any non-terminal phase) -> Aborted
//! ```
//!
//! Each transition is a method that checks the current phase first. A
//! failing backend operation moves the machine to `Aborted` and records a
//! [`FailureReport`]. Terminal phases accept no further transitions.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendEngine, Outputs, PlanMode};
use crate::config::DeploymentRequest;
use crate::error::{BackendOperation, DeployError, FailureKind, LifecycleError, Result};
use crate::overlay::OverlayArtifact;
use crate::prerequisites::PrerequisiteValidator;
use crate::state::{StateBackendBootstrapper, StateBackendDescriptor, StateProvider};

use super::confirm::ConfirmationProvider;
use super::plan::PlanArtifact;

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// Nothing has happened yet.
    Idle,
    /// Prerequisites passed or were skipped.
    Validated,
    /// Remote state location exists.
    BackendReady,
    /// Backend initialized against the remote state.
    Initialized,
    /// A plan artifact exists.
    Planned,
    /// The plan was applied.
    Applied,
    /// The environment was destroyed.
    Destroyed,
    /// The run stopped on a failure or a refused confirmation.
    Aborted,
}

impl Phase {
    /// Whether no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Destroyed | Self::Aborted)
    }

    /// Phase name as shown in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Validated => "Validated",
            Self::BackendReady => "BackendReady",
            Self::Initialized => "Initialized",
            Self::Planned => "Planned",
            Self::Applied => "Applied",
            Self::Destroyed => "Destroyed",
            Self::Aborted => "Aborted",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    /// Failure category.
    pub kind: FailureKind,
    /// Phase the machine was in when the failure happened.
    pub phase: Phase,
    /// Top-level message.
    pub message: String,
    /// Individual blockers or backend lines.
    pub details: Vec<String>,
    /// Whether re-invoking later may succeed unchanged.
    pub retryable: bool,
}

impl FailureReport {
    /// Builds a report for `error` raised in `phase`.
    #[must_use]
    pub fn from_error(error: &DeployError, phase: Phase) -> Self {
        let details = match error {
            DeployError::Validation(e) => e.failures.iter().map(ToString::to_string).collect(),
            DeployError::Backend(e) => e
                .message
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        };
        Self {
            kind: error.kind(),
            phase,
            message: error.to_string(),
            details,
            retryable: error.is_retryable(),
        }
    }
}

/// Drives the backend through the lifecycle for one invocation.
pub struct LifecycleExecutor<E, P> {
    engine: E,
    bootstrapper: StateBackendBootstrapper<P>,
    confirmation: Box<dyn ConfirmationProvider>,
    plan_dir: PathBuf,
    run_id: Uuid,
    phase: Phase,
    failure: Option<FailureReport>,
    descriptor: Option<StateBackendDescriptor>,
    latest_plan: Option<Uuid>,
    plan_file: Option<PathBuf>,
    consumed: HashSet<Uuid>,
}

impl<E, P> fmt::Debug for LifecycleExecutor<E, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleExecutor")
            .field("run_id", &self.run_id)
            .field("phase", &self.phase)
            .field("latest_plan", &self.latest_plan)
            .finish_non_exhaustive()
    }
}

impl<E: BackendEngine, P: StateProvider> LifecycleExecutor<E, P> {
    /// Creates an executor in `Idle`.
    #[must_use]
    pub fn new(
        engine: E,
        bootstrapper: StateBackendBootstrapper<P>,
        confirmation: Box<dyn ConfirmationProvider>,
        plan_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            bootstrapper,
            confirmation,
            plan_dir: plan_dir.into(),
            run_id: Uuid::new_v4(),
            phase: Phase::Idle,
            failure: None,
            descriptor: None,
            latest_plan: None,
            plan_file: None,
            consumed: HashSet::new(),
        }
    }

    /// Identifier of this run.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Why the run aborted, if it did.
    #[must_use]
    pub const fn failure(&self) -> Option<&FailureReport> {
        self.failure.as_ref()
    }

    /// Resolved state location, once the backend is ready.
    #[must_use]
    pub const fn descriptor(&self) -> Option<&StateBackendDescriptor> {
        self.descriptor.as_ref()
    }

    /// The backend engine.
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    fn expect_phase(&self, allowed: &[Phase], action: &str) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self.phase.to_string(),
                action: action.to_string(),
            }
            .into())
        }
    }

    fn advance(&mut self, to: Phase) {
        debug!("Lifecycle {} -> {}", self.phase, to);
        self.phase = to;
    }

    /// Moves to `Aborted`, recording `error`, and hands the error back.
    ///
    /// Has no effect on a machine that already reached a terminal phase.
    pub fn abort(&mut self, error: DeployError) -> DeployError {
        if !self.phase.is_terminal() {
            let report = FailureReport::from_error(&error, self.phase);
            warn!("Aborting in {}: {} ({})", self.phase, report.kind, report.message);
            self.failure = Some(report);
            self.phase = Phase::Aborted;
        }
        error
    }

    /// `Idle -> Validated` after every prerequisite check passes.
    ///
    /// # Errors
    ///
    /// Returns the aggregated validation failures.
    pub async fn validate(&mut self, validator: &PrerequisiteValidator) -> Result<()> {
        self.expect_phase(&[Phase::Idle], "validate")?;
        match validator.validate().await.into_result() {
            Ok(_) => {
                self.advance(Phase::Validated);
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// `Idle -> Validated` without running checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the machine is not idle.
    pub fn skip_validation(&mut self) -> Result<()> {
        self.expect_phase(&[Phase::Idle], "skip validation")?;
        warn!("Prerequisite validation skipped");
        self.advance(Phase::Validated);
        Ok(())
    }

    /// `Validated -> BackendReady` once the remote state location exists.
    ///
    /// # Errors
    ///
    /// Returns the bootstrap failure.
    pub async fn ensure_backend(
        &mut self,
        request: &DeploymentRequest,
    ) -> Result<StateBackendDescriptor> {
        self.expect_phase(&[Phase::Validated], "bootstrap the state backend")?;
        match self.bootstrapper.ensure(request).await {
            Ok(descriptor) => {
                self.descriptor = Some(descriptor.clone());
                self.advance(Phase::BackendReady);
                Ok(descriptor)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// `BackendReady -> Initialized`: clears the local cache, then runs init.
    ///
    /// # Errors
    ///
    /// Returns the init failure.
    pub async fn initialize(&mut self) -> Result<()> {
        self.expect_phase(&[Phase::BackendReady], "initialize")?;
        let Some(descriptor) = self.descriptor.clone() else {
            return Err(self.abort(DeployError::internal("backend ready without a descriptor")));
        };

        let result: Result<()> = async {
            self.engine.clear_local_cache().await?;
            self.engine.init(&descriptor).await
        }
        .await;

        match result {
            Ok(()) => {
                self.advance(Phase::Initialized);
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// `Initialized -> Planned`, or re-plan from `Planned`.
    ///
    /// A new plan supersedes any earlier plan of this run.
    ///
    /// # Errors
    ///
    /// Returns the plan failure.
    pub async fn plan(&mut self, overlay: &OverlayArtifact, mode: PlanMode) -> Result<PlanArtifact> {
        self.expect_phase(&[Phase::Initialized, Phase::Planned], "plan")?;

        let path = PlanArtifact::file_path(&self.plan_dir, overlay.overlay.environment(), self.run_id);
        let result: Result<_> = async {
            fs::create_dir_all(&self.plan_dir).await?;
            self.engine.plan(overlay, mode, &path).await
        }
        .await;

        match result {
            Ok(summary) => {
                let artifact =
                    PlanArtifact::new(self.run_id, mode, path, overlay.digest.clone(), summary);
                info!("Plan {} ({mode}): {}", artifact.id, artifact.summary);
                self.latest_plan = Some(artifact.id);
                self.plan_file = Some(artifact.path.clone());
                self.advance(Phase::Planned);
                Ok(artifact)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Deletes this run's plan file, if one is still on disk.
    ///
    /// Called at the end of every run: a dry run, an abort or a rejected plan
    /// would otherwise leave it behind.
    pub async fn discard_plan(&mut self) {
        if let Some(path) = self.plan_file.take() {
            debug!("Discarding plan file {}", path.display());
            remove_plan_file(&path).await;
        }
    }

    /// Rejects a plan that is not this run's latest unconsumed `mode` plan
    /// for the unchanged overlay.
    async fn check_plan(
        &self,
        plan: &PlanArtifact,
        overlay: &OverlayArtifact,
        mode: PlanMode,
    ) -> Result<()> {
        let operation = match mode {
            PlanMode::Apply => BackendOperation::Apply,
            PlanMode::Destroy => BackendOperation::Destroy,
        };
        let reject = |reason: &str| -> Result<()> {
            Err(LifecycleError::PlanRejected {
                operation,
                plan_id: plan.id.to_string(),
                reason: reason.to_string(),
            }
            .into())
        };

        if plan.run_id != self.run_id {
            return reject("produced by a different invocation");
        }
        if self.consumed.contains(&plan.id) {
            return reject("already applied");
        }
        if self.latest_plan != Some(plan.id) {
            return reject("superseded by a later plan");
        }
        if plan.mode != mode {
            return reject(&format!("a {} plan cannot be used to {mode}", plan.mode));
        }
        if plan.overlay_digest != overlay.digest || !overlay.is_unchanged().await? {
            return reject("overlay changed since the plan was produced");
        }
        if !fs::try_exists(&plan.path).await? {
            return reject("plan file is missing");
        }
        Ok(())
    }

    /// `Planned -> Applied` using exactly `plan`.
    ///
    /// A rejected plan leaves the phase unchanged.
    ///
    /// # Errors
    ///
    /// Returns a plan rejection or the apply failure.
    pub async fn apply(&mut self, plan: &PlanArtifact, overlay: &OverlayArtifact) -> Result<Outputs> {
        self.expect_phase(&[Phase::Planned], "apply")?;
        self.check_plan(plan, overlay, PlanMode::Apply).await?;

        self.consumed.insert(plan.id);
        let result = self.engine.apply(&plan.path, overlay).await;
        remove_plan_file(&plan.path).await;
        match result {
            Ok(outputs) => {
                self.advance(Phase::Applied);
                info!("Applied plan {} ({} output(s))", plan.id, outputs.len());
                Ok(outputs)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// `Planned -> Destroyed` after confirmation.
    ///
    /// Without `auto_approve` the confirmation provider is asked; anything
    /// but an explicit yes aborts with nothing touched.
    ///
    /// # Errors
    ///
    /// Returns a plan rejection, `DestroyNotConfirmed`, or the destroy failure.
    pub async fn destroy(
        &mut self,
        plan: &PlanArtifact,
        overlay: &OverlayArtifact,
        auto_approve: bool,
    ) -> Result<()> {
        self.expect_phase(&[Phase::Planned], "destroy")?;
        self.check_plan(plan, overlay, PlanMode::Destroy).await?;

        if auto_approve {
            info!("Destroy auto-approved");
        } else {
            let prompt = format!(
                "This will destroy environment '{}' ({} resource(s)). This cannot be undone.",
                overlay.overlay.environment(),
                plan.summary.destroy
            );
            let confirmed = match self.confirmation.confirm(&prompt).await {
                Ok(answer) => answer,
                Err(e) => {
                    warn!("Confirmation failed: {e}");
                    false
                }
            };
            if !confirmed {
                remove_plan_file(&plan.path).await;
                return Err(self.abort(LifecycleError::DestroyNotConfirmed.into()));
            }
        }

        self.consumed.insert(plan.id);
        let result = self.engine.destroy(overlay).await;
        remove_plan_file(&plan.path).await;
        match result {
            Ok(()) => {
                self.advance(Phase::Destroyed);
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }
}

/// Plan files hold input variables, secrets included, so none outlives its run.
async fn remove_plan_file(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove plan file {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockCommandRunner;
    use crate::config::{ConfigRegistry, FeatureFlags, StateNaming, Tier};
    use crate::lifecycle::FixedConfirmation;
    use crate::overlay::{OverlayGenerator, SecretGenerator};
    use crate::prerequisites::{MockToolLocator, ToolRequirement};
    use crate::state::DescriptorStore;
    use crate::testing::{request, FakeEngine, FakeProvider};
    use std::sync::Arc;
    use tempfile::TempDir;

    type Executor = LifecycleExecutor<FakeEngine, FakeProvider>;

    fn executor(temp: &TempDir, engine: FakeEngine, confirm: bool) -> Executor {
        let bootstrapper = StateBackendBootstrapper::new(
            FakeProvider::new(),
            DescriptorStore::with_base_dir(temp.path().join("backends")),
            StateNaming::default(),
        )
        .with_seed(7);
        LifecycleExecutor::new(
            engine,
            bootstrapper,
            Box::new(FixedConfirmation(confirm)),
            temp.path().join("plans"),
        )
    }

    async fn overlay(temp: &TempDir, env: &str) -> OverlayArtifact {
        let registry = ConfigRegistry::new();
        OverlayGenerator::new("tiered")
            .with_secret_generator(SecretGenerator::seeded(3))
            .generate(registry.get(Tier::Medium), &request(Tier::Medium, env, FeatureFlags::default()))
            .write_to(&temp.path().join("overlays"))
            .await
            .expect("overlay written")
    }

    async fn to_initialized(exec: &mut Executor, env: &str) {
        exec.skip_validation().unwrap();
        exec.ensure_backend(&request(Tier::Medium, env, FeatureFlags::default()))
            .await
            .unwrap();
        exec.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn test_happy_path_apply() {
        let temp = TempDir::new().expect("temp dir");
        let engine = FakeEngine::new(temp.path().join("state"));
        let mut exec = executor(&temp, engine, false);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let plan = exec.plan(&overlay, PlanMode::Apply).await.unwrap();
        assert_eq!(exec.phase(), Phase::Planned);
        assert!(plan.path.exists());

        let outputs = exec.apply(&plan, &overlay).await.unwrap();
        assert_eq!(exec.phase(), Phase::Applied);
        assert_eq!(outputs.get("cluster_name").map(String::as_str), Some("aks-test"));
        assert!(!plan.path.exists());
        assert_eq!(exec.engine().calls(), ["clear", "init", "plan", "apply"]);
    }

    #[tokio::test]
    async fn test_out_of_order_transitions_are_blocked() {
        let temp = TempDir::new().expect("temp dir");
        let mut exec = executor(&temp, FakeEngine::new(temp.path().join("state")), false);

        let err = exec.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Lifecycle(LifecycleError::InvalidTransition { .. })
        ));
        // Blocked, not aborted.
        assert_eq!(exec.phase(), Phase::Idle);
        assert!(exec.engine().calls().is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_aborts_before_mutation() {
        let temp = TempDir::new().expect("temp dir");
        let mut exec = executor(&temp, FakeEngine::new(temp.path().join("state")), false);

        let mut locator = MockToolLocator::new();
        locator.expect_locate().returning(|_| None);
        let validator = PrerequisiteValidator::new(Arc::new(MockCommandRunner::new()), Box::new(locator))
            .require(ToolRequirement::terraform((1, 5, 0)))
            .require(ToolRequirement::azure_cli((2, 50, 0)));

        assert!(exec.validate(&validator).await.is_err());
        assert_eq!(exec.phase(), Phase::Aborted);
        let failure = exec.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::ToolMissing);
        assert_eq!(failure.phase, Phase::Idle);
        assert_eq!(failure.details.len(), 2);
        assert!(exec.skip_validation().is_err());
        assert!(!temp.path().join("backends").exists());
    }

    #[tokio::test]
    async fn test_plan_failure_aborts() {
        let temp = TempDir::new().expect("temp dir");
        let engine = FakeEngine::new(temp.path().join("state")).failing(BackendOperation::Plan);
        let mut exec = executor(&temp, engine, false);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let err = exec.plan(&overlay, PlanMode::Apply).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::PlanFailure);
        assert_eq!(exec.phase(), Phase::Aborted);
        assert_eq!(exec.failure().unwrap().phase, Phase::Initialized);
        assert_eq!(exec.failure().unwrap().details, ["plan exploded"]);
    }

    #[tokio::test]
    async fn test_locked_state_is_reported_retryable() {
        let temp = TempDir::new().expect("temp dir");
        let mut engine = FakeEngine::new(temp.path().join("state")).failing(BackendOperation::Init);
        engine.locked = true;
        let mut exec = executor(&temp, engine, false);

        exec.skip_validation().unwrap();
        exec.ensure_backend(&request(Tier::Small, "dev", FeatureFlags::default()))
            .await
            .unwrap();
        let err = exec.initialize().await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::InitFailure);
        assert!(exec.failure().unwrap().retryable);
        // Exactly one init attempt.
        assert_eq!(exec.engine().calls(), ["clear", "init"]);
    }

    #[tokio::test]
    async fn test_stale_and_consumed_plans_rejected() {
        let temp = TempDir::new().expect("temp dir");
        let mut exec = executor(&temp, FakeEngine::new(temp.path().join("state")), false);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let first = exec.plan(&overlay, PlanMode::Apply).await.unwrap();
        let second = exec.plan(&overlay, PlanMode::Apply).await.unwrap();

        let err = exec.apply(&first, &overlay).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ApplyFailure);
        assert!(err.to_string().contains("superseded"));
        assert_eq!(exec.phase(), Phase::Planned);

        exec.apply(&second, &overlay).await.unwrap();
        let err = exec.apply(&second, &overlay).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Lifecycle(LifecycleError::InvalidTransition { .. })
        ));
        assert_eq!(
            exec.engine().calls().iter().filter(|c| *c == "apply").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_foreign_plan_rejected() {
        let temp = TempDir::new().expect("temp dir");
        let mut exec = executor(&temp, FakeEngine::new(temp.path().join("state")), false);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let mine = exec.plan(&overlay, PlanMode::Apply).await.unwrap();
        let mut foreign = mine.clone();
        foreign.run_id = Uuid::new_v4();

        let err = exec.apply(&foreign, &overlay).await.unwrap_err();
        assert!(err.to_string().contains("different invocation"));
        exec.apply(&mine, &overlay).await.unwrap();
    }

    #[tokio::test]
    async fn test_modified_overlay_rejects_plan() {
        let temp = TempDir::new().expect("temp dir");
        let mut exec = executor(&temp, FakeEngine::new(temp.path().join("state")), false);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let plan = exec.plan(&overlay, PlanMode::Apply).await.unwrap();
        std::fs::write(&overlay.path, "{}\n").expect("tamper");

        let err = exec.apply(&plan, &overlay).await.unwrap_err();
        assert!(err.to_string().contains("overlay changed"));
        assert!(!exec.engine().calls().contains(&String::from("apply")));
    }

    #[tokio::test]
    async fn test_destroy_plan_cannot_be_applied() {
        let temp = TempDir::new().expect("temp dir");
        let mut exec = executor(&temp, FakeEngine::new(temp.path().join("state")), false);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let plan = exec.plan(&overlay, PlanMode::Destroy).await.unwrap();
        let err = exec.apply(&plan, &overlay).await.unwrap_err();
        assert!(err.to_string().contains("destroy plan"));
    }

    #[tokio::test]
    async fn test_apply_plan_cannot_be_destroyed() {
        let temp = TempDir::new().expect("temp dir");
        let mut exec = executor(&temp, FakeEngine::new(temp.path().join("state")), true);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let plan = exec.plan(&overlay, PlanMode::Apply).await.unwrap();
        let err = exec.destroy(&plan, &overlay, true).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::DestroyFailure);
        assert_eq!(exec.phase(), Phase::Planned);
    }

    #[tokio::test]
    async fn test_failed_apply_removes_plan_file() {
        let temp = TempDir::new().expect("temp dir");
        let engine = FakeEngine::new(temp.path().join("state")).failing(BackendOperation::Apply);
        let mut exec = executor(&temp, engine, false);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let plan = exec.plan(&overlay, PlanMode::Apply).await.unwrap();
        assert!(exec.apply(&plan, &overlay).await.is_err());
        assert_eq!(exec.phase(), Phase::Aborted);
        assert!(!plan.path.exists());
    }

    #[tokio::test]
    async fn test_discard_plan_removes_unapplied_plan() {
        let temp = TempDir::new().expect("temp dir");
        let mut exec = executor(&temp, FakeEngine::new(temp.path().join("state")), false);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let plan = exec.plan(&overlay, PlanMode::Apply).await.unwrap();
        assert!(plan.path.exists());

        exec.discard_plan().await;
        assert!(!plan.path.exists());
        // Nothing left to discard.
        exec.discard_plan().await;
    }

    #[tokio::test]
    async fn test_unconfirmed_destroy_leaves_state_untouched() {
        let temp = TempDir::new().expect("temp dir");
        let state = temp.path().join("state");
        std::fs::write(&state, b"{\"serial\": 41}").expect("seed state");
        let mut exec = executor(&temp, FakeEngine::new(&state), false);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let plan = exec.plan(&overlay, PlanMode::Destroy).await.unwrap();
        let err = exec.destroy(&plan, &overlay, false).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::DestroyNotConfirmed);
        assert_eq!(exec.phase(), Phase::Aborted);
        assert_eq!(std::fs::read(&state).expect("read state"), b"{\"serial\": 41}");
        assert!(!exec.engine().calls().contains(&String::from("destroy")));
    }

    #[tokio::test]
    async fn test_confirmed_destroy() {
        let temp = TempDir::new().expect("temp dir");
        let state = temp.path().join("state");
        std::fs::write(&state, b"resources").expect("seed state");
        let mut exec = executor(&temp, FakeEngine::new(&state), true);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let plan = exec.plan(&overlay, PlanMode::Destroy).await.unwrap();
        exec.destroy(&plan, &overlay, false).await.unwrap();

        assert_eq!(exec.phase(), Phase::Destroyed);
        assert!(std::fs::read(&state).expect("read state").is_empty());
        assert!(exec.plan(&overlay, PlanMode::Apply).await.is_err());
    }

    #[tokio::test]
    async fn test_auto_approve_skips_confirmation() {
        let temp = TempDir::new().expect("temp dir");
        let mut exec = executor(&temp, FakeEngine::new(temp.path().join("state")), false);
        let overlay = overlay(&temp, "dev").await;

        to_initialized(&mut exec, "dev").await;
        let plan = exec.plan(&overlay, PlanMode::Destroy).await.unwrap();
        exec.destroy(&plan, &overlay, true).await.unwrap();
        assert_eq!(exec.phase(), Phase::Destroyed);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Applied.is_terminal());
        assert!(Phase::Destroyed.is_terminal());
        assert!(Phase::Aborted.is_terminal());
        assert!(!Phase::Planned.is_terminal());
    }
}
