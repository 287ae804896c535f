//! In-memory fakes shared by unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{BackendEngine, Outputs, PlanMode, PlanSummary};
use crate::config::{DeploymentRequest, FeatureFlags, ProviderKind, Tier};
use crate::error::{BackendError, BackendOperation, Result};
use crate::overlay::OverlayArtifact;
use crate::state::{StateBackendDescriptor, StateProvider};

/// Provider resources held by [`FakeProvider`].
#[derive(Debug, Default)]
pub struct Cloud {
    pub groups: BTreeSet<String>,
    pub accounts: BTreeMap<String, String>,
    /// Names owned by someone else.
    pub foreign: BTreeSet<String>,
    pub containers: BTreeSet<(String, String)>,
    /// Environment tag per account.
    pub tags: BTreeMap<String, String>,
    pub creates: usize,
}

/// [`StateProvider`] over an in-memory [`Cloud`].
#[derive(Debug)]
pub struct FakeProvider {
    pub cloud: Mutex<Cloud>,
    pub max_len: usize,
    /// List every account regardless of group, the way S3 does.
    pub global: bool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            cloud: Mutex::new(Cloud::default()),
            max_len: 24,
            global: false,
        }
    }

    pub fn global() -> Self {
        Self {
            global: true,
            ..Self::new()
        }
    }

    pub fn taken(self, names: &[&str]) -> Self {
        self.cloud
            .lock()
            .unwrap()
            .foreign
            .extend(names.iter().map(|n| (*n).to_string()));
        self
    }

    pub fn creates(&self) -> usize {
        self.cloud.lock().unwrap().creates
    }
}

#[async_trait]
impl StateProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn max_account_name_len(&self) -> usize {
        self.max_len
    }

    fn lists_by_group(&self) -> bool {
        !self.global
    }

    async fn group_exists(&self, group: &str) -> Result<bool> {
        Ok(self.cloud.lock().unwrap().groups.contains(group))
    }

    async fn create_group(&self, group: &str, _region: &str) -> Result<()> {
        let mut cloud = self.cloud.lock().unwrap();
        cloud.groups.insert(group.to_string());
        cloud.creates += 1;
        Ok(())
    }

    async fn list_accounts(&self, group: &str) -> Result<Vec<String>> {
        Ok(self
            .cloud
            .lock()
            .unwrap()
            .accounts
            .iter()
            .filter(|(_, g)| self.global || *g == group)
            .map(|(a, _)| a.clone())
            .collect())
    }

    async fn account_name_available(&self, name: &str) -> Result<bool> {
        let cloud = self.cloud.lock().unwrap();
        Ok(!cloud.accounts.contains_key(name) && !cloud.foreign.contains(name))
    }

    async fn create_account(
        &self,
        group: &str,
        name: &str,
        _region: &str,
        environment: &str,
    ) -> Result<()> {
        let mut cloud = self.cloud.lock().unwrap();
        cloud.accounts.insert(name.to_string(), group.to_string());
        cloud.tags.insert(name.to_string(), environment.to_string());
        cloud.creates += 1;
        Ok(())
    }

    async fn account_environment(&self, _group: &str, name: &str) -> Result<Option<String>> {
        Ok(self.cloud.lock().unwrap().tags.get(name).cloned())
    }

    async fn container_exists(&self, account: &str, container: &str) -> Result<bool> {
        Ok(self
            .cloud
            .lock()
            .unwrap()
            .containers
            .contains(&(account.to_string(), container.to_string())))
    }

    async fn create_container(&self, account: &str, container: &str) -> Result<()> {
        let mut cloud = self.cloud.lock().unwrap();
        cloud
            .containers
            .insert((account.to_string(), container.to_string()));
        cloud.creates += 1;
        Ok(())
    }
}

/// [`BackendEngine`] that records calls and keeps its "state" in a file.
#[derive(Debug, Clone)]
pub struct FakeEngine {
    pub calls: Arc<Mutex<Vec<String>>>,
    /// Remote state stand-in; apply writes it, destroy empties it.
    pub state_file: PathBuf,
    pub fail: Option<BackendOperation>,
    pub locked: bool,
    pub outputs: Outputs,
}

impl FakeEngine {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        let mut outputs = Outputs::new();
        outputs.insert(String::from("cluster_name"), String::from("aks-test"));
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            state_file: state_file.into(),
            fail: None,
            locked: false,
            outputs,
        }
    }

    pub fn failing(mut self, operation: BackendOperation) -> Self {
        self.fail = Some(operation);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call.to_string());
        match self.fail {
            Some(op) if op.to_string() == call => {
                if self.locked {
                    Err(BackendError::locked(op, "Error acquiring the state lock").into())
                } else {
                    Err(BackendError::new(op, format!("{call} exploded")).into())
                }
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl BackendEngine for FakeEngine {
    async fn clear_local_cache(&self) -> Result<()> {
        self.calls.lock().unwrap().push(String::from("clear"));
        Ok(())
    }

    async fn init(&self, _descriptor: &StateBackendDescriptor) -> Result<()> {
        self.record("init")
    }

    async fn plan(
        &self,
        _overlay: &OverlayArtifact,
        mode: PlanMode,
        out: &Path,
    ) -> Result<PlanSummary> {
        self.record("plan")?;
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(out, format!("plan {mode}"))?;
        Ok(PlanSummary {
            has_changes: true,
            add: u32::from(mode == PlanMode::Apply),
            change: 0,
            destroy: u32::from(mode == PlanMode::Destroy),
        })
    }

    async fn apply(&self, _plan_file: &Path, overlay: &OverlayArtifact) -> Result<Outputs> {
        self.record("apply")?;
        std::fs::write(&self.state_file, overlay.digest.as_bytes())?;
        Ok(self.outputs.clone())
    }

    async fn destroy(&self, _overlay: &OverlayArtifact) -> Result<()> {
        self.record("destroy")?;
        std::fs::write(&self.state_file, b"")?;
        Ok(())
    }
}

/// A valid request for `environment` on `tier`.
pub fn request(tier: Tier, environment: &str, flags: FeatureFlags) -> DeploymentRequest {
    DeploymentRequest::new(tier, environment, "westeurope", "owner", None, vec![], flags)
        .expect("valid request")
}
