//! Remote state bootstrap.
//!
//! Ensures the group, storage and container holding an environment's remote
//! state exist before the backend engine is initialized. Every step checks
//! before it creates, so re-running against the same environment resolves to
//! the same descriptor and creates nothing new.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::{DeploymentRequest, StateNaming};
use crate::error::{BootstrapError, Result};

use super::local::DescriptorStore;
use super::provider::StateProvider;
use super::types::StateBackendDescriptor;

/// Length of the random suffix appended on a name collision.
pub const SUFFIX_LEN: usize = 6;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Creates or discovers the remote state location for an environment.
#[derive(Debug)]
pub struct StateBackendBootstrapper<P> {
    provider: P,
    store: DescriptorStore,
    naming: StateNaming,
    rng: StdRng,
}

impl<P: StateProvider> StateBackendBootstrapper<P> {
    /// Creates a bootstrapper.
    #[must_use]
    pub fn new(provider: P, store: DescriptorStore, naming: StateNaming) -> Self {
        Self {
            provider,
            store,
            naming,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Uses a fixed seed for suffix generation.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// The underlying provider.
    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// The descriptor record store.
    #[must_use]
    pub const fn store(&self) -> &DescriptorStore {
        &self.store
    }

    /// Name of the state-holding group for an environment.
    #[must_use]
    pub fn group_name(&self, environment: &str) -> String {
        format!("{}-{environment}", self.naming.group_prefix)
    }

    /// Unsuffixed storage name for an environment.
    #[must_use]
    pub fn base_account_name(&self, environment: &str) -> String {
        let raw = format!("{}{environment}", self.naming.account_prefix);
        let mut name: String = raw
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        name.truncate(self.provider.max_account_name_len());
        name
    }

    fn suffix_stem(&self, base: &str) -> String {
        let limit = self.provider.max_account_name_len().saturating_sub(SUFFIX_LEN);
        base.chars().take(limit).collect()
    }

    fn random_suffix(&mut self) -> String {
        (0..SUFFIX_LEN)
            .map(|_| char::from(SUFFIX_ALPHABET[self.rng.random_range(0..SUFFIX_ALPHABET.len())]))
            .collect()
    }

    /// Ensures the remote state location exists and returns its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::NameCollision`] if the storage name is taken
    /// and suffixing is disabled, [`BootstrapError::SuffixExhausted`] if every
    /// suffixed candidate is taken, or a provider error.
    pub async fn ensure(&mut self, request: &DeploymentRequest) -> Result<StateBackendDescriptor> {
        let environment = request.environment.as_str();

        if let Some(recorded) = self.store.load(environment).await? {
            return self.ensure_recorded(recorded).await;
        }

        let group = self.group_name(environment);
        self.ensure_group(&group, &request.region).await?;

        let account = self
            .resolve_account(&group, environment, &request.region, request.flags.auto_suffix)
            .await?;
        self.ensure_container(&account).await?;

        let descriptor = StateBackendDescriptor::new(
            self.provider.kind(),
            environment,
            &request.region,
            &group,
            &account,
            &self.naming.container,
        );
        self.store.record(&descriptor).await?;

        info!(
            "State backend ready: {}/{}/{}",
            descriptor.group, descriptor.account, descriptor.container
        );
        Ok(descriptor)
    }

    async fn ensure_recorded(
        &self,
        recorded: StateBackendDescriptor,
    ) -> Result<StateBackendDescriptor> {
        if recorded.provider != self.provider.kind() {
            return Err(BootstrapError::Corrupted {
                message: format!(
                    "environment '{}' is recorded on provider {}, not {}",
                    recorded.environment,
                    recorded.provider,
                    self.provider.kind()
                ),
            }
            .into());
        }

        debug!("Using recorded state backend {}", recorded.account);
        self.ensure_group(&recorded.group, &recorded.region).await?;

        let accounts = self.provider.list_accounts(&recorded.group).await?;
        if !accounts.contains(&recorded.account) {
            warn!(
                "Recorded storage {} is missing from {}, recreating it",
                recorded.account, recorded.group
            );
            if !self.provider.account_name_available(&recorded.account).await? {
                return Err(BootstrapError::NameCollision {
                    name: recorded.account,
                }
                .into());
            }
            self.provider
                .create_account(
                    &recorded.group,
                    &recorded.account,
                    &recorded.region,
                    &recorded.environment,
                )
                .await?;
        }

        self.ensure_container(&recorded.account).await?;
        Ok(recorded)
    }

    async fn ensure_group(&self, group: &str, region: &str) -> Result<()> {
        if self.provider.group_exists(group).await? {
            debug!("Group {group} exists");
            return Ok(());
        }
        self.provider.create_group(group, region).await
    }

    async fn resolve_account(
        &mut self,
        group: &str,
        environment: &str,
        region: &str,
        auto_suffix: bool,
    ) -> Result<String> {
        let base = self.base_account_name(environment);
        let stem = self.suffix_stem(&base);

        let existing = self.provider.list_accounts(group).await?;
        for found in existing.iter().filter(|name| belongs_to(name, &base, &stem)) {
            if self.held_for(group, found, environment).await? {
                info!("Reusing storage {found} in {group}");
                return Ok(found.clone());
            }
            debug!("Storage {found} matches the naming but belongs elsewhere");
        }

        if self.provider.account_name_available(&base).await? {
            self.provider
                .create_account(group, &base, region, environment)
                .await?;
            return Ok(base);
        }

        if !auto_suffix {
            return Err(BootstrapError::NameCollision { name: base }.into());
        }

        let attempts = self.naming.suffix_attempts;
        for attempt in 1..=attempts {
            let candidate = format!("{stem}{}", self.random_suffix());
            if self.provider.account_name_available(&candidate).await? {
                info!("Storage name {base} is taken, using {candidate}");
                self.provider
                    .create_account(group, &candidate, region, environment)
                    .await?;
                return Ok(candidate);
            }
            debug!("Candidate {candidate} taken ({attempt}/{attempts})");
        }

        Err(BootstrapError::SuffixExhausted { base, attempts }.into())
    }

    /// Whether a listed storage resource holds `environment`'s state.
    ///
    /// A tag decides. Untagged storage only counts when the listing was
    /// scoped to the environment's own group.
    async fn held_for(&self, group: &str, account: &str, environment: &str) -> Result<bool> {
        Ok(match self.provider.account_environment(group, account).await? {
            Some(tagged) => tagged == environment,
            None => self.provider.lists_by_group(),
        })
    }

    async fn ensure_container(&self, account: &str) -> Result<()> {
        let container = &self.naming.container;
        if self.provider.container_exists(account, container).await? {
            return Ok(());
        }
        self.provider.create_container(account, container).await
    }
}

/// Whether an existing storage name is this environment's, suffixed or not.
fn belongs_to(name: &str, base: &str, stem: &str) -> bool {
    if name == base {
        return true;
    }
    name.len() == stem.len() + SUFFIX_LEN
        && name.starts_with(stem)
        && name[stem.len()..]
            .bytes()
            .all(|b| SUFFIX_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeatureFlags, Tier};
    use crate::error::FailureKind;
    use crate::testing::FakeProvider;
    use tempfile::TempDir;

    fn request(environment: &str, auto_suffix: bool) -> DeploymentRequest {
        DeploymentRequest::new(
            Tier::Small,
            environment,
            "westeurope",
            "owner",
            None,
            vec![],
            FeatureFlags {
                auto_suffix,
                ..FeatureFlags::default()
            },
        )
        .expect("valid request")
    }

    fn bootstrapper(provider: FakeProvider, dir: &TempDir) -> StateBackendBootstrapper<FakeProvider> {
        StateBackendBootstrapper::new(
            provider,
            DescriptorStore::with_base_dir(dir.path().join("backends")),
            StateNaming::default(),
        )
        .with_seed(42)
    }

    #[tokio::test]
    async fn test_fresh_environment_creates_everything() {
        let temp = TempDir::new().expect("temp dir");
        let mut boot = bootstrapper(FakeProvider::new(), &temp);

        let descriptor = boot.ensure(&request("dev", false)).await.unwrap();

        assert_eq!(descriptor.group, "rg-tfstate-dev");
        assert_eq!(descriptor.account, "sttfstatedev");
        assert_eq!(descriptor.container, "tfstate");
        assert_eq!(descriptor.key, "dev.terraform.tfstate");
        assert_eq!(boot.provider().creates(), 3);
        assert!(boot.store().path_for("dev").exists());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let temp = TempDir::new().expect("temp dir");
        let mut boot = bootstrapper(FakeProvider::new().taken(&["sttfstatedev"]), &temp);

        let first = boot.ensure(&request("dev", true)).await.unwrap();
        let creates = boot.provider().creates();
        let second = boot.ensure(&request("dev", true)).await.unwrap();

        assert!(first.same_location(&second));
        assert_eq!(boot.provider().creates(), creates);
    }

    #[tokio::test]
    async fn test_existing_suffixed_account_is_reused_without_record() {
        let temp = TempDir::new().expect("temp dir");
        let provider = FakeProvider::new();
        {
            let mut cloud = provider.cloud.lock().unwrap();
            cloud.groups.insert(String::from("rg-tfstate-dev"));
            cloud
                .accounts
                .insert(String::from("sttfstatedevq1w2e3"), String::from("rg-tfstate-dev"));
        }
        let mut boot = bootstrapper(provider, &temp);

        let descriptor = boot.ensure(&request("dev", false)).await.unwrap();
        assert_eq!(descriptor.account, "sttfstatedevq1w2e3");
        // Only the container was missing.
        assert_eq!(boot.provider().creates(), 1);
    }

    #[tokio::test]
    async fn test_collision_without_auto_suffix() {
        let temp = TempDir::new().expect("temp dir");
        let mut boot = bootstrapper(FakeProvider::new().taken(&["sttfstateprod"]), &temp);

        let err = boot.ensure(&request("prod", false)).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NameCollision);
        assert!(!boot.store().path_for("prod").exists());
    }

    #[tokio::test]
    async fn test_collision_with_auto_suffix() {
        let temp = TempDir::new().expect("temp dir");
        let mut boot = bootstrapper(FakeProvider::new().taken(&["sttfstateprod"]), &temp);

        let descriptor = boot.ensure(&request("prod", true)).await.unwrap();
        assert_eq!(descriptor.account.len(), "sttfstateprod".len() + SUFFIX_LEN);
        assert!(descriptor.account.starts_with("sttfstateprod"));
        assert!(descriptor.account.len() <= 24);
        assert!(descriptor.account.bytes().all(|b| SUFFIX_ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn test_long_names_are_truncated_before_suffixing() {
        let temp = TempDir::new().expect("temp dir");
        let mut boot = bootstrapper(FakeProvider::new().taken(&["sttfstatestagingeu01"]), &temp);
        assert_eq!(boot.base_account_name("staging-eu-01"), "sttfstatestagingeu01");

        let descriptor = boot.ensure(&request("staging-eu-01", true)).await.unwrap();
        assert_eq!(descriptor.account.len(), 24);
        assert!(descriptor.account.starts_with("sttfstatestaging"));
    }

    #[tokio::test]
    async fn test_suffix_attempts_exhausted() {
        let temp = TempDir::new().expect("temp dir");
        let provider = FakeProvider::new();
        let mut boot = bootstrapper(provider, &temp);
        boot.naming.suffix_attempts = 3;

        // Precompute the seeded candidates and mark them all taken.
        let mut rng = StdRng::seed_from_u64(42);
        let mut taken = vec![String::from("sttfstateqa")];
        for _ in 0..3 {
            let suffix: String = (0..SUFFIX_LEN)
                .map(|_| char::from(SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())]))
                .collect();
            taken.push(format!("sttfstateqa{suffix}"));
        }
        boot.provider().cloud.lock().unwrap().foreign.extend(taken);

        let err = boot.ensure(&request("qa", true)).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::BootstrapFailure);
        assert!(err.to_string().contains("3 attempts"));
    }

    #[tokio::test]
    async fn test_global_listing_does_not_adopt_another_environment() {
        let temp = TempDir::new().expect("temp dir");
        let mut boot = bootstrapper(FakeProvider::global(), &temp);
        let other = boot.ensure(&request("devq1w2e3", false)).await.unwrap();
        assert_eq!(other.account, "sttfstatedevq1w2e3");

        // Another machine, no local record: "dev" must get its own storage.
        let fresh = TempDir::new().expect("temp dir");
        let provider = std::mem::replace(&mut boot.provider, FakeProvider::global());
        let mut boot = bootstrapper(provider, &fresh);
        let dev = boot.ensure(&request("dev", false)).await.unwrap();

        assert_ne!(dev.account, other.account);
        assert_eq!(dev.account, "sttfstatedev");
    }

    #[tokio::test]
    async fn test_global_listing_reuses_tagged_suffixed_storage() {
        let temp = TempDir::new().expect("temp dir");
        let mut boot = bootstrapper(FakeProvider::global().taken(&["sttfstatedev"]), &temp);
        let first = boot.ensure(&request("dev", true)).await.unwrap();
        assert_ne!(first.account, "sttfstatedev");

        let fresh = TempDir::new().expect("temp dir");
        let provider = std::mem::replace(&mut boot.provider, FakeProvider::global());
        let mut boot = bootstrapper(provider, &fresh);
        let creates = boot.provider().creates();
        let second = boot.ensure(&request("dev", true)).await.unwrap();

        assert_eq!(second.account, first.account);
        assert_eq!(boot.provider().creates(), creates);
    }

    #[tokio::test]
    async fn test_global_listing_skips_untagged_storage() {
        let temp = TempDir::new().expect("temp dir");
        let provider = FakeProvider::global();
        provider
            .cloud
            .lock()
            .unwrap()
            .accounts
            .insert(String::from("sttfstatedevabc123"), String::from("elsewhere"));
        let mut boot = bootstrapper(provider, &temp);

        let descriptor = boot.ensure(&request("dev", false)).await.unwrap();
        assert_eq!(descriptor.account, "sttfstatedev");
    }

    #[test]
    fn test_belongs_to() {
        assert!(belongs_to("sttfstatedev", "sttfstatedev", "sttfstatedev"));
        assert!(belongs_to("sttfstatedevabc123", "sttfstatedev", "sttfstatedev"));
        assert!(!belongs_to("sttfstatedevabc12", "sttfstatedev", "sttfstatedev"));
        assert!(!belongs_to("sttfstatedevABC123", "sttfstatedev", "sttfstatedev"));
        assert!(!belongs_to("sttfstatedevx", "sttfstatedev", "sttfstatedev"));
    }
}
