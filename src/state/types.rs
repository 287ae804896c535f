//! State backend types.
//!
//! A [`StateBackendDescriptor`] names everything the backend engine needs to
//! find an environment's remote state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ProviderKind;

/// Current version of the descriptor record format.
pub const DESCRIPTOR_VERSION: &str = "1.0";

/// Location of an environment's remote state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBackendDescriptor {
    /// Record format version.
    pub version: String,
    /// Provider hosting the state.
    pub provider: ProviderKind,
    /// Environment the state belongs to.
    pub environment: String,
    /// Region the state resources live in.
    pub region: String,
    /// Resource-group-equivalent name.
    pub group: String,
    /// Globally unique storage name (storage account or bucket).
    pub account: String,
    /// Container (or key prefix) inside the storage.
    pub container: String,
    /// State artifact key.
    pub key: String,
    /// When the descriptor was first resolved.
    pub created_at: DateTime<Utc>,
}

impl StateBackendDescriptor {
    /// Creates a descriptor for a resolved storage name.
    #[must_use]
    pub fn new(
        provider: ProviderKind,
        environment: &str,
        region: &str,
        group: &str,
        account: &str,
        container: &str,
    ) -> Self {
        Self {
            version: DESCRIPTOR_VERSION.to_string(),
            provider,
            environment: environment.to_string(),
            region: region.to_string(),
            group: group.to_string(),
            account: account.to_string(),
            container: container.to_string(),
            key: state_key(environment),
            created_at: Utc::now(),
        }
    }

    /// Whether two descriptors point at the same state, ignoring timestamps.
    #[must_use]
    pub fn same_location(&self, other: &Self) -> bool {
        self.provider == other.provider
            && self.group == other.group
            && self.account == other.account
            && self.container == other.container
            && self.key == other.key
    }

    /// Backend configuration pairs handed to the engine's init.
    #[must_use]
    pub fn backend_config(&self) -> Vec<(String, String)> {
        match self.provider {
            ProviderKind::Azure => vec![
                (String::from("resource_group_name"), self.group.clone()),
                (String::from("storage_account_name"), self.account.clone()),
                (String::from("container_name"), self.container.clone()),
                (String::from("key"), self.key.clone()),
            ],
            ProviderKind::S3 => vec![
                (String::from("bucket"), self.account.clone()),
                (
                    String::from("key"),
                    format!("{}/{}", self.container, self.key),
                ),
                (String::from("region"), self.region.clone()),
            ],
        }
    }
}

/// State artifact key for an environment.
#[must_use]
pub fn state_key(environment: &str) -> String {
    format!("{environment}.terraform.tfstate")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derived_from_environment() {
        let d = StateBackendDescriptor::new(
            ProviderKind::Azure,
            "prod",
            "westeurope",
            "rg-tfstate-prod",
            "sttfstateprod",
            "tfstate",
        );
        assert_eq!(d.key, "prod.terraform.tfstate");
        assert_eq!(d.backend_config()[1].1, "sttfstateprod");
    }

    #[test]
    fn test_s3_backend_config_nests_key() {
        let d = StateBackendDescriptor::new(
            ProviderKind::S3,
            "dev",
            "eu-west-1",
            "rg-tfstate-dev",
            "sttfstatedev",
            "tfstate",
        );
        let config = d.backend_config();
        assert!(config.contains(&(String::from("key"), String::from("tfstate/dev.terraform.tfstate"))));
        assert!(config.contains(&(String::from("region"), String::from("eu-west-1"))));
    }

    #[test]
    fn test_same_location_ignores_timestamp() {
        let a = StateBackendDescriptor::new(ProviderKind::Azure, "qa", "r", "g", "a", "c");
        let mut b = a.clone();
        b.created_at = a.created_at + chrono::Duration::hours(1);
        assert!(a.same_location(&b));
        b.account = String::from("other");
        assert!(!a.same_location(&b));
    }
}
