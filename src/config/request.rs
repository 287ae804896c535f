//! Deployment request construction.
//!
//! A [`DeploymentRequest`] is built once from invocation parameters and is
//! read-only afterwards. Secret references are resolved at construction time
//! into opaque [`SecretHandle`]s; only the backend engine ever reads the value.

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::tiers::{ConfigRegistry, Feature, Tier};

/// Maximum environment name length; it is embedded in storage names.
const MAX_ENVIRONMENT_LEN: usize = 16;

/// Boolean switches of a deployment request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct FeatureFlags {
    /// Request heavy network protection.
    pub enable_ddos_protection: bool,
    /// Request a private cluster.
    pub enable_private_cluster: bool,
    /// Request replication to a secondary region.
    pub enable_multi_region: bool,
    /// Stop after planning.
    pub dry_run: bool,
    /// Skip interactive confirmation.
    pub auto_approve: bool,
    /// Skip prerequisite validation.
    pub skip_validation: bool,
    /// Tear the environment down instead of applying.
    pub destroy: bool,
    /// Resolve storage name collisions with a random suffix.
    pub auto_suffix: bool,
}

/// Opaque reference to secret material.
///
/// Cloning shares the value. `Debug` and `Serialize` only ever show the name.
#[derive(Clone)]
pub struct SecretHandle {
    name: String,
    value: Arc<SecretString>,
}

impl SecretHandle {
    /// Wraps a secret value under a variable name.
    #[must_use]
    pub fn new(name: impl Into<String>, value: SecretString) -> Self {
        Self {
            name: name.into(),
            value: Arc::new(value),
        }
    }

    /// Resolves a reference of the form `NAME=ENV_VAR` from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is malformed or the variable is unset.
    pub fn from_env_reference(reference: &str) -> Result<Self> {
        let (name, var) = reference.split_once('=').ok_or_else(|| {
            ConfigError::invalid("secret", format!("'{reference}' must look like NAME=ENV_VAR"))
        })?;
        let name = name.trim();
        let var = var.trim();

        if !is_variable_name(name) {
            return Err(ConfigError::invalid(
                "secret",
                format!("'{name}' is not a valid variable name"),
            )
            .into());
        }

        let value = std::env::var(var).map_err(|_| ConfigError::MissingEnvVar {
            name: var.to_string(),
        })?;
        if value.is_empty() {
            return Err(ConfigError::MissingEnvVar {
                name: var.to_string(),
            }
            .into());
        }

        debug!("Resolved secret '{}' from ${}", name, var);
        Ok(Self::new(name, SecretString::from(value)))
    }

    /// Variable name the backend receives this secret under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the secret value. Only backend engines call this.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }
}

impl fmt::Debug for SecretHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretHandle({}, <redacted>)", self.name)
    }
}

impl PartialEq for SecretHandle {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.expose() == other.expose()
    }
}

impl Eq for SecretHandle {}

impl Serialize for SecretHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

/// Everything one invocation asked for.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentRequest {
    /// Tier to deploy.
    pub tier: Tier,
    /// Environment name, used in resource and artifact names.
    pub environment: String,
    /// Primary region.
    pub region: String,
    /// Owner identity, written to tags.
    pub owner: String,
    /// Secondary region for replication.
    pub secondary_region: Option<String>,
    /// External secret references.
    pub secrets: Vec<SecretHandle>,
    /// Boolean switches.
    pub flags: FeatureFlags,
}

impl DeploymentRequest {
    /// Validates parameters and builds a request.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is invalid.
    pub fn new(
        tier: Tier,
        environment: impl Into<String>,
        region: impl Into<String>,
        owner: impl Into<String>,
        secondary_region: Option<String>,
        secrets: Vec<SecretHandle>,
        flags: FeatureFlags,
    ) -> Result<Self> {
        let request = Self {
            tier,
            environment: environment.into(),
            region: region.into().trim().to_string(),
            owner: owner.into().trim().to_string(),
            secondary_region: secondary_region
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            secrets,
            flags,
        };
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<()> {
        if !is_valid_environment(&self.environment) {
            return Err(ConfigError::invalid(
                "environment",
                format!(
                    "'{}' must be 1-{MAX_ENVIRONMENT_LEN} chars of lowercase letters, digits or hyphens, starting with a letter",
                    self.environment
                ),
            )
            .into());
        }
        if self.region.is_empty() {
            return Err(ConfigError::invalid("region", "region cannot be empty").into());
        }
        if self.owner.is_empty() {
            return Err(ConfigError::invalid("owner", "owner cannot be empty").into());
        }
        // On a tier without multi-region the flag is ignored by the overlay,
        // so the secondary region is not needed.
        let replicates = self.flags.enable_multi_region
            && ConfigRegistry::new().get(self.tier).supports(Feature::MultiRegion);
        if replicates {
            match &self.secondary_region {
                None => {
                    return Err(ConfigError::invalid(
                        "secondary-region",
                        "required when multi-region is enabled",
                    )
                    .into());
                }
                Some(secondary) if secondary.eq_ignore_ascii_case(&self.region) => {
                    return Err(ConfigError::invalid(
                        "secondary-region",
                        "must differ from the primary region",
                    )
                    .into());
                }
                Some(_) => {}
            }
        }

        let mut seen = std::collections::HashSet::new();
        for secret in &self.secrets {
            if !seen.insert(secret.name()) {
                return Err(ConfigError::invalid(
                    "secret",
                    format!("'{}' is given more than once", secret.name()),
                )
                .into());
            }
        }
        Ok(())
    }
}

fn is_valid_environment(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ENVIRONMENT_LEN
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
}

fn is_variable_name(name: &str) -> bool {
    !name.is_empty()
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
