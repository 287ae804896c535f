//! Overlay generation.
//!
//! The overlay is built by layering, later layers winning:
//!
//! 1. tier base values,
//! 2. environment identity and region,
//! 3. owner and tags,
//! 4. tier-gated feature flags.
//!
//! A flag requested on a tier that does not support it is ignored, not
//! rejected. The tier table decides what a tier may enable; the caller only
//! expresses intent. Ignored flags are recorded on the overlay so the
//! pre-flight summary can show them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info};

use crate::config::{DeploymentRequest, Feature, SecretHandle, Tier, TierDefinition};
use crate::error::{DeployError, Result};

use super::secrets::{SecretGenerator, PASSWORD_LEN};

/// Name of the generated database administrator password.
pub const DATABASE_PASSWORD: &str = "database_admin_password";

/// Overlay key carrying replication targets.
pub const REPLICATION_REGIONS: &str = "replication_regions";

/// A single overlay value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OverlayValue {
    /// Boolean.
    Bool(bool),
    /// Unsigned integer.
    Integer(u64),
    /// String.
    Text(String),
    /// List of strings.
    List(Vec<String>),
    /// String map.
    Map(BTreeMap<String, String>),
}

impl From<bool> for OverlayValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u32> for OverlayValue {
    fn from(value: u32) -> Self {
        Self::Integer(u64::from(value))
    }
}

impl From<&str> for OverlayValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OverlayValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for OverlayValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Concrete configuration for one deployment.
///
/// Secret values never appear in `values`; they travel as handles.
#[derive(Clone, PartialEq)]
pub struct ConfigurationOverlay {
    environment: String,
    tier: Tier,
    values: BTreeMap<String, OverlayValue>,
    secrets: Vec<SecretHandle>,
    ignored: Vec<Feature>,
}

impl fmt::Debug for ConfigurationOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationOverlay")
            .field("environment", &self.environment)
            .field("tier", &self.tier)
            .field("values", &self.values)
            .field(
                "secrets",
                &self.secrets.iter().map(SecretHandle::name).collect::<Vec<_>>(),
            )
            .field("ignored", &self.ignored)
            .finish()
    }
}

impl ConfigurationOverlay {
    /// Environment this overlay targets.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Tier this overlay was generated from.
    #[must_use]
    pub const fn tier(&self) -> Tier {
        self.tier
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OverlayValue> {
        self.values.get(key)
    }

    /// All non-secret values, sorted by key.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, OverlayValue> {
        &self.values
    }

    /// Secret handles, sorted by name.
    #[must_use]
    pub fn secrets(&self) -> &[SecretHandle] {
        &self.secrets
    }

    /// Requested features the tier does not support.
    #[must_use]
    pub fn ignored_features(&self) -> &[Feature] {
        &self.ignored
    }

    /// Whether a boolean key is set to true.
    #[must_use]
    pub fn is_enabled(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(OverlayValue::Bool(true)))
    }

    /// Deterministic artifact file name for the environment.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.tiered.tfvars.json", self.environment)
    }

    /// Renders the non-secret values as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(&self.values)
            .map_err(|e| DeployError::internal(format!("Failed to serialize overlay: {e}")))?;
        json.push('\n');
        Ok(json)
    }

    /// Writes the overlay into `dir` and returns the artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn write_to(&self, dir: &Path) -> Result<OverlayArtifact> {
        let json = self.to_json()?;
        let digest = digest(json.as_bytes());
        let path = dir.join(self.file_name());

        fs::create_dir_all(dir).await?;
        // Write-then-rename so a reader never sees a half-written overlay.
        let staging = dir.join(format!(".{}.tmp", self.file_name()));
        fs::write(&staging, json.as_bytes()).await?;
        fs::rename(&staging, &path).await?;

        info!("Wrote overlay {} ({})", path.display(), &digest[..12]);
        Ok(OverlayArtifact {
            overlay: self.clone(),
            path,
            digest,
        })
    }
}

/// An overlay persisted to disk.
#[derive(Debug, Clone)]
pub struct OverlayArtifact {
    /// The overlay.
    pub overlay: ConfigurationOverlay,
    /// Where it was written.
    pub path: PathBuf,
    /// SHA-256 of the written bytes.
    pub digest: String,
}

impl OverlayArtifact {
    /// Re-hashes the file on disk and reports whether it still matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn is_unchanged(&self) -> Result<bool> {
        let bytes = fs::read(&self.path).await?;
        Ok(digest(&bytes) == self.digest)
    }
}

/// Hex SHA-256 of a byte slice.
#[must_use]
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Builds overlays from a tier and a request.
#[derive(Debug)]
pub struct OverlayGenerator {
    project: String,
    secrets: SecretGenerator,
}

impl OverlayGenerator {
    /// Creates a generator with an OS-seeded secret source.
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            secrets: SecretGenerator::new(),
        }
    }

    /// Replaces the secret source.
    #[must_use]
    pub fn with_secret_generator(mut self, secrets: SecretGenerator) -> Self {
        self.secrets = secrets;
        self
    }

    /// Generates the overlay for `request` on `tier`.
    pub fn generate(
        &mut self,
        tier: &TierDefinition,
        request: &DeploymentRequest,
    ) -> ConfigurationOverlay {
        let mut values: BTreeMap<String, OverlayValue> = BTreeMap::new();
        let mut set = |key: &str, value: OverlayValue| {
            values.insert(key.to_string(), value);
        };

        // Tier base values.
        let p = &tier.parameters;
        set("tier", tier.tier.code().into());
        set("cluster_node_count", p.cluster_node_count.into());
        set("cluster_max_nodes", p.cluster_max_nodes.into());
        set("cluster_node_size", p.cluster_node_size.into());
        set("enable_autoscaling", p.enable_autoscaling.into());
        set("registry_sku", p.registry_sku.into());
        set("gateway_sku", p.gateway_sku.into());
        set("secret_store_sku", p.secret_store_sku.into());
        set("log_retention_days", p.log_retention_days.into());
        set(
            "availability_zones",
            p.availability_zones
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .into(),
        );
        for feature in Feature::ALL {
            set(feature.overlay_key(), false.into());
        }
        set(REPLICATION_REGIONS, Vec::<String>::new().into());

        // Environment identity.
        set("project", self.project.as_str().into());
        set("environment", request.environment.as_str().into());
        set("location", request.region.as_str().into());
        set(
            "name_prefix",
            format!("{}-{}", self.project, request.environment).into(),
        );

        // Owner.
        set("owner", request.owner.as_str().into());
        let tags: BTreeMap<String, String> = [
            ("environment", request.environment.as_str()),
            ("managed-by", "tiered"),
            ("owner", request.owner.as_str()),
            ("project", self.project.as_str()),
            ("tier", tier.tier.code()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        set("tags", OverlayValue::Map(tags));

        // Gated features.
        let mut ignored = Vec::new();
        for (feature, requested) in [
            (Feature::DdosProtection, request.flags.enable_ddos_protection),
            (Feature::PrivateCluster, request.flags.enable_private_cluster),
            (Feature::MultiRegion, request.flags.enable_multi_region),
        ] {
            if !requested {
                continue;
            }
            if !tier.supports(feature) {
                debug!("Ignoring {} on tier {}: not supported", feature, tier.tier);
                ignored.push(feature);
                continue;
            }
            set(feature.overlay_key(), true.into());
            if feature == Feature::MultiRegion {
                let targets: Vec<String> = request.secondary_region.iter().cloned().collect();
                set(REPLICATION_REGIONS, targets.into());
            }
        }

        let mut secrets = request.secrets.clone();
        if !secrets.iter().any(|s| s.name() == DATABASE_PASSWORD) {
            secrets.push(SecretHandle::new(
                DATABASE_PASSWORD,
                self.secrets.password(PASSWORD_LEN),
            ));
        }
        secrets.sort_by(|a, b| a.name().cmp(b.name()));

        ConfigurationOverlay {
            environment: request.environment.clone(),
            tier: tier.tier,
            values,
            secrets,
            ignored,
        }
    }
}
