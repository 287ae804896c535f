//! Tier catalogue.
//!
//! Tiers are a closed set defined in code. Adding a tier or changing what a
//! tier enables is a code change so that tier semantics stay auditable.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ConfigError;

/// Deployment size profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    /// Demos and evaluation.
    ExtraSmall,
    /// Small teams.
    Small,
    /// Departments.
    Medium,
    /// Organisation-wide production.
    Large,
}

impl Tier {
    /// All tiers, smallest first.
    pub const ALL: [Self; 4] = [Self::ExtraSmall, Self::Small, Self::Medium, Self::Large];

    /// Short identifier used on the command line and in names.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ExtraSmall => "xs",
            Self::Small => "s",
            Self::Medium => "m",
            Self::Large => "l",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Tier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xs" | "extra-small" | "extrasmall" => Ok(Self::ExtraSmall),
            "s" | "small" => Ok(Self::Small),
            "m" | "medium" => Ok(Self::Medium),
            "l" | "large" => Ok(Self::Large),
            _ => Err(ConfigError::UnknownTier {
                tier: s.to_string(),
            }),
        }
    }
}

/// Optional capabilities a request can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Heavy network (DDoS-style) protection.
    DdosProtection,
    /// Cluster API reachable only from the private network.
    PrivateCluster,
    /// Replication to a secondary region.
    MultiRegion,
}

impl Feature {
    /// All features.
    pub const ALL: [Self; 3] = [Self::DdosProtection, Self::PrivateCluster, Self::MultiRegion];

    /// Overlay key toggled by this feature.
    #[must_use]
    pub const fn overlay_key(self) -> &'static str {
        match self {
            Self::DdosProtection => "enable_ddos_protection",
            Self::PrivateCluster => "enable_private_cluster",
            Self::MultiRegion => "enable_multi_region",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DdosProtection => "ddos-protection",
            Self::PrivateCluster => "private-cluster",
            Self::MultiRegion => "multi-region",
        };
        f.write_str(name)
    }
}

/// Human-facing facts about a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierMetadata {
    /// Display name.
    pub display_name: &'static str,
    /// Expected number of users.
    pub users: &'static str,
    /// Monthly cost band.
    pub cost_band: &'static str,
    /// Availability target.
    pub sla: &'static str,
    /// Typical first-deployment time.
    pub setup_time: &'static str,
}

/// Capacity defaults written into every overlay for a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierParameters {
    /// Initial cluster node count.
    pub cluster_node_count: u32,
    /// Autoscaler ceiling.
    pub cluster_max_nodes: u32,
    /// Cluster node VM size.
    pub cluster_node_size: &'static str,
    /// Container registry SKU.
    pub registry_sku: &'static str,
    /// API gateway SKU.
    pub gateway_sku: &'static str,
    /// Secret store SKU.
    pub secret_store_sku: &'static str,
    /// Log retention.
    pub log_retention_days: u32,
    /// Availability zones to spread across.
    pub availability_zones: &'static [&'static str],
    /// Whether the cluster autoscaler is on.
    pub enable_autoscaling: bool,
}

/// A tier and everything the registry knows about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierDefinition {
    /// Tier identifier.
    pub tier: Tier,
    /// Descriptive metadata.
    pub metadata: TierMetadata,
    /// Base overlay values.
    pub parameters: TierParameters,
    /// Features this tier supports.
    pub features: &'static [Feature],
}

impl TierDefinition {
    /// Returns true if the tier supports the feature.
    #[must_use]
    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

static TIER_TABLE: [TierDefinition; 4] = [
    TierDefinition {
        tier: Tier::ExtraSmall,
        metadata: TierMetadata {
            display_name: "Extra Small",
            users: "up to 50",
            cost_band: "$100-300 / month",
            sla: "99.5%",
            setup_time: "~15 min",
        },
        parameters: TierParameters {
            cluster_node_count: 1,
            cluster_max_nodes: 2,
            cluster_node_size: "Standard_B2s",
            registry_sku: "Basic",
            gateway_sku: "Consumption",
            secret_store_sku: "standard",
            log_retention_days: 30,
            availability_zones: &[],
            enable_autoscaling: false,
        },
        features: &[],
    },
    TierDefinition {
        tier: Tier::Small,
        metadata: TierMetadata {
            display_name: "Small",
            users: "50-500",
            cost_band: "$500-1,500 / month",
            sla: "99.9%",
            setup_time: "~25 min",
        },
        parameters: TierParameters {
            cluster_node_count: 2,
            cluster_max_nodes: 4,
            cluster_node_size: "Standard_D2s_v5",
            registry_sku: "Standard",
            gateway_sku: "Developer",
            secret_store_sku: "standard",
            log_retention_days: 60,
            availability_zones: &["1", "2"],
            enable_autoscaling: true,
        },
        features: &[Feature::PrivateCluster],
    },
    TierDefinition {
        tier: Tier::Medium,
        metadata: TierMetadata {
            display_name: "Medium",
            users: "500-5,000",
            cost_band: "$2,000-5,000 / month",
            sla: "99.9%",
            setup_time: "~40 min",
        },
        parameters: TierParameters {
            cluster_node_count: 3,
            cluster_max_nodes: 8,
            cluster_node_size: "Standard_D4s_v5",
            registry_sku: "Premium",
            gateway_sku: "Standard",
            secret_store_sku: "premium",
            log_retention_days: 90,
            availability_zones: &["1", "2", "3"],
            enable_autoscaling: true,
        },
        features: &[Feature::DdosProtection, Feature::PrivateCluster],
    },
    TierDefinition {
        tier: Tier::Large,
        metadata: TierMetadata {
            display_name: "Large",
            users: "5,000+",
            cost_band: "$8,000+ / month",
            sla: "99.95%",
            setup_time: "~60 min",
        },
        parameters: TierParameters {
            cluster_node_count: 5,
            cluster_max_nodes: 20,
            cluster_node_size: "Standard_D8s_v5",
            registry_sku: "Premium",
            gateway_sku: "Premium",
            secret_store_sku: "premium",
            log_retention_days: 365,
            availability_zones: &["1", "2", "3"],
            enable_autoscaling: true,
        },
        features: &[
            Feature::DdosProtection,
            Feature::PrivateCluster,
            Feature::MultiRegion,
        ],
    },
];

/// Immutable catalogue of tier definitions.
///
/// Built once at startup from a fixed table; there is no way to add, remove
/// or edit a tier at runtime.
#[derive(Debug, Clone, Copy)]
pub struct ConfigRegistry {
    tiers: &'static [TierDefinition],
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigRegistry {
    /// Creates the registry from the built-in tier table.
    #[must_use]
    pub fn new() -> Self {
        Self { tiers: &TIER_TABLE }
    }

    /// Returns the definition for a tier.
    #[must_use]
    pub fn get(&self, tier: Tier) -> &TierDefinition {
        // The table holds one entry per variant, in declaration order.
        &self.tiers[tier as usize]
    }

    /// Looks a tier up by its textual identifier.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTier` if the identifier is not recognised.
    pub fn lookup(&self, id: &str) -> Result<&TierDefinition, ConfigError> {
        let tier: Tier = id.parse()?;
        Ok(self.get(tier))
    }

    /// Iterates over all tier definitions, smallest first.
    pub fn iter(&self) -> impl Iterator<Item = &TierDefinition> {
        self.tiers.iter()
    }

    /// Returns the tiers that support a feature.
    #[must_use]
    pub fn tiers_supporting(&self, feature: Feature) -> Vec<Tier> {
        self.tiers
            .iter()
            .filter(|d| d.supports(feature))
            .map(|d| d.tier)
            .collect()
    }
}
