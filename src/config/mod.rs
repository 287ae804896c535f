//! Configuration module.
//!
//! This module holds the tier registry, request construction and the
//! orchestrator's own settings.

mod request;
mod settings;
mod tiers;

pub use request::{DeploymentRequest, FeatureFlags, SecretHandle};
pub use settings::{
    load_dotenv, ProviderKind, Settings, StateNaming, ToolMinimums, SETTINGS_FILE,
};
pub use tiers::{ConfigRegistry, Feature, Tier, TierDefinition, TierMetadata, TierParameters};
