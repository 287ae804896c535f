//! Overlay module.
//!
//! This module merges a tier with a deployment request into the concrete
//! configuration handed to the backend engine, and generates fresh secrets.

mod generator;
mod secrets;

pub use generator::{
    digest, ConfigurationOverlay, OverlayArtifact, OverlayGenerator, OverlayValue,
    DATABASE_PASSWORD, REPLICATION_REGIONS,
};
pub use secrets::{SecretGenerator, PASSWORD_LEN};
