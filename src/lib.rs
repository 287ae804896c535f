// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![warn(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(dead_code)]                   // Unused code is flagged
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_variables)]            // Unused variables are flagged
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Tiered Deploy
//!
//! Gated, idempotent deployment of t-shirt sized infrastructure stacks
//! through a declarative backend engine (terraform).
//!
//! ## Overview
//!
//! An operator picks a tier (`xs`, `s`, `m`, `l`), an environment and a
//! region. The orchestrator then:
//!
//! 1. **Validates** that the required tools and a provider session exist
//! 2. **Bootstraps** a remote state location, once per environment
//! 3. **Generates** an overlay from the tier's values and the request
//! 4. **Initializes** and **plans** through the backend engine
//! 5. **Applies** the plan, or **destroys** after explicit confirmation
//!
//! Every step is safe to repeat: re-running converges instead of
//! duplicating resources.
//!
//! ## Modules
//!
//! - [`config`]: Tier registry, requests and settings
//! - [`prerequisites`]: Tool and authentication checks
//! - [`state`]: Remote state bootstrapping (Azure, S3)
//! - [`overlay`]: Overlay generation and secrets
//! - [`backend`]: External commands and the terraform engine
//! - [`lifecycle`]: Phase machine binding plans to apply and destroy
//! - [`orchestrator`]: One end-to-end run
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```text
//! tiered deploy --tier m --environment staging --region westeurope \
//!     --owner platform --enable-private-cluster --dry-run
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod overlay;
pub mod prerequisites;
pub mod state;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{BackendEngine, CommandRunner, PlanMode, PlanSummary, ProcessRunner, TerraformEngine};
pub use cli::{Cli, Commands, SummaryReporter};
pub use config::{ConfigRegistry, DeploymentRequest, FeatureFlags, Settings, Tier, TierDefinition};
pub use error::{DeployError, FailureKind, Result};
pub use lifecycle::{LifecycleExecutor, Phase};
pub use orchestrator::{DeploymentResult, Orchestrator};
pub use overlay::{ConfigurationOverlay, OverlayArtifact, OverlayGenerator};
pub use prerequisites::{PrerequisiteValidator, ValidationReport};
pub use state::{StateBackendBootstrapper, StateBackendDescriptor, StateProvider};
