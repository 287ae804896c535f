//! Deployment lifecycle.
//!
//! The [`LifecycleExecutor`] enforces phase ordering, binds apply to the plan
//! just produced, and gates destroy behind a [`ConfirmationProvider`].

mod confirm;
mod machine;
mod plan;

pub use confirm::{
    is_confirmation, ConfirmationProvider, FixedConfirmation, StdinConfirmation, CONFIRMATION_WORD,
};
pub use machine::{FailureReport, LifecycleExecutor, Phase};
pub use plan::PlanArtifact;
