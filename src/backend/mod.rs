//! Declarative backend integration.
//!
//! External commands go through [`CommandRunner`]; the lifecycle executor
//! drives the backend through [`BackendEngine`], implemented for terraform
//! by [`TerraformEngine`].

mod command;
mod engine;
mod terraform;

pub use command::{CommandOutput, CommandRunner, Invocation, ProcessRunner};
#[cfg(test)]
pub use command::MockCommandRunner;
pub use engine::{BackendEngine, Outputs, PlanMode, PlanSummary};
pub use terraform::{parse_outputs, parse_plan_summary, TerraformEngine};
