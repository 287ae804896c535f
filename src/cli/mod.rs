//! Command-line interface for the tiered deployment tool.
//!
//! [`commands`] defines the arguments; [`SummaryReporter`] renders what the
//! operator sees before and after a run.

mod commands;
mod output;

pub use commands::{Cli, Commands, LifecycleArgs, LogFormat, OutputFormat, RequestArgs};
pub use output::{guidance, SummaryReporter};
