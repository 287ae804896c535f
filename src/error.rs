//! Error types for the tiered deployment orchestrator.
//!
//! This module provides the error hierarchy for every phase of a run:
//! request and settings handling, prerequisite validation, state backend
//! bootstrap, backend engine operations, and lifecycle transitions.
//! Every error maps onto a [`FailureKind`], which is what the final report
//! and the process exit code are derived from.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// The main error type for the orchestrator.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Request or settings errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Aggregated prerequisite failures.
    #[error("Prerequisite validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// State backend bootstrap errors.
    #[error("State backend bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    /// Backend engine operation errors.
    #[error("Backend engine error: {0}")]
    Backend(#[from] BackendError),

    /// Lifecycle transition errors.
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Request and settings errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The requested tier is not in the registry.
    #[error("Unknown tier '{tier}' (expected one of: xs, s, m, l)")]
    UnknownTier {
        /// The tier identifier as given.
        tier: String,
    },

    /// A request parameter is invalid.
    #[error("Invalid parameter '{field}': {message}")]
    InvalidParameter {
        /// Parameter name.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// A secret reference names an unset environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// The settings file could not be read.
    #[error("Settings file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The settings file could not be parsed.
    #[error("Failed to parse settings: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },
}

/// A single prerequisite failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    /// The tool is not on `PATH`.
    ToolMissing {
        /// Tool name.
        tool: String,
    },
    /// The tool is older than the minimum version.
    ToolOutdated {
        /// Tool name.
        tool: String,
        /// Version found.
        found: String,
        /// Minimum version required.
        minimum: String,
    },
    /// The tool's version output could not be understood.
    VersionUnreadable {
        /// Tool name.
        tool: String,
        /// What went wrong.
        message: String,
    },
    /// No authenticated session against the provider.
    AuthMissing {
        /// Provider name.
        provider: String,
        /// Message from the auth probe.
        message: String,
    },
}

impl ValidationFailure {
    /// Returns the failure category this check belongs to.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::ToolMissing { .. } | Self::ToolOutdated { .. } | Self::VersionUnreadable { .. } => {
                FailureKind::ToolMissing
            }
            Self::AuthMissing { .. } => FailureKind::AuthMissing,
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolMissing { tool } => write!(f, "{tool} is not installed or not on PATH"),
            Self::ToolOutdated {
                tool,
                found,
                minimum,
            } => write!(f, "{tool} {found} is older than the required {minimum}"),
            Self::VersionUnreadable { tool, message } => {
                write!(f, "could not determine {tool} version: {message}")
            }
            Self::AuthMissing { provider, message } => {
                write!(f, "not authenticated against {provider}: {message}")
            }
        }
    }
}

/// Every prerequisite failure found in one validation pass.
#[derive(Debug, Error)]
#[error("{} blocker(s): {}", .failures.len(), summarize(.failures))]
pub struct ValidationError {
    /// All failures, in check order.
    pub failures: Vec<ValidationFailure>,
}

fn summarize(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Returns the dominant category: tool problems first, then auth.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        if self
            .failures
            .iter()
            .any(|f| f.kind() == FailureKind::ToolMissing)
        {
            FailureKind::ToolMissing
        } else {
            FailureKind::AuthMissing
        }
    }
}

/// State backend bootstrap errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The storage name is taken and suffixing was not enabled.
    #[error("Storage name '{name}' is not available; re-run with --auto-suffix to pick a unique name")]
    NameCollision {
        /// The unavailable name.
        name: String,
    },

    /// Every suffixed candidate was taken.
    #[error("No available storage name after {attempts} attempts (base '{base}')")]
    SuffixExhausted {
        /// Base name that was truncated.
        base: String,
        /// Number of candidates tried.
        attempts: u32,
    },

    /// A provider call failed.
    #[error("{operation} failed: {message}")]
    Provider {
        /// Provider operation that failed.
        operation: String,
        /// Underlying message.
        message: String,
    },

    /// The local descriptor record is unreadable.
    #[error("Descriptor record is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },
}

/// Backend engine operation names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendOperation {
    /// `init`.
    Init,
    /// `plan`.
    Plan,
    /// `apply`.
    Apply,
    /// `destroy`.
    Destroy,
    /// `output`.
    Output,
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Output => "output",
        };
        f.write_str(name)
    }
}

/// A failed backend engine operation.
#[derive(Debug, Error)]
#[error("{operation} failed{}: {message}", lock_note(.state_locked))]
pub struct BackendError {
    /// The operation that failed.
    pub operation: BackendOperation,
    /// Underlying backend message.
    pub message: String,
    /// Whether the backend reported its state lock as held.
    pub state_locked: bool,
}

const fn lock_note(state_locked: &bool) -> &'static str {
    if *state_locked { " (state locked)" } else { "" }
}

impl BackendError {
    /// Creates a backend error for an operation.
    #[must_use]
    pub fn new(operation: BackendOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
            state_locked: false,
        }
    }

    /// Creates a backend error flagged as a held state lock.
    #[must_use]
    pub fn locked(operation: BackendOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
            state_locked: true,
        }
    }
}

/// Lifecycle transition errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A transition was attempted from the wrong phase.
    #[error("Cannot {action} from phase {from}")]
    InvalidTransition {
        /// Phase the machine was in.
        from: String,
        /// Action that was attempted.
        action: String,
    },

    /// The plan artifact handed to apply or destroy is not the current one.
    #[error("Plan artifact {plan_id} rejected for {operation}: {reason}")]
    PlanRejected {
        /// Operation the plan was handed to.
        operation: BackendOperation,
        /// Plan identifier.
        plan_id: String,
        /// Reason for rejection.
        reason: String,
    },

    /// Destroy was not confirmed.
    #[error("Destroy was not confirmed; infrastructure left unchanged")]
    DestroyNotConfirmed,
}

/// Failure categories surfaced in the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Invalid invocation parameters.
    InvalidRequest,
    /// A required tool is missing or outdated.
    ToolMissing,
    /// No authenticated provider session.
    AuthMissing,
    /// The tier is not in the registry.
    UnknownTier,
    /// The state storage name is taken.
    NameCollision,
    /// The state backend could not be bootstrapped.
    BootstrapFailure,
    /// Backend init failed.
    InitFailure,
    /// Backend plan failed.
    PlanFailure,
    /// Backend apply failed or an apply plan was rejected.
    ApplyFailure,
    /// Destroy was not confirmed.
    DestroyNotConfirmed,
    /// Backend destroy failed.
    DestroyFailure,
    /// Anything else.
    Internal,
}

impl FailureKind {
    /// Returns the process exit code for this category.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::InvalidRequest => 2,
            Self::ToolMissing => 3,
            Self::AuthMissing => 4,
            Self::UnknownTier => 5,
            Self::NameCollision => 6,
            Self::BootstrapFailure => 7,
            Self::InitFailure => 8,
            Self::PlanFailure => 9,
            Self::ApplyFailure => 10,
            Self::DestroyNotConfirmed => 11,
            Self::DestroyFailure => 12,
            Self::Internal => 1,
        }
    }

    /// Returns the category name as shown in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::ToolMissing => "ToolMissing",
            Self::AuthMissing => "AuthMissing",
            Self::UnknownTier => "UnknownTier",
            Self::NameCollision => "NameCollision",
            Self::BootstrapFailure => "BootstrapFailure",
            Self::InitFailure => "InitFailure",
            Self::PlanFailure => "PlanFailure",
            Self::ApplyFailure => "ApplyFailure",
            Self::DestroyNotConfirmed => "DestroyNotConfirmed",
            Self::DestroyFailure => "DestroyFailure",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, DeployError>;

impl DeployError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the failure category for this error.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Config(ConfigError::UnknownTier { .. }) => FailureKind::UnknownTier,
            Self::Config(_) => FailureKind::InvalidRequest,
            Self::Validation(e) => e.kind(),
            Self::Bootstrap(BootstrapError::NameCollision { .. }) => FailureKind::NameCollision,
            Self::Bootstrap(_) => FailureKind::BootstrapFailure,
            Self::Backend(e) => match e.operation {
                BackendOperation::Init => FailureKind::InitFailure,
                BackendOperation::Plan => FailureKind::PlanFailure,
                BackendOperation::Apply | BackendOperation::Output => FailureKind::ApplyFailure,
                BackendOperation::Destroy => FailureKind::DestroyFailure,
            },
            Self::Lifecycle(LifecycleError::DestroyNotConfirmed) => {
                FailureKind::DestroyNotConfirmed
            }
            Self::Lifecycle(LifecycleError::PlanRejected { operation, .. }) => match operation {
                BackendOperation::Destroy => FailureKind::DestroyFailure,
                _ => FailureKind::ApplyFailure,
            },
            Self::Lifecycle(LifecycleError::InvalidTransition { .. })
            | Self::Io(_)
            | Self::Internal(_) => FailureKind::Internal,
        }
    }

    /// Returns true if re-invoking after a wait may succeed.
    ///
    /// The orchestrator never retries on its own; this only shapes the report.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(BackendError { state_locked: true, .. }))
    }
}

impl ConfigError {
    /// Creates an invalid parameter error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl BootstrapError {
    /// Creates a provider error.
    #[must_use]
    pub fn provider(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
