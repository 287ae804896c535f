//! Prerequisite validation.
//!
//! Checks that the tools the orchestrator shells out to are installed and
//! recent enough, and that an authenticated provider session exists. Every
//! check runs; failures are collected and reported together so an operator
//! can fix all blockers in one pass.

use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{CommandRunner, Invocation};
use crate::config::{ProviderKind, Settings};
use crate::error::{ConfigError, DeployError, Result, ValidationError, ValidationFailure};

/// Version triple.
pub type Version = (u32, u32, u32);

/// Extracts a `major.minor.patch` version using a pattern with three groups.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or does not match.
pub fn parse_version(output: &str, pattern: &str) -> Result<Version> {
    let re = Regex::new(pattern)
        .map_err(|e| DeployError::internal(format!("failed to compile version regex: {e}")))?;

    let caps = re.captures(output).ok_or_else(|| {
        DeployError::internal(format!(
            "no version matching '{pattern}' in: {}",
            output.lines().next().unwrap_or_default()
        ))
    })?;

    let part = |i: usize| {
        caps[i]
            .parse::<u32>()
            .map_err(|e| DeployError::internal(format!("invalid version component: {e}")))
    };
    Ok((part(1)?, part(2)?, part(3)?))
}

/// Parses a plain `X.Y.Z` minimum version.
///
/// # Errors
///
/// Returns an error if the string is not a dotted triple.
pub fn parse_minimum(version: &str) -> Result<Version> {
    parse_version(version, r"^(\d+)\.(\d+)\.(\d+)$").map_err(|_| {
        ConfigError::invalid("tools", format!("'{version}' is not a X.Y.Z version")).into()
    })
}

/// Whether `version` meets `minimum`.
#[must_use]
pub fn version_satisfies(version: Version, minimum: Version) -> bool {
    version >= minimum
}

fn render(version: Version) -> String {
    format!("{}.{}.{}", version.0, version.1, version.2)
}

/// A tool that must be installed at or above a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequirement {
    /// Executable name.
    pub tool: String,
    /// Arguments that print the version.
    pub version_args: Vec<String>,
    /// Regex with three capture groups for major, minor and patch.
    pub pattern: String,
    /// Minimum accepted version.
    pub minimum: Version,
}

impl ToolRequirement {
    /// `terraform` at or above `minimum`.
    #[must_use]
    pub fn terraform(minimum: Version) -> Self {
        Self {
            tool: String::from("terraform"),
            version_args: vec![String::from("version")],
            pattern: String::from(r"Terraform v(\d+)\.(\d+)\.(\d+)"),
            minimum,
        }
    }

    /// `az` at or above `minimum`.
    #[must_use]
    pub fn azure_cli(minimum: Version) -> Self {
        Self {
            tool: String::from("az"),
            version_args: vec![String::from("version")],
            pattern: String::from(r#""azure-cli"\s*:\s*"(\d+)\.(\d+)\.(\d+)""#),
            minimum,
        }
    }

    /// `aws` at or above `minimum`.
    #[must_use]
    pub fn aws_cli(minimum: Version) -> Self {
        Self {
            tool: String::from("aws"),
            version_args: vec![String::from("--version")],
            pattern: String::from(r"aws-cli/(\d+)\.(\d+)\.(\d+)"),
            minimum,
        }
    }
}

/// A command that exits 0 only with an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthProbe {
    /// Provider name used in reports.
    pub provider: String,
    /// Tool the probe runs.
    pub tool: String,
    /// Probe arguments.
    pub args: Vec<String>,
}

impl AuthProbe {
    /// Probe for the given provider's CLI.
    #[must_use]
    pub fn for_provider(kind: ProviderKind) -> Self {
        let args: &[&str] = match kind {
            ProviderKind::Azure => &["account", "show", "--output", "none"],
            ProviderKind::S3 => &["sts", "get-caller-identity"],
        };
        Self {
            provider: kind.to_string(),
            tool: kind.cli_tool().to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

/// Finds executables on `PATH`.
#[cfg_attr(test, mockall::automock)]
pub trait ToolLocator: Send + Sync {
    /// Returns the executable's path, if present.
    fn locate(&self, tool: &str) -> Option<PathBuf>;
}

/// [`ToolLocator`] backed by the `which` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathLocator;

impl ToolLocator for PathLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    /// Check name.
    pub check: String,
    /// Whether it passed.
    pub passed: bool,
    /// Found version, path or failure text.
    pub detail: String,
}

/// Every check's outcome plus the failures among them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Outcomes in check order.
    pub checks: Vec<CheckOutcome>,
    /// Failures in check order.
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    /// Whether every check passed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Converts failures into an aggregated error.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] carrying every failure.
    pub fn into_result(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(ValidationError {
                failures: self.failures,
            }
            .into())
        }
    }

    fn pass(&mut self, check: String, detail: String) {
        self.checks.push(CheckOutcome {
            check,
            passed: true,
            detail,
        });
    }

    fn fail(&mut self, check: String, failure: ValidationFailure) {
        self.checks.push(CheckOutcome {
            check,
            passed: false,
            detail: failure.to_string(),
        });
        self.failures.push(failure);
    }
}

/// Runs tool, version and authentication checks.
pub struct PrerequisiteValidator {
    runner: Arc<dyn CommandRunner>,
    locator: Box<dyn ToolLocator>,
    tools: Vec<ToolRequirement>,
    auth: Vec<AuthProbe>,
}

impl std::fmt::Debug for PrerequisiteValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrerequisiteValidator")
            .field("tools", &self.tools)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl PrerequisiteValidator {
    /// Creates a validator with no checks.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, locator: Box<dyn ToolLocator>) -> Self {
        Self {
            runner,
            locator,
            tools: Vec::new(),
            auth: Vec::new(),
        }
    }

    /// Creates a validator with the checks the settings call for.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured minimum version is malformed.
    pub fn from_settings(runner: Arc<dyn CommandRunner>, settings: &Settings) -> Result<Self> {
        let provider_tool = match settings.provider {
            ProviderKind::Azure => ToolRequirement::azure_cli(parse_minimum(&settings.tools.azure_cli)?),
            ProviderKind::S3 => ToolRequirement::aws_cli(parse_minimum(&settings.tools.aws_cli)?),
        };
        Ok(Self::new(runner, Box::new(PathLocator))
            .require(ToolRequirement::terraform(parse_minimum(&settings.tools.terraform)?))
            .require(provider_tool)
            .authenticate(AuthProbe::for_provider(settings.provider)))
    }

    /// Adds a tool requirement.
    #[must_use]
    pub fn require(mut self, requirement: ToolRequirement) -> Self {
        self.tools.push(requirement);
        self
    }

    /// Adds an authentication probe.
    #[must_use]
    pub fn authenticate(mut self, probe: AuthProbe) -> Self {
        self.auth.push(probe);
        self
    }

    /// Runs every check. Never short-circuits.
    pub async fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut missing: Vec<&str> = Vec::new();

        for requirement in &self.tools {
            let check = format!("{} >= {}", requirement.tool, render(requirement.minimum));
            match self.check_tool(requirement).await {
                Ok(detail) => report.pass(check, detail),
                Err(failure) => {
                    if matches!(failure, ValidationFailure::ToolMissing { .. }) {
                        missing.push(&requirement.tool);
                    }
                    report.fail(check, failure);
                }
            }
        }

        for probe in &self.auth {
            let check = format!("{} session", probe.provider);
            if missing.contains(&probe.tool.as_str()) {
                // Already reported as missing; probing would only repeat that.
                debug!("Skipping {check}: {} is not installed", probe.tool);
                continue;
            }
            match self.check_auth(probe).await {
                Ok(()) => report.pass(check, String::from("authenticated")),
                Err(failure) => report.fail(check, failure),
            }
        }

        if report.is_ok() {
            info!("All {} prerequisite check(s) passed", report.checks.len());
        } else {
            warn!("{} prerequisite check(s) failed", report.failures.len());
        }
        report
    }

    async fn check_tool(
        &self,
        requirement: &ToolRequirement,
    ) -> std::result::Result<String, ValidationFailure> {
        let tool = requirement.tool.clone();
        let Some(path) = self.locator.locate(&tool) else {
            return Err(ValidationFailure::ToolMissing { tool });
        };
        debug!("Found {tool} at {}", path.display());

        let invocation = Invocation::new(path.display().to_string(), requirement.version_args.clone());
        let output = self
            .runner
            .run(&invocation)
            .await
            .map_err(|e| ValidationFailure::VersionUnreadable {
                tool: tool.clone(),
                message: e.to_string(),
            })?;
        if !output.success() {
            return Err(ValidationFailure::VersionUnreadable {
                tool,
                message: output.diagnostic(),
            });
        }

        let version = parse_version(&output.stdout, &requirement.pattern).map_err(|e| {
            ValidationFailure::VersionUnreadable {
                tool: tool.clone(),
                message: e.to_string(),
            }
        })?;

        if version_satisfies(version, requirement.minimum) {
            Ok(render(version))
        } else {
            Err(ValidationFailure::ToolOutdated {
                tool,
                found: render(version),
                minimum: render(requirement.minimum),
            })
        }
    }

    async fn check_auth(&self, probe: &AuthProbe) -> std::result::Result<(), ValidationFailure> {
        let invocation = Invocation::new(probe.tool.clone(), probe.args.clone());
        let output = self.runner.run(&invocation).await.map_err(|e| {
            ValidationFailure::AuthMissing {
                provider: probe.provider.clone(),
                message: e.to_string(),
            }
        })?;
        if output.success() {
            Ok(())
        } else {
            Err(ValidationFailure::AuthMissing {
                provider: probe.provider.clone(),
                message: output.diagnostic(),
            })
        }
    }
}
