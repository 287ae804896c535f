//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ConfigRegistry, DeploymentRequest, FeatureFlags, SecretHandle};
use crate::error::Result;

/// Tiered - t-shirt sized infrastructure deployments.
#[derive(Parser, Debug)]
#[command(name = "tiered")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the settings file.
    #[arg(short, long, global = true, env = "TIERED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log line format (text, json).
    #[arg(long, global = true, default_value = "text", env = "TIERED_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate, bootstrap state, plan, then apply or destroy.
    Deploy {
        /// What to deploy.
        #[command(flatten)]
        request: RequestArgs,

        /// Lifecycle switches.
        #[command(flatten)]
        lifecycle: LifecycleArgs,
    },

    /// List the available tiers and what each supports.
    Tiers,

    /// Check tools and authentication without changing anything.
    Validate,

    /// Generate the overlay file without touching infrastructure.
    Overlay {
        /// What to generate for.
        #[command(flatten)]
        request: RequestArgs,
    },
}

/// Parameters describing the deployment.
#[derive(Args, Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct RequestArgs {
    /// Tier: xs, s, m or l.
    #[arg(short, long, env = "TIERED_TIER")]
    pub tier: String,

    /// Environment name, e.g. dev or prod.
    #[arg(short, long, env = "TIERED_ENVIRONMENT")]
    pub environment: String,

    /// Primary region.
    #[arg(short, long, env = "TIERED_REGION")]
    pub region: String,

    /// Owner written to resource tags.
    #[arg(long, env = "TIERED_OWNER")]
    pub owner: String,

    /// Secondary region for multi-region replication.
    #[arg(long)]
    pub secondary_region: Option<String>,

    /// Secret passed to the backend, as NAME=ENV_VAR (repeatable).
    #[arg(long = "secret", value_name = "NAME=ENV_VAR")]
    pub secrets: Vec<String>,

    /// Enable DDoS protection (medium and large tiers).
    #[arg(long)]
    pub enable_ddos_protection: bool,

    /// Enable a private cluster (small tier and up).
    #[arg(long)]
    pub enable_private_cluster: bool,

    /// Replicate to the secondary region (large tier).
    #[arg(long)]
    pub enable_multi_region: bool,

    /// Append a random suffix if the state storage name is taken.
    #[arg(long)]
    pub auto_suffix: bool,
}

/// Lifecycle switches for `deploy`.
#[derive(Args, Debug, Clone, Copy, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct LifecycleArgs {
    /// Skip prerequisite validation.
    #[arg(long)]
    pub skip_validation: bool,

    /// Skip the destroy confirmation prompt.
    #[arg(short = 'y', long)]
    pub auto_approve: bool,

    /// Stop after planning.
    #[arg(long)]
    pub dry_run: bool,

    /// Destroy the environment instead of applying.
    #[arg(long)]
    pub destroy: bool,
}

impl RequestArgs {
    /// Resolves the tier and secrets and builds a validated request.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown tier, an unresolvable secret or an
    /// invalid parameter.
    pub fn to_request(
        &self,
        registry: &ConfigRegistry,
        lifecycle: LifecycleArgs,
    ) -> Result<DeploymentRequest> {
        let tier = registry.lookup(&self.tier)?.tier;
        let secrets = self
            .secrets
            .iter()
            .map(|reference| SecretHandle::from_env_reference(reference))
            .collect::<Result<Vec<_>>>()?;

        let flags = FeatureFlags {
            enable_ddos_protection: self.enable_ddos_protection,
            enable_private_cluster: self.enable_private_cluster,
            enable_multi_region: self.enable_multi_region,
            dry_run: lifecycle.dry_run,
            auto_approve: lifecycle.auto_approve,
            skip_validation: lifecycle.skip_validation,
            destroy: lifecycle.destroy,
            auto_suffix: self.auto_suffix,
        };

        DeploymentRequest::new(
            tier,
            self.environment.trim(),
            self.region.as_str(),
            self.owner.as_str(),
            self.secondary_region.clone(),
            secrets,
            flags,
        )
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log line format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tier;
    use crate::error::FailureKind;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("valid arguments")
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_deploy_arguments() {
        let cli = parse(&[
            "tiered", "deploy", "--tier", "l", "-e", "prod", "-r", "westeurope", "--owner",
            "platform", "--enable-multi-region", "--secondary-region", "northeurope", "-y",
            "--destroy",
        ]);
        let Commands::Deploy { request, lifecycle } = cli.command else {
            panic!("expected deploy");
        };
        assert!(lifecycle.auto_approve && lifecycle.destroy && !lifecycle.dry_run);

        let req = request
            .to_request(&ConfigRegistry::new(), lifecycle)
            .expect("valid request");
        assert_eq!(req.tier, Tier::Large);
        assert_eq!(req.secondary_region.as_deref(), Some("northeurope"));
        assert!(req.flags.enable_multi_region && req.flags.destroy);
    }

    #[test]
    fn test_unknown_tier() {
        let cli = parse(&[
            "tiered", "overlay", "--tier", "xxl", "-e", "dev", "-r", "westeurope", "--owner", "me",
        ]);
        let Commands::Overlay { request } = cli.command else {
            panic!("expected overlay");
        };
        let err = request
            .to_request(&ConfigRegistry::new(), LifecycleArgs::default())
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnknownTier);
    }

    #[test]
    fn test_global_flags() {
        let cli = parse(&["tiered", "--output", "json", "--log-format", "json", "-v", "tiers"]);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Tiers));
    }
}
