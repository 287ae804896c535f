//! Tiered CLI entrypoint.
//!
//! This is the main entrypoint for the `tiered` command-line tool.

use std::process::ExitCode;
use std::sync::Arc;

use tiered_deploy::backend::{CommandRunner, ProcessRunner, TerraformEngine};
use tiered_deploy::cli::{Cli, Commands, LifecycleArgs, LogFormat, OutputFormat, RequestArgs, SummaryReporter};
use tiered_deploy::config::{load_dotenv, ConfigRegistry, ProviderKind, Settings};
use tiered_deploy::error::Result;
use tiered_deploy::lifecycle::{LifecycleExecutor, StdinConfirmation};
use tiered_deploy::orchestrator::Orchestrator;
use tiered_deploy::overlay::OverlayGenerator;
use tiered_deploy::prerequisites::PrerequisiteValidator;
use tiered_deploy::state::{
    AzureCliProvider, DescriptorStore, S3Provider, StateBackendBootstrapper, StateProvider,
};

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    let reporter = SummaryReporter::new(cli.output);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli, reporter)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprint!("{}", reporter.error(&e));
            ExitCode::from(e.kind().exit_code())
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` wins over the verbosity flag when set.
fn init_logging(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point. Returns the process exit code.
async fn run(cli: Cli, reporter: SummaryReporter) -> Result<u8> {
    load_dotenv()?;
    let settings = Settings::load(cli.config.as_deref())?;
    let registry = ConfigRegistry::new();

    match cli.command {
        Commands::Deploy { request, lifecycle } => {
            cmd_deploy(&settings, &registry, &request, lifecycle, reporter, cli.output).await
        }
        Commands::Tiers => {
            println!("{}", reporter.tiers(&registry));
            Ok(0)
        }
        Commands::Validate => cmd_validate(&settings, reporter).await,
        Commands::Overlay { request } => {
            cmd_overlay(&settings, &registry, &request, reporter).await
        }
    }
}

/// Runs one deployment.
async fn cmd_deploy(
    settings: &Settings,
    registry: &ConfigRegistry,
    args: &RequestArgs,
    lifecycle: LifecycleArgs,
    reporter: SummaryReporter,
    format: OutputFormat,
) -> Result<u8> {
    let request = args.to_request(registry, lifecycle)?;
    let tier = registry.get(request.tier);
    let overlay = OverlayGenerator::new(settings.project.as_str()).generate(tier, &request);

    if format == OutputFormat::Text {
        eprintln!("{}", reporter.preflight(&request, tier, &overlay, settings));
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner);
    let provider = build_provider(settings.provider, Arc::clone(&runner), &request.region).await;
    let bootstrapper = StateBackendBootstrapper::new(
        provider,
        DescriptorStore::with_base_dir(settings.descriptor_dir()),
        settings.state.clone(),
    );
    let engine = TerraformEngine::new(Arc::clone(&runner), settings.terraform_dir.clone());
    let executor = LifecycleExecutor::new(
        engine,
        bootstrapper,
        Box::new(StdinConfirmation),
        settings.plan_dir(),
    );
    let validator = PrerequisiteValidator::from_settings(runner, settings)?;

    let mut orchestrator = Orchestrator::new(settings, validator, executor);
    let result = orchestrator.run(&request, &overlay).await;

    println!("{}", reporter.result(&result));
    Ok(result.exit_code())
}

/// Checks tools and authentication.
async fn cmd_validate(settings: &Settings, reporter: SummaryReporter) -> Result<u8> {
    info!("Checking prerequisites for provider {}", settings.provider);
    let validator = PrerequisiteValidator::from_settings(Arc::new(ProcessRunner), settings)?;
    let report = validator.validate().await;

    println!("{}", reporter.validation(&report));
    Ok(match report.into_result() {
        Ok(_) => 0,
        Err(e) => e.kind().exit_code(),
    })
}

/// Writes the overlay without touching infrastructure.
async fn cmd_overlay(
    settings: &Settings,
    registry: &ConfigRegistry,
    args: &RequestArgs,
    reporter: SummaryReporter,
) -> Result<u8> {
    let request = args.to_request(registry, LifecycleArgs::default())?;
    let overlay = OverlayGenerator::new(settings.project.as_str())
        .generate(registry.get(request.tier), &request);
    let artifact = overlay.write_to(&settings.overlay_dir()).await?;

    println!("{}", reporter.overlay(&artifact));
    Ok(0)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Creates the state provider for the configured kind.
async fn build_provider(
    kind: ProviderKind,
    runner: Arc<dyn CommandRunner>,
    region: &str,
) -> Box<dyn StateProvider> {
    debug!("Using {kind} state provider");
    match kind {
        ProviderKind::Azure => Box::new(AzureCliProvider::new(runner)),
        ProviderKind::S3 => Box::new(S3Provider::new(Some(region)).await),
    }
}
