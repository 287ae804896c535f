//! Output formatting for CLI commands.
//!
//! [`SummaryReporter`] renders everything the operator sees: the pre-flight
//! summary, the run result with follow-on guidance, the tier catalogue and
//! the validation report. Rendering is pure; callers decide where it goes.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ConfigRegistry, DeploymentRequest, Feature, Settings, TierDefinition};
use crate::error::{DeployError, FailureKind};
use crate::lifecycle::Phase;
use crate::orchestrator::DeploymentResult;
use crate::overlay::{ConfigurationOverlay, OverlayArtifact};
use crate::prerequisites::ValidationReport;

use super::commands::OutputFormat;

/// Renders summaries in the selected format.
#[derive(Debug, Clone, Copy)]
pub struct SummaryReporter {
    /// Output format.
    format: OutputFormat,
}

/// Tier row for table display.
#[derive(Tabled)]
struct TierRow {
    #[tabled(rename = "Tier")]
    code: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Users")]
    users: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "SLA")]
    sla: String,
    #[tabled(rename = "Setup")]
    setup: String,
    #[tabled(rename = "Nodes")]
    nodes: String,
    #[tabled(rename = "Features")]
    features: String,
}

/// Check row for table display.
#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Check")]
    check: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Output row for table display.
#[derive(Tabled)]
struct OutputRow {
    #[tabled(rename = "Output")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl SummaryReporter {
    /// Creates a new reporter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Renders the request, tier facts and flag effects before a run.
    #[must_use]
    pub fn preflight(
        &self,
        request: &DeploymentRequest,
        tier: &TierDefinition,
        overlay: &ConfigurationOverlay,
        settings: &Settings,
    ) -> String {
        let applied: Vec<Feature> = Feature::ALL
            .into_iter()
            .filter(|f| overlay.is_enabled(f.overlay_key()))
            .collect();
        let secrets: Vec<&str> = overlay.secrets().iter().map(|s| s.name()).collect();

        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "request": request,
                "tier": tier,
                "features": {
                    "applied": applied,
                    "ignored": overlay.ignored_features(),
                },
                "secrets": secrets,
                "provider": settings.provider,
                "terraform_dir": settings.terraform_dir,
            })),
            OutputFormat::Text => {
                let mut output = String::new();
                let action = if request.flags.destroy {
                    "Destroy".red().bold().to_string()
                } else if request.flags.dry_run {
                    "Plan only".cyan().bold().to_string()
                } else {
                    "Deploy".green().bold().to_string()
                };

                let _ = write!(
                    output,
                    "\n🚀 {action}: {} ({})\n\n",
                    request.environment.bold(),
                    tier.metadata.display_name
                );
                let _ = writeln!(output, "   Region:      {}", request.region);
                if let Some(secondary) = &request.secondary_region {
                    let _ = writeln!(output, "   Secondary:   {secondary}");
                }
                let _ = writeln!(output, "   Owner:       {}", request.owner);
                let _ = writeln!(output, "   Provider:    {}", settings.provider);
                let _ = writeln!(output, "   Users:       {}", tier.metadata.users);
                let _ = writeln!(output, "   Cost:        {}", tier.metadata.cost_band);
                let _ = writeln!(output, "   SLA:         {}", tier.metadata.sla);
                let _ = writeln!(output, "   Setup time:  {}", tier.metadata.setup_time);
                let _ = writeln!(
                    output,
                    "   Nodes:       {} (max {}, {})",
                    tier.parameters.cluster_node_count,
                    tier.parameters.cluster_max_nodes,
                    tier.parameters.cluster_node_size
                );

                if !applied.is_empty() {
                    let _ = writeln!(output, "   Features:    {}", join(&applied).green());
                }
                if !overlay.ignored_features().is_empty() {
                    let _ = writeln!(
                        output,
                        "   {} Ignored on tier {}: {}",
                        "⚠".yellow(),
                        tier.tier,
                        join(overlay.ignored_features())
                    );
                }
                if !secrets.is_empty() {
                    let _ = writeln!(output, "   Secrets:     {}", secrets.join(", "));
                }

                let mut switches = Vec::new();
                if request.flags.skip_validation {
                    switches.push("skip-validation");
                }
                if request.flags.auto_approve {
                    switches.push("auto-approve");
                }
                if request.flags.auto_suffix {
                    switches.push("auto-suffix");
                }
                if !switches.is_empty() {
                    let _ = writeln!(output, "   Switches:    {}", switches.join(", ").dimmed());
                }
                output
            }
        }
    }

    /// Renders a finished run with follow-on guidance.
    #[must_use]
    pub fn result(&self, result: &DeploymentResult) -> String {
        let guidance = guidance(result);
        match self.format {
            OutputFormat::Json => to_json(&ResultJson {
                result,
                exit_code: result.exit_code(),
                guidance: &guidance,
            }),
            OutputFormat::Text => {
                let mut output = String::new();
                let headline = match result.phase {
                    Phase::Applied => format!("{} Applied", "✓".green()),
                    Phase::Destroyed => format!("{} Destroyed", "✓".green()),
                    Phase::Planned if result.dry_run => format!("{} Planned (dry run)", "✓".green()),
                    phase => format!("{} {phase}", "✗".red()),
                };
                let _ = write!(
                    output,
                    "\n{headline}: {} [{}] in {}s\n\n",
                    result.environment,
                    result.tier,
                    result.duration_secs()
                );

                if let Some(plan) = &result.plan {
                    let _ = writeln!(output, "   Plan:     {plan}");
                }
                if let Some(descriptor) = &result.descriptor {
                    let _ = writeln!(
                        output,
                        "   State:    {}/{}/{}/{}",
                        descriptor.group, descriptor.account, descriptor.container, descriptor.key
                    );
                }
                if let Some(path) = &result.overlay_path {
                    let _ = writeln!(output, "   Overlay:  {}", path.display());
                }
                let _ = writeln!(output, "   Run:      {}", result.run_id);

                if let Some(failure) = &result.failure {
                    let _ = write!(
                        output,
                        "\n{} {} during {}: {}\n",
                        "✗".red(),
                        failure.kind.to_string().red().bold(),
                        failure.phase,
                        failure.message
                    );
                    for detail in &failure.details {
                        let _ = writeln!(output, "   - {detail}");
                    }
                    if failure.retryable {
                        let _ = writeln!(output, "   {}", "(retryable)".yellow());
                    }
                }

                if !result.outputs.is_empty() {
                    let rows: Vec<OutputRow> = result
                        .outputs
                        .iter()
                        .map(|(name, value)| OutputRow {
                            name: name.clone(),
                            value: truncate(value, 60),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !guidance.is_empty() {
                    output.push_str("\nNext steps:\n");
                    for line in &guidance {
                        let _ = writeln!(output, "   • {line}");
                    }
                }
                output
            }
        }
    }

    /// Renders the tier catalogue and gating table.
    #[must_use]
    pub fn tiers(&self, registry: &ConfigRegistry) -> String {
        match self.format {
            OutputFormat::Json => {
                let tiers: Vec<&TierDefinition> = registry.iter().collect();
                to_json(&tiers)
            }
            OutputFormat::Text => {
                let rows: Vec<TierRow> = registry
                    .iter()
                    .map(|d| TierRow {
                        code: d.tier.code().to_string(),
                        name: d.metadata.display_name.to_string(),
                        users: d.metadata.users.to_string(),
                        cost: d.metadata.cost_band.to_string(),
                        sla: d.metadata.sla.to_string(),
                        setup: d.metadata.setup_time.to_string(),
                        nodes: format!(
                            "{}-{} × {}",
                            d.parameters.cluster_node_count,
                            d.parameters.cluster_max_nodes,
                            d.parameters.cluster_node_size
                        ),
                        features: join(d.features),
                    })
                    .collect();

                let mut output = String::from("\n📐 Tiers\n\n");
                output.push_str(&Table::new(rows).to_string());
                output.push_str("\n\nFeature gating:\n");
                for feature in Feature::ALL {
                    let tiers: Vec<String> = registry
                        .tiers_supporting(feature)
                        .iter()
                        .map(ToString::to_string)
                        .collect();
                    let _ = writeln!(output, "   {feature:<16} {}", tiers.join(", "));
                }
                output.push_str(
                    "\nA feature requested on a tier that does not support it is ignored.\n",
                );
                output
            }
        }
    }

    /// Renders a prerequisite validation report.
    #[must_use]
    pub fn validation(&self, report: &ValidationReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                let rows: Vec<CheckRow> = report
                    .checks
                    .iter()
                    .map(|c| CheckRow {
                        check: c.check.clone(),
                        result: if c.passed {
                            "ok".green().to_string()
                        } else {
                            "failed".red().to_string()
                        },
                        detail: truncate(&c.detail, 70),
                    })
                    .collect();

                let mut output = String::from("\n🔎 Prerequisites\n\n");
                if rows.is_empty() {
                    output.push_str("   No checks configured.\n");
                } else {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }
                if report.is_ok() {
                    let _ = write!(output, "\n{} All checks passed\n", "✓".green());
                } else {
                    let _ = write!(
                        output,
                        "\n{} {} blocker(s) to fix before deploying\n",
                        "✗".red(),
                        report.failures.len()
                    );
                }
                output
            }
        }
    }

    /// Renders the location and content summary of a written overlay.
    #[must_use]
    pub fn overlay(&self, artifact: &OverlayArtifact) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "path": artifact.path,
                "digest": artifact.digest,
                "values": artifact.overlay.values(),
                "ignored": artifact.overlay.ignored_features(),
                "secrets": artifact.overlay.secrets(),
            })),
            OutputFormat::Text => {
                let mut output = format!(
                    "{} Overlay written to {}\n   sha256 {}\n",
                    "✓".green(),
                    artifact.path.display(),
                    &artifact.digest[..12.min(artifact.digest.len())]
                );
                let _ = writeln!(output, "   {} value(s)", artifact.overlay.values().len());
                if !artifact.overlay.ignored_features().is_empty() {
                    let _ = writeln!(
                        output,
                        "   {} ignored: {}",
                        "⚠".yellow(),
                        join(artifact.overlay.ignored_features())
                    );
                }
                output
            }
        }
    }

    /// Renders an error raised before a run could start.
    #[must_use]
    pub fn error(&self, error: &DeployError) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "status": "error",
                "kind": error.kind(),
                "message": error.to_string(),
                "exit_code": error.kind().exit_code(),
            })),
            OutputFormat::Text => format!("{} {}: {error}\n", "✗".red(), error.kind()),
        }
    }
}

#[derive(Serialize)]
struct ResultJson<'a> {
    #[serde(flatten)]
    result: &'a DeploymentResult,
    exit_code: u8,
    guidance: &'a [String],
}

/// Follow-on advice for a finished run.
#[must_use]
pub fn guidance(result: &DeploymentResult) -> Vec<String> {
    let env = &result.environment;
    let tier = result.tier.code();
    if let Some(failure) = &result.failure {
        let advice = match failure.kind {
            FailureKind::ToolMissing => "Install or upgrade the tools listed above, then re-run.",
            FailureKind::AuthMissing => {
                "Log in to the provider (`az login` or `aws configure`), then re-run."
            }
            FailureKind::NameCollision => {
                "The state storage name is taken; re-run with --auto-suffix to pick a unique one."
            }
            FailureKind::DestroyNotConfirmed => {
                "Nothing was changed. Re-run and answer 'yes', or pass --auto-approve."
            }
            FailureKind::InitFailure | FailureKind::PlanFailure | FailureKind::ApplyFailure
                if failure.retryable =>
            {
                "Another run holds the state lock. Wait for it to finish, then re-run."
            }
            FailureKind::ApplyFailure | FailureKind::DestroyFailure => {
                "Infrastructure may be partially changed. Fix the cause and re-run; the next plan shows what remains."
            }
            _ => "Fix the cause above and re-run; completed steps are safe to repeat.",
        };
        return vec![advice.to_string()];
    }

    match result.phase {
        Phase::Planned if result.dry_run => vec![format!(
            "Review the plan, then apply with `tiered deploy --tier {tier} --environment {env} ...` without --dry-run."
        )],
        Phase::Applied => vec![
            String::from("Review the outputs above."),
            format!("Re-run the same command to converge {env} after changes; state is reused."),
            format!("Tear down with `tiered deploy --tier {tier} --environment {env} ... --destroy`."),
        ],
        Phase::Destroyed => vec![format!(
            "The state backend for {env} is kept; a later deploy reuses it."
        )],
        _ => Vec::new(),
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    if items.is_empty() {
        return String::from("-");
    }
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Truncates a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PlanSummary;
    use crate::config::{FeatureFlags, Tier};
    use crate::lifecycle::FailureReport;
    use crate::overlay::{OverlayGenerator, SecretGenerator, DATABASE_PASSWORD};
    use chrono::Utc;
    use uuid::Uuid;

    fn result(phase: Phase, failure: Option<FailureReport>) -> DeploymentResult {
        DeploymentResult {
            run_id: Uuid::new_v4(),
            environment: String::from("prod"),
            tier: Tier::Large,
            phase,
            dry_run: false,
            success: failure.is_none(),
            failure,
            descriptor: None,
            overlay_path: None,
            plan: Some(PlanSummary {
                has_changes: true,
                add: 4,
                change: 0,
                destroy: 0,
            }),
            outputs: [(String::from("endpoint"), String::from("https://api.prod"))]
                .into_iter()
                .collect(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_preflight_shows_ignored_and_hides_secret_values() {
        colored::control::set_override(false);
        let registry = ConfigRegistry::new();
        let flags = FeatureFlags {
            enable_private_cluster: true,
            ..FeatureFlags::default()
        };
        let request = DeploymentRequest::new(Tier::ExtraSmall, "demo", "westeurope", "me", None, vec![], flags)
            .expect("valid request");
        let tier = registry.get(Tier::ExtraSmall);
        let mut generator = OverlayGenerator::new("tiered").with_secret_generator(SecretGenerator::seeded(5));
        let overlay = generator.generate(tier, &request);
        let password = overlay
            .secrets()
            .iter()
            .find(|s| s.name() == DATABASE_PASSWORD)
            .map(|s| s.expose().to_string())
            .expect("generated password");

        for format in [OutputFormat::Text, OutputFormat::Json] {
            let rendered = SummaryReporter::new(format).preflight(&request, tier, &overlay, &Settings::default());
            assert!(rendered.contains("private-cluster") || rendered.contains("private_cluster"));
            assert!(rendered.contains(DATABASE_PASSWORD));
            assert!(!rendered.contains(&password));
        }
    }

    #[test]
    fn test_result_text_includes_failure_and_guidance() {
        colored::control::set_override(false);
        let failure = FailureReport {
            kind: FailureKind::NameCollision,
            phase: Phase::Validated,
            message: String::from("Storage name 'sttfstateprod' is not available"),
            details: vec![],
            retryable: false,
        };
        let text = SummaryReporter::new(OutputFormat::Text).result(&result(Phase::Aborted, Some(failure)));
        assert!(text.contains("NameCollision during Validated"));
        assert!(text.contains("--auto-suffix"));
    }

    #[test]
    fn test_result_json_has_exit_code_and_outputs() {
        let failure = FailureReport {
            kind: FailureKind::PlanFailure,
            phase: Phase::Initialized,
            message: String::from("plan failed"),
            details: vec![String::from("Error: x")],
            retryable: false,
        };
        let json = SummaryReporter::new(OutputFormat::Json).result(&result(Phase::Aborted, Some(failure)));
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["exit_code"], FailureKind::PlanFailure.exit_code());
        assert_eq!(value["failure"]["kind"], "plan_failure");
        assert_eq!(value["phase"], "Aborted");
        assert_eq!(value["outputs"]["endpoint"], "https://api.prod");
    }

    #[test]
    fn test_applied_guidance() {
        let lines = guidance(&result(Phase::Applied, None));
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("--destroy"));
    }

    #[test]
    fn test_tiers_lists_gating() {
        colored::control::set_override(false);
        let text = SummaryReporter::new(OutputFormat::Text).tiers(&ConfigRegistry::new());
        assert!(text.contains("multi-region"));
        assert!(text.contains("99.95%"));
        let json = SummaryReporter::new(OutputFormat::Json).tiers(&ConfigRegistry::new());
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value.as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }
}
