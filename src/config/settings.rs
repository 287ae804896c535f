//! Orchestrator settings.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! `TIERED_*` environment variables. Command-line flags are applied by the
//! caller on top of the result.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, DeployError, Result};

/// Default settings file name looked up in the current directory.
pub const SETTINGS_FILE: &str = "tiered.yaml";

/// Which provider hosts the remote state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Azure resource group, storage account and blob container.
    #[default]
    Azure,
    /// AWS S3 bucket.
    S3,
}

impl ProviderKind {
    /// Lowercase provider name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Azure => "azure",
            Self::S3 => "s3",
        }
    }

    /// Command-line tool used to talk to the provider.
    #[must_use]
    pub const fn cli_tool(self) -> &'static str {
        match self {
            Self::Azure => "az",
            Self::S3 => "aws",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure" | "azurerm" => Ok(Self::Azure),
            "s3" | "aws" => Ok(Self::S3),
            other => Err(ConfigError::invalid(
                "provider",
                format!("'{other}' is not a supported provider (azure, s3)"),
            )),
        }
    }
}

/// How state backend resources are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateNaming {
    /// Prefix of the state-holding group; the environment is appended.
    pub group_prefix: String,
    /// Prefix of the globally unique storage name; the environment is appended.
    pub account_prefix: String,
    /// Container (or key prefix) holding state artifacts.
    pub container: String,
    /// Number of suffixed candidates tried on a name collision.
    pub suffix_attempts: u32,
}

impl Default for StateNaming {
    fn default() -> Self {
        Self {
            group_prefix: String::from("rg-tfstate"),
            account_prefix: String::from("sttfstate"),
            container: String::from("tfstate"),
            suffix_attempts: 5,
        }
    }
}

/// Minimum tool versions checked before any mutating action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolMinimums {
    /// Minimum `terraform` version.
    pub terraform: String,
    /// Minimum `az` version.
    pub azure_cli: String,
    /// Minimum `aws` version.
    pub aws_cli: String,
}

impl Default for ToolMinimums {
    fn default() -> Self {
        Self {
            terraform: String::from("1.5.0"),
            azure_cli: String::from("2.50.0"),
            aws_cli: String::from("2.0.0"),
        }
    }
}

/// Complete orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Project name written to tags.
    pub project: String,
    /// State provider.
    pub provider: ProviderKind,
    /// Directory holding the declarative resource modules.
    pub terraform_dir: PathBuf,
    /// Directory for overlays, plans and descriptor records.
    pub work_dir: PathBuf,
    /// State backend naming.
    pub state: StateNaming,
    /// Tool version floors.
    pub tools: ToolMinimums,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project: String::from("tiered"),
            provider: ProviderKind::default(),
            terraform_dir: PathBuf::from("infra"),
            work_dir: PathBuf::from(".tiered"),
            state: StateNaming::default(),
            tools: ToolMinimums::default(),
        }
    }
}

impl Settings {
    /// Loads settings from an explicit path, or `tiered.yaml` if present,
    /// then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, or any file is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::load_file(path)?,
            None if Path::new(SETTINGS_FILE).exists() => Self::load_file(Path::new(SETTINGS_FILE))?,
            None => {
                debug!("No settings file, using defaults");
                Self::default()
            }
        };

        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a YAML file without overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(path: &Path) -> Result<Self> {
        info!("Loading settings from: {}", path.display());

        if !path.exists() {
            return Err(DeployError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        Self::parse_yaml(&content, Some(path))
    }

    /// Parses settings from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(content: &str, source: Option<&Path>) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            DeployError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })
    }

    /// Applies `TIERED_*` environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(provider) = std::env::var("TIERED_PROVIDER") {
            debug!("Overriding provider from environment");
            self.provider = provider.parse()?;
        }

        if let Ok(dir) = std::env::var("TIERED_TERRAFORM_DIR") {
            debug!("Overriding terraform_dir from environment");
            self.terraform_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("TIERED_WORK_DIR") {
            debug!("Overriding work_dir from environment");
            self.work_dir = PathBuf::from(dir);
        }

        if let Ok(prefix) = std::env::var("TIERED_STATE_GROUP_PREFIX") {
            debug!("Overriding state.group_prefix from environment");
            self.state.group_prefix = prefix;
        }

        if let Ok(prefix) = std::env::var("TIERED_STATE_ACCOUNT_PREFIX") {
            debug!("Overriding state.account_prefix from environment");
            self.state.account_prefix = prefix;
        }

        Ok(())
    }

    /// Checks settings for values that would produce unusable names.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        if self.state.group_prefix.trim().is_empty() {
            return Err(ConfigError::invalid("state.group_prefix", "cannot be empty").into());
        }
        if !self
            .state
            .account_prefix
            .chars()
            .any(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::invalid(
                "state.account_prefix",
                "must contain at least one letter or digit",
            )
            .into());
        }
        if self.state.container.trim().is_empty() {
            return Err(ConfigError::invalid("state.container", "cannot be empty").into());
        }
        if self.state.suffix_attempts == 0 {
            return Err(ConfigError::invalid("state.suffix_attempts", "must be at least 1").into());
        }
        Ok(())
    }

    /// Directory where overlay artifacts are written.
    #[must_use]
    pub fn overlay_dir(&self) -> PathBuf {
        self.work_dir.join("overlays")
    }

    /// Directory where plan artifacts are written.
    #[must_use]
    pub fn plan_dir(&self) -> PathBuf {
        self.work_dir.join("plans")
    }

    /// Directory where resolved state backend descriptors are recorded.
    #[must_use]
    pub fn descriptor_dir(&self) -> PathBuf {
        self.work_dir.join("backends")
    }
}

/// Loads a `.env` file from the current directory if present.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be parsed.
pub fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!("Loaded environment from {}", path.display());
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(ConfigError::ParseError {
            message: format!("Failed to load .env: {e}"),
            location: Some(String::from(".env")),
        }
        .into()),
    }
}
