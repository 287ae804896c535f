//! Azure state provider backed by the `az` CLI.
//!
//! Remote state lives in a blob container inside a storage account, inside a
//! resource group. Storage account names are global, 3-24 characters of
//! lowercase letters and digits.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::backend::{CommandOutput, CommandRunner, Invocation};
use crate::config::ProviderKind;
use crate::error::{BootstrapError, Result};

use super::provider::{StateProvider, ENVIRONMENT_TAG};

/// Maximum storage account name length.
pub const AZURE_MAX_ACCOUNT_LEN: usize = 24;

const AZ: &str = "az";

/// [`StateProvider`] for Azure storage.
#[derive(Clone)]
pub struct AzureCliProvider {
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for AzureCliProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCliProvider").finish_non_exhaustive()
    }
}

impl AzureCliProvider {
    /// Creates a provider that runs `az` through `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn az(&self, operation: &str, args: &[&str]) -> Result<CommandOutput> {
        let invocation = Invocation::new(AZ, args.iter().copied());
        let output = self.runner.run(&invocation).await?;
        if !output.success() {
            return Err(BootstrapError::provider(operation, output.diagnostic()).into());
        }
        Ok(output)
    }

    async fn az_bool(&self, operation: &str, args: &[&str]) -> Result<bool> {
        let output = self.az(operation, args).await?;
        parse_bool(&output.stdout)
            .ok_or_else(|| {
                BootstrapError::provider(
                    operation,
                    format!("unexpected output '{}'", output.stdout.trim()),
                )
            })
            .map_err(Into::into)
    }
}

fn parse_bool(stdout: &str) -> Option<bool> {
    match stdout.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[async_trait]
impl StateProvider for AzureCliProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn max_account_name_len(&self) -> usize {
        AZURE_MAX_ACCOUNT_LEN
    }

    fn lists_by_group(&self) -> bool {
        true
    }

    async fn group_exists(&self, group: &str) -> Result<bool> {
        self.az_bool("group exists", &["group", "exists", "--name", group])
            .await
    }

    async fn create_group(&self, group: &str, region: &str) -> Result<()> {
        info!("Creating resource group {group} in {region}");
        self.az(
            "group create",
            &[
                "group", "create", "--name", group, "--location", region, "--output", "none",
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_accounts(&self, group: &str) -> Result<Vec<String>> {
        let output = self
            .az(
                "storage account list",
                &[
                    "storage",
                    "account",
                    "list",
                    "--resource-group",
                    group,
                    "--query",
                    "[].name",
                    "--output",
                    "tsv",
                ],
            )
            .await?;
        let accounts: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        debug!("Found {} storage account(s) in {group}", accounts.len());
        Ok(accounts)
    }

    async fn account_name_available(&self, name: &str) -> Result<bool> {
        self.az_bool(
            "storage account check-name",
            &[
                "storage",
                "account",
                "check-name",
                "--name",
                name,
                "--query",
                "nameAvailable",
                "--output",
                "tsv",
            ],
        )
        .await
    }

    async fn create_account(
        &self,
        group: &str,
        name: &str,
        region: &str,
        environment: &str,
    ) -> Result<()> {
        info!("Creating storage account {name} in {group}");
        let tag = format!("{ENVIRONMENT_TAG}={environment}");
        self.az(
            "storage account create",
            &[
                "storage",
                "account",
                "create",
                "--name",
                name,
                "--resource-group",
                group,
                "--location",
                region,
                "--sku",
                "Standard_LRS",
                "--kind",
                "StorageV2",
                "--min-tls-version",
                "TLS1_2",
                "--allow-blob-public-access",
                "false",
                "--tags",
                tag.as_str(),
                "--output",
                "none",
            ],
        )
        .await?;
        Ok(())
    }

    async fn account_environment(&self, group: &str, name: &str) -> Result<Option<String>> {
        let query = format!("tags.\"{ENVIRONMENT_TAG}\"");
        let output = self
            .az(
                "storage account show",
                &[
                    "storage",
                    "account",
                    "show",
                    "--name",
                    name,
                    "--resource-group",
                    group,
                    "--query",
                    query.as_str(),
                    "--output",
                    "tsv",
                ],
            )
            .await?;
        let tag = output.stdout.trim();
        Ok((!tag.is_empty()).then(|| tag.to_string()))
    }

    async fn container_exists(&self, account: &str, container: &str) -> Result<bool> {
        self.az_bool(
            "storage container exists",
            &[
                "storage",
                "container",
                "exists",
                "--account-name",
                account,
                "--name",
                container,
                "--auth-mode",
                "login",
                "--query",
                "exists",
                "--output",
                "tsv",
            ],
        )
        .await
    }

    async fn create_container(&self, account: &str, container: &str) -> Result<()> {
        info!("Creating container {container} in {account}");
        self.az(
            "storage container create",
            &[
                "storage",
                "container",
                "create",
                "--account-name",
                account,
                "--name",
                container,
                "--auth-mode",
                "login",
                "--output",
                "none",
            ],
        )
        .await?;
        Ok(())
    }
}
