//! State provider trait definition.
//!
//! This module defines the operations the bootstrapper needs from a cloud
//! provider to create the remote state container.

use async_trait::async_trait;

use crate::config::ProviderKind;
use crate::error::Result;

/// Tag recording which environment a storage resource was created for.
pub const ENVIRONMENT_TAG: &str = "tiered-environment";

/// Provider operations used to bootstrap remote state.
///
/// Every call is a read-only query or an idempotent create.
#[async_trait]
pub trait StateProvider: Send + Sync {
    /// Which provider this is.
    fn kind(&self) -> ProviderKind;

    /// Longest storage name the provider accepts.
    fn max_account_name_len(&self) -> usize;

    /// Whether [`list_accounts`](Self::list_accounts) only returns storage
    /// inside the given group. Providers without real groups list everything
    /// the caller owns.
    fn lists_by_group(&self) -> bool;

    /// Checks whether the state-holding group exists.
    async fn group_exists(&self, group: &str) -> Result<bool>;

    /// Creates the state-holding group.
    async fn create_group(&self, group: &str, region: &str) -> Result<()>;

    /// Lists storage names already present in the group.
    async fn list_accounts(&self, group: &str) -> Result<Vec<String>>;

    /// Checks whether a storage name is free provider-wide.
    async fn account_name_available(&self, name: &str) -> Result<bool>;

    /// Creates the storage resource, tagged with `environment`.
    async fn create_account(
        &self,
        group: &str,
        name: &str,
        region: &str,
        environment: &str,
    ) -> Result<()>;

    /// Reads the [`ENVIRONMENT_TAG`] of a storage resource, if it has one.
    async fn account_environment(&self, group: &str, name: &str) -> Result<Option<String>>;

    /// Checks whether the container exists inside the storage.
    async fn container_exists(&self, account: &str, container: &str) -> Result<bool>;

    /// Creates the container inside the storage.
    async fn create_container(&self, account: &str, container: &str) -> Result<()>;
}

#[async_trait]
impl StateProvider for Box<dyn StateProvider> {
    fn kind(&self) -> ProviderKind {
        (**self).kind()
    }

    fn max_account_name_len(&self) -> usize {
        (**self).max_account_name_len()
    }

    fn lists_by_group(&self) -> bool {
        (**self).lists_by_group()
    }

    async fn group_exists(&self, group: &str) -> Result<bool> {
        (**self).group_exists(group).await
    }

    async fn create_group(&self, group: &str, region: &str) -> Result<()> {
        (**self).create_group(group, region).await
    }

    async fn list_accounts(&self, group: &str) -> Result<Vec<String>> {
        (**self).list_accounts(group).await
    }

    async fn account_name_available(&self, name: &str) -> Result<bool> {
        (**self).account_name_available(name).await
    }

    async fn create_account(
        &self,
        group: &str,
        name: &str,
        region: &str,
        environment: &str,
    ) -> Result<()> {
        (**self).create_account(group, name, region, environment).await
    }

    async fn account_environment(&self, group: &str, name: &str) -> Result<Option<String>> {
        (**self).account_environment(group, name).await
    }

    async fn container_exists(&self, account: &str, container: &str) -> Result<bool> {
        (**self).container_exists(account, container).await
    }

    async fn create_container(&self, account: &str, container: &str) -> Result<()> {
        (**self).create_container(account, container).await
    }
}
