//! S3-based state provider.
//!
//! S3 has no resource group, so the group operations are no-ops, and the
//! container is a key prefix inside the bucket. Bucket names are global and
//! at most 63 characters. Listing returns every bucket the caller owns, so
//! each bucket is tagged with the environment it was created for.

use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration, Tag, Tagging,
    VersioningConfiguration,
};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::config::ProviderKind;
use crate::error::{BootstrapError, Result};

use super::provider::{StateProvider, ENVIRONMENT_TAG};

/// Maximum bucket name length.
pub const S3_MAX_BUCKET_LEN: usize = 63;

/// Region that rejects an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Error code S3 returns for a bucket without tags.
const NO_TAG_SET: &str = "NoSuchTagSet";

/// [`StateProvider`] for S3 buckets.
#[derive(Debug, Clone)]
pub struct S3Provider {
    /// S3 client.
    client: Client,
}

impl S3Provider {
    /// Creates a provider from the ambient AWS configuration.
    pub async fn new(region: Option<&str>) -> Self {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        Self::with_client(Client::new(&config))
    }

    /// Creates a provider with an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StateProvider for S3Provider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::S3
    }

    fn max_account_name_len(&self) -> usize {
        S3_MAX_BUCKET_LEN
    }

    fn lists_by_group(&self) -> bool {
        false
    }

    async fn group_exists(&self, _group: &str) -> Result<bool> {
        Ok(true)
    }

    async fn create_group(&self, _group: &str, _region: &str) -> Result<()> {
        Ok(())
    }

    async fn list_accounts(&self, _group: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| BootstrapError::provider("list buckets", format!("{e}")))?;

        let buckets: Vec<String> = response
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(String::from))
            .collect();
        debug!("Found {} owned bucket(s)", buckets.len());
        Ok(buckets)
    }

    async fn account_name_available(&self, name: &str) -> Result<bool> {
        let result = self.client.head_bucket().bucket(name).send().await;

        match result {
            // Owned buckets are reused through list_accounts; a visible one is taken.
            Ok(_) => Ok(false),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    Ok(true)
                } else {
                    // 403 and friends mean someone else owns it.
                    debug!("head bucket {name}: {service_err}");
                    Ok(false)
                }
            }
        }
    }

    async fn create_account(
        &self,
        _group: &str,
        name: &str,
        region: &str,
        environment: &str,
    ) -> Result<()> {
        info!("Creating bucket s3://{name} in {region}");

        let mut request = self.client.create_bucket().bucket(name);
        if region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| BootstrapError::provider("create bucket", format!("{e}")))?;

        self.client
            .put_bucket_versioning()
            .bucket(name)
            .versioning_configuration(
                VersioningConfiguration::builder()
                    .status(BucketVersioningStatus::Enabled)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| BootstrapError::provider("enable bucket versioning", format!("{e}")))?;

        let tagging = environment_tag(environment)
            .and_then(|tag| Tagging::builder().tag_set(tag).build())
            .map_err(|e| BootstrapError::provider("build bucket tags", format!("{e}")))?;
        self.client
            .put_bucket_tagging()
            .bucket(name)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| BootstrapError::provider("tag bucket", format!("{e}")))?;

        Ok(())
    }

    async fn account_environment(&self, _group: &str, name: &str) -> Result<Option<String>> {
        match self.client.get_bucket_tagging().bucket(name).send().await {
            Ok(output) => Ok(output
                .tag_set()
                .iter()
                .find(|tag| tag.key() == ENVIRONMENT_TAG)
                .map(|tag| tag.value().to_string())),
            Err(e) if e.code() == Some(NO_TAG_SET) => Ok(None),
            Err(e) => Err(BootstrapError::provider("read bucket tags", format!("{e}")).into()),
        }
    }

    async fn container_exists(&self, _account: &str, _container: &str) -> Result<bool> {
        Ok(true)
    }

    async fn create_container(&self, _account: &str, _container: &str) -> Result<()> {
        Ok(())
    }
}

fn environment_tag(environment: &str) -> std::result::Result<Tag, aws_sdk_s3::error::BuildError> {
    Tag::builder().key(ENVIRONMENT_TAG).value(environment).build()
}
