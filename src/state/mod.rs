//! Remote state backend management.
//!
//! This module resolves where an environment's remote state lives, creates
//! the provider resources holding it, and records the resolved location
//! locally so later runs reuse it.

mod azure;
mod bootstrap;
mod local;
mod provider;
mod s3;
mod types;

pub use azure::{AzureCliProvider, AZURE_MAX_ACCOUNT_LEN};
pub use bootstrap::{StateBackendBootstrapper, SUFFIX_LEN};
pub use local::DescriptorStore;
pub use provider::{StateProvider, ENVIRONMENT_TAG};
pub use s3::{S3Provider, S3_MAX_BUCKET_LEN};
pub use types::{state_key, StateBackendDescriptor, DESCRIPTOR_VERSION};
