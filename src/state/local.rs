//! Local descriptor records.
//!
//! Once a state backend has been resolved for an environment, its descriptor
//! is recorded under `<work_dir>/backends/<env>.json`. Later runs read the
//! record instead of re-deriving the (possibly suffixed) storage name, so a
//! record is written once and never rewritten.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{BootstrapError, DeployError, Result};

use super::types::StateBackendDescriptor;

/// File-based store of resolved descriptors, one file per environment.
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    /// Directory holding descriptor files.
    base_dir: PathBuf,
}

impl DescriptorStore {
    /// Creates a store rooted at `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Directory holding descriptor files.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the record for an environment.
    #[must_use]
    pub fn path_for(&self, environment: &str) -> PathBuf {
        self.base_dir.join(format!("{environment}.json"))
    }

    /// Loads the recorded descriptor for an environment, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read or parsed.
    pub async fn load(&self, environment: &str) -> Result<Option<StateBackendDescriptor>> {
        let path = self.path_for(environment);
        if !path.exists() {
            debug!("No descriptor recorded at {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await.map_err(|e| {
            DeployError::Bootstrap(BootstrapError::Corrupted {
                message: format!("Failed to read {}: {e}", path.display()),
            })
        })?;

        let descriptor: StateBackendDescriptor = serde_json::from_str(&content).map_err(|e| {
            DeployError::Bootstrap(BootstrapError::Corrupted {
                message: format!("Failed to parse {}: {e}", path.display()),
            })
        })?;

        if descriptor.environment != environment {
            return Err(DeployError::Bootstrap(BootstrapError::Corrupted {
                message: format!(
                    "{} records environment '{}'",
                    path.display(),
                    descriptor.environment
                ),
            }));
        }

        debug!("Loaded descriptor for '{}' from {}", environment, path.display());
        Ok(Some(descriptor))
    }

    /// Records a descriptor unless one already exists for its environment.
    ///
    /// Returns `true` if the record was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub async fn record(&self, descriptor: &StateBackendDescriptor) -> Result<bool> {
        let path = self.path_for(&descriptor.environment);
        if path.exists() {
            debug!("Descriptor already recorded at {}", path.display());
            return Ok(false);
        }

        fs::create_dir_all(&self.base_dir).await?;

        let content = serde_json::to_string_pretty(descriptor).map_err(|e| {
            DeployError::internal(format!("Failed to serialize descriptor: {e}"))
        })?;

        let temp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &path).await?;

        info!(
            "Recorded state backend for '{}' at {}",
            descriptor.environment,
            path.display()
        );
        Ok(true)
    }
}
