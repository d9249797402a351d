//! Loader reading packages from a local repository directory.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{DeployError, MissionError, Result};
use crate::plan::DeploymentUnit;

use super::checksum::PackageHasher;
use super::Loader;

/// Verifies packages in place under the repository root.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryLoader {
    hasher: PackageHasher,
}

impl DirectoryLoader {
    /// Creates a new loader.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: PackageHasher::new(),
        }
    }
}

#[async_trait]
impl Loader for DirectoryLoader {
    async fn load(&self, unit: &DeploymentUnit) -> Result<()> {
        let path = unit.repository_location().to_path_buf();
        debug!("Loading '{}' from {}", unit.name, path.display());

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(DeployError::PackageNotFound {
                unit: unit.name.clone(),
                path,
            }
            .into());
        }

        if !unit.checksum.trim().is_empty() {
            let hasher = self.hasher;
            let target = path.clone();
            let actual = tokio::task::spawn_blocking(move || hasher.hash_path(&target))
                .await
                .map_err(|e| MissionError::internal(format!("Checksum task failed: {e}")))??;

            if !PackageHasher::checksums_match(&unit.checksum, &actual) {
                return Err(DeployError::ChecksumMismatch {
                    unit: unit.name.clone(),
                    expected: unit.checksum.clone(),
                    actual,
                }
                .into());
            }
        }

        unit.mark_loaded();
        info!("Loaded '{}'", unit.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn unit_in(repository: &Path, checksum: &str) -> DeploymentUnit {
        let mut unit = DeploymentUnit::new("api", "1.0", "api.sh");
        unit.checksum = checksum.to_string();
        unit.derive_locations(repository, "", Path::new("/install"));
        unit
    }

    #[tokio::test]
    async fn test_missing_package() {
        let repository = tempfile::tempdir().unwrap();
        let unit = unit_in(repository.path(), "");

        let err = DirectoryLoader::new().load(&unit).await.unwrap_err();
        assert!(matches!(
            err,
            MissionError::Deploy(DeployError::PackageNotFound { .. })
        ));
        assert!(!unit.has_loaded());
    }

    #[tokio::test]
    async fn test_checksum_verified() {
        let repository = tempfile::tempdir().unwrap();
        let package = repository.path().join("api/1.0");
        std::fs::create_dir_all(package.parent().unwrap()).unwrap();
        std::fs::write(&package, b"abc").unwrap();

        let good = unit_in(
            repository.path(),
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD",
        );
        DirectoryLoader::new().load(&good).await.unwrap();
        assert!(good.has_loaded());

        let bad = unit_in(repository.path(), &"0".repeat(64));
        let err = DirectoryLoader::new().load(&bad).await.unwrap_err();
        assert!(matches!(
            err,
            MissionError::Deploy(DeployError::ChecksumMismatch { .. })
        ));
        assert!(!bad.has_loaded());
    }

    #[tokio::test]
    async fn test_directory_package_without_checksum() {
        let repository = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(repository.path().join("api/1.0/bin")).unwrap();

        let unit = unit_in(repository.path(), "");
        DirectoryLoader::new().load(&unit).await.unwrap();
        assert!(unit.has_loaded());
    }
}
