//! Installer copying packages into the installation root.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{DeployError, MissionError, Result};
use crate::plan::{DeploymentUnit, Plan};

use super::Installer;

/// Copies staged packages to `{installRoot}/{alias}/{uid}` and writes the
/// configuration files the child reads at startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryInstaller;

impl DirectoryInstaller {
    /// Creates a new installer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds the mission configuration from the unit's seeded entries.
    #[must_use]
    pub fn mission_document(unit: &DeploymentUnit) -> Value {
        let mut mission = Map::new();
        let mut endpoints = Map::new();

        for (key, value) in &unit.configuration {
            if let Some(field) = key.strip_prefix("mission.") {
                mission.insert(field.to_string(), value.clone());
            } else if let Some(endpoint) = key.strip_prefix("endpoints.") {
                endpoints.insert(endpoint.to_string(), value.clone());
            }
        }

        mission.insert(String::from("serviceEndpoints"), Value::Object(endpoints));
        Value::Object(mission)
    }
}

/// Writes through a temporary file, then renames over the target.
async fn write_document(unit: &DeploymentUnit, path: &Path, document: &Value) -> Result<()> {
    let content = serde_json::to_vec_pretty(document)
        .map_err(|e| DeployError::install(&unit.name, format!("Failed to serialize {}: {e}", path.display())))?;

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| DeployError::install(&unit.name, format!("Failed to create {}: {e}", temp_path.display())))?;
    file.write_all(&content)
        .await
        .map_err(|e| DeployError::install(&unit.name, format!("Failed to write {}: {e}", temp_path.display())))?;
    file.sync_all()
        .await
        .map_err(|e| DeployError::install(&unit.name, format!("Failed to sync {}: {e}", temp_path.display())))?;
    drop(file);

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| DeployError::install(&unit.name, format!("Failed to move {}: {e}", path.display())))?;
    Ok(())
}

fn copy_package(source: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(target)?;

    if source.is_dir() {
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            let destination = target.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                copy_package(&entry.path(), &destination)?;
            } else {
                std::fs::copy(entry.path(), &destination)?;
            }
        }
    } else if let Some(name) = source.file_name() {
        std::fs::copy(source, target.join(name))?;
    }

    Ok(())
}

#[async_trait]
impl Installer for DirectoryInstaller {
    async fn install(&self, unit: &DeploymentUnit) -> Result<()> {
        if !unit.has_loaded() {
            return Err(DeployError::NotLoaded {
                unit: unit.name.clone(),
            }
            .into());
        }

        let source = unit.repository_location().to_path_buf();
        let target = unit.installation_location().to_path_buf();
        debug!("Installing '{}' into {}", unit.name, target.display());

        tokio::task::spawn_blocking(move || copy_package(&source, &target))
            .await
            .map_err(|e| MissionError::internal(format!("Install task failed: {e}")))?
            .map_err(|e| DeployError::install(&unit.name, e.to_string()))?;

        let unit_document = Value::Object(
            unit.configuration
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        write_document(unit, unit.unit_config_file(), &unit_document).await?;
        write_document(unit, unit.mission_config_file(), &Self::mission_document(unit)).await?;

        unit.mark_installed();
        info!("Installed '{}' at {}", unit.name, unit.installation_location().display());
        Ok(())
    }

    async fn clean(&self, plan: &Plan) -> Result<()> {
        for unit in &plan.deployments {
            unit.reset_status();
            if unit.is_placeholder() {
                continue;
            }
            let directory = plan.installation_root.join(unit.effective_alias());

            if !directory.exists() {
                continue;
            }

            info!("Removing installation {}", directory.display());
            fs::remove_dir_all(&directory)
                .await
                .map_err(|e| DeployError::CleanFailed {
                    path: directory.clone(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::{DirectoryLoader, Loader};

    fn derived_unit(repository: &Path, installation: &Path) -> DeploymentUnit {
        let mut unit = DeploymentUnit::new("api", "1.0", "bin/api");
        unit.derive_locations(repository, "", installation);
        unit.seed("mission.name", "fleet");
        unit.seed("endpoints.auth", "http://localhost:9000");
        unit.configuration
            .insert(String::from("threads"), Value::from(4));
        unit
    }

    #[tokio::test]
    async fn test_install_requires_loaded_unit() {
        let dir = tempfile::tempdir().unwrap();
        let unit = derived_unit(&dir.path().join("repo"), &dir.path().join("install"));

        let err = DirectoryInstaller::new().install(&unit).await.unwrap_err();
        assert!(matches!(
            err,
            MissionError::Deploy(DeployError::NotLoaded { .. })
        ));
    }

    #[tokio::test]
    async fn test_install_copies_tree_and_writes_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let repository = dir.path().join("repo");
        let package = repository.join("api/1.0/bin");
        std::fs::create_dir_all(&package).unwrap();
        std::fs::write(package.join("api"), b"#!/bin/sh\n").unwrap();

        let unit = derived_unit(&repository, &dir.path().join("install"));
        DirectoryLoader::new().load(&unit).await.unwrap();
        DirectoryInstaller::new().install(&unit).await.unwrap();

        assert!(unit.has_deployed());
        assert!(unit.command().is_file());

        let unit_config: Value =
            serde_json::from_slice(&std::fs::read(unit.unit_config_file()).unwrap()).unwrap();
        assert_eq!(unit_config["threads"], 4);

        let mission_config: Value =
            serde_json::from_slice(&std::fs::read(unit.mission_config_file()).unwrap()).unwrap();
        assert_eq!(mission_config["name"], "fleet");
        assert_eq!(mission_config["serviceEndpoints"]["auth"], "http://localhost:9000");
    }

    #[tokio::test]
    async fn test_clean_removes_alias_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = Plan::inert();
        plan.installation_root = dir.path().to_path_buf();

        let mut unit = DeploymentUnit::new("api", "1.0", "bin/api");
        unit.derive_locations(dir.path(), "", dir.path());
        std::fs::create_dir_all(unit.installation_location()).unwrap();
        unit.mark_loaded();
        plan.deployments.push(unit);

        DirectoryInstaller::new().clean(&plan).await.unwrap();

        assert!(!dir.path().join("api").exists());
        assert!(!plan.deployments[0].has_loaded());
    }

    #[tokio::test]
    async fn test_clean_leaves_placeholder_alias_alone() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("install");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(dir.path().join("keep.txt"), "data").unwrap();

        let mut plan = Plan::inert();
        plan.installation_root.clone_from(&root);
        plan.deployments.push(DeploymentUnit::placeholder(".."));

        DirectoryInstaller::new().clean(&plan).await.unwrap();

        assert!(root.is_dir());
        assert!(dir.path().join("keep.txt").is_file());
    }
}
