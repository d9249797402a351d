//! Plan and deployment unit types.
//!
//! These structs map to the plan document. Fields that are computed by the
//! [`PlanFactory`](super::PlanFactory) (locations, command line, runtime
//! status) are skipped by serde and therefore absent from the generated schema.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// File name of the per-unit configuration written next to the appliance.
pub const UNIT_CONFIG_FILE: &str = "appliance.json";

/// File name of the mission configuration written next to the appliance.
pub const MISSION_CONFIG_FILE: &str = "mission.json";

/// Declarative description of a fleet of appliances.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Mission name.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Version tag of the package repository the units are taken from.
    #[serde(default)]
    repository_version: String,
    /// Whether the mission cleans and deploys units before starting them.
    #[serde(default = "default_true")]
    pub deploy_appliances: bool,
    /// Whether the mission starts appliances at all.
    #[serde(default = "default_true")]
    pub start_appliances: bool,
    /// Launch every appliance before waiting for any of them to become ready.
    #[serde(default)]
    pub start_in_parallel: bool,
    /// Refuse to start any unit unless every unit deployed.
    #[serde(default)]
    pub all_appliances_must_deploy: bool,
    /// Upper bound for the whole deploy phase.
    #[serde(default = "default_deploy_seconds")]
    pub wait_for_deploy_seconds: u32,
    /// Upper bound for a unit to report readiness.
    #[serde(default = "default_start_seconds")]
    pub wait_for_start_seconds: u32,
    /// Upper bound for the fleet to report stopped.
    #[serde(default = "default_stop_seconds")]
    pub wait_for_stop_seconds: u32,
    /// Named service endpoints handed to every appliance.
    #[serde(default)]
    pub service_endpoints: BTreeMap<String, String>,
    /// Package repository root. Operator-controlled, never read from the document.
    #[serde(skip)]
    pub repository_root: PathBuf,
    /// Installation root. Operator-controlled, never read from the document.
    #[serde(skip)]
    pub installation_root: PathBuf,
    /// Signing secret shared with the appliances, minted per parse.
    #[serde(skip)]
    pub token_signing_key: String,
    /// Units to deploy, in order.
    #[serde(default)]
    pub deployments: Vec<DeploymentUnit>,
}

/// One appliance as described by a plan.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentUnit {
    /// Identifier minted when the unit is created; never taken from the document.
    #[serde(default = "Uuid::new_v4", skip_deserializing)]
    #[schemars(with = "String")]
    uid: Uuid,
    /// Package name.
    pub name: String,
    /// Installation alias; blank means the name is used.
    pub alias: String,
    /// Package build.
    pub build: String,
    /// SHA-256 of the package; blank skips verification.
    pub checksum: String,
    /// Executable path relative to the installation directory.
    pub assembly: String,
    /// Whether the unit takes part in deployment and start.
    pub deploy: bool,
    /// Whether start blocks until the appliance reports ready.
    pub wait_for_start: bool,
    /// Whether the appliance inherits the console.
    pub show_window: bool,
    /// Free-form configuration handed to the appliance.
    pub configuration: BTreeMap<String, Value>,
    #[serde(skip)]
    derived: UnitLocations,
    #[serde(skip)]
    seeded_keys: Vec<String>,
    #[serde(skip)]
    status: Arc<UnitStatus>,
    /// Set on the unit synthesized for a plan without deployments.
    #[serde(skip)]
    placeholder: bool,
}

/// Locations and command line computed for a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitLocations {
    /// Source package path.
    pub repository: PathBuf,
    /// Installation directory.
    pub installation: PathBuf,
    /// Per-unit configuration file.
    pub unit_config_file: PathBuf,
    /// Mission configuration file.
    pub mission_config_file: PathBuf,
    /// Executable to launch.
    pub command: PathBuf,
    /// Arguments passed to the executable.
    pub arguments: Vec<String>,
}

/// Deployment progress of a unit, shared by every clone of it.
#[derive(Debug, Default)]
pub struct UnitStatus {
    loaded: AtomicBool,
    installed: AtomicBool,
}

// Default value functions

fn default_environment() -> String {
    String::from("dev")
}

const fn default_true() -> bool {
    true
}

const fn default_deploy_seconds() -> u32 {
    300
}

const fn default_start_seconds() -> u32 {
    60
}

const fn default_stop_seconds() -> u32 {
    30
}

impl Default for Plan {
    /// An inert plan: nothing to deploy, nothing to start.
    fn default() -> Self {
        Self {
            name: String::new(),
            environment: default_environment(),
            repository_version: String::new(),
            deploy_appliances: false,
            start_appliances: false,
            start_in_parallel: false,
            all_appliances_must_deploy: false,
            wait_for_deploy_seconds: default_deploy_seconds(),
            wait_for_start_seconds: default_start_seconds(),
            wait_for_stop_seconds: default_stop_seconds(),
            service_endpoints: BTreeMap::new(),
            repository_root: PathBuf::new(),
            installation_root: PathBuf::new(),
            token_signing_key: String::new(),
            deployments: Vec::new(),
        }
    }
}

impl Plan {
    /// Returns a plan that deploys and starts nothing.
    #[must_use]
    pub fn inert() -> Self {
        Self::default()
    }

    /// Returns the repository version.
    #[must_use]
    pub fn repository_version(&self) -> &str {
        &self.repository_version
    }

    /// Sets the repository version and recomputes every unit's repository location.
    pub fn set_repository_version(&mut self, version: impl Into<String>) {
        self.repository_version = version.into();
        for unit in &mut self.deployments {
            unit.derived.repository = repository_location(
                &self.repository_root,
                &self.repository_version,
                &unit.name,
                &unit.build,
            );
        }
    }

    /// Returns the fully qualified mission name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.name, self.environment)
    }

    /// Returns true if the plan neither deploys nor starts anything.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        !self.deploy_appliances && !self.start_appliances && self.deployments.is_empty()
    }

    /// Looks up a unit by name.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&DeploymentUnit> {
        self.deployments.iter().find(|u| u.name == name)
    }

    /// Units that take part in deployment and start.
    pub fn deployable_units(&self) -> impl Iterator<Item = &DeploymentUnit> {
        self.deployments.iter().filter(|u| u.deploy)
    }

    /// Returns a copy of the plan as the author wrote it: derived
    /// configuration entries and the placeholder unit removed.
    #[must_use]
    pub fn to_document(&self) -> Self {
        let mut document = self.clone();
        document.deployments.retain(|u| !u.placeholder);
        for unit in &mut document.deployments {
            for key in &unit.seeded_keys {
                unit.configuration.remove(key);
            }
        }
        document
    }
}

impl DeploymentUnit {
    /// Creates a unit with a fresh uid and default flags.
    #[must_use]
    pub fn new(name: impl Into<String>, build: impl Into<String>, assembly: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uid: Uuid::new_v4(),
            alias: name.clone(),
            name,
            build: build.into(),
            checksum: String::new(),
            assembly: assembly.into(),
            deploy: true,
            wait_for_start: false,
            show_window: false,
            configuration: BTreeMap::new(),
            derived: UnitLocations::default(),
            seeded_keys: Vec::new(),
            status: Arc::default(),
            placeholder: false,
        }
    }

    /// Placeholder unit synthesized for plans that list no deployments.
    #[must_use]
    pub fn placeholder(plan_name: &str) -> Self {
        let mut unit = Self::new(plan_name, "", "");
        unit.deploy = false;
        unit.placeholder = true;
        unit
    }

    /// Returns true for the unit synthesized by [`DeploymentUnit::placeholder`].
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Returns the unit's stable identifier.
    #[must_use]
    pub const fn uid(&self) -> Uuid {
        self.uid
    }

    /// Returns the alias, falling back to the name when blank.
    #[must_use]
    pub fn effective_alias(&self) -> &str {
        if self.alias.trim().is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }

    /// Source package path.
    #[must_use]
    pub fn repository_location(&self) -> &Path {
        &self.derived.repository
    }

    /// Installation directory (`{root}/{alias}/{uid}`).
    #[must_use]
    pub fn installation_location(&self) -> &Path {
        &self.derived.installation
    }

    /// Per-unit configuration file.
    #[must_use]
    pub fn unit_config_file(&self) -> &Path {
        &self.derived.unit_config_file
    }

    /// Mission configuration file.
    #[must_use]
    pub fn mission_config_file(&self) -> &Path {
        &self.derived.mission_config_file
    }

    /// Executable to launch.
    #[must_use]
    pub fn command(&self) -> &Path {
        &self.derived.command
    }

    /// Arguments for the executable.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.derived.arguments
    }

    /// All derived locations.
    #[must_use]
    pub const fn locations(&self) -> &UnitLocations {
        &self.derived
    }

    /// Computes every derived location from the given roots.
    pub fn derive_locations(&mut self, repository_root: &Path, version: &str, installation_root: &Path) {
        if self.alias.trim().is_empty() {
            self.alias.clone_from(&self.name);
        }

        let installation = installation_location(installation_root, &self.alias, self.uid);
        let unit_config_file = installation.join(UNIT_CONFIG_FILE);
        let mission_config_file = installation.join(MISSION_CONFIG_FILE);

        self.derived = UnitLocations {
            repository: repository_location(repository_root, version, &self.name, &self.build),
            command: installation.join(&self.assembly),
            arguments: vec![
                String::from("--mission-config"),
                mission_config_file.display().to_string(),
                String::from("--appliance-config"),
                unit_config_file.display().to_string(),
            ],
            unit_config_file,
            mission_config_file,
            installation,
        };
    }

    /// Inserts a derived configuration entry that is not written back on save.
    pub fn seed(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.configuration.insert(key.clone(), value.into());
        if !self.seeded_keys.contains(&key) {
            self.seeded_keys.push(key);
        }
    }

    /// Whether the package has been staged.
    #[must_use]
    pub fn has_loaded(&self) -> bool {
        self.status.loaded.load(Ordering::SeqCst)
    }

    /// Whether the package has been installed.
    #[must_use]
    pub fn has_installed(&self) -> bool {
        self.status.installed.load(Ordering::SeqCst)
    }

    /// Loaded and installed.
    #[must_use]
    pub fn has_deployed(&self) -> bool {
        self.has_loaded() && self.has_installed()
    }

    /// Records that the package has been staged.
    pub fn mark_loaded(&self) {
        self.status.loaded.store(true, Ordering::SeqCst);
    }

    /// Records that the package has been installed.
    pub fn mark_installed(&self) {
        self.status.installed.store(true, Ordering::SeqCst);
    }

    /// Forgets deployment progress.
    pub fn reset_status(&self) {
        self.status.loaded.store(false, Ordering::SeqCst);
        self.status.installed.store(false, Ordering::SeqCst);
    }
}

/// Source package path for a unit: `{root}/{version}/{name}/{build}`.
///
/// A blank version is left out of the path.
#[must_use]
pub fn repository_location(root: &Path, version: &str, name: &str, build: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    if !version.trim().is_empty() {
        path.push(version);
    }
    path.push(name);
    path.push(build);
    path
}

/// Installation directory for a unit: `{root}/{alias}/{uid}`.
#[must_use]
pub fn installation_location(root: &Path, alias: &str, uid: Uuid) -> PathBuf {
    root.join(alias).join(uid.to_string())
}
