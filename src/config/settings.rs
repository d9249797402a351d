//! Operator settings.
//!
//! Settings are owned by whoever runs the mission, not by the plan author:
//! package and installation roots, where the plan lives, and how often it is
//! checked for changes. Values come from defaults, then a `.env` file, then
//! `MISSION_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ConfigError, MissionError, Result};
use crate::plan::DEFAULT_CHECK_INTERVAL;

/// Overrides the package repository root.
pub const ENV_REPOSITORY_ROOT: &str = "MISSION_REPOSITORY_ROOT";
/// Overrides the installation root.
pub const ENV_INSTALLATION_ROOT: &str = "MISSION_INSTALLATION_ROOT";
/// Overrides the plan file path.
pub const ENV_PLAN: &str = "MISSION_PLAN";
/// Overrides the plan check interval, in seconds.
pub const ENV_CHECK_INTERVAL: &str = "MISSION_CHECK_INTERVAL_SECS";
/// Overrides whether invalid plans fall back to an empty plan.
pub const ENV_PRODUCE_EMPTY_PLAN: &str = "MISSION_PRODUCE_EMPTY_PLAN";

/// Default plan file names to search for.
pub const DEFAULT_PLAN_FILES: &[&str] = &["mission.plan.json", "plan.json"];

/// Settings for running missions on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionSettings {
    /// Where packages are read from.
    pub repository_root: PathBuf,
    /// Where units are installed.
    pub installation_root: PathBuf,
    /// Plan document path.
    pub plan_path: PathBuf,
    /// Minimum time between two plan change checks.
    pub check_interval: Duration,
    /// Replace an invalid plan by an inert one instead of failing.
    pub produce_empty_plan: bool,
}

impl MissionSettings {
    /// Creates settings with explicit roots and default everything else.
    #[must_use]
    pub fn with_roots(repository_root: impl Into<PathBuf>, installation_root: impl Into<PathBuf>) -> Self {
        Self {
            repository_root: repository_root.into(),
            installation_root: installation_root.into(),
            plan_path: PathBuf::from(DEFAULT_PLAN_FILES[0]),
            check_interval: DEFAULT_CHECK_INTERVAL,
            produce_empty_plan: false,
        }
    }

    /// Default settings rooted in the user's local data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory can be determined.
    pub fn defaults() -> Result<Self> {
        let base = dirs::data_local_dir()
            .ok_or_else(|| ConfigError::NoDefaultRoot {
                name: ENV_INSTALLATION_ROOT.to_string(),
            })?
            .join("mission");

        Ok(Self::with_roots(base.join("repository"), base.join("installations")))
    }

    /// Loads settings from defaults and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override has an invalid value.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::defaults()?;
        settings.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    /// Applies overrides looked up by variable name.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(root) = lookup(ENV_REPOSITORY_ROOT) {
            debug!("Overriding repository root from environment");
            self.repository_root = PathBuf::from(root);
        }

        if let Some(root) = lookup(ENV_INSTALLATION_ROOT) {
            debug!("Overriding installation root from environment");
            self.installation_root = PathBuf::from(root);
        }

        if let Some(plan) = lookup(ENV_PLAN) {
            debug!("Overriding plan path from environment");
            self.plan_path = PathBuf::from(plan);
        }

        if let Some(value) = lookup(ENV_CHECK_INTERVAL) {
            let secs = value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvVar {
                name: ENV_CHECK_INTERVAL.to_string(),
                value: value.clone(),
            })?;
            self.check_interval = Duration::from_secs(secs);
        }

        if let Some(value) = lookup(ENV_PRODUCE_EMPTY_PLAN) {
            self.produce_empty_plan = parse_flag(&value).ok_or_else(|| ConfigError::InvalidEnvVar {
                name: ENV_PRODUCE_EMPTY_PLAN.to_string(),
                value: value.clone(),
            })?;
        }

        Ok(())
    }

    /// Loads the .env file from the given directory if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_dotenv(base_dir: &Path) -> Result<()> {
        let env_path = base_dir.join(".env");

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                MissionError::Config(ConfigError::DotEnv {
                    path: env_path.clone(),
                    message: e.to_string(),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Finds the plan file in the given directory or its parents.
#[must_use]
pub fn find_plan_file(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref().to_path_buf();

    loop {
        for filename in DEFAULT_PLAN_FILES {
            let candidate = current.join(filename);
            if candidate.exists() {
                info!("Found plan file: {}", candidate.display());
                return Some(candidate);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_overrides_apply() {
        let mut settings = MissionSettings::with_roots("/a", "/b");
        settings
            .apply_overrides(lookup(&[
                (ENV_REPOSITORY_ROOT, "/repo"),
                (ENV_INSTALLATION_ROOT, "/install"),
                (ENV_CHECK_INTERVAL, "5"),
                (ENV_PRODUCE_EMPTY_PLAN, "yes"),
            ]))
            .unwrap();

        assert_eq!(settings.repository_root, PathBuf::from("/repo"));
        assert_eq!(settings.installation_root, PathBuf::from("/install"));
        assert_eq!(settings.check_interval, Duration::from_secs(5));
        assert!(settings.produce_empty_plan);
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let mut settings = MissionSettings::with_roots("/a", "/b");
        let err = settings
            .apply_overrides(lookup(&[(ENV_CHECK_INTERVAL, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_CHECK_INTERVAL));
    }

    #[test]
    fn test_no_overrides_keeps_defaults() {
        let mut settings = MissionSettings::with_roots("/a", "/b");
        settings.apply_overrides(|_| None).unwrap();
        assert_eq!(settings, MissionSettings::with_roots("/a", "/b"));
    }

    #[test]
    fn test_find_plan_file_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("mission.plan.json"), "{}").unwrap();

        let found = find_plan_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("mission.plan.json"));
    }
}
