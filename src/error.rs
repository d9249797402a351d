//! Error types for the mission fleet orchestrator.
//!
//! Lifecycle operations on a [`Mission`](crate::mission::Mission) report through
//! [`MissionResult`](crate::mission::MissionResult) and never fail. The errors in
//! this module cover everything that happens before a plan exists to act on
//! (settings, plan parsing and validation) and the collaborator seams the
//! mission folds into its results (signals, appliances, deployment).

use std::path::PathBuf;
use thiserror::Error;

use crate::plan::SchemaViolation;

/// The main error type for the mission fleet orchestrator.
#[derive(Debug, Error)]
pub enum MissionError {
    /// Settings errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Plan parsing and validation errors.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Signal channel errors.
    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    /// Appliance process errors.
    #[error("Appliance error: {0}")]
    Appliance(#[from] ApplianceError),

    /// Package loading and installation errors.
    #[error("Deployment error: {0}")]
    Deploy(#[from] DeployError),

    /// The mission could not be booted.
    #[error("Mission failed to start: {message}")]
    Boot {
        /// Rendered failure details.
        message: String,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Settings errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment override has an unusable value.
    #[error("Invalid value for {name}: {value}")]
    InvalidEnvVar {
        /// Name of the variable.
        name: String,
        /// The rejected value.
        value: String,
    },

    /// The .env file could not be loaded.
    #[error("Failed to load environment file {path}: {message}")]
    DotEnv {
        /// Path of the file.
        path: PathBuf,
        /// Loader message.
        message: String,
    },

    /// No default data directory could be determined.
    #[error("Cannot determine a default data directory; set {name}")]
    NoDefaultRoot {
        /// Variable that would supply the root.
        name: String,
    },
}

/// Plan parsing and validation errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan source could not be read.
    #[error("Plan source unavailable: {message}")]
    SourceUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// The document is not well-formed JSON.
    #[error("Failed to parse plan: {message}")]
    Parse {
        /// Description of the parse error.
        message: String,
        /// Optional `line:column` location.
        location: Option<String>,
    },

    /// The document does not satisfy the plan schema.
    #[error("Plan validation failed with {} violation(s){}", .violations.len(), first_violation(.violations))]
    Invalid {
        /// One entry per violation.
        violations: Vec<SchemaViolation>,
    },

    /// The plan could not be serialized.
    #[error("Failed to serialize plan: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// The plan file could not be watched.
    #[error("Failed to watch plan file {path}: {message}")]
    Watch {
        /// Watched path.
        path: PathBuf,
        /// Watcher message.
        message: String,
    },
}

fn first_violation(violations: &[SchemaViolation]) -> String {
    violations
        .first()
        .map_or_else(String::new, |v| format!(": {} ({})", v.message, v.location))
}

/// Signal channel errors.
#[derive(Debug, Error)]
pub enum SignalError {
    /// A marker could not be written or removed.
    #[error("Failed to update signal marker {path}: {message}")]
    Marker {
        /// Marker path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

/// Appliance process errors.
#[derive(Debug, Error)]
pub enum ApplianceError {
    /// The process could not be launched.
    #[error("Failed to launch appliance '{unit}': {message}")]
    Launch {
        /// Unit name.
        unit: String,
        /// Description of the failure.
        message: String,
    },

    /// A previous instance could not be replaced.
    #[error("Failed to restart appliance '{unit}': {message}")]
    Restart {
        /// Unit name.
        unit: String,
        /// Description of the failure.
        message: String,
    },

    /// The unit cannot be turned into an appliance.
    #[error("Unit '{unit}' is not runnable: {reason}")]
    NotRunnable {
        /// Unit name.
        unit: String,
        /// Why it cannot run.
        reason: String,
    },
}

/// Package loading and installation errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The package was not found in the repository.
    #[error("Package for '{unit}' not found at {path}")]
    PackageNotFound {
        /// Unit name.
        unit: String,
        /// Expected repository location.
        path: PathBuf,
    },

    /// The package does not match its declared checksum.
    #[error("Checksum mismatch for '{unit}': expected {expected}, found {actual}")]
    ChecksumMismatch {
        /// Unit name.
        unit: String,
        /// Declared checksum.
        expected: String,
        /// Computed checksum.
        actual: String,
    },

    /// The unit was asked to install before it was loaded.
    #[error("Unit '{unit}' has not been loaded")]
    NotLoaded {
        /// Unit name.
        unit: String,
    },

    /// Installation failed.
    #[error("Failed to install '{unit}': {message}")]
    InstallFailed {
        /// Unit name.
        unit: String,
        /// Description of the failure.
        message: String,
    },

    /// Removing installed files failed.
    #[error("Failed to clean {path}: {message}")]
    CleanFailed {
        /// Directory being removed.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for mission fleet operations.
pub type Result<T> = std::result::Result<T, MissionError>;

impl MissionError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error came from reading or validating a plan.
    #[must_use]
    pub const fn is_plan_error(&self) -> bool {
        matches!(self, Self::Plan(_))
    }
}

impl PlanError {
    /// Creates a parse error without a location.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            location: None,
        }
    }

    /// Returns the violations carried by this error, if any.
    #[must_use]
    pub fn violations(&self) -> &[SchemaViolation] {
        match self {
            Self::Invalid { violations } => violations,
            _ => &[],
        }
    }
}

impl SignalError {
    /// Creates a marker error for the given path.
    #[must_use]
    pub fn marker(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Marker {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl DeployError {
    /// Creates an installation error.
    #[must_use]
    pub fn install(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InstallFailed {
            unit: unit.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_plan_message_names_first_violation() {
        let err = PlanError::Invalid {
            violations: vec![
                SchemaViolation::new("/deployments/0", "missing required property 'build'"),
                SchemaViolation::new("/name", "expected string"),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("2 violation(s)"));
        assert!(message.contains("/deployments/0"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn test_plan_errors_convert() {
        let err: MissionError = PlanError::parse("bad").into();
        assert!(err.is_plan_error());
        assert!(!MissionError::internal("x").is_plan_error());
    }
}
