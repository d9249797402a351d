//! Semantic validation of parsed plans.
//!
//! The schema only checks shape. This module checks the values that end up
//! in filesystem paths and the cross-unit consistency rules.

use std::collections::HashSet;
use tracing::debug;

use super::model::{DeploymentUnit, Plan};
use super::schema::SchemaViolation;

/// Validator for plans that already satisfy the schema.
#[derive(Debug, Default)]
pub struct PlanValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<SchemaViolation>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl PlanValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a plan, collecting every error and warning.
    #[must_use]
    pub fn validate(&self, plan: &Plan) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_plan(plan, &mut result);
        Self::validate_units(plan, &mut result);

        if result.is_valid() {
            debug!("Plan validation passed with {} warning(s)", result.warnings.len());
        }

        result
    }

    fn validate_plan(plan: &Plan, result: &mut ValidationResult) {
        if plan.name.trim().is_empty() {
            result
                .errors
                .push(SchemaViolation::new("/name", "Mission name cannot be empty"));
        }

        if plan.environment.trim().is_empty() {
            result
                .errors
                .push(SchemaViolation::new("/environment", "Environment cannot be empty"));
        }

        for name in plan.service_endpoints.keys() {
            if name.trim().is_empty() {
                result.errors.push(SchemaViolation::new(
                    "/serviceEndpoints",
                    "Service endpoint names cannot be empty",
                ));
            }
        }

        if plan.deployments.is_empty() {
            result
                .warnings
                .push(String::from("No deployments defined; a placeholder unit will be used"));
        } else if plan.deployable_units().next().is_none() {
            result
                .warnings
                .push(String::from("No unit has deploy enabled; nothing will run"));
        }
    }

    fn validate_units(plan: &Plan, result: &mut ValidationResult) {
        let mut seen_names = HashSet::new();
        let mut seen_aliases = HashSet::new();

        for (i, unit) in plan.deployments.iter().enumerate() {
            if unit.is_placeholder() {
                continue;
            }
            let prefix = format!("/deployments/{i}");

            if !seen_names.insert(unit.name.as_str()) {
                result.errors.push(SchemaViolation::new(
                    format!("{prefix}/name"),
                    format!("Duplicate unit name: {}", unit.name),
                ));
            }

            if !is_path_segment(&unit.name) {
                result.errors.push(SchemaViolation::new(
                    format!("{prefix}/name"),
                    format!("Unit name '{}' is not a valid directory name", unit.name),
                ));
            }

            if !unit.alias.trim().is_empty() && !is_path_segment(&unit.alias) {
                result.errors.push(SchemaViolation::new(
                    format!("{prefix}/alias"),
                    format!("Alias '{}' is not a valid directory name", unit.alias),
                ));
            }

            if !seen_aliases.insert(unit.effective_alias()) {
                result.warnings.push(format!(
                    "{prefix}/alias: '{}' is shared with another unit",
                    unit.effective_alias()
                ));
            }

            if unit.deploy {
                Self::validate_deployable(unit, &prefix, plan, result);
            }
        }
    }

    fn validate_deployable(unit: &DeploymentUnit, prefix: &str, plan: &Plan, result: &mut ValidationResult) {
        if !is_path_segment(&unit.build) {
            result.errors.push(SchemaViolation::new(
                format!("{prefix}/build"),
                format!("Build '{}' is not a valid directory name", unit.build),
            ));
        }

        if unit.assembly.trim().is_empty() {
            result.errors.push(SchemaViolation::new(
                format!("{prefix}/assembly"),
                "Assembly cannot be empty for a deployed unit",
            ));
        } else if !is_relative_path(&unit.assembly) {
            result.errors.push(SchemaViolation::new(
                format!("{prefix}/assembly"),
                format!(
                    "Assembly '{}' must be relative to the installation directory",
                    unit.assembly
                ),
            ));
        }

        if !unit.checksum.is_empty()
            && (unit.checksum.len() != 64 || !unit.checksum.chars().all(|c| c.is_ascii_hexdigit()))
        {
            result.errors.push(SchemaViolation::new(
                format!("{prefix}/checksum"),
                "Checksum must be a hex-encoded SHA-256 digest",
            ));
        }

        if unit.wait_for_start && plan.wait_for_start_seconds == 0 {
            result.warnings.push(format!(
                "{prefix}/waitForStart: waitForStartSeconds is 0, readiness will never be observed"
            ));
        }
    }
}

/// Checks that a value can be used as a single directory name.
fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Checks that a path stays below the directory it is joined to.
fn is_relative_path(value: &str) -> bool {
    let path = std::path::Path::new(value);
    !path.has_root()
        && path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir))
}
