//! Plan module.
//!
//! This module handles everything about the declarative desired state:
//! - The plan and deployment unit data model
//! - Plan sources with debounced change detection
//! - Schema generation and validation of plan documents
//! - Derivation of per-unit locations, secrets and identity facts

mod factory;
mod model;
mod schema;
mod source;
mod validator;

pub use factory::PlanFactory;
pub use model::{
    installation_location, repository_location, DeploymentUnit, Plan, UnitLocations, UnitStatus,
    MISSION_CONFIG_FILE, UNIT_CONFIG_FILE,
};
pub use schema::{PlanSchema, SchemaViolation};
pub use source::{FilePlanSource, MemoryPlanSource, PlanSource, UpdateThrottle, DEFAULT_CHECK_INTERVAL};
pub use validator::{PlanValidator, ValidationResult};
