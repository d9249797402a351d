// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Mission Fleet
//!
//! A local fleet orchestrator that deploys, starts, monitors, restarts and
//! stops a set of independently versioned processes ("appliances") described
//! by a declarative plan.
//!
//! ## Overview
//!
//! A mission executes one plan on a single host:
//!
//! - Parse and validate a JSON plan against a schema generated from its types
//! - Stage and install every unit's package under `{installRoot}/{alias}/{uid}`
//! - Launch one appliance process per deployed unit and wait for readiness
//! - Restart appliances that crash, stop the fleet cooperatively on request
//! - Apply plan changes by stopping and restarting the whole mission
//!
//! ## Architecture
//!
//! 1. **Plan**: desired state, built by the [`PlanFactory`] from a [`PlanSource`]
//! 2. **Signals**: poll-based marker files through which appliances report
//!    readiness and shutdown
//! 3. **Mission**: the engine driving clean, deploy, start, monitor and stop
//! 4. **Observer**: keeps one mission in line with the current plan
//!
//! ## Modules
//!
//! - [`plan`]: Plan model, sources, schema, validation and derivation
//! - [`signal`]: Readiness and stop signalling
//! - [`appliance`]: Process wrappers
//! - [`deploy`]: Package loading and installation
//! - [`mission`]: Orchestration engine and observer
//! - [`config`]: Operator settings
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```json
//! {
//!   "name": "fleet",
//!   "environment": "prod",
//!   "waitForStartSeconds": 30,
//!   "deployments": [
//!     {
//!       "name": "identity",
//!       "alias": "",
//!       "build": "2024.1",
//!       "checksum": "",
//!       "assembly": "bin/identity",
//!       "deploy": true,
//!       "waitForStart": true,
//!       "showWindow": false,
//!       "configuration": { "port": 5000 }
//!     }
//!   ]
//! }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod appliance;
pub mod cli;
pub mod config;
pub mod deploy;
pub mod error;
pub mod mission;
pub mod plan;
pub mod signal;

// ============================================================================
// Re-exports
// ============================================================================

pub use appliance::{Appliance, ApplianceFactory, ProcessAppliance, ProcessApplianceFactory};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::MissionSettings;
pub use deploy::{DirectoryInstaller, DirectoryLoader, Installer, Loader};
pub use error::{MissionError, Result};
pub use mission::{DefaultMissionScope, Mission, MissionObserver, MissionResult, MissionScope};
pub use plan::{DeploymentUnit, FilePlanSource, MemoryPlanSource, Plan, PlanFactory, PlanSource};
pub use signal::{FileSignalChannel, SignalOwner, SignalReader};
