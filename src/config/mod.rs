//! Configuration module for the mission fleet orchestrator.
//!
//! This module holds the operator-side settings: repository and installation
//! roots, plan location, and change-check interval, with `.env` and
//! environment variable overrides.

mod settings;

pub use settings::{
    find_plan_file, MissionSettings, DEFAULT_PLAN_FILES, ENV_CHECK_INTERVAL, ENV_INSTALLATION_ROOT,
    ENV_PLAN, ENV_PRODUCE_EMPTY_PLAN, ENV_REPOSITORY_ROOT,
};
