//! CLI module for the mission fleet orchestrator.
//!
//! This module provides the command-line interface for validating plans,
//! deploying units, running missions and operating signal markers.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, SignalCommands};
pub use output::OutputFormatter;
