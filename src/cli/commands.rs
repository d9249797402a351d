//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ENV_INSTALLATION_ROOT, ENV_PLAN, ENV_REPOSITORY_ROOT};

/// missionctl - Local fleet orchestrator for plan-driven appliances.
#[derive(Parser, Debug)]
#[command(name = "missionctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the plan file.
    #[arg(short, long, global = true, env = ENV_PLAN)]
    pub plan: Option<PathBuf>,

    /// Package repository root.
    #[arg(long, global = true, env = ENV_REPOSITORY_ROOT)]
    pub repository_root: Option<PathBuf>,

    /// Installation root.
    #[arg(long, global = true, env = ENV_INSTALLATION_ROOT)]
    pub installation_root: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the plan and show its units.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Print the JSON schema plans are validated against.
    Schema,

    /// Clean and deploy every unit once, without starting anything.
    Deploy,

    /// Remove installed units.
    Clean,

    /// Run the mission until interrupted, restarting it when the plan changes.
    Run {
        /// Seconds between two plan change checks.
        #[arg(long)]
        check_interval: Option<u64>,

        /// Continue with an empty plan when the plan is invalid.
        #[arg(long)]
        produce_empty_plan: bool,
    },

    /// Point the plan at a fresh repository version and save it.
    Republish {
        /// Where to write the plan (defaults to overwriting the plan file).
        #[arg(long)]
        to: Option<PathBuf>,
    },

    /// Operate the signal markers of an installation directory.
    Signal {
        /// Signal subcommand.
        #[command(subcommand)]
        command: SignalCommands,
    },
}

/// Signal marker subcommands.
#[derive(Subcommand, Debug)]
pub enum SignalCommands {
    /// Report that the appliance finished starting.
    Started {
        /// Installation directory.
        dir: PathBuf,
    },

    /// Report that the appliance shut down.
    Stopped {
        /// Installation directory.
        dir: PathBuf,
    },

    /// Ask the appliance to shut down.
    RequestStop {
        /// Installation directory.
        dir: PathBuf,
    },

    /// Clear every marker.
    Reset {
        /// Installation directory.
        dir: PathBuf,
    },

    /// Show which markers are set.
    Status {
        /// Installation directory.
        dir: PathBuf,
    },

    /// Block until a stop is requested.
    AwaitStop {
        /// Installation directory.
        dir: PathBuf,

        /// Poll interval in milliseconds.
        #[arg(long, default_value = "100")]
        poll_ms: u64,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal_command() {
        let cli = Cli::try_parse_from(["missionctl", "signal", "request-stop", "/tmp/unit"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Signal {
                command: SignalCommands::RequestStop { .. }
            }
        ));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "missionctl",
            "run",
            "--check-interval",
            "5",
            "--plan",
            "fleet.json",
            "--output",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.plan, Some(PathBuf::from("fleet.json")));
        assert!(matches!(cli.output, OutputFormat::Json));
        assert!(matches!(
            cli.command,
            Commands::Run {
                check_interval: Some(5),
                produce_empty_plan: false
            }
        ));
    }
}
