//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use std::path::Path;
use tabled::{Table, Tabled};

use crate::mission::{DetailCategory, MissionResult};
use crate::plan::{Plan, ValidationResult};
use crate::signal::{Marker, SignalChannel};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Deployment unit row for table display.
#[derive(Tabled)]
struct UnitRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Alias")]
    alias: String,
    #[tabled(rename = "Build")]
    build: String,
    #[tabled(rename = "Deploy")]
    deploy: String,
    #[tabled(rename = "Wait")]
    wait_for_start: String,
    #[tabled(rename = "Installation")]
    installation: String,
}

/// Result detail row for table display.
#[derive(Tabled)]
struct DetailRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Explanation")]
    explanation: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a plan and its validation outcome.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan, validation: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "mission": plan.qualified_name(),
                    "repositoryVersion": plan.repository_version(),
                    "valid": validation.is_valid(),
                    "errors": validation.errors,
                    "warnings": validation.warnings,
                    "units": plan.deployments.iter().map(|u| serde_json::json!({
                        "name": u.name,
                        "alias": u.effective_alias(),
                        "uid": u.uid().to_string(),
                        "deploy": u.deploy,
                        "repositoryLocation": u.repository_location(),
                        "installationLocation": u.installation_location(),
                    })).collect::<Vec<_>>(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan, validation, show_warnings),
        }
    }

    fn format_plan_text(plan: &Plan, validation: &ValidationResult, show_warnings: bool) -> String {
        let mut output = String::new();

        let status = if validation.is_valid() {
            format!("{} Plan is valid", "✓".green())
        } else {
            format!("{} Plan is invalid", "✗".red())
        };
        let _ = writeln!(output, "{status}\n");
        let _ = writeln!(output, "   Mission: {}", plan.qualified_name());
        if !plan.repository_version().is_empty() {
            let _ = writeln!(output, "   Repository version: {}", plan.repository_version());
        }
        let _ = writeln!(
            output,
            "   Deploy: {}  Start: {}  Parallel: {}  All must deploy: {}",
            Self::flag(plan.deploy_appliances),
            Self::flag(plan.start_appliances),
            Self::flag(plan.start_in_parallel),
            Self::flag(plan.all_appliances_must_deploy)
        );
        let _ = writeln!(
            output,
            "   Timeouts: deploy {}s, start {}s, stop {}s\n",
            plan.wait_for_deploy_seconds, plan.wait_for_start_seconds, plan.wait_for_stop_seconds
        );

        let rows: Vec<UnitRow> = plan
            .deployments
            .iter()
            .map(|u| UnitRow {
                name: u.name.clone(),
                alias: u.effective_alias().to_string(),
                build: u.build.clone(),
                deploy: Self::flag(u.deploy),
                wait_for_start: Self::flag(u.wait_for_start),
                installation: u.installation_location().display().to_string(),
            })
            .collect();

        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if !validation.errors.is_empty() {
            let _ = write!(output, "\n{} Errors:\n", "✗".red());
            for error in &validation.errors {
                let _ = writeln!(output, "   - {error}");
            }
        }

        if show_warnings && !validation.warnings.is_empty() {
            let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
            for warning in &validation.warnings {
                let _ = writeln!(output, "   - {warning}");
            }
        }

        output
    }

    /// Formats a mission result.
    #[must_use]
    pub fn format_result(&self, operation: &str, result: &MissionResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Text => {
                let status = if result.successful {
                    format!("{} {operation} successful", "✓".green())
                } else {
                    format!("{} {operation} failed", "✗".red())
                };

                let mut output = format!("{status}\n");
                if result.details.is_empty() {
                    return output;
                }

                let rows: Vec<DetailRow> = result
                    .details
                    .iter()
                    .map(|d| DetailRow {
                        category: Self::format_category(d.category),
                        group: d.group.clone(),
                        source: d.source.clone(),
                        explanation: Self::truncate(&d.explanation, 80),
                    })
                    .collect();
                output.push('\n');
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats the markers of a signal channel.
    #[must_use]
    pub fn format_signals(&self, directory: &Path, channel: &dyn SignalChannel) -> String {
        match self.format {
            OutputFormat::Json => {
                let mut markers = serde_json::Map::new();
                for marker in Marker::ALL {
                    markers.insert(marker.to_string(), channel.is_marked(marker).into());
                }
                let json = serde_json::json!({
                    "directory": directory,
                    "markers": markers,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("Signals in {}\n", directory.display());
                for marker in Marker::ALL {
                    let state = if channel.is_marked(marker) {
                        "set".green().to_string()
                    } else {
                        "clear".dimmed().to_string()
                    };
                    let _ = writeln!(output, "   {marker:<10} {state}");
                }
                output
            }
        }
    }

    fn format_category(category: DetailCategory) -> String {
        match category {
            DetailCategory::Info => "info".green().to_string(),
            DetailCategory::Violation => "violation".yellow().to_string(),
            DetailCategory::Error => "error".red().to_string(),
        }
    }

    fn flag(value: bool) -> String {
        if value {
            "yes".green().to_string()
        } else {
            "no".dimmed().to_string()
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::groups;
    use crate::signal::MemorySignalChannel;

    #[test]
    fn test_result_json_is_parseable() {
        let mut result = MissionResult::ok();
        result.error(groups::DEPLOY, "package missing", "api");

        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_result("Deploy", &result)).unwrap();

        assert_eq!(json["successful"], false);
        assert_eq!(json["details"][0]["category"], "error");
        assert_eq!(json["details"][0]["source"], "api");
    }

    #[test]
    fn test_result_text_lists_details() {
        let mut result = MissionResult::ok();
        result.info(groups::CLEAN, "Installed units removed", "fleet-dev");

        let text = OutputFormatter::new(OutputFormat::Text).format_result("Clean", &result);
        assert!(text.contains("Clean successful"));
        assert!(text.contains("fleet-dev"));
    }

    #[test]
    fn test_signal_status_json() {
        let channel = MemorySignalChannel::new();
        channel.mark(Marker::Started).unwrap();

        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_signals(Path::new("/unit"), &channel)).unwrap();

        assert_eq!(json["markers"]["started"], true);
        assert_eq!(json["markers"]["stopped"], false);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("ééééééééééé", 6), "ééé...");
    }
}
