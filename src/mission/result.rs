//! Mission operation results.
//!
//! Every lifecycle operation on a mission reports through a [`MissionResult`]
//! rather than an error: failures of individual units become details and the
//! rest of the fleet carries on.

use serde::Serialize;

/// Detail groups used by the mission.
pub mod groups {
    /// Guard and bookkeeping messages.
    pub const MISSION: &str = "Mission";
    /// Removal of installed units.
    pub const CLEAN: &str = "Clean";
    /// Package loading and installation.
    pub const DEPLOY: &str = "Deploy";
    /// Appliance launch and readiness.
    pub const START: &str = "Start";
    /// Appliance shutdown.
    pub const STOP: &str = "Stop";
    /// Crash detection and restart.
    pub const MONITOR: &str = "Monitor";
}

/// Severity of a result detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailCategory {
    /// Informational.
    Info,
    /// A policy refused the operation.
    Violation,
    /// Something failed.
    Error,
}

impl std::fmt::Display for DetailCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Violation => write!(f, "violation"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One entry of a [`MissionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detail {
    /// Severity.
    pub category: DetailCategory,
    /// Operation the detail belongs to.
    pub group: String,
    /// Human readable explanation.
    pub explanation: String,
    /// Unit or component the detail is about.
    pub source: String,
}

/// Outcome of a mission operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionResult {
    /// False once any violation or error was recorded.
    pub successful: bool,
    /// Ordered details.
    pub details: Vec<Detail>,
}

impl Default for MissionResult {
    fn default() -> Self {
        Self::ok()
    }
}

impl MissionResult {
    /// A successful result without details.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            successful: true,
            details: Vec::new(),
        }
    }

    /// The no-op answer given while a run is in progress.
    #[must_use]
    pub fn already_running(mission: &str) -> Self {
        let mut result = Self::ok();
        result.info(groups::MISSION, "Mission is already running", mission);
        result
    }

    /// Records a detail.
    pub fn add(
        &mut self,
        category: DetailCategory,
        group: &str,
        explanation: impl Into<String>,
        source: impl Into<String>,
    ) {
        if category != DetailCategory::Info {
            self.successful = false;
        }
        self.details.push(Detail {
            category,
            group: group.to_string(),
            explanation: explanation.into(),
            source: source.into(),
        });
    }

    /// Records an informational detail.
    pub fn info(&mut self, group: &str, explanation: impl Into<String>, source: impl Into<String>) {
        self.add(DetailCategory::Info, group, explanation, source);
    }

    /// Records a policy violation.
    pub fn violation(&mut self, group: &str, explanation: impl Into<String>, source: impl Into<String>) {
        self.add(DetailCategory::Violation, group, explanation, source);
    }

    /// Records an error.
    pub fn error(&mut self, group: &str, explanation: impl Into<String>, source: impl Into<String>) {
        self.add(DetailCategory::Error, group, explanation, source);
    }

    /// Appends another result's details.
    pub fn merge(&mut self, other: Self) {
        self.successful &= other.successful;
        self.details.extend(other.details);
    }

    /// Details that are violations or errors.
    pub fn failures(&self) -> impl Iterator<Item = &Detail> {
        self.details
            .iter()
            .filter(|d| d.category != DetailCategory::Info)
    }

    /// Returns true if any detail mentions the given source.
    #[must_use]
    pub fn mentions(&self, source: &str) -> bool {
        self.details.iter().any(|d| d.source == source)
    }
}

impl std::fmt::Display for MissionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.successful { "successful" } else { "failed" };
        writeln!(f, "Mission operation {status}")?;

        for detail in &self.details {
            writeln!(
                f,
                "  [{}] {} {}: {}",
                detail.category, detail.group, detail.source, detail.explanation
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_keeps_success() {
        let mut result = MissionResult::ok();
        result.info(groups::DEPLOY, "deployed", "api");
        assert!(result.successful);
        assert_eq!(result.failures().count(), 0);
    }

    #[test]
    fn test_error_fails_result() {
        let mut result = MissionResult::ok();
        result.error(groups::DEPLOY, "boom", "api");
        result.info(groups::DEPLOY, "deployed", "web");

        assert!(!result.successful);
        assert!(result.mentions("api"));
        assert_eq!(result.failures().count(), 1);
    }

    #[test]
    fn test_merge_keeps_order_and_failure() {
        let mut first = MissionResult::ok();
        first.info(groups::CLEAN, "cleaned", "fleet");

        let mut second = MissionResult::ok();
        second.violation(groups::START, "refused", "fleet");

        first.merge(second);
        assert!(!first.successful);
        assert_eq!(first.details.len(), 2);
        assert_eq!(first.details[1].category, DetailCategory::Violation);
    }

    #[test]
    fn test_display_lists_details() {
        let result = MissionResult::already_running("fleet-dev");
        let text = result.to_string();
        assert!(text.contains("successful"));
        assert!(text.contains("already running"));
    }
}
