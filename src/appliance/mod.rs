//! Appliances: runtime wrappers around one OS process each.
//!
//! An appliance pairs a process handle with the reader side of the signal
//! channel in its installation directory. Readiness and shutdown are only
//! ever learned from the channel, never from the process exit status.

mod process;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::plan::DeploymentUnit;

pub use process::{ProcessAppliance, ProcessApplianceFactory};

/// Lifecycle wrapper around one running deployment unit.
#[async_trait]
pub trait Appliance: Send + Sync {
    /// Name of the unit this appliance runs.
    fn name(&self) -> &str;

    /// Resets the signal channel, then launches the process, replacing any
    /// instance that is still alive.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be reset or the process cannot
    /// be launched.
    async fn start(&mut self) -> Result<()>;

    /// Asks the process to shut down. Does not wait.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be delivered.
    fn stop(&self) -> Result<()>;

    /// Waits for readiness. False if the process stopped first or the timeout
    /// elapsed.
    async fn wait_for_start(&self, timeout: Duration) -> bool;

    /// Whether the process reported readiness.
    fn has_started(&self) -> bool;

    /// Whether the process reported a shutdown.
    fn has_stopped(&self) -> bool;

    /// Releases the wrapper. The process is left running if it has not exited.
    fn dispose(&mut self);
}

/// Builds appliances for deployment units.
pub trait ApplianceFactory: Send + Sync {
    /// Creates an appliance for the unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit cannot be run.
    fn create(&self, unit: &DeploymentUnit) -> Result<Box<dyn Appliance>>;
}
