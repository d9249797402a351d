//! Appliances backed by child processes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{ApplianceError, Result};
use crate::plan::DeploymentUnit;
use crate::signal::{FileSignalChannel, SignalChannel, SignalReader};

use super::{Appliance, ApplianceFactory};

/// Appliance running the unit's command as a child process.
#[derive(Debug)]
pub struct ProcessAppliance<C: SignalChannel = FileSignalChannel> {
    name: String,
    command: PathBuf,
    arguments: Vec<String>,
    working_directory: PathBuf,
    show_window: bool,
    signals: SignalReader<C>,
    child: Option<Child>,
}

impl ProcessAppliance<FileSignalChannel> {
    /// Creates an appliance from a derived deployment unit.
    #[must_use]
    pub fn from_unit(unit: &DeploymentUnit) -> Self {
        let directory = unit.installation_location();
        Self::new(
            &unit.name,
            unit.command(),
            unit.arguments().to_vec(),
            directory,
            SignalReader::for_installation(directory),
        )
        .with_show_window(unit.show_window)
    }
}

impl<C: SignalChannel> ProcessAppliance<C> {
    /// Creates an appliance with an explicit command line and channel.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        command: impl Into<PathBuf>,
        arguments: Vec<String>,
        working_directory: impl Into<PathBuf>,
        signals: SignalReader<C>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            arguments,
            working_directory: working_directory.into(),
            show_window: false,
            signals,
            child: None,
        }
    }

    /// Lets the child inherit the console instead of discarding its output.
    #[must_use]
    pub fn with_show_window(mut self, show_window: bool) -> Self {
        self.show_window = show_window;
        self
    }

    /// Executable launched by [`Appliance::start`].
    #[must_use]
    pub fn command(&self) -> &Path {
        &self.command
    }

    /// OS process id of the current child, if one is alive.
    #[must_use]
    pub fn process_id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    async fn replace_running_child(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if !matches!(child.try_wait(), Ok(None)) {
            return Ok(());
        }

        info!("Restarting appliance '{}': killing previous instance", self.name);
        child.start_kill().map_err(|e| ApplianceError::Restart {
            unit: self.name.clone(),
            message: e.to_string(),
        })?;
        if let Err(e) = child.wait().await {
            warn!("Previous instance of '{}' could not be reaped: {e}", self.name);
        }
        Ok(())
    }

    fn spawn(&self) -> Result<Child> {
        let mut command = Command::new(&self.command);
        command
            .args(&self.arguments)
            .current_dir(&self.working_directory)
            .kill_on_drop(false);

        if !self.show_window {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }

        command.spawn().map_err(|e| {
            ApplianceError::Launch {
                unit: self.name.clone(),
                message: format!("{}: {e}", self.command.display()),
            }
            .into()
        })
    }
}

#[async_trait]
impl<C: SignalChannel + 'static> Appliance for ProcessAppliance<C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<()> {
        self.signals.reset()?;
        self.replace_running_child().await?;

        let child = self.spawn()?;
        info!(
            "Launched appliance '{}' (pid {})",
            self.name,
            child.id().map_or_else(|| String::from("?"), |id| id.to_string())
        );
        self.child = Some(child);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        debug!("Requesting stop of appliance '{}'", self.name);
        self.signals.request_stop()
    }

    async fn wait_for_start(&self, timeout: Duration) -> bool {
        self.signals.wait_for_start(timeout).await
    }

    fn has_started(&self) -> bool {
        self.signals.has_started()
    }

    fn has_stopped(&self) -> bool {
        self.signals.has_stopped()
    }

    fn dispose(&mut self) {
        if let Some(child) = self.child.take() {
            debug!("Releasing handle of appliance '{}' (pid {:?})", self.name, child.id());
        }
    }
}

/// Factory producing [`ProcessAppliance`]s for derived units.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessApplianceFactory;

impl ProcessApplianceFactory {
    /// Creates the factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ApplianceFactory for ProcessApplianceFactory {
    fn create(&self, unit: &DeploymentUnit) -> Result<Box<dyn Appliance>> {
        if unit.assembly.trim().is_empty() {
            return Err(ApplianceError::NotRunnable {
                unit: unit.name.clone(),
                reason: String::from("no assembly to execute"),
            }
            .into());
        }
        if unit.installation_location().as_os_str().is_empty() {
            return Err(ApplianceError::NotRunnable {
                unit: unit.name.clone(),
                reason: String::from("installation location has not been derived"),
            }
            .into());
        }

        Ok(Box::new(ProcessAppliance::from_unit(unit)))
    }
}
