//! The mission engine.
//!
//! A [`Mission`] executes one plan: it cleans and deploys units through the
//! [`Loader`] and [`Installer`] seams, starts an appliance per deployed unit,
//! restarts appliances that crash, and stops the fleet when asked.
//!
//! [`Mission::run`] spawns one background task per mission. While that task
//! is alive every other operation answers "already running" without doing
//! anything, so at most one monitor loop ever mutates the appliance list.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::appliance::{Appliance, ApplianceFactory};
use crate::deploy::{Installer, Loader};
use crate::plan::{DeploymentUnit, Plan};
use crate::signal::POLL_INTERVAL;

use super::result::{groups, MissionResult};

/// Delay between two crash checks of the monitor loop.
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

/// Pause before an appliance that crashed is started again.
pub const RESTART_BACKOFF: Duration = Duration::from_millis(500);

/// Extra time granted to the run task on top of `waitForStopSeconds`.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// Orchestration engine for one plan.
pub struct Mission {
    core: Arc<MissionCore>,
    run: Mutex<Option<RunHandle>>,
}

struct MissionCore {
    plan: Arc<Plan>,
    loader: Arc<dyn Loader>,
    installer: Arc<dyn Installer>,
    factory: Arc<dyn ApplianceFactory>,
    appliances: Mutex<Vec<Box<dyn Appliance>>>,
}

struct RunHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<MissionResult>,
}

impl RunHandle {
    fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl std::fmt::Debug for Mission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mission")
            .field("plan", &self.core.plan.qualified_name())
            .finish_non_exhaustive()
    }
}

fn seconds(value: u32) -> Duration {
    Duration::from_secs(u64::from(value))
}

impl Mission {
    /// Creates a mission for a plan and its collaborators.
    #[must_use]
    pub fn new(
        plan: Arc<Plan>,
        loader: Arc<dyn Loader>,
        installer: Arc<dyn Installer>,
        factory: Arc<dyn ApplianceFactory>,
    ) -> Self {
        Self {
            core: Arc::new(MissionCore {
                plan,
                loader,
                installer,
                factory,
                appliances: Mutex::new(Vec::new()),
            }),
            run: Mutex::new(None),
        }
    }

    /// The plan this mission executes.
    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.core.plan
    }

    /// Returns true while a background run task is alive.
    pub async fn is_running(&self) -> bool {
        self.run.lock().await.as_ref().is_some_and(RunHandle::is_active)
    }

    /// Number of appliances currently tracked.
    pub async fn appliance_count(&self) -> usize {
        self.core.appliances.lock().await.len()
    }

    async fn guard(&self) -> Option<MissionResult> {
        if self.is_running().await {
            debug!("Mission {} is running; request ignored", self.core.name());
            Some(MissionResult::already_running(&self.core.name()))
        } else {
            None
        }
    }

    /// Removes installed units, unless an appliance is still starting.
    pub async fn clean(&self) -> MissionResult {
        match self.guard().await {
            Some(busy) => busy,
            None => self.core.clean().await,
        }
    }

    /// Loads and installs every deployable unit in parallel.
    pub async fn deploy(&self) -> MissionResult {
        match self.guard().await {
            Some(busy) => busy,
            None => self.core.deploy().await,
        }
    }

    /// Starts an appliance for every deployed unit.
    pub async fn start(&self) -> MissionResult {
        match self.guard().await {
            Some(busy) => busy,
            None => self.core.start().await,
        }
    }

    /// Asks every tracked appliance to stop and forgets them.
    pub async fn stop(&self) -> MissionResult {
        match self.guard().await {
            Some(busy) => busy,
            None => self.core.stop().await,
        }
    }

    /// Schedules the background run task and returns immediately.
    pub async fn run(&self) -> MissionResult {
        let mut run = self.run.lock().await;
        if run.as_ref().is_some_and(RunHandle::is_active) {
            return MissionResult::already_running(&self.core.name());
        }

        let (cancel, cancelled) = watch::channel(false);
        let core = Arc::clone(&self.core);
        let task = tokio::spawn(async move { core.run_cycle(cancelled).await });
        *run = Some(RunHandle { cancel, task });

        info!("Mission {} scheduled", self.core.name());
        let mut result = MissionResult::ok();
        result.info(groups::MISSION, "Mission run scheduled", self.core.name());
        result
    }

    /// Cancels the run task and waits for it to stop the fleet, at most
    /// `waitForStopSeconds` plus [`TERMINATE_GRACE`].
    pub async fn terminate(&self) -> MissionResult {
        let mut run = self.run.lock().await;
        let name = self.core.name();
        let mut result = MissionResult::ok();

        let Some(handle) = run.as_mut() else {
            result.info(groups::MISSION, "Mission is not running", name);
            return result;
        };

        if handle.task.is_finished() {
            result.info(groups::MISSION, "Mission run had already completed", name.as_str());
            let joined = (&mut handle.task).await;
            *run = None;
            collect(&mut result, &name, joined);
            return result;
        }

        if handle.cancel.send_replace(true) {
            result.info(groups::MISSION, "Mission is already terminating", name);
            return result;
        }

        info!("Terminating mission {name}");
        let limit = seconds(self.core.plan.wait_for_stop_seconds) + TERMINATE_GRACE;
        let outcome = tokio::time::timeout(limit, &mut handle.task).await;
        // A task that outlives the limit is detached, not aborted.
        *run = None;

        match outcome {
            Ok(joined) => collect(&mut result, &name, joined),
            Err(_) => {
                error!("Mission {name} did not stop within {}s; abandoning it", limit.as_secs());
                result.error(
                    groups::MISSION,
                    format!("Run task did not finish within {}s and was abandoned", limit.as_secs()),
                    name,
                );
            }
        }
        result
    }

    /// Waits for a run task to finish on its own, e.g. when the plan does not
    /// start appliances. Returns the task's result, or `None` if there is no
    /// task or it is still running after the timeout.
    pub async fn wait_for_completion(&self, timeout: Duration) -> Option<MissionResult> {
        let mut run = self.run.lock().await;
        let handle = run.as_mut()?;

        let joined = tokio::time::timeout(timeout, &mut handle.task).await.ok()?;
        *run = None;

        let mut result = MissionResult::ok();
        collect(&mut result, &self.core.name(), joined);
        Some(result)
    }
}

fn collect(
    result: &mut MissionResult,
    name: &str,
    joined: std::result::Result<MissionResult, tokio::task::JoinError>,
) {
    match joined {
        Ok(outcome) => result.merge(outcome),
        Err(e) => result.error(groups::MISSION, format!("Run task failed: {e}"), name),
    }
}

impl MissionCore {
    fn name(&self) -> String {
        self.plan.qualified_name()
    }

    async fn run_cycle(&self, cancelled: watch::Receiver<bool>) -> MissionResult {
        let mut result = MissionResult::ok();
        info!("Mission {} run started", self.name());

        if self.plan.deploy_appliances {
            result.merge(self.clean().await);
            result.merge(self.deploy().await);
        }

        if !self.plan.start_appliances {
            info!("Mission {} does not start appliances; run complete", self.name());
            return result;
        }

        if *cancelled.borrow() {
            info!("Mission {} cancelled before start", self.name());
            return result;
        }

        result.merge(self.start().await);
        result.merge(self.monitor(cancelled).await);
        result.merge(self.stop().await);

        if result.successful {
            info!("Mission {} run finished", self.name());
        } else {
            warn!("Mission {} run finished with failures:\n{result}", self.name());
        }
        result
    }

    async fn clean(&self) -> MissionResult {
        let mut result = MissionResult::ok();
        let appliances = self.appliances.lock().await;

        let starting: Vec<&str> = appliances
            .iter()
            .filter(|a| !a.has_started())
            .map(|a| a.name())
            .collect();
        if !starting.is_empty() {
            for name in starting {
                warn!("Clean refused: appliance '{name}' has not reported started");
                result.violation(
                    groups::CLEAN,
                    "Appliance has not reported started; installed files were kept",
                    name,
                );
            }
            return result;
        }

        info!("Cleaning mission {}", self.name());
        match self.installer.clean(&self.plan).await {
            Ok(()) => result.info(groups::CLEAN, "Installed units removed", self.name()),
            Err(e) => {
                error!("Clean failed: {e}");
                result.error(groups::CLEAN, e.to_string(), self.name());
            }
        }
        result
    }

    async fn deploy(&self) -> MissionResult {
        let mut result = MissionResult::ok();
        let units: Vec<DeploymentUnit> = self.plan.deployable_units().cloned().collect();

        if units.is_empty() {
            result.info(groups::DEPLOY, "Nothing to deploy", self.name());
            return result;
        }

        info!("Deploying {} unit(s) of mission {}", units.len(), self.name());
        let handles: Vec<(String, JoinHandle<crate::error::Result<()>>)> = units
            .into_iter()
            .map(|unit| {
                let loader = Arc::clone(&self.loader);
                let installer = Arc::clone(&self.installer);
                let name = unit.name.clone();
                let task = tokio::spawn(async move {
                    loader.load(&unit).await?;
                    installer.install(&unit).await
                });
                (name, task)
            })
            .collect();

        let limit = seconds(self.plan.wait_for_deploy_seconds);
        let deadline = Instant::now() + limit;
        for (name, mut task) in handles {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(Ok(()))) => {
                    debug!("Deployed '{name}'");
                    result.info(groups::DEPLOY, "Unit deployed", name);
                }
                Ok(Ok(Err(e))) => {
                    error!("Deployment of '{name}' failed: {e}");
                    result.error(groups::DEPLOY, e.to_string(), name);
                }
                Ok(Err(e)) => {
                    error!("Deployment task of '{name}' failed: {e}");
                    result.error(groups::DEPLOY, format!("Deployment task failed: {e}"), name);
                }
                Err(_) => {
                    warn!("Deployment of '{name}' still running after {}s", limit.as_secs());
                    result.error(
                        groups::DEPLOY,
                        format!("Deployment did not complete within {}s", limit.as_secs()),
                        name,
                    );
                }
            }
        }

        result
    }

    async fn start(&self) -> MissionResult {
        let mut result = MissionResult::ok();
        let units: Vec<&DeploymentUnit> = self.plan.deployable_units().collect();

        let deployed = units.iter().filter(|u| u.has_deployed()).count();
        let not_loaded = units.iter().filter(|u| !u.has_loaded()).count();
        let not_installed = units
            .iter()
            .filter(|u| u.has_loaded() && !u.has_installed())
            .count();
        info!(
            "Starting mission {}: {deployed} deployed, {not_loaded} not loaded, {not_installed} not installed",
            self.name()
        );

        if self.plan.all_appliances_must_deploy && not_loaded + not_installed > 0 {
            for unit in units.iter().filter(|u| !u.has_deployed()) {
                result.violation(
                    groups::START,
                    "Unit is not deployed and every unit must deploy; nothing was started",
                    unit.name.as_str(),
                );
            }
            warn!("Mission {} not started: not every unit deployed", self.name());
            return result;
        }

        let mut appliances = self.appliances.lock().await;
        if !appliances.is_empty() {
            result.info(groups::START, "Appliances are already started", self.name());
            return result;
        }

        let wait = seconds(self.plan.wait_for_start_seconds);
        let mut pending = Vec::new();

        for unit in units {
            if !unit.has_deployed() {
                result.info(groups::START, "Unit is not deployed; skipped", unit.name.as_str());
                continue;
            }

            let mut appliance = match self.factory.create(unit) {
                Ok(appliance) => appliance,
                Err(e) => {
                    error!("Cannot create appliance for '{}': {e}", unit.name);
                    result.error(groups::START, e.to_string(), unit.name.as_str());
                    continue;
                }
            };

            if let Err(e) = appliance.start().await {
                error!("Cannot start '{}': {e}", unit.name);
                result.error(groups::START, e.to_string(), unit.name.as_str());
                appliance.dispose();
                continue;
            }

            appliances.push(appliance);
            let index = appliances.len() - 1;

            if unit.wait_for_start {
                if self.plan.start_in_parallel {
                    pending.push(index);
                } else {
                    await_readiness(appliances[index].as_ref(), wait, wait, &mut result).await;
                }
            }
        }

        if !pending.is_empty() {
            let deadline = Instant::now() + wait;
            for index in pending {
                let remaining = deadline.saturating_duration_since(Instant::now());
                await_readiness(appliances[index].as_ref(), remaining, wait, &mut result).await;
            }
        }

        result
    }

    async fn stop(&self) -> MissionResult {
        let mut result = MissionResult::ok();
        let mut appliances = self.appliances.lock().await;

        if appliances.is_empty() {
            result.info(groups::STOP, "No appliances to stop", self.name());
            return result;
        }

        if appliances.iter().all(|a| a.has_stopped()) {
            result.info(groups::STOP, "Appliances are already stopped", self.name());
        } else {
            info!("Stopping {} appliance(s) of mission {}", appliances.len(), self.name());
            for appliance in appliances.iter() {
                if let Err(e) = appliance.stop() {
                    error!("Cannot request stop of '{}': {e}", appliance.name());
                    result.error(groups::STOP, e.to_string(), appliance.name());
                }
            }

            let limit = seconds(self.plan.wait_for_stop_seconds);
            let deadline = Instant::now() + limit;
            while !appliances.iter().all(|a| a.has_stopped()) && Instant::now() < deadline {
                tokio::time::sleep(POLL_INTERVAL).await;
            }

            for appliance in appliances.iter().filter(|a| !a.has_stopped()) {
                warn!("Appliance '{}' did not confirm stop within {}s", appliance.name(), limit.as_secs());
                result.error(
                    groups::STOP,
                    format!("Appliance did not confirm stop within {}s", limit.as_secs()),
                    appliance.name(),
                );
            }
        }

        for appliance in appliances.iter_mut() {
            appliance.dispose();
        }
        appliances.clear();
        result
    }

    async fn monitor(&self, mut cancelled: watch::Receiver<bool>) -> MissionResult {
        let mut result = MissionResult::ok();
        debug!("Monitoring mission {}", self.name());

        loop {
            if *cancelled.borrow_and_update() {
                break;
            }

            tokio::select! {
                changed = cancelled.changed() => {
                    if changed.is_err() {
                        debug!("Mission handle dropped; leaving monitor loop");
                        break;
                    }
                }
                () = tokio::time::sleep(MONITOR_INTERVAL) => {
                    self.restart_crashed(&mut result).await;
                }
            }
        }

        debug!("Monitor loop of mission {} ended", self.name());
        result
    }

    async fn restart_crashed(&self, result: &mut MissionResult) {
        let mut appliances = self.appliances.lock().await;

        for appliance in appliances.iter_mut() {
            if !(appliance.has_started() && appliance.has_stopped()) {
                continue;
            }

            warn!("Appliance '{}' stopped unexpectedly; restarting", appliance.name());
            tokio::time::sleep(RESTART_BACKOFF).await;

            if let Err(e) = appliance.start().await {
                error!("Restart of '{}' failed: {e}", appliance.name());
                result.error(groups::MONITOR, format!("Restart failed: {e}"), appliance.name());
            } else {
                info!("Appliance '{}' restarted", appliance.name());
            }
        }
    }
}

async fn await_readiness(
    appliance: &dyn Appliance,
    timeout: Duration,
    configured: Duration,
    result: &mut MissionResult,
) {
    if appliance.wait_for_start(timeout).await {
        info!("Appliance '{}' is ready", appliance.name());
        result.info(groups::START, "Appliance reported started", appliance.name());
    } else if appliance.has_stopped() {
        warn!("Appliance '{}' stopped before reporting started", appliance.name());
        result.error(groups::START, "Appliance stopped before reporting started", appliance.name());
    } else {
        warn!("Appliance '{}' not ready after {}s", appliance.name(), configured.as_secs());
        result.error(
            groups::START,
            format!("Appliance did not report started within {}s", configured.as_secs()),
            appliance.name(),
        );
    }
}
