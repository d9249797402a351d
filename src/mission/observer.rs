//! Mission observer.
//!
//! The observer owns the active mission. It builds a plan from its source,
//! resolves a mission for it and runs it; when the source reports a changed
//! plan the whole mission is stopped and started again from the new plan.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::appliance::ProcessApplianceFactory;
use crate::deploy::{DirectoryInstaller, DirectoryLoader};
use crate::error::{MissionError, Result};
use crate::plan::{Plan, PlanFactory, PlanSource};

use super::engine::Mission;
use super::result::{groups, MissionResult};

/// Resolves the mission that executes a plan.
pub trait MissionScope: Send + Sync {
    /// Builds a mission with its collaborators for the plan.
    fn resolve(&self, plan: Arc<Plan>) -> Mission;
}

/// Scope wiring the local directory loader and installer and process-backed
/// appliances.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMissionScope;

impl MissionScope for DefaultMissionScope {
    fn resolve(&self, plan: Arc<Plan>) -> Mission {
        Mission::new(
            plan,
            Arc::new(DirectoryLoader::new()),
            Arc::new(DirectoryInstaller::new()),
            Arc::new(ProcessApplianceFactory::new()),
        )
    }
}

/// Keeps one mission running for the current plan.
pub struct MissionObserver {
    source: Arc<dyn PlanSource>,
    factory: PlanFactory,
    scope: Arc<dyn MissionScope>,
    produce_empty_plan: bool,
    current: Mutex<Option<Mission>>,
}

impl std::fmt::Debug for MissionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MissionObserver")
            .field("factory", &self.factory)
            .field("produce_empty_plan", &self.produce_empty_plan)
            .finish_non_exhaustive()
    }
}

impl MissionObserver {
    /// Creates an observer over a plan source.
    #[must_use]
    pub fn new(source: Arc<dyn PlanSource>, factory: PlanFactory, scope: Arc<dyn MissionScope>) -> Self {
        Self {
            source,
            factory,
            scope,
            produce_empty_plan: false,
            current: Mutex::new(None),
        }
    }

    /// Falls back to an inert plan when the document is invalid.
    #[must_use]
    pub fn with_produce_empty_plan(mut self, produce_empty_plan: bool) -> Self {
        self.produce_empty_plan = produce_empty_plan;
        self
    }

    /// Builds the plan, resolves its mission and runs it.
    ///
    /// # Errors
    ///
    /// Returns a plan error if no plan can be built, or
    /// [`MissionError::Boot`] if the mission refuses to run.
    pub async fn start(&self) -> Result<MissionResult> {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            warn!("Replacing mission {} that was still active", previous.plan().qualified_name());
            previous.terminate().await;
        }

        let plan = self.factory.create(self.source.as_ref(), self.produce_empty_plan)?;
        info!(
            "Starting mission {} with {} unit(s)",
            plan.qualified_name(),
            plan.deployments.len()
        );

        let mission = self.scope.resolve(Arc::new(plan));
        let result = boot(mission.run().await)?;
        *current = Some(mission);
        Ok(result)
    }

    /// Terminates the active mission, if any.
    pub async fn stop(&self) -> MissionResult {
        match self.current.lock().await.take() {
            Some(mission) => {
                info!("Stopping mission {}", mission.plan().qualified_name());
                mission.terminate().await
            }
            None => {
                let mut result = MissionResult::ok();
                result.info(groups::MISSION, "No active mission", "observer");
                result
            }
        }
    }

    /// Restarts the mission when the plan changed. Returns true if it did.
    ///
    /// # Errors
    ///
    /// Returns an error if the new mission cannot be started.
    pub async fn check(&self) -> Result<bool> {
        if !self.source.has_updated_plan() {
            return Ok(false);
        }

        info!("Plan changed; restarting mission");
        let stopped = self.stop().await;
        if !stopped.successful {
            warn!("Previous mission did not stop cleanly:\n{stopped}");
        }
        self.start().await?;
        Ok(true)
    }

    /// Qualified name of the active mission's plan.
    pub async fn active_mission(&self) -> Option<String> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|m| m.plan().qualified_name())
    }
}

fn boot(result: MissionResult) -> Result<MissionResult> {
    if result.successful {
        Ok(result)
    } else {
        Err(MissionError::Boot {
            message: result.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::{MockInstaller, MockLoader};
    use crate::plan::MemoryPlanSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingScope {
        resolved: AtomicUsize,
    }

    impl MissionScope for CountingScope {
        fn resolve(&self, plan: Arc<Plan>) -> Mission {
            self.resolved.fetch_add(1, Ordering::SeqCst);
            Mission::new(
                plan,
                Arc::new(MockLoader::new()),
                Arc::new(MockInstaller::new()),
                Arc::new(ProcessApplianceFactory::new()),
            )
        }
    }

    const IDLE_PLAN: &[u8] = br#"{"name":"fleet","deployAppliances":false,"startAppliances":false}"#;

    fn observer(source: &Arc<MemoryPlanSource>, scope: &Arc<CountingScope>) -> MissionObserver {
        let source: Arc<dyn PlanSource> = Arc::clone(source) as Arc<dyn PlanSource>;
        let scope: Arc<dyn MissionScope> = Arc::clone(scope) as Arc<dyn MissionScope>;
        MissionObserver::new(source, PlanFactory::new("/repo", "/install"), scope)
    }

    #[tokio::test]
    async fn test_start_runs_resolved_mission() {
        let source = Arc::new(MemoryPlanSource::with_content(IDLE_PLAN, Duration::ZERO));
        let scope = Arc::new(CountingScope::default());
        let observer = observer(&source, &scope);

        let result = observer.start().await.unwrap();
        assert!(result.successful);
        assert_eq!(scope.resolved.load(Ordering::SeqCst), 1);
        assert_eq!(observer.active_mission().await.as_deref(), Some("fleet-dev"));

        assert!(observer.stop().await.successful);
        assert!(observer.active_mission().await.is_none());
    }

    #[tokio::test]
    async fn test_check_restarts_on_changed_plan() {
        let source = Arc::new(MemoryPlanSource::with_content(IDLE_PLAN, Duration::ZERO));
        let scope = Arc::new(CountingScope::default());
        let observer = observer(&source, &scope);
        observer.start().await.unwrap();

        assert!(!observer.check().await.unwrap());

        source.copy_from(
            br#"{"name":"fleet","environment":"prod","deployAppliances":false,"startAppliances":false}"#,
        );
        assert!(observer.check().await.unwrap());
        assert_eq!(scope.resolved.load(Ordering::SeqCst), 2);
        assert_eq!(observer.active_mission().await.as_deref(), Some("fleet-prod"));
    }

    #[tokio::test]
    async fn test_invalid_plan_fails_start() {
        let source = Arc::new(MemoryPlanSource::with_content(b"{ not json".to_vec(), Duration::ZERO));
        let scope = Arc::new(CountingScope::default());

        let err = observer(&source, &scope).start().await.unwrap_err();
        assert!(err.is_plan_error());
        assert_eq!(scope.resolved.load(Ordering::SeqCst), 0);

        let lenient = observer(&source, &scope).with_produce_empty_plan(true);
        assert!(lenient.start().await.is_ok());
        lenient.stop().await;
    }

    #[test]
    fn test_failed_result_becomes_boot_error() {
        let mut result = MissionResult::ok();
        result.error(groups::START, "cannot launch", "api");

        let err = boot(result).unwrap_err();
        assert!(matches!(err, MissionError::Boot { .. }));
        assert!(err.to_string().contains("cannot launch"));
    }
}
