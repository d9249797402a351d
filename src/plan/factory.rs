//! Plan factory.
//!
//! Turns raw plan bytes into a concrete [`Plan`]: parse, schema check,
//! semantic check, then derivation of everything the author does not control
//! (roots, signing secret, per-unit locations and identity facts).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use rand::RngCore;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::MissionSettings;
use crate::error::{PlanError, Result};

use super::model::{DeploymentUnit, Plan};
use super::schema::PlanSchema;
use super::source::PlanSource;
use super::validator::PlanValidator;

/// Length of the minted signing secret in bytes.
const SIGNING_KEY_BYTES: usize = 64;

/// Builds, versions and saves plans.
#[derive(Debug, Clone)]
pub struct PlanFactory {
    /// Package repository root applied to every plan.
    repository_root: PathBuf,
    /// Installation root applied to every plan.
    installation_root: PathBuf,
}

impl PlanFactory {
    /// Creates a factory with explicit roots.
    #[must_use]
    pub fn new(repository_root: impl Into<PathBuf>, installation_root: impl Into<PathBuf>) -> Self {
        Self {
            repository_root: repository_root.into(),
            installation_root: installation_root.into(),
        }
    }

    /// Creates a factory using the roots from the settings.
    #[must_use]
    pub fn from_settings(settings: &MissionSettings) -> Self {
        Self::new(&settings.repository_root, &settings.installation_root)
    }

    /// Creates a plan from a source.
    ///
    /// When the document is malformed or invalid and `produce_empty_plan` is
    /// set, an inert plan is returned instead of an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read, or if the document is
    /// malformed or invalid and `produce_empty_plan` is false.
    pub fn create<S: PlanSource + ?Sized>(&self, source: &S, produce_empty_plan: bool) -> Result<Plan> {
        let bytes = source.get_source()?;

        match Self::parse(&bytes) {
            Ok(plan) => Ok(self.derive(plan)),
            Err(err) if produce_empty_plan => {
                warn!("Plan rejected, continuing with an empty plan: {err}");
                for violation in err.violations() {
                    warn!("  - {violation}");
                }
                Ok(Plan::inert())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Parses and validates a document without deriving anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or violates the schema
    /// or the semantic rules.
    pub fn parse(bytes: &[u8]) -> std::result::Result<Plan, PlanError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| PlanError::parse(format!("Plan is not valid UTF-8: {e}")))?;

        if text.trim().is_empty() {
            return Err(PlanError::parse("Plan document is empty"));
        }

        let document: Value = serde_json::from_str(text).map_err(|e| PlanError::Parse {
            message: e.to_string(),
            location: Some(format!("{}:{}", e.line(), e.column())),
        })?;

        let violations = PlanSchema::global().validate(&document);
        if !violations.is_empty() {
            return Err(PlanError::Invalid { violations });
        }

        let plan: Plan = serde_json::from_value(document).map_err(|e| PlanError::parse(e.to_string()))?;

        let result = PlanValidator::new().validate(&plan);
        for warning in &result.warnings {
            warn!("{warning}");
        }
        if !result.is_valid() {
            return Err(PlanError::Invalid {
                violations: result.errors,
            });
        }

        debug!(
            "Parsed plan {} with {} unit(s)",
            plan.qualified_name(),
            plan.deployments.len()
        );
        Ok(plan)
    }

    /// Fills in everything the plan author does not control.
    fn derive(&self, mut plan: Plan) -> Plan {
        plan.repository_root.clone_from(&self.repository_root);
        plan.installation_root.clone_from(&self.installation_root);
        plan.token_signing_key = mint_signing_key();

        if plan.deployments.is_empty() {
            debug!("Plan {} has no deployments, adding a placeholder unit", plan.name);
            plan.deployments.push(DeploymentUnit::placeholder(&plan.name));
        }

        let version = plan.repository_version().to_string();
        let host = hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

        for unit in &mut plan.deployments {
            unit.derive_locations(&plan.repository_root, &version, &plan.installation_root);

            let uid = unit.uid().to_string();
            let install = unit.installation_location().display().to_string();
            let (name, alias, build) = (unit.name.clone(), unit.alias.clone(), unit.build.clone());

            unit.seed("mission.name", plan.name.as_str());
            unit.seed("mission.environment", plan.environment.as_str());
            unit.seed("mission.repositoryVersion", version.as_str());
            unit.seed("mission.host", host.as_str());
            unit.seed("mission.tokenSigningKey", plan.token_signing_key.as_str());
            unit.seed("unit.name", name);
            unit.seed("unit.alias", alias);
            unit.seed("unit.build", build);
            unit.seed("unit.uid", uid);
            unit.seed("unit.installationLocation", install);
            for (endpoint, address) in &plan.service_endpoints {
                unit.seed(format!("endpoints.{endpoint}"), address.as_str());
            }
        }

        info!(
            "Created plan {} ({} unit(s), repository version '{}')",
            plan.qualified_name(),
            plan.deployments.len(),
            version
        );
        plan
    }

    /// Mints a repository version from the current time and applies it.
    pub fn create_repository_version(&self, plan: &mut Plan) -> String {
        let version = Utc::now().format("%Y.%m%d.%H%M%S").to_string();
        plan.set_repository_version(version.clone());
        info!("Plan {} now targets repository version {version}", plan.name);
        version
    }

    /// Writes the plan document as indented JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save<W: Write>(&self, plan: &Plan, mut writer: W) -> Result<()> {
        let document = plan.to_document();
        serde_json::to_writer_pretty(&mut writer, &document).map_err(|e| PlanError::Serialization {
            message: e.to_string(),
        })?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        debug!("Saved plan {}", plan.qualified_name());
        Ok(())
    }
}

/// Generates a fresh random signing secret.
fn mint_signing_key() -> String {
    let mut key = [0u8; SIGNING_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut key);
    STANDARD.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::MemoryPlanSource;
    use serde_json::json;
    use std::collections::HashSet;
    use std::path::Path;
    use std::time::Duration;

    fn factory() -> PlanFactory {
        PlanFactory::new("/srv/repository", "/srv/installations")
    }

    fn source(document: &Value) -> MemoryPlanSource {
        MemoryPlanSource::with_content(document.to_string(), Duration::from_secs(30))
    }

    fn unit(name: &str, alias: &str) -> Value {
        json!({
            "name": name,
            "alias": alias,
            "build": "1.4.2",
            "checksum": "",
            "assembly": "bin/app",
            "deploy": true,
            "waitForStart": true,
            "showWindow": false,
            "configuration": { "port": 8080 }
        })
    }

    fn document() -> Value {
        json!({
            "name": "fleet",
            "environment": "prod",
            "repositoryVersion": "2024.0501.101500",
            "allAppliancesMustDeploy": true,
            "serviceEndpoints": { "identity": "http://localhost:5000" },
            "deployments": [unit("api", ""), unit("worker", "jobs"), unit("api-2", "api")]
        })
    }

    #[test]
    fn test_create_derives_units() {
        let plan = factory().create(&source(&document()), false).unwrap();

        assert_eq!(plan.deployments.len(), 3);
        assert_eq!(plan.repository_root, Path::new("/srv/repository"));

        let uids: HashSet<_> = plan.deployments.iter().map(DeploymentUnit::uid).collect();
        assert_eq!(uids.len(), 3);
        assert!(plan.deployments.iter().all(|u| !u.uid().is_nil()));

        let api = plan.unit("api").unwrap();
        assert_eq!(api.alias, "api");
        assert_eq!(
            api.repository_location(),
            Path::new("/srv/repository/2024.0501.101500/api/1.4.2")
        );
        assert_eq!(
            api.installation_location(),
            Path::new("/srv/installations/api").join(api.uid().to_string())
        );

        let worker = plan.unit("worker").unwrap();
        assert!(worker.installation_location().starts_with("/srv/installations/jobs"));
    }

    #[test]
    fn test_shared_alias_never_collides_on_disk() {
        let plan = factory().create(&source(&document()), false).unwrap();
        let api = plan.unit("api").unwrap();
        let api2 = plan.unit("api-2").unwrap();

        assert_eq!(api.alias, api2.alias);
        assert_ne!(api.installation_location(), api2.installation_location());
    }

    #[test]
    fn test_roots_are_never_taken_from_document() {
        let mut doc = document();
        doc["repositoryRoot"] = json!("/tmp/evil");
        doc["installationRoot"] = json!("/tmp/evil");
        doc["tokenSigningKey"] = json!("known");

        let plan = factory().create(&source(&doc), false).unwrap();
        assert_eq!(plan.installation_root, Path::new("/srv/installations"));
        assert_ne!(plan.token_signing_key, "known");
    }

    #[test]
    fn test_signing_key_is_fresh_per_parse() {
        let src = source(&document());
        let first = factory().create(&src, false).unwrap();
        let second = factory().create(&src, false).unwrap();

        assert!(!first.token_signing_key.is_empty());
        assert_ne!(first.token_signing_key, second.token_signing_key);
    }

    #[test]
    fn test_identity_facts_are_seeded() {
        let plan = factory().create(&source(&document()), false).unwrap();
        let api = plan.unit("api").unwrap();

        assert_eq!(api.configuration["mission.name"], json!("fleet"));
        assert_eq!(api.configuration["mission.environment"], json!("prod"));
        assert_eq!(api.configuration["unit.uid"], json!(api.uid().to_string()));
        assert_eq!(api.configuration["mission.tokenSigningKey"], json!(plan.token_signing_key));
        assert_eq!(api.configuration["endpoints.identity"], json!("http://localhost:5000"));
        assert_eq!(api.configuration["port"], json!(8080));
    }

    #[test]
    fn test_malformed_json_with_empty_plan_fallback() {
        let src = MemoryPlanSource::with_content(b"{ not json".to_vec(), Duration::from_secs(30));
        let plan = factory().create(&src, true).unwrap();

        assert!(!plan.deploy_appliances);
        assert!(!plan.start_appliances);
        assert!(plan.deployments.is_empty());
    }

    #[test]
    fn test_malformed_json_without_fallback() {
        let src = MemoryPlanSource::with_content(b"{ not json".to_vec(), Duration::from_secs(30));
        let err = factory().create(&src, false).unwrap_err();
        assert!(err.is_plan_error());
    }

    #[test]
    fn test_schema_failure_reports_every_violation() {
        let doc = json!({
            "name": "fleet",
            "deployments": [{ "name": "api", "configuration": {} }, { "name": 3 }]
        });

        let err = factory().create(&source(&doc), false).unwrap_err();
        let crate::error::MissionError::Plan(plan_err) = err else {
            panic!("expected a plan error");
        };
        let violations = plan_err.violations();
        assert!(violations.len() > 7);
        assert!(violations.iter().any(|v| v.location == "/deployments/1/name"));
    }

    #[test]
    fn test_schema_failure_with_fallback_is_inert() {
        let doc = json!({ "deployments": "none" });
        let plan = factory().create(&source(&doc), true).unwrap();
        assert!(plan.is_inert());
    }

    #[test]
    fn test_empty_deployments_get_placeholder() {
        let doc = json!({ "name": "fleet" });
        let plan = factory().create(&source(&doc), false).unwrap();

        assert_eq!(plan.deployments.len(), 1);
        assert!(!plan.deployments[0].deploy);
        assert_eq!(plan.deployable_units().count(), 0);
    }

    #[test]
    fn test_create_repository_version_recomputes_locations() {
        let factory = factory();
        let mut plan = factory.create(&source(&document()), false).unwrap();

        let version = factory.create_repository_version(&mut plan);

        assert_eq!(plan.repository_version(), version);
        for unit in &plan.deployments {
            assert!(unit.repository_location().starts_with(Path::new("/srv/repository").join(&version)));
        }
    }

    #[test]
    fn test_save_round_trips() {
        let factory = factory();
        let original = factory.create(&source(&document()), false).unwrap();

        let mut saved = Vec::new();
        factory.save(&original, &mut saved).unwrap();

        let reloaded = factory
            .create(&MemoryPlanSource::with_content(saved, Duration::from_secs(30)), false)
            .unwrap();

        let comparable = |plan: &Plan| {
            let mut value = serde_json::to_value(plan.to_document()).unwrap();
            for unit in value["deployments"].as_array_mut().unwrap() {
                unit.as_object_mut().unwrap().remove("uid");
            }
            value
        };

        assert_eq!(comparable(&original), comparable(&reloaded));
        assert_eq!(reloaded.deployments[0].configuration.get("port"), Some(&json!(8080)));
    }

    #[test]
    fn test_save_then_create_without_deployments() {
        let factory = factory();
        let doc = json!({ "name": "My Fleet" });
        let plan = factory.create(&source(&doc), false).unwrap();
        assert_eq!(plan.deployments.len(), 1);

        let mut saved = Vec::new();
        factory.save(&plan, &mut saved).unwrap();
        let written: Value = serde_json::from_slice(&saved).unwrap();
        assert_eq!(written["deployments"], json!([]));

        let reloaded = factory
            .create(&MemoryPlanSource::with_content(saved, Duration::from_secs(30)), false)
            .unwrap();
        assert_eq!(reloaded.name, "My Fleet");
        assert_eq!(reloaded.deployments.len(), 1);
        assert!(reloaded.deployments[0].is_placeholder());
    }

    #[test]
    fn test_save_omits_operator_fields_and_seeded_facts() {
        let factory = factory();
        let plan = factory.create(&source(&document()), false).unwrap();

        let mut saved = Vec::new();
        factory.save(&plan, &mut saved).unwrap();
        let text = String::from_utf8(saved).unwrap();

        assert!(!text.contains("tokenSigningKey"));
        assert!(!text.contains("installationRoot"));
        assert!(!text.contains("mission.name"));
        assert!(text.contains("\"repositoryVersion\""));
    }
}
