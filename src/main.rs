//! missionctl entrypoint.
//!
//! This is the command-line front end of the mission fleet orchestrator.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use mission_fleet::cli::{Cli, Commands, OutputFormatter, SignalCommands};
use mission_fleet::config::{find_plan_file, MissionSettings};
use mission_fleet::error::{MissionError, PlanError, Result};
use mission_fleet::mission::{DefaultMissionScope, Mission, MissionObserver, MissionScope};
use mission_fleet::plan::{
    FilePlanSource, MemoryPlanSource, PlanFactory, PlanSchema, PlanSource, PlanValidator,
};
use mission_fleet::signal::{FileSignalChannel, SignalOwner, SignalReader};

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Shortest pause between two plan checks while running.
const MIN_CHECK_PAUSE: Duration = Duration::from_secs(1);

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, directives.as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Picks the log filter. `RUST_LOG` directives win over `--verbose`.
fn log_filter(verbose: bool, directives: Option<&str>) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    let settings = match &cli.command {
        // Neither touches a plan file or the roots.
        Commands::Signal { .. } | Commands::Schema => None,
        _ => Some(load_settings(&cli)?),
    };

    match (cli.command, settings) {
        (Commands::Signal { command }, _) => cmd_signal(command, &formatter).await,
        (Commands::Schema, _) => cmd_schema(),
        (Commands::Validate { warnings }, Some(settings)) => cmd_validate(&settings, warnings, &formatter),
        (Commands::Deploy, Some(settings)) => cmd_deploy(&settings, &formatter).await,
        (Commands::Clean, Some(settings)) => cmd_clean(&settings, &formatter).await,
        (
            Commands::Run {
                check_interval,
                produce_empty_plan,
            },
            Some(settings),
        ) => cmd_run(settings, check_interval, produce_empty_plan, &formatter).await,
        (Commands::Republish { to }, Some(settings)) => cmd_republish(&settings, to.as_deref()),
        (_, None) => Err(MissionError::internal("Settings were not loaded")),
    }
}

/// Validate the plan.
fn cmd_validate(settings: &MissionSettings, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    info!("Validating plan: {}", settings.plan_path.display());

    let bytes = std::fs::read(&settings.plan_path)?;
    let source = MemoryPlanSource::with_content(bytes, Duration::ZERO);
    let plan = PlanFactory::from_settings(settings).create(&source, false)?;

    let validation = PlanValidator::new().validate(&plan);
    println!("{}", formatter.format_plan(&plan, &validation, show_warnings));

    if validation.is_valid() {
        Ok(())
    } else {
        Err(PlanError::Invalid {
            violations: validation.errors,
        }
        .into())
    }
}

/// Print the plan schema.
fn cmd_schema() -> Result<()> {
    let schema = serde_json::to_string_pretty(PlanSchema::global().as_json()).map_err(|e| {
        PlanError::Serialization {
            message: e.to_string(),
        }
    })?;
    writeln!(std::io::stdout().lock(), "{schema}")?;
    Ok(())
}

/// Clean and deploy every unit once.
async fn cmd_deploy(settings: &MissionSettings, formatter: &OutputFormatter) -> Result<()> {
    let mission = resolve_mission(settings)?;

    let mut result = mission.clean().await;
    result.merge(mission.deploy().await);

    println!("{}", formatter.format_result("Deploy", &result));
    ensure_successful("Deploy", result.successful)
}

/// Remove installed units.
async fn cmd_clean(settings: &MissionSettings, formatter: &OutputFormatter) -> Result<()> {
    let mission = resolve_mission(settings)?;
    let result = mission.clean().await;

    println!("{}", formatter.format_result("Clean", &result));
    ensure_successful("Clean", result.successful)
}

/// Run the mission until interrupted.
async fn cmd_run(
    mut settings: MissionSettings,
    check_interval: Option<u64>,
    produce_empty_plan: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    if let Some(secs) = check_interval {
        settings.check_interval = Duration::from_secs(secs);
    }
    let produce_empty_plan = produce_empty_plan || settings.produce_empty_plan;

    let source: Arc<dyn PlanSource> =
        Arc::new(FilePlanSource::new(&settings.plan_path, settings.check_interval)?);
    let observer = MissionObserver::new(
        source,
        PlanFactory::from_settings(&settings),
        Arc::new(DefaultMissionScope),
    )
    .with_produce_empty_plan(produce_empty_plan);

    let started = observer.start().await?;
    println!("{}", formatter.format_result("Start", &started));

    let pause = settings.check_interval.max(MIN_CHECK_PAUSE);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!("Failed to listen for interrupt: {e}");
                }
                info!("Interrupt received, stopping mission");
                break;
            }
            () = tokio::time::sleep(pause) => {
                match observer.check().await {
                    Ok(true) => {
                        if let Some(name) = observer.active_mission().await {
                            info!("Mission {name} restarted from the updated plan");
                        }
                    }
                    Ok(false) => debug!("Plan unchanged"),
                    Err(e) => error!("Failed to apply updated plan: {e}"),
                }
            }
        }
    }

    let stopped = observer.stop().await;
    println!("{}", formatter.format_result("Stop", &stopped));
    ensure_successful("Stop", stopped.successful)
}

/// Point the plan at a fresh repository version and save it.
fn cmd_republish(settings: &MissionSettings, to: Option<&Path>) -> Result<()> {
    let bytes = std::fs::read(&settings.plan_path)?;
    let factory = PlanFactory::from_settings(settings);
    let mut plan = factory.create(&MemoryPlanSource::with_content(bytes, Duration::ZERO), false)?;

    let version = factory.create_repository_version(&mut plan);
    let target = to.unwrap_or(settings.plan_path.as_path());

    let file = std::fs::File::create(target)?;
    factory.save(&plan, std::io::BufWriter::new(file))?;

    eprintln!("Plan {} now targets repository version {version}", plan.qualified_name());
    eprintln!("Written to {}", target.display());
    Ok(())
}

/// Operate the markers of one installation directory.
async fn cmd_signal(command: SignalCommands, formatter: &OutputFormatter) -> Result<()> {
    match command {
        SignalCommands::Started { dir } => {
            SignalOwner::for_installation(&dir).mark_started()?;
            eprintln!("Marked {} as started", dir.display());
        }
        SignalCommands::Stopped { dir } => {
            SignalOwner::for_installation(&dir).mark_stopped()?;
            eprintln!("Marked {} as stopped", dir.display());
        }
        SignalCommands::RequestStop { dir } => {
            SignalReader::for_installation(&dir).request_stop()?;
            eprintln!("Requested stop of {}", dir.display());
        }
        SignalCommands::Reset { dir } => {
            SignalReader::for_installation(&dir).reset()?;
            eprintln!("Cleared markers in {}", dir.display());
        }
        SignalCommands::Status { dir } => {
            let channel = FileSignalChannel::new(&dir);
            println!("{}", formatter.format_signals(&dir, &channel));
        }
        SignalCommands::AwaitStop { dir, poll_ms } => {
            let owner = SignalOwner::for_installation(&dir);
            info!("Waiting for a stop request in {}", dir.display());
            owner.wait_for_stop_request(Duration::from_millis(poll_ms.max(1))).await;
            eprintln!("Stop requested for {}", dir.display());
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Builds settings from `.env`, the environment and the command line.
fn load_settings(cli: &Cli) -> Result<MissionSettings> {
    MissionSettings::load_dotenv(&std::env::current_dir()?)?;
    let mut settings = MissionSettings::from_env()?;

    if let Some(root) = &cli.repository_root {
        settings.repository_root.clone_from(root);
    }
    if let Some(root) = &cli.installation_root {
        settings.installation_root.clone_from(root);
    }
    settings.plan_path = resolve_plan_path(cli.plan.as_ref(), &settings.plan_path);

    debug!("Using settings: {settings:?}");
    Ok(settings)
}

/// Resolves the plan file path.
fn resolve_plan_path(explicit: Option<&PathBuf>, fallback: &Path) -> PathBuf {
    explicit
        .cloned()
        .or_else(|| find_plan_file("."))
        .unwrap_or_else(|| fallback.to_path_buf())
}

/// Reads the plan once and resolves the mission that executes it.
fn resolve_mission(settings: &MissionSettings) -> Result<Mission> {
    let bytes = std::fs::read(&settings.plan_path)?;
    let plan = PlanFactory::from_settings(settings).create(
        &MemoryPlanSource::with_content(bytes, Duration::ZERO),
        settings.produce_empty_plan,
    )?;
    info!("Resolved mission {} with {} unit(s)", plan.qualified_name(), plan.deployments.len());
    Ok(DefaultMissionScope.resolve(Arc::new(plan)))
}

fn ensure_successful(operation: &str, successful: bool) -> Result<()> {
    if successful {
        Ok(())
    } else {
        Err(MissionError::internal(format!("{operation} did not complete successfully")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_defaults_to_verbosity() {
        assert_eq!(log_filter(false, None).to_string(), "info");
        assert_eq!(log_filter(true, None).to_string(), "debug");
        assert_eq!(log_filter(true, Some("  ")).to_string(), "debug");
    }

    #[test]
    fn test_log_filter_prefers_rust_log() {
        assert_eq!(log_filter(false, Some("warn")).to_string(), "warn");
        assert_eq!(log_filter(true, Some("mission_fleet=trace")).to_string(), "mission_fleet=trace");
    }
}
