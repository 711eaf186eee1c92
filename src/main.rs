//! Junction-OS - adaptive traffic signal controller
//!
//! Runs one junction: spawns a worker per approach, drives the phase cycle
//! through the configured relay board and re-plans phase holds from the
//! densities the workers report.
//!
//! # Usage
//!
//! ```bash
//! # Run the junction described in ./junction.toml
//! cargo run --release
//!
//! # Explicit config, JSON logs
//! ./junction-os --config /etc/junction-os/junction.toml --json
//!
//! # Bench run: synthetic detections instead of the configured sources
//! ./junction-os --synthetic
//!
//! # Check a config file and exit
//! ./junction-os --config junction.toml --check
//! ```
//!
//! # Environment Variables
//!
//! - `JUNCTION_CONFIG`: Path to the junction TOML (when `--config` is absent)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use junction_os::config::{self, JunctionConfig};
use junction_os::control::{DurationPlanner, PhaseController, SignalLoop};
use junction_os::relay;
use junction_os::telemetry::LogSink;
use junction_os::workers::WorkerOrchestrator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "junction-os")]
#[command(about = "Junction-OS adaptive traffic signal controller")]
#[command(version)]
struct CliArgs {
    /// Junction config file (default: $JUNCTION_CONFIG, then ./junction.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,

    /// Replace every approach's frame source with a seeded synthetic one
    #[arg(long)]
    synthetic: bool,

    /// Validate the config, print the resolved cycle and exit
    #[arg(long)]
    check: bool,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    SignalLoop,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::SignalLoop => write!(f, "SignalLoop"),
        }
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &CliArgs) -> Result<JunctionConfig> {
    let mut junction = match &args.config {
        Some(path) => JunctionConfig::load_from_file(path)
            .with_context(|| format!("Failed to load junction config {}", path.display()))?,
        None => JunctionConfig::load().context("Failed to load junction config")?,
    };
    if args.synthetic {
        info!("Frame sources overridden: synthetic detections on every approach");
        junction.use_synthetic_sources();
    }
    Ok(junction)
}

/// Run the supervisor loop: monitor tasks, cancel on failure, then let the
/// remaining tasks finish their own cleanup.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    let mut outcome = Ok(());
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {:#}", e);
                        cancel_token.cancel();
                        outcome = Err(e);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        outcome = Err(anyhow::anyhow!("Task panicked: {}", e));
                        break;
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        return Ok(());
                    }
                }
            }
        }
    }

    // The signal loop turns the lamps off on its way out; wait for it.
    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => info!("Supervisor: task {} stopped", task_name),
            Ok(Err(e)) => error!("Supervisor: task failed during shutdown: {:#}", e),
            Err(e) => error!("Supervisor: task panicked during shutdown: {}", e),
        }
    }
    outcome
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json);

    let junction = load_config(&args)?;
    let cycle = junction.phase_cycle().context("Invalid phase cycle")?;

    info!(
        junction = %junction.junction.id,
        name = %junction.junction.name,
        phases = cycle.len(),
        approaches = cycle.width(),
        cycle_ms = cycle.total_duration().as_millis() as u64,
        backend = %junction.relay.backend,
        "Junction loaded"
    );
    for (i, phase) in cycle.phases().iter().enumerate() {
        info!(phase = i, states = %phase, hold_ms = cycle.duration(i).as_millis() as u64, "Cycle phase");
    }

    if args.check {
        info!("Config OK");
        return Ok(());
    }

    config::init(junction);
    let junction = config::get().context("Junction config not initialised")?;
    let kinds = cycle.approach_kinds().to_vec();

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let actuator = relay::connect(&junction.relay, &kinds)
        .await
        .context("Failed to bring up the relay board")?;

    let specs = junction
        .worker_specs(&kinds)
        .context("Failed to open approach frame sources")?;
    let telemetry = Arc::new(LogSink::new(
        &junction.junction.id,
        &junction.junction.sub_location_id,
    ));
    let orchestrator = WorkerOrchestrator::spawn(specs, telemetry, cancel_token.child_token());

    let planner = DurationPlanner::new(
        junction.density.clone(),
        kinds.clone(),
        cycle.durations().to_vec(),
    )?;
    let signal_loop = SignalLoop::new(
        PhaseController::new(cycle),
        orchestrator,
        actuator,
        planner,
        junction.loop_timing(),
    )?;

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    let loop_cancel = cancel_token.clone();
    task_set.spawn(async move {
        signal_loop
            .run(loop_cancel)
            .await
            .context("Signal loop stopped")?;
        Ok(TaskName::SignalLoop)
    });

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("Junction-OS shutdown complete");
    Ok(())
}
