/*
[INPUT]:  CLI arguments, YAML scenario file, OS shutdown signals
[OUTPUT]: Scenario replayed against a task holder with logged snapshots
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use taskslot::Presentation;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskslot_cli::{ScenarioConfig, run_scenario};

#[derive(Parser, Debug)]
#[command(name = "taskslot", version, about = "Replay start/cancel scenarios against a task holder")]
struct Cli {
    #[arg(long = "scenario", value_name = "PATH")]
    scenario_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    info!(
        scenario_path = %args.scenario_path.display(),
        dry_run = args.dry_run,
        "starting taskslot"
    );

    let config = ScenarioConfig::from_file(&args.scenario_path).context("load scenario")?;
    info!(
        holder = %config.holder.name,
        step_count = config.steps.len(),
        "scenario loaded"
    );

    if args.dry_run {
        println!("scenario valid: {} steps", config.steps.len());
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    let report = run_scenario(&config, shutdown)
        .await
        .context("run scenario")?;

    for (generation, label) in &report.launched {
        info!(generation = %generation, label = %label, "launched");
    }

    let snap = &report.final_snapshot;
    let shown = match snap.presentation() {
        Presentation::Idle => "idle".to_string(),
        Presentation::Loading => "loading".to_string(),
        Presentation::Value(value) => format!("value {value}"),
        Presentation::Error(error) => format!("error {error}"),
    };
    println!(
        "{} steps run, generation {}, {}{}",
        report.steps_run,
        snap.generation(),
        shown,
        if report.interrupted { " (interrupted)" } else { "" }
    );

    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown.cancel();
    });
}
