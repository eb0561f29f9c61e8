//! `touchdown-cli` – guarded ground search from the command line.
//!
//! 1. Loads `~/.touchdown/config.toml` (or `--config`), then applies
//!    `TOUCHDOWN_*` environment overrides and command-line flags.
//! 2. Runs a guarded move straight down from the start point against the
//!    simulated arm, using the push or pull pose strategy.
//! 3. Prints where the ground was found.  Ctrl-C aborts the move.
//!
//! Exit status: 0 on contact, 2 when the search distance was exhausted
//! without contact, 1 on error.

mod cli;
mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use colored::Colorize;
use tracing::{info, warn};

use touchdown_middleware::{EventBus, Topic};
use touchdown_runtime::telemetry::init_tracing;
use touchdown_runtime::{MotionClient, MotionResult, SimMotionClient};
use touchdown_types::{Event, EventPayload, TouchdownError};

use crate::cli::Cli;

const NO_CONTACT_EXIT: u8 = 2;

fn main() -> ExitCode {
    let _guard = init_tracing("touchdown");
    let cli = Cli::parse();

    match run(&cli) {
        Ok(result) if result.ground_detected => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(NO_CONTACT_EXIT),
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<MotionResult, TouchdownError> {
    let path = cli.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = match config::load_from(&path)? {
        Some(cfg) => {
            info!(path = %path.display(), "config loaded");
            cfg
        }
        None => config::Config::default(),
    };
    config::apply_env_overrides(&mut cfg);
    cli.apply(&mut cfg);

    if cli.save_config {
        config::save_to(&cfg, &path)?;
        println!(
            "  {} Config saved to {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        );
    }

    let bus = EventBus::default();
    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(bus.clone(), Arc::clone(&shutdown));

    let start = cfg.sim.start;
    let target = cli.target(start);
    if !cli.json {
        println!("  {:<10} {}", "strategy".dimmed(), cfg.strategy.to_string().bold());
        println!("  {:<10} {start}", "start".dimmed());
        println!("  {:<10} {target}", "target".dimmed());
        println!(
            "  {:<10} window {} · skip {} · tolerance {}",
            "detector".dimmed(),
            cfg.detector.window_size,
            cfg.detector.skip_samples,
            cfg.detector.direction_tolerance
        );
    }

    let mut client = SimMotionClient::new(
        cfg.strategy,
        cfg.detector,
        cfg.frames,
        cfg.sim,
        bus,
    )
    .with_shutdown(shutdown);
    let result = client.execute(target)?;

    if cli.json {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| TouchdownError::Config(format!("failed to encode result: {e}")))?;
        println!("{json}");
    } else {
        print_result(&result);
    }
    Ok(result)
}

fn print_result(result: &MotionResult) {
    println!();
    if result.ground_detected {
        println!(
            "  {} ground found at {} after {} ticks",
            "✓".green().bold(),
            result.final_position.to_string().bold(),
            result.ticks
        );
    } else {
        println!(
            "  {} no ground within the search distance; tip stopped at {} after {} ticks",
            "!".yellow().bold(),
            result.final_position,
            result.ticks
        );
    }
}

/// Ctrl-C raises `shutdown` (checked by the descent every tick) and posts a
/// fault on the alerts topic.
fn install_ctrlc_handler(bus: EventBus, shutdown: Arc<AtomicBool>) {
    let handler = move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – stopping the arm …".yellow().bold());
        shutdown.store(true, Ordering::SeqCst);
        let stop = Event::new(
            "touchdown-cli",
            EventPayload::Fault {
                component: "cli".to_string(),
                message: "operator interrupt".to_string(),
            },
        );
        if let Err(e) = bus.publish_to(Topic::Alerts, stop) {
            warn!(error = %e, "failed to publish interrupt alert");
        }
    };
    if let Err(e) = ctrlc::set_handler(handler) {
        warn!(error = %e, "failed to install Ctrl-C handler; the descent cannot be interrupted");
    }
}
