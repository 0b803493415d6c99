//! map_viewer binary entry point.
//!
//! Usage:
//!   cargo run --release --package map_viewer -- --scenario city --seed 42
//!   cargo run --release --package map_viewer -- --scenario mixed-status
//!   cargo run --release --package map_viewer -- --scenario stress --config engine.json

use clap::Parser;
use fleet_core::EngineConfig;
use fleet_sim::ScenarioKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "map_viewer", about = "Interactive fleet map")]
struct Args {
    /// Scenario to run
    #[arg(long, value_enum, default_value = "city")]
    scenario: ScenarioKind,

    /// Random seed for reproducibility
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Engine config JSON
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match args.config.as_deref().map(EngineConfig::load) {
        Some(Ok(c)) => c,
        Some(Err(e)) => {
            tracing::error!(error = %e, "could not load config");
            std::process::exit(1);
        }
        None => EngineConfig::default(),
    };
    map_viewer::run_viewer_app(args.scenario, args.seed, config);
}
