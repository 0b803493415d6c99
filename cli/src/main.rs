//! `fleetview` CLI: headless scenario runs, session log playback, history replay.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fleet_core::geo::Viewport;
use fleet_core::notice::{Notice, NoticeLevel};
use fleet_core::{
    Dashboard, EngineConfig, HeadlessMap, HistoryRequest, ReplayState, VehicleId,
};
use fleet_sim::{load_log, save_log, LogSource, Scenario, ScenarioKind, SessionLog, SimSourceConfig, SimulatedSource};
use std::path::{Path, PathBuf};

/// Resolution of the headless clock (ms).
const FRAME_MS: u64 = 50;
const VIEW_WIDTH: f64 = 1280.0;
const VIEW_HEIGHT: f64 = 800.0;

#[derive(Parser)]
#[command(name = "fleetview", about = "Headless fleet tracking runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named scenario through the dashboard and output a summary.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Engine config JSON; defaults apply to anything it omits
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the scenario's run length (seconds)
        #[arg(long)]
        duration: Option<u64>,
        /// Track this vehicle live instead of the fleet overview
        #[arg(long)]
        live: Option<String>,
        /// Ask the push channel for road-snapped points
        #[arg(long)]
        snap_to_road: bool,
        /// Output a summary to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save every snapshot batch as a session log
        #[arg(long)]
        save_log: Option<PathBuf>,
    },
    /// Play a recorded session log back through the dashboard.
    Replay {
        /// Path to session log JSON file
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Simulate a scenario, then replay one vehicle's recorded history.
    History {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Vehicle to replay; defaults to the first moving one
        #[arg(long)]
        vehicle: Option<String>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Playback speed factor
        #[arg(long, default_value_t = 10.0)]
        speed: f64,
        #[arg(long)]
        snap_to_road: bool,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            config,
            duration,
            live,
            snap_to_road,
            output,
            save_log: log_path,
        } => {
            let config = load_config(config.as_deref())?;
            run_scenario(
                scenario,
                seed,
                config,
                duration,
                live.map(VehicleId::new),
                snap_to_road,
                output.as_deref(),
                log_path.as_deref(),
            )?;
        }
        Commands::Replay {
            input,
            config,
            output,
        } => {
            let config = load_config(config.as_deref())?;
            run_log(&input, config, output.as_deref())?;
        }
        Commands::History {
            scenario,
            vehicle,
            seed,
            speed,
            snap_to_road,
            config,
            output,
        } => {
            let config = load_config(config.as_deref())?;
            run_history(
                scenario,
                seed,
                config,
                vehicle.map(VehicleId::new),
                speed,
                snap_to_road,
                output.as_deref(),
            )?;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn sim_source(scenario: Scenario, config: &EngineConfig) -> SimulatedSource {
    SimulatedSource::new(
        scenario,
        SimSourceConfig {
            burst_window_ms: config.burst_window_ms.round() as u64,
            overspeed_kmph: config.overspeed_kmph,
            ..SimSourceConfig::default()
        },
    )
}

fn headless_map(scenario: &Scenario) -> HeadlessMap {
    HeadlessMap::new(Viewport::new(
        scenario.center,
        scenario.zoom,
        VIEW_WIDTH,
        VIEW_HEIGHT,
    ))
}

fn print_notices(notices: &[Notice]) {
    for n in notices {
        let tag = match n.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warn",
            NoticeLevel::Error => "error",
        };
        println!("  [{tag}] {}", n.message);
    }
}

fn write_json(path: &Path, json: &serde_json::Value) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(json)?)?;
    println!("Summary saved to {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// run-scenario
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    config: EngineConfig,
    duration_s: Option<u64>,
    live: Option<VehicleId>,
    snap_to_road: bool,
    output_path: Option<&Path>,
    log_path: Option<&Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    let duration_ms = duration_s.map_or(scenario.duration_ms, |s| s * 1000);
    let name = scenario.name.clone();
    let mut host = headless_map(&scenario);
    let poll_interval_ms = config.poll_interval_ms;
    let mut source = sim_source(scenario, &config);
    if log_path.is_some() {
        source.start_recording();
    }
    let mut dashboard = Dashboard::new(config, source);

    println!(
        "Running scenario '{}' (seed={}, duration={:.0}s)...",
        name,
        seed,
        duration_ms as f64 / 1000.0
    );
    let start = std::time::Instant::now();

    let first = dashboard.start(&mut host)?;
    tracing::info!(created = first.created, skipped = first.skipped, "initial fetch");
    if let Some(id) = &live {
        dashboard.start_live(id, snap_to_road, &mut host)?;
        println!("Tracking {id} live");
    }

    let mut notices = Vec::new();
    let mut now = 0;
    while now < duration_ms {
        now += FRAME_MS;
        dashboard.source_mut().advance_to(now);
        dashboard.advance(now, &mut host)?;
        notices.extend(dashboard.drain_notices());
    }

    let elapsed = start.elapsed();
    let counts = dashboard.counts();
    let markers_on_map = host.markers().count();
    let polylines = host.polylines().count();
    let clusters = host.circles().count();
    println!(
        "Done: {} vehicles, {} tracking, {} markers on map, {} clusters, elapsed={:.2}s",
        counts.total,
        counts.tracking,
        markers_on_map,
        clusters,
        elapsed.as_secs_f64(),
    );
    println!(
        "Status: running={} idle={} halt={} nogps={} offline={} dead={} nodata={}",
        counts.running, counts.idle, counts.halt, counts.nogps, counts.offline, counts.dead, counts.nodata,
    );
    if !notices.is_empty() {
        println!("Notices:");
        print_notices(&notices);
    }

    if let Some(lpath) = log_path {
        let log = SessionLog {
            scenario_name: name.clone(),
            seed,
            poll_interval_ms,
            frames: dashboard.source_mut().take_recording(),
        };
        save_log(&log, lpath)?;
        println!("Session log saved to {} ({} frames)", lpath.display(), log.frames.len());
    }

    if let Some(opath) = output_path {
        let json = serde_json::json!({
            "scenario": name,
            "seed": seed,
            "elapsed_s": elapsed.as_secs_f64(),
            "sim_duration_ms": duration_ms,
            "counts": counts,
            "live_vehicle": dashboard.live().live_vehicle(),
            "markers_on_map": markers_on_map,
            "polylines": polylines,
            "clusters": clusters,
            "map_ops": {
                "added": host.ops.added,
                "updated": host.ops.updated,
                "extended": host.ops.extended,
                "removed": host.ops.removed,
            },
            "notices": notices,
        });
        write_json(opath, &json)?;
    }

    dashboard.dispose(&mut host);
    Ok(())
}

// ---------------------------------------------------------------------------
// replay (session log)
// ---------------------------------------------------------------------------

fn run_log(input: &Path, mut config: EngineConfig, output_path: Option<&Path>) -> Result<()> {
    let log = load_log(input)?;
    if log.frames.is_empty() {
        bail!("session log {} has no frames", input.display());
    }
    config.poll_interval_ms = log.poll_interval_ms.max(1);
    println!(
        "Replaying '{}' ({} frames)...",
        log.scenario_name,
        log.frames.len()
    );

    let center = log.frames[0]
        .snapshots
        .iter()
        .find_map(|s| s.position())
        .unwrap_or_default();
    let mut host = HeadlessMap::new(Viewport::new(center, 13.0, VIEW_WIDTH, VIEW_HEIGHT));
    let name = log.scenario_name.clone();
    let seed = log.seed;
    let interval = config.poll_interval_ms;
    let mut dashboard = Dashboard::new(config, LogSource::new(log));

    let frames = dashboard.source().log().frames.len();
    let start = std::time::Instant::now();
    dashboard.start(&mut host)?;
    let mut now = 0;
    while !dashboard.source().exhausted() {
        now += interval;
        dashboard.advance(now, &mut host)?;
    }
    // let the last tweens finish without polling again
    dashboard.advance(now + interval.saturating_sub(1), &mut host)?;
    let notices = dashboard.drain_notices();

    let elapsed = start.elapsed();
    let counts = dashboard.counts();
    println!(
        "Replay done: {} vehicles, {} markers on map, elapsed={:.2}s",
        counts.total,
        host.markers().count(),
        elapsed.as_secs_f64()
    );
    print_notices(&notices);

    if let Some(opath) = output_path {
        let json = serde_json::json!({
            "scenario": name,
            "seed": seed,
            "elapsed_s": elapsed.as_secs_f64(),
            "frames": frames,
            "counts": counts,
            "markers_on_map": host.markers().count(),
        });
        write_json(opath, &json)?;
    }

    dashboard.dispose(&mut host);
    Ok(())
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

fn run_history(
    kind: ScenarioKind,
    seed: u64,
    config: EngineConfig,
    vehicle: Option<VehicleId>,
    speed: f64,
    snap_to_road: bool,
    output_path: Option<&Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    let vehicle = match vehicle.or_else(|| scenario.first_mover().cloned()) {
        Some(v) => v,
        None => bail!("scenario '{}' has no moving vehicle", scenario.name),
    };
    let duration_ms = scenario.duration_ms;
    let name = scenario.name.clone();
    let mut host = headless_map(&scenario);
    let source = sim_source(scenario, &config);
    let mut dashboard = Dashboard::new(config, source);

    // record the whole run first, then look back at it
    dashboard.source_mut().advance_to(duration_ms);
    dashboard.start(&mut host)?;

    let request = HistoryRequest {
        vehicle_id: vehicle.clone(),
        from_ts: 0,
        to_ts: duration_ms as i64,
        snap_to_road,
    };
    dashboard.load_replay(&request, &mut host)?;
    dashboard.set_speed(speed)?;
    dashboard.play(&mut host)?;

    let total = dashboard.replay().dataset().map_or(0, |d| d.len());
    let alerts = dashboard.replay().dataset().map_or(0, |d| d.alerts().count());
    println!(
        "Replaying {vehicle} in '{name}': {total} points, {alerts} alerts, speed x{speed}..."
    );

    let start = std::time::Instant::now();
    let mut now = 0;
    // ticks plus slack for the last tween
    let budget = (total as f64 * dashboard.replay().interval_ms()) as u64 + 10_000;
    while dashboard.replay().state() != ReplayState::Finished && now < budget {
        now += FRAME_MS;
        dashboard.advance(now, &mut host)?;
    }
    let elapsed = start.elapsed();
    let progress = dashboard.replay_progress();
    println!(
        "History done: state={:?}, {:.0}%, {:.2} km, elapsed={:.2}s",
        progress.state,
        progress.percent,
        progress.distance_km,
        elapsed.as_secs_f64()
    );
    print_notices(&dashboard.drain_notices());

    if let Some(opath) = output_path {
        let json = serde_json::json!({
            "scenario": name,
            "seed": seed,
            "vehicle": vehicle,
            "elapsed_s": elapsed.as_secs_f64(),
            "alerts": alerts,
            "ticks": dashboard.replay().ticks(),
            "progress": progress,
            "trace_points": dashboard.replay().marker().map_or(0, |m| m.track().point_count()),
        });
        write_json(opath, &json)?;
    }

    dashboard.dispose(&mut host);
    Ok(())
}
