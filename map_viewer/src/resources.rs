//! Bevy resources shared across systems.

use bevy::prelude::*;
use fleet_core::geo::Viewport;
use fleet_core::notice::Notice;
use fleet_core::{Dashboard, EngineConfig, HeadlessMap, VehicleId};
use fleet_sim::{Scenario, ScenarioKind, SimSourceConfig, SimulatedSource};
use std::collections::VecDeque;

/// Notices kept for the toast panel.
const NOTICE_CAP: usize = 8;

// ---------------------------------------------------------------------------
// Playback control
// ---------------------------------------------------------------------------

/// Whether the simulated clock is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PlayMode {
    #[default]
    Paused,
    Playing,
}

// ---------------------------------------------------------------------------
// Viewer state
// ---------------------------------------------------------------------------

/// Dashboard, simulated fleet and the in-memory shape store the gizmo
/// renderer draws from.
///
/// Inserted as a non-send resource: the dashboard's notice receiver is not
/// `Sync`, so every system touching it runs on the main thread.
pub struct FleetViewer {
    pub dashboard: Dashboard<SimulatedSource>,
    pub map: HeadlessMap,
    pub kind: ScenarioKind,
    pub seed: u64,
    pub config: EngineConfig,
    /// Simulated wall clock (ms)
    pub clock_ms: u64,
    pub play_mode: PlayMode,
    pub speed_multiplier: f32,
    pub notices: VecDeque<Notice>,
    pub hovered: Option<VehicleId>,
}

impl FleetViewer {
    pub fn new(kind: ScenarioKind, seed: u64, config: EngineConfig) -> Self {
        let scenario = Scenario::build(kind, seed);
        let mut map = HeadlessMap::new(Viewport::new(
            scenario.center,
            scenario.zoom,
            1400.0,
            900.0,
        ));
        let source = SimulatedSource::new(
            scenario,
            SimSourceConfig {
                burst_window_ms: config.burst_window_ms.round() as u64,
                overspeed_kmph: config.overspeed_kmph,
                ..SimSourceConfig::default()
            },
        );
        let mut dashboard = Dashboard::new(config.clone(), source);
        if let Err(e) = dashboard.start(&mut map) {
            tracing::warn!(error = %e, "initial fetch failed");
        }
        let mut viewer = Self {
            dashboard,
            map,
            kind,
            seed,
            config,
            clock_ms: 0,
            play_mode: PlayMode::Playing,
            speed_multiplier: 1.0,
            notices: VecDeque::new(),
            hovered: None,
        };
        viewer.collect_notices();
        viewer
    }

    /// Move the simulated clock forward and run everything due.
    pub fn step(&mut self, dt_ms: u64) {
        if dt_ms == 0 {
            return;
        }
        self.clock_ms += dt_ms;
        let now = self.clock_ms;
        self.dashboard.source_mut().advance_to(now);
        if let Err(e) = self.dashboard.advance(now, &mut self.map) {
            tracing::warn!(error = %e, "dashboard advance failed");
        }
        self.collect_notices();
    }

    /// Re-layout after the viewport changed.
    pub fn view_changed(&mut self) {
        self.dashboard.on_view_changed(&mut self.map);
    }

    pub fn collect_notices(&mut self) {
        for n in self.dashboard.drain_notices() {
            self.notices.push_back(n);
            if self.notices.len() > NOTICE_CAP {
                self.notices.pop_front();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering settings
// ---------------------------------------------------------------------------

/// Rendering parameters (adjustable from UI).
#[derive(Resource)]
pub struct RenderSettings {
    /// Draw polylines (live trace, replay route)
    pub show_traces: bool,
    pub show_clusters: bool,
    /// Multiplies icon sizes on screen
    pub marker_scale: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            show_traces: true,
            show_clusters: true,
            marker_scale: 1.0,
        }
    }
}

/// Inputs of the side panels that outlive one frame.
#[derive(Resource)]
pub struct UiState {
    /// Replay window ending at the current clock (minutes)
    pub replay_minutes: u32,
    pub snap_to_road: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            replay_minutes: 5,
            snap_to_road: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Emitted to rebuild the scenario from scratch.
#[derive(Event, Default)]
pub struct ResetEvent;

/// Emitted after a pan, zoom or window resize.
#[derive(Event, Default)]
pub struct ViewChangedEvent;
