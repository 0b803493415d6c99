//! Clock, input and viewport systems.

use crate::resources::{FleetViewer, PlayMode, ResetEvent, ViewChangedEvent};
use bevy::input::mouse::MouseWheel;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use bevy_egui::EguiContexts;
use fleet_core::types::{PixelPoint, VehicleId};

const PAN_STEP_PX: f64 = 120.0;
const MIN_ZOOM: f64 = 3.0;
const MAX_ZOOM: f64 = 19.0;
/// Pointer distance that still hits a marker (px)
const PICK_RADIUS_PX: f64 = 14.0;

/// Keyboard input: Space=play/pause, =/- = speed, arrows pan,
/// PageUp/PageDown zoom, Esc deselects, R resets.
pub fn keyboard_control_system(
    keys: Res<ButtonInput<KeyCode>>,
    mut viewer: NonSendMut<FleetViewer>,
    mut reset_events: EventWriter<ResetEvent>,
    mut view_events: EventWriter<ViewChangedEvent>,
) {
    if keys.just_pressed(KeyCode::Space) {
        viewer.play_mode = match viewer.play_mode {
            PlayMode::Playing => PlayMode::Paused,
            PlayMode::Paused => PlayMode::Playing,
        };
    }
    if keys.just_pressed(KeyCode::Equal) {
        viewer.speed_multiplier = (viewer.speed_multiplier * 2.0).min(64.0);
    }
    if keys.just_pressed(KeyCode::Minus) {
        viewer.speed_multiplier = (viewer.speed_multiplier / 2.0).max(0.25);
    }
    if keys.just_pressed(KeyCode::KeyR) {
        reset_events.send(ResetEvent);
    }
    if keys.just_pressed(KeyCode::Escape) {
        let v = &mut *viewer;
        v.dashboard.select_vehicle(None, &mut v.map);
    }

    let mut pan = (0.0, 0.0);
    if keys.just_pressed(KeyCode::ArrowLeft) {
        pan.0 -= PAN_STEP_PX;
    }
    if keys.just_pressed(KeyCode::ArrowRight) {
        pan.0 += PAN_STEP_PX;
    }
    if keys.just_pressed(KeyCode::ArrowUp) {
        pan.1 -= PAN_STEP_PX;
    }
    if keys.just_pressed(KeyCode::ArrowDown) {
        pan.1 += PAN_STEP_PX;
    }
    if pan != (0.0, 0.0) {
        viewer.map.viewport.pan_by(pan.0, pan.1);
        view_events.send(ViewChangedEvent);
    }

    let mut dz = 0.0;
    if keys.just_pressed(KeyCode::PageUp) {
        dz += 1.0;
    }
    if keys.just_pressed(KeyCode::PageDown) {
        dz -= 1.0;
    }
    if dz != 0.0 && zoom_by(&mut viewer, dz) {
        view_events.send(ViewChangedEvent);
    }
}

/// Mouse wheel zooms one level per notch.
pub fn mouse_zoom_system(
    mut wheel: EventReader<MouseWheel>,
    mut contexts: EguiContexts,
    mut viewer: NonSendMut<FleetViewer>,
    mut view_events: EventWriter<ViewChangedEvent>,
) {
    let over_ui = contexts
        .try_ctx_mut()
        .is_some_and(|ctx| ctx.is_pointer_over_area());
    let dz: f32 = wheel.read().map(|e| e.y.signum()).sum();
    if over_ui || dz == 0.0 {
        return;
    }
    if zoom_by(&mut viewer, dz as f64) {
        view_events.send(ViewChangedEvent);
    }
}

fn zoom_by(viewer: &mut FleetViewer, dz: f64) -> bool {
    let vp = &mut viewer.map.viewport;
    let zoom = (vp.zoom + dz).clamp(MIN_ZOOM, MAX_ZOOM);
    if zoom == vp.zoom {
        return false;
    }
    vp.zoom = zoom;
    true
}

/// Keep the map viewport the size of the window.
pub fn resize_viewport_system(
    windows: Query<&Window, With<PrimaryWindow>>,
    mut viewer: NonSendMut<FleetViewer>,
    mut view_events: EventWriter<ViewChangedEvent>,
) {
    let Ok(window) = windows.get_single() else {
        return;
    };
    let (w, h) = (window.width() as f64, window.height() as f64);
    let vp = &mut viewer.map.viewport;
    if (vp.width - w).abs() > 0.5 || (vp.height - h).abs() > 0.5 {
        vp.width = w;
        vp.height = h;
        view_events.send(ViewChangedEvent);
    }
}

/// Coalesce view changes into one re-layout per frame.
pub fn view_changed_system(
    mut events: EventReader<ViewChangedEvent>,
    mut viewer: NonSendMut<FleetViewer>,
) {
    if events.read().count() > 0 {
        viewer.view_changed();
    }
}

/// Hover and click on markers; during a replay, clicks seek along the route.
pub fn pointer_system(
    buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut contexts: EguiContexts,
    mut viewer: NonSendMut<FleetViewer>,
) {
    let Ok(window) = windows.get_single() else {
        return;
    };
    if contexts
        .try_ctx_mut()
        .is_some_and(|ctx| ctx.is_pointer_over_area())
    {
        return;
    }
    let Some(cursor) = window.cursor_position() else {
        viewer.hovered = None;
        return;
    };
    let px = PixelPoint::new(cursor.x as f64, cursor.y as f64);

    let hit = nearest_marker(&viewer, px);
    let hovered = hit
        .as_ref()
        .filter(|id| viewer.dashboard.on_marker_hover(id).is_some())
        .cloned();
    viewer.hovered = hovered;

    if !buttons.just_pressed(MouseButton::Left) {
        return;
    }
    let v = &mut *viewer;
    if v.dashboard.replay().is_active() {
        let at = v.map.viewport.unproject(px);
        match v.dashboard.on_trace_click(at, &mut v.map) {
            Ok(cursor) => tracing::debug!(cursor, "seeked from route click"),
            Err(e) => tracing::debug!(error = %e, "route click ignored"),
        }
    } else if let Some(id) = hit {
        v.dashboard.on_marker_click(&id, &mut v.map);
    }
}

fn nearest_marker(viewer: &FleetViewer, px: PixelPoint) -> Option<VehicleId> {
    viewer
        .dashboard
        .live()
        .markers()
        .filter(|m| m.is_displayed())
        .map(|m| {
            let p = viewer.map.viewport.project(m.position());
            (m.id(), (p - px).norm())
        })
        .filter(|(_, d)| *d <= PICK_RADIUS_PX)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id.clone())
}

/// Advance the simulated clock with wall time when playing.
pub fn advance_clock_system(time: Res<Time>, mut viewer: NonSendMut<FleetViewer>) {
    if viewer.play_mode == PlayMode::Paused {
        return;
    }
    let dt_ms = (time.delta_secs_f64() * viewer.speed_multiplier as f64 * 1000.0).round() as u64;
    viewer.step(dt_ms);
}

/// Handle reset events: rebuild the scenario and dashboard.
pub fn reset_system(mut reset_events: EventReader<ResetEvent>, mut viewer: NonSendMut<FleetViewer>) {
    if reset_events.read().count() == 0 {
        return;
    }
    let v = &mut *viewer;
    v.dashboard.dispose(&mut v.map);
    let viewport = v.map.viewport;
    *v = FleetViewer::new(v.kind, v.seed, v.config.clone());
    v.map.viewport.width = viewport.width;
    v.map.viewport.height = viewport.height;
    v.view_changed();
    tracing::info!("Scenario reset");
}
