//! Marker engine: one animated map marker per vehicle.
//!
//! # Modes
//! - `Overview`: significant moves teleport; no trace is kept.
//! - `Live` / `Replay`: significant moves run a [`Tween`] (rotate, then
//!   translate) stepped by [`Task::Frame`] callbacks; each step extends the
//!   trace when `draw_line` is set.
//!
//! Moves below the significance threshold (4 decimals by default, about 11 m)
//! are GPS noise: only the icon status is refreshed. While a tween is in
//! flight the test runs against its target; a noise-level update retargets
//! the tween, anything larger replaces it. Either way the marker ends at the
//! latest position.
//!
//! At most one tween runs per marker. Starting a tween, teleporting or
//! switching mode cancels the pending frame first.

use crate::animation::{bearing_degrees, normalize_degrees, Pose, Tween};
use crate::config::{EngineConfig, TracePalette};
use crate::icons::{icon_set_for, IconSet, MarkerStatus};
use crate::map_host::{MapHost, MarkerSprite, Shape, ShapeId};
use crate::scheduler::{Scheduler, Task, TaskHandle};
use crate::sizing::{frame_interval_ms, icon_size};
use crate::track::TrackRenderer;
use crate::types::{LatLng, PixelPoint, VehicleId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerMode {
    #[default]
    Overview,
    Live,
    Replay,
}

/// Marker tuning derived from [`EngineConfig`].
#[derive(Clone, Debug)]
pub struct MarkerOptions {
    pub rotation_phase: f64,
    pub translation_phase: f64,
    pub significant_decimals: i32,
    pub size_factor: f64,
    pub palette: TracePalette,
}

impl MarkerOptions {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            rotation_phase: cfg.rotation_phase,
            translation_phase: cfg.translation_phase,
            significant_decimals: cfg.significant_decimals,
            size_factor: cfg.icon_size_factor,
            palette: cfg.palette.clone(),
        }
    }
}

impl Default for MarkerOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// New data for a marker.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerUpdate {
    pub position: LatLng,
    pub status: MarkerStatus,
    /// Trace this stretch in the alert color
    pub overspeed: bool,
    /// Trace color override
    pub trace_color: Option<u32>,
}

impl MarkerUpdate {
    pub fn new(position: LatLng, status: MarkerStatus) -> Self {
        Self {
            position,
            status,
            overspeed: false,
            trace_color: None,
        }
    }
}

/// What `update_marker` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Move below the threshold: icon refreshed in place
    StatusOnly,
    /// Overview mode: jumped to the new position
    Teleported,
    /// Tween started
    Animating,
}

/// Pointer interaction surfaced to the UI shell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarkerEvent {
    Click(VehicleId),
    Hover(VehicleId),
}

/// Per-marker counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarkerStats {
    pub tweens_started: u64,
    pub tweens_cancelled: u64,
    pub status_redraws: u64,
    pub frames: u64,
    /// Times the marker was detached for leaving the viewport
    pub culled: u64,
}

/// Rounded coordinate used for the significance test.
fn quantize(v: f64, decimals: i32) -> f64 {
    (v * 10f64.powi(decimals)).round()
}

fn significant(from: LatLng, to: LatLng, decimals: i32) -> bool {
    quantize(from.lat, decimals) != quantize(to.lat, decimals)
        || quantize(from.lng, decimals) != quantize(to.lng, decimals)
}

#[derive(Debug)]
pub struct MarkerEngine {
    id: VehicleId,
    position: LatLng,
    rotation: f64,
    status: MarkerStatus,
    icon_set: IconSet,
    mode: MarkerMode,
    /// Suppress click/hover, set while the marker is the live-tracking focus
    pub ignore_events: bool,
    /// Extend the trace during animation
    pub draw_line: bool,
    /// Chosen for display by the cluster facade
    displayed: bool,
    pixel: Option<PixelPoint>,
    sprite: Option<ShapeId>,
    track: TrackRenderer,
    tween: Option<Tween>,
    pending_frame: Option<TaskHandle>,
    overspeed: bool,
    trace_color: Option<u32>,
    opts: MarkerOptions,
    stats: MarkerStats,
}

impl MarkerEngine {
    /// A detached marker in overview mode.
    pub fn new(
        id: VehicleId,
        position: LatLng,
        vehicle_type: Option<&str>,
        status: MarkerStatus,
        opts: MarkerOptions,
    ) -> Self {
        let track = TrackRenderer::new(opts.palette.clone());
        Self {
            id,
            position,
            rotation: 0.0,
            status,
            icon_set: icon_set_for(vehicle_type),
            mode: MarkerMode::Overview,
            ignore_events: false,
            draw_line: false,
            displayed: false,
            pixel: None,
            sprite: None,
            track,
            tween: None,
            pending_frame: None,
            overspeed: false,
            trace_color: None,
            opts,
            stats: MarkerStats::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> &VehicleId {
        &self.id
    }

    pub fn position(&self) -> LatLng {
        self.position
    }

    /// Rotation in degrees. Within [0, 360) whenever no tween is running.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn status(&self) -> MarkerStatus {
        self.status
    }

    pub fn mode(&self) -> MarkerMode {
        self.mode
    }

    pub fn icon_name(&self) -> String {
        self.icon_set.icon_name(self.status)
    }

    /// Container pixel at the last draw.
    pub fn pixel(&self) -> Option<PixelPoint> {
        self.pixel
    }

    /// True when the sprite is on the map.
    pub fn is_attached(&self) -> bool {
        self.sprite.is_some()
    }

    pub fn is_displayed(&self) -> bool {
        self.displayed
    }

    pub fn is_animating(&self) -> bool {
        self.tween.is_some()
    }

    pub fn tween(&self) -> Option<&Tween> {
        self.tween.as_ref()
    }

    pub fn pending_frame(&self) -> Option<TaskHandle> {
        self.pending_frame
    }

    pub fn track(&self) -> &TrackRenderer {
        &self.track
    }

    pub fn stats(&self) -> MarkerStats {
        self.stats
    }

    /// True if `to` differs from the current position once rounded.
    pub fn is_significant(&self, to: LatLng) -> bool {
        significant(self.position, to, self.opts.significant_decimals)
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    /// Apply new data. `interval_ms` is the time until the next expected
    /// update and sets the tween length in live/replay mode.
    pub fn update_marker(
        &mut self,
        update: MarkerUpdate,
        interval_ms: f64,
        sched: &mut Scheduler,
        host: &mut dyn MapHost,
    ) -> UpdateOutcome {
        self.status = update.status;
        self.overspeed = update.overspeed;
        self.trace_color = update.trace_color;

        // an in-flight tween is judged against where it is heading
        if let Some(tween) = self.tween.as_mut() {
            if !significant(tween.to.position, update.position, self.opts.significant_decimals) {
                tween.to.position = update.position;
                self.stats.status_redraws += 1;
                self.draw(host);
                return UpdateOutcome::StatusOnly;
            }
        } else if !self.is_significant(update.position) {
            self.stats.status_redraws += 1;
            self.draw(host);
            return UpdateOutcome::StatusOnly;
        }

        self.cancel_animation(sched);
        match self.mode {
            MarkerMode::Overview => {
                self.track.remove(host);
                self.rotation = normalize_degrees(bearing_degrees(self.position, update.position));
                self.position = update.position;
                self.draw(host);
                UpdateOutcome::Teleported
            }
            MarkerMode::Live | MarkerMode::Replay => {
                if self.draw_line && self.track.is_empty() {
                    self.track
                        .add_point(host, self.position, self.overspeed, self.trace_color);
                }
                let from = Pose {
                    position: self.position,
                    rotation: self.rotation,
                };
                self.tween = Some(Tween::new(
                    sched.now(),
                    from,
                    update.position,
                    interval_ms,
                    self.opts.rotation_phase,
                    self.opts.translation_phase,
                ));
                self.stats.tweens_started += 1;
                self.schedule_frame(sched, host.zoom());
                UpdateOutcome::Animating
            }
        }
    }

    /// Next frame at the zoom's frame rate, never past the end of the tween.
    fn schedule_frame(&mut self, sched: &mut Scheduler, zoom: f64) {
        let mut delay = frame_interval_ms(zoom);
        if let Some(tween) = &self.tween {
            delay = delay.min(tween.ends_at().saturating_sub(sched.now()).max(1));
        }
        let handle = sched.schedule(delay, Task::Frame(self.id.clone()));
        self.pending_frame = Some(handle);
    }

    /// Cancel the running tween, leaving the marker at its current pose.
    pub fn cancel_animation(&mut self, sched: &mut Scheduler) {
        if let Some(h) = self.pending_frame.take() {
            sched.cancel(h);
        }
        if self.tween.take().is_some() {
            self.stats.tweens_cancelled += 1;
            self.rotation = normalize_degrees(self.rotation);
        }
    }

    /// Advance the tween. Called when this marker's [`Task::Frame`] fires.
    pub fn on_frame(&mut self, handle: TaskHandle, sched: &mut Scheduler, host: &mut dyn MapHost) {
        if self.pending_frame != Some(handle) {
            return;
        }
        self.pending_frame = None;
        let Some(tween) = self.tween.clone() else {
            return;
        };

        let now = sched.now();
        let finished = tween.is_finished(now);
        let pose = if finished { tween.to } else { tween.sample(now) };
        let moved = pose.position != self.position;
        self.position = pose.position;
        self.rotation = pose.rotation;
        if self.draw_line && moved {
            self.track
                .add_point(host, pose.position, self.overspeed, self.trace_color);
        }
        self.stats.frames += 1;

        if finished {
            self.tween = None;
            self.rotation = normalize_degrees(self.rotation);
        } else {
            self.schedule_frame(sched, host.zoom());
        }
        self.draw(host);
    }

    /// Jump to `position` without animating.
    pub fn set_position(&mut self, position: LatLng, sched: &mut Scheduler, host: &mut dyn MapHost) {
        self.cancel_animation(sched);
        self.position = position;
        self.draw(host);
    }

    /// Switch mode. Any running tween is cancelled; entering overview drops
    /// the trace.
    pub fn set_mode(&mut self, mode: MarkerMode, sched: &mut Scheduler, host: &mut dyn MapHost) {
        if self.mode == mode {
            return;
        }
        self.cancel_animation(sched);
        if mode == MarkerMode::Overview {
            self.track.remove(host);
        }
        self.mode = mode;
    }

    /// Replace the trace with `points`: `(position, alert, color override)`.
    pub fn rebuild_trace(
        &mut self,
        host: &mut dyn MapHost,
        points: impl IntoIterator<Item = (LatLng, bool, Option<u32>)>,
    ) {
        self.track.remove(host);
        for (p, alert, explicit) in points {
            self.track.add_point(host, p, alert, explicit);
        }
    }

    /// Point the icon along `from -> to` without animating.
    pub fn face(&mut self, from: LatLng, to: LatLng, host: &mut dyn MapHost) {
        if from != to {
            self.rotation = normalize_degrees(bearing_degrees(from, to));
            self.draw(host);
        }
    }

    pub fn clear_trace(&mut self, host: &mut dyn MapHost) {
        self.track.remove(host);
    }

    // -----------------------------------------------------------------------
    // Drawing
    // -----------------------------------------------------------------------

    /// Show or hide on behalf of the cluster facade.
    pub fn set_displayed(&mut self, displayed: bool, host: &mut dyn MapHost) {
        self.displayed = displayed;
        self.draw(host);
    }

    /// Resize for the current zoom and reposition. Markers outside the
    /// viewport are detached, not hidden.
    pub fn draw(&mut self, host: &mut dyn MapHost) {
        if !self.displayed {
            self.detach(host);
            return;
        }
        if !host.bounds().contains(self.position) {
            if self.sprite.is_some() {
                self.stats.culled += 1;
            }
            self.detach(host);
            return;
        }

        let size = icon_size(host.zoom(), self.icon_set.square, self.opts.size_factor);
        let pixel = host.project(self.position);
        self.pixel = Some(pixel);
        let sprite = Shape::Marker(MarkerSprite {
            position: self.position,
            pixel,
            icon: self.icon_name(),
            width: size.width,
            height: size.height,
            rotation_deg: self.rotation,
        });
        match self.sprite {
            Some(id) => host.update_shape(id, sprite),
            None => self.sprite = Some(host.add_shape(sprite)),
        }
    }

    fn detach(&mut self, host: &mut dyn MapHost) {
        if let Some(id) = self.sprite.take() {
            host.remove_shape(id);
        }
    }

    /// Take the marker and its trace off the map and stop animating.
    pub fn remove(&mut self, sched: &mut Scheduler, host: &mut dyn MapHost) {
        self.cancel_animation(sched);
        self.track.remove(host);
        self.displayed = false;
        self.detach(host);
    }

    // -----------------------------------------------------------------------
    // Interaction
    // -----------------------------------------------------------------------

    pub fn handle_click(&self) -> Option<MarkerEvent> {
        (!self.ignore_events).then(|| MarkerEvent::Click(self.id.clone()))
    }

    pub fn handle_hover(&self) -> Option<MarkerEvent> {
        (!self.ignore_events).then(|| MarkerEvent::Hover(self.id.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Viewport;
    use crate::map_host::HeadlessMap;
    use approx::assert_abs_diff_eq;

    const START: LatLng = LatLng::new(12.97, 77.59);

    fn setup(mode: MarkerMode) -> (MarkerEngine, Scheduler, HeadlessMap) {
        let mut map = HeadlessMap::new(Viewport::new(START, 14.0, 1000.0, 1000.0));
        let mut sched = Scheduler::new();
        let mut m = MarkerEngine::new(
            VehicleId::new("v1"),
            START,
            Some("truck"),
            MarkerStatus::Running,
            MarkerOptions::default(),
        );
        m.set_displayed(true, &mut map);
        m.set_mode(mode, &mut sched, &mut map);
        (m, sched, map)
    }

    /// Dispatch every frame due up to `until`.
    fn run_frames(m: &mut MarkerEngine, sched: &mut Scheduler, map: &mut HeadlessMap, until: u64) {
        while let Some((h, task)) = sched.pop_due(until) {
            assert_eq!(task, Task::Frame(m.id().clone()));
            m.on_frame(h, sched, map);
        }
        sched.advance_to(until);
    }

    #[test]
    fn insignificant_move_only_redraws_status() {
        let (mut m, mut sched, mut map) = setup(MarkerMode::Live);
        let pixel = m.pixel();
        let moved = LatLng::new(START.lat + 0.00001, START.lng - 0.00002);
        let out = m.update_marker(
            MarkerUpdate::new(moved, MarkerStatus::Idle),
            2000.0,
            &mut sched,
            &mut map,
        );
        assert_eq!(out, UpdateOutcome::StatusOnly);
        assert_eq!(sched.pending(), 0, "no tween scheduled");
        assert!(!m.is_animating());
        assert_eq!(m.pixel(), pixel);
        assert_eq!(m.position(), START);
        assert_eq!(m.status(), MarkerStatus::Idle);
        assert_eq!(map.markers().next().unwrap().icon, "truck-idle");
        assert_eq!(m.stats().status_redraws, 1);
    }

    #[test]
    fn overview_teleports_and_drops_trace() {
        let (mut m, mut sched, mut map) = setup(MarkerMode::Overview);
        let to = LatLng::new(12.975, 77.595);
        let out = m.update_marker(MarkerUpdate::new(to, MarkerStatus::Running), 10_000.0, &mut sched, &mut map);
        assert_eq!(out, UpdateOutcome::Teleported);
        assert_eq!(m.position(), to);
        assert_eq!(sched.pending(), 0);
        assert!(m.track().is_empty());
        assert!(m.rotation() >= 0.0 && m.rotation() < 360.0);
    }

    #[test]
    fn live_tween_reaches_target_and_traces_intermediate_points() {
        let (mut m, mut sched, mut map) = setup(MarkerMode::Live);
        m.draw_line = true;
        let to = LatLng::new(12.97, 77.60);
        let out = m.update_marker(MarkerUpdate::new(to, MarkerStatus::Running), 2000.0, &mut sched, &mut map);
        assert_eq!(out, UpdateOutcome::Animating);
        assert_eq!(sched.pending(), 1);

        // during the rotation phase the marker does not move
        run_frames(&mut m, &mut sched, &mut map, 600);
        assert_eq!(m.position(), START);

        run_frames(&mut m, &mut sched, &mut map, 5000);
        assert!(!m.is_animating());
        assert_eq!(m.position(), to);
        assert_eq!(sched.pending(), 0);
        // start point + several interpolated points + final point
        assert!(m.track().point_count() > 3);
        let last = m.track().current_line().unwrap().points.last().copied();
        assert_eq!(last, Some(to));
    }

    #[test]
    fn second_update_cancels_first_tween() {
        let (mut m, mut sched, mut map) = setup(MarkerMode::Live);
        let first = LatLng::new(12.98, 77.59);
        let second = LatLng::new(12.98, 77.60);
        m.update_marker(MarkerUpdate::new(first, MarkerStatus::Running), 2000.0, &mut sched, &mut map);
        run_frames(&mut m, &mut sched, &mut map, 1000);
        assert!(m.is_animating());

        m.update_marker(MarkerUpdate::new(second, MarkerStatus::Running), 2000.0, &mut sched, &mut map);
        assert_eq!(sched.pending(), 1, "exactly one frame outstanding");
        assert_eq!(m.stats().tweens_cancelled, 1);

        run_frames(&mut m, &mut sched, &mut map, 10_000);
        assert!(!m.is_animating());
        assert_eq!(m.position(), second);
        assert_eq!(m.stats().tweens_started, 2);
    }

    #[test]
    fn small_update_during_tween_still_wins() {
        let (mut m, mut sched, mut map) = setup(MarkerMode::Live);
        let first = LatLng::new(12.98, 77.59);
        let second = LatLng::new(12.97001, 77.59);
        m.update_marker(MarkerUpdate::new(first, MarkerStatus::Running), 2000.0, &mut sched, &mut map);
        // still rotating, so the marker sits at START
        run_frames(&mut m, &mut sched, &mut map, 300);
        assert!(m.is_animating());
        assert!(!m.is_significant(second));

        let out = m.update_marker(MarkerUpdate::new(second, MarkerStatus::Idle), 2000.0, &mut sched, &mut map);
        assert_eq!(out, UpdateOutcome::Animating);
        assert_eq!(m.stats().tweens_cancelled, 1);
        assert_eq!(m.tween().unwrap().to.position, second);
        assert_eq!(sched.pending(), 1);

        run_frames(&mut m, &mut sched, &mut map, 10_000);
        assert!(!m.is_animating());
        assert_eq!(m.position(), second);
        assert_eq!(m.status(), MarkerStatus::Idle);
    }

    #[test]
    fn noise_near_tween_target_retargets_it() {
        let (mut m, mut sched, mut map) = setup(MarkerMode::Live);
        let first = LatLng::new(12.98, 77.59);
        let nudged = LatLng::new(12.98001, 77.59001);
        m.update_marker(MarkerUpdate::new(first, MarkerStatus::Running), 2000.0, &mut sched, &mut map);
        run_frames(&mut m, &mut sched, &mut map, 1000);

        let out = m.update_marker(MarkerUpdate::new(nudged, MarkerStatus::Running), 2000.0, &mut sched, &mut map);
        assert_eq!(out, UpdateOutcome::StatusOnly);
        assert_eq!(m.stats().tweens_cancelled, 0);

        run_frames(&mut m, &mut sched, &mut map, 10_000);
        assert!(!m.is_animating());
        assert_eq!(m.position(), nudged);
    }

    #[test]
    fn rotation_takes_shortest_arc() {
        let (mut m, mut sched, mut map) = setup(MarkerMode::Live);
        // previous rotation 10 degrees
        m.rotation = 10.0;
        // bearing for due south-east-ish target: pick a target whose icon
        // bearing is 350 (= -10), i.e. atan2 gives 80 degrees
        let rad = 80f64.to_radians();
        let to = LatLng::new(START.lat + 0.01 * rad.cos(), START.lng + 0.01 * rad.sin());
        m.update_marker(MarkerUpdate::new(to, MarkerStatus::Running), 3000.0, &mut sched, &mut map);
        let tw = m.tween().unwrap().clone();
        assert_abs_diff_eq!(tw.to.rotation, -10.0, epsilon = 1e-9);
        assert!((tw.to.rotation - tw.from.rotation).abs() <= 20.0 + 1e-9);

        run_frames(&mut m, &mut sched, &mut map, 500);
        let r = m.rotation();
        assert!((-10.0..=10.0).contains(&r), "rotating backwards through 0, got {r}");
        run_frames(&mut m, &mut sched, &mut map, 10_000);
        assert_abs_diff_eq!(m.rotation(), 350.0, epsilon = 1e-9);
    }

    #[test]
    fn leaving_viewport_detaches() {
        let (mut m, mut sched, mut map) = setup(MarkerMode::Overview);
        assert!(m.is_attached());
        m.update_marker(
            MarkerUpdate::new(LatLng::new(40.0, 10.0), MarkerStatus::Running),
            10_000.0,
            &mut sched,
            &mut map,
        );
        assert!(!m.is_attached());
        assert_eq!(map.markers().count(), 0);
        assert_eq!(m.stats().culled, 1);
    }

    #[test]
    fn icon_resizes_with_zoom() {
        let (mut m, _sched, mut map) = setup(MarkerMode::Overview);
        assert_eq!(map.markers().next().unwrap().width, 40.0);
        map.viewport.zoom = 20.0;
        m.draw(&mut map);
        let sprite = map.markers().next().unwrap();
        assert_eq!((sprite.width, sprite.height), (70.0, 35.0));
    }

    #[test]
    fn events_suppressed_while_ignoring() {
        let (mut m, _, _) = setup(MarkerMode::Live);
        assert_eq!(m.handle_click(), Some(MarkerEvent::Click(VehicleId::new("v1"))));
        m.ignore_events = true;
        assert_eq!(m.handle_click(), None);
        assert_eq!(m.handle_hover(), None);
    }

    #[test]
    fn remove_cancels_and_detaches() {
        let (mut m, mut sched, mut map) = setup(MarkerMode::Replay);
        m.draw_line = true;
        m.update_marker(
            MarkerUpdate::new(LatLng::new(12.971, 77.591), MarkerStatus::Running),
            1000.0,
            &mut sched,
            &mut map,
        );
        m.remove(&mut sched, &mut map);
        assert_eq!(sched.pending(), 0);
        assert!(map.is_empty());
        assert!(!m.is_animating());
    }
}
