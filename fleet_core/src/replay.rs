//! Replay controller: plays a vehicle's recorded history on a single marker.
//!
//! # State machine
//! `Idle -> Loading -> Ready -> Playing <-> Paused -> Finished -> Idle`
//!
//! Playback is a self-rescheduling [`Task::ReplayTick`]: each tick applies one
//! recorded point and schedules the next at `base / speed`. Pausing cancels
//! the pending tick; seeking rebuilds the trace from scratch and leaves
//! playback paused.

use crate::config::EngineConfig;
use crate::dataset::{AlertKind, ReplayDataset};
use crate::error::{EngineError, Result};
use crate::geo::closest_on_segment;
use crate::icons::MarkerStatus;
use crate::map_host::{MapHost, MarkerSprite, Shape, ShapeId};
use crate::marker::{MarkerEngine, MarkerMode, MarkerOptions, MarkerUpdate};
use crate::notice::Notifier;
use crate::scheduler::{Scheduler, Task, TaskHandle};
use crate::sizing::icon_size;
use crate::source::FleetDataSource;
use crate::track::TrackRenderer;
use crate::types::{HistoryRequest, LatLng, PixelPoint, ReplayPoint};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayState {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Finished,
}

/// Replay progress for the UI shell.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReplayProgressView {
    pub state: ReplayState,
    /// 0 to 100
    pub percent: f64,
    pub cursor: usize,
    pub total: usize,
    pub speed: f64,
    pub distance_km: f64,
    pub current: Option<ReplayPoint>,
}

/// Marker update for one recorded point.
fn point_update(p: &ReplayPoint, overspeed_kmph: f64, traveled: u32) -> MarkerUpdate {
    let overspeed = p.speed > overspeed_kmph;
    MarkerUpdate {
        position: p.position(),
        status: if p.speed > 0.0 {
            MarkerStatus::Running
        } else {
            MarkerStatus::Halt
        },
        overspeed,
        // overspeed stretches fall back to the alert color
        trace_color: (!overspeed).then_some(traveled),
    }
}

fn flag(host: &mut dyn MapHost, position: LatLng, icon: &str, size_factor: f64) -> ShapeId {
    let size = icon_size(host.zoom(), true, size_factor);
    let pixel = host.project(position);
    host.add_shape(Shape::Marker(MarkerSprite {
        position,
        pixel,
        icon: icon.to_owned(),
        width: size.width,
        height: size.height,
        rotation_deg: 0.0,
    }))
}

#[derive(Debug)]
pub struct ReplayController {
    config: EngineConfig,
    opts: MarkerOptions,
    sched: Scheduler,
    state: ReplayState,
    dataset: Option<ReplayDataset>,
    marker: Option<MarkerEngine>,
    /// Whole route in the upcoming color, drawn once on load
    route: TrackRenderer,
    /// Start/end flags and alert icons
    decorations: Vec<ShapeId>,
    speed: f64,
    tick_task: Option<TaskHandle>,
    ticks: u64,
    notifier: Notifier,
}

impl ReplayController {
    pub fn new(config: EngineConfig, notifier: Notifier) -> Self {
        Self {
            opts: MarkerOptions::from_config(&config),
            route: TrackRenderer::new(config.palette.clone()),
            config,
            sched: Scheduler::new(),
            state: ReplayState::Idle,
            dataset: None,
            marker: None,
            decorations: Vec::new(),
            speed: 1.0,
            tick_task: None,
            ticks: 0,
            notifier,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ReplayState {
        self.state
    }

    pub fn dataset(&self) -> Option<&ReplayDataset> {
        self.dataset.as_ref()
    }

    pub fn marker(&self) -> Option<&MarkerEngine> {
        self.marker.as_ref()
    }

    pub fn route(&self) -> &TrackRenderer {
        &self.route
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Delay between ticks at the current speed.
    pub fn interval_ms(&self) -> f64 {
        self.config.replay_base_interval_ms / self.speed
    }

    pub fn cursor(&self) -> usize {
        self.dataset.as_ref().map_or(0, |d| d.cursor())
    }

    pub fn progress(&self) -> f64 {
        self.dataset.as_ref().map_or(0.0, |d| d.progress())
    }

    /// Points applied by ticks since the last load.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn is_active(&self) -> bool {
        self.state != ReplayState::Idle
    }

    pub fn progress_view(&self) -> ReplayProgressView {
        ReplayProgressView {
            state: self.state,
            percent: self.progress(),
            cursor: self.cursor(),
            total: self.dataset.as_ref().map_or(0, |d| d.len()),
            speed: self.speed,
            distance_km: self.dataset.as_ref().map_or(0.0, |d| d.distance_km()),
            current: self.dataset.as_ref().and_then(|d| d.current().cloned()),
        }
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Fetch history and prepare playback. A failed fetch or a dataset with
    /// fewer than two points is reported on the notice channel and leaves the
    /// controller idle.
    pub fn load(
        &mut self,
        request: &HistoryRequest,
        vehicle_type: Option<&str>,
        source: &mut dyn FleetDataSource,
        host: &mut dyn MapHost,
    ) -> Result<()> {
        self.stop(host);
        self.state = ReplayState::Loading;
        tracing::debug!(vehicle = %request.vehicle_id, from = request.from_ts, to = request.to_ts, "loading history");

        let response = match source.fetch_history(request) {
            Ok(r) => r,
            Err(e) => {
                self.state = ReplayState::Idle;
                self.notifier
                    .error(format!("Could not load history for {}: {e}", request.vehicle_id));
                return Err(e.into());
            }
        };
        let dataset = match ReplayDataset::new(
            request.vehicle_id.clone(),
            response.points,
            response.distance_travelled_km,
        ) {
            Ok(d) => d,
            Err(e) => {
                self.state = ReplayState::Idle;
                self.notifier.warn(format!(
                    "Not enough data to replay {} for the selected period",
                    request.vehicle_id
                ));
                return Err(e);
            }
        };

        for p in dataset.points() {
            self.route
                .add_point(host, p.position(), false, Some(self.config.palette.upcoming));
        }
        let factor = self.opts.size_factor;
        self.decorations.push(flag(host, dataset.first(), "flag-start", factor));
        self.decorations.push(flag(host, dataset.last(), "flag-end", factor));
        for (i, kind) in dataset.alerts() {
            let icon = match kind {
                AlertKind::HarshAcceleration => "alert-ha",
                AlertKind::HarshBraking => "alert-hb",
            };
            let at = dataset.points()[i].position();
            self.decorations.push(flag(host, at, icon, factor));
        }

        let mut marker = MarkerEngine::new(
            request.vehicle_id.clone(),
            dataset.first(),
            vehicle_type,
            MarkerStatus::Running,
            self.opts.clone(),
        );
        marker.set_mode(MarkerMode::Replay, &mut self.sched, host);
        marker.draw_line = true;
        marker.ignore_events = true;
        let points = dataset.points();
        marker.face(points[0].position(), points[1].position(), host);
        marker.set_displayed(true, host);

        tracing::info!(
            vehicle = %request.vehicle_id,
            points = dataset.len(),
            distance_km = dataset.distance_km(),
            "replay ready"
        );
        self.marker = Some(marker);
        self.dataset = Some(dataset);
        self.ticks = 0;
        self.state = ReplayState::Ready;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Playback
    // -----------------------------------------------------------------------

    /// Start or resume. Playing a finished replay starts it over.
    pub fn play(&mut self, host: &mut dyn MapHost) -> Result<()> {
        match self.state {
            ReplayState::Ready | ReplayState::Paused => {}
            ReplayState::Finished => self.seek_cursor(0, host)?,
            ReplayState::Playing => return Ok(()),
            state @ (ReplayState::Idle | ReplayState::Loading) => {
                return Err(EngineError::InvalidTransition { action: "play", state })
            }
        }
        self.state = ReplayState::Playing;
        self.schedule_tick();
        tracing::debug!(cursor = self.cursor(), speed = self.speed, "replay playing");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            ReplayState::Playing => {
                self.cancel_tick();
                self.state = ReplayState::Paused;
                Ok(())
            }
            ReplayState::Paused => Ok(()),
            state => Err(EngineError::InvalidTransition { action: "pause", state }),
        }
    }

    /// Change playback speed. Only ticks scheduled from now on use it.
    pub fn set_speed(&mut self, factor: f64) -> Result<()> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(EngineError::InvalidSpeed(factor));
        }
        self.speed = factor;
        Ok(())
    }

    fn schedule_tick(&mut self) {
        self.cancel_tick();
        let delay = self.interval_ms().round() as u64;
        self.tick_task = Some(self.sched.schedule(delay, Task::ReplayTick));
    }

    fn cancel_tick(&mut self) {
        if let Some(h) = self.tick_task.take() {
            self.sched.cancel(h);
        }
    }

    /// Apply the point at the cursor, or finish if there is none left.
    fn tick(&mut self, host: &mut dyn MapHost) -> Result<()> {
        if self.state != ReplayState::Playing {
            return Ok(());
        }
        let interval = self.interval_ms();
        let overspeed_kmph = self.config.overspeed_kmph;
        let traveled = self.config.palette.traveled;

        let dataset = self.dataset.as_mut().ok_or(EngineError::NoReplay)?;
        let Some(point) = dataset.next_point().cloned() else {
            self.state = ReplayState::Finished;
            tracing::info!(ticks = self.ticks, "replay finished");
            return Ok(());
        };
        let marker = self.marker.as_mut().ok_or(EngineError::NoReplay)?;
        marker.update_marker(
            point_update(&point, overspeed_kmph, traveled),
            interval,
            &mut self.sched,
            host,
        );
        self.ticks += 1;
        self.schedule_tick();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Seeking
    // -----------------------------------------------------------------------

    /// Jump to a progress percentage. Returns the new cursor.
    pub fn seek(&mut self, percent: f64, host: &mut dyn MapHost) -> Result<usize> {
        let cursor = self
            .dataset
            .as_ref()
            .ok_or(EngineError::NoReplay)?
            .cursor_for_percent(percent);
        self.seek_cursor(cursor, host)?;
        Ok(cursor)
    }

    /// Seek to the recorded point nearest to a click on the route.
    pub fn seek_to_nearest(&mut self, click: LatLng, host: &mut dyn MapHost) -> Result<usize> {
        let dataset = self.dataset.as_ref().ok_or(EngineError::NoReplay)?;
        let target = host.project(click);
        let pixels: Vec<PixelPoint> = dataset
            .points()
            .iter()
            .map(|p| host.project(p.position()))
            .collect();

        let mut best = (f64::INFINITY, 0usize);
        for (i, seg) in pixels.windows(2).enumerate() {
            let (t, dist) = closest_on_segment(target, seg[0], seg[1]);
            if dist < best.0 {
                best = (dist, if t < 0.5 { i } else { i + 1 });
            }
        }
        let index = best.1;
        tracing::debug!(%click, index, "seek to nearest point");
        self.seek_cursor(index, host)?;
        Ok(index)
    }

    /// Move the cursor, put the marker on the last applied point and redraw
    /// the trace up to it. Playback is left paused.
    fn seek_cursor(&mut self, cursor: usize, host: &mut dyn MapHost) -> Result<()> {
        self.cancel_tick();
        let overspeed_kmph = self.config.overspeed_kmph;
        let traveled = self.config.palette.traveled;
        let dataset = self.dataset.as_mut().ok_or(EngineError::NoReplay)?;
        dataset.set_cursor(cursor);
        let cursor = dataset.cursor();
        let points = dataset.points();

        let at = points[cursor.saturating_sub(1)].position();
        let heading_from = cursor.checked_sub(2).map(|i| points[i].position());
        let trace: Vec<(LatLng, bool, Option<u32>)> = points[..cursor]
            .iter()
            .map(|p| {
                let u = point_update(p, overspeed_kmph, traveled);
                (u.position, u.overspeed, u.trace_color)
            })
            .collect();

        let marker = self.marker.as_mut().ok_or(EngineError::NoReplay)?;
        marker.set_position(at, &mut self.sched, host);
        if let Some(from) = heading_from {
            marker.face(from, at, host);
        }
        marker.rebuild_trace(host, trace);
        self.state = ReplayState::Paused;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Time / teardown
    // -----------------------------------------------------------------------

    /// Run every task due up to `now`.
    pub fn advance(&mut self, now: u64, host: &mut dyn MapHost) -> Result<()> {
        while let Some((handle, task)) = self.sched.pop_due(now) {
            match task {
                Task::Frame(id) => {
                    let marker = self
                        .marker
                        .as_mut()
                        .filter(|m| *m.id() == id)
                        .ok_or(EngineError::UnknownMarker(id))?;
                    marker.on_frame(handle, &mut self.sched, host);
                }
                Task::ReplayTick => {
                    if self.tick_task == Some(handle) {
                        self.tick_task = None;
                        self.tick(host)?;
                    }
                }
                other => tracing::warn!(?other, "task ignored by the replay scheduler"),
            }
        }
        self.sched.advance_to(now);
        Ok(())
    }

    /// Resize the marker after a zoom change.
    pub fn on_view_changed(&mut self, host: &mut dyn MapHost) {
        if let Some(m) = self.marker.as_mut() {
            m.draw(host);
        }
    }

    /// Discard the replay and everything it drew. Back to idle.
    pub fn stop(&mut self, host: &mut dyn MapHost) {
        self.cancel_tick();
        if let Some(mut marker) = self.marker.take() {
            marker.remove(&mut self.sched, host);
        }
        self.route.remove(host);
        for id in self.decorations.drain(..) {
            host.remove_shape(id);
        }
        if self.dataset.take().is_some() {
            tracing::debug!("replay stopped");
        }
        self.state = ReplayState::Idle;
    }

    pub fn dispose(&mut self, host: &mut dyn MapHost) {
        self.stop(host);
        self.sched.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::geo::Viewport;
    use crate::map_host::HeadlessMap;
    use crate::notice::{self, Notice, NoticeLevel};
    use crate::source::fake::FakeSource;
    use crate::types::VehicleId;
    use approx::assert_abs_diff_eq;
    use std::sync::mpsc::Receiver;

    fn history(n: usize) -> Vec<ReplayPoint> {
        (0..n)
            .map(|i| ReplayPoint {
                lat: 12.97,
                lng: 77.59 + i as f64 * 0.001,
                timestamp: 1_000 * i as i64,
                speed: 40.0,
                ..Default::default()
            })
            .collect()
    }

    fn request() -> HistoryRequest {
        HistoryRequest {
            vehicle_id: VehicleId::new("v1"),
            from_ts: 0,
            to_ts: 100_000,
            snap_to_road: false,
        }
    }

    fn setup(n: usize) -> (ReplayController, FakeSource, HeadlessMap, Receiver<Notice>) {
        let (notifier, rx) = notice::channel();
        let ctl = ReplayController::new(EngineConfig::default(), notifier);
        let map = HeadlessMap::new(Viewport::new(LatLng::new(12.97, 77.594), 15.0, 1200.0, 800.0));
        let src = FakeSource {
            history: history(n),
            ..Default::default()
        };
        (ctl, src, map, rx)
    }

    fn loaded(n: usize) -> (ReplayController, FakeSource, HeadlessMap, Receiver<Notice>) {
        let (mut ctl, mut src, mut map, rx) = setup(n);
        ctl.load(&request(), Some("bus"), &mut src, &mut map).unwrap();
        (ctl, src, map, rx)
    }

    #[test]
    fn load_draws_route_flags_and_alerts() {
        let (mut ctl, mut src, mut map, _rx) = setup(4);
        src.history[2].is_hb = Some(true);
        ctl.load(&request(), None, &mut src, &mut map).unwrap();
        assert_eq!(ctl.state(), ReplayState::Ready);
        assert_eq!(ctl.cursor(), 0);
        assert_abs_diff_eq!(ctl.dataset().unwrap().step_percent(), 25.0);
        let icons: Vec<&str> = map.markers().map(|m| m.icon.as_str()).collect();
        assert!(icons.contains(&"flag-start"));
        assert!(icons.contains(&"flag-end"));
        assert!(icons.contains(&"alert-hb"));
        let route = map
            .polylines()
            .find(|l| l.color == EngineConfig::default().palette.upcoming)
            .unwrap();
        assert_eq!(route.points.len(), 4);
    }

    #[test]
    fn short_history_notifies_and_stays_idle() {
        let (mut ctl, mut src, mut map, rx) = setup(1);
        let err = ctl.load(&request(), None, &mut src, &mut map).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientHistory { found: 1 }));
        assert_eq!(ctl.state(), ReplayState::Idle);
        let notices: Vec<Notice> = rx.try_iter().collect();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert!(map.is_empty());
    }

    #[test]
    fn fetch_failure_notifies() {
        let (mut ctl, mut src, mut map, rx) = setup(5);
        src.fail_next = Some(SourceError::Network("502".into()));
        assert!(ctl.load(&request(), None, &mut src, &mut map).is_err());
        assert_eq!(ctl.state(), ReplayState::Idle);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn ten_points_play_to_completion() {
        let (mut ctl, _src, mut map, _rx) = loaded(10);
        ctl.play(&mut map).unwrap();
        assert_eq!(ctl.state(), ReplayState::Playing);
        ctl.advance(60_000, &mut map).unwrap();
        assert_eq!(ctl.state(), ReplayState::Finished);
        assert_eq!(ctl.ticks(), 10);
        assert_eq!(ctl.cursor(), 10);
        assert_eq!(ctl.progress(), 100.0);
        assert_eq!(ctl.scheduler().pending(), 0);
        let m = ctl.marker().unwrap();
        assert_eq!(m.position(), history(10)[9].position());
    }

    #[test]
    fn seek_fifty_percent_rebuilds_first_five_points() {
        let (mut ctl, _src, mut map, _rx) = loaded(10);
        ctl.play(&mut map).unwrap();
        ctl.advance(7_500, &mut map).unwrap();

        let cursor = ctl.seek(50.0, &mut map).unwrap();
        assert_eq!(cursor, 5);
        assert_eq!(ctl.cursor(), 5);
        assert_eq!(ctl.state(), ReplayState::Paused);
        assert_eq!(ctl.scheduler().pending(), 0);

        let m = ctl.marker().unwrap();
        let traced: Vec<LatLng> = m
            .track()
            .segments()
            .iter()
            .flat_map(|s| s.points.iter().copied())
            .collect();
        let expected: Vec<LatLng> = history(10)[..5].iter().map(|p| p.position()).collect();
        assert_eq!(traced, expected);
        assert_eq!(m.position(), expected[4]);
        assert!(!m.is_animating());
    }

    #[test]
    fn pause_and_resume_keep_cursor() {
        let (mut ctl, _src, mut map, _rx) = loaded(10);
        ctl.play(&mut map).unwrap();
        ctl.advance(3_000, &mut map).unwrap();
        ctl.pause().unwrap();
        let c = ctl.cursor();
        assert_eq!(c, 3);
        ctl.advance(20_000, &mut map).unwrap();
        assert_eq!(ctl.cursor(), c);

        ctl.play(&mut map).unwrap();
        ctl.advance(21_000, &mut map).unwrap();
        assert_eq!(ctl.cursor(), c + 1);
    }

    #[test]
    fn speed_applies_to_later_ticks_only() {
        let (mut ctl, _src, mut map, _rx) = loaded(10);
        ctl.play(&mut map).unwrap();
        // first tick already queued at 1000
        ctl.set_speed(4.0).unwrap();
        ctl.advance(999, &mut map).unwrap();
        assert_eq!(ctl.cursor(), 0);
        ctl.advance(1_000, &mut map).unwrap();
        assert_eq!(ctl.cursor(), 1);
        ctl.advance(1_250, &mut map).unwrap();
        assert_eq!(ctl.cursor(), 2);
        assert!(matches!(ctl.set_speed(0.0), Err(EngineError::InvalidSpeed(_))));
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let (mut ctl, _src, mut map, _rx) = setup(3);
        assert!(matches!(
            ctl.play(&mut map),
            Err(EngineError::InvalidTransition { action: "play", state: ReplayState::Idle })
        ));
        assert!(ctl.pause().is_err());
        assert!(matches!(ctl.seek(10.0, &mut map), Err(EngineError::NoReplay)));
    }

    #[test]
    fn play_after_finish_restarts() {
        let (mut ctl, _src, mut map, _rx) = loaded(3);
        ctl.play(&mut map).unwrap();
        ctl.advance(10_000, &mut map).unwrap();
        assert_eq!(ctl.state(), ReplayState::Finished);
        ctl.play(&mut map).unwrap();
        assert_eq!(ctl.cursor(), 0);
        assert_eq!(ctl.state(), ReplayState::Playing);
    }

    #[test]
    fn click_on_route_seeks_to_nearest_point() {
        let (mut ctl, _src, mut map, _rx) = loaded(10);
        // just off the route, close to point 6
        let click = LatLng::new(12.97002, 77.59 + 6.1 * 0.001);
        let index = ctl.seek_to_nearest(click, &mut map).unwrap();
        assert_eq!(index, 6);
        assert_eq!(ctl.cursor(), 6);
        assert_eq!(ctl.state(), ReplayState::Paused);
    }

    #[test]
    fn stop_clears_map() {
        let (mut ctl, _src, mut map, _rx) = loaded(5);
        ctl.play(&mut map).unwrap();
        ctl.advance(2_500, &mut map).unwrap();
        ctl.stop(&mut map);
        assert_eq!(ctl.state(), ReplayState::Idle);
        assert!(map.is_empty());
        assert_eq!(ctl.scheduler().pending(), 0);
        assert!(ctl.dataset().is_none());
    }
}
