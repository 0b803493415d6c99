//! Dashboard facade: the single entry point a UI shell drives.
//!
//! Owns the data source, the live tracker and the replay controller, and keeps
//! the modes exclusive: starting a replay leaves live mode, going live stops
//! the replay, and deselecting the vehicle stops both. While a replay is
//! loaded its vehicle's overview marker is hidden.

use crate::classify::StatusCounts;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::filter::{FilterKey, FilteredVehicleSet};
use crate::live::{LiveTracker, ReconcileReport, SelectedVehicleView};
use crate::map_host::MapHost;
use crate::marker::MarkerEvent;
use crate::notice::{self, Notice, Notifier};
use crate::replay::{ReplayController, ReplayProgressView};
use crate::source::FleetDataSource;
use crate::types::{ChannelId, HistoryRequest, LatLng, VehicleId, VehicleSnapshot};
use std::sync::mpsc::Receiver;

/// Which view the dashboard is in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewMode {
    Overview,
    Live(VehicleId),
    Replay(VehicleId),
}

pub struct Dashboard<S: FleetDataSource> {
    source: S,
    live: LiveTracker,
    replay: ReplayController,
    notifier: Notifier,
    notices: Receiver<Notice>,
}

impl<S: FleetDataSource> Dashboard<S> {
    pub fn new(config: EngineConfig, source: S) -> Self {
        let (notifier, notices) = notice::channel();
        Self {
            source,
            live: LiveTracker::new(config.clone(), notifier.clone()),
            replay: ReplayController::new(config, notifier.clone()),
            notifier,
            notices,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn live(&self) -> &LiveTracker {
        &self.live
    }

    pub fn replay(&self) -> &ReplayController {
        &self.replay
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Notices raised since the last call.
    pub fn drain_notices(&self) -> Vec<Notice> {
        self.notices.try_iter().collect()
    }

    pub fn view_mode(&self) -> ViewMode {
        if let Some(d) = self.replay.dataset() {
            return ViewMode::Replay(d.vehicle_id().clone());
        }
        match self.live.live_vehicle() {
            Some(v) => ViewMode::Live(v.clone()),
            None => ViewMode::Overview,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// First fetch, then periodic polling.
    pub fn start(&mut self, host: &mut dyn MapHost) -> Result<ReconcileReport> {
        let report = self.live.poll_now(&mut self.source, host);
        self.live.start_polling();
        report
    }

    /// Run both controllers up to `now` and deliver pending push batches.
    pub fn advance(&mut self, now: u64, host: &mut dyn MapHost) -> Result<()> {
        self.live.advance(now, &mut self.source, host)?;
        if let Some(channel) = self.live.channel() {
            for batch in self.source.take_pushed(channel) {
                self.live.on_push(channel, batch, host)?;
            }
        }
        self.replay.advance(now, host)
    }

    pub fn dispose(&mut self, host: &mut dyn MapHost) {
        self.replay.dispose(host);
        self.live.dispose(&mut self.source, host);
    }

    // -----------------------------------------------------------------------
    // Overview
    // -----------------------------------------------------------------------

    pub fn reconcile(&mut self, batch: Vec<VehicleSnapshot>, host: &mut dyn MapHost) -> ReconcileReport {
        self.live.reconcile(batch, host)
    }

    pub fn set_filter(&mut self, key: FilterKey, host: &mut dyn MapHost) {
        self.live.set_filter(key, host);
    }

    pub fn set_checked(&mut self, id: &VehicleId, checked: bool, host: &mut dyn MapHost) -> bool {
        self.live.set_checked(id, checked, host)
    }

    pub fn on_view_changed(&mut self, host: &mut dyn MapHost) {
        self.live.on_view_changed(host);
        self.replay.on_view_changed(host);
    }

    /// Select a vehicle, or clear the selection. Selecting a different vehicle
    /// leaves whatever mode the previous one was in.
    pub fn select_vehicle(&mut self, id: Option<VehicleId>, host: &mut dyn MapHost) {
        let keep = |current: Option<&VehicleId>| current.is_some() && current == id.as_ref();
        if !keep(self.live.live_vehicle()) {
            self.live.stop_live(&mut self.source, host);
        }
        if !keep(self.replay.dataset().map(|d| d.vehicle_id())) {
            self.replay.stop(host);
        }
        self.sync_overview(host);
        self.live.select_vehicle(id);
    }

    /// Marker click from the host. Suppressed markers yield nothing.
    pub fn on_marker_click(&mut self, id: &VehicleId, host: &mut dyn MapHost) -> Option<MarkerEvent> {
        let event = self.live.marker(id)?.handle_click()?;
        self.select_vehicle(Some(id.clone()), host);
        Some(event)
    }

    pub fn on_marker_hover(&self, id: &VehicleId) -> Option<MarkerEvent> {
        self.live.marker(id)?.handle_hover()
    }

    // -----------------------------------------------------------------------
    // Live
    // -----------------------------------------------------------------------

    pub fn start_live(&mut self, id: &VehicleId, snap_to_road: bool, host: &mut dyn MapHost) -> Result<ChannelId> {
        self.replay.stop(host);
        self.sync_overview(host);
        self.live.start_live(id, snap_to_road, &mut self.source, host)
    }

    pub fn stop_live(&mut self, host: &mut dyn MapHost) {
        self.live.stop_live(&mut self.source, host);
    }

    // -----------------------------------------------------------------------
    // Replay
    // -----------------------------------------------------------------------

    pub fn load_replay(&mut self, request: &HistoryRequest, host: &mut dyn MapHost) -> Result<()> {
        self.live.stop_live(&mut self.source, host);
        self.live.select_vehicle(Some(request.vehicle_id.clone()));
        let vehicle_type = self
            .live
            .snapshot(&request.vehicle_id)
            .and_then(|s| s.vehicle_type.clone());
        let loaded = self
            .replay
            .load(request, vehicle_type.as_deref(), &mut self.source, host);
        self.sync_overview(host);
        loaded
    }

    pub fn play(&mut self, host: &mut dyn MapHost) -> Result<()> {
        self.replay.play(host)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.replay.pause()
    }

    pub fn seek(&mut self, percent: f64, host: &mut dyn MapHost) -> Result<usize> {
        self.replay.seek(percent, host)
    }

    pub fn set_speed(&mut self, factor: f64) -> Result<()> {
        self.replay.set_speed(factor)
    }

    pub fn stop_replay(&mut self, host: &mut dyn MapHost) {
        self.replay.stop(host);
        self.sync_overview(host);
    }

    /// Hide the replayed vehicle's overview marker for as long as a replay
    /// is loaded.
    fn sync_overview(&mut self, host: &mut dyn MapHost) {
        let replaying = self.replay.dataset().map(|d| d.vehicle_id().clone());
        self.live.set_hidden(replaying, host);
    }

    /// Click on the replay route: seek to the nearest recorded point.
    pub fn on_trace_click(&mut self, at: LatLng, host: &mut dyn MapHost) -> Result<usize> {
        self.replay.seek_to_nearest(at, host)
    }

    // -----------------------------------------------------------------------
    // View models
    // -----------------------------------------------------------------------

    pub fn counts(&self) -> StatusCounts {
        self.live.counts()
    }

    pub fn filtered(&self) -> &FilteredVehicleSet {
        self.live.filtered()
    }

    pub fn selected_view(&self) -> Option<SelectedVehicleView> {
        self.live.selected_view()
    }

    pub fn replay_progress(&self) -> ReplayProgressView {
        self.replay.progress_view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Viewport;
    use crate::map_host::HeadlessMap;
    use crate::replay::ReplayState;
    use crate::source::fake::FakeSource;
    use crate::types::{PushBatch, PushPoint, ReplayPoint};

    const START: LatLng = LatLng::new(12.97, 77.59);

    fn dashboard() -> (Dashboard<FakeSource>, HeadlessMap) {
        let source = FakeSource {
            snapshots: vec![
                VehicleSnapshot::new("v1", START, 100),
                VehicleSnapshot::new("v2", LatLng::new(12.972, 77.592), 100),
            ],
            history: (0..6)
                .map(|i| ReplayPoint {
                    lat: START.lat,
                    lng: START.lng + 0.001 * i as f64,
                    timestamp: i,
                    speed: 20.0,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let map = HeadlessMap::new(Viewport::new(START, 16.0, 1000.0, 1000.0));
        (Dashboard::new(EngineConfig::default(), source), map)
    }

    fn v(id: &str) -> VehicleId {
        VehicleId::new(id)
    }

    fn request() -> HistoryRequest {
        HistoryRequest {
            vehicle_id: v("v1"),
            from_ts: 0,
            to_ts: 10,
            snap_to_road: false,
        }
    }

    #[test]
    fn start_fetches_and_counts() {
        let (mut d, mut map) = dashboard();
        let report = d.start(&mut map).unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(d.counts().running, 2);
        assert_eq!(d.view_mode(), ViewMode::Overview);
    }

    #[test]
    fn pushed_batches_are_delivered_on_advance() {
        let (mut d, mut map) = dashboard();
        d.start(&mut map).unwrap();
        let ch = d.start_live(&v("v1"), false, &mut map).unwrap();
        assert_eq!(d.view_mode(), ViewMode::Live(v("v1")));
        d.source_mut().push(
            ch,
            PushBatch {
                vehicle_id: v("v1"),
                points: vec![PushPoint {
                    lat: START.lat + 0.002,
                    lng: START.lng,
                    timestamp: 500,
                    ..Default::default()
                }],
                nominal_duration_ms: None,
            },
        );
        d.advance(10, &mut map).unwrap();
        assert!(d.live().marker(&v("v1")).unwrap().is_animating());
        // only the live vehicle is on the map
        assert_eq!(d.live().cluster().visible(), &[v("v1")]);
    }

    #[test]
    fn replay_and_live_are_exclusive() {
        let (mut d, mut map) = dashboard();
        d.start(&mut map).unwrap();
        d.start_live(&v("v1"), false, &mut map).unwrap();
        d.load_replay(&request(), &mut map).unwrap();
        assert_eq!(d.view_mode(), ViewMode::Replay(v("v1")));
        assert!(d.live().live_vehicle().is_none());
        assert_eq!(d.source().closed.len(), 1);

        d.start_live(&v("v1"), false, &mut map).unwrap();
        assert_eq!(d.replay().state(), ReplayState::Idle);
    }

    #[test]
    fn replayed_vehicle_leaves_the_overview() {
        let (mut d, mut map) = dashboard();
        d.start(&mut map).unwrap();
        assert!(d.live().marker(&v("v1")).unwrap().is_displayed());

        d.load_replay(&request(), &mut map).unwrap();
        assert_eq!(d.live().hidden(), Some(&v("v1")));
        assert!(!d.live().marker(&v("v1")).unwrap().is_displayed());
        assert!(d.live().marker(&v("v2")).unwrap().is_displayed());
        assert_eq!(d.live().cluster().visible(), &[v("v2")]);

        d.stop_replay(&mut map);
        assert!(d.live().hidden().is_none());
        assert!(d.live().marker(&v("v1")).unwrap().is_displayed());
    }

    #[test]
    fn deselect_stops_everything() {
        let (mut d, mut map) = dashboard();
        d.start(&mut map).unwrap();
        d.load_replay(&request(), &mut map).unwrap();
        d.play(&mut map).unwrap();
        d.advance(2_500, &mut map).unwrap();
        d.select_vehicle(None, &mut map);
        assert_eq!(d.replay().state(), ReplayState::Idle);
        assert!(d.selected_view().is_none());
        assert_eq!(d.replay().scheduler().pending(), 0);
    }

    #[test]
    fn click_selects_unless_suppressed() {
        let (mut d, mut map) = dashboard();
        d.start(&mut map).unwrap();
        assert_eq!(d.on_marker_click(&v("v2"), &mut map), Some(MarkerEvent::Click(v("v2"))));
        assert_eq!(d.selected_view().unwrap().id, v("v2"));

        d.start_live(&v("v1"), false, &mut map).unwrap();
        assert_eq!(d.on_marker_click(&v("v1"), &mut map), None);
        assert_eq!(d.on_marker_hover(&v("v1")), None);
    }

    #[test]
    fn trace_click_seeks() {
        let (mut d, mut map) = dashboard();
        d.start(&mut map).unwrap();
        d.load_replay(&request(), &mut map).unwrap();
        let idx = d
            .on_trace_click(LatLng::new(START.lat, START.lng + 0.0031), &mut map)
            .unwrap();
        assert_eq!(idx, 3);
        assert_eq!(d.replay_progress().cursor, 3);
        assert_eq!(d.replay_progress().state, ReplayState::Paused);
    }

    #[test]
    fn failures_reach_the_notice_channel() {
        let (mut d, mut map) = dashboard();
        d.source_mut().history.truncate(1);
        assert!(d.load_replay(&request(), &mut map).is_err());
        let notices = d.drain_notices();
        assert_eq!(notices.len(), 1);
        assert!(d.drain_notices().is_empty());
    }
}
