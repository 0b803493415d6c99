//! Live tracking controller: the fleet overview and single-vehicle live mode.
//!
//! # Overview (polling)
//! Every poll interval a snapshot batch is fetched and reconciled against the
//! marker registry. Known vehicles get `update_marker` with the poll interval
//! as tween length; unseen vehicles get a new, detached marker that the
//! cluster facade picks up once it passes the active filter.
//!
//! # Live
//! `start_live` stops polling and opens the vehicle's push channel. Each
//! pushed batch is played back as a burst: one point per [`Task::BurstStep`],
//! spaced `window / points` apart so every tween completes before the next
//! point is applied.
//!
//! The controller owns the registry and its own [`Scheduler`]. Markers are
//! created here and never replaced while their id is known.

use crate::classify::{classify, push_point_status, StatusCounts, VehicleStatus};
use crate::cluster::ClusterFacade;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::filter::{FilterKey, FilteredVehicleSet};
use crate::map_host::MapHost;
use crate::marker::{MarkerEngine, MarkerMode, MarkerOptions, MarkerUpdate, UpdateOutcome};
use crate::notice::Notifier;
use crate::scheduler::{Scheduler, Task, TaskHandle};
use crate::source::FleetDataSource;
use crate::types::{ChannelId, LatLng, PushBatch, PushPoint, VehicleId, VehicleSnapshot};
use serde::Serialize;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackingMode {
    /// Not polling, no channel open
    Stopped,
    Polling,
    Live {
        vehicle: VehicleId,
        channel: ChannelId,
        snap_to_road: bool,
    },
}

/// Points of the push batch being played back.
#[derive(Clone, Debug)]
struct Burst {
    points: Vec<PushPoint>,
    next: usize,
    interval_ms: f64,
}

/// Result of one reconciliation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: usize,
    /// Markers that teleported or started a tween
    pub moved: usize,
    /// Markers whose move was below the significance threshold
    pub status_only: usize,
    /// Snapshots without a usable position
    pub skipped: usize,
}

/// Display fields of the selected vehicle, for the UI shell.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SelectedVehicleView {
    pub id: VehicleId,
    pub status: VehicleStatus,
    pub position: Option<LatLng>,
    pub speed: f64,
    pub address: Option<String>,
    pub timestamp: Option<i64>,
    pub battery_voltage: Option<f64>,
    pub is_primary_battery: bool,
    pub vehicle_type: Option<String>,
}

#[derive(Debug)]
pub struct LiveTracker {
    config: EngineConfig,
    opts: MarkerOptions,
    sched: Scheduler,
    markers: BTreeMap<VehicleId, MarkerEngine>,
    snapshots: BTreeMap<VehicleId, VehicleSnapshot>,
    statuses: BTreeMap<VehicleId, VehicleStatus>,
    filter: FilterKey,
    filtered: FilteredVehicleSet,
    selected: Option<VehicleId>,
    /// Kept off the overview while another controller draws it
    hidden: Option<VehicleId>,
    cluster: ClusterFacade,
    mode: TrackingMode,
    burst: Option<Burst>,
    burst_task: Option<TaskHandle>,
    poll_task: Option<TaskHandle>,
    notifier: Notifier,
}

impl LiveTracker {
    pub fn new(config: EngineConfig, notifier: Notifier) -> Self {
        Self {
            opts: MarkerOptions::from_config(&config),
            cluster: ClusterFacade::new(config.cluster.clone()),
            config,
            sched: Scheduler::new(),
            markers: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            statuses: BTreeMap::new(),
            filter: FilterKey::All,
            filtered: FilteredVehicleSet::default(),
            selected: None,
            hidden: None,
            mode: TrackingMode::Stopped,
            burst: None,
            burst_task: None,
            poll_task: None,
            notifier,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> &TrackingMode {
        &self.mode
    }

    /// Vehicle being live-tracked, if any.
    pub fn live_vehicle(&self) -> Option<&VehicleId> {
        match &self.mode {
            TrackingMode::Live { vehicle, .. } => Some(vehicle),
            _ => None,
        }
    }

    /// Open push channel, if any.
    pub fn channel(&self) -> Option<ChannelId> {
        match &self.mode {
            TrackingMode::Live { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    pub fn marker(&self, id: &VehicleId) -> Option<&MarkerEngine> {
        self.markers.get(id)
    }

    pub fn markers(&self) -> impl Iterator<Item = &MarkerEngine> {
        self.markers.values()
    }

    pub fn snapshot(&self, id: &VehicleId) -> Option<&VehicleSnapshot> {
        self.snapshots.get(id)
    }

    pub fn status(&self, id: &VehicleId) -> Option<VehicleStatus> {
        self.statuses.get(id).copied()
    }

    /// Counts per status bucket over every vehicle seen, with or without a
    /// position.
    pub fn counts(&self) -> StatusCounts {
        StatusCounts::from_statuses(self.statuses.values().copied())
    }

    pub fn filter(&self) -> FilterKey {
        self.filter
    }

    pub fn filtered(&self) -> &FilteredVehicleSet {
        &self.filtered
    }

    pub fn selected(&self) -> Option<&VehicleId> {
        self.selected.as_ref()
    }

    pub fn cluster(&self) -> &ClusterFacade {
        &self.cluster
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    /// `(applied, total)` points of the running burst.
    pub fn burst_progress(&self) -> Option<(usize, usize)> {
        self.burst.as_ref().map(|b| (b.next, b.points.len()))
    }

    pub fn selected_view(&self) -> Option<SelectedVehicleView> {
        let id = self.selected.as_ref()?;
        let snap = self.snapshots.get(id)?;
        let status = self.statuses.get(id).copied().unwrap_or(VehicleStatus::NoData);
        let position = self
            .markers
            .get(id)
            .map(|m| m.position())
            .or_else(|| snap.position());
        Some(SelectedVehicleView {
            id: id.clone(),
            status,
            position,
            speed: snap.speed,
            address: snap.address.clone(),
            timestamp: snap.timestamp,
            battery_voltage: snap.battery_voltage,
            is_primary_battery: snap.is_primary_battery,
            vehicle_type: snap.vehicle_type.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Apply a snapshot batch. Vehicles without coordinates are counted but
    /// not placed; a marker that already exists stays where it was.
    pub fn reconcile(&mut self, batch: Vec<VehicleSnapshot>, host: &mut dyn MapHost) -> ReconcileReport {
        let interval = self.config.poll_interval_ms as f64;
        let live = self.live_vehicle().cloned();
        let mut report = ReconcileReport::default();

        for snap in batch {
            let status = classify(&snap);
            let id = snap.id.clone();
            match snap.position() {
                None => {
                    report.skipped += 1;
                    tracing::debug!(vehicle = %id, ?status, "snapshot without position");
                }
                Some(position) => match self.markers.get_mut(&id) {
                    // the push channel drives this marker
                    Some(_) if live.as_ref() == Some(&id) => {}
                    Some(marker) => {
                        let update = MarkerUpdate {
                            position,
                            status: status.marker_status(),
                            overspeed: snap.is_overspeed,
                            trace_color: None,
                        };
                        match marker.update_marker(update, interval, &mut self.sched, host) {
                            UpdateOutcome::StatusOnly => report.status_only += 1,
                            UpdateOutcome::Teleported | UpdateOutcome::Animating => report.moved += 1,
                        }
                    }
                    None => {
                        let marker = MarkerEngine::new(
                            id.clone(),
                            position,
                            snap.vehicle_type.as_deref(),
                            status.marker_status(),
                            self.opts.clone(),
                        );
                        self.markers.insert(id.clone(), marker);
                        report.created += 1;
                    }
                },
            }
            self.statuses.insert(id.clone(), status);
            self.snapshots.insert(id, snap);
        }

        // moved markers may have left (or joined) a bubble
        let regroup = report.moved > 0 && self.cluster.is_grouping(host.zoom());
        self.refresh_display(host, regroup);
        tracing::debug!(
            created = report.created,
            moved = report.moved,
            status_only = report.status_only,
            skipped = report.skipped,
            "reconciled snapshot batch"
        );
        report
    }

    /// Fetch and reconcile right away. Failures go to the notice channel.
    pub fn poll_now(
        &mut self,
        source: &mut dyn FleetDataSource,
        host: &mut dyn MapHost,
    ) -> Result<ReconcileReport> {
        match source.fetch_snapshots() {
            Ok(batch) => Ok(self.reconcile(batch, host)),
            Err(e) => {
                self.notifier.error(format!("Could not refresh vehicles: {e}"));
                Err(e.into())
            }
        }
    }

    /// Recompute the filtered set and hand the display set to the cluster
    /// facade if it changed (or always, with `force`).
    fn refresh_display(&mut self, host: &mut dyn MapHost, force: bool) {
        self.filtered
            .recompute(&self.snapshots, &self.statuses, self.filter);
        let visible: Vec<VehicleId> = match &self.mode {
            TrackingMode::Live { vehicle, .. } => vec![vehicle.clone()],
            _ => self
                .filtered
                .displayed_ids()
                .into_iter()
                .filter(|id| self.markers.contains_key(id) && self.hidden.as_ref() != Some(id))
                .collect(),
        };
        if force || visible.as_slice() != self.cluster.visible() {
            self.cluster.rebuild(&visible, &mut self.markers, host);
        }
    }

    /// Leave `id` out of the overview display set, or show everything again
    /// with `None`.
    pub fn set_hidden(&mut self, id: Option<VehicleId>, host: &mut dyn MapHost) {
        if self.hidden != id {
            self.hidden = id;
            self.refresh_display(host, false);
        }
    }

    pub fn hidden(&self) -> Option<&VehicleId> {
        self.hidden.as_ref()
    }

    /// Re-layout after the viewport moved or zoomed.
    pub fn on_view_changed(&mut self, host: &mut dyn MapHost) {
        self.refresh_display(host, true);
    }

    // -----------------------------------------------------------------------
    // Filter / selection
    // -----------------------------------------------------------------------

    pub fn set_filter(&mut self, key: FilterKey, host: &mut dyn MapHost) {
        if self.filter != key {
            tracing::debug!(filter = %key, "filter changed");
            self.filter = key;
            self.refresh_display(host, false);
        }
    }

    /// Tick or untick a vehicle in the side list. While anything is ticked
    /// only the ticked vehicles are shown. False if the vehicle is filtered
    /// out.
    pub fn set_checked(&mut self, id: &VehicleId, checked: bool, host: &mut dyn MapHost) -> bool {
        let found = self.filtered.set_selected(id, checked);
        if found {
            self.refresh_display(host, false);
        }
        found
    }

    pub fn select_vehicle(&mut self, id: Option<VehicleId>) {
        self.selected = id;
    }

    // -----------------------------------------------------------------------
    // Polling
    // -----------------------------------------------------------------------

    /// Start the poll timer. Ignored while live-tracking.
    pub fn start_polling(&mut self) {
        if matches!(self.mode, TrackingMode::Live { .. }) {
            return;
        }
        self.mode = TrackingMode::Polling;
        if self.poll_task.is_none() {
            self.poll_task = Some(self.sched.schedule(self.config.poll_interval_ms, Task::Poll));
        }
    }

    pub fn stop_polling(&mut self) {
        if let Some(h) = self.poll_task.take() {
            self.sched.cancel(h);
        }
        if self.mode == TrackingMode::Polling {
            self.mode = TrackingMode::Stopped;
        }
    }

    // -----------------------------------------------------------------------
    // Live
    // -----------------------------------------------------------------------

    /// Focus `vehicle`: stop polling and subscribe to its push stream.
    /// Calling it again (another vehicle, or the same one with a different
    /// snap option) cancels the running burst and starts over.
    pub fn start_live(
        &mut self,
        vehicle: &VehicleId,
        snap_to_road: bool,
        source: &mut dyn FleetDataSource,
        host: &mut dyn MapHost,
    ) -> Result<ChannelId> {
        if !self.markers.contains_key(vehicle) {
            return Err(EngineError::UnknownMarker(vehicle.clone()));
        }
        self.leave_live(source, host);
        self.stop_polling();

        let channel = match source.open_channel(vehicle, snap_to_road) {
            Ok(c) => c,
            Err(e) => {
                self.notifier
                    .error(format!("Could not start live tracking for {vehicle}: {e}"));
                self.start_polling();
                self.refresh_display(host, true);
                return Err(e.into());
            }
        };

        if let Some(marker) = self.markers.get_mut(vehicle) {
            marker.set_mode(MarkerMode::Live, &mut self.sched, host);
            marker.ignore_events = true;
            marker.draw_line = true;
        }
        self.mode = TrackingMode::Live {
            vehicle: vehicle.clone(),
            channel,
            snap_to_road,
        };
        self.selected = Some(vehicle.clone());
        self.refresh_display(host, true);
        tracing::info!(%vehicle, %channel, snap_to_road, "live tracking started");
        Ok(channel)
    }

    /// Leave live mode and go back to polling. No-op when not live.
    pub fn stop_live(&mut self, source: &mut dyn FleetDataSource, host: &mut dyn MapHost) {
        if let Some(vehicle) = self.leave_live(source, host) {
            tracing::info!(%vehicle, "live tracking stopped");
            self.start_polling();
            self.refresh_display(host, true);
        }
    }

    /// Cancel the burst, close the channel and put the focused marker back in
    /// overview. Returns the vehicle that was live.
    fn leave_live(
        &mut self,
        source: &mut dyn FleetDataSource,
        host: &mut dyn MapHost,
    ) -> Option<VehicleId> {
        if !matches!(self.mode, TrackingMode::Live { .. }) {
            return None;
        }
        let TrackingMode::Live { vehicle, channel, .. } =
            std::mem::replace(&mut self.mode, TrackingMode::Stopped)
        else {
            return None;
        };
        self.cancel_burst();
        source.close_channel(channel);
        if let Some(marker) = self.markers.get_mut(&vehicle) {
            marker.set_mode(MarkerMode::Overview, &mut self.sched, host);
            marker.ignore_events = false;
            marker.draw_line = false;
        }
        Some(vehicle)
    }

    fn cancel_burst(&mut self) {
        if let Some(h) = self.burst_task.take() {
            self.sched.cancel(h);
        }
        self.burst = None;
    }

    /// Play back a pushed batch. Batches for a channel that is no longer open
    /// are dropped; a new batch replaces the one still playing.
    pub fn on_push(&mut self, channel: ChannelId, batch: PushBatch, host: &mut dyn MapHost) -> Result<()> {
        let vehicle = match &self.mode {
            TrackingMode::Live {
                vehicle,
                channel: open,
                ..
            } if *open == channel => vehicle.clone(),
            _ => {
                tracing::debug!(%channel, "dropping batch from closed channel");
                return Ok(());
            }
        };
        if batch.vehicle_id != vehicle {
            tracing::warn!(%channel, expected = %vehicle, got = %batch.vehicle_id, "batch for wrong vehicle");
            return Ok(());
        }
        if batch.points.is_empty() {
            return Ok(());
        }

        self.cancel_burst();
        let n = batch.points.len();
        let window = batch
            .nominal_duration_ms
            .unwrap_or(self.config.burst_window_ms);
        let interval_ms = window / n as f64;
        tracing::debug!(%vehicle, points = n, interval_ms, "burst started");
        self.burst = Some(Burst {
            points: batch.points,
            next: 0,
            interval_ms,
        });
        self.burst_step(host)
    }

    /// Apply the next burst point and schedule the one after.
    fn burst_step(&mut self, host: &mut dyn MapHost) -> Result<()> {
        let Some(vehicle) = self.live_vehicle().cloned() else {
            self.burst = None;
            return Ok(());
        };
        let Some(burst) = self.burst.as_mut() else {
            return Ok(());
        };
        let Some(point) = burst.points.get(burst.next).cloned() else {
            self.burst = None;
            return Ok(());
        };
        burst.next += 1;
        let interval = burst.interval_ms;
        let more = burst.next < burst.points.len();

        let marker = self
            .markers
            .get_mut(&vehicle)
            .ok_or_else(|| EngineError::UnknownMarker(vehicle.clone()))?;
        let update = MarkerUpdate {
            position: point.position(),
            status: push_point_status(&point),
            overspeed: point.is_overspeed,
            trace_color: None,
        };
        marker.update_marker(update, interval, &mut self.sched, host);

        if let Some(snap) = self.snapshots.get_mut(&vehicle) {
            snap.lat = Some(point.lat);
            snap.lng = Some(point.lng);
            snap.timestamp = Some(point.timestamp);
            snap.speed = point.speed;
            snap.is_no_gps = point.is_no_gps;
            snap.halt_status = point.halt_status;
            snap.idling_status = point.idling_status;
            snap.is_overspeed = point.is_overspeed;
            snap.is_offline = false;
            self.statuses.insert(vehicle.clone(), classify(snap));
        }

        if more {
            self.burst_task = Some(self.sched.schedule(interval.round() as u64, Task::BurstStep));
        } else {
            self.burst = None;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// Run every task due up to `now`.
    pub fn advance(
        &mut self,
        now: u64,
        source: &mut dyn FleetDataSource,
        host: &mut dyn MapHost,
    ) -> Result<()> {
        while let Some((handle, task)) = self.sched.pop_due(now) {
            match task {
                Task::Frame(id) => {
                    let marker = self
                        .markers
                        .get_mut(&id)
                        .ok_or_else(|| EngineError::UnknownMarker(id.clone()))?;
                    marker.on_frame(handle, &mut self.sched, host);
                }
                Task::BurstStep => {
                    if self.burst_task == Some(handle) {
                        self.burst_task = None;
                        self.burst_step(host)?;
                    }
                }
                Task::Poll => {
                    self.poll_task = None;
                    if let Err(e) = self.poll_now(source, host) {
                        tracing::debug!(error = %e, "poll failed");
                    }
                    if self.mode == TrackingMode::Polling {
                        self.start_polling();
                    }
                }
                Task::ReplayTick => {
                    tracing::warn!("replay tick on the live scheduler ignored");
                }
            }
        }
        self.sched.advance_to(now);
        Ok(())
    }

    /// Close the channel, stop every timer and take all markers off the map.
    pub fn dispose(&mut self, source: &mut dyn FleetDataSource, host: &mut dyn MapHost) {
        self.leave_live(source, host);
        self.stop_polling();
        self.cluster.clear(&mut self.markers, host);
        for marker in self.markers.values_mut() {
            marker.remove(&mut self.sched, host);
        }
        self.markers.clear();
        self.snapshots.clear();
        self.statuses.clear();
        self.filtered = FilteredVehicleSet::default();
        self.selected = None;
        self.hidden = None;
        self.sched.clear();
        self.mode = TrackingMode::Stopped;
        tracing::debug!("live tracker disposed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
