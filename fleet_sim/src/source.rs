//! Simulated data source backed by a [`Scenario`].
//!
//! Time is driven explicitly with [`SimulatedSource::advance_to`]; nothing
//! moves on its own. Each step moves every vehicle in parallel, then feeds
//! open push channels. A channel collects one point per step and releases
//! them as one batch per burst window.

use crate::log::SnapshotFrame;
use crate::scenarios::Scenario;
use fleet_core::error::SourceError;
use fleet_core::geo::haversine_m;
use fleet_core::source::FleetDataSource;
use fleet_core::types::{
    ChannelId, HistoryRequest, HistoryResponse, PushBatch, PushPoint, VehicleId, VehicleSnapshot,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Source tuning.
#[derive(Clone, Debug)]
pub struct SimSourceConfig {
    /// Span of one push batch (ms)
    pub burst_window_ms: u64,
    /// GPS noise amplitude in degrees; keep it under the significance threshold
    pub jitter_deg: f64,
    pub overspeed_kmph: f64,
}

impl Default for SimSourceConfig {
    fn default() -> Self {
        Self {
            burst_window_ms: 10_000,
            jitter_deg: 0.00002,
            overspeed_kmph: 80.0,
        }
    }
}

#[derive(Debug)]
struct PushChannel {
    vehicle: VehicleId,
    snap_to_road: bool,
    window_start_ms: u64,
    collecting: Vec<PushPoint>,
    ready: Vec<PushBatch>,
}

pub struct SimulatedSource {
    scenario: Scenario,
    config: SimSourceConfig,
    clock_ms: u64,
    rng: ChaCha8Rng,
    channels: BTreeMap<ChannelId, PushChannel>,
    next_channel: u64,
    fail_next: Option<SourceError>,
    recording: Option<Vec<SnapshotFrame>>,
}

impl SimulatedSource {
    pub fn new(scenario: Scenario, config: SimSourceConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(scenario.seed.wrapping_add(1000));
        Self {
            scenario,
            config,
            clock_ms: 0,
            rng,
            channels: BTreeMap::new(),
            next_channel: 0,
            fail_next: None,
            recording: None,
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn config(&self) -> &SimSourceConfig {
        &self.config
    }

    /// Simulated time (ms).
    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    pub fn open_channels(&self) -> usize {
        self.channels.len()
    }

    /// Make the next fallible call fail with `err`.
    pub fn inject_failure(&mut self, err: SourceError) {
        self.fail_next = Some(err);
    }

    /// Start keeping every snapshot batch handed out.
    pub fn start_recording(&mut self) {
        self.recording = Some(Vec::new());
    }

    /// Frames recorded since [`start_recording`](Self::start_recording).
    pub fn take_recording(&mut self) -> Vec<SnapshotFrame> {
        self.recording.take().unwrap_or_default()
    }

    /// Step the fleet in whole simulation steps up to `now_ms`.
    pub fn advance_to(&mut self, now_ms: u64) {
        let step = self.scenario.step_ms.max(1);
        let dt_s = step as f64 / 1000.0;
        while self.clock_ms + step <= now_ms {
            self.clock_ms += step;
            let t = self.clock_ms as i64;
            self.scenario
                .vehicles
                .par_iter_mut()
                .for_each(|v| v.step(t, dt_s));
            self.feed_channels();
        }
    }

    fn feed_channels(&mut self) {
        let Self {
            scenario,
            config,
            clock_ms,
            rng,
            channels,
            ..
        } = self;
        for ch in channels.values_mut() {
            let Some(v) = scenario.vehicles.iter().find(|v| v.id == ch.vehicle) else {
                continue;
            };
            let noise = if ch.snap_to_road {
                (0.0, 0.0)
            } else {
                jitter(rng, config.jitter_deg)
            };
            if let Some(p) = v.push_point(noise, config.overspeed_kmph) {
                ch.collecting.push(p);
            }
            if *clock_ms - ch.window_start_ms >= config.burst_window_ms {
                if !ch.collecting.is_empty() {
                    ch.ready.push(PushBatch {
                        vehicle_id: ch.vehicle.clone(),
                        points: std::mem::take(&mut ch.collecting),
                        nominal_duration_ms: Some(config.burst_window_ms as f64),
                    });
                }
                ch.window_start_ms = *clock_ms;
            }
        }
    }
}

fn jitter(rng: &mut ChaCha8Rng, amplitude: f64) -> (f64, f64) {
    if amplitude <= 0.0 {
        return (0.0, 0.0);
    }
    (
        rng.gen_range(-amplitude..amplitude),
        rng.gen_range(-amplitude..amplitude),
    )
}

impl FleetDataSource for SimulatedSource {
    fn fetch_snapshots(&mut self) -> Result<Vec<VehicleSnapshot>, SourceError> {
        if let Some(e) = self.fail_next.take() {
            return Err(e);
        }
        let amplitude = self.config.jitter_deg;
        let overspeed = self.config.overspeed_kmph;
        let snapshots: Vec<VehicleSnapshot> = self
            .scenario
            .vehicles
            .iter()
            .map(|v| v.snapshot(jitter(&mut self.rng, amplitude), overspeed))
            .collect();
        if let Some(frames) = self.recording.as_mut() {
            frames.push(SnapshotFrame {
                time_ms: self.clock_ms,
                snapshots: snapshots.clone(),
            });
        }
        Ok(snapshots)
    }

    fn open_channel(&mut self, vehicle: &VehicleId, snap_to_road: bool) -> Result<ChannelId, SourceError> {
        if let Some(e) = self.fail_next.take() {
            return Err(e);
        }
        if self.scenario.vehicle(vehicle).is_none() {
            return Err(SourceError::UnknownVehicle(vehicle.clone()));
        }
        self.next_channel += 1;
        let id = ChannelId(self.next_channel);
        self.channels.insert(
            id,
            PushChannel {
                vehicle: vehicle.clone(),
                snap_to_road,
                window_start_ms: self.clock_ms,
                collecting: Vec::new(),
                ready: Vec::new(),
            },
        );
        tracing::debug!(%vehicle, %id, snap_to_road, "push channel opened");
        Ok(id)
    }

    fn close_channel(&mut self, channel: ChannelId) {
        if self.channels.remove(&channel).is_some() {
            tracing::debug!(%channel, "push channel closed");
        }
    }

    fn take_pushed(&mut self, channel: ChannelId) -> Vec<PushBatch> {
        self.channels
            .get_mut(&channel)
            .map(|ch| std::mem::take(&mut ch.ready))
            .unwrap_or_default()
    }

    fn fetch_history(&mut self, request: &HistoryRequest) -> Result<HistoryResponse, SourceError> {
        if let Some(e) = self.fail_next.take() {
            return Err(e);
        }
        let vehicle = self
            .scenario
            .vehicle(&request.vehicle_id)
            .ok_or_else(|| SourceError::UnknownVehicle(request.vehicle_id.clone()))?;
        let mut points: Vec<_> = vehicle
            .history()
            .filter(|p| p.timestamp >= request.from_ts && p.timestamp <= request.to_ts)
            .cloned()
            .collect();
        if !request.snap_to_road {
            for p in &mut points {
                let (dlat, dlng) = jitter(&mut self.rng, self.config.jitter_deg);
                p.lat += dlat;
                p.lng += dlng;
            }
        }
        let distance_m: f64 = points
            .windows(2)
            .map(|w| haversine_m(w[0].position(), w[1].position()))
            .sum();
        Ok(HistoryResponse {
            points,
            distance_travelled_km: distance_m / 1000.0,
        })
    }
}
