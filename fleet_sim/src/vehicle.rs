//! Simulated vehicles and their motion.
//!
//! Each vehicle has a true position and a [`Behavior`] describing what its
//! telematics unit reports. Route followers drive a waypoint loop with a
//! traffic-dependent speed and the occasional hard brake, and record every
//! step into a bounded history that backs replay queries.

use fleet_core::geo::{haversine_m, lerp};
use fleet_core::types::{LatLng, PushPoint, ReplayPoint, VehicleId, VehicleSnapshot};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Speed change per second that counts as harsh acceleration or braking (km/h/s).
const HARSH_KMPH_PER_S: f64 = 7.0;
/// Normal acceleration limit (km/h/s).
const MAX_ACCEL: f64 = 10.0;
/// Chance per step of a sudden brake.
const BRAKE_PROBABILITY: f64 = 0.01;
/// Recorded points kept per vehicle.
const HISTORY_CAP: usize = 50_000;

/// What the vehicle does and reports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Behavior {
    /// Drive the waypoint loop around a cruise speed
    Route { waypoints: Vec<LatLng>, cruise_kmph: f64 },
    /// Engine off, reporting
    Parked,
    /// Engine on, not moving
    Idling,
    /// Reporting but without a GPS fix
    NoGps,
    /// Unit offline, main battery connected
    Offline,
    /// Unit offline and running on its backup battery
    DeadBattery,
    /// Registered but never reported
    NeverReported,
}

impl Behavior {
    /// True if the unit sends data at all.
    pub fn reports(&self) -> bool {
        !matches!(
            self,
            Behavior::Offline | Behavior::DeadBattery | Behavior::NeverReported
        )
    }
}

/// A simulated vehicle with ground-truth state.
#[derive(Clone, Debug)]
pub struct SimVehicle {
    pub id: VehicleId,
    pub vehicle_type: String,
    pub model: String,
    /// True position
    pub position: LatLng,
    pub speed_kmph: f64,
    pub behavior: Behavior,
    /// Last fix time, `None` if never reported
    pub last_report_ms: Option<i64>,
    next_waypoint: usize,
    /// Offsets the traffic wave so vehicles do not move in lockstep
    phase: f64,
    harsh_accel: bool,
    harsh_brake: bool,
    history: VecDeque<ReplayPoint>,
    rng: ChaCha8Rng,
}

impl SimVehicle {
    pub fn new(
        id: impl Into<String>,
        vehicle_type: &str,
        position: LatLng,
        behavior: Behavior,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let phase = rng.gen::<f64>() * std::f64::consts::TAU;
        let id: String = id.into();
        Self {
            model: format!("{} {}", vehicle_type.to_uppercase(), 100 + seed % 900),
            id: VehicleId::new(id),
            vehicle_type: vehicle_type.to_owned(),
            position,
            speed_kmph: 0.0,
            // stale units reported once, a day before the run
            last_report_ms: match behavior {
                Behavior::NeverReported => None,
                Behavior::Offline | Behavior::DeadBattery => Some(-86_400_000),
                _ => Some(0),
            },
            behavior,
            next_waypoint: 0,
            phase,
            harsh_accel: false,
            harsh_brake: false,
            history: VecDeque::new(),
            rng,
        }
    }

    /// Recorded points, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ReplayPoint> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Advance the true state by `dt_s` seconds, ending at `t_ms`.
    pub fn step(&mut self, t_ms: i64, dt_s: f64) {
        if !self.behavior.reports() || dt_s <= 0.0 {
            return;
        }
        self.harsh_accel = false;
        self.harsh_brake = false;

        if let Behavior::Route {
            waypoints,
            cruise_kmph,
        } = &self.behavior
        {
            let t_s = t_ms as f64 / 1000.0;
            let target = (cruise_kmph * (0.8 + 0.25 * (t_s / 45.0 + self.phase).sin())).max(0.0);
            let prev = self.speed_kmph;
            self.speed_kmph = if self.rng.gen::<f64>() < BRAKE_PROBABILITY {
                prev * 0.3
            } else {
                prev + (target - prev).clamp(-MAX_ACCEL * dt_s, MAX_ACCEL * dt_s)
            };
            let rate = (self.speed_kmph - prev) / dt_s;
            self.harsh_accel = rate > HARSH_KMPH_PER_S;
            self.harsh_brake = rate < -HARSH_KMPH_PER_S;

            let (position, next) = advance_along(
                waypoints,
                self.position,
                self.next_waypoint,
                self.speed_kmph / 3.6 * dt_s,
            );
            self.position = position;
            self.next_waypoint = next;
        } else {
            self.speed_kmph = 0.0;
        }

        self.last_report_ms = Some(t_ms);
        self.record(t_ms);
    }

    fn record(&mut self, t_ms: i64) {
        self.history.push_back(ReplayPoint {
            lat: self.position.lat,
            lng: self.position.lng,
            timestamp: t_ms,
            speed: self.speed_kmph,
            address: None,
            is_ha: self.harsh_accel.then_some(true),
            is_hb: self.harsh_brake.then_some(true),
        });
        if self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }
    }

    /// Latest state as the snapshot query reports it, offset by `jitter`
    /// degrees of GPS noise.
    pub fn snapshot(&self, jitter: (f64, f64), overspeed_kmph: f64) -> VehicleSnapshot {
        let located = self.last_report_ms.is_some() && self.behavior != Behavior::NeverReported;
        VehicleSnapshot {
            id: self.id.clone(),
            lat: located.then_some(self.position.lat + jitter.0),
            lng: located.then_some(self.position.lng + jitter.1),
            speed: self.speed_kmph,
            timestamp: self.last_report_ms,
            is_offline: matches!(self.behavior, Behavior::Offline | Behavior::DeadBattery),
            is_no_gps: self.behavior == Behavior::NoGps,
            halt_status: self.behavior == Behavior::Parked,
            idling_status: self.behavior == Behavior::Idling,
            is_overspeed: self.speed_kmph > overspeed_kmph,
            is_primary_battery: self.behavior != Behavior::DeadBattery,
            vehicle_type: Some(self.vehicle_type.clone()),
            model: Some(self.model.clone()),
            address: Some(format!("{:.4}, {:.4}", self.position.lat, self.position.lng)),
            battery_voltage: Some(if self.behavior == Behavior::DeadBattery {
                3.7
            } else {
                12.6
            }),
        }
    }

    /// Current fix for a push channel. `None` for silent units.
    pub fn push_point(&self, jitter: (f64, f64), overspeed_kmph: f64) -> Option<PushPoint> {
        let ts = self.last_report_ms?;
        self.behavior.reports().then(|| PushPoint {
            lat: self.position.lat + jitter.0,
            lng: self.position.lng + jitter.1,
            timestamp: ts,
            speed: self.speed_kmph,
            is_no_gps: self.behavior == Behavior::NoGps,
            halt_status: self.behavior == Behavior::Parked,
            idling_status: self.behavior == Behavior::Idling,
            is_overspeed: self.speed_kmph > overspeed_kmph,
        })
    }
}

/// Move `budget_m` metres from `from` along the waypoint loop starting at
/// waypoint `next`. Returns the new position and next waypoint index.
fn advance_along(waypoints: &[LatLng], from: LatLng, next: usize, budget_m: f64) -> (LatLng, usize) {
    if waypoints.is_empty() {
        return (from, next);
    }
    let mut pos = from;
    let mut next = next % waypoints.len();
    let mut budget = budget_m;
    // one full lap at most per step
    for _ in 0..=waypoints.len() {
        if budget <= 0.0 {
            break;
        }
        let wp = waypoints[next];
        let d = haversine_m(pos, wp);
        if d <= budget {
            pos = wp;
            budget -= d;
            next = (next + 1) % waypoints.len();
        } else {
            pos = lerp(pos, wp, budget / d);
            budget = 0.0;
        }
    }
    (pos, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square() -> Vec<LatLng> {
        vec![
            LatLng::new(12.97, 77.59),
            LatLng::new(12.97, 77.60),
            LatLng::new(12.98, 77.60),
            LatLng::new(12.98, 77.59),
        ]
    }

    #[test]
    fn route_vehicle_moves_and_records() {
        let mut v = SimVehicle::new(
            "r1",
            "car",
            square()[0],
            Behavior::Route {
                waypoints: square(),
                cruise_kmph: 40.0,
            },
            7,
        );
        for i in 1..=60 {
            v.step(i * 1000, 1.0);
        }
        assert_ne!(v.position, square()[0]);
        assert_eq!(v.history_len(), 60);
        assert!(v.speed_kmph > 0.0);
        let ts: Vec<i64> = v.history().map(|p| p.timestamp).collect();
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn advance_wraps_around_the_loop() {
        let wps = square();
        let side = haversine_m(wps[0], wps[1]);
        let (pos, next) = advance_along(&wps, wps[0], 1, side * 1.5);
        assert_eq!(next, 2);
        assert_abs_diff_eq!(pos.lng, 77.60, epsilon = 1e-9);
        assert!(pos.lat > 12.97 && pos.lat < 12.98);
    }

    #[test]
    fn silent_units_do_not_record() {
        let mut v = SimVehicle::new("o", "truck", square()[0], Behavior::Offline, 1);
        v.step(1000, 1.0);
        assert_eq!(v.history_len(), 0);
        assert!(v.push_point((0.0, 0.0), 80.0).is_none());
        let snap = v.snapshot((0.0, 0.0), 80.0);
        assert!(snap.is_offline);
        assert!(snap.is_primary_battery);
    }

    #[test]
    fn never_reported_has_no_position() {
        let v = SimVehicle::new("n", "van", square()[0], Behavior::NeverReported, 1);
        let snap = v.snapshot((0.0, 0.0), 80.0);
        assert!(snap.position().is_none());
        assert!(snap.timestamp.is_none());
    }

    #[test]
    fn same_seed_same_trajectory() {
        let make = || {
            SimVehicle::new(
                "r",
                "car",
                square()[0],
                Behavior::Route {
                    waypoints: square(),
                    cruise_kmph: 50.0,
                },
                99,
            )
        };
        let (mut a, mut b) = (make(), make());
        for i in 1..=300 {
            a.step(i * 1000, 1.0);
            b.step(i * 1000, 1.0);
        }
        assert_eq!(a.position, b.position);
        assert_eq!(a.speed_kmph, b.speed_kmph);
    }
}
