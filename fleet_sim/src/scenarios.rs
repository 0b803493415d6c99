//! Scenario definitions.
//!
//! Each scenario is a named fleet around a map center. All scenarios are
//! deterministic given the same seed.

use crate::vehicle::{Behavior, SimVehicle};
use fleet_core::types::{LatLng, VehicleId};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const VEHICLE_TYPES: [&str; 5] = ["car", "truck", "van", "bus", "bike"];

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// 15 vehicles on city blocks, a few parked or idling
    City,
    /// 6 trucks on an intercity corridor, regularly over the speed limit
    Highway,
    /// One vehicle per status bucket
    MixedStatus,
    /// 2000 vehicles spread over a metro area
    Stress,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    /// Initial map center and zoom
    pub center: LatLng,
    pub zoom: f64,
    /// Suggested run length (ms)
    pub duration_ms: u64,
    /// Simulation step (ms)
    pub step_ms: u64,
    pub vehicles: Vec<SimVehicle>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::City => Self::city(seed),
            ScenarioKind::Highway => Self::highway(seed),
            ScenarioKind::MixedStatus => Self::mixed_status(seed),
            ScenarioKind::Stress => Self::stress(seed),
        }
    }

    pub fn vehicle(&self, id: &VehicleId) -> Option<&SimVehicle> {
        self.vehicles.iter().find(|v| &v.id == id)
    }

    /// First vehicle that drives a route, the natural pick for live tracking.
    pub fn first_mover(&self) -> Option<&VehicleId> {
        self.vehicles
            .iter()
            .find(|v| matches!(v.behavior, Behavior::Route { .. }))
            .map(|v| &v.id)
    }

    // -----------------------------------------------------------------------
    // City: block loops in a grid
    // -----------------------------------------------------------------------
    fn city(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let center = LatLng::new(12.9716, 77.5946);
        const BLOCK: f64 = 0.004;

        let mut vehicles = Vec::new();
        for i in 0..12u64 {
            let origin = LatLng::new(
                center.lat + BLOCK * rng.gen_range(-4..4) as f64,
                center.lng + BLOCK * rng.gen_range(-4..4) as f64,
            );
            let w = BLOCK * rng.gen_range(1..=3) as f64;
            let h = BLOCK * rng.gen_range(1..=3) as f64;
            vehicles.push(SimVehicle::new(
                format!("city-{i:02}"),
                VEHICLE_TYPES[i as usize % VEHICLE_TYPES.len()],
                origin,
                Behavior::Route {
                    waypoints: loop_route(origin, w, h),
                    cruise_kmph: rng.gen_range(20.0..45.0),
                },
                seed.wrapping_add(i + 1),
            ));
        }
        for (i, behavior) in [Behavior::Parked, Behavior::Parked, Behavior::Idling]
            .into_iter()
            .enumerate()
        {
            let i = 12 + i as u64;
            let pos = LatLng::new(
                center.lat + rng.gen_range(-0.01..0.01),
                center.lng + rng.gen_range(-0.01..0.01),
            );
            vehicles.push(SimVehicle::new(
                format!("city-{i:02}"),
                "car",
                pos,
                behavior,
                seed.wrapping_add(i + 1),
            ));
        }

        Self {
            name: "city".into(),
            seed,
            center,
            zoom: 14.0,
            duration_ms: 300_000,
            step_ms: 1_000,
            vehicles,
        }
    }

    // -----------------------------------------------------------------------
    // Highway: trucks shuttling along a corridor
    // -----------------------------------------------------------------------
    fn highway(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let start = LatLng::new(12.9716, 77.5946);
        // gently curving corridor heading north-east, out and back
        let mut corridor: Vec<LatLng> = (0..=20)
            .map(|k| {
                let k = k as f64;
                LatLng::new(
                    start.lat + 0.03 * k + 0.01 * (k / 3.0).sin(),
                    start.lng + 0.04 * k,
                )
            })
            .collect();
        let back: Vec<LatLng> = corridor.iter().rev().skip(1).copied().collect();
        corridor.extend(back);

        let vehicles = (0..6u64)
            .map(|i| {
                let from = rng.gen_range(0..corridor.len());
                let mut waypoints = corridor[from..].to_vec();
                waypoints.extend_from_slice(&corridor[..from]);
                SimVehicle::new(
                    format!("hwy-{i:02}"),
                    "truck",
                    waypoints[0],
                    Behavior::Route {
                        waypoints,
                        cruise_kmph: rng.gen_range(70.0..95.0),
                    },
                    seed.wrapping_add(i + 1),
                )
            })
            .collect();

        Self {
            name: "highway".into(),
            seed,
            center: LatLng::new(start.lat + 0.3, start.lng + 0.4),
            zoom: 10.0,
            duration_ms: 600_000,
            step_ms: 1_000,
            vehicles,
        }
    }

    // -----------------------------------------------------------------------
    // Mixed status: one vehicle per bucket
    // -----------------------------------------------------------------------
    fn mixed_status(seed: u64) -> Self {
        let center = LatLng::new(28.6139, 77.2090);
        let at = |k: f64| LatLng::new(center.lat + 0.003 * k, center.lng - 0.002 * k);
        let running = Behavior::Route {
            waypoints: loop_route(center, 0.006, 0.004),
            cruise_kmph: 35.0,
        };
        let vehicles = vec![
            SimVehicle::new("mix-running", "car", center, running, seed.wrapping_add(1)),
            SimVehicle::new("mix-idle", "van", at(1.0), Behavior::Idling, seed.wrapping_add(2)),
            SimVehicle::new("mix-halt", "truck", at(2.0), Behavior::Parked, seed.wrapping_add(3)),
            SimVehicle::new("mix-nogps", "bus", at(3.0), Behavior::NoGps, seed.wrapping_add(4)),
            SimVehicle::new("mix-offline", "car", at(4.0), Behavior::Offline, seed.wrapping_add(5)),
            SimVehicle::new("mix-dead", "bike", at(5.0), Behavior::DeadBattery, seed.wrapping_add(6)),
            SimVehicle::new("mix-nodata", "van", at(6.0), Behavior::NeverReported, seed.wrapping_add(7)),
        ];

        Self {
            name: "mixed-status".into(),
            seed,
            center,
            zoom: 15.0,
            duration_ms: 120_000,
            step_ms: 1_000,
            vehicles,
        }
    }

    // -----------------------------------------------------------------------
    // Stress: a large fleet over a metro area
    // -----------------------------------------------------------------------
    fn stress(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let center = LatLng::new(19.0760, 72.8777);

        let vehicles = (0..2000u64)
            .map(|i| {
                let origin = LatLng::new(
                    center.lat + rng.gen_range(-0.2..0.2),
                    center.lng + rng.gen_range(-0.2..0.2),
                );
                let roll: f64 = rng.gen();
                let behavior = if roll < 0.6 {
                    Behavior::Route {
                        waypoints: loop_route(
                            origin,
                            rng.gen_range(0.005..0.03),
                            rng.gen_range(0.005..0.03),
                        ),
                        cruise_kmph: rng.gen_range(15.0..90.0),
                    }
                } else if roll < 0.75 {
                    Behavior::Parked
                } else if roll < 0.85 {
                    Behavior::Idling
                } else if roll < 0.9 {
                    Behavior::NoGps
                } else if roll < 0.96 {
                    Behavior::Offline
                } else if roll < 0.98 {
                    Behavior::DeadBattery
                } else {
                    Behavior::NeverReported
                };
                SimVehicle::new(
                    format!("stress-{i:04}"),
                    VEHICLE_TYPES[i as usize % VEHICLE_TYPES.len()],
                    origin,
                    behavior,
                    seed.wrapping_add(i + 1),
                )
            })
            .collect();

        Self {
            name: "stress".into(),
            seed,
            center,
            zoom: 11.0,
            duration_ms: 120_000,
            step_ms: 2_000,
            vehicles,
        }
    }
}

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

/// Clockwise rectangle of `w` by `h` degrees starting at `origin`.
fn loop_route(origin: LatLng, w: f64, h: f64) -> Vec<LatLng> {
    vec![
        origin,
        LatLng::new(origin.lat, origin.lng + w),
        LatLng::new(origin.lat - h, origin.lng + w),
        LatLng::new(origin.lat - h, origin.lng),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::classify::{classify, VehicleStatus};
    use std::collections::HashSet;

    #[test]
    fn scenarios_are_deterministic() {
        for kind in [ScenarioKind::City, ScenarioKind::Highway, ScenarioKind::Stress] {
            let a = Scenario::build(kind, 42);
            let b = Scenario::build(kind, 42);
            assert_eq!(a.vehicles.len(), b.vehicles.len());
            for (va, vb) in a.vehicles.iter().zip(&b.vehicles) {
                assert_eq!(va.id, vb.id);
                assert_eq!(va.position, vb.position);
                assert_eq!(va.behavior, vb.behavior);
            }
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = Scenario::build(ScenarioKind::City, 1);
        let b = Scenario::build(ScenarioKind::City, 2);
        assert!(a
            .vehicles
            .iter()
            .zip(&b.vehicles)
            .any(|(x, y)| x.position != y.position));
    }

    #[test]
    fn mixed_status_covers_every_bucket() {
        let s = Scenario::build(ScenarioKind::MixedStatus, 0);
        let statuses: HashSet<VehicleStatus> = s
            .vehicles
            .iter()
            .map(|v| classify(&v.snapshot((0.0, 0.0), 80.0)))
            .collect();
        assert_eq!(statuses.len(), 7);
        assert!(statuses.contains(&VehicleStatus::Dead));
        assert!(statuses.contains(&VehicleStatus::NoData));
    }

    #[test]
    fn first_mover_drives_a_route() {
        let s = Scenario::build(ScenarioKind::MixedStatus, 0);
        assert_eq!(s.first_mover(), Some(&VehicleId::new("mix-running")));
    }

    #[test]
    fn stress_is_large() {
        let s = Scenario::build(ScenarioKind::Stress, 7);
        assert_eq!(s.vehicles.len(), 2000);
    }
}
