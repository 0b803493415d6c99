//! Marker icon lookup: status -> icon key, vehicle type -> icon set.

use serde::{Deserialize, Serialize};

/// Status shown by a marker icon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerStatus {
    Running,
    Idle,
    Halt,
    NoGps,
    Offline,
    #[default]
    Default,
}

impl MarkerStatus {
    pub fn icon_key(&self) -> &'static str {
        match self {
            MarkerStatus::Running => "running",
            MarkerStatus::Idle => "idle",
            MarkerStatus::Halt => "halt",
            MarkerStatus::NoGps => "nogps",
            MarkerStatus::Offline => "offline",
            MarkerStatus::Default => "default",
        }
    }
}

/// A family of icons drawn for one kind of vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IconSet {
    pub name: &'static str,
    /// Square artwork (1:1) instead of the usual 2:1 top-down silhouette
    pub square: bool,
}

impl IconSet {
    /// Asset name for `status`, e.g. `truck-running`.
    pub fn icon_name(&self, status: MarkerStatus) -> String {
        format!("{}-{}", self.name, status.icon_key())
    }
}

pub const DEFAULT_ICON_SET: IconSet = IconSet {
    name: "car",
    square: false,
};

const ICON_SETS: [IconSet; 7] = [
    DEFAULT_ICON_SET,
    IconSet { name: "truck", square: false },
    IconSet { name: "bus", square: false },
    IconSet { name: "van", square: false },
    IconSet { name: "ambulance", square: false },
    IconSet { name: "bike", square: true },
    IconSet { name: "tractor", square: true },
];

/// Icon set for a vehicle type (case-insensitive), or the default set.
pub fn icon_set_for(vehicle_type: Option<&str>) -> IconSet {
    vehicle_type
        .and_then(|t| {
            let t = t.trim();
            ICON_SETS.iter().find(|s| s.name.eq_ignore_ascii_case(t))
        })
        .copied()
        .unwrap_or(DEFAULT_ICON_SET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_match_ignores_case() {
        assert_eq!(icon_set_for(Some("TRUCK")).name, "truck");
        assert_eq!(icon_set_for(Some(" Bike ")).name, "bike");
        assert!(icon_set_for(Some("bike")).square);
    }

    #[test]
    fn unknown_type_falls_back() {
        assert_eq!(icon_set_for(Some("hovercraft")), DEFAULT_ICON_SET);
        assert_eq!(icon_set_for(None), DEFAULT_ICON_SET);
    }

    #[test]
    fn icon_names() {
        let set = icon_set_for(Some("bus"));
        assert_eq!(set.icon_name(MarkerStatus::NoGps), "bus-nogps");
        assert_eq!(set.icon_name(MarkerStatus::Default), "bus-default");
    }
}
