//! Vehicle status classification and per-bucket statistics.

use crate::icons::MarkerStatus;
use crate::types::{PushPoint, VehicleSnapshot};
use serde::{Deserialize, Serialize};

/// Classified status of a vehicle, used for filtering and statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleStatus {
    Running,
    Idle,
    Halt,
    NoGps,
    Offline,
    /// Offline and running on backup battery
    Dead,
    /// Never reported, or reported without a usable position
    NoData,
}

impl VehicleStatus {
    /// Offline, dead and no-data vehicles are not tracking.
    pub fn is_tracking(&self) -> bool {
        !matches!(
            self,
            VehicleStatus::Offline | VehicleStatus::Dead | VehicleStatus::NoData
        )
    }

    pub fn marker_status(&self) -> MarkerStatus {
        match self {
            VehicleStatus::Running => MarkerStatus::Running,
            VehicleStatus::Idle => MarkerStatus::Idle,
            VehicleStatus::Halt => MarkerStatus::Halt,
            VehicleStatus::NoGps => MarkerStatus::NoGps,
            VehicleStatus::Offline | VehicleStatus::Dead => MarkerStatus::Offline,
            VehicleStatus::NoData => MarkerStatus::Default,
        }
    }
}

/// Classify a snapshot. The first matching rule wins.
pub fn classify(s: &VehicleSnapshot) -> VehicleStatus {
    if s.is_offline {
        if s.is_primary_battery {
            VehicleStatus::Offline
        } else {
            VehicleStatus::Dead
        }
    } else if s.timestamp.is_none() || s.position().is_none() {
        VehicleStatus::NoData
    } else if s.is_no_gps {
        VehicleStatus::NoGps
    } else if s.halt_status {
        VehicleStatus::Halt
    } else if s.idling_status {
        VehicleStatus::Idle
    } else {
        VehicleStatus::Running
    }
}

/// Icon status for a point arriving on the push channel. Pushed points always
/// come from a live device, so they can never be offline.
pub fn push_point_status(p: &PushPoint) -> MarkerStatus {
    if p.is_no_gps {
        MarkerStatus::NoGps
    } else if p.halt_status {
        MarkerStatus::Halt
    } else if p.idling_status {
        MarkerStatus::Idle
    } else {
        MarkerStatus::Running
    }
}

/// Vehicle counts per status bucket, as shown on the stat cards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: usize,
    pub tracking: usize,
    pub non_tracking: usize,
    pub running: usize,
    pub idle: usize,
    pub halt: usize,
    pub nogps: usize,
    pub offline: usize,
    pub dead: usize,
    pub nodata: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: VehicleStatus) {
        self.total += 1;
        if status.is_tracking() {
            self.tracking += 1;
        } else {
            self.non_tracking += 1;
        }
        match status {
            VehicleStatus::Running => self.running += 1,
            VehicleStatus::Idle => self.idle += 1,
            VehicleStatus::Halt => self.halt += 1,
            VehicleStatus::NoGps => self.nogps += 1,
            VehicleStatus::Offline => self.offline += 1,
            VehicleStatus::Dead => self.dead += 1,
            VehicleStatus::NoData => self.nodata += 1,
        }
    }

    pub fn from_statuses(statuses: impl IntoIterator<Item = VehicleStatus>) -> Self {
        let mut counts = Self::default();
        for s in statuses {
            counts.add(s);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LatLng;

    fn running() -> VehicleSnapshot {
        VehicleSnapshot::new("v", LatLng::new(12.97, 77.59), 100)
    }

    #[test]
    fn dead_battery_wins_over_everything() {
        let s = VehicleSnapshot {
            is_offline: true,
            is_primary_battery: false,
            is_no_gps: true,
            halt_status: true,
            idling_status: true,
            timestamp: None,
            ..running()
        };
        assert_eq!(classify(&s), VehicleStatus::Dead);
    }

    #[test]
    fn offline_on_primary_battery() {
        let s = VehicleSnapshot {
            is_offline: true,
            ..running()
        };
        assert_eq!(classify(&s), VehicleStatus::Offline);
        assert!(!classify(&s).is_tracking());
    }

    #[test]
    fn missing_timestamp_or_position_is_nodata() {
        let no_ts = VehicleSnapshot {
            timestamp: None,
            is_no_gps: true,
            ..running()
        };
        assert_eq!(classify(&no_ts), VehicleStatus::NoData);
        let no_pos = VehicleSnapshot {
            lat: None,
            ..running()
        };
        assert_eq!(classify(&no_pos), VehicleStatus::NoData);
    }

    #[test]
    fn precedence_nogps_halt_idle() {
        let s = VehicleSnapshot {
            is_no_gps: true,
            halt_status: true,
            idling_status: true,
            ..running()
        };
        assert_eq!(classify(&s), VehicleStatus::NoGps);
        let s = VehicleSnapshot {
            halt_status: true,
            idling_status: true,
            ..running()
        };
        assert_eq!(classify(&s), VehicleStatus::Halt);
        let s = VehicleSnapshot {
            idling_status: true,
            ..running()
        };
        assert_eq!(classify(&s), VehicleStatus::Idle);
        assert_eq!(classify(&running()), VehicleStatus::Running);
    }

    #[test]
    fn counts_split_tracking() {
        let c = StatusCounts::from_statuses([
            VehicleStatus::Running,
            VehicleStatus::Idle,
            VehicleStatus::Dead,
            VehicleStatus::NoData,
        ]);
        assert_eq!(c.total, 4);
        assert_eq!(c.tracking, 2);
        assert_eq!(c.non_tracking, 2);
        assert_eq!(c.dead, 1);
    }
}
