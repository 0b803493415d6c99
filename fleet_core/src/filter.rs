//! Status filter keys and the filtered vehicle set behind the side list.

use crate::classify::VehicleStatus;
use crate::types::{VehicleId, VehicleSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKey {
    #[default]
    #[serde(rename = "ALL")]
    All,
    #[serde(rename = "TRACKING")]
    Tracking,
    #[serde(rename = "NON_TRACKING")]
    NonTracking,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "HALT")]
    Halt,
    #[serde(rename = "NOGPS")]
    NoGps,
    #[serde(rename = "OFFLINE")]
    Offline,
    #[serde(rename = "DEAD")]
    Dead,
    #[serde(rename = "NODATA")]
    NoData,
}

impl FilterKey {
    pub const ALL_KEYS: [FilterKey; 10] = [
        FilterKey::All,
        FilterKey::Tracking,
        FilterKey::NonTracking,
        FilterKey::Running,
        FilterKey::Idle,
        FilterKey::Halt,
        FilterKey::NoGps,
        FilterKey::Offline,
        FilterKey::Dead,
        FilterKey::NoData,
    ];

    pub fn matches(&self, status: VehicleStatus) -> bool {
        match self {
            FilterKey::All => true,
            FilterKey::Tracking => status.is_tracking(),
            FilterKey::NonTracking => !status.is_tracking(),
            FilterKey::Running => status == VehicleStatus::Running,
            FilterKey::Idle => status == VehicleStatus::Idle,
            FilterKey::Halt => status == VehicleStatus::Halt,
            FilterKey::NoGps => status == VehicleStatus::NoGps,
            FilterKey::Offline => status == VehicleStatus::Offline,
            FilterKey::Dead => status == VehicleStatus::Dead,
            FilterKey::NoData => status == VehicleStatus::NoData,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKey::All => "ALL",
            FilterKey::Tracking => "TRACKING",
            FilterKey::NonTracking => "NON_TRACKING",
            FilterKey::Running => "RUNNING",
            FilterKey::Idle => "IDLE",
            FilterKey::Halt => "HALT",
            FilterKey::NoGps => "NOGPS",
            FilterKey::Offline => "OFFLINE",
            FilterKey::Dead => "DEAD",
            FilterKey::NoData => "NODATA",
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        FilterKey::ALL_KEYS
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("unknown filter key '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Filtered set
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct FilteredEntry {
    pub snapshot: VehicleSnapshot,
    pub status: VehicleStatus,
    /// Checkbox state in the side list
    pub is_selected: bool,
}

/// Vehicles passing the active filter, keyed by id.
#[derive(Clone, Debug, Default)]
pub struct FilteredVehicleSet {
    entries: BTreeMap<VehicleId, FilteredEntry>,
}

impl FilteredVehicleSet {
    /// Rebuild from the latest snapshots. Checkbox state survives for ids that
    /// are still in the set.
    pub fn recompute(
        &mut self,
        snapshots: &BTreeMap<VehicleId, VehicleSnapshot>,
        statuses: &BTreeMap<VehicleId, VehicleStatus>,
        key: FilterKey,
    ) {
        let previous = std::mem::take(&mut self.entries);
        for (id, snapshot) in snapshots {
            let Some(&status) = statuses.get(id) else {
                continue;
            };
            if !key.matches(status) {
                continue;
            }
            let is_selected = previous.get(id).is_some_and(|e| e.is_selected);
            self.entries.insert(
                id.clone(),
                FilteredEntry {
                    snapshot: snapshot.clone(),
                    status,
                    is_selected,
                },
            );
        }
    }

    /// Tick or untick a vehicle. False if it is not in the set.
    pub fn set_selected(&mut self, id: &VehicleId, selected: bool) -> bool {
        match self.entries.get_mut(id) {
            Some(e) => {
                e.is_selected = selected;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &VehicleId) -> Option<&FilteredEntry> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VehicleId, &FilteredEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn any_selected(&self) -> bool {
        self.entries.values().any(|e| e.is_selected)
    }

    /// Ids to put on the map: the ticked subset if anything is ticked,
    /// otherwise the whole set.
    pub fn displayed_ids(&self) -> Vec<VehicleId> {
        let only_selected = self.any_selected();
        self.entries
            .iter()
            .filter(|(_, e)| !only_selected || e.is_selected)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LatLng;

    fn fleet() -> (
        BTreeMap<VehicleId, VehicleSnapshot>,
        BTreeMap<VehicleId, VehicleStatus>,
    ) {
        let mut snaps = BTreeMap::new();
        let mut statuses = BTreeMap::new();
        for (id, st) in [
            ("a", VehicleStatus::Running),
            ("b", VehicleStatus::Idle),
            ("c", VehicleStatus::Dead),
        ] {
            let id = VehicleId::new(id);
            snaps.insert(id.clone(), VehicleSnapshot::new(id.as_str(), LatLng::new(1.0, 1.0), 1));
            statuses.insert(id, st);
        }
        (snaps, statuses)
    }

    #[test]
    fn parses_keys_loosely() {
        assert_eq!("non-tracking".parse::<FilterKey>(), Ok(FilterKey::NonTracking));
        assert_eq!("NOGPS".parse::<FilterKey>(), Ok(FilterKey::NoGps));
        assert!("sideways".parse::<FilterKey>().is_err());
    }

    #[test]
    fn filter_buckets() {
        let (snaps, statuses) = fleet();
        let mut set = FilteredVehicleSet::default();
        set.recompute(&snaps, &statuses, FilterKey::Tracking);
        assert_eq!(set.len(), 2);
        set.recompute(&snaps, &statuses, FilterKey::NonTracking);
        assert_eq!(set.displayed_ids(), vec![VehicleId::new("c")]);
    }

    #[test]
    fn selection_survives_only_for_present_ids() {
        let (snaps, statuses) = fleet();
        let mut set = FilteredVehicleSet::default();
        set.recompute(&snaps, &statuses, FilterKey::All);
        assert!(set.set_selected(&VehicleId::new("a"), true));
        assert!(set.set_selected(&VehicleId::new("c"), true));
        assert_eq!(set.displayed_ids().len(), 2);

        set.recompute(&snaps, &statuses, FilterKey::Tracking);
        assert!(set.get(&VehicleId::new("a")).unwrap().is_selected);
        assert_eq!(set.displayed_ids(), vec![VehicleId::new("a")]);

        // "c" dropped out while filtered away, so it comes back unticked
        set.recompute(&snaps, &statuses, FilterKey::All);
        assert!(!set.get(&VehicleId::new("c")).unwrap().is_selected);
    }
}
