//! Fundamental types shared by the engine, the simulator and the map hosts.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// Screen-space position in map container pixels (x right, y down).
pub type PixelPoint = Point2<f64>;

/// WGS84 position in decimal degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lng)
    }
}

// ---------------------------------------------------------------------------
// Identifier types
// ---------------------------------------------------------------------------

/// Stable vehicle identifier as issued by the data source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Handle of an open push channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Snapshot (polling)
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// One vehicle's latest known position and status.
///
/// Field names follow the data source's camelCase wire format. Coordinates and
/// timestamp are nullable: a vehicle that has never reported still shows up in
/// the statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// km/h
    #[serde(default)]
    pub speed: f64,
    /// Epoch milliseconds of the last fix
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub is_offline: bool,
    #[serde(default)]
    pub is_no_gps: bool,
    #[serde(default)]
    pub halt_status: bool,
    #[serde(default)]
    pub idling_status: bool,
    #[serde(default)]
    pub is_overspeed: bool,
    #[serde(default = "default_true")]
    pub is_primary_battery: bool,
    pub vehicle_type: Option<String>,
    pub model: Option<String>,
    pub address: Option<String>,
    pub battery_voltage: Option<f64>,
}

impl VehicleSnapshot {
    /// A reporting, moving vehicle at `position`.
    pub fn new(id: impl Into<String>, position: LatLng, timestamp: i64) -> Self {
        Self {
            id: VehicleId::new(id),
            lat: Some(position.lat),
            lng: Some(position.lng),
            timestamp: Some(timestamp),
            is_primary_battery: true,
            ..Default::default()
        }
    }

    /// Position if both coordinates are present.
    pub fn position(&self) -> Option<LatLng> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Push channel
// ---------------------------------------------------------------------------

/// One recorded point delivered by a per-vehicle push channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPoint {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: i64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub is_no_gps: bool,
    #[serde(default)]
    pub halt_status: bool,
    #[serde(default)]
    pub idling_status: bool,
    #[serde(default)]
    pub is_overspeed: bool,
}

impl PushPoint {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// A burst of points delivered together by the push channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBatch {
    pub vehicle_id: VehicleId,
    pub points: Vec<PushPoint>,
    /// Wall time the batch spans. Absent on older feeds, in which case the
    /// configured burst window applies.
    #[serde(default)]
    pub nominal_duration_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// History (replay)
// ---------------------------------------------------------------------------

/// One recorded historical point.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayPoint {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: i64,
    #[serde(default)]
    pub speed: f64,
    pub address: Option<String>,
    /// Harsh acceleration event at this point
    #[serde(rename = "isHA")]
    pub is_ha: Option<bool>,
    /// Harsh braking event at this point
    #[serde(rename = "isHB")]
    pub is_hb: Option<bool>,
}

impl ReplayPoint {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Query for a vehicle's recorded history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub vehicle_id: VehicleId,
    pub from_ts: i64,
    pub to_ts: i64,
    pub snap_to_road: bool,
}

/// History query result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub points: Vec<ReplayPoint>,
    pub distance_travelled_km: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
