//! Replay dataset: a time-ordered point list with a playback cursor.

use crate::error::{EngineError, Result};
use crate::types::{LatLng, ReplayPoint, VehicleId};

/// Tolerance for floating-point division when mapping a percentage back to a
/// cursor, so that `seek(50)` with a 10% step lands on 5 and not 4.
const SEEK_EPSILON: f64 = 1e-9;

/// Driving event recorded at a replay point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertKind {
    HarshAcceleration,
    HarshBraking,
}

#[derive(Clone, Debug)]
pub struct ReplayDataset {
    vehicle_id: VehicleId,
    points: Vec<ReplayPoint>,
    step_percent: f64,
    /// Number of points applied so far, i.e. index of the next one
    cursor: usize,
    distance_km: f64,
}

impl ReplayDataset {
    /// Sort `points` by timestamp. Fewer than two points cannot be replayed.
    pub fn new(vehicle_id: VehicleId, mut points: Vec<ReplayPoint>, distance_km: f64) -> Result<Self> {
        if points.len() < 2 {
            return Err(EngineError::InsufficientHistory { found: points.len() });
        }
        points.sort_by_key(|p| p.timestamp);
        Ok(Self {
            vehicle_id,
            step_percent: 100.0 / points.len() as f64,
            points,
            cursor: 0,
            distance_km,
        })
    }

    pub fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    pub fn points(&self) -> &[ReplayPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn step_percent(&self) -> f64 {
        self.step_percent
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn first(&self) -> LatLng {
        self.points[0].position()
    }

    pub fn last(&self) -> LatLng {
        self.points[self.points.len() - 1].position()
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.points.len()
    }

    /// Playback progress in percent; exactly 100 once every point is applied.
    pub fn progress(&self) -> f64 {
        if self.is_finished() {
            100.0
        } else {
            self.cursor as f64 * self.step_percent
        }
    }

    /// Point at the cursor, advancing past it.
    pub fn next_point(&mut self) -> Option<&ReplayPoint> {
        let p = self.points.get(self.cursor)?;
        self.cursor += 1;
        Some(p)
    }

    /// Most recently applied point.
    pub fn current(&self) -> Option<&ReplayPoint> {
        self.cursor.checked_sub(1).and_then(|i| self.points.get(i))
    }

    /// Cursor for a progress percentage, clamped to the dataset.
    pub fn cursor_for_percent(&self, percent: f64) -> usize {
        let percent = percent.clamp(0.0, 100.0);
        let c = (percent / self.step_percent + SEEK_EPSILON).floor() as usize;
        c.min(self.points.len())
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.points.len());
    }

    /// Harsh driving events in time order.
    pub fn alerts(&self) -> impl Iterator<Item = (usize, AlertKind)> + '_ {
        self.points.iter().enumerate().flat_map(|(i, p)| {
            let ha = p.is_ha.unwrap_or(false).then_some((i, AlertKind::HarshAcceleration));
            let hb = p.is_hb.unwrap_or(false).then_some((i, AlertKind::HarshBraking));
            ha.into_iter().chain(hb)
        })
    }
}
