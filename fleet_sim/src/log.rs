//! Session logs: recorded snapshot batches for offline replay.
//!
//! A [`LogSource`] serves a saved log back through [`FleetDataSource`], one
//! frame per snapshot fetch, so a run can be rendered again without the
//! simulator.

use fleet_core::error::SourceError;
use fleet_core::geo::haversine_m;
use fleet_core::source::FleetDataSource;
use fleet_core::types::{
    ChannelId, HistoryRequest, HistoryResponse, PushBatch, ReplayPoint, VehicleId, VehicleSnapshot,
};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A full recorded session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionLog {
    pub scenario_name: String,
    pub seed: u64,
    pub poll_interval_ms: u64,
    /// Snapshot batches in chronological order
    pub frames: Vec<SnapshotFrame>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFrame {
    pub time_ms: u64,
    pub snapshots: Vec<VehicleSnapshot>,
}

/// Save a session log to a JSON file.
pub fn save_log(log: &SessionLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a session log from a JSON file.
pub fn load_log(path: &Path) -> anyhow::Result<SessionLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: SessionLog = serde_json::from_reader(reader)?;
    Ok(log)
}

/// Plays a [`SessionLog`] back as a data source. Logs carry no push data,
/// so live tracking is refused.
pub struct LogSource {
    log: SessionLog,
    next: usize,
}

impl LogSource {
    pub fn new(log: SessionLog) -> Self {
        Self { log, next: 0 }
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// True once every frame has been served.
    pub fn exhausted(&self) -> bool {
        self.next >= self.log.frames.len()
    }

    /// Time of the next frame to be served.
    pub fn next_time_ms(&self) -> Option<u64> {
        self.log.frames.get(self.next).map(|f| f.time_ms)
    }
}

impl FleetDataSource for LogSource {
    fn fetch_snapshots(&mut self) -> Result<Vec<VehicleSnapshot>, SourceError> {
        match self.log.frames.get(self.next) {
            Some(frame) => {
                self.next += 1;
                Ok(frame.snapshots.clone())
            }
            None => Err(SourceError::Network("session log exhausted".into())),
        }
    }

    fn open_channel(&mut self, _vehicle: &VehicleId, _snap_to_road: bool) -> Result<ChannelId, SourceError> {
        Err(SourceError::ChannelClosed)
    }

    fn close_channel(&mut self, _channel: ChannelId) {}

    fn take_pushed(&mut self, _channel: ChannelId) -> Vec<PushBatch> {
        Vec::new()
    }

    /// History rebuilt from the logged snapshots of one vehicle. Repeated
    /// fixes with the same timestamp are recorded once.
    fn fetch_history(&mut self, request: &HistoryRequest) -> Result<HistoryResponse, SourceError> {
        let mut points: Vec<ReplayPoint> = Vec::new();
        let mut seen = false;
        for snap in self.log.frames.iter().flat_map(|f| &f.snapshots) {
            if snap.id != request.vehicle_id {
                continue;
            }
            seen = true;
            let (Some(ts), Some(pos)) = (snap.timestamp, snap.position()) else {
                continue;
            };
            if ts < request.from_ts || ts > request.to_ts {
                continue;
            }
            if points.last().is_some_and(|p| p.timestamp == ts) {
                continue;
            }
            points.push(ReplayPoint {
                lat: pos.lat,
                lng: pos.lng,
                timestamp: ts,
                speed: snap.speed,
                address: snap.address.clone(),
                is_ha: None,
                is_hb: None,
            });
        }
        if !seen {
            return Err(SourceError::UnknownVehicle(request.vehicle_id.clone()));
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

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::types::LatLng;

    fn sample_log() -> SessionLog {
        let frames = (0..4)
            .map(|i| SnapshotFrame {
                time_ms: i * 10_000,
                snapshots: vec![
                    VehicleSnapshot::new(
                        "a",
                        LatLng::new(12.97 + i as f64 * 0.001, 77.59),
                        i as i64 * 10_000,
                    ),
                    VehicleSnapshot::new("b", LatLng::new(13.0, 77.0), 0),
                ],
            })
            .collect();
        SessionLog {
            scenario_name: "test".into(),
            seed: 1,
            poll_interval_ms: 10_000,
            frames,
        }
    }

    #[test]
    fn save_and_load() {
        let path = std::env::temp_dir().join(format!("fleet_sim_log_{}.json", std::process::id()));
        let log = sample_log();
        save_log(&log, &path).unwrap();
        let back = load_log(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back.scenario_name, "test");
        assert_eq!(back.frames, log.frames);
    }

    #[test]
    fn serves_frames_in_order_then_fails() {
        let mut src = LogSource::new(sample_log());
        assert_eq!(src.next_time_ms(), Some(0));
        for i in 0..4 {
            let snaps = src.fetch_snapshots().unwrap();
            assert_eq!(snaps[0].timestamp, Some(i * 10_000));
        }
        assert!(src.exhausted());
        assert!(src.fetch_snapshots().is_err());
    }

    #[test]
    fn history_is_rebuilt_from_frames() {
        let mut src = LogSource::new(sample_log());
        let req = |id: &str| HistoryRequest {
            vehicle_id: VehicleId::new(id),
            from_ts: 0,
            to_ts: 20_000,
            snap_to_road: false,
        };
        let a = src.fetch_history(&req("a")).unwrap();
        assert_eq!(a.points.len(), 3);
        assert!(a.distance_travelled_km > 0.2);
        // b never moves and always reports the same fix
        let b = src.fetch_history(&req("b")).unwrap();
        assert_eq!(b.points.len(), 1);
        assert!(src.fetch_history(&req("zz")).is_err());
    }

    #[test]
    fn live_tracking_is_refused() {
        let mut src = LogSource::new(sample_log());
        assert_eq!(
            src.open_channel(&VehicleId::new("a"), false),
            Err(SourceError::ChannelClosed)
        );
    }
}
