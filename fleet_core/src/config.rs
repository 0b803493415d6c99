//! Engine configuration.
//!
//! Every field has a default; a JSON file only needs to name what it changes.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Colors used by the track renderer, as `0xRRGGBB`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracePalette {
    pub normal: u32,
    pub alert: u32,
    /// Replay: part of the route already played
    pub traveled: u32,
    /// Replay: part of the route still ahead
    pub upcoming: u32,
}

impl Default for TracePalette {
    fn default() -> Self {
        Self {
            normal: 0x1e88e5,
            alert: 0xe53935,
            traveled: 0x43a047,
            upcoming: 0x9e9e9e,
        }
    }
}

/// Grid clustering of displayed markers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub enabled: bool,
    /// Side of a grid cell in pixels
    pub cell_px: f64,
    /// At or above this zoom every marker is shown individually
    pub disable_at_zoom: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cell_px: 60.0,
            disable_at_zoom: 15.0,
        }
    }
}

/// Configuration for the live and replay controllers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between snapshot polls, also the tween length for polled moves
    pub poll_interval_ms: u64,
    /// Nominal span of one push batch when the batch does not carry its own
    pub burst_window_ms: f64,
    /// Replay tick interval at speed 1.0
    pub replay_base_interval_ms: f64,
    /// Share of the update interval spent rotating
    pub rotation_phase: f64,
    /// Share of the update interval spent translating
    pub translation_phase: f64,
    /// Decimal places compared to decide whether a move is significant
    pub significant_decimals: i32,
    /// Replay points faster than this are traced in the alert color (km/h)
    pub overspeed_kmph: f64,
    /// Scales every marker icon
    pub icon_size_factor: f64,
    pub cluster: ClusterConfig,
    pub palette: TracePalette,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            burst_window_ms: 10_000.0,
            replay_base_interval_ms: 1_000.0,
            rotation_phase: 0.33,
            translation_phase: 0.66,
            significant_decimals: 4,
            overspeed_kmph: 80.0,
            icon_size_factor: 1.0,
            cluster: ClusterConfig::default(),
            palette: TracePalette::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{ "poll_interval_ms": 5000, "cluster": { "enabled": false } }"#)
            .unwrap();
        assert_eq!(cfg.poll_interval_ms, 5000);
        assert!(!cfg.cluster.enabled);
        assert_eq!(cfg.cluster.cell_px, 60.0);
        assert_eq!(cfg.burst_window_ms, 10_000.0);
        assert_eq!(cfg.palette, TracePalette::default());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = EngineConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Config(_)));
    }
}
