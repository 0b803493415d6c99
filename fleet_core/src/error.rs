//! Error types for the engine and its data source.

use crate::replay::ReplayState;
use crate::types::VehicleId;
use thiserror::Error;

/// Failure reported by a [`FleetDataSource`](crate::source::FleetDataSource).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("vehicle {0} is unknown to the data source")]
    UnknownVehicle(VehicleId),
    #[error("push channel is closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum EngineError {
    /// A tween or frame was requested for a vehicle that has no marker.
    /// Markers are always created by reconciliation before any update.
    #[error("no marker registered for vehicle {0}")]
    UnknownMarker(VehicleId),
    #[error("not enough data to replay: {found} point(s), need at least 2")]
    InsufficientHistory { found: usize },
    #[error("no replay is loaded")]
    NoReplay,
    #[error("invalid replay speed {0}")]
    InvalidSpeed(f64),
    #[error("cannot {action} while replay is {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: ReplayState,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
