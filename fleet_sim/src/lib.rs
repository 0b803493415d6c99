//! `fleet_sim` — Synthetic fleet: vehicle motion, scenarios, a simulated
//! data source and session logs.

pub mod log;
pub mod scenarios;
pub mod source;
pub mod vehicle;

pub use log::{load_log, save_log, LogSource, SessionLog, SnapshotFrame};
pub use scenarios::{Scenario, ScenarioKind};
pub use source::{SimSourceConfig, SimulatedSource};
pub use vehicle::{Behavior, SimVehicle};
