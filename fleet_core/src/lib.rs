//! `fleet_core` — Live-tracking and replay rendering engine for vehicle fleets.
//!
//! # Module layout
//! - [`types`]     — Coordinates, IDs, snapshots, push and history records
//! - [`error`]     — Engine and data-source errors
//! - [`config`]    — Engine configuration (JSON, every field defaulted)
//! - [`geo`]       — Web-mercator projection, bounds, viewport
//! - [`sizing`]    — Zoom → icon size and frame rate
//! - [`icons`]     — Status icon keys and vehicle icon sets
//! - [`classify`]  — Vehicle status classification and counts
//! - [`scheduler`] — Cancellable tasks on a virtual clock
//! - [`animation`] — Easing, bearings, two-phase tween
//! - [`map_host`]  — Map host trait and headless implementation
//! - [`track`]     — Multi-colored trace polylines
//! - [`marker`]    — Per-vehicle animated marker
//! - [`filter`]    — Status filter and filtered vehicle set
//! - [`cluster`]   — Clustering facade
//! - [`source`]    — Data source trait
//! - [`notice`]    — User-visible notification channel
//! - [`live`]      — Polling / live tracking controller
//! - [`dataset`]   — Replay dataset and cursor
//! - [`replay`]    — Replay controller
//! - [`dashboard`] — Facade tying the controllers together

pub mod animation;
pub mod classify;
pub mod cluster;
pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod geo;
pub mod icons;
pub mod live;
pub mod map_host;
pub mod marker;
pub mod notice;
pub mod replay;
pub mod scheduler;
pub mod sizing;
pub mod source;
pub mod track;
pub mod types;

pub use classify::{classify, StatusCounts, VehicleStatus};
pub use config::EngineConfig;
pub use dashboard::{Dashboard, ViewMode};
pub use error::{EngineError, Result, SourceError};
pub use filter::FilterKey;
pub use live::{LiveTracker, ReconcileReport, TrackingMode};
pub use map_host::{HeadlessMap, MapHost, Shape, ShapeId};
pub use marker::{MarkerEngine, MarkerMode};
pub use replay::{ReplayController, ReplayState};
pub use source::FleetDataSource;
pub use types::{
    ChannelId, HistoryRequest, HistoryResponse, LatLng, PushBatch, PushPoint, ReplayPoint,
    VehicleId, VehicleSnapshot,
};
