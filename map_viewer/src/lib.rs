//! `map_viewer` — Bevy map host for the fleet tracking engine.
//!
//! The engine draws into an in-memory shape store; gizmo systems render that
//! store every frame and egui panels drive the dashboard.
//!
//! # Architecture
//! - **Resources**: `FleetViewer` (non-send: dashboard, simulated fleet,
//!   shape store), `RenderSettings`, `UiState`
//! - **Events**: `ResetEvent`, `ViewChangedEvent`
//! - **Systems** (in order): input, `reset`, `view_changed`, `pointer`,
//!   `advance_clock`, `render_*`, `ui_*`

pub mod app;
pub mod render;
pub mod resources;
pub mod systems;
pub mod ui;

pub use app::run_viewer_app;
