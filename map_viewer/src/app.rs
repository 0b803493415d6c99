use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use fleet_core::EngineConfig;
use fleet_sim::ScenarioKind;

use crate::{
    render::{render_clusters_system, render_markers_system, render_polylines_system},
    resources::{FleetViewer, RenderSettings, ResetEvent, UiState, ViewChangedEvent},
    systems::{
        advance_clock_system, keyboard_control_system, mouse_zoom_system, pointer_system,
        reset_system, resize_viewport_system, view_changed_system,
    },
    ui::{ui_control_panel, ui_inspector, ui_overlay, ui_replay_panel, ui_vehicle_list},
};

/// Main entry point for the interactive map.
pub fn run_viewer_app(kind: ScenarioKind, seed: u64, config: EngineConfig) {
    let viewer = FleetViewer::new(kind, seed, config);

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Fleet map".into(),
                resolution: (1400., 900.).into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(EguiPlugin)
        .insert_non_send_resource(viewer)
        .insert_resource(RenderSettings::default())
        .insert_resource(UiState::default())
        .insert_resource(ClearColor(Color::srgb(0.07, 0.08, 0.1)))
        .add_event::<ResetEvent>()
        .add_event::<ViewChangedEvent>()
        .add_systems(Startup, setup_camera)
        // Input, clock and gizmo rendering
        .add_systems(
            Update,
            (
                keyboard_control_system,
                mouse_zoom_system,
                resize_viewport_system,
                reset_system,
                view_changed_system,
                pointer_system,
                advance_clock_system,
                render_polylines_system,
                render_clusters_system,
                render_markers_system,
            )
                .chain(),
        )
        // egui panels
        .add_systems(
            Update,
            (
                ui_control_panel,
                ui_vehicle_list,
                ui_inspector,
                ui_replay_panel,
                ui_overlay,
            )
                .chain(),
        )
        .run();
}

/// 2D camera centred on the viewport.
fn setup_camera(mut commands: Commands) {
    commands.spawn(Camera2d::default());
}
