//! egui-based UI panels: control bar, vehicle list, inspector, replay bar, notices.

use crate::resources::{FleetViewer, PlayMode, RenderSettings, ResetEvent, UiState};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts};
use fleet_core::classify::StatusCounts;
use fleet_core::dashboard::ViewMode;
use fleet_core::notice::NoticeLevel;
use fleet_core::{FilterKey, HistoryRequest, ReplayState, VehicleId};

const REPLAY_SPEEDS: [f64; 6] = [0.5, 1.0, 2.0, 4.0, 8.0, 16.0];

fn bucket_count(c: &StatusCounts, key: FilterKey) -> usize {
    match key {
        FilterKey::All => c.total,
        FilterKey::Tracking => c.tracking,
        FilterKey::NonTracking => c.non_tracking,
        FilterKey::Running => c.running,
        FilterKey::Idle => c.idle,
        FilterKey::Halt => c.halt,
        FilterKey::NoGps => c.nogps,
        FilterKey::Offline => c.offline,
        FilterKey::Dead => c.dead,
        FilterKey::NoData => c.nodata,
    }
}

/// Control panel: clock controls, stat cards acting as filters, render toggles.
pub fn ui_control_panel(
    mut contexts: EguiContexts,
    mut viewer: NonSendMut<FleetViewer>,
    mut reset_events: EventWriter<ResetEvent>,
    mut render: ResMut<RenderSettings>,
) {
    let ctx = match contexts.try_ctx_mut() {
        Some(c) => c,
        None => return,
    };
    let v = &mut *viewer;
    egui::TopBottomPanel::top("control_panel").show(ctx, |ui| {
        ui.horizontal(|ui| {
            ui.heading("Fleet map");
            ui.separator();

            let play_label = match v.play_mode {
                PlayMode::Playing => "⏸ Pause",
                PlayMode::Paused => "▶ Play",
            };
            if ui.button(play_label).clicked() {
                v.play_mode = match v.play_mode {
                    PlayMode::Playing => PlayMode::Paused,
                    PlayMode::Paused => PlayMode::Playing,
                };
            }
            if ui.button("🔄 Reset").clicked() {
                reset_events.send(ResetEvent);
            }

            ui.separator();
            ui.label("Clock:");
            ui.add(
                egui::Slider::new(&mut v.speed_multiplier, 0.25..=64.0)
                    .logarithmic(true)
                    .text("×"),
            );
            ui.separator();
            ui.label(format!(
                "t={:.1}s  zoom={:.0}  scenario={}",
                v.clock_ms as f64 / 1000.0,
                v.map.viewport.zoom,
                v.dashboard.source().scenario().name,
            ));
        });

        // Second row: stat cards
        ui.horizontal_wrapped(|ui| {
            let counts = v.dashboard.counts();
            let current = v.dashboard.live().filter();
            for key in FilterKey::ALL_KEYS {
                let label = format!("{key} {}", bucket_count(&counts, key));
                if ui.selectable_label(current == key, label).clicked() && current != key {
                    v.dashboard.set_filter(key, &mut v.map);
                }
            }
        });

        ui.horizontal(|ui| {
            ui.checkbox(&mut render.show_traces, "Traces");
            ui.checkbox(&mut render.show_clusters, "Clusters");
            ui.separator();
            ui.label("Icons:");
            ui.add(egui::Slider::new(&mut render.marker_scale, 0.5..=3.0));
        });
    });
}

enum ListAction {
    Check(VehicleId, bool),
    Select(VehicleId),
}

/// Filtered vehicle list with checkboxes (left).
pub fn ui_vehicle_list(mut contexts: EguiContexts, mut viewer: NonSendMut<FleetViewer>) {
    let ctx = match contexts.try_ctx_mut() {
        Some(c) => c,
        None => return,
    };
    let v = &mut *viewer;
    let mut actions = Vec::new();
    egui::SidePanel::left("vehicle_list")
        .default_width(240.0)
        .show(ctx, |ui| {
            let filtered = v.dashboard.filtered();
            ui.heading(format!("Vehicles ({})", filtered.len()));
            ui.separator();
            let selected = v.dashboard.live().selected().cloned();
            egui::ScrollArea::vertical().show(ui, |ui| {
                for (id, entry) in filtered.iter() {
                    ui.horizontal(|ui| {
                        let mut checked = entry.is_selected;
                        if ui.checkbox(&mut checked, "").changed() {
                            actions.push(ListAction::Check(id.clone(), checked));
                        }
                        let label = format!(
                            "{id}  {:?}  {:.0} km/h",
                            entry.status, entry.snapshot.speed
                        );
                        if ui
                            .selectable_label(selected.as_ref() == Some(id), label)
                            .clicked()
                        {
                            actions.push(ListAction::Select(id.clone()));
                        }
                    });
                }
            });
        });

    for action in actions {
        match action {
            ListAction::Check(id, checked) => {
                v.dashboard.set_checked(&id, checked, &mut v.map);
            }
            ListAction::Select(id) => v.dashboard.select_vehicle(Some(id), &mut v.map),
        }
    }
}

/// Selected vehicle details and mode switches (right).
pub fn ui_inspector(
    mut contexts: EguiContexts,
    mut viewer: NonSendMut<FleetViewer>,
    mut ui_state: ResMut<UiState>,
) {
    let ctx = match contexts.try_ctx_mut() {
        Some(c) => c,
        None => return,
    };
    let v = &mut *viewer;
    let Some(view) = v.dashboard.selected_view() else {
        return;
    };
    let mode = v.dashboard.view_mode();

    egui::SidePanel::right("inspector")
        .default_width(260.0)
        .show(ctx, |ui| {
            ui.heading(format!("{}", view.id));
            ui.label(format!("Status: {:?}", view.status));
            if let Some(t) = &view.vehicle_type {
                ui.label(format!("Type: {t}"));
            }
            ui.label(format!("Speed: {:.1} km/h", view.speed));
            match view.position {
                Some(p) => ui.label(format!("Position: {p}")),
                None => ui.label("Position: unknown"),
            };
            if let Some(a) = &view.address {
                ui.label(format!("Address: {a}"));
            }
            if let Some(ts) = view.timestamp {
                ui.label(format!("Last fix: {:.1}s", ts as f64 / 1000.0));
            }
            if let Some(volts) = view.battery_voltage {
                let source = if view.is_primary_battery { "main" } else { "backup" };
                ui.label(format!("Battery: {volts:.1} V ({source})"));
            }
            ui.separator();

            match &mode {
                ViewMode::Live(id) if *id == view.id => {
                    if let Some((done, total)) = v.dashboard.live().burst_progress() {
                        ui.label(format!("Burst: {done}/{total}"));
                    }
                    if ui.button("⏹ Stop live").clicked() {
                        v.dashboard.stop_live(&mut v.map);
                    }
                }
                _ => {
                    ui.checkbox(&mut ui_state.snap_to_road, "Snap to road");
                    if ui.button("📡 Track live").clicked() {
                        if let Err(e) = v.dashboard.start_live(&view.id, ui_state.snap_to_road, &mut v.map) {
                            tracing::warn!(error = %e, "could not go live");
                        }
                    }
                }
            }

            ui.horizontal(|ui| {
                ui.add(
                    egui::DragValue::new(&mut ui_state.replay_minutes)
                        .range(1..=120)
                        .suffix(" min"),
                );
                if ui.button("⏪ Replay").clicked() {
                    let to = v.clock_ms as i64;
                    let request = HistoryRequest {
                        vehicle_id: view.id.clone(),
                        from_ts: to - ui_state.replay_minutes as i64 * 60_000,
                        to_ts: to,
                        snap_to_road: ui_state.snap_to_road,
                    };
                    match v.dashboard.load_replay(&request, &mut v.map) {
                        Ok(()) => {
                            if let Err(e) = v.dashboard.play(&mut v.map) {
                                tracing::warn!(error = %e, "could not start replay");
                            }
                        }
                        Err(e) => tracing::debug!(error = %e, "replay not loaded"),
                    }
                }
            });

            if ui.button("✖ Close").clicked() {
                v.dashboard.select_vehicle(None, &mut v.map);
            }
        });
}

/// Replay timeline (bottom), shown while a replay is loaded.
pub fn ui_replay_panel(mut contexts: EguiContexts, mut viewer: NonSendMut<FleetViewer>) {
    let ctx = match contexts.try_ctx_mut() {
        Some(c) => c,
        None => return,
    };
    let v = &mut *viewer;
    let progress = v.dashboard.replay_progress();
    if progress.state == ReplayState::Idle {
        return;
    }
    egui::TopBottomPanel::bottom("replay_timeline").show(ctx, |ui| {
        ui.horizontal(|ui| {
            let playing = progress.state == ReplayState::Playing;
            if ui.button(if playing { "⏸" } else { "▶" }).clicked() {
                let result = if playing {
                    v.dashboard.pause()
                } else {
                    v.dashboard.play(&mut v.map)
                };
                if let Err(e) = result {
                    tracing::debug!(error = %e, "replay control ignored");
                }
            }
            if ui.button("⏹").clicked() {
                v.dashboard.stop_replay(&mut v.map);
                return;
            }

            let mut percent = progress.percent as f32;
            let slider = ui.add(
                egui::Slider::new(&mut percent, 0.0..=100.0)
                    .show_value(false)
                    .text(format!("{}/{}", progress.cursor, progress.total)),
            );
            if slider.drag_stopped() || (slider.changed() && !slider.dragged()) {
                if let Err(e) = v.dashboard.seek(percent as f64, &mut v.map) {
                    tracing::debug!(error = %e, "seek ignored");
                }
            }

            egui::ComboBox::from_id_salt("replay_speed")
                .selected_text(format!("×{}", progress.speed))
                .show_ui(ui, |ui| {
                    for s in REPLAY_SPEEDS {
                        if ui.selectable_label(progress.speed == s, format!("×{s}")).clicked() {
                            if let Err(e) = v.dashboard.set_speed(s) {
                                tracing::debug!(error = %e, "speed ignored");
                            }
                        }
                    }
                });

            ui.separator();
            ui.label(format!("{:?}  {:.2} km", progress.state, progress.distance_km));
            if let Some(p) = &progress.current {
                ui.label(format!("{:.0} km/h", p.speed));
            }
        });
    });
}

/// Recent notices (bottom-right toasts) and cluster counts over the map.
pub fn ui_overlay(mut contexts: EguiContexts, viewer: NonSend<FleetViewer>) {
    let ctx = match contexts.try_ctx_mut() {
        Some(c) => c,
        None => return,
    };

    let painter = ctx.layer_painter(egui::LayerId::background());
    for circle in viewer.map.circles() {
        if let Some(label) = &circle.label {
            let px = viewer.map.viewport.project(circle.center);
            painter.text(
                egui::pos2(px.x as f32, px.y as f32),
                egui::Align2::CENTER_CENTER,
                label,
                egui::FontId::proportional(13.0),
                egui::Color32::WHITE,
            );
        }
    }

    if viewer.notices.is_empty() {
        return;
    }
    egui::Window::new("Notices")
        .anchor(egui::Align2::RIGHT_BOTTOM, [-12.0, -48.0])
        .resizable(false)
        .collapsible(true)
        .show(ctx, |ui| {
            for n in viewer.notices.iter().rev() {
                let color = match n.level {
                    NoticeLevel::Info => egui::Color32::LIGHT_BLUE,
                    NoticeLevel::Warning => egui::Color32::YELLOW,
                    NoticeLevel::Error => egui::Color32::LIGHT_RED,
                };
                ui.colored_label(color, &n.message);
            }
        });
}
