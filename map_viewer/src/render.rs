//! Gizmo-based 2D rendering of markers, traces and clusters.
//!
//! Shapes come from the in-memory map the engine draws into; positions are
//! re-projected through the current viewport every frame.

use crate::resources::{FleetViewer, RenderSettings};
use bevy::prelude::*;
use fleet_core::geo::Viewport;
use fleet_core::types::LatLng;

const HOVER_COLOR: Color = Color::srgb(1.0, 1.0, 1.0);

/// Container pixel (origin top-left, y down) -> Bevy screen position
/// (origin centre, y up).
pub fn to_screen(vp: &Viewport, p: LatLng) -> Vec2 {
    let px = vp.project(p);
    Vec2::new(
        (px.x - vp.width / 2.0) as f32,
        (vp.height / 2.0 - px.y) as f32,
    )
}

/// `0xRRGGBB` -> sRGB color.
pub fn rgb(c: u32) -> Color {
    Color::srgb_u8((c >> 16) as u8, (c >> 8) as u8, c as u8)
}

/// Color for an icon name such as `truck-running` or `flag-start`.
fn icon_color(icon: &str) -> Color {
    match icon.rsplit('-').next().unwrap_or_default() {
        "running" => Color::srgb(0.2, 0.8, 0.3),
        "idle" => Color::srgb(1.0, 0.8, 0.1),
        "halt" => Color::srgb(0.9, 0.25, 0.2),
        "nogps" => Color::srgb(0.7, 0.4, 1.0),
        "offline" => Color::srgb(0.55, 0.55, 0.55),
        "start" => Color::srgb(0.1, 0.9, 0.9),
        "end" => Color::srgb(1.0, 0.5, 0.0),
        "ha" | "hb" => Color::srgb(1.0, 0.2, 0.6),
        _ => Color::srgb(0.85, 0.85, 0.9),
    }
}

fn is_flag(icon: &str) -> bool {
    icon.starts_with("flag-") || icon.starts_with("alert-")
}

/// Render traces and replay routes as line strips.
pub fn render_polylines_system(
    mut gizmos: Gizmos,
    viewer: NonSend<FleetViewer>,
    render: Res<RenderSettings>,
) {
    if !render.show_traces {
        return;
    }
    let vp = &viewer.map.viewport;
    for line in viewer.map.polylines() {
        let color = rgb(line.color);
        let pts: Vec<Vec2> = line.points.iter().map(|p| to_screen(vp, *p)).collect();
        for w in pts.windows(2) {
            gizmos.line_2d(w[0], w[1], color);
        }
    }
}

/// Render vehicle markers as heading arrows and flags as rings.
pub fn render_markers_system(
    mut gizmos: Gizmos,
    viewer: NonSend<FleetViewer>,
    render: Res<RenderSettings>,
) {
    let vp = &viewer.map.viewport;
    for sprite in viewer.map.markers() {
        let c = to_screen(vp, sprite.position);
        let color = icon_color(&sprite.icon);
        let w = sprite.width as f32 * render.marker_scale;
        let h = sprite.height as f32 * render.marker_scale;

        if is_flag(&sprite.icon) {
            gizmos.circle_2d(c, w.max(h) / 2.0, color);
            continue;
        }

        // bearing is clockwise from north; screen north is +y
        let theta = (sprite.rotation_deg as f32).to_radians();
        let dir = Vec2::new(theta.sin(), theta.cos());
        let side = Vec2::new(dir.y, -dir.x);
        let tip = c + dir * (h / 2.0);
        let left = c - dir * (h / 2.0) - side * (w / 2.0);
        let right = c - dir * (h / 2.0) + side * (w / 2.0);
        gizmos.line_2d(tip, left, color);
        gizmos.line_2d(left, right, color);
        gizmos.line_2d(right, tip, color);
    }

    if let Some(m) = viewer
        .hovered
        .as_ref()
        .and_then(|id| viewer.dashboard.live().marker(id))
    {
        gizmos.circle_2d(to_screen(vp, m.position()), 16.0, HOVER_COLOR);
    }
}

/// Render cluster circles. Counts are painted by the egui overlay.
pub fn render_clusters_system(
    mut gizmos: Gizmos,
    viewer: NonSend<FleetViewer>,
    render: Res<RenderSettings>,
) {
    if !render.show_clusters {
        return;
    }
    let vp = &viewer.map.viewport;
    for circle in viewer.map.circles() {
        let c = to_screen(vp, circle.center);
        let color = rgb(circle.color);
        gizmos.circle_2d(c, circle.radius_px as f32, color);
        gizmos.circle_2d(c, circle.radius_px as f32 * 0.7, color.with_alpha(0.4));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn viewport_center_maps_to_origin() {
        let vp = Viewport::new(LatLng::new(12.97, 77.59), 14.0, 800.0, 600.0);
        let p = to_screen(&vp, vp.center);
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(p.y, 0.0, epsilon = 1e-3);
        let north = to_screen(&vp, LatLng::new(12.98, 77.59));
        assert!(north.y > 0.0);
    }

    #[test]
    fn icon_colors_follow_status_suffix() {
        assert_eq!(icon_color("truck-running"), icon_color("car-running"));
        assert_ne!(icon_color("car-running"), icon_color("car-halt"));
        assert!(is_flag("flag-start"));
        assert!(!is_flag("bike-idle"));
    }
}
