//! Zoom-dependent icon size and animation frame rate.

/// `(minimum zoom, icon width px)`, highest zoom first. Anything below the last
/// threshold gets [`MIN_ICON_WIDTH`].
const ZOOM_WIDTHS: [(f64, f64); 9] = [
    (20.0, 70.0),
    (18.0, 60.0),
    (16.0, 50.0),
    (15.0, 45.0),
    (14.0, 40.0),
    (12.0, 35.0),
    (10.0, 30.0),
    (8.0, 25.0),
    (6.0, 15.0),
];

const MIN_ICON_WIDTH: f64 = 10.0;

/// Rendered marker icon size in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IconSize {
    pub width: f64,
    pub height: f64,
}

/// Unscaled icon width for `zoom`.
pub fn icon_width(zoom: f64) -> f64 {
    ZOOM_WIDTHS
        .iter()
        .find(|(min_zoom, _)| zoom >= *min_zoom)
        .map(|&(_, w)| w)
        .unwrap_or(MIN_ICON_WIDTH)
}

/// Icon size for `zoom`. Regular icons are half as tall as wide; square icon
/// sets keep a 1:1 ratio.
pub fn icon_size(zoom: f64, square: bool, size_factor: f64) -> IconSize {
    let width = icon_width(zoom) * size_factor;
    let height = if square { width } else { width * 0.5 };
    IconSize { width, height }
}

/// Animation frames per second. Close zooms show motion in more detail.
pub fn frame_rate(zoom: f64) -> u32 {
    if zoom >= 15.0 {
        60
    } else if zoom >= 11.0 {
        30
    } else {
        15
    }
}

/// Delay between animation frames in milliseconds.
pub fn frame_interval_ms(zoom: f64) -> u64 {
    (1000.0 / frame_rate(zoom) as f64).round() as u64
}
