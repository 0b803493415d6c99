//! Geographic helpers: Web-Mercator projection, viewport bounds, distances and
//! pixel-space segment math.

use crate::types::{LatLng, PixelPoint};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Pixel size of one map tile at zoom 0.
pub const TILE_SIZE: f64 = 256.0;

/// Mercator is undefined at the poles; latitudes are clamped to this.
const MAX_LATITUDE: f64 = 85.051_128_78;

const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Side of the whole projected world in pixels at `zoom`.
pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2f64.powf(zoom)
}

/// Project to absolute world pixels at `zoom`.
pub fn project(p: LatLng, zoom: f64) -> PixelPoint {
    let size = world_size(zoom);
    let lat = p.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (p.lng + 180.0) / 360.0 * size;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * size;
    Point2::new(x, y)
}

/// Inverse of [`project`].
pub fn unproject(px: PixelPoint, zoom: f64) -> LatLng {
    let size = world_size(zoom);
    let lng = px.x / size * 360.0 - 180.0;
    let n = PI - 2.0 * PI * px.y / size;
    let lat = n.sinh().atan().to_degrees();
    LatLng::new(lat, lng)
}

/// Great-circle distance in meters.
pub fn haversine_m(a: LatLng, b: LatLng) -> f64 {
    let (la1, la2) = (a.lat.to_radians(), b.lat.to_radians());
    let dla = la2 - la1;
    let dlo = (b.lng - a.lng).to_radians();
    let h = (dla / 2.0).sin().powi(2) + la1.cos() * la2.cos() * (dlo / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Linear interpolation in degree space. Adequate for the short hops between
/// consecutive fixes.
pub fn lerp(a: LatLng, b: LatLng, t: f64) -> LatLng {
    LatLng::new(a.lat + (b.lat - a.lat) * t, a.lng + (b.lng - a.lng) * t)
}

/// Closest point on segment `a..b` to `p`.
/// Returns `(t, distance)` where `t` in [0, 1] is the position along the segment.
pub fn closest_on_segment(p: PixelPoint, a: PixelPoint, b: PixelPoint) -> (f64, f64) {
    let ab: Vector2<f64> = b - a;
    let len_sq = ab.norm_squared();
    let t = if len_sq == 0.0 {
        0.0
    } else {
        ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0)
    };
    let closest = a + ab * t;
    (t, (p - closest).norm())
}

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Axis-aligned lat/lng rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.south && p.lat <= self.north && p.lng >= self.west && p.lng <= self.east
    }

    /// Smallest bounds covering every point. `None` for an empty slice.
    pub fn covering(points: &[LatLng]) -> Option<Self> {
        let first = points.first()?;
        let mut b = GeoBounds {
            south: first.lat,
            west: first.lng,
            north: first.lat,
            east: first.lng,
        };
        for p in &points[1..] {
            b.south = b.south.min(p.lat);
            b.north = b.north.max(p.lat);
            b.west = b.west.min(p.lng);
            b.east = b.east.max(p.lng);
        }
        Some(b)
    }

    pub fn center(&self) -> LatLng {
        LatLng::new((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }
}

// ---------------------------------------------------------------------------
// Viewport
// ---------------------------------------------------------------------------

/// A rectangular map view centred on `center`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: f64,
    /// Container size in pixels
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(center: LatLng, zoom: f64, width: f64, height: f64) -> Self {
        Self {
            center,
            zoom,
            width,
            height,
        }
    }

    /// World pixel of the container's top-left corner.
    fn origin(&self) -> PixelPoint {
        let c = project(self.center, self.zoom);
        Point2::new(c.x - self.width / 2.0, c.y - self.height / 2.0)
    }

    /// Container pixel of `p`.
    pub fn project(&self, p: LatLng) -> PixelPoint {
        let world = project(p, self.zoom);
        let o = self.origin();
        Point2::new(world.x - o.x, world.y - o.y)
    }

    /// Geographic position of container pixel `px`.
    pub fn unproject(&self, px: PixelPoint) -> LatLng {
        let o = self.origin();
        unproject(Point2::new(px.x + o.x, px.y + o.y), self.zoom)
    }

    pub fn bounds(&self) -> GeoBounds {
        let nw = self.unproject(Point2::new(0.0, 0.0));
        let se = self.unproject(Point2::new(self.width, self.height));
        GeoBounds {
            south: se.lat,
            west: nw.lng,
            north: nw.lat,
            east: se.lng,
        }
    }

    /// Move the centre by a pixel offset.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        let c = project(self.center, self.zoom);
        self.center = unproject(Point2::new(c.x + dx, c.y + dy), self.zoom);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn project_unproject_is_inverse() {
        let p = LatLng::new(12.9716, 77.5946);
        let back = unproject(project(p, 14.0), 14.0);
        assert_abs_diff_eq!(back.lat, p.lat, epsilon = 1e-9);
        assert_abs_diff_eq!(back.lng, p.lng, epsilon = 1e-9);
    }

    #[test]
    fn viewport_centre_maps_to_container_centre() {
        let vp = Viewport::new(LatLng::new(12.97, 77.59), 13.0, 800.0, 600.0);
        let px = vp.project(vp.center);
        assert_abs_diff_eq!(px.x, 400.0, epsilon = 1e-6);
        assert_abs_diff_eq!(px.y, 300.0, epsilon = 1e-6);
        let b = vp.bounds();
        assert!(b.contains(vp.center));
        assert!(b.north > b.south && b.east > b.west);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_m(LatLng::new(0.0, 0.0), LatLng::new(1.0, 0.0));
        assert_abs_diff_eq!(d, 111_195.0, epsilon = 50.0);
    }

    #[test]
    fn closest_on_segment_clamps_to_endpoints() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(10.0, 0.0);
        let (t, d) = closest_on_segment(Point2::new(5.0, 3.0), a, b);
        assert_abs_diff_eq!(t, 0.5);
        assert_abs_diff_eq!(d, 3.0);
        let (t, _) = closest_on_segment(Point2::new(-4.0, 0.0), a, b);
        assert_eq!(t, 0.0);
    }

    #[test]
    fn covering_bounds() {
        assert!(GeoBounds::covering(&[]).is_none());
        let b = GeoBounds::covering(&[LatLng::new(1.0, 5.0), LatLng::new(-2.0, 7.0)]).unwrap();
        assert_eq!((b.south, b.west, b.north, b.east), (-2.0, 5.0, 1.0, 7.0));
    }
}
