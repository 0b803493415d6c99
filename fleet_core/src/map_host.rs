//! Map host interface and a headless implementation.
//!
//! The engine never talks to a concrete map library. Markers, traces and
//! clusters are expressed as [`Shape`]s handed to a [`MapHost`], which owns
//! projection, viewport and the actual drawing surface.

use crate::geo::{GeoBounds, Viewport};
use crate::types::{LatLng, PixelPoint};
use std::collections::BTreeMap;

/// Host-issued identifier of an attached shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub u64);

/// A vehicle or flag icon.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerSprite {
    pub position: LatLng,
    /// Projected container pixel at the time of drawing
    pub pixel: PixelPoint,
    pub icon: String,
    pub width: f64,
    pub height: f64,
    pub rotation_deg: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolylineShape {
    pub points: Vec<LatLng>,
    /// `0xRRGGBB`
    pub color: u32,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CircleShape {
    pub center: LatLng,
    pub radius_px: f64,
    pub color: u32,
    pub label: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Marker(MarkerSprite),
    Polyline(PolylineShape),
    Circle(CircleShape),
}

/// Services the engine needs from a map.
pub trait MapHost {
    fn zoom(&self) -> f64;
    /// Geographic bounds of the visible viewport
    fn bounds(&self) -> GeoBounds;
    /// Container pixel of a geographic position
    fn project(&self, position: LatLng) -> PixelPoint;
    fn add_shape(&mut self, shape: Shape) -> ShapeId;
    /// Replace an attached shape. Unknown ids are ignored.
    fn update_shape(&mut self, id: ShapeId, shape: Shape);
    /// Append one point to an attached polyline.
    fn extend_polyline(&mut self, id: ShapeId, point: LatLng);
    fn remove_shape(&mut self, id: ShapeId);
}

// ---------------------------------------------------------------------------
// Headless host
// ---------------------------------------------------------------------------

/// Counters of host operations, for assertions and run summaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MapOpCounts {
    pub added: u64,
    pub updated: u64,
    pub extended: u64,
    pub removed: u64,
}

/// In-memory map host over a fixed [`Viewport`]. Used by the CLI and as the
/// test double throughout the engine's tests.
#[derive(Debug)]
pub struct HeadlessMap {
    pub viewport: Viewport,
    shapes: BTreeMap<ShapeId, Shape>,
    next_id: u64,
    pub ops: MapOpCounts,
}

impl HeadlessMap {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            shapes: BTreeMap::new(),
            next_id: 0,
            ops: MapOpCounts::default(),
        }
    }

    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    pub fn shapes(&self) -> impl Iterator<Item = (&ShapeId, &Shape)> {
        self.shapes.iter()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Attached marker sprites.
    pub fn markers(&self) -> impl Iterator<Item = &MarkerSprite> {
        self.shapes.values().filter_map(|s| match s {
            Shape::Marker(m) => Some(m),
            _ => None,
        })
    }

    /// Attached polylines.
    pub fn polylines(&self) -> impl Iterator<Item = &PolylineShape> {
        self.shapes.values().filter_map(|s| match s {
            Shape::Polyline(p) => Some(p),
            _ => None,
        })
    }

    /// Attached cluster circles.
    pub fn circles(&self) -> impl Iterator<Item = &CircleShape> {
        self.shapes.values().filter_map(|s| match s {
            Shape::Circle(c) => Some(c),
            _ => None,
        })
    }
}

impl MapHost for HeadlessMap {
    fn zoom(&self) -> f64 {
        self.viewport.zoom
    }

    fn bounds(&self) -> GeoBounds {
        self.viewport.bounds()
    }

    fn project(&self, position: LatLng) -> PixelPoint {
        self.viewport.project(position)
    }

    fn add_shape(&mut self, shape: Shape) -> ShapeId {
        let id = ShapeId(self.next_id);
        self.next_id += 1;
        self.shapes.insert(id, shape);
        self.ops.added += 1;
        id
    }

    fn update_shape(&mut self, id: ShapeId, shape: Shape) {
        if let Some(slot) = self.shapes.get_mut(&id) {
            *slot = shape;
            self.ops.updated += 1;
        }
    }

    fn extend_polyline(&mut self, id: ShapeId, point: LatLng) {
        if let Some(Shape::Polyline(line)) = self.shapes.get_mut(&id) {
            line.points.push(point);
            self.ops.extended += 1;
        }
    }

    fn remove_shape(&mut self, id: ShapeId) {
        if self.shapes.remove(&id).is_some() {
            self.ops.removed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> HeadlessMap {
        HeadlessMap::new(Viewport::new(LatLng::new(12.97, 77.59), 14.0, 800.0, 600.0))
    }

    #[test]
    fn shape_lifecycle() {
        let mut m = map();
        let id = m.add_shape(Shape::Polyline(PolylineShape {
            points: vec![LatLng::new(12.97, 77.59)],
            color: 0,
            weight: 3.0,
        }));
        m.extend_polyline(id, LatLng::new(12.971, 77.59));
        assert_eq!(m.polylines().next().map(|p| p.points.len()), Some(2));
        m.remove_shape(id);
        m.remove_shape(id);
        assert!(m.is_empty());
        assert_eq!(m.ops.removed, 1);
    }

    #[test]
    fn update_of_unknown_shape_is_ignored() {
        let mut m = map();
        m.update_shape(
            ShapeId(42),
            Shape::Circle(CircleShape {
                center: LatLng::default(),
                radius_px: 1.0,
                color: 0,
                label: None,
            }),
        );
        assert!(m.is_empty());
        assert_eq!(m.ops.updated, 0);
    }
}
