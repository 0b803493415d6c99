//! Track renderer: a vehicle's trace as a run of single-colored polylines.
//!
//! A segment holds the points sharing one color. A point whose color differs
//! from the last one starts a new segment; earlier segments are never touched
//! again. On the map each new segment also begins at the previous segment's
//! last point so the drawn trace has no gaps.

use crate::config::TracePalette;
use crate::map_host::{MapHost, PolylineShape, Shape, ShapeId};
use crate::types::LatLng;

/// Line weight in pixels.
const TRACE_WEIGHT: f64 = 4.0;

/// A maximal run of trace points sharing one color.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackSegment {
    pub points: Vec<LatLng>,
    /// Alert flag the segment was keyed on (e.g. overspeed)
    pub color_key: bool,
    /// Resolved `0xRRGGBB`
    pub color: u32,
    shape: Option<ShapeId>,
}

#[derive(Debug)]
pub struct TrackRenderer {
    palette: TracePalette,
    segments: Vec<TrackSegment>,
}

impl TrackRenderer {
    pub fn new(palette: TracePalette) -> Self {
        Self {
            palette,
            segments: Vec::new(),
        }
    }

    fn resolve_color(&self, color_key: bool, explicit: Option<u32>) -> u32 {
        match explicit {
            Some(c) => c,
            None if color_key => self.palette.alert,
            None => self.palette.normal,
        }
    }

    /// Append a point to the trace. `color_key` marks alert points, `explicit`
    /// overrides the palette.
    pub fn add_point(
        &mut self,
        host: &mut dyn MapHost,
        point: LatLng,
        color_key: bool,
        explicit: Option<u32>,
    ) {
        let color = self.resolve_color(color_key, explicit);
        if let Some(seg) = self.segments.last_mut() {
            if seg.color_key == color_key && seg.color == color {
                seg.points.push(point);
                if let Some(id) = seg.shape {
                    host.extend_polyline(id, point);
                }
                return;
            }
        }

        let joint = self.segments.last().and_then(|s| s.points.last().copied());
        let drawn: Vec<LatLng> = joint.into_iter().chain(std::iter::once(point)).collect();
        let shape = host.add_shape(Shape::Polyline(PolylineShape {
            points: drawn,
            color,
            weight: TRACE_WEIGHT,
        }));
        self.segments.push(TrackSegment {
            points: vec![point],
            color_key,
            color,
            shape: Some(shape),
        });
    }

    /// Detach every segment from the map and forget them. Safe to repeat.
    pub fn remove(&mut self, host: &mut dyn MapHost) {
        for seg in self.segments.drain(..) {
            if let Some(id) = seg.shape {
                host.remove_shape(id);
            }
        }
    }

    /// The segment currently being extended.
    pub fn current_line(&self) -> Option<&TrackSegment> {
        self.segments.last()
    }

    pub fn segments(&self) -> &[TrackSegment] {
        &self.segments
    }

    /// Recorded points across all segments.
    pub fn point_count(&self) -> usize {
        self.segments.iter().map(|s| s.points.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Viewport;
    use crate::map_host::HeadlessMap;

    fn setup() -> (TrackRenderer, HeadlessMap) {
        let map = HeadlessMap::new(Viewport::new(LatLng::new(0.0, 0.0), 12.0, 800.0, 600.0));
        (TrackRenderer::new(TracePalette::default()), map)
    }

    fn p(i: u32) -> LatLng {
        LatLng::new(0.0, i as f64 * 0.001)
    }

    #[test]
    fn same_color_extends_current_segment() {
        let (mut t, mut map) = setup();
        for i in 0..4 {
            t.add_point(&mut map, p(i), false, None);
        }
        assert_eq!(t.segments().len(), 1);
        assert_eq!(t.point_count(), 4);
        assert_eq!(map.polylines().count(), 1);
        assert_eq!(map.polylines().next().unwrap().points.len(), 4);
        assert_eq!(t.current_line().unwrap().color, TracePalette::default().normal);
    }

    #[test]
    fn color_change_starts_new_segment_without_touching_old() {
        let (mut t, mut map) = setup();
        t.add_point(&mut map, p(0), false, None);
        t.add_point(&mut map, p(1), false, None);
        let before = t.segments()[0].clone();
        t.add_point(&mut map, p(2), true, None);
        t.add_point(&mut map, p(3), true, None);
        t.add_point(&mut map, p(4), false, None);

        assert_eq!(t.segments().len(), 3);
        assert_eq!(t.segments()[0], before);
        assert_eq!(t.segments()[1].color, TracePalette::default().alert);
        assert_eq!(t.segments()[1].points, vec![p(2), p(3)]);
        assert_eq!(t.point_count(), 5);
        // drawn alert line starts at the joint
        let alert_line = map
            .polylines()
            .find(|l| l.color == TracePalette::default().alert)
            .unwrap();
        assert_eq!(alert_line.points, vec![p(1), p(2), p(3)]);
    }

    #[test]
    fn explicit_color_overrides_palette() {
        let (mut t, mut map) = setup();
        t.add_point(&mut map, p(0), false, Some(0x123456));
        t.add_point(&mut map, p(1), false, None);
        assert_eq!(t.segments().len(), 2);
        assert_eq!(t.segments()[0].color, 0x123456);
    }

    #[test]
    fn remove_is_idempotent() {
        let (mut t, mut map) = setup();
        t.add_point(&mut map, p(0), false, None);
        t.add_point(&mut map, p(1), true, None);
        t.remove(&mut map);
        assert!(t.is_empty());
        assert!(map.is_empty());
        t.remove(&mut map);
        assert_eq!(t.segments().len(), 0);
        assert!(t.current_line().is_none());
    }
}
