//! Clustering facade: decides which markers are drawn individually and which
//! are collapsed into a count bubble.
//!
//! Every change clears the whole display set and re-adds it. Markers are never
//! recreated here, only shown or hidden.

use crate::config::ClusterConfig;
use crate::map_host::{CircleShape, MapHost, Shape, ShapeId};
use crate::marker::MarkerEngine;
use crate::types::{LatLng, PixelPoint, VehicleId};
use std::collections::BTreeMap;

const CLUSTER_COLOR: u32 = 0x3949ab;

/// A group of markers drawn as one bubble.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub center: LatLng,
    pub members: Vec<VehicleId>,
    shape: Option<ShapeId>,
}

#[derive(Debug)]
pub struct ClusterFacade {
    config: ClusterConfig,
    /// Ids passed to the last rebuild
    visible: Vec<VehicleId>,
    clusters: Vec<Cluster>,
}

impl ClusterFacade {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            visible: Vec::new(),
            clusters: Vec::new(),
        }
    }

    pub fn visible(&self) -> &[VehicleId] {
        &self.visible
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// True when markers are grouped at `zoom`.
    pub fn is_grouping(&self, zoom: f64) -> bool {
        self.config.enabled && zoom < self.config.disable_at_zoom
    }

    /// Replace the display set with `visible`. Ids without a marker are
    /// ignored.
    pub fn rebuild(
        &mut self,
        visible: &[VehicleId],
        markers: &mut BTreeMap<VehicleId, MarkerEngine>,
        host: &mut dyn MapHost,
    ) {
        self.clear(markers, host);
        self.visible = visible
            .iter()
            .filter(|id| markers.contains_key(*id))
            .cloned()
            .collect();

        if !self.is_grouping(host.zoom()) {
            for id in &self.visible {
                if let Some(m) = markers.get_mut(id) {
                    m.set_displayed(true, host);
                }
            }
            return;
        }

        // greedy: join the first group whose seed is within `cell_px`
        let radius = self.config.cell_px.max(1.0);
        let mut groups: Vec<(PixelPoint, Vec<VehicleId>)> = Vec::new();
        for id in &self.visible {
            let Some(m) = markers.get(id) else {
                continue;
            };
            let px = host.project(m.position());
            match groups
                .iter_mut()
                .find(|(seed, _)| (*seed - px).norm() <= radius)
            {
                Some((_, members)) => members.push(id.clone()),
                None => groups.push((px, vec![id.clone()])),
            }
        }

        for (_, members) in groups {
            if let [single] = members.as_slice() {
                if let Some(m) = markers.get_mut(single) {
                    m.set_displayed(true, host);
                }
                continue;
            }
            let n = members.len() as f64;
            let (lat, lng) = members
                .iter()
                .filter_map(|id| markers.get(id))
                .fold((0.0, 0.0), |(la, ln), m| {
                    (la + m.position().lat, ln + m.position().lng)
                });
            let center = LatLng::new(lat / n, lng / n);
            let shape = host.add_shape(Shape::Circle(CircleShape {
                center,
                radius_px: 14.0 + 4.0 * n.log10(),
                color: CLUSTER_COLOR,
                label: Some(members.len().to_string()),
            }));
            self.clusters.push(Cluster {
                center,
                members,
                shape: Some(shape),
            });
        }
    }

    /// Hide every marker this facade showed and drop the bubbles.
    pub fn clear(&mut self, markers: &mut BTreeMap<VehicleId, MarkerEngine>, host: &mut dyn MapHost) {
        for id in self.visible.drain(..) {
            if let Some(m) = markers.get_mut(&id) {
                m.set_displayed(false, host);
            }
        }
        for c in self.clusters.drain(..) {
            if let Some(id) = c.shape {
                host.remove_shape(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Viewport;
    use crate::icons::MarkerStatus;
    use crate::map_host::HeadlessMap;
    use crate::marker::MarkerOptions;

    fn markers(points: &[(&str, f64, f64)]) -> BTreeMap<VehicleId, MarkerEngine> {
        points
            .iter()
            .map(|&(id, lat, lng)| {
                let id = VehicleId::new(id);
                let m = MarkerEngine::new(
                    id.clone(),
                    LatLng::new(lat, lng),
                    None,
                    MarkerStatus::Running,
                    MarkerOptions::default(),
                );
                (id, m)
            })
            .collect()
    }

    fn ids(v: &[&str]) -> Vec<VehicleId> {
        v.iter().map(|s| VehicleId::new(*s)).collect()
    }

    #[test]
    fn close_zoom_shows_everything_individually() {
        let mut map = HeadlessMap::new(Viewport::new(LatLng::new(12.97, 77.59), 16.0, 800.0, 600.0));
        let mut ms = markers(&[("a", 12.97, 77.59), ("b", 12.9701, 77.5901)]);
        let mut facade = ClusterFacade::new(ClusterConfig::default());
        facade.rebuild(&ids(&["a", "b", "ghost"]), &mut ms, &mut map);
        assert_eq!(facade.visible(), ids(&["a", "b"]).as_slice());
        assert_eq!(map.markers().count(), 2);
        assert!(facade.clusters().is_empty());
    }

    #[test]
    fn far_zoom_groups_neighbours() {
        let mut map = HeadlessMap::new(Viewport::new(LatLng::new(12.97, 77.59), 10.0, 800.0, 600.0));
        let mut ms = markers(&[("a", 12.97, 77.59), ("b", 12.9701, 77.5901), ("c", 13.1, 77.8)]);
        let mut facade = ClusterFacade::new(ClusterConfig::default());
        facade.rebuild(&ids(&["a", "b", "c"]), &mut ms, &mut map);
        assert_eq!(facade.clusters().len(), 1);
        assert_eq!(facade.clusters()[0].members, ids(&["a", "b"]));
        assert_eq!(map.circles().next().unwrap().label.as_deref(), Some("2"));
        assert_eq!(map.markers().count(), 1);
        assert!(!ms[&VehicleId::new("a")].is_displayed());
    }

    #[test]
    fn neighbours_across_a_grid_line_still_group() {
        let view = Viewport::new(LatLng::new(12.97, 77.59), 10.0, 800.0, 600.0);
        let mut map = HeadlessMap::new(view);
        let cell = ClusterConfig::default().cell_px;
        // two markers a fraction of a pixel apart, straddling a multiple of cell_px
        let edge = view.unproject(PixelPoint::new(400.0, cell * 5.0));
        let above = view.unproject(PixelPoint::new(400.0, cell * 5.0 - 0.07));
        let mut ms = markers(&[("a", edge.lat, edge.lng), ("b", above.lat, above.lng)]);
        let mut facade = ClusterFacade::new(ClusterConfig::default());
        facade.rebuild(&ids(&["a", "b"]), &mut ms, &mut map);
        assert_eq!(facade.clusters().len(), 1);
        assert_eq!(map.markers().count(), 0);
    }

    #[test]
    fn rebuild_clears_previous_set() {
        let mut map = HeadlessMap::new(Viewport::new(LatLng::new(12.97, 77.59), 16.0, 800.0, 600.0));
        let mut ms = markers(&[("a", 12.97, 77.59), ("b", 12.9701, 77.5901)]);
        let mut facade = ClusterFacade::new(ClusterConfig::default());
        facade.rebuild(&ids(&["a", "b"]), &mut ms, &mut map);
        facade.rebuild(&ids(&["b"]), &mut ms, &mut map);
        assert_eq!(map.markers().count(), 1);
        assert!(!ms[&VehicleId::new("a")].is_attached());
        facade.clear(&mut ms, &mut map);
        assert!(map.is_empty());
    }
}
