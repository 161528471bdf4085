// Headless rendering surface that records what the map shows
use crate::application::map_reconciler::{MarkerId, MarkerSpec, OverlayId, RenderingSurface};
use crate::domain::geo::{Bounds, LatLng, Viewport};
use serde::Serialize;
use std::collections::BTreeMap;
use std::f64::consts::PI;

const TILE_SIZE: f64 = 256.0;
const MIN_ZOOM: f64 = 0.0;
const MAX_ZOOM: f64 = 18.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneMarker {
    pub id: MarkerId,
    #[serde(flatten)]
    pub spec: MarkerSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenePolyline {
    pub id: OverlayId,
    pub color: String,
    pub points: Vec<LatLng>,
}

/// Serializable picture of the map for the browser front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub viewport: Option<Viewport>,
    pub maps_created: u32,
    pub markers: Vec<SceneMarker>,
    pub route: Option<ScenePolyline>,
}

#[derive(Debug)]
pub struct SceneSurface {
    width_px: f64,
    height_px: f64,
    viewport: Option<Viewport>,
    maps_created: u32,
    markers: BTreeMap<MarkerId, MarkerSpec>,
    route: Option<ScenePolyline>,
    next_id: u64,
}

impl SceneSurface {
    pub fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px: f64::from(width_px.max(1)),
            height_px: f64::from(height_px.max(1)),
            viewport: None,
            maps_created: 0,
            markers: BTreeMap::new(),
            route: None,
            next_id: 0,
        }
    }

    pub fn scene(&self) -> Scene {
        Scene {
            viewport: self.viewport,
            maps_created: self.maps_created,
            markers: self
                .markers
                .iter()
                .map(|(id, spec)| SceneMarker {
                    id: *id,
                    spec: spec.clone(),
                })
                .collect(),
            route: self.route.clone(),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Highest zoom at which `bounds` fits the viewport in Web Mercator.
    fn zoom_for(&self, bounds: &Bounds) -> f64 {
        let lng_fraction = ((bounds.east - bounds.west) / 360.0).max(f64::EPSILON);
        let lat_fraction = (mercator_y(bounds.north) - mercator_y(bounds.south))
            .abs()
            .max(f64::EPSILON);

        let zoom_x = (self.width_px / (TILE_SIZE * lng_fraction)).log2();
        let zoom_y = (self.height_px / (TILE_SIZE * lat_fraction)).log2();
        zoom_x.min(zoom_y).floor().clamp(MIN_ZOOM, MAX_ZOOM)
    }
}

/// Latitude as a fraction of the Mercator world height.
fn mercator_y(lat: f64) -> f64 {
    let sin = lat.clamp(-85.0511, 85.0511).to_radians().sin();
    ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)
}

impl RenderingSurface for SceneSurface {
    fn create_map(&mut self, center: LatLng, zoom: f64) {
        self.maps_created += 1;
        self.viewport = Some(Viewport { center, zoom });
    }

    fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    fn set_view(&mut self, center: LatLng, zoom: f64) {
        self.viewport = Some(Viewport {
            center,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
        });
    }

    fn fit_bounds(&mut self, bounds: Bounds) {
        let zoom = self.zoom_for(&bounds);
        self.viewport = Some(Viewport {
            center: bounds.center(),
            zoom,
        });
    }

    fn add_marker(&mut self, marker: MarkerSpec) -> MarkerId {
        let id = MarkerId(self.next_id());
        self.markers.insert(id, marker);
        id
    }

    fn remove_marker(&mut self, id: MarkerId) {
        self.markers.remove(&id);
    }

    fn draw_polyline(&mut self, points: &[LatLng], color: &str) -> OverlayId {
        let id = OverlayId(self.next_id());
        self.route = Some(ScenePolyline {
            id,
            color: color.to_string(),
            points: points.to_vec(),
        });
        id
    }

    fn remove_polyline(&mut self, id: OverlayId) {
        if self.route.as_ref().is_some_and(|route| route.id == id) {
            self.route = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(device_id: i64) -> MarkerSpec {
        MarkerSpec {
            device_id,
            position: LatLng::new(1.0, 2.0),
            color: "#16a34a",
            radius: 8.0,
            popup: String::new(),
        }
    }

    #[test]
    fn test_markers_are_recorded_and_removed() {
        let mut surface = SceneSurface::new(800, 600);
        let a = surface.add_marker(marker(1));
        let b = surface.add_marker(marker(2));
        assert_ne!(a, b);

        surface.remove_marker(a);
        let scene = surface.scene();
        assert_eq!(scene.markers.len(), 1);
        assert_eq!(scene.markers[0].spec.device_id, 2);
    }

    #[test]
    fn test_fit_bounds_zoom() {
        let mut surface = SceneSurface::new(1024, 640);
        surface.fit_bounds(Bounds { south: -85.0, west: -180.0, north: 85.0, east: 180.0 });
        let world = surface.viewport().unwrap();
        assert!(world.zoom <= 2.0);

        surface.fit_bounds(Bounds { south: -23.57, west: -46.67, north: -23.55, east: -46.64 });
        let city = surface.viewport().unwrap();
        assert!(city.zoom > 10.0 && city.zoom <= MAX_ZOOM);
        assert!((city.center.lat - -23.56).abs() < 1e-9);
    }

    #[test]
    fn test_only_current_route_is_removed() {
        let mut surface = SceneSurface::new(800, 600);
        let first = surface.draw_polyline(&[LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0)], "#000");
        let second = surface.draw_polyline(&[LatLng::new(2.0, 2.0), LatLng::new(3.0, 3.0)], "#000");

        surface.remove_polyline(first);
        assert_eq!(surface.scene().route.map(|r| r.id), Some(second));

        surface.remove_polyline(second);
        assert!(surface.scene().route.is_none());
    }

    #[test]
    fn test_scene_serializes_for_frontend() {
        let mut surface = SceneSurface::new(800, 600);
        surface.create_map(LatLng::new(1.0, 2.0), 13.0);
        surface.add_marker(marker(7));

        let value = serde_json::to_value(surface.scene()).unwrap();
        assert_eq!(value["mapsCreated"], 1);
        assert_eq!(value["viewport"]["zoom"], 13.0);
        assert_eq!(value["markers"][0]["deviceId"], 7);
    }
}
