// Geographic primitives used by the map layer
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Builds a coordinate only when both parts are present and finite.
    pub fn finite(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some(Self { lat, lng }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    /// Smallest box containing every point, `None` for an empty slice.
    pub fn from_points(points: &[LatLng]) -> Option<Self> {
        let first = points.first()?;
        let initial = Self {
            south: first.lat,
            west: first.lng,
            north: first.lat,
            east: first.lng,
        };
        Some(points[1..].iter().fold(initial, |bounds, p| Self {
            south: bounds.south.min(p.lat),
            west: bounds.west.min(p.lng),
            north: bounds.north.max(p.lat),
            east: bounds.east.max(p.lng),
        }))
    }

    /// Grows the box by `ratio` of its span on every side.
    pub fn pad(&self, ratio: f64) -> Self {
        let lat_pad = (self.north - self.south) * ratio;
        let lng_pad = (self.east - self.west) * ratio;
        Self {
            south: self.south - lat_pad,
            west: self.west - lng_pad,
            north: self.north + lat_pad,
            east: self.east + lng_pad,
        }
    }

    pub fn contains(&self, point: LatLng) -> bool {
        (self.south..=self.north).contains(&point.lat) && (self.west..=self.east).contains(&point.lng)
    }

    pub fn center(&self) -> LatLng {
        LatLng::new((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: f64,
}
