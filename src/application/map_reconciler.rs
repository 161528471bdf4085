// Map reconciler - keeps markers, viewport and route overlay in step with derived rows
use crate::application::fallback::FallbackError;
use crate::application::route_service::RouteService;
use crate::application::transport::AuthMode;
use crate::domain::geo::{Bounds, LatLng, Viewport};
use crate::domain::view::DerivedRow;
use crate::infrastructure::config::MapSettings;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const MARKER_RADIUS: f64 = 8.0;
pub const ROUTE_COLOR: &str = "#2563eb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OverlayId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSpec {
    pub device_id: i64,
    pub position: LatLng,
    pub color: &'static str,
    pub radius: f64,
    pub popup: String,
}

/// Drawing capabilities of the map surface.
pub trait RenderingSurface: Send {
    fn create_map(&mut self, center: LatLng, zoom: f64);
    fn viewport(&self) -> Option<Viewport>;
    fn set_view(&mut self, center: LatLng, zoom: f64);
    fn fit_bounds(&mut self, bounds: Bounds);
    fn add_marker(&mut self, marker: MarkerSpec) -> MarkerId;
    fn remove_marker(&mut self, id: MarkerId);
    fn draw_polyline(&mut self, points: &[LatLng], color: &str) -> OverlayId;
    fn remove_polyline(&mut self, id: OverlayId);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewportFit {
    Unchanged,
    Center { center: LatLng, zoom: f64 },
    Bounds(Bounds),
}

/// How the viewport follows the valid marker positions.
pub fn viewport_fit(points: &[LatLng], settings: &MapSettings) -> ViewportFit {
    match points {
        [] => ViewportFit::Unchanged,
        [only] => ViewportFit::Center {
            center: *only,
            zoom: settings.single_zoom,
        },
        _ => match Bounds::from_points(points) {
            Some(bounds) => ViewportFit::Bounds(bounds.pad(settings.fit_padding)),
            None => ViewportFit::Unchanged,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RouteOverlay {
    device_id: i64,
    id: OverlayId,
}

/// A route lookup issued by the reconciler, resolved without holding the map.
///
/// The result is only drawn if no newer selection was made in the meantime.
#[derive(Clone)]
pub struct RouteRequest {
    token: u64,
    device_id: i64,
    routes: RouteService,
    auth: AuthMode,
}

impl RouteRequest {
    pub fn device_id(&self) -> i64 {
        self.device_id
    }

    pub async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<LatLng>, FallbackError> {
        self.routes.fetch_route(self.device_id, &self.auth, now).await
    }
}

pub struct MapReconciler<S: RenderingSurface> {
    surface: Option<S>,
    settings: MapSettings,
    routes: RouteService,
    auth: AuthMode,
    rows: Vec<DerivedRow>,
    markers: Vec<(MarkerId, i64)>,
    selected: Option<i64>,
    selection_token: u64,
    overlay: Option<RouteOverlay>,
    notice: Option<String>,
}

impl<S: RenderingSurface> MapReconciler<S> {
    pub fn new(routes: RouteService, settings: MapSettings, auth: AuthMode) -> Self {
        Self {
            surface: None,
            settings,
            routes,
            auth,
            rows: Vec::new(),
            markers: Vec::new(),
            selected: None,
            selection_token: 0,
            overlay: None,
            notice: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn selected(&self) -> Option<i64> {
        self.selected
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn overlay_device(&self) -> Option<i64> {
        self.overlay.map(|overlay| overlay.device_id)
    }

    /// Create the map once and draw `rows` on it. A second attach is ignored.
    ///
    /// A device selected before the map existed gets its route requested now.
    pub fn attach(&mut self, mut surface: S, rows: Vec<DerivedRow>) -> Option<RouteRequest> {
        if self.surface.is_some() {
            tracing::warn!("Map already attached, ignoring new surface");
            return None;
        }

        let center = rows
            .iter()
            .find_map(|row| LatLng::finite(row.lat, row.lng))
            .unwrap_or_else(|| LatLng::new(self.settings.default_lat, self.settings.default_lng));
        surface.create_map(center, self.settings.initial_zoom);
        tracing::info!("Map created at {:.5}, {:.5}", center.lat, center.lng);

        self.surface = Some(surface);
        self.rows.clear();
        self.place_markers(rows);

        let device_id = self.selected?;
        self.issue_route_request(device_id)
    }

    /// Remove everything this reconciler drew and hand the surface back.
    pub fn detach(&mut self) -> Option<S> {
        let mut surface = self.surface.take()?;
        for (id, _) in self.markers.drain(..) {
            surface.remove_marker(id);
        }
        if let Some(overlay) = self.overlay.take() {
            surface.remove_polyline(overlay.id);
        }
        self.rows.clear();
        Some(surface)
    }

    /// Replace the marker set with one marker per row with finite coordinates.
    pub fn reconcile(&mut self, rows: Vec<DerivedRow>) {
        if self.surface.is_none() {
            self.rows = rows;
            return;
        }
        if rows == self.rows {
            return;
        }
        self.place_markers(rows);
    }

    fn place_markers(&mut self, rows: Vec<DerivedRow>) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };

        for (id, _) in self.markers.drain(..) {
            surface.remove_marker(id);
        }

        let mut points = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(position) = LatLng::finite(row.lat, row.lng) else {
                continue;
            };
            let id = surface.add_marker(MarkerSpec {
                device_id: row.device_id,
                position,
                color: row.status.color(),
                radius: MARKER_RADIUS,
                popup: row.popup_text(),
            });
            self.markers.push((id, row.device_id));
            points.push(position);
        }

        match viewport_fit(&points, &self.settings) {
            ViewportFit::Unchanged => {
                if let Some(viewport) = surface.viewport() {
                    tracing::debug!(
                        "No valid positions, keeping view at {:.5}, {:.5} z{}",
                        viewport.center.lat,
                        viewport.center.lng,
                        viewport.zoom
                    );
                }
            }
            ViewportFit::Center { center, zoom } => surface.set_view(center, zoom),
            ViewportFit::Bounds(bounds) => surface.fit_bounds(bounds),
        }

        tracing::debug!("Placed {} markers for {} rows", self.markers.len(), rows.len());
        self.rows = rows;
    }

    /// Device behind a marker, if the marker is current.
    pub fn marker_device(&self, marker: MarkerId) -> Option<i64> {
        self.markers
            .iter()
            .find(|(id, _)| *id == marker)
            .map(|(_, device_id)| *device_id)
    }

    /// Select a device. The previous route overlay is retired before the new
    /// route is requested; the request is returned for the caller to resolve
    /// and hand back to [`MapReconciler::finish_select`].
    ///
    /// Re-selecting the current device is a no-op. Without a map the selection
    /// is only recorded, and [`MapReconciler::attach`] issues the request.
    pub fn begin_select(&mut self, device_id: i64) -> Option<RouteRequest> {
        if self.selected == Some(device_id) {
            return None;
        }
        self.selected = Some(device_id);
        self.issue_route_request(device_id)
    }

    /// Draw a resolved route. Returns false if the request was superseded.
    pub fn finish_select(
        &mut self,
        request: RouteRequest,
        result: Result<Vec<LatLng>, FallbackError>,
    ) -> bool {
        if request.token != self.selection_token {
            tracing::debug!("Dropping superseded route for device {}", request.device_id);
            return false;
        }
        let Some(surface) = self.surface.as_mut() else {
            return false;
        };

        match result {
            Ok(points) if points.len() >= 2 => {
                let id = surface.draw_polyline(&points, ROUTE_COLOR);
                self.overlay = Some(RouteOverlay {
                    device_id: request.device_id,
                    id,
                });
            }
            Ok(points) => {
                tracing::debug!(
                    "Route for device {} has {} points, nothing to draw",
                    request.device_id,
                    points.len()
                );
            }
            Err(e) => {
                tracing::warn!("Route for device {} unavailable: {}", request.device_id, e);
                self.notice = Some(format!("Route unavailable: {}", e));
            }
        }
        true
    }

    /// Forget the selection and remove its route. Pending route requests are dropped.
    pub fn clear_selection(&mut self) {
        if self.selected.take().is_some() {
            tracing::debug!("Selection cleared");
        }
        self.selection_token += 1;
        self.notice = None;
        self.retire_overlay();
    }

    fn issue_route_request(&mut self, device_id: i64) -> Option<RouteRequest> {
        self.selection_token += 1;
        self.notice = None;
        self.retire_overlay();

        if self.surface.is_none() {
            return None;
        }
        Some(RouteRequest {
            token: self.selection_token,
            device_id,
            routes: self.routes.clone(),
            auth: self.auth.clone(),
        })
    }

    fn retire_overlay(&mut self) {
        if let Some(overlay) = self.overlay.take() {
            if let Some(surface) = self.surface.as_mut() {
                surface.remove_polyline(overlay.id);
            }
        }
    }
}
