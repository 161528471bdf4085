// Map sync - feeds derived rows from the live feed into the map reconciler
use crate::application::live_data_source::{FeedMode, FeedSnapshot};
use crate::application::map_reconciler::{MapReconciler, MarkerId, RenderingSurface, RouteRequest};
use crate::application::position_index::{derive_rows, StatusPolicy};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Follow the feed until it closes.
///
/// The surface is attached on the first snapshot, whether or not the backend
/// has answered yet. A feed back at idle clears the selected route.
pub async fn follow_feed<S, F>(
    mut feed: watch::Receiver<FeedSnapshot>,
    map: Arc<Mutex<MapReconciler<S>>>,
    policy: StatusPolicy,
    mut make_surface: F,
) where
    S: RenderingSurface + 'static,
    F: FnMut() -> S,
{
    loop {
        let snapshot = feed.borrow_and_update().clone();
        let rows = derive_rows(&snapshot.devices, &snapshot.positions, Utc::now(), &policy);

        let pending = {
            let mut map = map.lock().await;
            if snapshot.mode == FeedMode::Idle {
                map.clear_selection();
            }
            if map.is_attached() {
                map.reconcile(rows);
                None
            } else {
                map.attach(make_surface(), rows)
            }
        };

        if let Some(request) = pending {
            let map = map.clone();
            tokio::spawn(async move { resolve_route(&map, request, Utc::now()).await });
        }

        if feed.changed().await.is_err() {
            tracing::debug!("Feed closed, map sync stopping");
            break;
        }
    }
}

/// Select a device on a shared map. The map is not locked while the route loads.
pub async fn select_on_map<S: RenderingSurface>(map: &Mutex<MapReconciler<S>>, device_id: i64, now: DateTime<Utc>) {
    let request = map.lock().await.begin_select(device_id);
    if let Some(request) = request {
        resolve_route(map, request, now).await;
    }
}

/// Select the device behind `marker`, if the marker is current.
pub async fn click_on_map<S: RenderingSurface>(
    map: &Mutex<MapReconciler<S>>,
    marker: MarkerId,
    now: DateTime<Utc>,
) -> Option<i64> {
    let (device_id, request) = {
        let mut map = map.lock().await;
        let device_id = map.marker_device(marker)?;
        (device_id, map.begin_select(device_id))
    };
    if let Some(request) = request {
        resolve_route(map, request, now).await;
    }
    Some(device_id)
}

async fn resolve_route<S: RenderingSurface>(map: &Mutex<MapReconciler<S>>, request: RouteRequest, now: DateTime<Utc>) {
    let result = request.fetch(now).await;
    map.lock().await.finish_select(request, result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::live_data_source::{FeedEndpoints, LiveDataSource};
    use crate::application::route_service::{RouteEndpoint, RouteService};
    use crate::application::transport::testing::ScriptedTransport;
    use crate::application::transport::AuthMode;
    use crate::domain::device::{Device, Position, PositionAttributes};
    use crate::domain::geo::LatLng;
    use crate::infrastructure::config::{BackendSettings, DemoSettings, MapSettings, PollingSettings};
    use crate::infrastructure::scene_surface::SceneSurface;
    use serde_json::json;
    use std::time::Duration;

    const ROUTE: &str = "http://proxy/api/reports/route";

    type SharedMap = Arc<Mutex<MapReconciler<SceneSurface>>>;

    fn backend() -> BackendSettings {
        BackendSettings {
            proxy_url: "http://proxy/api".to_string(),
            direct_url: "http://direct/api".to_string(),
            ..BackendSettings::default()
        }
    }

    fn shared_map(transport: &ScriptedTransport, auth: AuthMode) -> SharedMap {
        let routes = RouteService::new(
            Arc::new(transport.clone()),
            RouteEndpoint::from_settings(&backend()),
            chrono::Duration::hours(24),
        );
        Arc::new(Mutex::new(MapReconciler::new(routes, MapSettings::default(), auth)))
    }

    fn spawn_sync(feed: watch::Receiver<FeedSnapshot>, map: &SharedMap) -> tokio::task::JoinHandle<()> {
        tokio::spawn(follow_feed(feed, map.clone(), StatusPolicy::default(), || {
            SceneSurface::new(800, 600)
        }))
    }

    fn live_snapshot(device_ids: &[i64]) -> FeedSnapshot {
        FeedSnapshot {
            mode: FeedMode::Live,
            devices: device_ids
                .iter()
                .map(|id| Device::new(*id, format!("Device {}", id), ""))
                .collect(),
            positions: device_ids
                .iter()
                .map(|id| Position {
                    id: 100 + id,
                    device_id: *id,
                    latitude: 1.0 + *id as f64 * 0.01,
                    longitude: 2.0,
                    device_time: Utc::now().to_rfc3339(),
                    attributes: PositionAttributes::with_battery(80),
                })
                .collect(),
            updated_at: Some(Utc::now()),
            ..FeedSnapshot::default()
        }
    }

    fn route_json() -> serde_json::Value {
        json!([
            { "latitude": 1.0, "longitude": 2.0 },
            { "latitude": 1.01, "longitude": 2.01 }
        ])
    }

    fn marker_count(map: &MapReconciler<SceneSurface>) -> usize {
        map.surface().map(|s| s.scene().markers.len()).unwrap_or(0)
    }

    /// Polls the shared map for up to a second.
    async fn eventually(map: &SharedMap, check: impl Fn(&MapReconciler<SceneSurface>) -> bool) -> bool {
        for _ in 0..50 {
            if check(&*map.lock().await) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_demo_feed_reaches_the_map() {
        let transport = ScriptedTransport::new();
        let feed = LiveDataSource::new(
            Arc::new(transport.clone()),
            FeedEndpoints::from_settings(&backend()),
            PollingSettings::default(),
            DemoSettings::default(),
        );
        let map = shared_map(&transport, AuthMode::None);

        let sync = spawn_sync(feed.subscribe(), &map);
        feed.start(AuthMode::None);

        let expected = DemoSettings::default().device_count;
        assert!(eventually(&map, |m| marker_count(m) == expected).await);

        // Ending the session empties the device list and with it the markers
        feed.stop();
        assert!(eventually(&map, |m| marker_count(m) == 0).await);
        sync.abort();

        let scene = map.lock().await.surface().unwrap().scene();
        assert_eq!(scene.maps_created, 1);
    }

    #[tokio::test]
    async fn test_failing_live_backend_still_gets_a_map() {
        let transport = ScriptedTransport::new();
        let feed = LiveDataSource::new(
            Arc::new(transport.clone()),
            FeedEndpoints::from_settings(&backend()),
            PollingSettings::default(),
            DemoSettings::default(),
        );
        let map = shared_map(&transport, AuthMode::Session);

        let sync = spawn_sync(feed.subscribe(), &map);
        feed.start(AuthMode::Session);

        let mut rx = feed.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.error.is_some()))
            .await
            .expect("poll never failed")
            .expect("feed closed");
        assert!(eventually(&map, |m| m.is_attached()).await);

        let scene = map.lock().await.surface().unwrap().scene();
        let defaults = MapSettings::default();
        assert_eq!(scene.maps_created, 1);
        assert!(scene.markers.is_empty());
        assert_eq!(
            scene.viewport.map(|v| v.center),
            Some(LatLng::new(defaults.default_lat, defaults.default_lng))
        );
        assert!(feed.snapshot().updated_at.is_none());
        feed.stop();
        sync.abort();
    }

    #[tokio::test]
    async fn test_route_load_does_not_hold_back_markers() {
        let transport = ScriptedTransport::new().with_delay(Duration::from_millis(800));
        transport.respond(ROUTE, Ok(Some(route_json())));
        let map = shared_map(&transport, AuthMode::Session);

        let (tx, rx) = watch::channel(live_snapshot(&[1]));
        let sync = spawn_sync(rx, &map);
        assert!(eventually(&map, |m| marker_count(m) == 1).await);

        let selecting = tokio::spawn({
            let map = map.clone();
            async move { select_on_map(&map, 1, Utc::now()).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(map.lock().await.selected(), Some(1));

        tx.send(live_snapshot(&[1, 2])).unwrap();
        let started = tokio::time::Instant::now();
        assert!(eventually(&map, |m| marker_count(m) == 2).await);
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!selecting.is_finished());

        selecting.await.unwrap();
        let map = map.lock().await;
        assert_eq!(map.overlay_device(), Some(1));
        assert_eq!(map.surface().unwrap().scene().route.map(|r| r.points.len()), Some(2));
        sync.abort();
    }

    #[tokio::test]
    async fn test_marker_click_through_shared_map() {
        let transport = ScriptedTransport::new();
        transport.respond(ROUTE, Ok(Some(route_json())));
        let map = shared_map(&transport, AuthMode::Session);

        let (_tx, rx) = watch::channel(live_snapshot(&[3]));
        let sync = spawn_sync(rx, &map);
        assert!(eventually(&map, |m| marker_count(m) == 1).await);

        let marker = map.lock().await.surface().unwrap().scene().markers[0].id;
        assert_eq!(click_on_map(&map, marker, Utc::now()).await, Some(3));
        assert_eq!(click_on_map(&map, MarkerId(999), Utc::now()).await, None);
        assert_eq!(map.lock().await.overlay_device(), Some(3));
        sync.abort();
    }

    #[tokio::test]
    async fn test_idle_feed_clears_selected_route() {
        let transport = ScriptedTransport::new();
        transport.respond(ROUTE, Ok(Some(route_json())));
        let map = shared_map(&transport, AuthMode::Session);

        let (tx, rx) = watch::channel(live_snapshot(&[1]));
        let sync = spawn_sync(rx, &map);
        assert!(eventually(&map, |m| marker_count(m) == 1).await);

        select_on_map(&map, 1, Utc::now()).await;
        assert!(map.lock().await.surface().unwrap().scene().route.is_some());

        tx.send(FeedSnapshot::default()).unwrap();
        assert!(eventually(&map, |m| m.selected().is_none()).await);

        let map = map.lock().await;
        let scene = map.surface().unwrap().scene();
        assert!(scene.route.is_none());
        assert!(scene.markers.is_empty());
        assert_eq!(map.overlay_device(), None);
        sync.abort();
    }
}
