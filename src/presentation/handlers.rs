// HTTP request handlers
use crate::application::live_data_source::{FeedMode, PollOutcome};
use crate::application::map_reconciler::{MapReconciler, MarkerId};
use crate::application::map_sync::{click_on_map, select_on_map};
use crate::application::position_index::derive_rows;
use crate::domain::view::DerivedRow;
use crate::infrastructure::scene_surface::{Scene, SceneSurface};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatus {
    pub mode: FeedMode,
    pub loading: bool,
    pub error: Option<String>,
    pub device_count: usize,
    pub position_count: usize,
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub outcome: PollOutcome,
}

#[derive(Debug, Serialize)]
pub struct MapView {
    pub scene: Option<Scene>,
    pub selected: Option<i64>,
    pub notice: Option<String>,
}

impl MapView {
    fn of(map: &MapReconciler<SceneSurface>) -> Self {
        Self {
            scene: map.surface().map(SceneSurface::scene),
            selected: map.selected(),
            notice: map.notice().map(str::to_string),
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Derived per-device rows for tables and lists
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DerivedRow>> {
    let snapshot = state.feed.snapshot();
    Json(derive_rows(
        &snapshot.devices,
        &snapshot.positions,
        Utc::now(),
        &state.status_policy,
    ))
}

pub async fn feed_status(State(state): State<Arc<AppState>>) -> Json<FeedStatus> {
    let snapshot = state.feed.snapshot();
    Json(FeedStatus {
        mode: snapshot.mode,
        loading: snapshot.loading,
        error: snapshot.error,
        device_count: snapshot.devices.len(),
        position_count: snapshot.positions.len(),
        updated_at: snapshot
            .updated_at
            .map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true)),
    })
}

/// Manual poll; skipped while another poll is in flight
pub async fn refresh(State(state): State<Arc<AppState>>) -> Json<RefreshResponse> {
    let outcome = state.feed.refresh().await;
    tracing::info!("Manual refresh: {:?}", outcome);
    Json(RefreshResponse { outcome })
}

pub async fn map_view(State(state): State<Arc<AppState>>) -> Json<MapView> {
    let map = state.map.lock().await;
    Json(MapView::of(&map))
}

pub async fn select_device(
    Path(device_id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> Json<MapView> {
    select_on_map(&state.map, device_id, Utc::now()).await;
    let map = state.map.lock().await;
    Json(MapView::of(&map))
}

pub async fn click_marker(
    Path(marker_id): Path<u64>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<MapView>, StatusCode> {
    match click_on_map(&state.map, MarkerId(marker_id), Utc::now()).await {
        Some(_) => {
            let map = state.map.lock().await;
            Ok(Json(MapView::of(&map)))
        }
        None => Err(StatusCode::NOT_FOUND),
    }
}
