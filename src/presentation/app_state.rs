// Application state for HTTP handlers
use crate::application::live_data_source::LiveDataSource;
use crate::application::map_reconciler::MapReconciler;
use crate::application::position_index::StatusPolicy;
use crate::infrastructure::scene_surface::SceneSurface;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub feed: LiveDataSource,
    pub map: Arc<Mutex<MapReconciler<SceneSurface>>>,
    pub status_policy: StatusPolicy,
}
