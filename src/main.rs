// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::live_data_source::{FeedEndpoints, LiveDataSource};
use crate::application::map_reconciler::MapReconciler;
use crate::application::map_sync::follow_feed;
use crate::application::route_service::{RouteEndpoint, RouteService};
use crate::application::transport::Transport;
use crate::infrastructure::config::load_tracker_config;
use crate::infrastructure::http_transport::HttpTransport;
use crate::infrastructure::scene_surface::SceneSurface;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    click_marker, feed_status, health_check, list_devices, map_view, refresh, select_device,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_tracker_config()?;
    let auth = config.auth.auth_mode()?;

    // Create transport (infrastructure layer)
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.auth, &config.backend)?);

    // Create feed and map services (application layer)
    let feed = LiveDataSource::new(
        transport.clone(),
        FeedEndpoints::from_settings(&config.backend),
        config.polling.clone(),
        config.demo.clone(),
    );
    let routes = RouteService::new(
        transport,
        RouteEndpoint::from_settings(&config.backend),
        chrono::Duration::hours(config.map.route_window_hours),
    );
    let map = Arc::new(Mutex::new(MapReconciler::new(routes, config.map.clone(), auth.clone())));
    let status_policy = config.status.policy();

    let (width, height) = (config.map.viewport_width_px, config.map.viewport_height_px);
    tokio::spawn(follow_feed(feed.subscribe(), map.clone(), status_policy, move || {
        SceneSurface::new(width, height)
    }));
    feed.start(auth);

    // Create application state
    let state = Arc::new(AppState {
        feed: feed.clone(),
        map,
        status_policy,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/devices", get(list_devices))
        .route("/feed", get(feed_status))
        .route("/refresh", post(refresh))
        .route("/map", get(map_view))
        .route("/map/select/:device_id", post(select_device))
        .route("/map/markers/:marker_id/click", post(click_marker))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid server.bind address: {}", config.server.bind))?;
    tracing::info!("Starting carewatch-live on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    feed.stop();
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
