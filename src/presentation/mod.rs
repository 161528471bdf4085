// Presentation layer - HTTP API over the feed and the map scene
pub mod app_state;
pub mod handlers;
