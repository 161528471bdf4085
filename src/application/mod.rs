// Application layer - Feed orchestration, derivation and map reconciliation
pub mod demo_simulator;
pub mod fallback;
pub mod live_data_source;
pub mod map_reconciler;
pub mod map_sync;
pub mod payload;
pub mod position_index;
pub mod route_service;
pub mod transport;
