// Domain layer - Tracking entities, derived view state and map geometry
pub mod device;
pub mod geo;
pub mod view;
