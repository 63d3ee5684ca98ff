//! HTTP API handlers

pub mod health;
pub mod ndvi;
pub mod places;
pub mod wildfires;

pub use health::health_routes;
pub use ndvi::ndvi_routes;
pub use places::place_routes;
pub use wildfires::wildfire_routes;
