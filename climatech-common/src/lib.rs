//! # Climatech Common Library
//!
//! Shared code for the climatech services including:
//! - Error and result types
//! - Configuration loading (TOML + environment) and root folder resolution
//! - Database initialization for the spatial store
//! - Geometry helpers (GeoJSON polygons, geodesic distance, tolerance grid)
//! - Date utilities for satellite product naming

pub mod config;
pub mod db;
pub mod error;
pub mod geometry;
pub mod time;

pub use error::{Error, Result};
