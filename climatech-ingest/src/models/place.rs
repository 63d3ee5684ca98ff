//! Place (user-drawn area of interest)

use serde::{Deserialize, Serialize};

/// Stored place; `polygon` is a GeoJSON Polygon geometry (EPSG:4326)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Place {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub polygon: geojson::Geometry,
}

/// Validated input for creating a place
#[derive(Debug, Clone)]
pub struct NewPlace {
    pub name: String,
    pub description: String,
    pub polygon: geojson::Geometry,
}
