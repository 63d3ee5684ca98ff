//! Geometry helpers for place polygons and observation points
//!
//! All coordinates are WGS84 longitude/latitude in degrees. Place polygons are
//! exchanged as GeoJSON geometries; observation points are matched with a
//! tolerance grid and confirmed with a haversine distance.

use crate::{Error, Result};
use geo::{Distance, Haversine, Point};
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Value as JsonValue};
use serde::Serialize;

/// Meters per degree of latitude (spherical approximation)
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Default same-point tolerance in meters
pub const DEFAULT_TOLERANCE_M: f64 = 1.0;

/// Parse and validate a GeoJSON polygon geometry
///
/// Accepts a bare geometry object. The outer ring must be closed, have at
/// least four positions and hold valid longitude/latitude pairs.
pub fn parse_polygon(text: &str) -> Result<Geometry> {
    let geometry: Geometry = serde_json::from_str(text)
        .map_err(|e| Error::InvalidInput(format!("Invalid GeoJSON geometry: {}", e)))?;
    validate_polygon(&geometry)?;
    Ok(geometry)
}

pub fn validate_polygon(geometry: &Geometry) -> Result<()> {
    let rings = match &geometry.value {
        Value::Polygon(rings) => rings,
        _ => {
            return Err(Error::InvalidInput(
                "Expected Polygon geometry".to_string(),
            ))
        }
    };

    if rings.is_empty() {
        return Err(Error::InvalidInput("Polygon has no rings".to_string()));
    }

    for ring in rings {
        if ring.len() < 4 {
            return Err(Error::InvalidInput(format!(
                "Polygon ring needs at least 4 positions, got {}",
                ring.len()
            )));
        }
        for position in ring {
            let (lon, lat) = match position.as_slice() {
                [lon, lat, ..] => (*lon, *lat),
                _ => return Err(Error::InvalidInput("Position needs two coordinates".to_string())),
            };
            if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
                return Err(Error::InvalidInput(format!(
                    "Coordinate out of range: ({}, {})",
                    lon, lat
                )));
            }
        }
        if ring.first() != ring.last() {
            return Err(Error::InvalidInput("Polygon ring is not closed".to_string()));
        }
    }

    Ok(())
}

/// Axis-aligned bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

/// Bounding box of a polygon's outer ring
pub fn polygon_bounds(geometry: &Geometry) -> Option<Bounds> {
    let outer = match &geometry.value {
        Value::Polygon(rings) => rings.first()?,
        _ => return None,
    };

    let mut positions = outer.iter().filter(|p| p.len() >= 2);
    let first = positions.next()?;
    let mut bounds = Bounds {
        min_lon: first[0],
        min_lat: first[1],
        max_lon: first[0],
        max_lat: first[1],
    };
    for p in positions {
        bounds.min_lon = bounds.min_lon.min(p[0]);
        bounds.max_lon = bounds.max_lon.max(p[0]);
        bounds.min_lat = bounds.min_lat.min(p[1]);
        bounds.max_lat = bounds.max_lat.max(p[1]);
    }
    Some(bounds)
}

/// Wrap a polygon in the single-feature collection the imagery API expects
pub fn polygon_feature_collection(geometry: &Geometry) -> FeatureCollection {
    let feature = Feature {
        bbox: None,
        geometry: Some(geometry.clone()),
        id: None,
        properties: Some(Map::new()),
        foreign_members: None,
    };

    let mut members = Map::new();
    members.insert(
        "fileName".to_string(),
        JsonValue::String("User-Drawn-Polygon".to_string()),
    );

    FeatureCollection {
        bbox: None,
        features: vec![feature],
        foreign_members: Some(members),
    }
}

/// Great-circle distance in meters between two (lon, lat) points
pub fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    Haversine.distance(Point::new(a.0, a.1), Point::new(b.0, b.1))
}

/// Tolerance grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub row: i64,
    pub col: i64,
}

/// Equal-area-ish grid whose cell diagonal equals the match tolerance
///
/// Points sharing a cell are within the tolerance of each other. Points
/// within the tolerance always lie in one of the cells returned by
/// [`ToleranceGrid::candidate_cells`], so a lookup never misses a match.
/// Columns count eastwards from -180° and wrap at the antimeridian; the last
/// column of a row is narrower than the rest.
#[derive(Debug, Clone, Copy)]
pub struct ToleranceGrid {
    tolerance_m: f64,
    cell_deg: f64,
    reach: i64,
}

impl ToleranceGrid {
    pub fn new(tolerance_m: f64) -> Self {
        let side_m = tolerance_m / std::f64::consts::SQRT_2;
        Self {
            tolerance_m,
            cell_deg: side_m / METERS_PER_DEGREE,
            reach: (tolerance_m / side_m).ceil() as i64,
        }
    }

    pub fn tolerance_m(&self) -> f64 {
        self.tolerance_m
    }

    fn row_for(&self, lat: f64) -> i64 {
        (lat / self.cell_deg).floor() as i64
    }

    /// Longitude scale for a row, taken at the row's center latitude
    fn row_scale(&self, row: i64) -> f64 {
        let center_lat = (row as f64 + 0.5) * self.cell_deg;
        center_lat.to_radians().cos().max(1e-9)
    }

    /// Columns in one full turn of longitude on `row`
    fn column_count(&self, row: i64) -> i64 {
        ((360.0 * self.row_scale(row) / self.cell_deg).ceil() as i64).max(1)
    }

    fn col_for(&self, row: i64, lon: f64) -> i64 {
        let east = (lon + 180.0).rem_euclid(360.0);
        let col = (east * self.row_scale(row) / self.cell_deg).floor() as i64;
        col.min(self.column_count(row) - 1)
    }

    pub fn cell_for(&self, lon: f64, lat: f64) -> CellKey {
        let row = self.row_for(lat);
        CellKey {
            row,
            col: self.col_for(row, lon),
        }
    }

    /// Every cell that may hold a point within tolerance of (lon, lat)
    pub fn candidate_cells(&self, lon: f64, lat: f64) -> Vec<CellKey> {
        let row = self.row_for(lat);
        let width = (2 * self.reach + 1) as usize;
        let mut cells = Vec::with_capacity(width * width);
        for dr in -self.reach..=self.reach {
            let r = row + dr;
            // Column index depends on the row's scale, so recompute per row
            let c = self.col_for(r, lon);
            let columns = self.column_count(r);
            for dc in -self.reach..=self.reach {
                let col = (c + dc).rem_euclid(columns);
                let cell = CellKey { row: r, col };
                if !cells.contains(&cell) {
                    cells.push(cell);
                }
            }
        }
        cells
    }

    /// Haversine check against the configured tolerance
    pub fn within_tolerance(&self, a: (f64, f64), b: (f64, f64)) -> bool {
        haversine_m(a, b) <= self.tolerance_m
    }
}

impl Default for ToleranceGrid {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_M)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = r#"{"type":"Polygon","coordinates":[[[-64.5,-31.5],[-64.4,-31.5],[-64.4,-31.4],[-64.5,-31.4],[-64.5,-31.5]]]}"#;

    #[test]
    fn test_parse_polygon_and_bounds() {
        let geometry = parse_polygon(SQUARE).unwrap();
        let bounds = polygon_bounds(&geometry).unwrap();
        assert_eq!(bounds.min_lon, -64.5);
        assert_eq!(bounds.max_lon, -64.4);
        assert_eq!(bounds.min_lat, -31.5);
        assert_eq!(bounds.max_lat, -31.4);
    }

    #[test]
    fn test_parse_polygon_rejects_open_ring_and_points() {
        let open = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1]]]}"#;
        assert!(matches!(parse_polygon(open), Err(Error::InvalidInput(_))));

        let point = r#"{"type":"Point","coordinates":[0,0]}"#;
        assert!(matches!(parse_polygon(point), Err(Error::InvalidInput(_))));

        assert!(parse_polygon("not json").is_err());
    }

    #[test]
    fn test_feature_collection_carries_file_name() {
        let geometry = parse_polygon(SQUARE).unwrap();
        let fc = polygon_feature_collection(&geometry);
        let json = serde_json::to_value(&fc).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["fileName"], "User-Drawn-Polygon");
        assert_eq!(json["features"][0]["geometry"]["type"], "Polygon");
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_m((0.0, 0.0), (0.0, 1.0));
        assert!((d - 111_195.0).abs() < 100.0, "got {}", d);
    }

    #[test]
    fn test_points_within_tolerance_share_candidates() {
        let grid = ToleranceGrid::default();
        let a = (-64.45, -31.45);
        // ~0.5 m east
        let b = (-64.45 + 0.5 / (111_320.0 * (-31.45f64).to_radians().cos()), -31.45);
        assert!(grid.within_tolerance(a, b));
        let cell_b = grid.cell_for(b.0, b.1);
        assert!(grid.candidate_cells(a.0, a.1).contains(&cell_b));
    }

    #[test]
    fn test_points_beyond_tolerance_are_rejected() {
        let grid = ToleranceGrid::default();
        let a = (-64.45, -31.45);
        // ~30 m north, one HLS pixel
        let b = (-64.45, -31.45 + 30.0 / 111_320.0);
        assert!(!grid.within_tolerance(a, b));
        assert_ne!(grid.cell_for(a.0, a.1), grid.cell_for(b.0, b.1));
    }

    #[test]
    fn test_antimeridian_neighbours_share_candidates() {
        let grid = ToleranceGrid::default();
        // ~0.2 m apart across the 180° meridian
        let west = (179.999_999, 0.0);
        let east = (-179.999_999, 0.0);
        assert!(grid.within_tolerance(west, east));

        let cell_east = grid.cell_for(east.0, east.1);
        assert!(grid.candidate_cells(west.0, west.1).contains(&cell_east));
        let cell_west = grid.cell_for(west.0, west.1);
        assert!(grid.candidate_cells(east.0, east.1).contains(&cell_west));
    }

    #[test]
    fn test_same_cell_points_are_close() {
        let grid = ToleranceGrid::default();
        let a = (10.0, 45.0);
        let cell = grid.cell_for(a.0, a.1);
        let b = (10.0 + 1e-7, 45.0 + 1e-7);
        if grid.cell_for(b.0, b.1) == cell {
            assert!(grid.within_tolerance(a, b));
        }
    }
}
