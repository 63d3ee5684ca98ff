//! Test helper utilities
//!
//! Shared fixtures for climatech-ingest integration tests

#![allow(dead_code)]

pub mod fake_services;
pub mod geotiff;

pub use fake_services::{FakeHotspots, FakeImagery};
pub use geotiff::{band_file_name, write_band_tiff, RasterFixture};

use climatech_common::geometry::parse_polygon;
use climatech_ingest::db::places::insert_place;
use climatech_ingest::models::NewPlace;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Square around the fixture rasters (lon -64.0..-63.9, lat -31.0..-30.9)
pub const TEST_POLYGON: &str = r#"{
    "type": "Polygon",
    "coordinates": [[[-64.0, -31.0], [-63.9, -31.0], [-63.9, -30.9], [-64.0, -30.9], [-64.0, -31.0]]]
}"#;

/// File-backed database in a temporary root folder
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for the test.
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = climatech_ingest::db::init_database(&temp_dir.path().join("climatech.db"))
        .await
        .unwrap();
    std::fs::create_dir_all(temp_dir.path().join("downloads")).unwrap();
    (temp_dir, pool)
}

pub async fn create_test_place(pool: &SqlitePool, name: &str) -> i64 {
    let place = NewPlace {
        name: name.to_string(),
        description: "test area".to_string(),
        polygon: parse_polygon(TEST_POLYGON).unwrap(),
    };
    insert_place(pool, &place).await.unwrap()
}

pub async fn record_count(pool: &SqlitePool, place_id: i64) -> i64 {
    climatech_ingest::db::observations::count_for_place(pool, place_id)
        .await
        .unwrap()
}
