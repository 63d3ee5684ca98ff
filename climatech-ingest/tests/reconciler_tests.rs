//! Store-level tests for reconciliation, NDVI and the freshness gate

mod helpers;

use chrono::NaiveDate;
use climatech_common::geometry::ToleranceGrid;
use climatech_common::time::days_before;
use climatech_ingest::db::observations::heatmap;
use climatech_ingest::models::{Band, BandTarget, ExtractedPoint};
use climatech_ingest::services::freshness::recent_capture;
use climatech_ingest::services::{reconcile_point, reconcile_points, update_place_ndvi};
use helpers::{create_test_db, create_test_place, record_count};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

const LON: f64 = -63.95;
const LAT: f64 = -30.95;

fn capture_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 6, 2).unwrap()
}

fn point(band: Band, lon: f64, lat: f64, value: f64) -> ExtractedPoint {
    ExtractedPoint {
        band,
        capture_date: capture_date(),
        latitude: lat,
        longitude: lon,
        value,
    }
}

async fn band_value(pool: &SqlitePool, place_id: i64, band: Band) -> Option<f64> {
    let row = sqlx::query(
        "SELECT * FROM harmonized_landsat_sentinel_data WHERE place_id = ? ORDER BY id LIMIT 1",
    )
    .bind(place_id)
    .fetch_one(pool)
    .await
    .unwrap();

    match band.target() {
        BandTarget::Column(column) => row.get(column),
        BandTarget::Additional(key) => {
            let text: String = row.get("additional_data");
            let map: Value = serde_json::from_str(&text).unwrap();
            map.get(key).and_then(Value::as_f64)
        }
    }
}

#[tokio::test]
async fn test_same_point_twice_keeps_one_record_with_latest_value() {
    let (_root, pool) = create_test_db().await;
    let place_id = create_test_place(&pool, "Sierras").await;
    let grid = ToleranceGrid::default();

    let first = reconcile_point(&pool, place_id, &point(Band::B04, LON, LAT, 0.2), &grid)
        .await
        .unwrap();
    assert_eq!(first.inserted, 1);

    let second = reconcile_point(&pool, place_id, &point(Band::B04, LON, LAT, 0.25), &grid)
        .await
        .unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 1);

    assert_eq!(record_count(&pool, place_id).await, 1);
    assert_eq!(band_value(&pool, place_id, Band::B04).await, Some(0.25));
}

#[tokio::test]
async fn test_each_band_populates_only_its_field() {
    let (_root, pool) = create_test_db().await;
    let grid = ToleranceGrid::default();

    for band in Band::ALL {
        let place_id = create_test_place(&pool, band.code()).await;
        reconcile_point(&pool, place_id, &point(band, LON, LAT, 7.0), &grid)
            .await
            .unwrap();

        for other in Band::ALL {
            let expected = (other == band).then_some(7.0);
            assert_eq!(
                band_value(&pool, place_id, other).await,
                expected,
                "writing {} touched {}",
                band,
                other
            );
        }
    }
}

#[tokio::test]
async fn test_tolerance_merges_close_points_and_splits_far_ones() {
    let (_root, pool) = create_test_db().await;
    let place_id = create_test_place(&pool, "Sierras").await;
    let grid = ToleranceGrid::default();

    reconcile_point(&pool, place_id, &point(Band::B04, LON, LAT, 0.2), &grid)
        .await
        .unwrap();

    // ~0.5 m east: same record
    let near = reconcile_point(&pool, place_id, &point(Band::B05, LON + 0.000005, LAT, 0.5), &grid)
        .await
        .unwrap();
    assert_eq!(near.updated, 1);
    assert_eq!(record_count(&pool, place_id).await, 1);
    assert_eq!(band_value(&pool, place_id, Band::B05).await, Some(0.5));

    // ~2 m north: new record
    let far = reconcile_point(&pool, place_id, &point(Band::B05, LON, LAT + 0.000018, 0.6), &grid)
        .await
        .unwrap();
    assert_eq!(far.inserted, 1);
    assert_eq!(record_count(&pool, place_id).await, 2);
}

#[tokio::test]
async fn test_same_location_on_other_date_is_separate_record() {
    let (_root, pool) = create_test_db().await;
    let place_id = create_test_place(&pool, "Sierras").await;
    let grid = ToleranceGrid::default();

    let mut later = point(Band::B04, LON, LAT, 0.3);
    later.capture_date = NaiveDate::from_ymd_opt(2023, 6, 7).unwrap();

    let stats = reconcile_points(&pool, place_id, &[point(Band::B04, LON, LAT, 0.2), later], &grid)
        .await
        .unwrap();
    assert_eq!(stats.inserted, 2);
    assert_eq!(record_count(&pool, place_id).await, 2);
}

#[tokio::test]
async fn test_ndvi_skips_zero_sum_and_missing_bands() {
    let (_root, pool) = create_test_db().await;
    let place_id = create_test_place(&pool, "Sierras").await;
    let grid = ToleranceGrid::default();
    let other_lon = LON + 0.001;
    let third_lon = LON + 0.002;

    let points = [
        point(Band::B05, LON, LAT, 0.5),
        point(Band::B04, LON, LAT, 0.2),
        point(Band::B05, other_lon, LAT, 0.3),
        point(Band::B04, other_lon, LAT, -0.3),
        point(Band::B04, third_lon, LAT, 0.1),
    ];
    reconcile_points(&pool, place_id, &points, &grid).await.unwrap();

    let stats = update_place_ndvi(&pool, place_id).await.unwrap();
    assert_eq!(stats.records, 3);
    assert_eq!(stats.updated, 1);

    let samples = heatmap(&pool, place_id, Some(capture_date())).await.unwrap();
    assert_eq!(samples.len(), 3);
    let ndvi: Vec<Option<f64>> = samples.iter().map(|s| s.ndvi).collect();
    assert!((ndvi[0].unwrap() - 0.4286).abs() < 1e-4);
    assert_eq!(ndvi[1], None);
    assert_eq!(ndvi[2], None);
}

#[tokio::test]
async fn test_ndvi_cleared_when_bands_no_longer_support_it() {
    let (_root, pool) = create_test_db().await;
    let place_id = create_test_place(&pool, "Sierras").await;
    let grid = ToleranceGrid::default();

    let bands = [point(Band::B05, LON, LAT, 0.5), point(Band::B04, LON, LAT, 0.2)];
    reconcile_points(&pool, place_id, &bands, &grid).await.unwrap();
    update_place_ndvi(&pool, place_id).await.unwrap();
    let samples = heatmap(&pool, place_id, None).await.unwrap();
    assert!((samples[0].ndvi.unwrap() - 0.4286).abs() < 1e-4);

    // red overwritten so nir + red == 0
    reconcile_point(&pool, place_id, &point(Band::B04, LON, LAT, -0.5), &grid)
        .await
        .unwrap();
    let stats = update_place_ndvi(&pool, place_id).await.unwrap();
    assert_eq!(stats.updated, 0);

    let samples = heatmap(&pool, place_id, None).await.unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].ndvi, None);
}

#[tokio::test]
async fn test_freshness_window_boundary() {
    let (_root, pool) = create_test_db().await;
    let place_id = create_test_place(&pool, "Sierras").await;
    let grid = ToleranceGrid::default();
    let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    assert_eq!(recent_capture(&pool, place_id, today, 30).await.unwrap(), None);

    let mut old = point(Band::B04, LON, LAT, 0.2);
    old.capture_date = days_before(today, 40);
    reconcile_point(&pool, place_id, &old, &grid).await.unwrap();
    assert_eq!(recent_capture(&pool, place_id, today, 30).await.unwrap(), None);

    let mut recent = point(Band::B04, LON, LAT, 0.2);
    recent.capture_date = days_before(today, 10);
    reconcile_point(&pool, place_id, &recent, &grid).await.unwrap();

    assert_eq!(
        recent_capture(&pool, place_id, today, 30).await.unwrap(),
        Some("2024-02-20".to_string())
    );
    assert_eq!(recent_capture(&pool, place_id, today, 5).await.unwrap(), None);
}
