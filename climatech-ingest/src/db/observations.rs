//! Read-side queries over `harmonized_landsat_sentinel_data`

use chrono::NaiveDate;
use climatech_common::time::format_capture_date;
use climatech_common::Result;
use sqlx::{Row, SqlitePool};

use crate::models::HeatmapPoint;

/// Most recent capture date for the place on or after `since`
///
/// Capture dates are `YYYY-MM-DD` text, so lexical comparison is date order.
pub async fn latest_capture_since(
    pool: &SqlitePool,
    place_id: i64,
    since: NaiveDate,
) -> Result<Option<String>> {
    let latest: Option<String> = sqlx::query_scalar(
        r#"
        SELECT MAX(capture_date) FROM harmonized_landsat_sentinel_data
        WHERE place_id = ? AND capture_date >= ?
        "#,
    )
    .bind(place_id)
    .bind(format_capture_date(since))
    .fetch_one(pool)
    .await?;

    Ok(latest)
}

/// Distinct capture dates for a place, ascending
pub async fn capture_dates(pool: &SqlitePool, place_id: i64) -> Result<Vec<String>> {
    let dates = sqlx::query_scalar(
        r#"
        SELECT DISTINCT capture_date FROM harmonized_landsat_sentinel_data
        WHERE place_id = ?
        ORDER BY capture_date
        "#,
    )
    .bind(place_id)
    .fetch_all(pool)
    .await?;

    Ok(dates)
}

/// NDVI samples for a place, optionally limited to one capture date
pub async fn heatmap(
    pool: &SqlitePool,
    place_id: i64,
    date: Option<NaiveDate>,
) -> Result<Vec<HeatmapPoint>> {
    let rows = match date {
        Some(date) => {
            sqlx::query(
                r#"
                SELECT latitude, longitude, ndvi FROM harmonized_landsat_sentinel_data
                WHERE place_id = ? AND capture_date = ?
                ORDER BY id
                "#,
            )
            .bind(place_id)
            .bind(format_capture_date(date))
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT latitude, longitude, ndvi FROM harmonized_landsat_sentinel_data
                WHERE place_id = ?
                ORDER BY id
                "#,
            )
            .bind(place_id)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows
        .iter()
        .map(|row| HeatmapPoint {
            latitude: row.get("latitude"),
            longitude: row.get("longitude"),
            ndvi: row.get("ndvi"),
        })
        .collect())
}

pub async fn count_for_place(pool: &SqlitePool, place_id: i64) -> Result<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM harmonized_landsat_sentinel_data WHERE place_id = ?",
    )
    .bind(place_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
