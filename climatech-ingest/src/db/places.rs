//! Place persistence
//!
//! Polygons are stored as GeoJSON geometry text.

use climatech_common::geometry::{self, Bounds};
use climatech_common::{Error, Result};
use sqlx::{Row, SqlitePool};

use crate::models::{NewPlace, Place};

fn row_to_place(row: &sqlx::sqlite::SqliteRow) -> Result<Place> {
    let polygon_text: String = row.get("polygon");
    let polygon = geometry::parse_polygon(&polygon_text).map_err(|e| {
        Error::Internal(format!("Stored polygon is not valid GeoJSON: {}", e))
    })?;

    Ok(Place {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        polygon,
    })
}

/// Insert a place and return its id
pub async fn insert_place(pool: &SqlitePool, place: &NewPlace) -> Result<i64> {
    let polygon = serde_json::to_string(&place.polygon)
        .map_err(|e| Error::Internal(format!("Failed to serialize polygon: {}", e)))?;

    let result = sqlx::query("INSERT INTO places (name, description, polygon) VALUES (?, ?, ?)")
        .bind(&place.name)
        .bind(&place.description)
        .bind(polygon)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

pub async fn list_places(pool: &SqlitePool) -> Result<Vec<Place>> {
    let rows = sqlx::query("SELECT id, name, description, polygon FROM places ORDER BY id")
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_place).collect()
}

pub async fn load_place(pool: &SqlitePool, place_id: i64) -> Result<Option<Place>> {
    let row = sqlx::query("SELECT id, name, description, polygon FROM places WHERE id = ?")
        .bind(place_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_place).transpose()
}

/// Delete a place; observations go with it (ON DELETE CASCADE)
///
/// Returns `false` when no place had this id.
pub async fn delete_place(pool: &SqlitePool, place_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM places WHERE id = ?")
        .bind(place_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Polygon and bounding box for map framing
pub async fn place_bounds(pool: &SqlitePool, place_id: i64) -> Result<Option<(Place, Bounds)>> {
    let Some(place) = load_place(pool, place_id).await? else {
        return Ok(None);
    };
    let bounds = geometry::polygon_bounds(&place.polygon)
        .ok_or_else(|| Error::Internal(format!("Place {} has an empty polygon", place_id)))?;
    Ok(Some((place, bounds)))
}
