//! NDVI calculator
//!
//! `(nir - red) / (nir + red)` from `b05_nir` and `b04_red`, recomputed for
//! every record of a place and committed once.

use climatech_common::{Error, Result};
use sqlx::{Row, SqlitePool};

use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// NDVI for one record; `None` when a band is missing or the sum is zero
pub fn compute_ndvi(nir: Option<f64>, red: Option<f64>) -> Option<f64> {
    let (nir, red) = (nir?, red?);
    let sum = nir + red;
    if sum == 0.0 {
        return None;
    }
    let ndvi = (nir - red) / sum;
    ndvi.is_finite().then_some(ndvi)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NdviStats {
    /// Records the place has
    pub records: usize,
    /// Records given an NDVI value
    pub updated: usize,
}

/// Recompute NDVI for all of a place's records
pub async fn update_place_ndvi(pool: &SqlitePool, place_id: i64) -> Result<NdviStats> {
    retry_on_lock("update_place_ndvi", DEFAULT_MAX_LOCK_WAIT_MS, move || async move {
        let mut tx = pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, b05_nir, b04_red FROM harmonized_landsat_sentinel_data
            WHERE place_id = ?
            "#,
        )
        .bind(place_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut stats = NdviStats {
            records: rows.len(),
            updated: 0,
        };

        // Every row is written; rows without a valid NDVI go back to NULL
        for row in &rows {
            let ndvi = compute_ndvi(row.get("b05_nir"), row.get("b04_red"));
            sqlx::query("UPDATE harmonized_landsat_sentinel_data SET ndvi = ? WHERE id = ?")
                .bind(ndvi)
                .bind(row.get::<i64, _>("id"))
                .execute(&mut *tx)
                .await?;
            if ndvi.is_some() {
                stats.updated += 1;
            }
        }

        tx.commit().await?;
        tracing::info!(place_id, records = stats.records, updated = stats.updated, "NDVI recomputed");
        Ok::<_, Error>(stats)
    })
    .await
}
