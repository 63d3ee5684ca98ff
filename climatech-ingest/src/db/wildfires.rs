//! Wildfire hotspot persistence (append-only)

use climatech_common::Result;
use sqlx::{Row, SqlitePool};

use crate::models::WildfireRecord;
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Stored hotspot with its row id
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredWildfire {
    pub id: i64,
    #[serde(flatten)]
    pub record: WildfireRecord,
}

/// Append all records in one transaction; no deduplication
pub async fn insert_wildfires(pool: &SqlitePool, records: &[WildfireRecord]) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }

    retry_on_lock("insert_wildfires", DEFAULT_MAX_LOCK_WAIT_MS, move || async move {
        let mut tx = pool.begin().await?;
        for r in records {
            sqlx::query(
                r#"
                INSERT INTO wildfire_data (
                    latitude, longitude, brightness, scan, track, acq_date, acq_time,
                    satellite, confidence, version, bright_t31, frp, daynight
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(r.latitude)
            .bind(r.longitude)
            .bind(r.brightness)
            .bind(r.scan)
            .bind(r.track)
            .bind(r.acq_date)
            .bind(&r.acq_time)
            .bind(&r.satellite)
            .bind(&r.confidence)
            .bind(&r.version)
            .bind(r.bright_t31)
            .bind(r.frp)
            .bind(&r.daynight)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok::<_, climatech_common::Error>(records.len())
    })
    .await
}

pub async fn list_wildfires(pool: &SqlitePool) -> Result<Vec<StoredWildfire>> {
    let rows = sqlx::query(
        r#"
        SELECT id, latitude, longitude, brightness, scan, track, acq_date, acq_time,
               satellite, confidence, version, bright_t31, frp, daynight
        FROM wildfire_data
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<StoredWildfire> {
            Ok(StoredWildfire {
                id: row.get("id"),
                record: WildfireRecord {
                    latitude: row.get("latitude"),
                    longitude: row.get("longitude"),
                    brightness: row.get("brightness"),
                    scan: row.get("scan"),
                    track: row.get("track"),
                    acq_date: row.try_get("acq_date")?,
                    acq_time: row.get("acq_time"),
                    satellite: row.get("satellite"),
                    confidence: row.get("confidence"),
                    version: row.get("version"),
                    bright_t31: row.get("bright_t31"),
                    frp: row.get("frp"),
                    daynight: row.get("daynight"),
                },
            })
        })
        .collect()
}
