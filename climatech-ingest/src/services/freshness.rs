//! Freshness gate
//!
//! A place with any observation captured inside the window skips
//! acquisition entirely.

use chrono::NaiveDate;
use climatech_common::time::days_before;
use climatech_common::Result;
use sqlx::SqlitePool;

use crate::db::observations::latest_capture_since;

/// Latest capture date within `window_days` of `today`, if any
pub async fn recent_capture(
    pool: &SqlitePool,
    place_id: i64,
    today: NaiveDate,
    window_days: u32,
) -> Result<Option<String>> {
    let since = days_before(today, window_days);
    let latest = latest_capture_since(pool, place_id, since).await?;

    if let Some(date) = &latest {
        tracing::info!(place_id, latest = %date, window_days, "Recent data found, skipping acquisition");
    }
    Ok(latest)
}
