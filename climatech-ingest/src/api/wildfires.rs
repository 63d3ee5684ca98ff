//! Wildfire endpoint
//!
//! GET /wildfires?satellite=&days= fetches the FIRMS country feed, appends
//! every row and returns the whole table.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::db::wildfires::{self, StoredWildfire};
use crate::error::{ApiError, ApiResult};
use crate::services::{firms_client::validate_query, parse_firms_csv};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WildfireQuery {
    pub satellite: String,
    pub days: u32,
}

/// GET /wildfires
pub async fn get_wildfires(
    State(state): State<AppState>,
    Query(query): Query<WildfireQuery>,
) -> ApiResult<Json<Vec<StoredWildfire>>> {
    validate_query(&query.satellite, query.days)?;

    let feed = state.hotspots.clone().ok_or_else(|| {
        ApiError::Internal("FIRMS map key is not configured".to_string())
    })?;

    let csv_text = match feed.fetch_country_csv(&query.satellite, query.days).await {
        Ok(text) => text,
        Err(e) => {
            state.record_error(e.to_string()).await;
            return Err(e.into());
        }
    };

    let (records, skipped) = parse_firms_csv(&csv_text);
    let inserted = wildfires::insert_wildfires(&state.db, &records).await?;
    tracing::info!(
        satellite = %query.satellite,
        days = query.days,
        inserted,
        skipped,
        "Wildfire data stored"
    );

    Ok(Json(wildfires::list_wildfires(&state.db).await?))
}

pub fn wildfire_routes() -> Router<AppState> {
    Router::new().route("/wildfires", get(get_wildfires))
}
