//! NDVI endpoints
//!
//! GET /ndvi/:id runs the acquisition pipeline for a place; the other two
//! routes only read the store.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime};
use climatech_common::time::parse_capture_date;
use serde::{Deserialize, Serialize};

use crate::db::{observations, places};
use crate::error::{ApiError, ApiResult};
use crate::models::{HeatmapPoint, PipelineReport};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DatesResponse {
    pub dates: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct HeatmapQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HeatmapResponse {
    pub data: Vec<HeatmapPoint>,
}

/// Heatmap date: `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS[.fff]` (time ignored)
pub fn parse_heatmap_date(text: &str) -> Option<NaiveDate> {
    parse_capture_date(text).or_else(|| {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|dt| dt.date())
    })
}

/// GET /ndvi/:id
pub async fn run_ndvi(
    State(state): State<AppState>,
    Path(place_id): Path<i64>,
) -> ApiResult<Json<PipelineReport>> {
    let pipeline = state.pipeline()?;
    let cancel = state.shutdown.child_token();

    match pipeline.run(place_id, cancel).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            state.record_error(e.to_string()).await;
            Err(e.into())
        }
    }
}

/// GET /ndvi/dates/:id
pub async fn ndvi_dates(
    State(state): State<AppState>,
    Path(place_id): Path<i64>,
) -> ApiResult<Json<DatesResponse>> {
    if places::load_place(&state.db, place_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Place {}", place_id)));
    }
    let dates = observations::capture_dates(&state.db, place_id).await?;
    Ok(Json(DatesResponse { dates }))
}

/// GET /ndvi/heatmap/:id?date=
pub async fn ndvi_heatmap(
    State(state): State<AppState>,
    Path(place_id): Path<i64>,
    Query(query): Query<HeatmapQuery>,
) -> ApiResult<Json<HeatmapResponse>> {
    let date = match query.date.as_deref().filter(|d| !d.is_empty()) {
        Some(text) => Some(parse_heatmap_date(text).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Invalid date '{}'. Use YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS",
                text
            ))
        })?),
        None => None,
    };

    let data = observations::heatmap(&state.db, place_id, date).await?;
    if data.is_empty() {
        return Err(ApiError::NotFound("No NDVI data found".to_string()));
    }
    tracing::debug!(place_id, ?date, records = data.len(), "Heatmap served");
    Ok(Json(HeatmapResponse { data }))
}

pub fn ndvi_routes() -> Router<AppState> {
    Router::new()
        .route("/ndvi/:id", get(run_ndvi))
        .route("/ndvi/dates/:id", get(ndvi_dates))
        .route("/ndvi/heatmap/:id", get(ndvi_heatmap))
}
