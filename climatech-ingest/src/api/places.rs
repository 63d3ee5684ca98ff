//! Place endpoints
//!
//! GET /places, POST /places, DELETE /places/:id, GET /terrain/:id

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use climatech_common::geometry::validate_polygon;
use geojson::{GeoJson, Geometry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::places;
use crate::error::{ApiError, ApiResult};
use crate::models::{NewPlace, Place};
use crate::AppState;

/// POST /places body
///
/// `polygon` may be a Polygon geometry, a Feature, or a FeatureCollection
/// whose first feature carries the polygon.
#[derive(Debug, Deserialize)]
pub struct CreatePlaceRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub polygon: Value,
}

#[derive(Debug, Serialize)]
pub struct CreatePlaceResponse {
    pub id: i64,
    pub message: String,
}

/// GET /terrain/:id response
#[derive(Debug, Serialize)]
pub struct TerrainResponse {
    pub geojson: Geometry,
    /// `[[min_lat, min_lon], [max_lat, max_lon]]`
    pub bounds: [[f64; 2]; 2],
}

/// Pull the polygon geometry out of any accepted GeoJSON shape
pub fn polygon_from_json(value: Value) -> ApiResult<Geometry> {
    let geojson = GeoJson::from_json_value(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid GeoJSON: {}", e)))?;

    let geometry = match geojson {
        GeoJson::Geometry(geometry) => Some(geometry),
        GeoJson::Feature(feature) => feature.geometry,
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .next()
            .and_then(|feature| feature.geometry),
    }
    .ok_or_else(|| ApiError::BadRequest("GeoJSON carries no geometry".to_string()))?;

    validate_polygon(&geometry)?;
    Ok(geometry)
}

/// GET /places
pub async fn list_places(State(state): State<AppState>) -> ApiResult<Json<Vec<Place>>> {
    Ok(Json(places::list_places(&state.db).await?))
}

/// POST /places
pub async fn create_place(
    State(state): State<AppState>,
    Json(request): Json<CreatePlaceRequest>,
) -> ApiResult<(StatusCode, Json<CreatePlaceResponse>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Place name must not be empty".to_string()));
    }

    let place = NewPlace {
        name: name.to_string(),
        description: request.description,
        polygon: polygon_from_json(request.polygon)?,
    };
    let id = places::insert_place(&state.db, &place).await?;
    tracing::info!(place_id = id, name = %place.name, "Place created");

    Ok((
        StatusCode::CREATED,
        Json(CreatePlaceResponse {
            id,
            message: "Place created".to_string(),
        }),
    ))
}

/// DELETE /places/:id
pub async fn delete_place(
    State(state): State<AppState>,
    Path(place_id): Path<i64>,
) -> ApiResult<StatusCode> {
    if state.leases.is_held(place_id) {
        return Err(ApiError::Conflict(format!(
            "Acquisition running for place {}",
            place_id
        )));
    }
    if !places::delete_place(&state.db, place_id).await? {
        return Err(ApiError::NotFound(format!("Place {}", place_id)));
    }
    tracing::info!(place_id, "Place deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /terrain/:id
pub async fn terrain(
    State(state): State<AppState>,
    Path(place_id): Path<i64>,
) -> ApiResult<Json<TerrainResponse>> {
    let (place, bounds) = places::place_bounds(&state.db, place_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Place {}", place_id)))?;

    Ok(Json(TerrainResponse {
        geojson: place.polygon,
        bounds: [
            [bounds.min_lat, bounds.min_lon],
            [bounds.max_lat, bounds.max_lon],
        ],
    }))
}

pub fn place_routes() -> Router<AppState> {
    Router::new()
        .route("/places", get(list_places).post(create_place))
        .route("/places/:id", delete(delete_place))
        .route("/terrain/:id", get(terrain))
}
