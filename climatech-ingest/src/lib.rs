//! climatech-ingest library interface
//!
//! Exposes the acquisition pipeline, storage layer and HTTP router for the
//! binary and for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use climatech_common::config::TomlConfig;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::{HlsPipeline, HotspotFeed, ImageryApi, PipelineSettings, PlaceLeases};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<TomlConfig>,
    /// Imagery API; `None` when no credentials are configured
    pub imagery: Option<Arc<dyn ImageryApi>>,
    /// Hotspot feed; `None` when no map key is configured
    pub hotspots: Option<Arc<dyn HotspotFeed>>,
    /// One acquisition in flight per place
    pub leases: PlaceLeases,
    /// Directory for raster scratch files
    pub scratch_dir: PathBuf,
    /// Cancelled on shutdown; each pipeline run watches a child token
    pub shutdown: CancellationToken,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: TomlConfig, scratch_dir: PathBuf) -> Self {
        Self {
            db,
            config: Arc::new(config),
            imagery: None,
            hotspots: None,
            leases: PlaceLeases::new(),
            scratch_dir,
            shutdown: CancellationToken::new(),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_imagery(mut self, api: Arc<dyn ImageryApi>) -> Self {
        self.imagery = Some(api);
        self
    }

    pub fn with_hotspots(mut self, feed: Arc<dyn HotspotFeed>) -> Self {
        self.hotspots = Some(feed);
        self
    }

    /// Pipeline over the configured imagery API
    pub fn pipeline(&self) -> ApiResult<HlsPipeline> {
        let api = self.imagery.clone().ok_or_else(|| {
            ApiError::Internal("Imagery API credentials are not configured".to_string())
        })?;

        Ok(HlsPipeline::new(
            self.db.clone(),
            api,
            self.leases.clone(),
            PipelineSettings::from(self.config.as_ref()),
            self.scratch_dir.clone(),
        ))
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::place_routes())
        .merge(api::ndvi_routes())
        .merge(api::wildfire_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
