//! Acquisition services
//!
//! External clients (AppEEARS, FIRMS), the raster and storage stages, and
//! the pipeline that ties them together.

pub mod appeears_client;
pub mod firms_client;
pub mod freshness;
pub mod hls_pipeline;
pub mod ndvi;
pub mod place_lease;
pub mod raster_extractor;
pub mod reconciler;
pub mod task_poller;

pub use appeears_client::{AppeearsClient, AppeearsError, AuthToken, BundleFile, ImageryApi, TaskRequest, TaskStatus};
pub use firms_client::{parse_firms_csv, FirmsClient, FirmsError, HotspotFeed};
pub use hls_pipeline::{HlsPipeline, PipelineError, PipelineSettings};
pub use ndvi::{compute_ndvi, update_place_ndvi, NdviStats};
pub use place_lease::{PlaceLease, PlaceLeases};
pub use raster_extractor::{extract_points, parse_file_name, ExtractError, ParsedFileName};
pub use reconciler::{reconcile_point, reconcile_points, ReconcileStats};
pub use task_poller::{poll_until_done, PollError, PollPolicy};
