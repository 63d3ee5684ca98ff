//! HLS acquisition pipeline
//!
//! Drives one place through freshness gate, task submission, polling, bundle
//! listing, the per-file download/extract/reconcile loop and the final NDVI
//! pass. Failures local to one file are recorded on the run and the loop
//! moves on; submission, polling, listing and storage failures abort the run
//! and leave already reconciled records in place.

use climatech_common::config::TomlConfig;
use climatech_common::geometry::ToleranceGrid;
use climatech_common::time;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{field, Instrument};

use crate::db::places::load_place;
use crate::models::{
    FileError, FileStage, PipelineOutcome, PipelineReport, PipelineRun, PipelineState,
};
use crate::services::appeears_client::{AppeearsError, AuthToken, BundleFile, ImageryApi, TaskRequest};
use crate::services::freshness::recent_capture;
use crate::services::ndvi::update_place_ndvi;
use crate::services::place_lease::PlaceLeases;
use crate::services::raster_extractor::{extract_points_blocking, parse_file_name};
use crate::services::reconciler::reconcile_points;
use crate::services::task_poller::{poll_until_done, PollError, PollPolicy};

/// Run-level pipeline failure
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Place not found: {0}")]
    PlaceNotFound(i64),

    #[error("Acquisition already running for place {0}")]
    PlaceBusy(i64),

    #[error("Imagery login failed: {0}")]
    Login(#[source] AppeearsError),

    #[error("Task submission failed: {0}")]
    Submit(#[source] AppeearsError),

    #[error("Task {task_id} failed with status '{status}'")]
    TaskFailed { task_id: String, status: String },

    #[error("Task {task_id} not finished after {waited:?}")]
    PollTimeout { task_id: String, waited: Duration },

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Bundle listing failed: {0}")]
    Listing(#[source] AppeearsError),

    #[error("Task {task_id} produced no files")]
    NoInput { task_id: String },

    #[error(transparent)]
    Storage(#[from] climatech_common::Error),
}

impl PipelineError {
    /// Remote imagery error behind this failure, if any
    pub fn remote_error(&self) -> Option<&AppeearsError> {
        match self {
            PipelineError::Login(e) | PipelineError::Submit(e) | PipelineError::Listing(e) => Some(e),
            _ => None,
        }
    }
}

/// Tunables for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub product: String,
    pub lookback_days: u32,
    pub freshness_window_days: u32,
    pub poll: PollPolicy,
    pub grid: ToleranceGrid,
}

impl From<&TomlConfig> for PipelineSettings {
    fn from(config: &TomlConfig) -> Self {
        Self {
            product: config.appeears.product.clone(),
            lookback_days: config.appeears.lookback_days,
            freshness_window_days: config.freshness.window_days,
            poll: PollPolicy::from(&config.polling),
            grid: ToleranceGrid::default(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&TomlConfig::default())
    }
}

/// Pipeline over one imagery API and store
pub struct HlsPipeline {
    db: SqlitePool,
    api: Arc<dyn ImageryApi>,
    leases: PlaceLeases,
    settings: PipelineSettings,
    scratch_dir: PathBuf,
}

impl HlsPipeline {
    pub fn new(
        db: SqlitePool,
        api: Arc<dyn ImageryApi>,
        leases: PlaceLeases,
        settings: PipelineSettings,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            api,
            leases,
            settings,
            scratch_dir,
        }
    }

    /// Run the pipeline for `place_id`
    ///
    /// Holds the place lease for the whole run; a concurrent call for the
    /// same place fails with [`PipelineError::PlaceBusy`].
    pub async fn run(
        &self,
        place_id: i64,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        let span = tracing::info_span!("hls_pipeline", place_id, task_id = field::Empty);

        async move {
            let Some(_lease) = self.leases.try_acquire(place_id) else {
                tracing::warn!("Acquisition already running, rejecting");
                return Err(PipelineError::PlaceBusy(place_id));
            };

            let mut run = PipelineRun::new(place_id);
            match self.execute(&mut run, &cancel).await {
                Ok(outcome) => {
                    run.transition_to(PipelineState::Done);
                    tracing::info!(
                        run_id = %run.run_id,
                        ?outcome,
                        files_processed = run.files_processed,
                        file_errors = run.file_errors.len(),
                        records_inserted = run.records_inserted,
                        records_updated = run.records_updated,
                        "Pipeline finished"
                    );
                    Ok(run.into_report(outcome))
                }
                Err(e) => {
                    run.transition_to(PipelineState::Failed);
                    tracing::error!(run_id = %run.run_id, error = %e, "Pipeline failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let place_id = run.place_id;
        let place = load_place(&self.db, place_id)
            .await?
            .ok_or(PipelineError::PlaceNotFound(place_id))?;

        let today = time::today();
        if recent_capture(&self.db, place_id, today, self.settings.freshness_window_days)
            .await?
            .is_some()
        {
            return Ok(PipelineOutcome::RecentDataAvailable);
        }

        let token = self.api.login().await.map_err(PipelineError::Login)?;

        let start = time::days_before(today, self.settings.lookback_days);
        let request = TaskRequest::hls_area(&place.polygon, &self.settings.product, start, today);
        let task_id = self
            .api
            .submit_task(&token, &request)
            .await
            .map_err(PipelineError::Submit)?;

        tracing::Span::current().record("task_id", field::display(&task_id));
        tracing::info!(place = %place.name, %start, end = %today, "Task submitted");
        run.task_id = Some(task_id.clone());
        run.transition_to(PipelineState::Submitted);

        run.transition_to(PipelineState::Polling);
        poll_until_done(self.api.as_ref(), &token, &task_id, &self.settings.poll, cancel)
            .await
            .map_err(|e| match e {
                PollError::TaskFailed(status) => PipelineError::TaskFailed {
                    task_id: task_id.clone(),
                    status,
                },
                PollError::Timeout { waited } => PipelineError::PollTimeout {
                    task_id: task_id.clone(),
                    waited,
                },
                PollError::Cancelled => PipelineError::Cancelled,
            })?;

        run.transition_to(PipelineState::Listing);
        let files = self
            .api
            .list_bundle(&token, &task_id)
            .await
            .map_err(PipelineError::Listing)?;
        run.files_listed = files.len();
        if files.is_empty() {
            return Err(PipelineError::NoInput { task_id });
        }
        tracing::info!(files = files.len(), "Bundle listed");

        for file in &files {
            if !file.is_raster() {
                run.files_skipped += 1;
                tracing::debug!(file = %file.file_name, "Skipping non-raster bundle file");
                continue;
            }
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let span = tracing::info_span!("hls_file", file_name = %file.file_name);
            self.process_file(run, &token, &task_id, file)
                .instrument(span)
                .await;
        }

        run.transition_to(PipelineState::NdviCompute);
        let ndvi = update_place_ndvi(&self.db, place_id).await?;
        run.ndvi_updated = ndvi.updated;
        tracing::info!(records = ndvi.records, updated = ndvi.updated, "NDVI recomputed");

        Ok(PipelineOutcome::Completed)
    }

    /// Download, extract and reconcile one bundle file
    ///
    /// Every failure here is recorded on `run` as a [`FileError`].
    async fn process_file(
        &self,
        run: &mut PipelineRun,
        token: &AuthToken,
        task_id: &str,
        file: &BundleFile,
    ) {
        let name = file.file_name.as_str();

        // Unparseable names are skipped before spending a download on them
        if let Err(e) = parse_file_name(name) {
            run.add_file_error(FileError::new(name, FileStage::Parse, e.to_string()));
            return;
        }

        run.transition_to(PipelineState::Downloading);
        let scratch = match tempfile::Builder::new()
            .prefix("hls_")
            .suffix(".tif")
            .tempfile_in(&self.scratch_dir)
        {
            Ok(f) => f,
            Err(e) => {
                run.add_file_error(FileError::new(
                    name,
                    FileStage::Download,
                    format!("Scratch file: {}", e),
                ));
                return;
            }
        };

        match self.api.download_file(token, task_id, file, scratch.path()).await {
            Ok(bytes) => tracing::debug!(bytes, "Downloaded"),
            Err(e) => {
                run.add_file_error(FileError::new(name, FileStage::Download, e.to_string()));
                return;
            }
        }

        run.transition_to(PipelineState::Extracting);
        let points = match extract_points_blocking(scratch.path().to_path_buf(), name.to_string()).await {
            Ok(points) => points,
            Err(e) => {
                let stage = if e.is_parse_error() {
                    FileStage::Parse
                } else {
                    FileStage::Extract
                };
                run.add_file_error(FileError::new(name, stage, e.to_string()));
                return;
            }
        };
        // Scratch file is removed here, before the store is touched
        drop(scratch);

        run.transition_to(PipelineState::Reconciling);
        match reconcile_points(&self.db, run.place_id, &points, &self.settings.grid).await {
            Ok(stats) => {
                run.files_processed += 1;
                run.points_extracted += points.len();
                run.records_inserted += stats.inserted;
                run.records_updated += stats.updated;
                tracing::info!(
                    points = points.len(),
                    inserted = stats.inserted,
                    updated = stats.updated,
                    "File reconciled"
                );
            }
            Err(e) => {
                run.add_file_error(FileError::new(name, FileStage::Reconcile, e.to_string()));
            }
        }
    }
}
