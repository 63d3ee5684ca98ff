//! HLS pipeline state machine
//!
//! One run per place and request:
//! IDLE → SUBMITTED → POLLING → LISTING → (DOWNLOADING → EXTRACTING →
//! RECONCILING)* → NDVI_COMPUTE → DONE, or IDLE → DONE on a freshness hit.
//! FAILED is terminal. Per-file failures are recorded on the run without
//! leaving the file loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Idle,
    /// Task accepted by the imagery API
    Submitted,
    /// Waiting for the remote task to finish
    Polling,
    /// Fetching the bundle manifest
    Listing,
    Downloading,
    Extracting,
    Reconciling,
    NdviCompute,
    Done,
    Failed,
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub old_state: PipelineState,
    pub new_state: PipelineState,
    pub transitioned_at: DateTime<Utc>,
}

/// Pipeline stage a file failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStage {
    Download,
    Parse,
    Extract,
    Reconcile,
}

/// Failure local to one bundle file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileError {
    pub file_name: String,
    pub stage: FileStage,
    pub message: String,
}

impl FileError {
    pub fn new(file_name: impl Into<String>, stage: FileStage, message: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            stage,
            message: message.into(),
        }
    }
}

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Freshness gate hit; nothing was fetched
    RecentDataAvailable,
    /// Remote task processed and NDVI recomputed
    Completed,
}

impl PipelineOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            PipelineOutcome::RecentDataAvailable => "Recent NDVI data available",
            PipelineOutcome::Completed => "NDVI data processed and updated successfully",
        }
    }
}

/// In-memory record of one pipeline invocation
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub place_id: i64,
    pub state: PipelineState,
    pub task_id: Option<String>,
    pub files_listed: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub points_extracted: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub ndvi_updated: usize,
    pub file_errors: Vec<FileError>,
    pub transitions: Vec<StateTransition>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(place_id: i64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            place_id,
            state: PipelineState::Idle,
            task_id: None,
            files_listed: 0,
            files_processed: 0,
            files_skipped: 0,
            points_extracted: 0,
            records_inserted: 0,
            records_updated: 0,
            ndvi_updated: 0,
            file_errors: Vec::new(),
            transitions: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to `new_state`, recording the transition
    pub fn transition_to(&mut self, new_state: PipelineState) -> &StateTransition {
        let now = Utc::now();
        self.transitions.push(StateTransition {
            old_state: self.state,
            new_state,
            transitioned_at: now,
        });
        self.state = new_state;

        if self.is_terminal() {
            self.ended_at = Some(now);
        }

        tracing::debug!(run_id = %self.run_id, place_id = self.place_id, state = ?new_state, "Pipeline state");
        &self.transitions[self.transitions.len() - 1]
    }

    pub fn add_file_error(&mut self, error: FileError) {
        tracing::warn!(
            run_id = %self.run_id,
            file = %error.file_name,
            stage = ?error.stage,
            "{}",
            error.message
        );
        self.file_errors.push(error);
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, PipelineState::Done | PipelineState::Failed)
    }

    /// States visited so far, starting with IDLE
    pub fn visited_states(&self) -> Vec<PipelineState> {
        let mut states = vec![PipelineState::Idle];
        states.extend(self.transitions.iter().map(|t| t.new_state));
        states
    }

    pub fn into_report(self, outcome: PipelineOutcome) -> PipelineReport {
        PipelineReport {
            message: outcome.message().to_string(),
            outcome,
            run_id: self.run_id,
            place_id: self.place_id,
            task_id: self.task_id,
            files_listed: self.files_listed,
            files_processed: self.files_processed,
            files_skipped: self.files_skipped,
            points_extracted: self.points_extracted,
            records_inserted: self.records_inserted,
            records_updated: self.records_updated,
            ndvi_updated: self.ndvi_updated,
            file_errors: self.file_errors,
            transitions: self.transitions,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

/// Summary returned to the caller of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub message: String,
    pub outcome: PipelineOutcome,
    pub run_id: Uuid,
    pub place_id: i64,
    pub task_id: Option<String>,
    pub files_listed: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub points_extracted: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub ndvi_updated: usize,
    pub file_errors: Vec<FileError>,
    pub transitions: Vec<StateTransition>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
