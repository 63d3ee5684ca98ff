//! Data models for the HLS acquisition pipeline and wildfire feed

pub mod observation;
pub mod pipeline_run;
pub mod place;
pub mod wildfire;

pub use observation::{Band, BandTarget, ExtractedPoint, HeatmapPoint};
pub use pipeline_run::{
    FileError, FileStage, PipelineOutcome, PipelineReport, PipelineRun, PipelineState,
    StateTransition,
};
pub use place::{NewPlace, Place};
pub use wildfire::WildfireRecord;
