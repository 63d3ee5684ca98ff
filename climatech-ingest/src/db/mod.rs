//! Database access for climatech-ingest
//!
//! Schema creation lives in `climatech_common::db`; these modules hold the
//! queries the service and HTTP handlers run against it.

pub mod observations;
pub mod places;
pub mod wildfires;

pub use climatech_common::db::init_database;
