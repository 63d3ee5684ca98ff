//! FIRMS hotspot record

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One active-fire detection
///
/// `brightness`/`bright_t31` hold the MODIS channel values; VIIRS files name
/// the same channels `bright_ti4`/`bright_ti5`. `version` is free text
/// (e.g. `6.1NRT`). `acq_date` must be `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildfireRecord {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(alias = "bright_ti4")]
    pub brightness: Option<f64>,
    pub scan: Option<f64>,
    pub track: Option<f64>,
    pub acq_date: NaiveDate,
    pub acq_time: Option<String>,
    pub satellite: Option<String>,
    pub confidence: Option<String>,
    pub version: Option<String>,
    #[serde(alias = "bright_ti5")]
    pub bright_t31: Option<f64>,
    pub frp: Option<f64>,
    pub daynight: Option<String>,
}
