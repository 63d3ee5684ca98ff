//! FIRMS active-fire feed
//!
//! Country CSV endpoint:
//! `{base}/api/country/csv/{map_key}/{source}/{country}/{days}`.
//! MODIS and VIIRS sources share the parser; VIIRS brightness columns are
//! read under their MODIS names.

use async_trait::async_trait;
use climatech_common::config::FirmsConfig;
use std::time::Duration;
use thiserror::Error;

use crate::models::WildfireRecord;

/// Day range accepted by the country endpoint
pub const MAX_DAY_RANGE: u32 = 10;

#[derive(Debug, Error)]
pub enum FirmsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for FirmsError {
    fn from(e: reqwest::Error) -> Self {
        FirmsError::Network(e.to_string())
    }
}

/// Source name (`VIIRS_SNPP_NRT`, `MODIS_NRT`, ...) and day range check
pub fn validate_query(satellite: &str, days: u32) -> Result<(), FirmsError> {
    let valid_source = !satellite.is_empty()
        && satellite
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !valid_source {
        return Err(FirmsError::InvalidRequest(format!("Unknown satellite source '{}'", satellite)));
    }
    if days == 0 || days > MAX_DAY_RANGE {
        return Err(FirmsError::InvalidRequest(format!(
            "days must be between 1 and {}, got {}",
            MAX_DAY_RANGE, days
        )));
    }
    Ok(())
}

/// Hotspot CSV source
#[async_trait]
pub trait HotspotFeed: Send + Sync {
    async fn fetch_country_csv(&self, satellite: &str, days: u32) -> Result<String, FirmsError>;
}

pub struct FirmsClient {
    http_client: reqwest::Client,
    base_url: String,
    map_key: String,
    country: String,
}

impl FirmsClient {
    pub fn new(config: &FirmsConfig, map_key: String) -> Result<Self, FirmsError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            map_key,
            country: config.country.clone(),
        })
    }
}

#[async_trait]
impl HotspotFeed for FirmsClient {
    async fn fetch_country_csv(&self, satellite: &str, days: u32) -> Result<String, FirmsError> {
        validate_query(satellite, days)?;

        // map key stays out of the log line
        tracing::info!(satellite, country = %self.country, days, "Fetching FIRMS hotspots");
        let url = format!(
            "{}/api/country/csv/{}/{}/{}/{}",
            self.base_url, self.map_key, satellite, self.country, days
        );

        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(FirmsError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// Parse a FIRMS CSV; rows that do not deserialize are skipped
///
/// Returns the parsed records and the number of skipped rows.
pub fn parse_firms_csv(text: &str) -> (Vec<WildfireRecord>, usize) {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut records = Vec::new();
    let mut skipped = 0;

    for (line, result) in reader.deserialize::<WildfireRecord>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                tracing::warn!(row = line + 1, error = %e, "Skipping malformed FIRMS row");
            }
        }
    }

    tracing::info!(rows = records.len(), skipped, "FIRMS CSV parsed");
    (records, skipped)
}
