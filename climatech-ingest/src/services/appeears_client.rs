//! AppEEARS imagery API client
//!
//! Login, task submission, status, bundle manifest and file download. Every
//! call returns `Result<_, AppeearsError>`: an empty bundle is `Ok(vec![])`,
//! a failed listing is an error.

use async_trait::async_trait;
use chrono::NaiveDate;
use climatech_common::config::AppeearsConfig;
use climatech_common::geometry::polygon_feature_collection;
use climatech_common::time::format_task_date;
use geojson::{FeatureCollection, Geometry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::models::Band;

const USER_AGENT: &str = concat!("climatech-ingest/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Imagery API errors
#[derive(Debug, Error)]
pub enum AppeearsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Task accepted (HTTP {status}) but no task_id returned")]
    MissingTaskId { status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppeearsError {
    /// HTTP status code reported by the remote service, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AppeearsError::Status { status, .. } | AppeearsError::MissingTaskId { status } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AppeearsError {
    fn from(e: reqwest::Error) -> Self {
        AppeearsError::Network(e.to_string())
    }
}

/// Bearer token; redacted in Debug output
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Remote task status, normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// pending / queued / processing (or anything not yet terminal)
    Running(String),
    Done,
    /// error / failed / deleted / expired
    Failed(String),
}

impl TaskStatus {
    pub fn from_remote(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "done" => TaskStatus::Done,
            "error" | "failed" | "deleted" | "expired" => TaskStatus::Failed(status.to_string()),
            _ => TaskStatus::Running(status.to_string()),
        }
    }
}

/// One entry of a bundle manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleFile {
    pub file_id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_type: Option<String>,
}

impl BundleFile {
    /// Only GeoTIFF outputs carry band data
    pub fn is_raster(&self) -> bool {
        let name = self.file_name.to_ascii_lowercase();
        name.ends_with(".tif") || name.ends_with(".tiff")
    }
}

#[derive(Debug, Deserialize)]
struct BundleManifest {
    #[serde(default)]
    files: Vec<BundleFile>,
}

#[derive(Debug, Deserialize)]
struct TaskStatusBody {
    status: String,
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    task_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    token: String,
}

/// Area task descriptor posted to `/task`
#[derive(Debug, Clone, Serialize)]
pub struct TaskRequest {
    pub task_type: String,
    pub task_name: String,
    pub params: TaskParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskParams {
    pub geo: FeatureCollection,
    pub dates: Vec<DateRange>,
    pub layers: Vec<LayerRequest>,
    pub output: OutputSpec,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerRequest {
    pub product: String,
    pub layer: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    pub format: OutputFormat,
    pub projection: String,
    pub additional_options: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl TaskRequest {
    /// Area task over `polygon` for every HLS layer between `start` and `end`
    pub fn hls_area(polygon: &Geometry, product: &str, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            task_type: "area".to_string(),
            task_name: format!("HarmonizedLandsatSentinelData-{}", end.format("%Y%m%d")),
            params: TaskParams {
                geo: polygon_feature_collection(polygon),
                dates: vec![DateRange {
                    start_date: format_task_date(start),
                    end_date: format_task_date(end),
                }],
                layers: Band::ALL
                    .iter()
                    .map(|band| LayerRequest {
                        product: product.to_string(),
                        layer: band.layer_name().to_string(),
                    })
                    .collect(),
                output: OutputSpec {
                    format: OutputFormat {
                        kind: "geotiff".to_string(),
                    },
                    projection: "geographic".to_string(),
                    additional_options: serde_json::Map::new(),
                },
            },
        }
    }
}

/// Operations the pipeline needs from the imagery service
#[async_trait]
pub trait ImageryApi: Send + Sync {
    /// Exchange configured credentials for a bearer token
    async fn login(&self) -> Result<AuthToken, AppeearsError>;

    /// Submit a task; success is HTTP 202 with a task id
    async fn submit_task(
        &self,
        token: &AuthToken,
        request: &TaskRequest,
    ) -> Result<String, AppeearsError>;

    /// Single status check
    async fn task_status(&self, token: &AuthToken, task_id: &str)
        -> Result<TaskStatus, AppeearsError>;

    /// Output manifest of a finished task
    async fn list_bundle(
        &self,
        token: &AuthToken,
        task_id: &str,
    ) -> Result<Vec<BundleFile>, AppeearsError>;

    /// Stream one bundle file to `dest`; returns bytes written
    async fn download_file(
        &self,
        token: &AuthToken,
        task_id: &str,
        file: &BundleFile,
        dest: &Path,
    ) -> Result<u64, AppeearsError>;
}

/// HTTP client for the AppEEARS REST API
pub struct AppeearsClient {
    http_client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    write_buffer_bytes: usize,
}

impl AppeearsClient {
    pub fn new(
        config: &AppeearsConfig,
        username: String,
        password: String,
    ) -> Result<Self, AppeearsError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username,
            password,
            write_buffer_bytes: config.download_chunk_bytes.max(1),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn status_error(response: reqwest::Response) -> AppeearsError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        AppeearsError::Status { status, body }
    }
}

#[async_trait]
impl ImageryApi for AppeearsClient {
    async fn login(&self) -> Result<AuthToken, AppeearsError> {
        let response = self
            .http_client
            .post(self.url("login"))
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppeearsError::Authentication(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let body: LoginBody = response
            .json()
            .await
            .map_err(|e| AppeearsError::Authentication(format!("Unexpected login response: {}", e)))?;

        tracing::debug!("AppEEARS login succeeded");
        Ok(AuthToken::new(body.token))
    }

    async fn submit_task(
        &self,
        token: &AuthToken,
        request: &TaskRequest,
    ) -> Result<String, AppeearsError> {
        tracing::debug!(
            task_name = %request.task_name,
            layers = request.params.layers.len(),
            "Submitting AppEEARS task"
        );

        let response = self
            .http_client
            .post(self.url("task"))
            .bearer_auth(token.as_str())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::ACCEPTED {
            return Err(Self::status_error(response).await);
        }

        let body: SubmitBody = response
            .json()
            .await
            .map_err(|e| AppeearsError::Parse(e.to_string()))?;

        match body.task_id {
            Some(task_id) if !task_id.is_empty() => Ok(task_id),
            _ => Err(AppeearsError::MissingTaskId {
                status: status.as_u16(),
            }),
        }
    }

    async fn task_status(
        &self,
        token: &AuthToken,
        task_id: &str,
    ) -> Result<TaskStatus, AppeearsError> {
        let response = self
            .http_client
            .get(self.url(&format!("task/{}", task_id)))
            .bearer_auth(token.as_str())
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(Self::status_error(response).await);
        }

        let body: TaskStatusBody = response
            .json()
            .await
            .map_err(|e| AppeearsError::Parse(e.to_string()))?;

        Ok(TaskStatus::from_remote(&body.status))
    }

    async fn list_bundle(
        &self,
        token: &AuthToken,
        task_id: &str,
    ) -> Result<Vec<BundleFile>, AppeearsError> {
        let response = self
            .http_client
            .get(self.url(&format!("bundle/{}", task_id)))
            .bearer_auth(token.as_str())
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(Self::status_error(response).await);
        }

        let manifest: BundleManifest = response
            .json()
            .await
            .map_err(|e| AppeearsError::Parse(e.to_string()))?;

        Ok(manifest.files)
    }

    async fn download_file(
        &self,
        token: &AuthToken,
        task_id: &str,
        file: &BundleFile,
        dest: &Path,
    ) -> Result<u64, AppeearsError> {
        let mut response = self
            .http_client
            .get(self.url(&format!("bundle/{}/{}", task_id, file.file_id)))
            .bearer_auth(token.as_str())
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(Self::status_error(response).await);
        }

        let out = tokio::fs::File::create(dest).await?;
        let mut writer = tokio::io::BufWriter::with_capacity(self.write_buffer_bytes, out);
        let mut written = 0u64;

        while let Some(chunk) = response.chunk().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        tracing::debug!(file = %file.file_name, bytes = written, "Bundle file downloaded");
        Ok(written)
    }
}
