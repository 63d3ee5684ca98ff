//! In-process stand-ins for the external services
//!
//! `FakeImagery` serves a fixed bundle and counts every call so tests can
//! assert on network traffic.

use async_trait::async_trait;
use climatech_ingest::services::{
    AppeearsError, AuthToken, BundleFile, FirmsError, HotspotFeed, ImageryApi, TaskRequest,
    TaskStatus,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const FAKE_TASK_ID: &str = "task-0001";

#[derive(Default)]
pub struct CallCounts {
    pub login: AtomicUsize,
    pub submit: AtomicUsize,
    pub status: AtomicUsize,
    pub list: AtomicUsize,
    pub download: AtomicUsize,
}

/// How the fake task reports its status
#[derive(Debug, Clone)]
pub enum TaskBehavior {
    /// Running for this many checks, then done
    DoneAfter(usize),
    /// Always running
    NeverDone,
    /// Fails remotely on the first check
    Fails(String),
}

pub struct FakeImagery {
    files: Vec<BundleFile>,
    contents: HashMap<String, Vec<u8>>,
    failing_downloads: HashSet<String>,
    behavior: TaskBehavior,
    submit_error: Option<u16>,
    listing_error: bool,
    pub calls: CallCounts,
    pub last_request: Mutex<Option<serde_json::Value>>,
}

impl Default for FakeImagery {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            contents: HashMap::new(),
            failing_downloads: HashSet::new(),
            behavior: TaskBehavior::DoneAfter(1),
            submit_error: None,
            listing_error: false,
            calls: CallCounts::default(),
            last_request: Mutex::new(None),
        }
    }
}

impl FakeImagery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bundle file served with `bytes`
    pub fn with_file(mut self, file_name: &str, bytes: Vec<u8>) -> Self {
        let file_id = format!("file-{}", self.files.len() + 1);
        self.contents.insert(file_id.clone(), bytes);
        self.files.push(BundleFile {
            file_id,
            file_name: file_name.to_string(),
            file_size: None,
            file_type: None,
        });
        self
    }

    /// Add a bundle file whose download fails with HTTP 500
    pub fn with_failing_download(mut self, file_name: &str) -> Self {
        self = self.with_file(file_name, Vec::new());
        if let Some(file) = self.files.last() {
            self.failing_downloads.insert(file.file_id.clone());
        }
        self
    }

    pub fn with_behavior(mut self, behavior: TaskBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_submit_error(mut self, status: u16) -> Self {
        self.submit_error = Some(status);
        self
    }

    pub fn with_listing_error(mut self) -> Self {
        self.listing_error = true;
        self
    }

    /// Total calls across every endpoint
    pub fn network_calls(&self) -> usize {
        self.calls.login.load(Ordering::SeqCst)
            + self.calls.submit.load(Ordering::SeqCst)
            + self.calls.status.load(Ordering::SeqCst)
            + self.calls.list.load(Ordering::SeqCst)
            + self.calls.download.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.calls.download.load(Ordering::SeqCst)
    }

    pub fn status_checks(&self) -> usize {
        self.calls.status.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageryApi for FakeImagery {
    async fn login(&self) -> Result<AuthToken, AppeearsError> {
        self.calls.login.fetch_add(1, Ordering::SeqCst);
        Ok(AuthToken::new("fake-token"))
    }

    async fn submit_task(
        &self,
        _token: &AuthToken,
        request: &TaskRequest,
    ) -> Result<String, AppeearsError> {
        self.calls.submit.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(serde_json::to_value(request).unwrap());

        match self.submit_error {
            Some(status) => Err(AppeearsError::Status {
                status,
                body: "rejected".to_string(),
            }),
            None => Ok(FAKE_TASK_ID.to_string()),
        }
    }

    async fn task_status(
        &self,
        _token: &AuthToken,
        _task_id: &str,
    ) -> Result<TaskStatus, AppeearsError> {
        let checks = self.calls.status.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.behavior {
            TaskBehavior::DoneAfter(n) if checks >= *n => Ok(TaskStatus::Done),
            TaskBehavior::DoneAfter(_) | TaskBehavior::NeverDone => {
                Ok(TaskStatus::Running("processing".to_string()))
            }
            TaskBehavior::Fails(status) => Ok(TaskStatus::Failed(status.clone())),
        }
    }

    async fn list_bundle(
        &self,
        _token: &AuthToken,
        _task_id: &str,
    ) -> Result<Vec<BundleFile>, AppeearsError> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        if self.listing_error {
            return Err(AppeearsError::Status {
                status: 404,
                body: "no bundle".to_string(),
            });
        }
        Ok(self.files.clone())
    }

    async fn download_file(
        &self,
        _token: &AuthToken,
        _task_id: &str,
        file: &BundleFile,
        dest: &Path,
    ) -> Result<u64, AppeearsError> {
        self.calls.download.fetch_add(1, Ordering::SeqCst);
        if self.failing_downloads.contains(&file.file_id) {
            return Err(AppeearsError::Status {
                status: 500,
                body: "download failed".to_string(),
            });
        }

        let bytes = self.contents.get(&file.file_id).cloned().unwrap_or_default();
        std::fs::write(dest, &bytes)?;
        Ok(bytes.len() as u64)
    }
}

/// Hotspot feed returning a canned CSV body
pub struct FakeHotspots {
    body: Result<String, u16>,
    pub fetches: AtomicUsize,
}

impl FakeHotspots {
    pub fn with_csv(csv: &str) -> Self {
        Self {
            body: Ok(csv.to_string()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            body: Err(status),
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HotspotFeed for FakeHotspots {
    async fn fetch_country_csv(&self, _satellite: &str, _days: u32) -> Result<String, FirmsError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.body {
            Ok(text) => Ok(text.clone()),
            Err(status) => Err(FirmsError::Status {
                status: *status,
                body: "Invalid MAP_KEY".to_string(),
            }),
        }
    }
}
