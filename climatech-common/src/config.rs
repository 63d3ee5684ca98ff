//! Configuration loading and root folder resolution
//!
//! Configuration is layered: command line → environment → TOML file → compiled
//! defaults. A missing or unparsable TOML file is never fatal; the service logs
//! a warning and starts with defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "CLIMATECH_ROOT_FOLDER";

/// Environment variable naming an explicit TOML config file
pub const CONFIG_FILE_ENV: &str = "CLIMATECH_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "climatech.db";

/// Scratch directory for raster downloads inside the root folder
pub const DOWNLOADS_DIR_NAME: &str = "downloads";

/// Level filter used when neither RUST_LOG nor the TOML file sets one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Compiled defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind_address: String,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was built for
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind_address: "127.0.0.1:8000".to_string(),
        }
    }
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/climatech (or /var/lib/climatech for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("climatech"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/climatech"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("climatech"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/climatech"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("climatech"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\climatech"))
    } else {
        PathBuf::from("./climatech_data")
    }
}

/// Logging section of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter (overridden by RUST_LOG)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// AppEEARS (imagery API) section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppeearsConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Product identifier requested for every layer
    pub product: String,
    /// Days before today covered by a submitted task
    pub lookback_days: u32,
    /// Write buffer capacity used while streaming bundle files to disk
    pub download_chunk_bytes: usize,
}

impl Default for AppeearsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://appeears.earthdatacloud.nasa.gov/api".to_string(),
            username: None,
            password: None,
            product: "HLSS30.020".to_string(),
            lookback_days: 15,
            download_chunk_bytes: 1024,
        }
    }
}

/// Task polling schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub initial_interval_secs: u64,
    pub max_interval_secs: u64,
    pub max_wait_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval_secs: 60,
            max_interval_secs: 600,
            max_wait_secs: 6 * 60 * 60,
        }
    }
}

/// Freshness gate window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FreshnessConfig {
    pub window_days: u32,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

/// FIRMS wildfire feed section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FirmsConfig {
    pub base_url: String,
    pub map_key: Option<String>,
    /// ISO-3166 alpha-3 country code used by the country endpoint
    pub country: String,
}

impl Default for FirmsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://firms.modaps.eosdis.nasa.gov".to_string(),
            map_key: None,
            country: "ARG".to_string(),
        }
    }
}

/// Complete TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub logging: LoggingConfig,
    pub appeears: AppeearsConfig,
    pub polling: PollingConfig,
    pub freshness: FreshnessConfig,
    pub firms: FirmsConfig,
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load from file, degrading to defaults when the file is missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("{} ({}), using defaults", e, path.display());
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Read TOML failed ({}): {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Bind address with compiled fallback
    pub fn bind_address(&self) -> String {
        self.bind_address
            .clone()
            .unwrap_or_else(|| CompiledDefaults::for_current_platform().bind_address)
    }
}

/// Default TOML config location: `<config dir>/climatech/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("climatech").join("config.toml"))
}

/// Resolve which config file to read: explicit path → env var → default location
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_path()
}

/// Root folder resolution
///
/// Priority order:
/// 1. Command-line argument
/// 2. `CLIMATECH_ROOT_FOLDER` environment variable
/// 3. TOML `root_folder`
/// 4. OS-dependent compiled default
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml_config(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!(module = %self.module_name, "Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            info!(module = %self.module_name, "Root folder from TOML config: {}", path.display());
            return path.clone();
        }

        let path = CompiledDefaults::for_current_platform().root_folder;
        info!(module = %self.module_name, "Root folder from compiled default: {}", path.display());
        path
    }
}

/// Prepares the root folder layout (database file, download scratch dir)
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder and the downloads directory if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.downloads_path())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn downloads_path(&self) -> PathBuf {
        self.root_folder.join(DOWNLOADS_DIR_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}
