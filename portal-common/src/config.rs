//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "PORTAL_ROOT";

/// Remote media download policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaFetchConfig {
    /// Total GET attempts before giving up
    pub max_attempts: u32,
    /// Pause between attempts
    pub retry_delay_ms: u64,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for MediaFetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 2000,
            timeout_secs: 30,
        }
    }
}

impl MediaFetchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Portal configuration (TOML)
///
/// Every key is optional; a missing file or missing key falls back to the
/// compiled default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Data directory holding the database, media and reports
    pub root_folder: Option<PathBuf>,
    /// Database file name, relative to the root folder
    pub database_file: String,
    /// Fetched media directory, relative to the root folder
    pub media_dir: String,
    /// Upload report directory, relative to the root folder
    pub reports_dir: String,
    /// Default tracing filter
    pub log_level: String,
    pub media_fetch: MediaFetchConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_file: "portal.db".to_string(),
            media_dir: "media".to_string(),
            reports_dir: "reports".to_string(),
            log_level: "info".to_string(),
            media_fetch: MediaFetchConfig::default(),
        }
    }
}

impl PortalConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration, degrading to defaults when the file is missing or invalid
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_file().ok(),
        };

        let Some(config_path) = candidate else {
            warn!("No config file found, using defaults");
            return Self::default();
        };

        match Self::load(&config_path) {
            Ok(config) => {
                info!("Loaded config: {}", config_path.display());
                config
            }
            Err(e) => {
                warn!("Could not load config {}: {}. Using defaults", config_path.display(), e);
                Self::default()
            }
        }
    }

    /// Resolve the root folder with this config as the third tier
    pub fn resolve_root(&self, cli_arg: Option<&str>) -> PathBuf {
        resolve_root_folder(cli_arg, ROOT_FOLDER_ENV, self.root_folder.as_deref())
    }

    pub fn database_path(&self, root: &Path) -> PathBuf {
        root.join(&self.database_file)
    }

    pub fn media_path(&self, root: &Path) -> PathBuf {
        root.join(&self.media_dir)
    }

    pub fn reports_path(&self, root: &Path) -> PathBuf {
        root.join(&self.reports_dir)
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config_value: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Get default configuration file path for the platform
fn default_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("portal").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/portal/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("portal"))
        .unwrap_or_else(|| PathBuf::from("./portal_data"))
}
