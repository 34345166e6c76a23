//! Configuration loading and data directory resolution
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! CLI and environment are handled by each binary's clap definition; this
//! module owns the TOML layer and the compiled defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Application directory name under the OS config/data directories
const APP_DIR: &str = "propmap";

pub const DEFAULT_BIND: &str = "0.0.0.0:5780";
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5780";
pub const DEFAULT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Server database file name inside the data directory
pub const DATABASE_FILE: &str = "propmap.db";

/// Uploader send-state file name inside the data directory
pub const UPLOADER_STATE_FILE: &str = "uploader_state.json";

/// Contents of `config.toml`
///
/// Every section and key is optional; absent values take compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerSection,
    pub uploader: UploaderSection,
    pub logging: LoggingConfig,
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Listen address
    pub bind: String,
    /// Directory holding `propmap.db`
    pub data_dir: Option<PathBuf>,
    /// Per-subscriber WebSocket event buffer
    pub event_capacity: usize,
    /// Largest accepted ingest body
    pub max_body_bytes: usize,
    /// Advisory ingest token (logged on mismatch, never enforced)
    pub ingest_token: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            data_dir: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            ingest_token: None,
        }
    }
}

/// `[uploader]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderSection {
    /// Base URL of the propmap server
    pub server_url: String,
    /// Directory holding `uploader_state.json`
    pub data_dir: Option<PathBuf>,
    /// The two watched log directories
    pub watch_dirs: Vec<PathBuf>,
    /// File extensions to submit (without the dot, case-insensitive)
    pub extensions: Vec<String>,
    /// Descend into subdirectories of the watched directories
    pub recursive: bool,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Sent as `Authorization: Bearer <token>` when set
    pub token: Option<String>,
}

impl Default for UploaderSection {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            data_dir: None,
            watch_dirs: Vec::new(),
            extensions: vec!["json".to_string()],
            recursive: false,
            interval_secs: DEFAULT_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token: None,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: Option<String>,
}

/// Default config file location: `<config_dir>/propmap/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Load the TOML config file
///
/// Uses `explicit` when given, otherwise the default location. A missing
/// file is not an error: a warning is logged and defaults are returned.
/// A file that exists but does not parse is `Error::Config`.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => path,
        None => {
            warn!("Could not determine config directory, using defaults");
            return Ok(TomlConfig::default());
        }
    };

    if !path.exists() {
        warn!("Config file not found: {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config = parse_toml_config(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Parse config file contents
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Data directory resolution: CLI > environment > TOML > OS default
pub fn resolve_data_dir(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    // Priority 4: OS-dependent default
    default_data_dir()
}

/// OS-dependent default data directory
///
/// `~/.local/share/propmap` on Linux, `~/Library/Application Support/propmap`
/// on macOS, `%LOCALAPPDATA%\propmap` on Windows.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./propmap_data"))
}
