//! Bootstrap configuration loading
//!
//! Configuration file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `PHX_CONFIG` environment variable
//! 3. `~/.config/phenix/files.toml`, then `/etc/phenix/files.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing file is not an error: the tools start with defaults and log a
//! warning. A file that exists but does not parse is a configuration error.

use crate::host::local_hostname;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "PHX_CONFIG";

/// Bridge used when neither a VLAN alias nor the experiment names one
pub const FALLBACK_BRIDGE: &str = "phenix";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// minimega binary used to reach the cluster
    pub minimega_path: PathBuf,

    /// minimega base directory (passed as `-base`)
    pub minimega_base: PathBuf,

    /// phenix base directory; experiment files live in
    /// `{phenix_base}/images/{exp}/files`
    pub phenix_base: PathBuf,

    /// Headnode name (defaults to the local host name)
    pub headnode: Option<String>,

    /// Fallback bridge for interface connects
    pub default_bridge: String,

    /// File transfer polling
    pub transfer: TransferConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-experiment settings keyed by experiment name
    pub experiments: HashMap<String, ExperimentConfig>,

    /// VLAN alias to bridge name
    pub vlan_bridges: HashMap<String, String>,
}

/// File transfer polling configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Delay between status polls; 0 polls continuously
    pub poll_interval_ms: u64,

    /// Give up waiting on a transfer after this many seconds
    pub timeout_secs: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

/// Settings for a single experiment
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Bridge used by the experiment when none is given explicitly
    pub default_bridge: Option<String>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            minimega_path: PathBuf::from("minimega"),
            minimega_base: PathBuf::from("/tmp/minimega"),
            phenix_base: PathBuf::from("/phenix"),
            headnode: None,
            default_bridge: FALLBACK_BRIDGE.to_string(),
            transfer: TransferConfig::default(),
            logging: LoggingConfig::default(),
            experiments: HashMap::new(),
            vlan_bridges: HashMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TransferConfig {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Transfer timeout, if one is configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Headnode name, falling back to the local host name
    pub fn headnode_name(&self) -> String {
        self.headnode.clone().unwrap_or_else(local_hostname)
    }
}

/// Locates and loads the configuration file
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    env_var_name: String,
    search_paths: Vec<PathBuf>,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigResolver {
    /// Resolver with the standard environment variable and search paths
    pub fn new() -> Self {
        let mut search_paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            search_paths.push(dir.join("phenix").join("files.toml"));
        }
        search_paths.push(PathBuf::from("/etc/phenix/files.toml"));

        Self {
            env_var_name: CONFIG_ENV_VAR.to_string(),
            search_paths,
        }
    }

    /// Replace the list of well-known locations searched after the
    /// environment variable
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    /// Pick the configuration file to load, if any
    pub fn locate(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Well-known locations
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }

    /// Resolve and load the configuration
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Result<TomlConfig> {
        let Some(path) = self.locate(cli_arg) else {
            debug!("No configuration file found, using defaults");
            return Ok(TomlConfig::default());
        };

        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(TomlConfig::default());
        }

        debug!("Loading configuration from {}", path.display());
        TomlConfig::load_from(&path)
    }
}
