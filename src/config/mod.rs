//! Configuration module
//!
//! Handles loading and saving efkreload configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::loader::FileAssetLoader;
use crate::protocol::DEFAULT_PORT;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Asset loading settings
    #[serde(default)]
    pub assets: AssetConfig,

    /// File watching settings
    #[serde(default)]
    pub watch: WatchConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
    /// Log filter directive, overrides `verbose` (e.g. "efkreload=trace")
    pub log_filter: Option<String>,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Viewer host
    #[serde(default = "default_host")]
    pub host: String,
    /// Viewer port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connection timeout in ms (0 leaves it to the OS)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Disable Nagle's algorithm
    #[serde(default = "default_true")]
    pub nodelay: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
            nodelay: default_true(),
        }
    }
}

impl From<&NetworkConfig> for crate::network::NetworkConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            connect_timeout_ms: config.connect_timeout_ms,
            nodelay: config.nodelay,
        }
    }
}

/// Asset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Directory relative asset paths are resolved against
    pub root: Option<PathBuf>,
    /// Maximum asset size
    #[serde(default = "default_max_asset_size")]
    pub max_size_bytes: u64,
}

fn default_max_asset_size() -> u64 {
    64 * 1024 * 1024 // 64 MB
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_size_bytes: default_max_asset_size(),
        }
    }
}

impl From<&AssetConfig> for FileAssetLoader {
    fn from(config: &AssetConfig) -> Self {
        let loader = FileAssetLoader::new().with_max_size(config.max_size_bytes);
        match &config.root {
            Some(root) => loader.with_root(root),
            None => loader,
        }
    }
}

/// Watch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// How often watched files are checked for changes (ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval() -> u64 {
    500
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("efkreload/config.toml")),
            Some(PathBuf::from("./efkreload.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Log filter to install, honoring the command line `--verbose` flag
    pub fn log_filter(&self, verbose: bool) -> String {
        match &self.general.log_filter {
            Some(filter) => filter.clone(),
            None if verbose || self.general.verbose => "debug".to_string(),
            None => "info".to_string(),
        }
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        network: NetworkConfig {
            host: "192.168.0.20".to_string(),
            ..Default::default()
        },
        assets: AssetConfig {
            root: Some(PathBuf::from("Resources/Effects")),
            ..Default::default()
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}
