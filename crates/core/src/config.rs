//! Configuration management
//!
//! This module handles loading, saving, and migrating the earthfetch configuration file.
//! The configuration file is stored in TOML format at ~/.config/earthfetch/config.toml
//! (or `$EARTHFETCH_CONFIG_DIR/config.toml`).
//!
//! Credentials and tokens are never stored here.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::resolver::ProbeConfig;
use crate::scope::EndpointOverride;

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "EARTHFETCH_CONFIG_DIR";

/// Default Earthdata Login host
pub const DEFAULT_EDL_HOST: &str = "urs.earthdata.nasa.gov";

const DEFAULT_OUTPUT: &str = "human";

const DEFAULT_COLOR: &str = "auto";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,

    /// Earthdata Login settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Transfer tuning
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Extra provider → credentials endpoint mappings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<EndpointOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            auth: AuthConfig::default(),
            transfer: TransferConfig::default(),
            endpoints: Vec::new(),
        }
    }
}

/// Default settings for CLI behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Output format: "human" or "json"
    #[serde(default = "default_output")]
    pub output: String,

    /// Color mode: "auto", "always", or "never"
    #[serde(default = "default_color")]
    pub color: String,

    /// Show progress bars
    #[serde(default = "default_true")]
    pub progress: bool,
}

fn default_output() -> String {
    DEFAULT_OUTPUT.to_string()
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            progress: true,
        }
    }
}

/// Where Earthdata Login credentials come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginStrategy {
    /// `EARTHDATA_TOKEN`, or `EARTHDATA_USERNAME` and `EARTHDATA_PASSWORD`
    #[default]
    Environment,
    /// `~/.netrc` entry for the login host
    Netrc,
    /// `EARTHDATA_TOKEN` only
    Token,
}

/// Earthdata Login settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Login host
    #[serde(default = "default_edl_host")]
    pub host: String,

    /// Credential source; environment falls back to netrc when unset
    #[serde(default)]
    pub strategy: LoginStrategy,
}

fn default_edl_host() -> String {
    DEFAULT_EDL_HOST.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            host: default_edl_host(),
            strategy: LoginStrategy::default(),
        }
    }
}

/// Retry configuration for transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per item, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    10000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

/// Transfer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Execution backend: "sequential", "pool" or "distributed"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Worker count for the pool and distributed backends
    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Time budget per attempt, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_item_timeout_ms: Option<u64>,

    /// Time budget for a whole batch, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_timeout_ms: Option<u64>,

    /// Bytes read by the direct-access probe
    #[serde(default = "default_probe_bytes")]
    pub probe_bytes: u64,

    /// Time budget for the direct-access probe, in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

fn default_backend() -> String {
    "pool".to_string()
}

fn default_threads() -> usize {
    8
}

fn default_probe_bytes() -> u64 {
    10
}

fn default_probe_timeout() -> u64 {
    10000
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            threads: default_threads(),
            retry: RetryConfig::default(),
            per_item_timeout_ms: None,
            batch_timeout_ms: None,
            probe_bytes: default_probe_bytes(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl TransferConfig {
    pub fn probe(&self) -> ProbeConfig {
        ProbeConfig {
            bytes: self.probe_bytes,
            timeout: Duration::from_millis(self.probe_timeout_ms),
        }
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("earthfetch"),
        };
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// If the configuration file doesn't exist, returns a default configuration.
    /// If the schema version doesn't match, attempts migration.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config = self.migrate(config)?;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}. Please upgrade earthfetch.",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 600 (owner read/write only).
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.config_path, permissions)?;
        }

        Ok(())
    }

    /// Migrate configuration from older schema version
    fn migrate(&self, config: Config) -> Result<Config> {
        let mut config = config;
        tracing::info!(
            from = config.schema_version,
            to = SCHEMA_VERSION,
            "Migrating configuration"
        );
        config.schema_version = SCHEMA_VERSION;
        Ok(config)
    }
}
