//! Configuration management
//!
//! Two layers: the on-disk [`Config`] (TOML at
//! `~/.config/bucketfs/config.toml`, schema-versioned) holding defaults and
//! per-bucket profiles, and the per-session [`FileSystemConfig`] resolved from
//! it and from the option map passed when a file system is created.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "BUCKETFS_CONFIG_DIR";

/// Default size of one read fragment: 5 MiB
pub const DEFAULT_MAX_FRAGMENT_SIZE: u64 = 5 * 1024 * 1024;

/// Default number of fragments a read channel keeps cached
pub const DEFAULT_MAX_FRAGMENT_NUMBER: usize = 50;

/// Option keys accepted by [`FileSystemConfig::with_options`]
pub mod keys {
    pub const REGION: &str = "aws.region";
    pub const ACCESS_KEY_ID: &str = "aws.accessKeyId";
    pub const SECRET_ACCESS_KEY: &str = "aws.secretAccessKey";
    pub const SESSION_TOKEN: &str = "aws.sessionToken";
    pub const ENDPOINT: &str = "s3.spi.endpoint";
    pub const FORCE_PATH_STYLE: &str = "s3.spi.force-path-style";
    pub const READ_ONLY: &str = "s3.spi.read-only";
    pub const MAX_FRAGMENT_SIZE: &str = "s3.spi.read.max-fragment-size";
    pub const MAX_FRAGMENT_NUMBER: &str = "s3.spi.read.max-fragment-number";
}

/// Retry configuration handed to the storage client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts
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
    100
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

/// Timeout configuration handed to the storage client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,

    /// Whole-operation timeout in milliseconds
    #[serde(default = "default_operation_timeout")]
    pub operation_ms: u64,
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_operation_timeout() -> u64 {
    30000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_timeout(),
            operation_ms: default_operation_timeout(),
        }
    }
}

/// Static credentials for one bucket
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .finish()
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Settings applied to every bucket
    #[serde(default)]
    pub defaults: Defaults,

    /// Per-bucket overrides
    #[serde(default)]
    pub buckets: Vec<BucketProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            buckets: Vec::new(),
        }
    }
}

impl Config {
    /// Find the profile for a bucket
    pub fn profile(&self, bucket: &str) -> Option<&BucketProfile> {
        self.buckets.iter().find(|p| p.bucket == bucket)
    }
}

/// Default settings for every file system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub force_path_style: bool,

    #[serde(default)]
    pub read_only: bool,

    #[serde(default = "default_max_fragment_size")]
    pub max_fragment_size: u64,

    #[serde(default = "default_max_fragment_number")]
    pub max_fragment_number: usize,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub timeout: TimeoutConfig,
}

fn default_max_fragment_size() -> u64 {
    DEFAULT_MAX_FRAGMENT_SIZE
}

fn default_max_fragment_number() -> usize {
    DEFAULT_MAX_FRAGMENT_NUMBER
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            force_path_style: false,
            read_only: false,
            max_fragment_size: default_max_fragment_size(),
            max_fragment_number: default_max_fragment_number(),
            retry: RetryConfig::default(),
            timeout: TimeoutConfig::default(),
        }
    }
}

/// Overrides for a single bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketProfile {
    /// Bucket the profile applies to
    pub bucket: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_path_style: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

impl BucketProfile {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            endpoint: None,
            credentials: None,
            force_path_style: None,
            read_only: None,
        }
    }
}

/// Resolved configuration bundle of one file system session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemConfig {
    pub bucket_name: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub credentials: Option<Credentials>,
    pub force_path_style: bool,
    pub read_only: bool,
    pub max_fragment_size: u64,
    pub max_fragment_number: usize,
    pub retry: RetryConfig,
    pub timeout: TimeoutConfig,
}

impl FileSystemConfig {
    /// Configuration for a bucket with built-in defaults
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self::from_config(&Config::default(), bucket_name)
    }

    /// Resolve the configuration for a bucket: defaults, then its profile
    pub fn from_config(config: &Config, bucket_name: impl Into<String>) -> Self {
        let bucket_name = bucket_name.into();
        let d = &config.defaults;
        let mut resolved = Self {
            region: d.region.clone(),
            endpoint: d.endpoint.clone(),
            credentials: None,
            force_path_style: d.force_path_style,
            read_only: d.read_only,
            max_fragment_size: d.max_fragment_size.max(1),
            max_fragment_number: d.max_fragment_number.max(1),
            retry: d.retry.clone(),
            timeout: d.timeout.clone(),
            bucket_name,
        };

        if let Some(profile) = config.profile(&resolved.bucket_name) {
            if profile.region.is_some() {
                resolved.region = profile.region.clone();
            }
            if profile.endpoint.is_some() {
                resolved.endpoint = profile.endpoint.clone();
            }
            if profile.credentials.is_some() {
                resolved.credentials = profile.credentials.clone();
            }
            if let Some(v) = profile.force_path_style {
                resolved.force_path_style = v;
            }
            if let Some(v) = profile.read_only {
                resolved.read_only = v;
            }
        }

        resolved
    }

    /// Apply an option map on top of this configuration
    ///
    /// Unknown keys are ignored so option maps can be shared with other layers.
    pub fn with_options(mut self, options: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| options.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(region) = get(keys::REGION) {
            self.region = Some(region.to_string());
        }
        if let Some(endpoint) = get(keys::ENDPOINT) {
            self.endpoint = Some(endpoint.to_string());
        }

        match (get(keys::ACCESS_KEY_ID), get(keys::SECRET_ACCESS_KEY)) {
            (Some(access), Some(secret)) => {
                let mut credentials = Credentials::new(access, secret);
                credentials.session_token = get(keys::SESSION_TOKEN).map(str::to_string);
                self.credentials = Some(credentials);
            }
            (None, None) => {}
            _ => {
                return Err(Error::Config(format!(
                    "'{}' and '{}' must be given together",
                    keys::ACCESS_KEY_ID,
                    keys::SECRET_ACCESS_KEY
                )));
            }
        }

        if let Some(v) = get(keys::FORCE_PATH_STYLE) {
            self.force_path_style = parse_option(keys::FORCE_PATH_STYLE, v)?;
        }
        if let Some(v) = get(keys::READ_ONLY) {
            self.read_only = parse_option(keys::READ_ONLY, v)?;
        }
        if let Some(v) = get(keys::MAX_FRAGMENT_SIZE) {
            self.max_fragment_size = positive(keys::MAX_FRAGMENT_SIZE, parse_option(keys::MAX_FRAGMENT_SIZE, v)?)?;
        }
        if let Some(v) = get(keys::MAX_FRAGMENT_NUMBER) {
            self.max_fragment_number =
                positive(keys::MAX_FRAGMENT_NUMBER, parse_option(keys::MAX_FRAGMENT_NUMBER, v)?)?;
        }

        Ok(self)
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn force_path_style(mut self, enabled: bool) -> Self {
        self.force_path_style = enabled;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn max_fragment_size(mut self, size: u64) -> Self {
        self.max_fragment_size = size.max(1);
        self
    }

    pub fn max_fragment_number(mut self, n: usize) -> Self {
        self.max_fragment_number = n.max(1);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = timeout;
        self
    }
}

fn parse_option<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value '{value}' for '{key}'")))
}

fn positive<T: Default + PartialOrd>(key: &str, value: T) -> Result<T> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(Error::Config(format!("'{key}' must be greater than zero")))
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    ///
    /// `BUCKETFS_CONFIG_DIR` takes precedence over the platform config directory.
    pub fn new() -> Result<Self> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("Could not determine config directory".into()))?
                .join("bucketfs"),
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
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        if config.schema_version < SCHEMA_VERSION {
            config.schema_version = SCHEMA_VERSION;
        } else if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}",
                config.schema_version, SCHEMA_VERSION
            )));
        }

        tracing::debug!(path = %self.config_path.display(), buckets = config.buckets.len(), "loaded configuration");
        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 600 (owner read/write only) since profiles may hold secrets.
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
}
