/*!
 * Configuration management for PacFlow.
 *
 * This module provides functionality to load, validate, and access configuration
 * settings for PacFlow components: logging, request queueing, the HTTP client,
 * input scanning, and the list of controller devices.
 */
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::Id;

/// Core configuration for PacFlow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Request queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// HTTP client configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Input scanning configuration
    #[serde(default)]
    pub scan: ScanConfig,

    /// Controller devices
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application environment (development, production, etc.)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// What a queue does with a new request when it is already full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Reject the new request
    #[default]
    RejectNew,
    /// Evict the oldest pending request to make room
    DropOldest,
}

/// Request queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of pending requests per device
    #[serde(default = "default_queue_max_length")]
    pub max_length: usize,

    /// Overflow policy once `max_length` requests are pending
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Delay before the next request runs after a failed one
    #[serde(default = "default_error_cooldown_ms")]
    pub error_cooldown_ms: u64,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in milliseconds
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum idle keep-alive connections per controller
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// Accept invalid TLS certificates (test rigs only)
    #[serde(default)]
    pub testing: bool,
}

/// Input scanning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Scan interval used when a node does not configure one
    #[serde(default = "default_scan_interval_ms")]
    pub default_interval_ms: u64,

    /// Round trip time after which a scan is reported as delayed
    #[serde(default = "default_delayed_threshold_ms")]
    pub delayed_threshold_ms: u64,

    /// Deadband used when a node does not configure one
    #[serde(default = "default_deadband")]
    pub default_deadband: f64,
}

/// Transport scheme for a controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Scheme {
    /// Plain HTTP
    Http,
    /// HTTPS (the default unless HTTP is asked for explicitly)
    #[default]
    Https,
}

impl Scheme {
    /// The URL scheme string
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl From<String> for Scheme {
    fn from(s: String) -> Self {
        if s.trim().eq_ignore_ascii_case("http") {
            Scheme::Http
        } else {
            Scheme::Https
        }
    }
}

impl From<Scheme> for String {
    fn from(scheme: Scheme) -> Self {
        scheme.as_str().to_string()
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of one controller device
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Stable identifier of the device configuration
    pub id: Id,

    /// Host name or address, optionally with a port
    pub address: String,

    /// Scheme used to reach the controller
    #[serde(default)]
    pub protocol: Scheme,

    /// API key id
    #[serde(default)]
    pub key: String,

    /// API key value
    #[serde(default)]
    pub secret: String,

    /// Path to the controller's public certificate (PEM)
    #[serde(default)]
    pub public_cert_path: Option<String>,

    /// Path to a CA certificate (PEM)
    #[serde(default)]
    pub ca_cert_path: Option<String>,
}

impl DeviceConfig {
    /// Create a device configuration with credentials
    pub fn new<A: Into<String>>(id: Id, address: A, protocol: Scheme, key: &str, secret: &str) -> Self {
        Self {
            id,
            address: address.into(),
            protocol,
            key: key.to_string(),
            secret: secret.to_string(),
            public_cert_path: None,
            ca_cert_path: None,
        }
    }

    /// Whether the address refers to the local machine
    pub fn is_localhost(&self) -> bool {
        self.address.trim().eq_ignore_ascii_case("localhost")
    }
}

// Secrets stay out of logs.
impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("protocol", &self.protocol)
            .field("key", &self.key)
            .field("secret", &if self.secret.is_empty() { "" } else { "***" })
            .field("public_cert_path", &self.public_cert_path)
            .field("ca_cert_path", &self.ca_cert_path)
            .finish()
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            environment: default_environment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_length: default_queue_max_length(),
            overflow: OverflowPolicy::default(),
            error_cooldown_ms: default_error_cooldown_ms(),
        }
    }
}

impl QueueConfig {
    /// The cooldown applied after a failed request
    pub fn error_cooldown(&self) -> Duration {
        Duration::from_millis(self.error_cooldown_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            testing: false,
        }
    }
}

impl HttpConfig {
    /// The request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: default_scan_interval_ms(),
            delayed_threshold_ms: default_delayed_threshold_ms(),
            default_deadband: default_deadband(),
        }
    }
}

impl ScanConfig {
    /// The delayed-response threshold
    pub fn delayed_threshold(&self) -> Duration {
        Duration::from_millis(self.delayed_threshold_ms)
    }
}

fn default_app_name() -> String {
    "pacflow".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_max_length() -> usize {
    500
}

fn default_error_cooldown_ms() -> u64 {
    50
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

fn default_pool_max_idle_per_host() -> usize {
    1
}

fn default_scan_interval_ms() -> u64 {
    1000
}

fn default_delayed_threshold_ms() -> u64 {
    3000
}

fn default_deadband() -> f64 {
    1.0
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
    override_with: Option<Config>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Override with an existing config
    pub fn override_with(mut self, config: Config) -> Self {
        self.override_with = Some(config);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        if let Some(config) = self.override_with {
            return Ok(config);
        }

        let mut config_builder = ConfigLib::builder();

        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;

        info!(devices = config.devices.len(), "Configuration loaded successfully");
        Ok(config)
    }
}

impl Config {
    /// Check the configuration for values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.queue.max_length == 0 {
            return Err(Error::config("queue.max_length must be at least 1"));
        }

        let mut seen = std::collections::HashSet::new();
        for device in &self.devices {
            if device.address.trim().is_empty() {
                return Err(Error::config(format!("Device {} has no address", device.id)));
            }
            if !seen.insert(device.id.clone()) {
                return Err(Error::config(format!("Device id {} is used twice", device.id)));
            }
        }

        Ok(())
    }
}

/// A thread-safe reference to a configuration
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<Config>);

impl SharedConfig {
    /// Create a new SharedConfig
    pub fn new(config: Config) -> Self {
        Self(Arc::new(config))
    }

    /// Get a reference to the config
    pub fn get(&self) -> &Config {
        &self.0
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

impl AsRef<Config> for SharedConfig {
    fn as_ref(&self) -> &Config {
        self.get()
    }
}
