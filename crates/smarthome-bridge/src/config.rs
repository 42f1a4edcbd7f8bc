//! Bridge configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Broker connection settings.
    pub broker: BrokerConfig,
    /// Message handling and flush settings.
    pub bridge: BridgeConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Storage path is not empty
    /// - Broker URL uses `mqtt://` or `mqtts://` and has a host
    /// - Reconnect delay is at least one second
    /// - At least one subscription filter, each well formed
    /// - Flush interval is within bounds (10s - 24 hours)
    ///
    /// The device UUID is not checked here. A missing or malformed UUID
    /// fails the messages that need it, not startup.
    ///
    /// # Example
    ///
    /// ```
    /// use smarthome_bridge::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.broker.validate());
        errors.extend(self.bridge.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
            return errors;
        }

        match self.bind.rsplit_once(':') {
            None => errors.push(ValidationError::new(
                "server.bind",
                format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            )),
            Some((_, port)) => match port.parse::<u16>() {
                Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                Err(_) => errors.push(ValidationError::new(
                    "server.bind",
                    format!("invalid port '{}': must be a number 1-65535", port),
                )),
                Ok(_) => {}
            },
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: smarthome_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Topic filters the bridge subscribes to by default.
pub const DEFAULT_SUBSCRIPTIONS: [&str; 3] =
    ["devices/+/data", "devices/+/rfid/check", "devices/+/status/#"];

/// Broker connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker URL: `mqtt://host:port` or `mqtts://host:port`.
    pub url: String,
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Client id prefix. A random suffix is appended per process.
    pub client_id_prefix: String,
    /// Keep-alive interval in seconds.
    pub keep_alive: u64,
    /// Skip TLS certificate validation.
    ///
    /// Only for brokers with self-signed certificates on a trusted network:
    /// with this set the connection can be intercepted.
    pub accept_invalid_certs: bool,
    /// Seconds to wait before reconnecting after a connection error.
    pub reconnect_delay: u64,
    /// Topic filters to subscribe to after every (re)connect.
    pub subscriptions: Vec<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "mqtt://localhost:1883".to_string(),
            username: None,
            password: None,
            client_id_prefix: "smarthome_backend".to_string(),
            keep_alive: 60,
            accept_invalid_certs: false,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            subscriptions: DEFAULT_SUBSCRIPTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Default reconnect delay in seconds.
pub const DEFAULT_RECONNECT_DELAY: u64 = 5;

impl BrokerConfig {
    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }

    /// Validate broker configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = crate::broker::parse_broker_url(&self.url) {
            errors.push(ValidationError::new(
                "broker.url",
                format!("invalid broker URL '{}': {}", self.url, e),
            ));
        }

        if self.client_id_prefix.trim().is_empty() {
            errors.push(ValidationError::new(
                "broker.client_id_prefix",
                "client id prefix cannot be empty",
            ));
        }

        if self.keep_alive == 0 {
            errors.push(ValidationError::new(
                "broker.keep_alive",
                "keep-alive must be at least 1 second",
            ));
        }

        if self.reconnect_delay == 0 {
            errors.push(ValidationError::new(
                "broker.reconnect_delay",
                "reconnect delay must be at least 1 second",
            ));
        }

        if self.username.is_some() != self.password.is_some() {
            errors.push(ValidationError::new(
                "broker.username",
                "username and password must be set together",
            ));
        }

        if self.subscriptions.is_empty() {
            errors.push(ValidationError::new(
                "broker.subscriptions",
                "at least one subscription filter is required",
            ));
        }
        for (i, filter) in self.subscriptions.iter().enumerate() {
            if let Err(message) = crate::topic::validate_filter(filter) {
                errors.push(ValidationError::new(
                    format!("broker.subscriptions[{}]", i),
                    format!("invalid filter '{}': {}", filter, message),
                ));
            }
        }

        errors
    }
}

/// Minimum flush interval in seconds.
pub const MIN_FLUSH_INTERVAL: u64 = 10;
/// Maximum flush interval in seconds (24 hours).
pub const MAX_FLUSH_INTERVAL: u64 = 86_400;
/// Default flush interval in seconds (30 minutes).
pub const DEFAULT_FLUSH_INTERVAL: u64 = 1800;

/// Message handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// UUID stored as `device_id` on rows for devices whose topic segment is
    /// not itself a UUID (e.g. `esp32_main`).
    pub device_uuid: Option<String>,
    /// Seconds between cache flushes.
    pub flush_interval: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_uuid: None,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl BridgeConfig {
    /// Flush interval as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval)
    }

    /// Validate bridge configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.flush_interval < MIN_FLUSH_INTERVAL {
            errors.push(ValidationError::new(
                "bridge.flush_interval",
                format!(
                    "flush interval {} is too short (minimum {} seconds)",
                    self.flush_interval, MIN_FLUSH_INTERVAL
                ),
            ));
        } else if self.flush_interval > MAX_FLUSH_INTERVAL {
            errors.push(ValidationError::new(
                "bridge.flush_interval",
                format!(
                    "flush interval {} is too long (maximum {} seconds / 24 hours)",
                    self.flush_interval, MAX_FLUSH_INTERVAL
                ),
            ));
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `broker.subscriptions[0]`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smarthome")
        .join("bridge.toml")
}
