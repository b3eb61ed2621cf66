//! Configuration management for Parley
//!
//! Configuration comes from defaults, a TOML file, or `PARLEY_*` environment
//! variables, and is validated before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

use crate::logging::LogLevel;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Relay server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Maximum concurrent WebSocket connections
    pub max_connections: usize,

    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Browser origins allowed to open a socket; empty allows any
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => f.write_str("memory"),
            StoreBackend::Sqlite => f.write_str("sqlite"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Connection pool size
    pub pool_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus exporter
    pub enabled: bool,

    /// Prometheus scrape address
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 5000)),
            max_connections: 10_000,
            shutdown_timeout: Duration::from_secs(10),
            allowed_origins: Vec::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_path: PathBuf::from("./data/parley.db"),
            pool_size: 8,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false, bind_address: SocketAddr::from(([127, 0, 0, 1], 9090)) }
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: PARLEY_<SECTION>_<KEY>
    /// Example: PARLEY_SERVER_BIND_ADDRESS=0.0.0.0:5000
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Server config
        if let Some(v) = var("PARLEY_SERVER_BIND_ADDRESS") {
            config.server.bind_address = parse_var("PARLEY_SERVER_BIND_ADDRESS", &v)?;
        }
        if let Some(v) = var("PARLEY_SERVER_MAX_CONNECTIONS") {
            config.server.max_connections = parse_var("PARLEY_SERVER_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = var("PARLEY_SERVER_SHUTDOWN_TIMEOUT_SECS") {
            let secs: u64 = parse_var("PARLEY_SERVER_SHUTDOWN_TIMEOUT_SECS", &v)?;
            config.server.shutdown_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = var("PARLEY_SERVER_ALLOWED_ORIGINS") {
            config.server.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }

        // Store config
        if let Some(v) = var("PARLEY_STORE_BACKEND") {
            config.store.backend = parse_var("PARLEY_STORE_BACKEND", &v)?;
        }
        if let Some(v) = var("PARLEY_STORE_DATABASE_PATH") {
            config.store.database_path = PathBuf::from(v);
        }
        if let Some(v) = var("PARLEY_STORE_POOL_SIZE") {
            config.store.pool_size = parse_var("PARLEY_STORE_POOL_SIZE", &v)?;
        }

        // Logging config
        if let Some(v) = var("PARLEY_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = var("PARLEY_LOG_JSON") {
            config.logging.json_format = parse_var("PARLEY_LOG_JSON", &v)?;
        }

        // Metrics config
        if let Some(v) = var("PARLEY_METRICS_ENABLED") {
            config.metrics.enabled = parse_var("PARLEY_METRICS_ENABLED", &v)?;
        }
        if let Some(v) = var("PARLEY_METRICS_BIND_ADDRESS") {
            config.metrics.bind_address = parse_var("PARLEY_METRICS_BIND_ADDRESS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_connections == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        if self.store.backend == StoreBackend::Sqlite
            && self.store.database_path.as_os_str().is_empty()
        {
            return Err(ConfigError::ValidationFailed(
                "sqlite backend requires a database_path".to_string(),
            ));
        }

        if self.logging.level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Whether a browser `Origin` may open a socket
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            _ if self.server.allowed_origins.is_empty() => true,
            // non-browser clients send no Origin
            None => true,
            Some(origin) => self.server.allowed_origins.iter().any(|o| o == origin),
        }
    }
}
