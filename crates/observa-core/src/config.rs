//! `Observa` Configuration Module
//!
//! Provides configuration file support via `observa.toml`, environment
//! variables and runtime overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Runtime overrides (CLI flags)
//! 2. Environment variables (`OBSERVA_*`, sections separated by `__`)
//! 3. Configuration file (`observa.toml`)
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Query cost limits and cropping caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum number of table cells a query may produce before cropping.
    pub max_table_cells: u64,
    /// Time period cap applied by the first cropping phase.
    pub max_time_periods: usize,
    /// Overall location cap applied by the second cropping phase.
    pub max_locations: usize,
    /// Per-level location cap for `Country`.
    pub country_location_cap: usize,
    /// Per-level location cap for every other geographic level.
    pub default_location_cap: usize,
    /// Reject queries still over budget after cropping.
    pub reject_oversized_queries: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_table_cells: 25_000,
            max_time_periods: 5,
            max_locations: 5,
            country_location_cap: 1,
            default_location_cap: 2,
            reject_oversized_queries: true,
        }
    }
}

/// Observation hydration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Number of observations hydrated per round trip.
    pub batch_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

/// Storage configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path.
    pub database_path: String,
    /// Parallelism cap passed to bulk working-table statements.
    pub max_degree_of_parallelism: u16,
    /// Lock wait before a statement fails, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./observa.db".to_string(),
            max_degree_of_parallelism: 4,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace.
    pub level: String,
    /// Log format: text or compact.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Main `Observa` configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ObservaConfig {
    /// Query cost configuration.
    pub query: QueryConfig,
    /// Hydration configuration.
    pub fetch: FetchConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl ObservaConfig {
    /// Loads configuration from default sources.
    ///
    /// Priority: defaults < file < environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("observa.toml")
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file is not an error: defaults and environment variables
    /// still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("OBSERVA_").split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.max_table_cells == 0 {
            return Err(ConfigError::InvalidValue {
                key: "query.max_table_cells".to_string(),
                message: "value must be greater than 0".to_string(),
            });
        }

        if self.query.max_time_periods == 0 {
            return Err(ConfigError::InvalidValue {
                key: "query.max_time_periods".to_string(),
                message: "value must be greater than 0".to_string(),
            });
        }

        if self.query.max_locations == 0 {
            return Err(ConfigError::InvalidValue {
                key: "query.max_locations".to_string(),
                message: "value must be greater than 0".to_string(),
            });
        }

        if self.query.country_location_cap == 0 || self.query.default_location_cap == 0 {
            return Err(ConfigError::InvalidValue {
                key: "query.default_location_cap".to_string(),
                message: "per-level location caps must be greater than 0".to_string(),
            });
        }

        if self.fetch.batch_size == 0 || self.fetch.batch_size > 10_000 {
            return Err(ConfigError::InvalidValue {
                key: "fetch.batch_size".to_string(),
                message: format!(
                    "value {} is out of range [1, 10000]",
                    self.fetch.batch_size
                ),
            });
        }

        if self.storage.max_degree_of_parallelism == 0 {
            return Err(ConfigError::InvalidValue {
                key: "storage.max_degree_of_parallelism".to_string(),
                message: "value must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["text", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                message: format!(
                    "value '{}' is invalid, expected one of: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        Ok(())
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
