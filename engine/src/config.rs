//! Engine configuration module.
//!
//! # Pre-conditions
//! - Environment variables must be valid UTF-8 if set.
//!
//! # Post-conditions
//! - `EngineConfig` contains valid configuration values.
//! - `pool_capacity` defaults to 128 frames if not specified.
//! - `data_directory` defaults to "./data" if not specified.

use std::path::PathBuf;

/// Engine configuration loaded from environment variables.
///
/// # Environment Variables
/// - `OM_DATA_DIRECTORY`: Optional. Directory volumes are created in. Defaults to "./data".
/// - `OM_POOL_CAPACITY`: Optional. Buffer pool frames. Defaults to 128.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory where volume files are stored.
    pub data_directory: PathBuf,
    /// Number of frames in the buffer pool.
    pub pool_capacity: usize,
}

/// Error returned when configuration loading fails.
#[derive(Debug)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue {
        /// Name of the environment variable.
        name: &'static str,
        /// The invalid value that was provided.
        value: String,
        /// Description of why the value is invalid.
        reason: &'static str,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue {
                name,
                value,
                reason,
            } => {
                write!(
                    f,
                    "invalid value for environment variable {name}='{value}': {reason}"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Default buffer pool capacity if `OM_POOL_CAPACITY` is not set.
    const DEFAULT_POOL_CAPACITY: usize = 128;
    /// Default data directory if `OM_DATA_DIRECTORY` is not set.
    const DEFAULT_DATA_DIRECTORY: &'static str = "./data";

    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if `OM_POOL_CAPACITY` is not
    /// a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_directory = std::env::var("OM_DATA_DIRECTORY").map_or_else(
            |_| PathBuf::from(Self::DEFAULT_DATA_DIRECTORY),
            PathBuf::from,
        );

        let pool_capacity = match std::env::var("OM_POOL_CAPACITY") {
            Ok(capacity_str) => match capacity_str.parse::<usize>() {
                Ok(capacity) if capacity > 0 => capacity,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "OM_POOL_CAPACITY",
                        value: capacity_str,
                        reason: "must be a positive integer",
                    });
                }
            },
            Err(_) => Self::DEFAULT_POOL_CAPACITY,
        };

        Ok(Self {
            data_directory,
            pool_capacity,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from(Self::DEFAULT_DATA_DIRECTORY),
            pool_capacity: Self::DEFAULT_POOL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.pool_capacity, 128);
        assert_eq!(config.data_directory, PathBuf::from("./data"));
    }

    // Environment-variable behaviour is covered indirectly; tests must
    // not mutate the process environment because the test harness runs
    // them in parallel.
}
