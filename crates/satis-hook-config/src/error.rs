//! Configuration error types

use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors. All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for this schema
    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// No `satis_config` document
    #[error("missing satis config")]
    MissingSatisConfig,

    /// Empty `repositories` list
    #[error("no repositories configured")]
    NoRepositories,

    /// Any other invalid value
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// A path referenced an unset environment variable
    #[error("Environment variable not found: {name}")]
    EnvVar { name: String },

    /// The build user could not be resolved
    #[error("Failed to resolve user {name}: {reason}")]
    User { name: String, reason: String },

    /// The working directory is needed for a default and is unavailable
    #[error("Failed to determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
