//! Docker-specific error types

use std::time::Duration;

use thiserror::Error;

/// Docker-specific error type
#[derive(Error, Debug)]
pub enum DockerError {
    /// Bollard client error
    #[error("Docker client error: {0}")]
    Client(#[from] bollard::errors::Error),

    /// Pull failed
    #[error("Docker pull failed for image {image}: {reason}")]
    PullFailed { image: String, reason: String },

    /// Container ran but exited with a non-zero status
    #[error("Container {id} exited with status {code}")]
    ContainerFailed { id: String, code: i64 },

    /// The runtime reported an error while waiting on the container
    #[error("Waiting for container {id} failed: {reason}")]
    WaitFailed { id: String, reason: String },

    /// Timeout error
    #[error("Docker operation timed out after {duration:?}")]
    Timeout { duration: Duration },
}

/// Result type alias for Docker operations
pub type Result<T> = std::result::Result<T, DockerError>;
