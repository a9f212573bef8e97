//! Error types for the build orchestration module

use std::path::PathBuf;

use thiserror::Error;

/// Build-specific error types
#[derive(Error, Debug)]
pub enum BuildError {
    /// Creating or chowning a build directory failed
    #[error("Failed to prepare build directory {path:?}: {reason}")]
    Workspace { path: PathBuf, reason: String },

    /// Writing the Satis configuration failed
    #[error("Failed to write build configuration {path:?}: {reason}")]
    WriteConfig { path: PathBuf, reason: String },

    /// Another build holds the lock and the queue is full
    #[error("A build is already in progress ({queued} queued)")]
    BuildInProgress { queued: usize },

    /// The execution context was cancelled while the build was running
    #[error("Build was cancelled")]
    Cancelled,

    /// Docker error
    #[error("Docker error: {0}")]
    Docker(#[from] satis_hook_docker::DockerError),
}

/// Result type alias for build operations
pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    /// Create a workspace preparation error
    pub fn workspace(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Workspace { path: path.into(), reason: reason.to_string() }
    }

    /// Create a configuration write error
    pub fn write_config(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::WriteConfig { path: path.into(), reason: reason.to_string() }
    }

    /// Whether the build was turned away because another one is running
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::BuildInProgress { .. })
    }

    /// Check if an error indicates shutdown
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
