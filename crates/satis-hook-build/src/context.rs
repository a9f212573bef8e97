//! Process-wide execution context
//!
//! One context is created at startup and shared by every trigger. Cancelling
//! it is the only teardown signal for the HTTP listener and the signal loop.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::info;

use crate::error::{BuildError, Result};

/// Why the context was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGTERM
    Terminate,
    /// SIGINT (Ctrl-C)
    Interrupt,
    /// A fatal error in one of the triggers
    FatalError,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Terminate => write!(f, "terminate signal"),
            ShutdownReason::Interrupt => write!(f, "interrupt signal"),
            ShutdownReason::FatalError => write!(f, "fatal error"),
        }
    }
}

/// Cancellable context shared by every trigger path.
///
/// Cheap to clone; all clones observe the same cancellation. It is cancelled
/// at most once and never reset.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl ExecutionContext {
    /// Create a fresh, uncancelled context
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the context. Only the first call has an effect.
    pub fn cancel(&self, reason: ShutdownReason) {
        if self.reason.set(reason).is_ok() {
            info!("Shutdown requested: {}", reason);
            self.token.cancel();
        }
    }

    /// Check if shutdown was requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Why the context was cancelled, if it was
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// Resolves once the context is cancelled
    pub fn cancelled(&self) -> WaitForCancellationFutureOwned {
        self.token.clone().cancelled_owned()
    }

    /// Run `operation` unless the context is cancelled first
    pub async fn run<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        tokio::select! {
            _ = self.token.cancelled() => Err(BuildError::Cancelled),
            result = operation => result,
        }
    }
}
