//! Build orchestration for satis-hook
//!
//! This crate turns build triggers into Satis container runs: it prepares the
//! build workspace, serializes builds behind a lock and translates process
//! signals into rebuilds, image refreshes and shutdown.

pub mod context;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod signals;
pub mod workspace;

pub use context::{ExecutionContext, ShutdownReason};
pub use error::{BuildError, Result};
pub use lock::{BuildLock, BuildPermit};
pub use orchestrator::{BuildOrchestrator, BuildScope, SatisBuilder};
pub use signals::{forward_signals, run_signal_loop, SignalAction};
