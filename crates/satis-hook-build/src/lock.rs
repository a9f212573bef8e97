//! Single-build-at-a-time guard
//!
//! Every trigger goes through the same lock. A trigger arriving while a build
//! runs waits its turn if the queue has room and is turned away otherwise.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{info, warn};

use crate::error::{BuildError, Result};

/// Exclusive build lock with a bounded wait queue
#[derive(Debug)]
pub struct BuildLock {
    permit: Arc<Semaphore>,
    queued: AtomicUsize,
    max_queued: usize,
}

/// Held for the duration of one build
#[derive(Debug)]
pub struct BuildPermit {
    _permit: OwnedSemaphorePermit,
}

impl BuildLock {
    /// Create a lock that lets at most `max_queued` builds wait
    pub fn new(max_queued: usize) -> Self {
        Self { permit: Arc::new(Semaphore::new(1)), queued: AtomicUsize::new(0), max_queued }
    }

    /// Builds currently waiting for the lock
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Whether a build is running
    pub fn is_busy(&self) -> bool {
        self.permit.available_permits() == 0
    }

    /// Take the lock, waiting in the queue if there is room
    pub async fn acquire(&self) -> Result<BuildPermit> {
        match Arc::clone(&self.permit).try_acquire_owned() {
            Ok(permit) => return Ok(BuildPermit { _permit: permit }),
            Err(TryAcquireError::Closed) => return Err(BuildError::Cancelled),
            Err(TryAcquireError::NoPermits) => {}
        }

        let reserved = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                (queued < self.max_queued).then_some(queued + 1)
            });

        let position = match reserved {
            Ok(before) => before + 1,
            Err(queued) => {
                warn!("Build rejected: another build is running and {} are queued", queued);
                return Err(BuildError::BuildInProgress { queued });
            }
        };

        // Released when the wait ends or is abandoned
        let _slot = QueueSlot(&self.queued);

        info!("Another build is running, waiting in queue (position {})", position);
        Arc::clone(&self.permit)
            .acquire_owned()
            .await
            .map(|permit| BuildPermit { _permit: permit })
            .map_err(|_| BuildError::Cancelled)
    }
}

/// A reserved place in the wait queue
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
